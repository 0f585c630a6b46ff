//! Role configuration and their defaults/coercion rules.

/// Wire protocol version. A mismatch aborts the handshake at Step 1.
pub(crate) const PROTOCOL_VERSION: u8 = 1;

/// Floor below which a configured maximum message size is rejected in favor
/// of the default; mirrors the original library's refusal to run with a
/// ceiling too small to be useful.
pub const MIN_MAX_MESSAGE_SIZE: usize = 1024;

/// Maximum application payload size when the caller doesn't override it.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Floor for `retry_interval`, in seconds.
pub const MIN_RETRY_INTERVAL_SECS: u64 = 1;

/// `retry_interval` when the caller doesn't override it, in seconds.
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 20;

/// Configuration for [`crate::Server::start`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Offer encryption during the handshake. Default `true`.
    pub encryption: bool,
    /// Ceiling on a single payload's length, in bytes. Coerced up to
    /// [`MIN_MAX_MESSAGE_SIZE`] if set lower.
    pub max_message_size: usize,
    /// How long the acceptor waits for the next peer before giving up and
    /// entering [`crate::Status::Timeout`]. `0` means wait forever.
    pub timeout_secs: u64,
    /// POSIX only: clear the process umask while the listening socket file
    /// is created, then restore it, so the endpoint is group/world writable.
    pub unmask_permissions: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            encryption: true,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            timeout_secs: 0,
            unmask_permissions: false,
        }
    }
}

impl ServerConfig {
    pub(crate) fn effective_max_message_size(&self) -> usize {
        self.max_message_size.max(MIN_MAX_MESSAGE_SIZE)
    }
}

/// Configuration for [`crate::Client::start`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// When `true` (default), the client aborts the handshake if the server
    /// does not offer encryption. When `false`, the client accepts either.
    pub encryption: bool,
    /// How long the dialer keeps retrying before giving up and entering
    /// [`crate::Status::Timeout`]. `0` means retry forever.
    pub timeout_secs: u64,
    /// Delay between dial attempts while reconnecting. Coerced up to
    /// [`MIN_RETRY_INTERVAL_SECS`] if set lower.
    pub retry_interval_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            encryption: true,
            timeout_secs: 0,
            retry_interval_secs: DEFAULT_RETRY_INTERVAL_SECS,
        }
    }
}

impl ClientConfig {
    pub(crate) fn effective_retry_interval_secs(&self) -> u64 {
        self.retry_interval_secs.max(MIN_RETRY_INTERVAL_SECS)
    }
}
