//! Error taxonomy.

use thiserror::Error;

/// The kind of failure that occurred, independent of the human-readable detail.
///
/// `Message::Error` and `Peer::read` surface both a `Kind` and the full
/// [`Error`] so callers can match on the former without parsing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    InvalidName,
    VersionMismatch,
    EncryptionPolicy,
    BadKey,
    Framing,
    Decrypt,
    Transport,
    Timeout,
    ReservedType,
    TooLarge,
    NotConnected,
    Closed,
}

/// Errors surfaced by the peer lifecycle, the codec, and the crypto session.
#[derive(Debug, Error)]
pub enum Error {
    /// `start()` was called with an empty peer name.
    #[error("peer name must not be empty")]
    InvalidName,

    /// The client and server disagree on the wire protocol version.
    #[error("protocol version mismatch between client and server")]
    VersionMismatch,

    /// The client requires encryption but the server did not offer it.
    #[error("encryption policy mismatch: {0}")]
    EncryptionPolicy(String),

    /// Key exchange failed: a malformed or off-curve public point, or a
    /// cipher that could not be keyed from the derived secret.
    #[error("key exchange failed: {0}")]
    BadKey(String),

    /// A frame was shorter than its header, or its declared length exceeded
    /// the negotiated maximum.
    #[error("malformed frame: {0}")]
    Framing(String),

    /// AEAD open failed — truncated ciphertext, wrong key, or tampering.
    #[error("failed to decrypt frame")]
    Decrypt,

    /// The underlying byte stream or listener failed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The peer gave up waiting to (re)connect within its configured timeout.
    #[error("timed out waiting to (re)connect")]
    Timeout,

    /// `write()` was called with `msg_type == 0`, which is reserved.
    #[error("message type 0 is reserved for internal control frames")]
    ReservedType,

    /// `write()`'s payload exceeded the negotiated maximum message size.
    #[error("payload of {len} bytes exceeds the negotiated maximum of {max} bytes")]
    TooLarge { len: usize, max: usize },

    /// `write()` or `read()` was attempted while the peer was not `Connected`.
    #[error("not connected (current state: {0})")]
    NotConnected(String),

    /// The peer has been closed; its channels are drained and gone.
    #[error("peer is closed")]
    Closed,
}

impl Error {
    /// The [`Kind`] of this error, for callers that want to `match` without
    /// inspecting the message text.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Self::InvalidName => Kind::InvalidName,
            Self::VersionMismatch => Kind::VersionMismatch,
            Self::EncryptionPolicy(_) => Kind::EncryptionPolicy,
            Self::BadKey(_) => Kind::BadKey,
            Self::Framing(_) => Kind::Framing,
            Self::Decrypt => Kind::Decrypt,
            Self::Transport(_) => Kind::Transport,
            Self::Timeout => Kind::Timeout,
            Self::ReservedType => Kind::ReservedType,
            Self::TooLarge { .. } => Kind::TooLarge,
            Self::NotConnected(_) => Kind::NotConnected,
            Self::Closed => Kind::Closed,
        }
    }
}
