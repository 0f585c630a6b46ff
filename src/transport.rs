//! Local endpoint transport: a Unix domain socket on POSIX, a named pipe on
//! Windows. Deliberately thin — the wire format and everything above it is
//! transport-agnostic.

use std::io;
use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Error;

/// A duplex byte stream to the peer, regardless of platform.
pub(crate) trait Duplex: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Duplex for T {}

/// A connected endpoint stream, boxed so role engines don't need to be
/// generic over the platform transport type.
pub(crate) type Stream = Box<dyn Duplex>;

/// Where a peer named `name` lives on this platform.
fn socket_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{name}.sock"))
}

#[cfg(unix)]
pub(crate) struct Listener {
    inner: tokio::net::UnixListener,
    path: PathBuf,
}

#[cfg(unix)]
impl Listener {
    pub(crate) async fn bind(name: &str, unmask_permissions: bool) -> Result<Self, Error> {
        let path = socket_path(name);
        // A stale socket file from a previous, uncleanly-terminated run
        // would otherwise make bind() fail with AddrInUse.
        let _ = std::fs::remove_file(&path);

        let inner = if unmask_permissions {
            // SAFETY: umask(2) is process-global and has no memory-safety
            // implications; we restore the prior mask immediately after.
            let previous = unsafe { libc::umask(0) };
            let result = tokio::net::UnixListener::bind(&path);
            unsafe {
                libc::umask(previous);
            }
            result
        } else {
            tokio::net::UnixListener::bind(&path)
        }
        .map_err(Error::Transport)?;

        Ok(Self { inner, path })
    }

    pub(crate) async fn accept(&mut self) -> Result<Stream, Error> {
        let (stream, _addr) = self.inner.accept().await.map_err(Error::Transport)?;
        Ok(Box::new(stream))
    }
}

#[cfg(unix)]
impl Drop for Listener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(unix)]
pub(crate) async fn connect(name: &str) -> Result<Stream, Error> {
    let path = socket_path(name);
    let stream = tokio::net::UnixStream::connect(&path)
        .await
        .map_err(Error::Transport)?;
    Ok(Box::new(stream))
}

#[cfg(windows)]
fn pipe_name(name: &str) -> String {
    format!(r"\\.\pipe\{name}")
}

#[cfg(windows)]
pub(crate) struct Listener {
    name: String,
    // The next server instance, created eagerly so a connecting client
    // never races an accept() call that hasn't set one up yet.
    next: tokio::net::windows::named_pipe::NamedPipeServer,
}

#[cfg(windows)]
impl Listener {
    pub(crate) async fn bind(name: &str, _unmask_permissions: bool) -> Result<Self, Error> {
        let next = tokio::net::windows::named_pipe::ServerOptions::new()
            .first_pipe_instance(true)
            .create(pipe_name(name))
            .map_err(Error::Transport)?;
        Ok(Self {
            name: name.to_owned(),
            next,
        })
    }

    pub(crate) async fn accept(&mut self) -> Result<Stream, Error> {
        self.next.connect().await.map_err(Error::Transport)?;
        let connected = std::mem::replace(
            &mut self.next,
            tokio::net::windows::named_pipe::ServerOptions::new()
                .create(pipe_name(&self.name))
                .map_err(Error::Transport)?,
        );
        Ok(Box::new(connected))
    }
}

#[cfg(windows)]
pub(crate) async fn connect(name: &str) -> Result<Stream, Error> {
    let stream = tokio::net::windows::named_pipe::ClientOptions::new()
        .open(pipe_name(name))
        .map_err(Error::Transport)?;
    Ok(Box::new(stream))
}
