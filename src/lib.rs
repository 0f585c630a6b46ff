//! A bidirectional, length-framed, optionally-encrypted point-to-point
//! message transport between two processes on the same host, over a local
//! domain endpoint (a Unix domain socket on POSIX, a named pipe on Windows).
//!
//! One side embeds a [`Server`], which creates the endpoint and accepts one
//! peer at a time; the other embeds a [`Client`], which dials the endpoint
//! and auto-reconnects on loss. Both expose the same shape: `start`, `read`,
//! `write`, `status`, `close`. A handshake negotiates protocol version,
//! encryption, and the maximum message size before any application frame
//! flows; when encryption is enabled, each connection gets a fresh
//! ECDH(P-384)-derived AES-256-GCM session — see [`crypto`] and
//! [`handshake`].
//!
//! ```no_run
//! use peerlink::{Client, ClientConfig};
//!
//! # async fn run() -> Result<(), peerlink::Error> {
//! let mut client = Client::start("demo", ClientConfig::default()).await?;
//! client.write(1, b"hello".to_vec()).await?;
//! let msg = client.read().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod connection;
mod crypto;
mod error;
mod frame;
mod handshake;
mod message;
mod server;
mod status;
mod transport;

pub use client::Client;
pub use config::{ClientConfig, ServerConfig, DEFAULT_MAX_MESSAGE_SIZE, MIN_MAX_MESSAGE_SIZE};
pub use error::{Error, Kind};
pub use message::Message;
pub use server::Server;
pub use status::Status;
