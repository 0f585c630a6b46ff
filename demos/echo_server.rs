//! Minimal echo server: accepts one client at a time and bounces every
//! payload it receives back under the same message type.
//!
//! ```text
//! cargo run --example echo_server -- demo
//! ```

use peerlink::{Message, Server, ServerConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let name = std::env::args().nth(1).unwrap_or_else(|| "demo".to_owned());
    let mut server = Server::start(name, ServerConfig::default())
        .await
        .expect("failed to start server");

    loop {
        match server.read().await {
            Ok(Message::StatusChange(state)) => {
                tracing::info!(%state, "status changed");
            }
            Ok(Message::Payload { msg_type, payload }) => {
                tracing::info!(msg_type, len = payload.len(), "echoing payload");
                if let Err(e) = server.write(msg_type, payload).await {
                    tracing::warn!(error = %e, "failed to echo payload");
                }
            }
            Ok(Message::Error { kind, detail }) => {
                tracing::warn!(?kind, %detail, "peer reported an error");
            }
            Err(e) => {
                tracing::error!(error = %e, "server closed");
                break;
            }
        }
    }
}
