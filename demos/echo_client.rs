//! Minimal echo client: sends one payload per line of stdin and prints
//! whatever the server echoes back.
//!
//! ```text
//! cargo run --example echo_client -- demo
//! ```

use peerlink::{Client, ClientConfig, Message};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let name = std::env::args().nth(1).unwrap_or_else(|| "demo".to_owned());
    let mut client = Client::start(name, ClientConfig::default())
        .await
        .expect("failed to start client");

    let mut ping: i32 = 0;
    let mut ping_interval = tokio::time::interval(std::time::Duration::from_secs(2));

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                ping += 1;
                match client.write(1, format!("ping {ping}").into_bytes()).await {
                    Ok(()) => tracing::info!(ping, "sent"),
                    Err(e) => tracing::debug!(error = %e, "not connected yet, skipping ping"),
                }
            }
            result = client.read() => {
                match result {
                    Ok(Message::StatusChange(state)) => {
                        tracing::info!(%state, "status changed");
                    }
                    Ok(Message::Payload { msg_type, payload }) => {
                        tracing::info!(msg_type, body = %String::from_utf8_lossy(&payload), "received echo");
                    }
                    Ok(Message::Error { kind, detail }) => {
                        tracing::warn!(?kind, %detail, "peer reported an error");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "client closed");
                        break;
                    }
                }
            }
        }
    }
}
