//! The server role engine: an acceptor task, an owner task that doubles as
//! the writer, and a reader task per active connection.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::connection;
use crate::crypto::Session;
use crate::error::{Error, Kind};
use crate::frame::RESERVED_CONTROL_TYPE;
use crate::handshake;
use crate::message::Message;
use crate::status::Status;
use crate::transport::{self, Stream};

const INBOUND_CAPACITY: usize = 32;
const OUTBOUND_CAPACITY: usize = 32;
const CONN_EVENT_CAPACITY: usize = 4;

/// A bound, listening server peer. Accepts exactly one connected client at
/// a time and re-accepts after a drop.
pub struct Server {
    inbound_rx: mpsc::Receiver<Message>,
    outbound_tx: mpsc::Sender<(i32, Bytes)>,
    status: Arc<Mutex<Status>>,
    shutdown: CancellationToken,
    max_message_size: usize,
}

impl Server {
    /// Binds `name` and starts accepting. Returns immediately; the acceptor
    /// and owner tasks run in the background, and the first `StatusChange`
    /// arrives on `read()` once the endpoint is actually listening.
    pub async fn start(name: impl Into<String>, config: ServerConfig) -> Result<Self, Error> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidName);
        }

        let status = Arc::new(Mutex::new(Status::NotConnected));
        let shutdown = CancellationToken::new();
        let max_message_size = config.effective_max_message_size();

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (conn_tx, conn_rx) = mpsc::channel(CONN_EVENT_CAPACITY);

        tokio::spawn(run_acceptor(
            name,
            config.clone(),
            conn_tx,
            shutdown.clone(),
        ));
        tokio::spawn(run_owner(
            Arc::clone(&status),
            max_message_size,
            inbound_tx,
            outbound_rx,
            conn_rx,
            shutdown.clone(),
        ));

        Ok(Self {
            inbound_rx,
            outbound_tx,
            status,
            shutdown,
            max_message_size,
        })
    }

    /// Blocks until the next [`Message`]. Returns `Err(Error::Closed)` once
    /// the peer has fully torn down and no further messages will arrive.
    pub async fn read(&mut self) -> Result<Message, Error> {
        self.inbound_rx.recv().await.ok_or(Error::Closed)
    }

    /// Enqueues `payload` under `msg_type` for the connected client.
    /// Fails fast, without touching the outbound channel, if the peer
    /// isn't currently `Connected`, if `msg_type` is the reserved control
    /// type, or if `payload` exceeds the negotiated maximum size.
    pub async fn write(&self, msg_type: i32, payload: impl Into<Bytes>) -> Result<(), Error> {
        if msg_type == RESERVED_CONTROL_TYPE {
            return Err(Error::ReservedType);
        }
        let current = *self.status.lock();
        if current != Status::Connected {
            return Err(Error::NotConnected(current.to_string()));
        }
        let payload = payload.into();
        if payload.len() > self.max_message_size {
            return Err(Error::TooLarge {
                len: payload.len(),
                max: self.max_message_size,
            });
        }
        self.outbound_tx
            .send((msg_type, payload))
            .await
            .map_err(|_| Error::Closed)
    }

    /// A cheap, non-blocking snapshot of the current lifecycle state.
    #[must_use]
    pub fn status(&self) -> Status {
        *self.status.lock()
    }

    /// Requests teardown. Asynchronous: the final `StatusChange(Closed)`
    /// arrives on a subsequent `read()`, after which `read()` returns
    /// `Err(Error::Closed)`.
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

enum ConnEvent {
    Listening,
    Connected {
        read_half: ReadHalf<Stream>,
        write_half: WriteHalf<Stream>,
        session: Option<Session>,
    },
    HandshakeFailed(Error),
    ListenerDied(Error),
    ListenerTimedOut,
}

async fn run_acceptor(
    name: String,
    config: ServerConfig,
    conn_tx: mpsc::Sender<ConnEvent>,
    shutdown: CancellationToken,
) {
    let mut listener = match transport::Listener::bind(&name, config.unmask_permissions).await {
        Ok(listener) => listener,
        Err(e) => {
            let _ = conn_tx.send(ConnEvent::ListenerDied(e)).await;
            return;
        }
    };
    if conn_tx.send(ConnEvent::Listening).await.is_err() {
        return;
    }

    loop {
        let accept = listener.accept();
        let accepted = tokio::select! {
            () = shutdown.cancelled() => return,
            res = bound_by_timeout(config.timeout_secs, accept) => res,
        };

        let stream = match accepted {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                let _ = conn_tx.send(ConnEvent::ListenerDied(e)).await;
                return;
            }
            Err(_elapsed) => {
                let _ = conn_tx.send(ConnEvent::ListenerTimedOut).await;
                return;
            }
        };

        let mut stream = stream;
        match handshake::run_server(&mut stream, &config).await {
            Ok(outcome) => {
                let (read_half, write_half) = tokio::io::split(stream);
                let event = ConnEvent::Connected {
                    read_half,
                    write_half,
                    session: outcome.session,
                };
                if conn_tx.send(event).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(peer = %name, error = %e, "handshake failed, still accepting");
                if conn_tx.send(ConnEvent::HandshakeFailed(e)).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Wraps `fut` in a deadline when `secs` is nonzero, matching the server's
/// `timeout_secs` bounding how long the acceptor waits for the next peer.
async fn bound_by_timeout<F, T>(secs: u64, fut: F) -> Result<T, tokio::time::error::Elapsed>
where
    F: std::future::Future<Output = T>,
{
    if secs == 0 {
        Ok(fut.await)
    } else {
        tokio::time::timeout(Duration::from_secs(secs), fut).await
    }
}

async fn run_owner(
    status: Arc<Mutex<Status>>,
    max_message_size: usize,
    inbound_tx: mpsc::Sender<Message>,
    mut outbound_rx: mpsc::Receiver<(i32, Bytes)>,
    mut conn_rx: mpsc::Receiver<ConnEvent>,
    shutdown: CancellationToken,
) {
    let mut write_half: Option<WriteHalf<Stream>> = None;
    let mut session: Option<Session> = None;
    let mut reader_handle: Option<JoinHandle<Error>> = None;

    loop {
        let reader_wait = async {
            match reader_handle.as_mut() {
                Some(handle) => handle.await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;

            () = shutdown.cancelled() => {
                set_status(&status, &inbound_tx, Status::Closing).await;
                if let Some(handle) = reader_handle.take() {
                    handle.abort();
                }
                write_half = None;
                session = None;
                let _ = inbound_tx
                    .send(Message::Error { kind: Kind::Closed, detail: Error::Closed.to_string() })
                    .await;
                set_status(&status, &inbound_tx, Status::Closed).await;
                return;
            }

            Some(event) = conn_rx.recv() => {
                match event {
                    ConnEvent::Listening => {
                        set_status(&status, &inbound_tx, Status::Listening).await;
                    }
                    ConnEvent::Connected { read_half, write_half: new_write_half, session: new_session } => {
                        if write_half.is_some() {
                            tracing::warn!("rejecting extra connection attempt while already connected");
                            drop(read_half);
                            drop(new_write_half);
                            continue;
                        }
                        // Anything enqueued before this connection existed is stale.
                        while outbound_rx.try_recv().is_ok() {}
                        write_half = Some(new_write_half);
                        session = new_session.clone();
                        reader_handle = Some(tokio::spawn(connection::run_reader(
                            read_half,
                            new_session,
                            max_message_size,
                            inbound_tx.clone(),
                        )));
                        set_status(&status, &inbound_tx, Status::Connected).await;
                    }
                    ConnEvent::HandshakeFailed(e) => {
                        let _ = inbound_tx.send(Message::Error { kind: e.kind(), detail: e.to_string() }).await;
                    }
                    ConnEvent::ListenerDied(e) => {
                        set_status(&status, &inbound_tx, Status::Error).await;
                        let _ = inbound_tx.send(Message::Error { kind: e.kind(), detail: e.to_string() }).await;
                        return;
                    }
                    ConnEvent::ListenerTimedOut => {
                        set_status(&status, &inbound_tx, Status::Timeout).await;
                        let _ = inbound_tx
                            .send(Message::Error {
                                kind: Kind::Timeout,
                                detail: Error::Timeout.to_string(),
                            })
                            .await;
                        return;
                    }
                }
            }

            Some((msg_type, payload)) = outbound_rx.recv() => {
                if let Some(w) = write_half.as_mut() {
                    // A per-frame write/encrypt failure is logged and the frame is
                    // skipped; the connection isn't torn down here. If the connection
                    // is actually dead, the reader's next read error will drive the
                    // Disconnected transition.
                    if let Err(e) = connection::write_frame(w, msg_type, &payload, session.as_ref()).await {
                        tracing::warn!(error = %e, "write failed, skipping frame");
                    }
                }
            }

            result = reader_wait, if reader_handle.is_some() => {
                reader_handle = None;
                write_half = None;
                session = None;
                let e = result.unwrap_or(Error::Closed);
                tracing::debug!(error = %e, "reader ended, peer disconnected");
                set_status(&status, &inbound_tx, Status::Disconnected).await;
                let _ = inbound_tx.send(Message::Error { kind: e.kind(), detail: e.to_string() }).await;
            }
        }
    }
}

async fn set_status(status: &Mutex<Status>, inbound_tx: &mpsc::Sender<Message>, new: Status) {
    *status.lock() = new;
    let _ = inbound_tx.send(Message::StatusChange(new)).await;
}
