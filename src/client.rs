//! The client role engine: a dialer task that owns the connect and
//! reconnect loop, an owner task that doubles as the writer, and a reader
//! task per active connection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
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

/// A dialing client peer. Connects once at `start`, then auto-reconnects
/// (fresh handshake, fresh session, no retransmission of stale outbound
/// frames) whenever the connection drops, until `close()` or `timeout`.
pub struct Client {
    inbound_rx: mpsc::Receiver<Message>,
    outbound_tx: mpsc::Sender<(i32, Bytes)>,
    status: Arc<Mutex<Status>>,
    shutdown: CancellationToken,
    max_message_size: Arc<AtomicUsize>,
}

impl Client {
    /// Spawns the dialer and owner tasks and returns immediately; the first
    /// `StatusChange("connecting")` arrives on `read()` shortly after.
    pub async fn start(name: impl Into<String>, config: ClientConfig) -> Result<Self, Error> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidName);
        }

        let status = Arc::new(Mutex::new(Status::NotConnected));
        let shutdown = CancellationToken::new();
        let max_message_size = Arc::new(AtomicUsize::new(0));

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (conn_tx, conn_rx) = mpsc::channel(CONN_EVENT_CAPACITY);

        tokio::spawn(run_dialer(
            name.clone(),
            config.clone(),
            conn_tx.clone(),
            shutdown.clone(),
        ));
        tokio::spawn(run_owner(
            name,
            config,
            Arc::clone(&status),
            Arc::clone(&max_message_size),
            inbound_tx,
            outbound_rx,
            conn_rx,
            conn_tx,
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
    /// the peer has fully torn down (explicit close, or dial timeout) and no
    /// further messages will arrive.
    pub async fn read(&mut self) -> Result<Message, Error> {
        self.inbound_rx.recv().await.ok_or(Error::Closed)
    }

    /// Enqueues `payload` under `msg_type` for the server.
    /// Fails fast, without touching the outbound channel, if the peer isn't
    /// currently `Connected`, if `msg_type` is the reserved control type, or
    /// if `payload` exceeds the negotiated maximum size.
    pub async fn write(&self, msg_type: i32, payload: impl Into<Bytes>) -> Result<(), Error> {
        if msg_type == RESERVED_CONTROL_TYPE {
            return Err(Error::ReservedType);
        }
        let current = *self.status.lock();
        if current != Status::Connected {
            return Err(Error::NotConnected(current.to_string()));
        }
        let payload = payload.into();
        let max_message_size = self.max_message_size.load(Ordering::Relaxed);
        if payload.len() > max_message_size {
            return Err(Error::TooLarge {
                len: payload.len(),
                max: max_message_size,
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
    Connected {
        read_half: ReadHalf<Stream>,
        write_half: WriteHalf<Stream>,
        session: Option<Session>,
        max_message_size: usize,
    },
    DialError(Error),
    TimedOut,
}

/// Runs the connect-or-reconnect loop for one connection lifetime: dials,
/// retries at `retry_interval` on a non-fatal refusal, surfaces any other
/// dial/handshake error without breaking the loop, and gives up at
/// `timeout`. Returns once connected, timed out, or asked to shut down.
async fn run_dialer(
    name: String,
    config: ClientConfig,
    conn_tx: mpsc::Sender<ConnEvent>,
    shutdown: CancellationToken,
) {
    let retry_interval = Duration::from_secs(config.effective_retry_interval_secs());
    let deadline = (config.timeout_secs > 0)
        .then(|| Instant::now() + Duration::from_secs(config.timeout_secs));

    loop {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                let _ = conn_tx.send(ConnEvent::TimedOut).await;
                return;
            }
        }

        let attempt = dial_and_handshake(&name, &config);
        tokio::select! {
            () = shutdown.cancelled() => return,
            result = attempt => {
                match result {
                    Ok((read_half, write_half, session, max_message_size)) => {
                        let event = ConnEvent::Connected { read_half, write_half, session, max_message_size };
                        let _ = conn_tx.send(event).await;
                        return;
                    }
                    Err(e) if is_benign_dial_error(&e) => {
                        tracing::trace!(peer = %name, "endpoint not available yet, retrying");
                    }
                    Err(e) => {
                        tracing::warn!(peer = %name, error = %e, "dial/handshake failed, still retrying");
                        if conn_tx.send(ConnEvent::DialError(e)).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }

        tokio::select! {
            () = shutdown.cancelled() => return,
            () = tokio::time::sleep(retry_interval) => {}
        }
    }
}

type DialOutcome = (ReadHalf<Stream>, WriteHalf<Stream>, Option<Session>, usize);

async fn dial_and_handshake(name: &str, config: &ClientConfig) -> Result<DialOutcome, Error> {
    let mut stream = transport::connect(name).await?;
    let outcome = handshake::run_client(&mut stream, config).await?;
    let (read_half, write_half) = tokio::io::split(stream);
    Ok((
        read_half,
        write_half,
        outcome.session,
        outcome.max_message_size,
    ))
}

/// Whether a dial failure is just "the endpoint doesn't exist yet" (no
/// listener bound, or one that hasn't caught up after a restart) — a
/// non-fatal, retry-silently case, as opposed to a surprising transport
/// error worth surfacing.
fn is_benign_dial_error(e: &Error) -> bool {
    matches!(
        e,
        Error::Transport(io_err)
            if matches!(
                io_err.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
            )
    )
}

#[allow(clippy::too_many_arguments)]
async fn run_owner(
    name: String,
    config: ClientConfig,
    status: Arc<Mutex<Status>>,
    max_message_size: Arc<AtomicUsize>,
    inbound_tx: mpsc::Sender<Message>,
    mut outbound_rx: mpsc::Receiver<(i32, Bytes)>,
    mut conn_rx: mpsc::Receiver<ConnEvent>,
    conn_tx: mpsc::Sender<ConnEvent>,
    shutdown: CancellationToken,
) {
    let mut write_half: Option<WriteHalf<Stream>> = None;
    let mut session: Option<Session> = None;
    let mut reader_handle: Option<JoinHandle<Error>> = None;

    // Dialing begins unconditionally as soon as the peer starts, so this
    // transition doesn't wait on a confirmation event from the dialer task.
    set_status(&status, &inbound_tx, Status::Connecting).await;

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
                    ConnEvent::Connected { read_half, write_half: new_write_half, session: new_session, max_message_size: new_max } => {
                        // Anything enqueued before this connection existed is stale.
                        while outbound_rx.try_recv().is_ok() {}
                        max_message_size.store(new_max, Ordering::Relaxed);
                        write_half = Some(new_write_half);
                        session = new_session.clone();
                        reader_handle = Some(tokio::spawn(connection::run_reader(
                            read_half,
                            new_session,
                            new_max,
                            inbound_tx.clone(),
                        )));
                        set_status(&status, &inbound_tx, Status::Connected).await;
                    }
                    ConnEvent::DialError(e) => {
                        let _ = inbound_tx.send(Message::Error { kind: e.kind(), detail: e.to_string() }).await;
                    }
                    ConnEvent::TimedOut => {
                        set_status(&status, &inbound_tx, Status::Timeout).await;
                        let _ = inbound_tx.send(Message::Error { kind: Kind::Timeout, detail: Error::Timeout.to_string() }).await;
                        return;
                    }
                }
            }

            Some((msg_type, payload)) = outbound_rx.recv() => {
                if let Some(w) = write_half.as_mut() {
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
                tracing::debug!(error = %e, "reader ended, reconnecting");
                set_status(&status, &inbound_tx, Status::ReConnecting).await;
                let _ = inbound_tx.send(Message::Error { kind: e.kind(), detail: e.to_string() }).await;
                tokio::spawn(run_dialer(
                    name.clone(),
                    config.clone(),
                    conn_tx.clone(),
                    shutdown.clone(),
                ));
            }
        }
    }
}

async fn set_status(status: &Mutex<Status>, inbound_tx: &mpsc::Sender<Message>, new: Status) {
    *status.lock() = new;
    let _ = inbound_tx.send(Message::StatusChange(new)).await;
}
