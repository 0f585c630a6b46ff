//! Frame I/O over an established connection, and the reader task shared by
//! both role engines: exactly one reader task and one writer task per
//! active connection.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::crypto::Session;
use crate::error::Error;
use crate::frame::{self, Decoded, LENGTH_PREFIX_LEN};
use crate::message::Message;

/// Reads one length-prefixed frame body from `reader` and decodes it,
/// rejecting a declared length over `max_wire_len` before allocating a
/// buffer for it.
pub(crate) async fn read_frame<R>(
    reader: &mut R,
    session: Option<&Session>,
    max_wire_len: usize,
) -> Result<Decoded, Error>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; LENGTH_PREFIX_LEN];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > max_wire_len {
        return Err(Error::Framing(format!(
            "incoming frame of {len} bytes exceeds the negotiated ceiling of {max_wire_len} bytes"
        )));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    frame::decode_body(&body, session)
}

/// Encodes and writes one frame, then flushes so the peer sees it promptly.
pub(crate) async fn write_frame<W>(
    writer: &mut W,
    msg_type: i32,
    payload: &[u8],
    session: Option<&Session>,
) -> Result<(), Error>
where
    W: AsyncWrite + Unpin,
{
    let body = frame::encode_body(msg_type, payload, session);
    writer
        .write_all(&(body.len() as u32).to_be_bytes())
        .await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Owns the read half of a connection for its whole lifetime. Forwards
/// application frames to `inbound_tx`, drops control frames silently, and
/// returns the error that ended it — either a genuine I/O/codec failure or
/// `Closed` if the owning peer handle was dropped out from under it.
///
/// The caller (the role engine's owner task) awaits this as a spawned
/// task's `JoinHandle`, which is how it learns the connection dropped.
pub(crate) async fn run_reader<R>(
    mut reader: R,
    session: Option<Session>,
    max_message_size: usize,
    inbound_tx: mpsc::Sender<Message>,
) -> Error
where
    R: AsyncRead + Unpin + Send,
{
    let ceiling = frame::wire_ceiling(max_message_size, session.is_some());
    loop {
        match read_frame(&mut reader, session.as_ref(), ceiling).await {
            Ok(Decoded::Payload { msg_type, payload }) => {
                if inbound_tx
                    .send(Message::Payload { msg_type, payload })
                    .await
                    .is_err()
                {
                    return Error::Closed;
                }
            }
            Ok(Decoded::Control) => continue,
            Err(e) => return e,
        }
    }
}
