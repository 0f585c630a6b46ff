//! The three-step handshake: version/encryption-policy exchange,
//! directional ECDH key exchange, and the negotiated max-message-size blob.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::{ClientConfig, ServerConfig, PROTOCOL_VERSION};
use crate::crypto::{KeyExchange, Session, PUBLIC_KEY_LEN};
use crate::error::Error;

/// What a completed handshake hands back to the connection that ran it.
pub(crate) struct Outcome {
    pub(crate) session: Option<Session>,
    pub(crate) max_message_size: usize,
}

const REPLY_OK: u8 = 0;
const REPLY_VERSION_MISMATCH: u8 = 1;
const REPLY_ENCRYPTION_POLICY: u8 = 2;

/// A handshake blob (the negotiated max-message-size, currently) can't
/// plausibly exceed this — guards against reading an absurd length from a
/// misbehaving or non-protocol peer.
const MAX_HANDSHAKE_BLOB_LEN: usize = 256;

/// Runs Step 1–3 from the server's side: offer version + encryption, read
/// the client's reply, optionally exchange keys (server's point first), then
/// send the max message size.
pub(crate) async fn run_server<S>(stream: &mut S, config: &ServerConfig) -> Result<Outcome, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(&[PROTOCOL_VERSION, config.encryption as u8])
        .await?;

    let mut reply = [0u8; 1];
    stream.read_exact(&mut reply).await?;
    match reply[0] {
        REPLY_OK => {}
        REPLY_VERSION_MISMATCH => return Err(Error::VersionMismatch),
        REPLY_ENCRYPTION_POLICY => {
            return Err(Error::EncryptionPolicy(
                "client requires encryption but this server does not offer it".into(),
            ))
        }
        other => {
            return Err(Error::Framing(format!(
                "unexpected handshake reply byte {other}"
            )))
        }
    }

    let session = if config.encryption {
        Some(exchange_keys(stream, true).await?)
    } else {
        None
    };

    let max_message_size = config.effective_max_message_size();
    send_max_message_size(stream, max_message_size, session.as_ref()).await?;

    let mut ack = [0u8; 1];
    stream.read_exact(&mut ack).await?;
    if ack[0] != REPLY_OK {
        return Err(Error::Framing(format!(
            "unexpected max-message-size ack byte {}",
            ack[0]
        )));
    }

    Ok(Outcome {
        session,
        max_message_size,
    })
}

/// Runs Step 1–3 from the client's side: read the server's version and
/// encryption offer, check policy, optionally exchange keys (client reads
/// the server's point first), then read and ack the max message size.
pub(crate) async fn run_client<S>(stream: &mut S, config: &ClientConfig) -> Result<Outcome, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut offer = [0u8; 2];
    stream.read_exact(&mut offer).await?;
    let (server_version, server_offers_encryption) = (offer[0], offer[1] != 0);

    if server_version != PROTOCOL_VERSION {
        stream.write_all(&[REPLY_VERSION_MISMATCH]).await?;
        return Err(Error::VersionMismatch);
    }
    if !server_offers_encryption && config.encryption {
        stream.write_all(&[REPLY_ENCRYPTION_POLICY]).await?;
        return Err(Error::EncryptionPolicy(
            "server does not offer encryption but this client requires it".into(),
        ));
    }
    stream.write_all(&[REPLY_OK]).await?;

    let session = if server_offers_encryption {
        Some(exchange_keys(stream, false).await?)
    } else {
        None
    };

    let max_message_size = read_max_message_size(stream, session.as_ref()).await?;
    stream.write_all(&[REPLY_OK]).await?;

    Ok(Outcome {
        session,
        max_message_size,
    })
}

/// Exchanges uncompressed P-384 public points. The server's side sends
/// first; the client's side reads first — this ordering, not a role check,
/// is what the function takes as a parameter so both call sites read the
/// same way the wire actually behaves.
async fn exchange_keys<S>(stream: &mut S, sends_first: bool) -> Result<Session, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let kx = KeyExchange::generate();
    let peer_point = if sends_first {
        stream.write_all(kx.public_bytes()).await?;
        let mut peer = [0u8; PUBLIC_KEY_LEN];
        stream.read_exact(&mut peer).await?;
        peer
    } else {
        let mut peer = [0u8; PUBLIC_KEY_LEN];
        stream.read_exact(&mut peer).await?;
        stream.write_all(kx.public_bytes()).await?;
        peer
    };
    kx.derive_session(&peer_point)
}

async fn send_max_message_size<S>(
    stream: &mut S,
    size: usize,
    session: Option<&Session>,
) -> Result<(), Error>
where
    S: AsyncWrite + Unpin,
{
    let body = (size as u32).to_be_bytes();
    let blob = match session {
        Some(session) => session.seal(&body),
        None => body.to_vec(),
    };
    stream.write_all(&(blob.len() as u32).to_be_bytes()).await?;
    stream.write_all(&blob).await?;
    Ok(())
}

async fn read_max_message_size<S>(
    stream: &mut S,
    session: Option<&Session>,
) -> Result<usize, Error>
where
    S: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len == 0 || len > MAX_HANDSHAKE_BLOB_LEN {
        return Err(Error::Framing(format!(
            "implausible max-message-size blob length {len}"
        )));
    }
    let mut blob = vec![0u8; len];
    stream.read_exact(&mut blob).await?;
    let body = match session {
        Some(session) => session.open(&blob)?,
        None => blob,
    };
    if body.len() != 4 {
        return Err(Error::Framing(format!(
            "max-message-size body is {} bytes, expected 4",
            body.len()
        )));
    }
    Ok(u32::from_be_bytes(
        body.try_into()
            .expect("checked body.len() == 4 above"),
    ) as usize)
}
