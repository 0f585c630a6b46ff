//! Frame codec: `[len:u32 BE][type:i32 BE][payload]` on the wire, with the
//! `type`+`payload` portion optionally sealed under AES-256-GCM.

use bytes::Bytes;

use crate::crypto::Session;
use crate::error::Error;

/// Size of the outer length prefix, in bytes.
pub(crate) const LENGTH_PREFIX_LEN: usize = 4;

const TYPE_HEADER_LEN: usize = 4;

/// `msg_type` reserved for internal/control use. A plaintext frame bearing
/// it is consumed silently by the reader and never reaches the caller.
pub(crate) const RESERVED_CONTROL_TYPE: i32 = 0;

/// AES-256-GCM's fixed per-frame overhead: a 12-byte nonce plus a 16-byte tag.
const AEAD_OVERHEAD_LEN: usize = 12 + 16;

/// The maximum size a frame's *wire body* (after the outer length prefix,
/// before any decryption) may reach for a given application payload ceiling.
/// Used by the reader to reject an oversized incoming frame before it even
/// allocates a buffer for it.
pub(crate) fn wire_ceiling(max_message_size: usize, encrypted: bool) -> usize {
    max_message_size + TYPE_HEADER_LEN + if encrypted { AEAD_OVERHEAD_LEN } else { 0 }
}

/// The result of decoding a frame body (the bytes following the outer
/// length prefix), after any decryption.
pub(crate) enum Decoded {
    /// A reserved control frame; the caller drops it without surfacing it.
    Control,
    /// An application frame.
    Payload { msg_type: i32, payload: Bytes },
}

/// Builds the body that follows the outer length prefix: `type || payload`,
/// sealed under `session` when encryption is active. Total — never fails.
pub(crate) fn encode_body(msg_type: i32, payload: &[u8], session: Option<&Session>) -> Vec<u8> {
    let mut body = Vec::with_capacity(TYPE_HEADER_LEN + payload.len());
    body.extend_from_slice(&msg_type.to_be_bytes());
    body.extend_from_slice(payload);
    match session {
        Some(session) => session.seal(&body),
        None => body,
    }
}

/// Reverses [`encode_body`]: opens `body` under `session` if set, then
/// splits out the `msg_type` header. Fails with `Decrypt` on AEAD failure
/// and `Framing` if the plaintext is shorter than the type header.
pub(crate) fn decode_body(body: &[u8], session: Option<&Session>) -> Result<Decoded, Error> {
    let plain = match session {
        Some(session) => session.open(body)?,
        None => body.to_vec(),
    };
    if plain.len() < TYPE_HEADER_LEN {
        return Err(Error::Framing(format!(
            "frame body of {} bytes is shorter than the {}-byte type header",
            plain.len(),
            TYPE_HEADER_LEN
        )));
    }
    let (type_bytes, payload) = plain.split_at(TYPE_HEADER_LEN);
    let msg_type = i32::from_be_bytes(
        type_bytes
            .try_into()
            .expect("split_at(TYPE_HEADER_LEN) guarantees this slice is 4 bytes"),
    );
    if msg_type == RESERVED_CONTROL_TYPE {
        return Ok(Decoded::Control);
    }
    Ok(Decoded::Payload {
        msg_type,
        payload: Bytes::copy_from_slice(payload),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyExchange;

    fn session_pair() -> (Session, Session) {
        let a = KeyExchange::generate();
        let b = KeyExchange::generate();
        let a_public = *a.public_bytes();
        let b_public = *b.public_bytes();
        let session_a = a.derive_session(&b_public).unwrap();
        let session_b = b.derive_session(&a_public).unwrap();
        (session_a, session_b)
    }

    #[test]
    fn round_trips_plaintext() {
        let body = encode_body(7, b"hello", None);
        match decode_body(&body, None).unwrap() {
            Decoded::Payload { msg_type, payload } => {
                assert_eq!(msg_type, 7);
                assert_eq!(&payload[..], b"hello");
            }
            Decoded::Control => panic!("expected payload"),
        }
    }

    #[test]
    fn round_trips_encrypted() {
        let (sender, receiver) = session_pair();
        let body = encode_body(3, b"secret", Some(&sender));
        match decode_body(&body, Some(&receiver)).unwrap() {
            Decoded::Payload { msg_type, payload } => {
                assert_eq!(msg_type, 3);
                assert_eq!(&payload[..], b"secret");
            }
            Decoded::Control => panic!("expected payload"),
        }
    }

    #[test]
    fn drops_reserved_control_type_silently() {
        let body = encode_body(RESERVED_CONTROL_TYPE, b"", None);
        assert!(matches!(decode_body(&body, None).unwrap(), Decoded::Control));
    }

    #[test]
    fn rejects_short_plaintext_body() {
        let err = decode_body(&[0u8; 2], None).unwrap_err();
        assert_eq!(err.kind(), crate::error::Kind::Framing);
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let (sender, receiver) = session_pair();
        let mut body = encode_body(1, b"hello", Some(&sender));
        let last = body.len() - 1;
        body[last] ^= 0xFF;
        let err = decode_body(&body, Some(&receiver)).unwrap_err();
        assert_eq!(err.kind(), crate::error::Kind::Decrypt);
    }
}
