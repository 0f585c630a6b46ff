//! ECDH(P-384) key exchange and an AES-256-GCM session.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use p384::ecdh::EphemeralSecret;
use p384::{EncodedPoint, PublicKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::Error;

/// Length of an uncompressed SEC1 point on P-384: a `0x04` tag followed by
/// two 48-byte coordinates.
pub const PUBLIC_KEY_LEN: usize = 97;

const NONCE_LEN: usize = 12;

/// One side's ephemeral key-exchange state, consumed by [`derive_session`](Self::derive_session).
pub struct KeyExchange {
    secret: EphemeralSecret,
    public_bytes: [u8; PUBLIC_KEY_LEN],
}

impl KeyExchange {
    /// Generates a fresh ephemeral P-384 keypair.
    #[must_use]
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random(&mut OsRng);
        let public = PublicKey::from(&secret);
        let encoded = public.to_encoded_point(false);
        let mut public_bytes = [0u8; PUBLIC_KEY_LEN];
        public_bytes.copy_from_slice(encoded.as_bytes());
        Self {
            secret,
            public_bytes,
        }
    }

    /// The uncompressed SEC1 encoding of this side's public point, sent to
    /// the peer on the wire as-is.
    #[must_use]
    pub fn public_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.public_bytes
    }

    /// Validates `peer_point` lies on P-384, runs ECDH, and keys an
    /// AES-256-GCM cipher from the SHA-256 of the shared x-coordinate.
    pub fn derive_session(self, peer_point: &[u8]) -> Result<Session, Error> {
        let encoded = EncodedPoint::from_bytes(peer_point)
            .map_err(|e| Error::BadKey(format!("malformed public point: {e}")))?;
        let peer_public: Option<PublicKey> = PublicKey::from_encoded_point(&encoded).into();
        let peer_public =
            peer_public.ok_or_else(|| Error::BadKey("peer point is not on curve P-384".into()))?;
        let shared = self.secret.diffie_hellman(&peer_public);
        let digest = Sha256::digest(shared.raw_secret_bytes().as_slice());
        let cipher = Aes256Gcm::new_from_slice(&digest)
            .map_err(|e| Error::BadKey(format!("failed to key AES-256-GCM: {e}")))?;
        Ok(Session { cipher })
    }
}

/// A keyed AES-256-GCM session for one connection. Not reused across
/// reconnects — a fresh [`KeyExchange`] runs on every handshake.
#[derive(Clone)]
pub struct Session {
    cipher: Aes256Gcm,
}

impl Session {
    /// Draws a fresh random 96-bit nonce, seals `plaintext`, and returns
    /// `nonce || ciphertext || tag`.
    #[must_use]
    pub fn seal(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let mut sealed = self
            .cipher
            .encrypt(nonce, plaintext)
            .expect("AES-256-GCM seal cannot fail for a well-formed key and plaintext");
        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.append(&mut sealed);
        out
    }

    /// Reverses [`seal`](Self::seal). Fails with `Decrypt` on truncated
    /// input, tampering, or a key mismatch.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, Error> {
        if sealed.len() < NONCE_LEN {
            return Err(Error::Decrypt);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| Error::Decrypt)
    }
}
