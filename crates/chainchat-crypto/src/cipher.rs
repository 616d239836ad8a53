//! Hybrid ECIES-style encryption for direct messages.
//! P-256 ephemeral-static ECDH + AES-256-GCM.
//!
//! Envelope layout (hex-encoded for transport):
//!
//! ```text
//! ephemeral public key (65, uncompressed SEC1) || nonce (12) || ciphertext || tag (16)
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{AffinePoint, NonZeroScalar, PublicKey, SecretKey};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::hash::sha256_concat;
use crate::keys::{decode_private_key, decode_public_key, KeyError};

/// Length of the uncompressed SEC1 ephemeral point.
pub const EPHEMERAL_KEY_LEN: usize = 65;
/// AES-GCM nonce length.
pub const NONCE_LEN: usize = 12;
/// AES-GCM authentication tag length.
pub const TAG_LEN: usize = 16;
/// Shortest byte string that can still be an envelope header.
pub const HEADER_LEN: usize = EPHEMERAL_KEY_LEN + NONCE_LEN;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("invalid ephemeral public key")]
    InvalidEphemeralKey,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("key agreement produced the point at infinity")]
    KeyAgreement,
    #[error("decrypted plaintext is not valid UTF-8")]
    InvalidPlaintext,
}

/// How the AES key is taken from the ECDH shared point.
///
/// Both parties must use the same variant; the envelope does not record it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyDerivation {
    /// The 32-byte big-endian x-coordinate of the shared point, used as is.
    #[default]
    RawX,
    /// SHA-256(x || y) of the shared point.
    Sha256Coordinates,
}

impl KeyDerivation {
    fn derive(self, shared: &AffinePoint) -> Result<Zeroizing<[u8; 32]>, CipherError> {
        let encoded = shared.to_encoded_point(false);
        let x = encoded.x().ok_or(CipherError::KeyAgreement)?;

        let mut key = Zeroizing::new([0u8; 32]);
        match self {
            KeyDerivation::RawX => key.copy_from_slice(x),
            KeyDerivation::Sha256Coordinates => {
                let y = encoded.y().ok_or(CipherError::KeyAgreement)?;
                *key = sha256_concat([x.as_slice(), y.as_slice()]);
            }
        }
        Ok(key)
    }
}

/// A parsed envelope. Construction guarantees at least one ciphertext byte
/// after the header.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    bytes: Vec<u8>,
}

impl EncryptedEnvelope {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CipherError> {
        if bytes.len() < HEADER_LEN {
            return Err(CipherError::MalformedEnvelope(format!(
                "envelope is {} bytes, header needs {}",
                bytes.len(),
                HEADER_LEN
            )));
        }
        // A bare header means the ciphertext was cut off, not an empty message:
        // even an empty plaintext carries its tag.
        if bytes.len() == HEADER_LEN {
            return Err(CipherError::MalformedEnvelope("no ciphertext found".into()));
        }
        Ok(Self { bytes })
    }

    pub fn from_hex(text: &str) -> Result<Self, CipherError> {
        let bytes = hex::decode(text.trim())
            .map_err(|e| CipherError::MalformedEnvelope(format!("envelope is not hex: {e}")))?;
        Self::from_bytes(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn ephemeral_key(&self) -> &[u8] {
        &self.bytes[..EPHEMERAL_KEY_LEN]
    }

    pub fn nonce(&self) -> &[u8] {
        &self.bytes[EPHEMERAL_KEY_LEN..HEADER_LEN]
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.bytes[HEADER_LEN..]
    }
}

impl std::fmt::Debug for EncryptedEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedEnvelope")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Seals and opens envelopes under one fixed key derivation.
#[derive(Debug, Clone, Copy, Default)]
pub struct HybridCipher {
    derivation: KeyDerivation,
}

impl HybridCipher {
    pub fn new(derivation: KeyDerivation) -> Self {
        Self { derivation }
    }

    pub fn derivation(&self) -> KeyDerivation {
        self.derivation
    }

    /// Seal `plaintext` to `recipient`.
    ///
    /// A fresh ephemeral scalar and a fresh random nonce are drawn for every
    /// call, so a (key, nonce) pair is never reused.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        recipient: &PublicKey,
    ) -> Result<EncryptedEnvelope, CipherError> {
        let ephemeral = NonZeroScalar::random(&mut OsRng);
        let ephemeral_pub = PublicKey::from_secret_scalar(&ephemeral);

        let shared = shared_point(&ephemeral, recipient);
        let key = self.derivation.derive(&shared)?;

        let mut nonce = [0u8; NONCE_LEN];
        getrandom::getrandom(&mut nonce).map_err(|_| CipherError::EncryptionFailed)?;

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));
        let ct = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CipherError::EncryptionFailed)?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + ct.len());
        bytes.extend_from_slice(ephemeral_pub.to_encoded_point(false).as_bytes());
        bytes.extend_from_slice(&nonce);
        bytes.extend_from_slice(&ct);

        EncryptedEnvelope::from_bytes(bytes)
    }

    /// Open an envelope with the recipient's private scalar.
    ///
    /// Tag mismatch from tampering, truncation or the wrong key all surface as
    /// `DecryptionFailed`; no partial plaintext is ever returned.
    pub fn decrypt(
        &self,
        envelope: &EncryptedEnvelope,
        recipient: &SecretKey,
    ) -> Result<Vec<u8>, CipherError> {
        let ephemeral_pub = PublicKey::from_sec1_bytes(envelope.ephemeral_key())
            .map_err(|_| CipherError::InvalidEphemeralKey)?;

        let shared = shared_point(&recipient.to_nonzero_scalar(), &ephemeral_pub);
        let key = self.derivation.derive(&shared)?;

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));
        cipher
            .decrypt(Nonce::from_slice(envelope.nonce()), envelope.ciphertext())
            .map_err(|_| CipherError::DecryptionFailed)
    }

    /// Text form of [`encrypt`](Self::encrypt): encoded recipient key in, hex envelope out.
    pub fn encrypt_text(&self, plaintext: &str, recipient_public: &str) -> Result<String, CipherError> {
        let recipient = decode_public_key(recipient_public)?;
        Ok(self.encrypt(plaintext.as_bytes(), &recipient)?.to_hex())
    }

    /// Text form of [`decrypt`](Self::decrypt): hex envelope and encoded private key in.
    pub fn decrypt_text(&self, envelope_hex: &str, recipient_private: &str) -> Result<String, CipherError> {
        let secret = decode_private_key(recipient_private)?;
        let envelope = EncryptedEnvelope::from_hex(envelope_hex)?;
        let plaintext = self.decrypt(&envelope, &secret)?;
        String::from_utf8(plaintext).map_err(|_| CipherError::InvalidPlaintext)
    }
}

fn shared_point(scalar: &NonZeroScalar, point: &PublicKey) -> AffinePoint {
    (point.to_projective() * **scalar).to_affine()
}
