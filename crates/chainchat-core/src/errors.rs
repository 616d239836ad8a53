//! Error types for the messaging pipeline.
//!
//! Every cryptographic failure is terminal for the Send or Receive call that
//! hit it. Only `BlobStore` and `Ledger` errors ever went through a retry loop,
//! and they arrive here after the policy gave up.

use thiserror::Error;

use chainchat_crypto::{CipherError, KeyError, SignatureError};

use crate::keyfile::KeyFileError;
use crate::store::StoreError;

/// Failure of a whole Send or Receive call.
#[derive(Debug, Error)]
pub enum MessagingError {
    // ------------------------------------------------------------------------
    // Key codec
    // ------------------------------------------------------------------------
    #[error("malformed key: {0}")]
    MalformedKey(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    // ------------------------------------------------------------------------
    // Envelope
    // ------------------------------------------------------------------------
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("invalid ephemeral public key in envelope")]
    InvalidEphemeralKey,

    /// AEAD tag mismatch: tampering, truncation or the wrong key.
    #[error("decryption failed")]
    DecryptionFailed,

    #[error("decrypted plaintext is not valid UTF-8")]
    InvalidPlaintext,

    // ------------------------------------------------------------------------
    // Signatures
    // ------------------------------------------------------------------------
    #[error("invalid signature format: {0}")]
    InvalidSignatureFormat(String),

    #[error("signature verification failed for message {index} from {sender}")]
    SignatureVerificationFailed { index: usize, sender: String },

    // ------------------------------------------------------------------------
    // Participation
    // ------------------------------------------------------------------------
    /// The message is not between the caller and the named counterparty.
    #[error("message {index} is not between the caller and the counterparty")]
    NotAParticipant { index: usize },

    /// The caller sent message `index` but no copy was sealed to them.
    #[error("no envelope addressed to the caller for message {index}")]
    KeyUnavailable { index: usize },

    // ------------------------------------------------------------------------
    // External platforms
    // ------------------------------------------------------------------------
    #[error("blob store error: {0}")]
    BlobStore(#[source] StoreError),

    #[error("ledger error: {0}")]
    Ledger(#[source] StoreError),

    #[error(transparent)]
    KeyFile(#[from] KeyFileError),

    /// RNG or primitive failure that is neither a key nor an envelope problem.
    #[error("cryptographic operation failed: {0}")]
    Crypto(String),
}

impl From<KeyError> for MessagingError {
    fn from(e: KeyError) -> Self {
        match e {
            KeyError::MalformedKey(m) => MessagingError::MalformedKey(m),
            KeyError::InvalidKey(m) => MessagingError::InvalidKey(m),
            KeyError::Encoding(m) => MessagingError::Crypto(m),
        }
    }
}

impl From<CipherError> for MessagingError {
    fn from(e: CipherError) -> Self {
        match e {
            CipherError::Key(k) => k.into(),
            CipherError::MalformedEnvelope(m) => MessagingError::MalformedEnvelope(m),
            CipherError::InvalidEphemeralKey => MessagingError::InvalidEphemeralKey,
            CipherError::DecryptionFailed => MessagingError::DecryptionFailed,
            CipherError::InvalidPlaintext => MessagingError::InvalidPlaintext,
            other @ (CipherError::EncryptionFailed | CipherError::KeyAgreement) => {
                MessagingError::Crypto(other.to_string())
            }
        }
    }
}

impl From<SignatureError> for MessagingError {
    fn from(e: SignatureError) -> Self {
        match e {
            SignatureError::Key(k) => k.into(),
            SignatureError::InvalidSignatureFormat(m) => MessagingError::InvalidSignatureFormat(m),
            SignatureError::SigningFailed => MessagingError::Crypto("signing failed".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cipher_errors_keep_their_kind() {
        assert!(matches!(
            MessagingError::from(CipherError::DecryptionFailed),
            MessagingError::DecryptionFailed
        ));
        assert!(matches!(
            MessagingError::from(CipherError::Key(KeyError::MalformedKey("x".into()))),
            MessagingError::MalformedKey(_)
        ));
        assert!(matches!(
            MessagingError::from(CipherError::MalformedEnvelope("short".into())),
            MessagingError::MalformedEnvelope(_)
        ));
    }

    #[test]
    fn test_signature_errors_keep_their_kind() {
        assert!(matches!(
            MessagingError::from(SignatureError::InvalidSignatureFormat("1".into())),
            MessagingError::InvalidSignatureFormat(_)
        ));
        assert!(matches!(
            MessagingError::from(SignatureError::Key(KeyError::InvalidKey("off curve".into()))),
            MessagingError::InvalidKey(_)
        ));
    }

    #[test]
    fn test_display_names_the_message() {
        let e = MessagingError::SignatureVerificationFailed {
            index: 2,
            sender: "abcd".into(),
        };
        assert_eq!(
            e.to_string(),
            "signature verification failed for message 2 from abcd"
        );
    }
}
