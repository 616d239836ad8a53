//! chainchat CLI
//!
//! - Key generation and key files
//! - Chat id computation
//! - One-shot encrypt, decrypt, sign and verify
//! - A local send/receive demo over in-memory stores

pub mod cli;
pub mod config;
pub mod output;

pub use cli::Cli;
pub use config::Config;
pub use output::{OutputFormat, OutputFormatter};

use chainchat_core::{KeyFileError, MessagingError};
use chainchat_crypto::{CipherError, KeyError, SignatureError};

/// Process exit codes:
/// - 0: success
/// - 1: general error
/// - 2: verification failed (bad signature, AEAD tag mismatch)
/// - 3: invalid input (malformed key, envelope or signature text)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    VerificationFailed = 2,
    InvalidInput = 3,
}

impl ExitCode {
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    /// Classify a failed command by the first recognised cause.
    pub fn for_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(e) = cause.downcast_ref::<MessagingError>() {
                return match e {
                    MessagingError::DecryptionFailed
                    | MessagingError::SignatureVerificationFailed { .. } => ExitCode::VerificationFailed,
                    MessagingError::MalformedKey(_)
                    | MessagingError::InvalidKey(_)
                    | MessagingError::MalformedEnvelope(_)
                    | MessagingError::InvalidEphemeralKey
                    | MessagingError::InvalidSignatureFormat(_) => ExitCode::InvalidInput,
                    _ => ExitCode::GeneralError,
                };
            }
            if let Some(e) = cause.downcast_ref::<CipherError>() {
                return match e {
                    CipherError::DecryptionFailed => ExitCode::VerificationFailed,
                    CipherError::EncryptionFailed | CipherError::KeyAgreement => ExitCode::GeneralError,
                    _ => ExitCode::InvalidInput,
                };
            }
            if let Some(e) = cause.downcast_ref::<SignatureError>() {
                return match e {
                    SignatureError::SigningFailed => ExitCode::GeneralError,
                    _ => ExitCode::InvalidInput,
                };
            }
            if cause.downcast_ref::<KeyError>().is_some() {
                return ExitCode::InvalidInput;
            }
            if let Some(KeyFileError::Key(_) | KeyFileError::Incomplete(_) | KeyFileError::InvalidUsername(_)) =
                cause.downcast_ref::<KeyFileError>()
            {
                return ExitCode::InvalidInput;
            }
        }
        ExitCode::GeneralError
    }
}
