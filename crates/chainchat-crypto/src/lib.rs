#![forbid(unsafe_code)]

pub mod hash;
pub mod keys;
pub mod cipher;
pub mod signing;
pub mod addressing;

#[cfg(test)]
mod proptests;

pub use addressing::ChatId;
pub use cipher::{CipherError, EncryptedEnvelope, HybridCipher, KeyDerivation};
pub use keys::{KeyError, KeyPair};
pub use signing::SignatureError;
pub use p256::{PublicKey, SecretKey};
