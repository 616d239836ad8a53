//! ECDSA P-256 message signatures.
//!
//! The signature covers SHA-256 of the *plaintext* and travels as the text
//! `"<r>,<s>"` with both scalars written in base 10.
//!
//! Both scalars are fixed 32-byte values, so base-10 conversion is a short
//! schoolbook loop over the byte array; no bignum dependency is needed.

use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::{FieldBytes, PublicKey, SecretKey};

use crate::hash::sha256;
use crate::keys::{decode_public_key, KeyError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("invalid signature format: {0}")]
    InvalidSignatureFormat(String),
    #[error("signing failed")]
    SigningFailed,
}

/// Sign `plaintext` with `secret`.
pub fn sign(plaintext: &[u8], secret: &SecretKey) -> Result<String, SignatureError> {
    let digest = sha256(plaintext);
    let signing_key = SigningKey::from(secret);
    let sig: Signature = signing_key
        .sign_prehash(&digest)
        .map_err(|_| SignatureError::SigningFailed)?;

    let (r, s) = sig.split_bytes();
    Ok(format!("{},{}", to_decimal(&r), to_decimal(&s)))
}

/// Verify a `"<r>,<s>"` signature over `plaintext`.
///
/// `Ok(false)` means the signature is well formed but does not verify.
pub fn verify(plaintext: &[u8], signature: &str, public: &PublicKey) -> Result<bool, SignatureError> {
    let sig = parse_signature(signature)?;
    let digest = sha256(plaintext);
    Ok(VerifyingKey::from(public)
        .verify_prehash(&digest, &sig)
        .is_ok())
}

/// [`verify`] against an encoded public key (an identity on the ledger).
pub fn verify_text(plaintext: &[u8], signature: &str, public_text: &str) -> Result<bool, SignatureError> {
    let public = decode_public_key(public_text)?;
    verify(plaintext, signature, &public)
}

fn parse_signature(text: &str) -> Result<Signature, SignatureError> {
    let parts: Vec<&str> = text.split(',').collect();
    if parts.len() != 2 {
        return Err(SignatureError::InvalidSignatureFormat(format!(
            "expected 2 components, got {}",
            parts.len()
        )));
    }

    let r = from_decimal(parts[0].trim())
        .ok_or_else(|| SignatureError::InvalidSignatureFormat("r is not a 256-bit decimal".into()))?;
    let s = from_decimal(parts[1].trim())
        .ok_or_else(|| SignatureError::InvalidSignatureFormat("s is not a 256-bit decimal".into()))?;

    Signature::from_scalars(FieldBytes::clone_from_slice(&r), FieldBytes::clone_from_slice(&s))
        .map_err(|_| SignatureError::InvalidSignatureFormat("scalar out of range".into()))
}

/// Big-endian bytes to base-10 text.
fn to_decimal(bytes: &[u8]) -> String {
    let mut num = bytes.to_vec();
    let mut digits = Vec::new();

    while num.iter().any(|&b| b != 0) {
        let mut rem = 0u32;
        for b in num.iter_mut() {
            let cur = (rem << 8) | u32::from(*b);
            *b = (cur / 10) as u8;
            rem = cur % 10;
        }
        digits.push(char::from(b'0' + rem as u8));
    }

    if digits.is_empty() {
        return "0".to_string();
    }
    digits.iter().rev().collect()
}

/// Base-10 text to 32 big-endian bytes; `None` on non-digits or overflow.
fn from_decimal(text: &str) -> Option<[u8; 32]> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let mut out = [0u8; 32];
    for d in text.bytes() {
        let mut carry = u32::from(d - b'0');
        for b in out.iter_mut().rev() {
            let cur = u32::from(*b) * 10 + carry;
            *b = (cur & 0xff) as u8;
            carry = cur >> 8;
        }
        if carry != 0 {
            return None;
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyPair;

    #[test]
    fn test_signature_round_trip() {
        let alice = KeyPair::generate().unwrap();
        let sig = sign(b"hello", alice.secret_key()).unwrap();
        assert!(verify(b"hello", &sig, alice.public_key()).unwrap());
    }

    #[test]
    fn test_signature_format_is_two_decimals() {
        let alice = KeyPair::generate().unwrap();
        let sig = sign(b"format", alice.secret_key()).unwrap();
        let parts: Vec<&str> = sig.split(',').collect();
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.bytes().all(|b| b.is_ascii_digit())));
    }

    #[test]
    fn test_signature_wrong_message_fails() {
        let alice = KeyPair::generate().unwrap();
        let sig = sign(b"Original message", alice.secret_key()).unwrap();
        assert!(!verify(b"Tampered message", &sig, alice.public_key()).unwrap());
    }

    #[test]
    fn test_signature_wrong_key_fails() {
        let alice = KeyPair::generate().unwrap();
        let mallory = KeyPair::generate().unwrap();
        let sig = sign(b"Test message", alice.secret_key()).unwrap();
        assert!(!verify(b"Test message", &sig, mallory.public_key()).unwrap());
    }

    #[test]
    fn test_altered_component_fails() {
        let alice = KeyPair::generate().unwrap();
        let sig = sign(b"msg", alice.secret_key()).unwrap();
        let (r, s) = sig.split_once(',').unwrap();
        let bumped = format!("{r},{}", bump_last_digit(s));
        // Either out of range or simply wrong; never true.
        assert!(!verify(b"msg", &bumped, alice.public_key()).unwrap_or(false));
    }

    fn bump_last_digit(s: &str) -> String {
        let mut chars: Vec<char> = s.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == '9' { '0' } else { (chars[last] as u8 + 1) as char };
        chars.into_iter().collect()
    }

    #[test]
    fn test_malformed_signatures_are_errors() {
        let alice = KeyPair::generate().unwrap();
        for bad in ["", "123", "1,2,3", "abc,123", "123,", ",123", "-1,5", "0,0"] {
            let result = verify(b"msg", bad, alice.public_key());
            assert!(
                matches!(result, Err(SignatureError::InvalidSignatureFormat(_))),
                "{bad:?} gave {result:?}"
            );
        }
    }

    #[test]
    fn test_oversized_component_is_error() {
        let alice = KeyPair::generate().unwrap();
        let huge = "9".repeat(80);
        let result = verify(b"msg", &format!("{huge},1"), alice.public_key());
        assert!(matches!(result, Err(SignatureError::InvalidSignatureFormat(_))));
    }

    #[test]
    fn test_verify_text_bad_key() {
        let result = verify_text(b"msg", "1,1", "nothex");
        assert!(matches!(result, Err(SignatureError::Key(KeyError::MalformedKey(_)))));
    }

    #[test]
    fn test_decimal_known_values() {
        let mut one = [0u8; 32];
        one[31] = 1;
        assert_eq!(to_decimal(&one), "1");
        assert_eq!(to_decimal(&[0u8; 32]), "0");
        assert_eq!(to_decimal(&[0x01, 0x00]), "256");
        assert_eq!(
            to_decimal(&[0xff; 32]),
            "115792089237316195423570985008687907853269984665640564039457584007913129639935"
        );

        assert_eq!(from_decimal("256").unwrap()[30..], [0x01, 0x00]);
        assert_eq!(
            from_decimal(
                "115792089237316195423570985008687907853269984665640564039457584007913129639935"
            )
            .unwrap(),
            [0xff; 32]
        );
        assert!(from_decimal(
            "115792089237316195423570985008687907853269984665640564039457584007913129639936"
        )
        .is_none());
    }
}
