//! Key codec for P-256 identities.
//!
//! Public keys travel as hex of the DER `SubjectPublicKeyInfo`, private keys as
//! hex of the SEC1 `ECPrivateKey` DER. The hex public-key text doubles as the
//! user's identity everywhere else (ledger sender/receiver, chat addressing),
//! so encoders always emit lowercase hex.

use std::fmt;

use p256::elliptic_curve::sec1::FromEncodedPoint;
use p256::elliptic_curve::ALGORITHM_OID;
use p256::pkcs8::{AssociatedOid, EncodePublicKey, SubjectPublicKeyInfoRef};
use p256::{EncodedPoint, NistP256, PublicKey, SecretKey};
use rand_core::OsRng;
use sec1::EcPrivateKey;
use zeroize::Zeroizing;

/// Error type for key encoding and decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// The text does not parse as a P-256 key structure at all.
    #[error("malformed key: {0}")]
    MalformedKey(String),
    /// The structure parses but the point/scalar is not a valid P-256 key.
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("key encoding failed: {0}")]
    Encoding(String),
}

/// Encode a public key as hex(DER SubjectPublicKeyInfo).
pub fn encode_public_key(key: &PublicKey) -> Result<String, KeyError> {
    let der = key
        .to_public_key_der()
        .map_err(|e| KeyError::Encoding(e.to_string()))?;
    Ok(hex::encode(der.as_bytes()))
}

/// Decode hex(DER SubjectPublicKeyInfo) into a P-256 public key.
///
/// Hex, DER or algorithm problems are `MalformedKey`; a well-formed structure
/// carrying a point that is not on the curve is `InvalidKey`.
pub fn decode_public_key(text: &str) -> Result<PublicKey, KeyError> {
    let der = hex::decode(text.trim())
        .map_err(|e| KeyError::MalformedKey(format!("public key is not hex: {e}")))?;

    let spki = SubjectPublicKeyInfoRef::try_from(der.as_slice())
        .map_err(|e| KeyError::MalformedKey(format!("public key DER: {e}")))?;

    spki.algorithm
        .assert_oids(ALGORITHM_OID, NistP256::OID)
        .map_err(|_| KeyError::MalformedKey("not a P-256 public key".into()))?;

    let point = spki
        .subject_public_key
        .as_bytes()
        .ok_or_else(|| KeyError::MalformedKey("public key bit string is not octet aligned".into()))?;

    decode_point(point, "public key")
}

/// SEC1 point bytes to a public key: bad tag or length is `MalformedKey`,
/// a well-formed point off the curve (or the identity) is `InvalidKey`.
fn decode_point(bytes: &[u8], what: &str) -> Result<PublicKey, KeyError> {
    let encoded = EncodedPoint::from_bytes(bytes)
        .map_err(|e| KeyError::MalformedKey(format!("{what} point encoding: {e}")))?;
    Option::<PublicKey>::from(PublicKey::from_encoded_point(&encoded))
        .ok_or_else(|| KeyError::InvalidKey(format!("{what} point is not on the P-256 curve")))
}

/// Encode a private key as hex(SEC1 ECPrivateKey DER), public key embedded.
pub fn encode_private_key(key: &SecretKey) -> Result<Zeroizing<String>, KeyError> {
    let der = key
        .to_sec1_der()
        .map_err(|e| KeyError::Encoding(e.to_string()))?;
    Ok(Zeroizing::new(hex::encode(der.as_slice())))
}

/// Decode hex(SEC1 ECPrivateKey DER) into a P-256 secret scalar.
pub fn decode_private_key(text: &str) -> Result<SecretKey, KeyError> {
    let der = Zeroizing::new(
        hex::decode(text.trim())
            .map_err(|e| KeyError::MalformedKey(format!("private key is not hex: {e}")))?,
    );

    let ec = EcPrivateKey::try_from(der.as_slice())
        .map_err(|e| KeyError::MalformedKey(format!("private key DER: {e}")))?;

    if let Some(params) = ec.parameters {
        if params.named_curve() != Some(NistP256::OID) {
            return Err(KeyError::MalformedKey("not a P-256 private key".into()));
        }
    }

    let secret = SecretKey::from_slice(ec.private_key)
        .map_err(|_| KeyError::InvalidKey("private scalar is zero or out of range".into()))?;

    // The embedded public key, when present, must be d·G.
    if let Some(embedded) = ec.public_key {
        let embedded = decode_point(embedded, "embedded public key")?;
        if embedded != secret.public_key() {
            return Err(KeyError::InvalidKey(
                "embedded public key does not match private scalar".into(),
            ));
        }
    }

    Ok(secret)
}

/// Canonical identity text for any accepted public-key spelling.
pub fn normalize_public_key(text: &str) -> Result<String, KeyError> {
    encode_public_key(&decode_public_key(text)?)
}

/// A P-256 identity: private scalar plus the public point it yields.
///
/// The secret scalar is zeroized on drop by `p256::SecretKey`.
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
    public_text: String,
}

impl KeyPair {
    /// Generate a new random identity using the OS random source.
    pub fn generate() -> Result<Self, KeyError> {
        Self::from_secret(SecretKey::random(&mut OsRng))
    }

    pub fn from_secret(secret: SecretKey) -> Result<Self, KeyError> {
        let public = secret.public_key();
        let public_text = encode_public_key(&public)?;
        Ok(Self {
            secret,
            public,
            public_text,
        })
    }

    /// Rebuild an identity from its transport texts.
    ///
    /// Fails with `InvalidKey` unless `private_text` yields `public_text`.
    pub fn from_encoded(public_text: &str, private_text: &str) -> Result<Self, KeyError> {
        let public = decode_public_key(public_text)?;
        let secret = decode_private_key(private_text)?;
        if secret.public_key() != public {
            return Err(KeyError::InvalidKey(
                "public key does not match private key".into(),
            ));
        }
        Self::from_secret(secret)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    /// Hex SPKI text; this is the identity used on the ledger.
    pub fn public_text(&self) -> &str {
        &self.public_text
    }

    pub fn private_text(&self) -> Result<Zeroizing<String>, KeyError> {
        encode_private_key(&self.secret)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public_text)
            .finish_non_exhaustive()
    }
}

impl PartialEq for KeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.public == other.public
    }
}

impl Eq for KeyPair {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_round_trip() {
        let pair = KeyPair::generate().unwrap();
        let decoded = decode_public_key(pair.public_text()).unwrap();
        assert_eq!(&decoded, pair.public_key());
        // SPKI DER prefix for id-ecPublicKey / prime256v1, uncompressed point
        assert!(pair
            .public_text()
            .starts_with("3059301306072a8648ce3d020106082a8648ce3d03010703420004"));
    }

    #[test]
    fn test_private_key_round_trip() {
        let pair = KeyPair::generate().unwrap();
        let text = pair.private_text().unwrap();
        let secret = decode_private_key(&text).unwrap();
        assert_eq!(secret.public_key(), *pair.public_key());
    }

    #[test]
    fn test_from_encoded_accepts_matching_pair() {
        let pair = KeyPair::generate().unwrap();
        let private = pair.private_text().unwrap();
        let rebuilt = KeyPair::from_encoded(pair.public_text(), &private).unwrap();
        assert_eq!(rebuilt, pair);
    }

    #[test]
    fn test_from_encoded_rejects_mismatched_pair() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();
        let bob_private = bob.private_text().unwrap();
        let err = KeyPair::from_encoded(alice.public_text(), &bob_private).unwrap_err();
        assert!(matches!(err, KeyError::InvalidKey(_)));
    }

    #[test]
    fn test_non_hex_is_malformed() {
        assert!(matches!(
            decode_public_key("not hex at all"),
            Err(KeyError::MalformedKey(_))
        ));
        assert!(matches!(
            decode_private_key("zz"),
            Err(KeyError::MalformedKey(_))
        ));
    }

    #[test]
    fn test_truncated_der_is_malformed() {
        let pair = KeyPair::generate().unwrap();
        let truncated = &pair.public_text()[..40];
        assert!(matches!(
            decode_public_key(truncated),
            Err(KeyError::MalformedKey(_))
        ));
    }

    #[test]
    fn test_point_off_curve_is_invalid() {
        let pair = KeyPair::generate().unwrap();
        let mut der = hex::decode(pair.public_text()).unwrap();
        // Last byte is the low byte of Y; changing it moves the point off the curve.
        let last = der.len() - 1;
        der[last] ^= 0x01;
        assert!(matches!(
            decode_public_key(&hex::encode(der)),
            Err(KeyError::InvalidKey(_))
        ));
    }

    /// Rebuild the SPKI DER around a different point encoding.
    fn spki_with_point(point: &[u8]) -> Vec<u8> {
        let pair = KeyPair::generate().unwrap();
        let der = hex::decode(pair.public_text()).unwrap();
        // 30 59 | 30 13 <algorithm> | 03 42 00 <point>
        let algorithm = &der[2..23];
        let mut bit_string = vec![0x03, (point.len() + 1) as u8, 0x00];
        bit_string.extend_from_slice(point);
        let mut out = vec![0x30, (algorithm.len() + bit_string.len()) as u8];
        out.extend_from_slice(algorithm);
        out.extend_from_slice(&bit_string);
        out
    }

    #[test]
    fn test_unparseable_point_is_malformed() {
        let pair = KeyPair::generate().unwrap();
        let der = hex::decode(pair.public_text()).unwrap();
        let point = &der[26..];
        assert_eq!(point.len(), 65);

        // 04 || X with Y missing
        let short = spki_with_point(&point[..33]);
        assert!(matches!(
            decode_public_key(&hex::encode(short)),
            Err(KeyError::MalformedKey(_))
        ));

        let mut bad_tag = point.to_vec();
        bad_tag[0] = 0x09;
        assert!(matches!(
            decode_public_key(&hex::encode(spki_with_point(&bad_tag))),
            Err(KeyError::MalformedKey(_))
        ));

        // Re-wrapping the untouched point still decodes.
        let same = spki_with_point(point);
        assert_eq!(
            decode_public_key(&hex::encode(same)).unwrap(),
            *pair.public_key()
        );
    }

    #[test]
    fn test_identity_point_is_invalid() {
        assert!(matches!(
            decode_public_key(&hex::encode(spki_with_point(&[0x00]))),
            Err(KeyError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_zero_scalar_is_invalid() {
        let pair = KeyPair::generate().unwrap();
        let der = hex::decode(pair.private_text().unwrap().as_str()).unwrap();
        // SEC1: 30 len 02 01 01 04 20 <32-byte scalar> ...
        let mut zeroed = der.clone();
        for b in &mut zeroed[7..39] {
            *b = 0;
        }
        assert!(matches!(
            decode_private_key(&hex::encode(zeroed)),
            Err(KeyError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_normalize_lowercases() {
        let pair = KeyPair::generate().unwrap();
        let upper = pair.public_text().to_uppercase();
        assert_eq!(normalize_public_key(&upper).unwrap(), pair.public_text());
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let pair = KeyPair::generate().unwrap();
        let private = pair.private_text().unwrap();
        let rendered = format!("{pair:?}");
        assert!(!rendered.contains(private.as_str()));
    }
}
