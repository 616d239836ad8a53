
#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::addressing::{chat_id_for, pairwise_chat_id};
    use crate::cipher::{CipherError, EncryptedEnvelope, HybridCipher, KeyDerivation, HEADER_LEN};
    use crate::keys::KeyPair;
    use crate::signing::{sign, verify};

    fn derivation() -> impl Strategy<Value = KeyDerivation> {
        prop_oneof![Just(KeyDerivation::RawX), Just(KeyDerivation::Sha256Coordinates)]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        // Decrypt inverts encrypt for every plaintext, including the empty one.
        #[test]
        fn test_encrypt_decrypt_round_trip(
            plaintext in proptest::collection::vec(any::<u8>(), 0..512),
            kdf in derivation()
        ) {
            let bob = KeyPair::generate().unwrap();
            let cipher = HybridCipher::new(kdf);

            let env = cipher.encrypt(&plaintext, bob.public_key()).unwrap();
            let reparsed = EncryptedEnvelope::from_hex(&env.to_hex()).unwrap();
            prop_assert_eq!(cipher.decrypt(&reparsed, bob.secret_key()).unwrap(), plaintext);
        }

        // Any single flipped byte after the ephemeral key is caught by the tag.
        #[test]
        fn test_tamper_detection(
            plaintext in proptest::collection::vec(any::<u8>(), 0..128),
            position in any::<prop::sample::Index>(),
            mask in 1u8..=255
        ) {
            let bob = KeyPair::generate().unwrap();
            let cipher = HybridCipher::default();

            let env = cipher.encrypt(&plaintext, bob.public_key()).unwrap();
            let mut bytes = env.into_bytes();
            let i = 65 + position.index(bytes.len() - 65);
            bytes[i] ^= mask;

            let tampered = EncryptedEnvelope::from_bytes(bytes).unwrap();
            prop_assert_eq!(
                cipher.decrypt(&tampered, bob.secret_key()).unwrap_err(),
                CipherError::DecryptionFailed
            );
        }

        // A flip anywhere, ephemeral key included, never yields plaintext.
        #[test]
        fn test_tamper_never_returns_plaintext(
            position in any::<prop::sample::Index>(),
            mask in 1u8..=255
        ) {
            let bob = KeyPair::generate().unwrap();
            let cipher = HybridCipher::default();

            let env = cipher.encrypt(b"hello", bob.public_key()).unwrap();
            let mut bytes = env.into_bytes();
            let i = position.index(bytes.len());
            bytes[i] ^= mask;

            let tampered = EncryptedEnvelope::from_bytes(bytes).unwrap();
            prop_assert!(cipher.decrypt(&tampered, bob.secret_key()).is_err());
        }

        // Truncating into the header is always rejected before any crypto.
        #[test]
        fn test_truncated_envelope_is_malformed(len in 0usize..=HEADER_LEN) {
            let result = EncryptedEnvelope::from_bytes(vec![4u8; len]);
            prop_assert!(matches!(result, Err(CipherError::MalformedEnvelope(_))));
        }

        #[test]
        fn test_wrong_key_rejection(plaintext in proptest::collection::vec(any::<u8>(), 0..128)) {
            let bob = KeyPair::generate().unwrap();
            let eve = KeyPair::generate().unwrap();
            let cipher = HybridCipher::default();

            let env = cipher.encrypt(&plaintext, bob.public_key()).unwrap();
            prop_assert_eq!(
                cipher.decrypt(&env, eve.secret_key()).unwrap_err(),
                CipherError::DecryptionFailed
            );
        }

        #[test]
        fn test_signature_soundness(
            message in any::<Vec<u8>>(),
            other in any::<Vec<u8>>()
        ) {
            let alice = KeyPair::generate().unwrap();
            let mallory = KeyPair::generate().unwrap();

            let sig = sign(&message, alice.secret_key()).unwrap();
            prop_assert!(verify(&message, &sig, alice.public_key()).unwrap());
            prop_assert!(!verify(&message, &sig, mallory.public_key()).unwrap());
            if other != message {
                prop_assert!(!verify(&other, &sig, alice.public_key()).unwrap());
            }
        }

        #[test]
        fn test_chat_id_symmetry(a in "[0-9a-f]{1,64}", b in "[0-9a-f]{1,64}") {
            prop_assert_eq!(pairwise_chat_id(&a, &b), pairwise_chat_id(&b, &a));
        }

        #[test]
        fn test_chat_id_permutation_invariant(mut members in proptest::collection::vec("[0-9a-f]{8}", 1..8)) {
            let id = chat_id_for(&members);
            members.reverse();
            prop_assert_eq!(chat_id_for(&members), id);
        }
    }
}
