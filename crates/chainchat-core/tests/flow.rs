//! End-to-end scenario: Alice sends Bob "hello", then the stored envelope is tampered with.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use chainchat_core::{
    BlobRef, BlobStore, InMemoryBlobStore, InMemoryLedger, MessagePipeline, MessagingError,
    PipelineConfig, RetryPolicy, StoreError,
};
use chainchat_crypto::addressing::chat_id_for;
use chainchat_crypto::cipher::HEADER_LEN;
use chainchat_crypto::KeyPair;

/// Flips one ciphertext byte of every envelope it hands out once armed.
struct TamperingBlobStore {
    inner: InMemoryBlobStore,
    armed: AtomicBool,
}

impl TamperingBlobStore {
    fn new() -> Self {
        Self {
            inner: InMemoryBlobStore::new(),
            armed: AtomicBool::new(false),
        }
    }

    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for TamperingBlobStore {
    async fn put(&self, data: Bytes) -> Result<BlobRef, StoreError> {
        self.inner.put(data).await
    }

    async fn get(&self, handle: &BlobRef) -> Result<Bytes, StoreError> {
        let data = self.inner.get(handle).await?;
        if !self.armed.load(Ordering::SeqCst) {
            return Ok(data);
        }
        let text = std::str::from_utf8(&data).unwrap();
        let mut raw = hex::decode(text).unwrap();
        raw[HEADER_LEN] ^= 0x01;
        Ok(Bytes::from(hex::encode(raw)))
    }
}

#[tokio::test]
async fn test_hello_then_tamper() {
    let blobs = Arc::new(TamperingBlobStore::new());
    let ledger = InMemoryLedger::new_shared();
    let pipeline = MessagePipeline::new(
        blobs.clone(),
        ledger.clone(),
        PipelineConfig {
            retry: RetryPolicy::none(),
            ..PipelineConfig::default()
        },
    );

    let alice = KeyPair::generate().unwrap();
    let bob = KeyPair::generate().unwrap();
    let chat_id = chat_id_for(&[alice.public_text(), bob.public_text()]);

    let sent = pipeline
        .send(&alice, bob.public_text(), "hello", &chat_id)
        .await
        .expect("send should succeed");
    assert_eq!(sent.sender, alice.public_text());

    let received = pipeline
        .receive(&chat_id, &bob, alice.public_text())
        .await
        .expect("receive should succeed");
    assert_eq!(received, vec!["hello".to_string()]);

    blobs.arm();
    let result = pipeline.receive(&chat_id, &bob, alice.public_text()).await;
    assert!(
        matches!(result, Err(MessagingError::DecryptionFailed)),
        "expected DecryptionFailed, got {result:?}"
    );
}

#[tokio::test]
async fn test_conversation_both_directions() {
    let fx = chainchat_core::harness::Fixture::new();
    let alice = KeyPair::generate().unwrap();
    let bob = KeyPair::generate().unwrap();

    let (chat_id, _) = fx
        .pipeline
        .send_direct(&alice, bob.public_text(), "hi bob")
        .await
        .unwrap();
    let (reply_chat, _) = fx
        .pipeline
        .send_direct(&bob, alice.public_text(), "hi alice")
        .await
        .unwrap();
    assert_eq!(chat_id, reply_chat);

    let for_bob = fx
        .pipeline
        .receive_messages(&chat_id, &bob, alice.public_text())
        .await
        .unwrap();
    let for_alice = fx
        .pipeline
        .receive(&chat_id, &alice, bob.public_text())
        .await
        .unwrap();

    assert_eq!(for_alice, vec!["hi bob", "hi alice"]);
    let texts: Vec<_> = for_bob.iter().map(|m| m.plaintext.as_str()).collect();
    assert_eq!(texts, vec!["hi bob", "hi alice"]);
    assert_eq!(for_bob[0].sender, alice.public_text());
    assert_eq!(for_bob[1].sender, bob.public_text());
    assert!(for_bob[0].timestamp <= for_bob[1].timestamp);
}
