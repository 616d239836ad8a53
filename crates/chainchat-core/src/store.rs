//! Capability traits for the two external platforms the pipeline talks to,
//! plus in-memory implementations for tests and local runs.
//!
//! - `BlobStore`: content-addressed storage for envelopes.
//! - `Ledger`: the append-only chat store; the single source of truth for
//!   membership and message order.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::RwLock;

use chainchat_crypto::hash::sha256;
use chainchat_crypto::ChatId;

use crate::types::{BlobRef, Chat, Message};

// ============================================================================
// Error Types
// ============================================================================

/// Errors reported by a blob store or ledger backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("data corruption detected: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Only connectivity failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

// ============================================================================
// Capability Traits
// ============================================================================

/// Content-addressed blob storage (IPFS-like).
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data`, returning a stable, content-derived handle.
    async fn put(&self, data: Bytes) -> Result<BlobRef, StoreError>;

    /// Fetch the bytes behind `handle`.
    async fn get(&self, handle: &BlobRef) -> Result<Bytes, StoreError>;
}

/// Append-only chat ledger (smart-contract backed in production).
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Append `message` to the chat, creating the chat on first use.
    async fn append_message(&self, chat_id: &ChatId, message: Message) -> Result<(), StoreError>;

    /// Fetch a chat; `Ok(None)` if nothing was ever appended to it.
    async fn get_chat(&self, chat_id: &ChatId) -> Result<Option<Chat>, StoreError>;
}

#[async_trait]
impl<T: BlobStore + ?Sized> BlobStore for Arc<T> {
    async fn put(&self, data: Bytes) -> Result<BlobRef, StoreError> {
        (**self).put(data).await
    }

    async fn get(&self, handle: &BlobRef) -> Result<Bytes, StoreError> {
        (**self).get(handle).await
    }
}

#[async_trait]
impl<T: Ledger + ?Sized> Ledger for Arc<T> {
    async fn append_message(&self, chat_id: &ChatId, message: Message) -> Result<(), StoreError> {
        (**self).append_message(chat_id, message).await
    }

    async fn get_chat(&self, chat_id: &ChatId) -> Result<Option<Chat>, StoreError> {
        (**self).get_chat(chat_id).await
    }
}

// ============================================================================
// In-Memory Implementations
// ============================================================================

/// Thread-safe in-memory blob store. Handles are hex SHA-256 of the content.
#[derive(Default, Clone)]
pub struct InMemoryBlobStore {
    blobs: Arc<RwLock<HashMap<BlobRef, Bytes>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, data: Bytes) -> Result<BlobRef, StoreError> {
        let handle = BlobRef::new(hex::encode(sha256(&data)));
        self.blobs.write().await.insert(handle.clone(), data);
        Ok(handle)
    }

    async fn get(&self, handle: &BlobRef) -> Result<Bytes, StoreError> {
        self.blobs
            .read()
            .await
            .get(handle)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(handle.to_string()))
    }
}

/// In-memory ledger. Each chat is kept as a JSON world-state record keyed by
/// chat id, the way the chaincode persists it.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    state: Arc<RwLock<HashMap<ChatId, Vec<u8>>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub async fn chat_count(&self) -> usize {
        self.state.read().await.len()
    }

    fn decode(chat_id: &ChatId, raw: &[u8]) -> Result<Chat, StoreError> {
        serde_json::from_slice(raw)
            .map_err(|e| StoreError::Corrupt(format!("chat {chat_id}: {e}")))
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn append_message(&self, chat_id: &ChatId, message: Message) -> Result<(), StoreError> {
        let mut state = self.state.write().await;

        let mut chat = match state.get(chat_id) {
            Some(raw) => Self::decode(chat_id, raw)?,
            None => Chat::default(),
        };
        chat.add_participant(message.sender.clone());
        chat.add_participant(message.receiver.clone());
        chat.messages.push(message);

        let raw = serde_json::to_vec(&chat).map_err(|e| StoreError::Serialization(e.to_string()))?;
        state.insert(*chat_id, raw);
        Ok(())
    }

    async fn get_chat(&self, chat_id: &ChatId) -> Result<Option<Chat>, StoreError> {
        let state = self.state.read().await;
        state
            .get(chat_id)
            .map(|raw| Self::decode(chat_id, raw))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainchat_crypto::addressing::pairwise_chat_id;
    use chrono::Utc;

    fn message(sender: &str, receiver: &str, blob: &str) -> Message {
        Message {
            ciphertext_ref: BlobRef::new(blob),
            sender_copy_ref: None,
            signature: "1,1".into(),
            sender: sender.into(),
            receiver: receiver.into(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_blob_handles_are_content_derived() {
        let store = InMemoryBlobStore::new();
        let a = store.put(Bytes::from_static(b"same")).await.unwrap();
        let b = store.put(Bytes::from_static(b"same")).await.unwrap();
        let c = store.put(Bytes::from_static(b"different")).await.unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(store.len().await, 2);
        assert_eq!(store.get(&a).await.unwrap(), Bytes::from_static(b"same"));
    }

    #[tokio::test]
    async fn test_blob_missing_is_not_found() {
        let store = InMemoryBlobStore::new();
        let err = store.get(&BlobRef::new("nope")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_ledger_creates_chat_lazily_and_preserves_order() {
        let ledger = InMemoryLedger::new();
        let id = pairwise_chat_id("aa", "bb");

        assert!(ledger.get_chat(&id).await.unwrap().is_none());

        ledger.append_message(&id, message("aa", "bb", "1")).await.unwrap();
        ledger.append_message(&id, message("bb", "aa", "2")).await.unwrap();
        ledger.append_message(&id, message("aa", "bb", "3")).await.unwrap();

        let chat = ledger.get_chat(&id).await.unwrap().unwrap();
        assert_eq!(chat.participants, vec!["aa", "bb"]);
        let order: Vec<&str> = chat.messages.iter().map(|m| m.ciphertext_ref.as_str()).collect();
        assert_eq!(order, vec!["1", "2", "3"]);
        assert_eq!(ledger.chat_count().await, 1);
    }

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::Unavailable("x".into()).is_transient());
        assert!(StoreError::Timeout("x".into()).is_transient());
        assert!(!StoreError::Corrupt("x".into()).is_transient());
        assert!(!StoreError::Serialization("x".into()).is_transient());
    }
}
