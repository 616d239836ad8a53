//! chainchat core: the E2E messaging pipeline over a ledger and a blob store.
//!
//! This crate implements:
//! - The message and chat data model as stored on the ledger
//! - `BlobStore` / `Ledger` capability traits with in-memory implementations
//! - Bounded retry for storage calls
//! - Identity key files
//! - Pairwise and group send/receive

#![forbid(unsafe_code)]

// Pipeline
pub mod pipeline;

// Infrastructure
pub mod store;
pub mod retry;
pub mod keyfile;

// Supporting modules
pub mod errors;
pub mod types;
pub mod harness;

pub use errors::MessagingError;
pub use keyfile::{load_keys, save_keys, KeyFileError};
pub use pipeline::{MessagePipeline, MessageStage, PipelineConfig};
pub use retry::{Backoff, RetryPolicy};
pub use store::{BlobStore, InMemoryBlobStore, InMemoryLedger, Ledger, StoreError};
pub use types::{BlobRef, Chat, Message, ReceivedMessage};
