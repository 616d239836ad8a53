//! Test harness: an in-memory pipeline and canned two-party exchanges.
//!
//! Used by the integration tests and the CLI demo.

use std::sync::Arc;

use chainchat_crypto::{ChatId, KeyPair};

use crate::errors::MessagingError;
use crate::pipeline::{MessagePipeline, PipelineConfig};
use crate::retry::RetryPolicy;
use crate::store::{InMemoryBlobStore, InMemoryLedger};

pub type InMemoryPipeline = MessagePipeline<InMemoryBlobStore, InMemoryLedger>;

/// A pipeline over fresh in-memory stores, with handles to both stores.
pub struct Fixture {
    pub blobs: Arc<InMemoryBlobStore>,
    pub ledger: Arc<InMemoryLedger>,
    pub pipeline: InMemoryPipeline,
}

impl Fixture {
    /// In-process stores never fail transiently, so no retries.
    pub fn new() -> Self {
        Self::with_config(PipelineConfig {
            retry: RetryPolicy::none(),
            ..PipelineConfig::default()
        })
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        let blobs = InMemoryBlobStore::new_shared();
        let ledger = InMemoryLedger::new_shared();
        let pipeline = MessagePipeline::new(blobs.clone(), ledger.clone(), config);
        Self {
            blobs,
            ledger,
            pipeline,
        }
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of [`run_direct_exchange`].
#[derive(Debug)]
pub struct ExchangeOutcome {
    pub chat_id: ChatId,
    /// What the receiver decrypted, in ledger order.
    pub received: Vec<String>,
}

/// `sender` sends each of `texts` to `receiver`, then `receiver` reads the chat back.
pub async fn run_direct_exchange<S: AsRef<str>>(
    pipeline: &InMemoryPipeline,
    sender: &KeyPair,
    receiver: &KeyPair,
    texts: &[S],
) -> Result<ExchangeOutcome, MessagingError> {
    let mut chat_id = None;
    for text in texts {
        let (id, _) = pipeline
            .send_direct(sender, receiver.public_text(), text.as_ref())
            .await?;
        chat_id = Some(id);
    }
    let chat_id = chat_id.unwrap_or_else(|| {
        chainchat_crypto::addressing::pairwise_chat_id(sender.public_text(), receiver.public_text())
    });

    let received = pipeline
        .receive(&chat_id, receiver, sender.public_text())
        .await?;
    Ok(ExchangeOutcome { chat_id, received })
}
