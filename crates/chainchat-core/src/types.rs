use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque handle returned by the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobRef(String);

impl BlobRef {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One ledger entry. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Envelope sealed to `receiver`.
    #[serde(rename = "ipfsHash")]
    pub ciphertext_ref: BlobRef,
    /// Envelope of the same plaintext sealed to `sender` (direct chats only).
    #[serde(rename = "senderCopyHash", default, skip_serializing_if = "Option::is_none")]
    pub sender_copy_ref: Option<BlobRef>,
    /// `"<r>,<s>"` ECDSA signature over the plaintext.
    pub signature: String,
    /// Sender public-key text.
    pub sender: String,
    /// Receiver public-key text.
    pub receiver: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn involves(&self, identity: &str) -> bool {
        self.sender == identity || self.receiver == identity
    }
}

/// A conversation as held by the ledger: participants plus append-ordered messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub participants: Vec<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Chat {
    pub fn new<S: Into<String>>(participants: impl IntoIterator<Item = S>) -> Self {
        let mut chat = Self::default();
        for p in participants {
            chat.add_participant(p.into());
        }
        chat
    }

    /// Insert keeping `participants` sorted and free of duplicates.
    pub fn add_participant(&mut self, identity: String) {
        if let Err(pos) = self.participants.binary_search(&identity) {
            self.participants.insert(pos, identity);
        }
    }
}

/// A decrypted, signature-checked message handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub sender: String,
    pub receiver: String,
    pub timestamp: DateTime<Utc>,
    pub plaintext: String,
}
