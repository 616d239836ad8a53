//! Send and receive over an injected blob store and ledger.
//!
//! Send: seal to the receiver, store the envelope, seal a copy to the sender,
//! sign the plaintext, append the message. Every blob write happens before the
//! ledger append, so a failed write never leaves a half-recorded message.
//!
//! Receive walks the chat in ledger order and takes each message through
//! `Fetched -> Decrypted -> Verified -> Accepted`. The first failure aborts the
//! whole call and nothing decrypted so far is returned.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use futures::future::try_join_all;
use tracing::{debug, info, warn};

use chainchat_crypto::addressing::{group_chat_id, pairwise_chat_id};
use chainchat_crypto::keys::{decode_public_key, encode_public_key, normalize_public_key};
use chainchat_crypto::signing;
use chainchat_crypto::{ChatId, EncryptedEnvelope, HybridCipher, KeyDerivation, KeyPair, PublicKey};

use crate::errors::MessagingError;
use crate::retry::RetryPolicy;
use crate::store::{BlobStore, Ledger};
use crate::types::{BlobRef, Chat, Message, ReceivedMessage};

/// Knobs for one pipeline instance.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Must match on both ends; the envelope does not record it.
    pub key_derivation: KeyDerivation,
    pub retry: RetryPolicy,
    /// Stagger between group deliveries; recipient `i` waits `i * fanout_delay`.
    pub fanout_delay: Duration,
}

/// Progress of one message through Receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStage {
    Fetched,
    Decrypted,
    Verified,
    Accepted,
}

impl fmt::Display for MessageStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageStage::Fetched => "fetched",
            MessageStage::Decrypted => "decrypted",
            MessageStage::Verified => "verified",
            MessageStage::Accepted => "accepted",
        };
        f.write_str(s)
    }
}

pub struct MessagePipeline<B: ?Sized, L: ?Sized> {
    blobs: Arc<B>,
    ledger: Arc<L>,
    cipher: HybridCipher,
    retry: RetryPolicy,
    fanout_delay: Duration,
}

impl<B, L> MessagePipeline<B, L>
where
    B: BlobStore + ?Sized,
    L: Ledger + ?Sized,
{
    pub fn new(blobs: Arc<B>, ledger: Arc<L>, config: PipelineConfig) -> Self {
        Self {
            blobs,
            ledger,
            cipher: HybridCipher::new(config.key_derivation),
            retry: config.retry,
            fanout_delay: config.fanout_delay,
        }
    }

    pub fn cipher(&self) -> &HybridCipher {
        &self.cipher
    }

    // ========================================================================
    // Send
    // ========================================================================

    /// Encrypt, store, sign and append one message to `chat_id`.
    pub async fn send(
        &self,
        sender: &KeyPair,
        receiver_public: &str,
        plaintext: &str,
        chat_id: &ChatId,
    ) -> Result<Message, MessagingError> {
        let receiver_key = decode_public_key(receiver_public)?;
        let receiver = encode_public_key(&receiver_key)?;
        self.deliver(sender, &receiver_key, receiver, plaintext, chat_id, true)
            .await
    }

    /// [`send`](Self::send) to the pairwise chat of sender and receiver.
    pub async fn send_direct(
        &self,
        sender: &KeyPair,
        receiver_public: &str,
        plaintext: &str,
    ) -> Result<(ChatId, Message), MessagingError> {
        let receiver_key = decode_public_key(receiver_public)?;
        let receiver = encode_public_key(&receiver_key)?;
        let chat_id = pairwise_chat_id(sender.public_text(), &receiver);
        let message = self
            .deliver(sender, &receiver_key, receiver, plaintext, &chat_id, true)
            .await?;
        Ok((chat_id, message))
    }

    async fn deliver(
        &self,
        sender: &KeyPair,
        receiver_key: &PublicKey,
        receiver: String,
        plaintext: &str,
        chat_id: &ChatId,
        with_sender_copy: bool,
    ) -> Result<Message, MessagingError> {
        let envelope = self.cipher.encrypt(plaintext.as_bytes(), receiver_key)?;
        let ciphertext_ref = self.put_envelope(&envelope).await?;

        let sender_copy_ref = if with_sender_copy && receiver != sender.public_text() {
            let copy = self
                .cipher
                .encrypt(plaintext.as_bytes(), sender.public_key())?;
            Some(self.put_envelope(&copy).await?)
        } else {
            None
        };

        let signature = signing::sign(plaintext.as_bytes(), sender.secret_key())?;

        let message = Message {
            ciphertext_ref,
            sender_copy_ref,
            signature,
            sender: sender.public_text().to_string(),
            receiver,
            timestamp: Utc::now(),
        };

        self.retry
            .run("ledger_append", || {
                self.ledger.append_message(chat_id, message.clone())
            })
            .await
            .map_err(MessagingError::Ledger)?;

        info!(
            chat_id = %chat_id,
            blob_ref = %message.ciphertext_ref,
            "message appended"
        );
        Ok(message)
    }

    async fn put_envelope(&self, envelope: &EncryptedEnvelope) -> Result<BlobRef, MessagingError> {
        let data = Bytes::from(envelope.to_hex());
        let handle = self
            .retry
            .run("blob_put", || self.blobs.put(data.clone()))
            .await
            .map_err(MessagingError::BlobStore)?;
        debug!(blob_ref = %handle, size = data.len(), "envelope stored");
        Ok(handle)
    }

    // ========================================================================
    // Receive
    // ========================================================================

    /// Plaintexts of the conversation between `me` and `counterparty`, in ledger order.
    pub async fn receive(
        &self,
        chat_id: &ChatId,
        me: &KeyPair,
        counterparty: &str,
    ) -> Result<Vec<String>, MessagingError> {
        let messages = self.receive_messages(chat_id, me, counterparty).await?;
        Ok(messages.into_iter().map(|m| m.plaintext).collect())
    }

    /// Like [`receive`](Self::receive) but keeps sender, receiver and timestamp.
    ///
    /// Incoming messages are opened from the primary envelope and outgoing ones
    /// from the sender copy. Anything else in the chat is an error.
    pub async fn receive_messages(
        &self,
        chat_id: &ChatId,
        me: &KeyPair,
        counterparty: &str,
    ) -> Result<Vec<ReceivedMessage>, MessagingError> {
        let counterparty = normalize_public_key(counterparty)?;
        let Some(chat) = self.fetch_chat(chat_id).await? else {
            debug!(chat_id = %chat_id, "chat not found");
            return Ok(Vec::new());
        };

        let mine = me.public_text();
        let mut accepted = Vec::with_capacity(chat.messages.len());
        for (index, message) in chat.messages.iter().enumerate() {
            let handle = if message.receiver == mine && message.sender == counterparty {
                &message.ciphertext_ref
            } else if message.sender == mine && message.receiver == counterparty {
                message
                    .sender_copy_ref
                    .as_ref()
                    .ok_or(MessagingError::KeyUnavailable { index })?
            } else {
                warn!(chat_id = %chat_id, index, "message outside this conversation");
                return Err(MessagingError::NotAParticipant { index });
            };
            accepted.push(self.open(chat_id, index, message, handle, me).await?);
        }

        info!(chat_id = %chat_id, count = accepted.len(), "chat received");
        Ok(accepted)
    }

    async fn open(
        &self,
        chat_id: &ChatId,
        index: usize,
        message: &Message,
        handle: &BlobRef,
        me: &KeyPair,
    ) -> Result<ReceivedMessage, MessagingError> {
        let envelope = self.fetch_envelope(handle).await?;
        trace_stage(chat_id, index, MessageStage::Fetched);

        let plaintext = self.cipher.decrypt(&envelope, me.secret_key())?;
        let plaintext = String::from_utf8(plaintext).map_err(|_| MessagingError::InvalidPlaintext)?;
        trace_stage(chat_id, index, MessageStage::Decrypted);

        let sender_key = decode_public_key(&message.sender)?;
        if !signing::verify(plaintext.as_bytes(), &message.signature, &sender_key)? {
            warn!(chat_id = %chat_id, index, "signature verification failed");
            return Err(MessagingError::SignatureVerificationFailed {
                index,
                sender: message.sender.clone(),
            });
        }
        trace_stage(chat_id, index, MessageStage::Verified);

        let received = ReceivedMessage {
            sender: message.sender.clone(),
            receiver: message.receiver.clone(),
            timestamp: message.timestamp,
            plaintext,
        };
        trace_stage(chat_id, index, MessageStage::Accepted);
        Ok(received)
    }

    async fn fetch_chat(&self, chat_id: &ChatId) -> Result<Option<Chat>, MessagingError> {
        self.retry
            .run("ledger_get_chat", || self.ledger.get_chat(chat_id))
            .await
            .map_err(MessagingError::Ledger)
    }

    async fn fetch_envelope(&self, handle: &BlobRef) -> Result<EncryptedEnvelope, MessagingError> {
        let bytes = self
            .retry
            .run("blob_get", || self.blobs.get(handle))
            .await
            .map_err(MessagingError::BlobStore)?;
        let text = std::str::from_utf8(&bytes).map_err(|_| {
            MessagingError::MalformedEnvelope(format!("blob {handle} is not hex text"))
        })?;
        Ok(EncryptedEnvelope::from_hex(text.trim())?)
    }

    // ========================================================================
    // Groups
    // ========================================================================

    /// Send `plaintext` to every member of `group` except the sender.
    ///
    /// One message per recipient, all appended to the group's chat. Deliveries
    /// run concurrently; the first failure aborts the rest, but appends that
    /// already landed stay on the ledger. Returned messages follow `members` order.
    pub async fn send_group(
        &self,
        sender: &KeyPair,
        group: &str,
        members: &[String],
        plaintext: &str,
    ) -> Result<(ChatId, Vec<Message>), MessagingError> {
        let chat_id = group_chat_id(group);

        let mut recipients: Vec<(PublicKey, String)> = Vec::with_capacity(members.len());
        for member in members {
            let key = decode_public_key(member)?;
            let text = encode_public_key(&key)?;
            if text != sender.public_text() && !recipients.iter().any(|(_, t)| *t == text) {
                recipients.push((key, text));
            }
        }
        if recipients.is_empty() {
            warn!(chat_id = %chat_id, "group has no recipients besides the sender");
            return Ok((chat_id, Vec::new()));
        }

        let deliveries = recipients.into_iter().enumerate().map(|(i, (key, text))| {
            let chat_id = &chat_id;
            async move {
                let delay = self.fanout_delay.saturating_mul(i as u32);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                self.deliver(sender, &key, text, plaintext, chat_id, false)
                    .await
            }
        });
        let sent = try_join_all(deliveries).await?;

        info!(chat_id = %chat_id, recipients = sent.len(), "group message sent");
        Ok((chat_id, sent))
    }

    /// Messages in the group chat addressed to `me`, in ledger order.
    ///
    /// Messages for other members are skipped, not treated as errors.
    pub async fn receive_group(
        &self,
        chat_id: &ChatId,
        me: &KeyPair,
    ) -> Result<Vec<ReceivedMessage>, MessagingError> {
        let Some(chat) = self.fetch_chat(chat_id).await? else {
            debug!(chat_id = %chat_id, "group chat not found");
            return Ok(Vec::new());
        };

        let mut accepted = Vec::new();
        for (index, message) in chat.messages.iter().enumerate() {
            if message.receiver != me.public_text() {
                continue;
            }
            accepted.push(
                self.open(chat_id, index, message, &message.ciphertext_ref, me)
                    .await?,
            );
        }
        info!(chat_id = %chat_id, count = accepted.len(), "group chat received");
        Ok(accepted)
    }
}

fn trace_stage(chat_id: &ChatId, index: usize, stage: MessageStage) {
    debug!(chat_id = %chat_id, index, stage = %stage, "message stage");
}
