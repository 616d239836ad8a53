//! Conversation addressing.
//!
//! A pairwise chat is addressed by SHA-256 over the participants' public-key
//! texts, sorted lexicographically and concatenated, so either side computes
//! the same id. A group chat is addressed by its group identifier alone: every
//! current and future member shares one history.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::hash::sha256;

/// 32-byte conversation identifier; text form is 64 lowercase hex chars.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatId([u8; 32]);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid chat id: {0}")]
pub struct ChatIdParseError(String);

impl ChatId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChatId({})", self.to_hex())
    }
}

impl FromStr for ChatId {
    type Err = ChatIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| ChatIdParseError(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| ChatIdParseError(format!("expected 32 bytes, got {}", v.len())))?;
        Ok(Self(arr))
    }
}

impl Serialize for ChatId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChatId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Id for an arbitrary participant set: sha256(concat(sort(participants))).
pub fn chat_id_for<S: AsRef<str>>(participants: &[S]) -> ChatId {
    let mut sorted: Vec<&str> = participants.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    ChatId(sha256(sorted.concat().as_bytes()))
}

/// Id for the conversation between `a` and `b`, independent of argument order.
pub fn pairwise_chat_id(a: &str, b: &str) -> ChatId {
    chat_id_for(&[a, b])
}

/// Id for a group conversation, derived from the group identifier only.
pub fn group_chat_id(group: &str) -> ChatId {
    ChatId(sha256(group.as_bytes()))
}
