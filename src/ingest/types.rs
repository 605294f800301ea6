//! Message types and identity-key derivation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::pipeline::MessageStatus;

/// A raw message as delivered by an email connector.
///
/// Connectors are external to this crate; they hand over sender, subject,
/// body, receive time and an opaque provider metadata blob. A provider
/// message id, when available, strengthens deduplication across sources
/// that see the same message (e.g. IMAP and a provider API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    /// Provider-native message id, if the connector has one.
    pub provider_message_id: Option<String>,
    /// Sender address.
    pub sender: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// When the provider received the message.
    pub received_at: DateTime<Utc>,
    /// Opaque provider metadata, stored verbatim.
    #[serde(default)]
    pub provider_metadata: serde_json::Value,
}

impl RawMessage {
    /// Derive the deterministic identity key for this message.
    ///
    /// Prefers the provider message id; otherwise hashes
    /// sender + subject + receive timestamp. Two fetches of the same
    /// message always produce the same key.
    pub fn identity_key(&self) -> String {
        if let Some(ref id) = self.provider_message_id {
            let trimmed = id.trim();
            if !trimmed.is_empty() {
                return format!("msg-{trimmed}");
            }
        }
        let mut hasher = Sha256::new();
        hasher.update(self.sender.as_bytes());
        hasher.update(b"|");
        hasher.update(self.subject.as_bytes());
        hasher.update(b"|");
        hasher.update(self.received_at.to_rfc3339().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// An accepted, immutable support message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Identity key — unique in the store.
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
    pub provider_metadata: serde_json::Value,
    /// Current pipeline status.
    pub status: MessageStatus,
    /// Generation attempts consumed so far.
    pub attempt_count: u32,
    /// Why generation gave up, set when status is `failed`.
    #[serde(default)]
    pub failure_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Build a fresh `received` message from a raw one.
    pub fn from_raw(raw: RawMessage) -> Self {
        let id = raw.identity_key();
        let now = Utc::now();
        Self {
            id,
            sender: raw.sender,
            subject: raw.subject,
            body: raw.body,
            received_at: raw.received_at,
            provider_metadata: raw.provider_metadata,
            status: MessageStatus::Received,
            attempt_count: 0,
            failure_note: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Why an ingest call was treated as a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicateKind {
    /// The provider message id was seen before.
    ProviderId,
    /// The derived content key (sender + subject + timestamp) was seen before.
    ContentKey,
}

/// Outcome of an ingest call. A duplicate is informational, not an error.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Accepted(Message),
    Duplicate(DuplicateKind),
}

impl IngestOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}
