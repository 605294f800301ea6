//! Draft response types and generation outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A generated draft plus its provenance metadata.
#[derive(Debug, Clone)]
pub struct DraftResponse {
    pub content: String,
    /// Knowledge item ids that informed the draft.
    pub used_item_ids: Vec<String>,
    /// Wall-clock time spent across all attempts.
    pub latency_ms: u64,
    /// Model calls consumed, including retries and the quality re-prompt.
    pub attempts: u32,
    pub model: String,
}

/// Why generation gave up on a message.
#[derive(Debug, thiserror::Error)]
pub enum GenerationFailure {
    /// The model produced output, but it failed the quality gate twice.
    #[error("Draft rejected by quality gate: {reason}")]
    QualityRejected { reason: String, attempts: u32 },

    /// Transient model errors exhausted the attempt budget.
    #[error("Attempt budget exhausted after {attempts} attempts: {last_error}")]
    BudgetExhausted { attempts: u32, last_error: crate::error::LlmError },

    /// A non-transient model error; retrying would not help.
    #[error("Model call failed permanently: {0}")]
    Fatal(crate::error::LlmError),

    /// Knowledge retrieval failed; transient retrievals are retried
    /// against the same attempt budget before this surfaces.
    #[error("Knowledge retrieval failed: {source}")]
    Retrieval {
        #[source]
        source: crate::error::KnowledgeError,
        attempts: u32,
    },
}

impl GenerationFailure {
    /// Attempts consumed before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::QualityRejected { attempts, .. }
            | Self::BudgetExhausted { attempts, .. }
            | Self::Retrieval { attempts, .. } => *attempts,
            Self::Fatal(_) => 1,
        }
    }
}

/// Lifecycle of a persisted response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// Current draft awaiting human review.
    Draft,
    /// Replaced by a regeneration.
    Superseded,
    /// Generation gave up; the record carries the failure note instead
    /// of a draft.
    Failed,
}

impl ResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Superseded => "superseded",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "superseded" => Self::Superseded,
            "failed" => Self::Failed,
            _ => Self::Draft,
        }
    }
}

/// A response as stored.
#[derive(Debug, Clone)]
pub struct ResponseRecord {
    pub id: String,
    pub message_id: String,
    pub content: String,
    pub used_item_ids: Vec<String>,
    pub attempts: u32,
    pub latency_ms: u64,
    pub model: String,
    pub status: ResponseStatus,
    pub created_at: DateTime<Utc>,
}

impl ResponseRecord {
    /// Wrap a draft for persistence against its message.
    pub fn from_draft(message_id: &str, draft: &DraftResponse) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message_id: message_id.to_string(),
            content: draft.content.clone(),
            used_item_ids: draft.used_item_ids.clone(),
            attempts: draft.attempts,
            latency_ms: draft.latency_ms,
            model: draft.model.clone(),
            status: ResponseStatus::Draft,
            created_at: Utc::now(),
        }
    }

    /// Record a terminal generation failure so a reviewer sees why no
    /// draft exists for the message.
    pub fn from_failure(message_id: &str, model: &str, failure: &GenerationFailure) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message_id: message_id.to_string(),
            content: failure.to_string(),
            used_item_ids: Vec::new(),
            attempts: failure.attempts(),
            latency_ms: 0,
            model: model.to_string(),
            status: ResponseStatus::Failed,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;

    #[test]
    fn failed_status_round_trips() {
        assert_eq!(ResponseStatus::parse("failed"), ResponseStatus::Failed);
        assert_eq!(ResponseStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn failure_record_carries_the_note() {
        let failure = GenerationFailure::BudgetExhausted {
            attempts: 3,
            last_error: LlmError::Timeout {
                timeout: std::time::Duration::from_secs(30),
            },
        };
        let record = ResponseRecord::from_failure("m-1", "template", &failure);

        assert_eq!(record.status, ResponseStatus::Failed);
        assert_eq!(record.attempts, 3);
        assert!(record.content.contains("3 attempts"));
        assert!(record.used_item_ids.is_empty());
    }
}
