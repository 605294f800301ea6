//! Database abstraction.
//!
//! Methods that coordinate concurrent actors (identity-key reservation,
//! lease claims, lease-guarded completion) are specified as single
//! conditional statements — implementations must not split them into a
//! read followed by a write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::analysis::AnalysisResult;
use crate::error::DatabaseError;
use crate::generator::ResponseRecord;
use crate::ingest::Message;
use crate::knowledge::KnowledgeItem;
use crate::pipeline::MessageStatus;
use crate::queue::QueueEntry;

/// Async database operations for the triage pipeline.
#[async_trait]
pub trait Database: Send + Sync {
    /// Initialize or migrate the schema.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Identity keys ───────────────────────────────────────────────

    /// Reserve an identity key. Returns `true` when this call claimed the
    /// key, `false` when it was already reserved (the duplicate counter is
    /// bumped in that case). Must be atomic under concurrent callers.
    async fn reserve_identity_key(&self, key: &str) -> Result<bool, DatabaseError>;

    /// Hand a reserved key back, e.g. when storing its message failed.
    /// The key becomes reservable again.
    async fn release_identity_key(&self, key: &str) -> Result<(), DatabaseError>;

    /// How many times a key has been offered, including the first accept.
    async fn identity_seen_count(&self, key: &str) -> Result<u32, DatabaseError>;

    // ── Messages ────────────────────────────────────────────────────

    async fn insert_message(&self, message: &Message) -> Result<(), DatabaseError>;

    async fn get_message(&self, id: &str) -> Result<Option<Message>, DatabaseError>;

    async fn count_messages(&self) -> Result<usize, DatabaseError>;

    async fn update_message_status(
        &self,
        id: &str,
        status: MessageStatus,
    ) -> Result<(), DatabaseError>;

    /// Add `n` to the attempt counter, returning the new value.
    async fn add_message_attempts(&self, id: &str, n: u32) -> Result<u32, DatabaseError>;

    /// Record why generation gave up on a message.
    async fn set_failure_note(&self, id: &str, note: &str) -> Result<(), DatabaseError>;

    // ── Analysis cache ──────────────────────────────────────────────

    async fn get_cached_analysis(
        &self,
        fingerprint: &str,
    ) -> Result<Option<AnalysisResult>, DatabaseError>;

    async fn put_cached_analysis(&self, result: &AnalysisResult) -> Result<(), DatabaseError>;

    /// Drop cache rows from other rule versions. Returns rows removed.
    async fn prune_analysis_cache(&self, keep_version: u32) -> Result<usize, DatabaseError>;

    // ── Work queue ──────────────────────────────────────────────────

    /// Append an entry; returns its sequence number.
    async fn enqueue_entry(
        &self,
        message_id: &str,
        lane: i64,
        enqueued_at: DateTime<Utc>,
    ) -> Result<i64, DatabaseError>;

    /// Atomically claim the head queued entry (lowest lane, then FIFO),
    /// stamping it with the lease token and expiry. `None` when empty.
    async fn claim_next_entry(
        &self,
        lease_token: &str,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<QueueEntry>, DatabaseError>;

    /// Revert leases expired at `now` to queued. Returns the message ids
    /// whose entries were released.
    async fn release_expired_leases(&self, now: DateTime<Utc>)
        -> Result<Vec<String>, DatabaseError>;

    /// Mark an entry done, only if the lease token still matches.
    async fn complete_entry(&self, seq: i64, lease_token: &str) -> Result<bool, DatabaseError>;

    /// Move a still-queued entry to another lane without touching its
    /// enqueue timestamp. Returns `false` when no queued entry matched.
    async fn reprioritize_queued(&self, message_id: &str, lane: i64)
        -> Result<bool, DatabaseError>;

    // ── Responses ───────────────────────────────────────────────────

    async fn insert_response(&self, response: &ResponseRecord) -> Result<(), DatabaseError>;

    /// Most recent response for a message, any status.
    async fn latest_response(&self, message_id: &str)
        -> Result<Option<ResponseRecord>, DatabaseError>;

    /// Mark all current drafts for a message superseded. Returns rows changed.
    async fn supersede_responses(&self, message_id: &str) -> Result<usize, DatabaseError>;

    // ── Knowledge items ─────────────────────────────────────────────

    async fn upsert_knowledge_item(&self, item: &KnowledgeItem) -> Result<(), DatabaseError>;

    async fn get_knowledge_item(&self, id: &str)
        -> Result<Option<KnowledgeItem>, DatabaseError>;

    async fn list_knowledge_items(
        &self,
        include_deleted: bool,
    ) -> Result<Vec<KnowledgeItem>, DatabaseError>;

    /// Flip the soft-delete flag. Returns `false` when the id is unknown
    /// or already deleted.
    async fn soft_delete_knowledge_item(&self, id: &str) -> Result<bool, DatabaseError>;
}
