//! Durable two-lane priority work queue.
//!
//! Entries live in the database, not in memory, so queued work survives a
//! restart. Claiming is a single conditional update guarded by a lease
//! token; workers never coordinate through in-process locks.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::analysis::Priority;
use crate::config::QueueConfig;
use crate::error::DatabaseError;
use crate::store::Database;

/// A persisted queue entry.
///
/// `seq` is the insertion order within the table and breaks FIFO ties
/// for entries enqueued in the same instant.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub seq: i64,
    pub message_id: String,
    /// 0 = urgent, 1 = normal. Lower drains first.
    pub lane: i64,
    pub status: QueueEntryStatus,
    pub lease_token: Option<String>,
    pub lease_until: Option<DateTime<Utc>>,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEntryStatus {
    Queued,
    Leased,
    Done,
}

impl QueueEntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Leased => "leased",
            Self::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "leased" => Self::Leased,
            "done" => Self::Done,
            _ => Self::Queued,
        }
    }
}

/// A claimed entry handed to a worker. Completion must present the token.
#[derive(Debug, Clone)]
pub struct LeasedEntry {
    pub seq: i64,
    pub message_id: String,
    pub priority: Priority,
    pub lease_token: String,
    pub lease_until: DateTime<Utc>,
}

/// Work queue facade over the durable store.
pub struct WorkQueue {
    store: Arc<dyn Database>,
    config: QueueConfig,
}

impl WorkQueue {
    pub fn new(store: Arc<dyn Database>, config: QueueConfig) -> Self {
        Self { store, config }
    }

    /// Append a message to its priority lane.
    pub async fn enqueue(&self, message_id: &str, priority: Priority) -> Result<(), DatabaseError> {
        let seq = self
            .store
            .enqueue_entry(message_id, priority.lane(), Utc::now())
            .await?;
        debug!(message_id, lane = priority.lane(), seq, "Message enqueued");
        Ok(())
    }

    /// Claim the head entry: urgent lane first, FIFO within a lane.
    ///
    /// Returns `None` when nothing is queued; callers poll with backoff.
    /// The claim is a single conditional update, so two workers can never
    /// hold the same entry.
    pub async fn dequeue(&self) -> Result<Option<LeasedEntry>, DatabaseError> {
        let token = Uuid::new_v4().to_string();
        let lease_until = Utc::now() + self.config.lease_duration;

        let Some(entry) = self.store.claim_next_entry(&token, lease_until).await? else {
            return Ok(None);
        };

        debug!(
            message_id = %entry.message_id,
            lane = entry.lane,
            seq = entry.seq,
            "Entry leased"
        );
        Ok(Some(LeasedEntry {
            seq: entry.seq,
            message_id: entry.message_id,
            priority: Priority::from_lane(entry.lane),
            lease_token: token,
            lease_until,
        }))
    }

    /// Move a still-queued entry to another lane, keeping its original
    /// enqueue timestamp. An entry already claimed by a worker finishes
    /// at its old priority; returns `false` in that case.
    pub async fn reprioritize(
        &self,
        message_id: &str,
        priority: Priority,
    ) -> Result<bool, DatabaseError> {
        let moved = self
            .store
            .reprioritize_queued(message_id, priority.lane())
            .await?;
        if moved {
            info!(message_id, lane = priority.lane(), "Entry reprioritized");
        }
        Ok(moved)
    }

    /// Revert expired leases to `queued`. Returns the affected message ids
    /// so callers can roll the message status back as well.
    pub async fn release_expired(&self) -> Result<Vec<String>, DatabaseError> {
        let released = self.store.release_expired_leases(Utc::now()).await?;
        if !released.is_empty() {
            info!(count = released.len(), "Expired leases released");
        }
        Ok(released)
    }

    /// Mark a leased entry done. Fails quietly (returns `false`) when the
    /// lease token no longer matches, e.g. after an expiry sweep re-queued
    /// the entry and another worker picked it up.
    pub async fn complete(&self, entry: &LeasedEntry) -> Result<bool, DatabaseError> {
        self.store.complete_entry(entry.seq, &entry.lease_token).await
    }
}
