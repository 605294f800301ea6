//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Every cross-actor
//! coordination point (key reservation, lease claim, lease-guarded
//! completion) is one conditional statement and relies on the database
//! for atomicity.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::analysis::AnalysisResult;
use crate::error::DatabaseError;
use crate::generator::{ResponseRecord, ResponseStatus};
use crate::ingest::Message;
use crate::knowledge::KnowledgeItem;
use crate::pipeline::MessageStatus;
use crate::queue::{QueueEntry, QueueEntryStatus};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

const MESSAGE_COLUMNS: &str = "id, sender, subject, body, received_at, provider_metadata, \
     status, attempt_count, failure_note, created_at, updated_at";

fn row_to_message(row: &libsql::Row) -> Result<Message, libsql::Error> {
    let received_str: String = row.get(4)?;
    let metadata_str: String = row.get(5)?;
    let status_str: String = row.get(6)?;
    let failure_note: Option<String> = row.get(8).ok();
    let created_str: String = row.get(9)?;
    let updated_str: String = row.get(10)?;

    Ok(Message {
        id: row.get(0)?,
        sender: row.get(1)?,
        subject: row.get(2)?,
        body: row.get(3)?,
        received_at: parse_datetime(&received_str),
        provider_metadata: serde_json::from_str(&metadata_str)
            .unwrap_or(serde_json::Value::Null),
        status: MessageStatus::parse(&status_str),
        attempt_count: row.get::<i64>(7)? as u32,
        failure_note,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

const QUEUE_COLUMNS: &str =
    "seq, message_id, lane, status, lease_token, lease_until, enqueued_at, updated_at";

fn row_to_queue_entry(row: &libsql::Row) -> Result<QueueEntry, libsql::Error> {
    let status_str: String = row.get(3)?;
    let lease_until_str: Option<String> = row.get(5).ok();
    let enqueued_str: String = row.get(6)?;
    let updated_str: String = row.get(7)?;

    Ok(QueueEntry {
        seq: row.get(0)?,
        message_id: row.get(1)?,
        lane: row.get(2)?,
        status: QueueEntryStatus::parse(&status_str),
        lease_token: row.get(4).ok(),
        lease_until: parse_optional_datetime(&lease_until_str),
        enqueued_at: parse_datetime(&enqueued_str),
        updated_at: parse_datetime(&updated_str),
    })
}

const RESPONSE_COLUMNS: &str =
    "id, message_id, content, used_item_ids, attempts, latency_ms, model, status, created_at";

fn row_to_response(row: &libsql::Row) -> Result<ResponseRecord, libsql::Error> {
    let used_str: String = row.get(3)?;
    let status_str: String = row.get(7)?;
    let created_str: String = row.get(8)?;

    Ok(ResponseRecord {
        id: row.get(0)?,
        message_id: row.get(1)?,
        content: row.get(2)?,
        used_item_ids: serde_json::from_str(&used_str).unwrap_or_default(),
        attempts: row.get::<i64>(4)? as u32,
        latency_ms: row.get::<i64>(5)? as u64,
        model: row.get(6)?,
        status: ResponseStatus::parse(&status_str),
        created_at: parse_datetime(&created_str),
    })
}

const KNOWLEDGE_COLUMNS: &str =
    "id, title, body, category, tags, embedding, deleted, created_at, updated_at";

fn row_to_knowledge_item(row: &libsql::Row) -> Result<KnowledgeItem, libsql::Error> {
    let tags_str: String = row.get(4)?;
    let embedding_str: String = row.get(5)?;
    let created_str: String = row.get(7)?;
    let updated_str: String = row.get(8)?;

    Ok(KnowledgeItem {
        id: row.get(0)?,
        title: row.get(1)?,
        body: row.get(2)?,
        category: row.get(3)?,
        tags: serde_json::from_str(&tags_str).unwrap_or_default(),
        embedding: serde_json::from_str(&embedding_str).unwrap_or_default(),
        deleted: row.get::<i64>(6)? != 0,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Identity keys ───────────────────────────────────────────────

    async fn reserve_identity_key(&self, key: &str) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO seen_keys (key, seen_count, first_seen_at) VALUES (?1, 1, ?2)",
                params![key, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("reserve_identity_key: {e}")))?;

        if changed > 0 {
            return Ok(true);
        }

        conn.execute(
            "UPDATE seen_keys SET seen_count = seen_count + 1 WHERE key = ?1",
            params![key],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("reserve_identity_key bump: {e}")))?;
        Ok(false)
    }

    async fn release_identity_key(&self, key: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute("DELETE FROM seen_keys WHERE key = ?1", params![key])
            .await
            .map_err(|e| DatabaseError::Query(format!("release_identity_key: {e}")))?;
        Ok(())
    }

    async fn identity_seen_count(&self, key: &str) -> Result<u32, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT seen_count FROM seen_keys WHERE key = ?1",
                params![key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("identity_seen_count: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("identity_seen_count: {e}")))?;
                Ok(count as u32)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("identity_seen_count: {e}"))),
        }
    }

    // ── Messages ────────────────────────────────────────────────────

    async fn insert_message(&self, message: &Message) -> Result<(), DatabaseError> {
        let metadata = serde_json::to_string(&message.provider_metadata)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO messages ({MESSAGE_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    message.id.clone(),
                    message.sender.clone(),
                    message.subject.clone(),
                    message.body.clone(),
                    message.received_at.to_rfc3339(),
                    metadata,
                    message.status.as_str(),
                    message.attempt_count as i64,
                    opt_text_owned(message.failure_note.clone()),
                    message.created_at.to_rfc3339(),
                    message.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_message: {e}")))?;

        debug!(message_id = %message.id, "Message inserted into DB");
        Ok(())
    }

    async fn get_message(&self, id: &str) -> Result<Option<Message>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_message: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let message = row_to_message(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_message row parse: {e}")))?;
                Ok(Some(message))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_message: {e}"))),
        }
    }

    async fn count_messages(&self) -> Result<usize, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM messages", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("count_messages: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("count_messages: {e}")))?;
                Ok(count as usize)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("count_messages: {e}"))),
        }
    }

    async fn update_message_status(
        &self,
        id: &str,
        status: MessageStatus,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn()
            .execute(
                "UPDATE messages SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), now, id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_message_status: {e}")))?;

        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "message".into(),
                id: id.to_string(),
            });
        }
        debug!(message_id = %id, status = %status, "Message status updated");
        Ok(())
    }

    async fn add_message_attempts(&self, id: &str, n: u32) -> Result<u32, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let mut rows = self
            .conn()
            .query(
                "UPDATE messages SET attempt_count = attempt_count + ?1, updated_at = ?2 \
                 WHERE id = ?3 RETURNING attempt_count",
                params![n as i64, now, id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("add_message_attempts: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("add_message_attempts: {e}")))?;
                Ok(count as u32)
            }
            Ok(None) => Err(DatabaseError::NotFound {
                entity: "message".into(),
                id: id.to_string(),
            }),
            Err(e) => Err(DatabaseError::Query(format!("add_message_attempts: {e}"))),
        }
    }

    async fn set_failure_note(&self, id: &str, note: &str) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "UPDATE messages SET failure_note = ?1, updated_at = ?2 WHERE id = ?3",
                params![note, now, id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_failure_note: {e}")))?;
        Ok(())
    }

    // ── Analysis cache ──────────────────────────────────────────────

    async fn get_cached_analysis(
        &self,
        fingerprint: &str,
    ) -> Result<Option<AnalysisResult>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT result FROM analysis_cache WHERE fingerprint = ?1",
                params![fingerprint],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_cached_analysis: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let json: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("get_cached_analysis: {e}")))?;
                let result = serde_json::from_str(&json)
                    .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
                Ok(Some(result))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_cached_analysis: {e}"))),
        }
    }

    async fn put_cached_analysis(&self, result: &AnalysisResult) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(result)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        self.conn()
            .execute(
                "INSERT OR REPLACE INTO analysis_cache (fingerprint, rule_version, result, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    result.fingerprint.clone(),
                    result.rule_version as i64,
                    json,
                    now
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("put_cached_analysis: {e}")))?;
        Ok(())
    }

    async fn prune_analysis_cache(&self, keep_version: u32) -> Result<usize, DatabaseError> {
        let removed = self
            .conn()
            .execute(
                "DELETE FROM analysis_cache WHERE rule_version != ?1",
                params![keep_version as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("prune_analysis_cache: {e}")))?;
        Ok(removed as usize)
    }

    // ── Work queue ──────────────────────────────────────────────────

    async fn enqueue_entry(
        &self,
        message_id: &str,
        lane: i64,
        enqueued_at: DateTime<Utc>,
    ) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "INSERT INTO queue_entries (message_id, lane, status, enqueued_at, updated_at) \
                 VALUES (?1, ?2, 'queued', ?3, ?4) RETURNING seq",
                params![
                    message_id,
                    lane,
                    enqueued_at.to_rfc3339(),
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("enqueue_entry: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("enqueue_entry: {e}"))),
            Ok(None) => Err(DatabaseError::Query("enqueue_entry returned no row".into())),
            Err(e) => Err(DatabaseError::Query(format!("enqueue_entry: {e}"))),
        }
    }

    async fn claim_next_entry(
        &self,
        lease_token: &str,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<QueueEntry>, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "UPDATE queue_entries \
                     SET status = 'leased', lease_token = ?1, lease_until = ?2, updated_at = ?3 \
                     WHERE seq = ( \
                         SELECT seq FROM queue_entries WHERE status = 'queued' \
                         ORDER BY lane ASC, enqueued_at ASC, seq ASC LIMIT 1 \
                     ) \
                     RETURNING {QUEUE_COLUMNS}"
                ),
                params![lease_token, lease_until.to_rfc3339(), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("claim_next_entry: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let entry = row_to_queue_entry(&row)
                    .map_err(|e| DatabaseError::Query(format!("claim_next_entry parse: {e}")))?;
                Ok(Some(entry))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("claim_next_entry: {e}"))),
        }
    }

    async fn release_expired_leases(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "UPDATE queue_entries \
                 SET status = 'queued', lease_token = NULL, lease_until = NULL, updated_at = ?1 \
                 WHERE status = 'leased' AND lease_until <= ?1 \
                 RETURNING message_id",
                params![now.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("release_expired_leases: {e}")))?;

        let mut released = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let message_id: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("release_expired_leases: {e}")))?;
            released.push(message_id);
        }
        Ok(released)
    }

    async fn complete_entry(&self, seq: i64, lease_token: &str) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn()
            .execute(
                "UPDATE queue_entries \
                 SET status = 'done', lease_token = NULL, lease_until = NULL, updated_at = ?1 \
                 WHERE seq = ?2 AND status = 'leased' AND lease_token = ?3",
                params![now, seq, lease_token],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("complete_entry: {e}")))?;
        Ok(changed > 0)
    }

    async fn reprioritize_queued(
        &self,
        message_id: &str,
        lane: i64,
    ) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn()
            .execute(
                "UPDATE queue_entries SET lane = ?1, updated_at = ?2 \
                 WHERE message_id = ?3 AND status = 'queued'",
                params![lane, now, message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("reprioritize_queued: {e}")))?;
        Ok(changed > 0)
    }

    // ── Responses ───────────────────────────────────────────────────

    async fn insert_response(&self, response: &ResponseRecord) -> Result<(), DatabaseError> {
        let used = serde_json::to_string(&response.used_item_ids)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO responses ({RESPONSE_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    response.id.clone(),
                    response.message_id.clone(),
                    response.content.clone(),
                    used,
                    response.attempts as i64,
                    response.latency_ms as i64,
                    response.model.clone(),
                    response.status.as_str(),
                    response.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_response: {e}")))?;

        debug!(response_id = %response.id, message_id = %response.message_id, "Response stored");
        Ok(())
    }

    async fn latest_response(
        &self,
        message_id: &str,
    ) -> Result<Option<ResponseRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {RESPONSE_COLUMNS} FROM responses \
                     WHERE message_id = ?1 ORDER BY created_at DESC, id DESC LIMIT 1"
                ),
                params![message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("latest_response: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let response = row_to_response(&row)
                    .map_err(|e| DatabaseError::Query(format!("latest_response parse: {e}")))?;
                Ok(Some(response))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("latest_response: {e}"))),
        }
    }

    async fn supersede_responses(&self, message_id: &str) -> Result<usize, DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE responses SET status = 'superseded' \
                 WHERE message_id = ?1 AND status = 'draft'",
                params![message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("supersede_responses: {e}")))?;
        Ok(changed as usize)
    }

    // ── Knowledge items ─────────────────────────────────────────────

    async fn upsert_knowledge_item(&self, item: &KnowledgeItem) -> Result<(), DatabaseError> {
        let tags = serde_json::to_string(&item.tags)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let embedding = serde_json::to_string(&item.embedding)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                &format!(
                    "INSERT OR REPLACE INTO knowledge_items ({KNOWLEDGE_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    item.id.clone(),
                    item.title.clone(),
                    item.body.clone(),
                    item.category.clone(),
                    tags,
                    embedding,
                    item.deleted as i64,
                    item.created_at.to_rfc3339(),
                    item.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_knowledge_item: {e}")))?;
        Ok(())
    }

    async fn get_knowledge_item(
        &self,
        id: &str,
    ) -> Result<Option<KnowledgeItem>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {KNOWLEDGE_COLUMNS} FROM knowledge_items WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_knowledge_item: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let item = row_to_knowledge_item(&row).map_err(|e| {
                    DatabaseError::Query(format!("get_knowledge_item parse: {e}"))
                })?;
                Ok(Some(item))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_knowledge_item: {e}"))),
        }
    }

    async fn list_knowledge_items(
        &self,
        include_deleted: bool,
    ) -> Result<Vec<KnowledgeItem>, DatabaseError> {
        let sql = if include_deleted {
            format!("SELECT {KNOWLEDGE_COLUMNS} FROM knowledge_items ORDER BY created_at ASC")
        } else {
            format!(
                "SELECT {KNOWLEDGE_COLUMNS} FROM knowledge_items \
                 WHERE deleted = 0 ORDER BY created_at ASC"
            )
        };

        let mut rows = self
            .conn()
            .query(&sql, ())
            .await
            .map_err(|e| DatabaseError::Query(format!("list_knowledge_items: {e}")))?;

        let mut items = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_knowledge_item(&row) {
                Ok(item) => items.push(item),
                Err(e) => {
                    tracing::warn!("Skipping knowledge row: {e}");
                }
            }
        }
        Ok(items)
    }

    async fn soft_delete_knowledge_item(&self, id: &str) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn()
            .execute(
                "UPDATE knowledge_items SET deleted = 1, updated_at = ?1 \
                 WHERE id = ?2 AND deleted = 0",
                params![now, id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("soft_delete_knowledge_item: {e}")))?;
        Ok(changed > 0)
    }
}
