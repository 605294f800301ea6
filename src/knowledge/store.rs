//! Knowledge item storage and similarity retrieval.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::KnowledgeError;
use crate::knowledge::embed::Embedder;
use crate::store::Database;

/// A stored, embedded knowledge snippet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub id: String,
    pub title: String,
    pub body: String,
    pub category: String,
    pub tags: Vec<String>,
    pub embedding: Vec<f32>,
    /// Soft-delete flag; deleted items are kept but never retrieved.
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating or editing a knowledge item.
#[derive(Debug, Clone)]
pub struct NewKnowledgeItem {
    /// Existing item id to edit, or `None` to create.
    pub id: Option<String>,
    pub title: String,
    pub body: String,
    pub category: String,
    pub tags: Vec<String>,
}

/// A retrieval hit.
#[derive(Debug, Clone)]
pub struct RetrievedItem {
    pub item: KnowledgeItem,
    pub score: f32,
}

/// Knowledge store over the durable backend plus an embedder.
pub struct KnowledgeStore {
    store: Arc<dyn Database>,
    embedder: Arc<dyn Embedder>,
}

impl KnowledgeStore {
    pub fn new(store: Arc<dyn Database>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// Create a new item, or edit an existing one.
    ///
    /// Edits that change title or body re-embed; tag/category-only edits
    /// keep the stored vector. Returns the item id.
    pub async fn upsert(&self, input: NewKnowledgeItem) -> Result<String, KnowledgeError> {
        let now = Utc::now();

        if let Some(id) = input.id {
            let mut existing = self.store.get_knowledge_item(&id).await?.ok_or_else(|| {
                KnowledgeError::Database(crate::error::DatabaseError::NotFound {
                    entity: "knowledge_item".into(),
                    id: id.clone(),
                })
            })?;

            let content_changed = existing.title != input.title || existing.body != input.body;
            if content_changed {
                existing.embedding = self
                    .embedder
                    .embed(&embedding_text(&input.title, &input.body))
                    .await?;
            }
            existing.title = input.title;
            existing.body = input.body;
            existing.category = input.category;
            existing.tags = input.tags;
            existing.updated_at = now;

            self.store.upsert_knowledge_item(&existing).await?;
            debug!(id = %id, re_embedded = content_changed, "Knowledge item updated");
            return Ok(id);
        }

        let embedding = self
            .embedder
            .embed(&embedding_text(&input.title, &input.body))
            .await?;
        let item = KnowledgeItem {
            id: Uuid::new_v4().to_string(),
            title: input.title,
            body: input.body,
            category: input.category,
            tags: input.tags,
            embedding,
            deleted: false,
            created_at: now,
            updated_at: now,
        };
        self.store.upsert_knowledge_item(&item).await?;
        info!(id = %item.id, title = %item.title, "Knowledge item created");
        Ok(item.id)
    }

    /// Retrieve the `k` items most similar to `query`, descending by
    /// cosine similarity, ties broken by most recent creation time.
    /// An empty store yields an empty vec, not an error.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedItem>, KnowledgeError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let items = self.store.list_knowledge_items(false).await?;
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed(query).await?;

        let mut scored = Vec::with_capacity(items.len());
        for item in items {
            if item.embedding.len() != query_vec.len() {
                return Err(KnowledgeError::DimensionMismatch {
                    query: query_vec.len(),
                    stored: item.embedding.len(),
                });
            }
            let score = cosine_similarity(&query_vec, &item.embedding);
            scored.push(RetrievedItem { item, score });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.item.created_at.cmp(&a.item.created_at))
        });
        scored.truncate(k);

        debug!(k, hits = scored.len(), "Knowledge retrieval");
        Ok(scored)
    }

    /// Soft-delete an item. It stays in the store but drops out of retrieval.
    pub async fn soft_delete(&self, id: &str) -> Result<bool, KnowledgeError> {
        Ok(self.store.soft_delete_knowledge_item(id).await?)
    }

    /// Count of retrievable (non-deleted) items.
    pub async fn len(&self) -> Result<usize, KnowledgeError> {
        Ok(self.store.list_knowledge_items(false).await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool, KnowledgeError> {
        Ok(self.len().await? == 0)
    }
}

/// Title and body share one embedding input, matching ingest and query sides.
fn embedding_text(title: &str, body: &str) -> String {
    format!("{title}\n{body}")
}

/// Cosine similarity of two equal-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
