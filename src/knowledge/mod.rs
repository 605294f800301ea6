//! Knowledge store — embedded support articles with similarity retrieval.
//!
//! Items are embedded at ingest time and re-embedded on content edits.
//! Retrieval embeds the query with the same embedder and returns the top-k
//! items by cosine similarity. Items are soft-deleted only, to preserve
//! retrieval reproducibility for already-generated responses.

mod embed;
mod seed;
mod store;

pub use embed::{Embedder, HashEmbedder, HttpEmbedder};
pub use seed::seed_defaults;
pub use store::{cosine_similarity, KnowledgeItem, KnowledgeStore, NewKnowledgeItem, RetrievedItem};
