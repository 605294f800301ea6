//! Message analysis — sentiment, priority, category, field extraction.
//!
//! Analysis is a deterministic function of (message content, rule version).
//! Results are memoized in a durable cache keyed by content fingerprint, so
//! re-analyzing unmodified content never re-invokes the classifier.

mod engine;
mod types;

pub use engine::{AnalysisEngine, SentimentClassifier};
pub use types::{content_fingerprint, AnalysisResult, ExtractedFields, Priority, Sentiment};
