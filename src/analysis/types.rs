//! Analysis result types and content fingerprinting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sentiment of a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }
}

/// Priority tier. The urgency signal is binary by design — the work queue
/// is a pair of FIFO lanes, not a general heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    Normal,
}

impl Priority {
    /// Queue lane index: urgent entries drain first.
    pub fn lane(&self) -> i64 {
        match self {
            Self::Urgent => 0,
            Self::Normal => 1,
        }
    }

    pub fn from_lane(lane: i64) -> Self {
        if lane == 0 { Self::Urgent } else { Self::Normal }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::Normal => "normal",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "urgent" => Self::Urgent,
            _ => Self::Normal,
        }
    }
}

/// Structured fields pulled from a message body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    /// Phone numbers found in the body.
    pub phones: Vec<String>,
    /// Alternate email addresses mentioned in the body.
    pub emails: Vec<String>,
    /// Product codes (all-caps tokens like "SSO2" or "API").
    pub products: Vec<String>,
    /// Stated requirements ("need ...", "help with ...").
    pub requirements: Vec<String>,
}

impl ExtractedFields {
    pub fn is_empty(&self) -> bool {
        self.phones.is_empty()
            && self.emails.is_empty()
            && self.products.is_empty()
            && self.requirements.is_empty()
    }
}

/// Result of analyzing one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub sentiment: Sentiment,
    pub priority: Priority,
    /// Taxonomy label, or "unclassified".
    pub category: String,
    pub extracted: ExtractedFields,
    /// Set when the trained classifier was unavailable and the lexical
    /// heuristic produced the sentiment.
    pub low_confidence: bool,
    /// Cache key this result is stored under.
    pub fingerprint: String,
    /// Rule/lexicon version the result was computed with.
    pub rule_version: u32,
    pub analyzed_at: DateTime<Utc>,
}

/// Fingerprint of normalized message content plus the rule version.
///
/// Normalization lowercases and collapses whitespace, so formatting-only
/// changes (trailing spaces, reflowed paragraphs) still hit the cache.
/// The rule version is folded in, which makes a version bump an implicit
/// cache invalidation: old entries simply become unreachable.
pub fn content_fingerprint(subject: &str, body: &str, rule_version: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(subject).as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize(body).as_bytes());
    hasher.update(b"\n");
    hasher.update(rule_version.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
