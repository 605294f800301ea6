//! Error types for the triage pipeline.

use std::time::Duration;

/// Top-level error type for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Knowledge store error: {0}")]
    Knowledge(#[from] KnowledgeError),

    #[error("Model error: {0}")]
    Llm(#[from] LlmError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Analysis engine errors.
///
/// A failing classifier never reaches the pipeline — the engine degrades to
/// the lexical heuristic instead. This type exists for the classifier seam.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Sentiment classifier unavailable: {reason}")]
    ClassifierUnavailable { reason: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Knowledge store errors.
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("Embedding service failed: {reason}")]
    Embedding { reason: String },

    #[error("Embedding dimension mismatch: query {query} vs stored {stored}")]
    DimensionMismatch { query: usize, stored: usize },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl KnowledgeError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Embedding { .. })
    }
}

/// Generative model errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Model call timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Model rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Model request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Model returned HTTP {status}: {reason}")]
    Http { status: u16, reason: String },

    #[error("Invalid response from model: {reason}")]
    InvalidResponse { reason: String },

    #[error("Authentication failed for model provider")]
    AuthFailed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Timeouts, rate limits, 5xx and transport failures are retryable.
    /// Auth failures and malformed responses are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::RateLimited { .. } | Self::RequestFailed { .. } => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidResponse { .. } | Self::AuthFailed | Self::Json(_) => false,
        }
    }
}

/// Pipeline orchestration errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
