//! Configuration types.
//!
//! Everything tunable lives here rather than hardcoded in the engines:
//! urgency keywords, the category taxonomy, retry budgets, lease durations.
//! `AppConfig::from_env()` reads overrides from `MAIL_TRIAGE_*` variables;
//! the defaults are usable as-is for local runs and tests.

use std::time::Duration;

use crate::error::ConfigError;

/// One entry in the category taxonomy: a label plus the keywords that map to it.
/// Taxonomy order is significant — the first matching entry wins.
#[derive(Debug, Clone)]
pub struct CategoryRule {
    pub label: String,
    pub keywords: Vec<String>,
}

impl CategoryRule {
    pub fn new(label: &str, keywords: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Analysis engine configuration.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Rule/lexicon version. Bumping this invalidates every cached result,
    /// since the version is folded into the content fingerprint.
    pub rule_version: u32,
    /// Keywords that mark a message urgent (case-insensitive, word-boundary).
    pub urgency_keywords: Vec<String>,
    /// Negative-keyword hit count at which negative sentiment alone
    /// escalates priority to urgent.
    pub negative_intensity_threshold: usize,
    /// Ordered category taxonomy; first match wins.
    pub taxonomy: Vec<CategoryRule>,
    /// Length cap for an extracted free-text requirement.
    pub max_requirement_len: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            rule_version: 1,
            urgency_keywords: [
                "immediately",
                "urgent",
                "asap",
                "as soon as possible",
                "critical",
                "emergency",
                "right away",
                "cannot access",
                "can't access",
                "blocked",
                "down",
                "crash",
                "crashed",
                "broken",
                "outage",
                "downtime",
                "offline",
                "unavailable",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            negative_intensity_threshold: 3,
            taxonomy: vec![
                CategoryRule::new(
                    "account",
                    &["account", "login", "log in", "password", "verification", "sign in"],
                ),
                CategoryRule::new(
                    "billing",
                    &["billing", "payment", "invoice", "refund", "subscription", "charge"],
                ),
                CategoryRule::new(
                    "technical",
                    &["error", "outage", "down", "crash", "bug", "not working", "broken"],
                ),
                CategoryRule::new(
                    "integration",
                    &["api", "integration", "webhook", "endpoint", "developer"],
                ),
            ],
            max_requirement_len: 200,
        }
    }
}

/// Response generator configuration.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// How many knowledge items to retrieve for the prompt.
    pub top_k: usize,
    /// Hard timeout on a single model call.
    pub model_timeout: Duration,
    /// Total attempt budget per message (transient retries included).
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts.
    pub backoff_base: Duration,
    /// Minimum acceptable draft length in characters.
    pub min_response_len: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            model_timeout: Duration::from_secs(30),
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            min_response_len: 40,
        }
    }
}

/// Work queue and worker-loop configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// How long a dequeued entry stays leased before it reverts to queued.
    pub lease_duration: Duration,
    /// Worker sleep when the queue is empty.
    pub poll_interval: Duration,
    /// How often workers sweep for expired leases.
    pub sweep_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path to the local database file.
    pub db_path: String,
    /// Number of response-generation workers.
    pub workers: usize,
    pub analysis: AnalysisConfig,
    pub generation: GenerationConfig,
    pub queue: QueueConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: "./data/mail-triage.db".to_string(),
            workers: 2,
            analysis: AnalysisConfig::default(),
            generation: GenerationConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

impl AppConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("MAIL_TRIAGE_DB_PATH") {
            config.db_path = path;
        }
        if let Ok(workers) = std::env::var("MAIL_TRIAGE_WORKERS") {
            config.workers = workers.parse().map_err(|_| ConfigError::InvalidValue {
                key: "MAIL_TRIAGE_WORKERS".into(),
                message: format!("expected a positive integer, got '{workers}'"),
            })?;
        }
        if let Ok(keywords) = std::env::var("MAIL_TRIAGE_URGENCY_KEYWORDS") {
            config.analysis.urgency_keywords = keywords
                .split(',')
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect();
        }
        if let Ok(secs) = std::env::var("MAIL_TRIAGE_MODEL_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| ConfigError::InvalidValue {
                key: "MAIL_TRIAGE_MODEL_TIMEOUT_SECS".into(),
                message: format!("expected seconds, got '{secs}'"),
            })?;
            config.generation.model_timeout = Duration::from_secs(secs);
        }
        if let Ok(attempts) = std::env::var("MAIL_TRIAGE_MAX_ATTEMPTS") {
            config.generation.max_attempts =
                attempts.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "MAIL_TRIAGE_MAX_ATTEMPTS".into(),
                    message: format!("expected a positive integer, got '{attempts}'"),
                })?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_include_core_urgency_keywords() {
        let config = AnalysisConfig::default();
        for kw in ["immediately", "critical", "cannot access", "asap"] {
            assert!(
                config.urgency_keywords.iter().any(|k| k == kw),
                "missing default urgency keyword: {kw}"
            );
        }
    }

    #[test]
    fn taxonomy_order_is_account_first() {
        let config = AnalysisConfig::default();
        assert_eq!(config.taxonomy[0].label, "account");
    }

    #[test]
    fn from_env_rejects_bad_workers() {
        // SAFETY: test runs single-threaded with respect to this variable.
        unsafe { std::env::set_var("MAIL_TRIAGE_WORKERS", "not-a-number") };
        let result = AppConfig::from_env();
        unsafe { std::env::remove_var("MAIL_TRIAGE_WORKERS") };
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
