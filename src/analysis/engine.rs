//! Analysis engine — sentiment, priority, category and extraction rules.
//!
//! The sentiment classifier is an external service behind the
//! [`SentimentClassifier`] trait. When it is missing or failing, the engine
//! degrades to a lexical polarity heuristic and flags the result
//! low-confidence; analysis itself never fails on classifier problems.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use tracing::{debug, warn};

use crate::analysis::types::{
    content_fingerprint, AnalysisResult, ExtractedFields, Priority, Sentiment,
};
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, DatabaseError};
use crate::ingest::Message;
use crate::store::Database;

/// Positive polarity lexicon for the degraded sentiment path.
const POSITIVE_WORDS: &[&str] = &[
    "thank", "thanks", "appreciate", "great", "excellent", "good", "wonderful", "fantastic",
    "amazing", "pleased", "satisfied", "happy", "delighted", "grateful", "awesome", "brilliant",
];

/// Negative polarity lexicon. Also feeds the intensity signal that can
/// escalate priority on its own.
const NEGATIVE_WORDS: &[&str] = &[
    "angry", "frustrated", "frustrating", "disappointed", "upset", "annoyed", "hate", "terrible",
    "awful", "horrible", "bad", "worst", "unhappy", "dissatisfied", "furious", "problem", "issue",
    "error", "broken", "failed", "cannot", "can't", "won't", "doesn't", "unable",
];

/// External trained sentiment classifier.
#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Sentiment, AnalysisError>;
}

/// Analysis engine with a durable result cache.
pub struct AnalysisEngine {
    config: AnalysisConfig,
    store: Arc<dyn Database>,
    classifier: Option<Arc<dyn SentimentClassifier>>,
    urgency_re: Option<Regex>,
    phone_re: Regex,
    email_re: Regex,
    product_re: Regex,
    requirement_re: Regex,
}

impl AnalysisEngine {
    pub fn new(
        config: AnalysisConfig,
        store: Arc<dyn Database>,
        classifier: Option<Arc<dyn SentimentClassifier>>,
    ) -> Self {
        let urgency_re = build_keyword_regex(&config.urgency_keywords);
        Self {
            config,
            store,
            classifier,
            urgency_re,
            phone_re: Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").expect("phone regex"),
            email_re: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
                .expect("email regex"),
            product_re: Regex::new(r"\b[A-Z][A-Z0-9]{2,}\b").expect("product regex"),
            requirement_re: Regex::new(
                r"(?i)\b(?:need|require|want|looking for|help with|assistance with|issue with|problem with|trouble with)\s+([^.!?\n]+)",
            )
            .expect("requirement regex"),
        }
    }

    /// Analyze a message, consulting the fingerprint cache first.
    ///
    /// A cache hit returns the stored result without touching the
    /// classifier. Empty bodies produce the neutral/normal/"unclassified"
    /// default rather than an error — no customer email is dropped.
    pub async fn analyze(&self, message: &Message) -> Result<AnalysisResult, AnalysisError> {
        let fingerprint =
            content_fingerprint(&message.subject, &message.body, self.config.rule_version);

        if let Some(cached) = self.store.get_cached_analysis(&fingerprint).await? {
            debug!(id = %message.id, fingerprint = %fingerprint, "Analysis cache hit");
            return Ok(cached);
        }

        let result = self.compute(message, fingerprint).await;
        self.store.put_cached_analysis(&result).await?;
        Ok(result)
    }

    /// Number of cache entries computed with a different rule version.
    /// Stale entries are unreachable (the version is in the fingerprint);
    /// pruning them is housekeeping only.
    pub async fn prune_stale_cache(&self) -> Result<usize, DatabaseError> {
        self.store
            .prune_analysis_cache(self.config.rule_version)
            .await
    }

    async fn compute(&self, message: &Message, fingerprint: String) -> AnalysisResult {
        if message.body.trim().is_empty() {
            return AnalysisResult {
                sentiment: Sentiment::Neutral,
                priority: Priority::Normal,
                category: "unclassified".into(),
                extracted: ExtractedFields::default(),
                low_confidence: true,
                fingerprint,
                rule_version: self.config.rule_version,
                analyzed_at: Utc::now(),
            };
        }

        let (sentiment, low_confidence) = self.sentiment(&message.body).await;
        let negative_hits = count_hits(&message.body, NEGATIVE_WORDS);
        let priority = self.priority(message, sentiment, negative_hits);
        let category = self.category(message);
        let extracted = self.extract(&message.body);

        AnalysisResult {
            sentiment,
            priority,
            category,
            extracted,
            low_confidence,
            fingerprint,
            rule_version: self.config.rule_version,
            analyzed_at: Utc::now(),
        }
    }

    async fn sentiment(&self, body: &str) -> (Sentiment, bool) {
        if let Some(ref classifier) = self.classifier {
            match classifier.classify(body).await {
                Ok(sentiment) => return (sentiment, false),
                Err(e) => {
                    warn!(error = %e, "Classifier unavailable, using lexical heuristic");
                }
            }
        }
        (lexical_sentiment(body), true)
    }

    fn priority(&self, message: &Message, sentiment: Sentiment, negative_hits: usize) -> Priority {
        let haystack = format!("{} {}", message.subject, message.body);
        if let Some(ref re) = self.urgency_re {
            if re.is_match(&haystack) {
                return Priority::Urgent;
            }
        }
        if sentiment == Sentiment::Negative
            && negative_hits >= self.config.negative_intensity_threshold
        {
            return Priority::Urgent;
        }
        Priority::Normal
    }

    fn category(&self, message: &Message) -> String {
        let haystack = format!("{} {}", message.subject, message.body).to_lowercase();
        for rule in &self.config.taxonomy {
            if rule.keywords.iter().any(|kw| haystack.contains(kw.as_str())) {
                return rule.label.clone();
            }
        }
        "unclassified".into()
    }

    fn extract(&self, body: &str) -> ExtractedFields {
        let phones = self
            .phone_re
            .find_iter(body)
            .map(|m| m.as_str().to_string())
            .collect();
        let emails = self
            .email_re
            .find_iter(body)
            .map(|m| m.as_str().to_string())
            .collect();
        let products = dedup(
            self.product_re
                .find_iter(body)
                .map(|m| m.as_str().to_string()),
        );
        let requirements = dedup(self.requirement_re.captures_iter(body).filter_map(|c| {
            let text = c.get(1)?.as_str().trim();
            // Reject empty and over-long captures rather than truncating.
            if text.is_empty() || text.len() > self.config.max_requirement_len {
                None
            } else {
                Some(text.to_string())
            }
        }));

        ExtractedFields {
            phones,
            emails,
            products,
            requirements,
        }
    }
}

/// Compile the urgency keyword set into one case-insensitive,
/// word-boundary alternation. Empty keyword sets compile to `None`.
fn build_keyword_regex(keywords: &[String]) -> Option<Regex> {
    if keywords.is_empty() {
        return None;
    }
    let alternation = keywords
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    match Regex::new(&format!(r"(?i)\b(?:{alternation})\b")) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(error = %e, "Urgency keyword regex failed to compile, urgency matching disabled");
            None
        }
    }
}

/// Substring-containment polarity count over the lowercased body.
fn count_hits(body: &str, lexicon: &[&str]) -> usize {
    let lower = body.to_lowercase();
    lexicon.iter().filter(|w| lower.contains(*w)).count()
}

fn lexical_sentiment(body: &str) -> Sentiment {
    let positive = count_hits(body, POSITIVE_WORDS);
    let negative = count_hits(body, NEGATIVE_WORDS);
    if positive > negative {
        Sentiment::Positive
    } else if negative > positive {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}

fn dedup(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values.filter(|v| seen.insert(v.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::store::LibSqlBackend;

    fn message(subject: &str, body: &str) -> Message {
        Message::from_raw(crate::ingest::RawMessage {
            provider_message_id: Some(format!("{subject}-{body}").chars().take(40).collect()),
            sender: "user@example.com".into(),
            subject: subject.into(),
            body: body.into(),
            received_at: Utc::now(),
            provider_metadata: serde_json::json!({}),
        })
    }

    async fn engine(classifier: Option<Arc<dyn SentimentClassifier>>) -> AnalysisEngine {
        let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        AnalysisEngine::new(AnalysisConfig::default(), store, classifier)
    }

    /// Classifier that counts invocations and always answers Positive.
    struct CountingClassifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SentimentClassifier for CountingClassifier {
        async fn classify(&self, _text: &str) -> Result<Sentiment, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Sentiment::Positive)
        }
    }

    /// Classifier that always fails, forcing the lexical fallback.
    struct BrokenClassifier;

    #[async_trait]
    impl SentimentClassifier for BrokenClassifier {
        async fn classify(&self, _text: &str) -> Result<Sentiment, AnalysisError> {
            Err(AnalysisError::ClassifierUnavailable {
                reason: "connection refused".into(),
            })
        }
    }

    #[tokio::test]
    async fn negative_sentiment_from_lexicon() {
        let engine = engine(None).await;
        let msg = message(
            "Login trouble",
            "This is terrible, I am so frustrated. Nothing works and I hate it.",
        );
        let result = engine.analyze(&msg).await.unwrap();
        assert_eq!(result.sentiment, Sentiment::Negative);
        assert!(result.low_confidence);
    }

    #[tokio::test]
    async fn positive_sentiment_from_lexicon() {
        let engine = engine(None).await;
        let msg = message("Thanks", "Thank you, the support was excellent and I am very happy.");
        let result = engine.analyze(&msg).await.unwrap();
        assert_eq!(result.sentiment, Sentiment::Positive);
    }

    #[tokio::test]
    async fn urgency_keyword_in_subject_escalates() {
        let engine = engine(None).await;
        let msg = message("Urgent: cannot access account", "Please look at this.");
        let result = engine.analyze(&msg).await.unwrap();
        assert_eq!(result.priority, Priority::Urgent);
    }

    #[tokio::test]
    async fn urgency_match_respects_word_boundaries() {
        let engine = engine(None).await;
        // "downtown" must not match the keyword "down".
        let msg = message("Office move", "Our downtown office loves the product.");
        let result = engine.analyze(&msg).await.unwrap();
        assert_eq!(result.priority, Priority::Normal);
    }

    #[tokio::test]
    async fn intense_negative_sentiment_escalates() {
        let engine = engine(None).await;
        let msg = message(
            "Very unhappy",
            "I am angry and frustrated. This problem keeps happening, a terrible error every time.",
        );
        let result = engine.analyze(&msg).await.unwrap();
        assert_eq!(result.sentiment, Sentiment::Negative);
        assert_eq!(result.priority, Priority::Urgent);
    }

    #[tokio::test]
    async fn category_first_match_wins() {
        let engine = engine(None).await;
        // Mentions both account and billing; account is first in the taxonomy.
        let msg = message("Question", "My account shows a wrong billing charge.");
        let result = engine.analyze(&msg).await.unwrap();
        assert_eq!(result.category, "account");
    }

    #[tokio::test]
    async fn unmatched_content_is_unclassified() {
        let engine = engine(None).await;
        let msg = message("Hello", "Just wanted to say the weather is nice.");
        let result = engine.analyze(&msg).await.unwrap();
        assert_eq!(result.category, "unclassified");
    }

    #[tokio::test]
    async fn empty_body_gets_default_bucket() {
        let engine = engine(None).await;
        let msg = message("Subject only", "   ");
        let result = engine.analyze(&msg).await.unwrap();
        assert_eq!(result.sentiment, Sentiment::Neutral);
        assert_eq!(result.priority, Priority::Normal);
        assert_eq!(result.category, "unclassified");
        assert!(result.extracted.is_empty());
    }

    #[tokio::test]
    async fn extraction_finds_phones_emails_products_requirements() {
        let engine = engine(None).await;
        let msg = message(
            "API help",
            "I need help with the SSO2 connector. Reach me at 555-123-4567 or backup@example.org.",
        );
        let result = engine.analyze(&msg).await.unwrap();
        assert_eq!(result.extracted.phones, vec!["555-123-4567"]);
        assert!(result.extracted.emails.contains(&"backup@example.org".to_string()));
        assert!(result.extracted.products.contains(&"SSO2".to_string()));
        assert!(!result.extracted.requirements.is_empty());
        assert!(result.extracted.requirements[0].contains("SSO2 connector"));
    }

    #[tokio::test]
    async fn over_long_requirements_are_rejected() {
        let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let config = AnalysisConfig {
            max_requirement_len: 20,
            ..AnalysisConfig::default()
        };
        let engine = AnalysisEngine::new(config, store, None);
        let msg = message(
            "Long request",
            "I need a very elaborate and extremely detailed walkthrough of every configuration option",
        );
        let result = engine.analyze(&msg).await.unwrap();
        assert!(result.extracted.requirements.is_empty());
    }

    #[tokio::test]
    async fn cache_hit_skips_classifier() {
        let classifier = Arc::new(CountingClassifier { calls: AtomicUsize::new(0) });
        let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let engine = AnalysisEngine::new(
            AnalysisConfig::default(),
            store,
            Some(classifier.clone() as Arc<dyn SentimentClassifier>),
        );

        let msg = message("Repeat", "The same body twice.");
        let first = engine.analyze(&msg).await.unwrap();
        let second = engine.analyze(&msg).await.unwrap();

        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(first.sentiment, second.sentiment);
        assert_eq!(first.analyzed_at, second.analyzed_at);
        assert!(!first.low_confidence);
    }

    #[tokio::test]
    async fn broken_classifier_degrades_without_error() {
        let engine = engine(Some(Arc::new(BrokenClassifier))).await;
        let msg = message("Feedback", "Thank you, this is excellent and wonderful.");
        let result = engine.analyze(&msg).await.unwrap();
        assert_eq!(result.sentiment, Sentiment::Positive);
        assert!(result.low_confidence);
    }

    #[tokio::test]
    async fn rule_version_bump_recomputes() {
        let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let classifier = Arc::new(CountingClassifier { calls: AtomicUsize::new(0) });

        let v1 = AnalysisEngine::new(
            AnalysisConfig::default(),
            store.clone(),
            Some(classifier.clone() as Arc<dyn SentimentClassifier>),
        );
        let v2 = AnalysisEngine::new(
            AnalysisConfig { rule_version: 2, ..AnalysisConfig::default() },
            store.clone(),
            Some(classifier.clone() as Arc<dyn SentimentClassifier>),
        );

        let msg = message("Version test", "Some body content.");
        let r1 = v1.analyze(&msg).await.unwrap();
        let r2 = v2.analyze(&msg).await.unwrap();

        assert_ne!(r1.fingerprint, r2.fingerprint);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 2);

        // v1's entry is stale from v2's point of view.
        assert_eq!(v2.prune_stale_cache().await.unwrap(), 1);
    }
}
