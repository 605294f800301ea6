//! Default knowledge content for fresh deployments.

use tracing::info;

use crate::error::KnowledgeError;
use crate::knowledge::store::{KnowledgeStore, NewKnowledgeItem};

/// Seed articles covering the most common support topics. Skipped when the
/// store already holds any retrievable item, so operator edits survive
/// restarts.
pub async fn seed_defaults(store: &KnowledgeStore) -> Result<usize, KnowledgeError> {
    if !store.is_empty().await? {
        return Ok(0);
    }

    let articles = default_articles();
    let count = articles.len();
    for article in articles {
        store.upsert(article).await?;
    }
    info!(count, "Seeded knowledge store with default articles");
    Ok(count)
}

fn default_articles() -> Vec<NewKnowledgeItem> {
    let raw: [(&str, &str, &str, &[&str]); 8] = [
        (
            "Account Login Issues",
            "If you're unable to log into your account, try resetting your password. \
             Click 'Forgot Password' on the login page and follow the instructions sent \
             to your email. If you continue to experience issues, please contact our \
             support team.",
            "Account Management",
            &["login", "account", "password", "access"],
        ),
        (
            "Password Reset Process",
            "To reset your password: 1) Go to the login page and click 'Forgot Password', \
             2) Enter your email address, 3) Check your email for a password reset link, \
             4) Click the link and enter a new password, 5) Confirm your new password. \
             The link expires in 24 hours.",
            "Account Management",
            &["password", "reset", "account", "security"],
        ),
        (
            "Account Verification",
            "After creating an account, you'll receive a verification email. Click the \
             verification link in the email to activate your account. If you don't see \
             the email, check your spam folder. Verification links expire in 48 hours.",
            "Account Management",
            &["verification", "account", "email", "activation"],
        ),
        (
            "Billing and Payment Issues",
            "For billing questions or payment issues, contact our billing department at \
             billing@company.com or call 1-800-123-4567. Include your account number and \
             a description of the issue in your communication. Our billing team is \
             available Monday-Friday, 9AM-5PM EST.",
            "Billing",
            &["billing", "payment", "invoice", "charge"],
        ),
        (
            "System Downtime and Outages",
            "We strive for 99.9% uptime. If you're experiencing system issues, check our \
             status page at status.company.com for current outages. For urgent issues, \
             contact support with details about the problem, including error messages \
             and the time it occurred.",
            "Technical Support",
            &["downtime", "outage", "system", "error"],
        ),
        (
            "API Integration Support",
            "For API integration questions, refer to our developer documentation at \
             docs.company.com. Common integration issues include authentication errors, \
             rate limiting, and incorrect endpoint usage. Ensure you're using the latest \
             API version and valid API keys.",
            "Developer Support",
            &["api", "integration", "developer", "documentation"],
        ),
        (
            "Subscription and Pricing Questions",
            "For questions about pricing, plans, or subscription changes, visit our \
             pricing page or contact our sales team at sales@company.com. Current \
             subscribers can upgrade, downgrade, or cancel their subscriptions through \
             the account settings page.",
            "Sales",
            &["subscription", "pricing", "plan", "upgrade"],
        ),
        (
            "Refund Policy",
            "We offer a 30-day money-back guarantee for new subscriptions. To request a \
             refund, contact billing@company.com with your account details and reason \
             for the refund request. Refund requests are typically processed within 5-7 \
             business days.",
            "Billing",
            &["refund", "money-back", "guarantee", "policy"],
        ),
    ];

    raw.into_iter()
        .map(|(title, body, category, tags)| NewKnowledgeItem {
            id: None,
            title: title.to_string(),
            body: body.to_string(),
            category: category.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::knowledge::embed::HashEmbedder;
    use crate::store::{Database, LibSqlBackend};

    async fn knowledge_store() -> KnowledgeStore {
        let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        KnowledgeStore::new(store, Arc::new(HashEmbedder::new()))
    }

    #[tokio::test]
    async fn seeds_once_on_empty_store() {
        let ks = knowledge_store().await;
        let seeded = seed_defaults(&ks).await.unwrap();
        assert_eq!(seeded, 8);
        assert_eq!(ks.len().await.unwrap(), 8);

        // Second run is a no-op.
        let seeded = seed_defaults(&ks).await.unwrap();
        assert_eq!(seeded, 0);
        assert_eq!(ks.len().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn skips_when_operator_content_exists() {
        let ks = knowledge_store().await;
        ks.upsert(NewKnowledgeItem {
            id: None,
            title: "Custom runbook".into(),
            body: "Internal escalation steps.".into(),
            category: "ops".into(),
            tags: vec![],
        })
        .await
        .unwrap();

        assert_eq!(seed_defaults(&ks).await.unwrap(), 0);
        assert_eq!(ks.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn seeded_content_is_retrievable() {
        let ks = knowledge_store().await;
        seed_defaults(&ks).await.unwrap();

        let hits = ks.retrieve("I forgot my password and cannot log in", 3).await.unwrap();
        assert!(!hits.is_empty());
        let titles: Vec<&str> = hits.iter().map(|h| h.item.title.as_str()).collect();
        assert!(
            titles.contains(&"Password Reset Process") || titles.contains(&"Account Login Issues"),
            "expected a login/password article in {titles:?}"
        );
    }
}
