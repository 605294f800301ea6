//! Prompt assembly for the response model.
//!
//! The prompt carries three delimited sections: the customer message, the
//! retrieved knowledge snippets with numbered attribution, and the drafting
//! instructions. The section markers double as the scaffolding vocabulary
//! the quality gate screens for, so a model that parrots the prompt back
//! is caught.

use crate::analysis::{AnalysisResult, Sentiment};
use crate::ingest::Message;
use crate::knowledge::RetrievedItem;

pub const SECTION_MESSAGE: &str = "## Customer message";
pub const SECTION_KNOWLEDGE: &str = "## Knowledge";
pub const SECTION_INSTRUCTIONS: &str = "## Instructions";

/// The text retrieval runs against: subject, stated requirements, category.
pub fn retrieval_query(message: &Message, analysis: &AnalysisResult) -> String {
    let mut parts = vec![message.subject.clone()];
    parts.extend(analysis.extracted.requirements.iter().cloned());
    if analysis.category != "unclassified" {
        parts.push(analysis.category.clone());
    }
    parts.join(" ")
}

/// System directive for the model.
pub fn system_directive(analysis: &AnalysisResult, strict: bool) -> String {
    let mut directive = String::from(
        "You are a customer support agent drafting an email reply. \
         Write in a professional, friendly tone. \
         Only make claims about products or policies that are supported by \
         the provided knowledge section.",
    );
    if analysis.sentiment == Sentiment::Negative {
        directive.push_str(
            " The customer is frustrated: open with a sincere, empathetic \
             acknowledgement before addressing the issue.",
        );
    }
    if strict {
        directive.push_str(
            " Output only the finished reply email body. Do not include \
             headings, bracketed citations, or any text that is not part \
             of the reply itself.",
        );
    }
    directive
}

/// Assemble the user prompt for a message and its retrieved context.
pub fn build_prompt(
    message: &Message,
    analysis: &AnalysisResult,
    snippets: &[RetrievedItem],
) -> String {
    let mut prompt = String::new();

    prompt.push_str(SECTION_MESSAGE);
    prompt.push('\n');
    prompt.push_str(&format!("From: {}\n", message.sender));
    prompt.push_str(&format!("Subject: {}\n", message.subject));
    prompt.push_str(&format!("Sentiment: {}\n", analysis.sentiment.as_str()));
    prompt.push_str(&format!("Category: {}\n\n", analysis.category));
    prompt.push_str(&message.body);
    prompt.push_str("\n\n");

    prompt.push_str(SECTION_KNOWLEDGE);
    prompt.push('\n');
    if snippets.is_empty() {
        prompt.push_str("(no matching articles)\n");
    } else {
        for (idx, hit) in snippets.iter().enumerate() {
            prompt.push_str(&format!("[{}] {}\n{}\n\n", idx + 1, hit.item.title, hit.item.body));
        }
    }
    prompt.push('\n');

    prompt.push_str(SECTION_INSTRUCTIONS);
    prompt.push('\n');
    prompt.push_str(
        "Draft the reply email body. Address the customer's concern using the \
         knowledge above. If the knowledge does not cover the concern, say the \
         team is looking into it rather than inventing details. Close with a \
         pointer to support@company.com.\n",
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::analysis::{ExtractedFields, Priority};
    use crate::ingest::RawMessage;
    use crate::knowledge::KnowledgeItem;

    fn message(subject: &str, body: &str) -> Message {
        Message::from_raw(RawMessage {
            provider_message_id: Some("p-1".into()),
            sender: "user@example.com".into(),
            subject: subject.into(),
            body: body.into(),
            received_at: Utc::now(),
            provider_metadata: serde_json::Value::Null,
        })
    }

    fn analysis(sentiment: Sentiment, category: &str, requirements: Vec<String>) -> AnalysisResult {
        AnalysisResult {
            sentiment,
            priority: Priority::Normal,
            category: category.into(),
            extracted: ExtractedFields {
                requirements,
                ..ExtractedFields::default()
            },
            low_confidence: false,
            fingerprint: "fp".into(),
            rule_version: 1,
            analyzed_at: Utc::now(),
        }
    }

    fn hit(title: &str, body: &str) -> RetrievedItem {
        RetrievedItem {
            item: KnowledgeItem {
                id: "k".into(),
                title: title.into(),
                body: body.into(),
                category: String::new(),
                tags: vec![],
                embedding: vec![],
                deleted: false,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            score: 0.9,
        }
    }

    #[test]
    fn retrieval_query_combines_subject_requirements_category() {
        let msg = message("Login broken", "I need access to my dashboard.");
        let result = analysis(
            Sentiment::Negative,
            "account",
            vec!["access to my dashboard".into()],
        );
        let query = retrieval_query(&msg, &result);
        assert!(query.contains("Login broken"));
        assert!(query.contains("access to my dashboard"));
        assert!(query.contains("account"));
    }

    #[test]
    fn retrieval_query_skips_unclassified_category() {
        let msg = message("Hm", "");
        let result = analysis(Sentiment::Neutral, "unclassified", vec![]);
        assert!(!retrieval_query(&msg, &result).contains("unclassified"));
    }

    #[test]
    fn negative_sentiment_adds_empathy_directive() {
        let negative = system_directive(&analysis(Sentiment::Negative, "account", vec![]), false);
        assert!(negative.contains("empathetic"));

        let neutral = system_directive(&analysis(Sentiment::Neutral, "account", vec![]), false);
        assert!(!neutral.contains("empathetic"));
    }

    #[test]
    fn prompt_has_all_sections_with_attributed_snippets() {
        let msg = message("Billing question", "Why was I charged twice?");
        let result = analysis(Sentiment::Neutral, "billing", vec![]);
        let prompt = build_prompt(
            &msg,
            &result,
            &[hit("Billing and Payment Issues", "Contact billing@company.com.")],
        );

        assert!(prompt.contains(SECTION_MESSAGE));
        assert!(prompt.contains(SECTION_KNOWLEDGE));
        assert!(prompt.contains(SECTION_INSTRUCTIONS));
        assert!(prompt.contains("[1] Billing and Payment Issues"));
        assert!(prompt.contains("Why was I charged twice?"));
    }

    #[test]
    fn empty_retrieval_is_stated_not_omitted() {
        let msg = message("Odd", "Something unusual.");
        let result = analysis(Sentiment::Neutral, "unclassified", vec![]);
        let prompt = build_prompt(&msg, &result, &[]);
        assert!(prompt.contains("(no matching articles)"));
    }
}
