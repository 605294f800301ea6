//! Deterministic template model.
//!
//! Stands in for a hosted model when running offline or in tests: it parses
//! the assembled prompt back into its sections and fills a fixed
//! greeting/knowledge/closing reply template. Output quality is stable, so
//! the surrounding retry and gating machinery can be exercised end to end
//! without a network.

use async_trait::async_trait;

use crate::error::LlmError;
use crate::generator::prompt::{SECTION_INSTRUCTIONS, SECTION_KNOWLEDGE};
use crate::llm::{CompletionRequest, CompletionResponse, GenerativeModel};

pub struct TemplateModel;

/// A knowledge snippet recovered from the prompt.
struct Snippet {
    title: String,
    body: String,
}

impl TemplateModel {
    pub fn new() -> Self {
        Self
    }

    fn parse_sentiment(prompt: &str) -> &'static str {
        for line in prompt.lines() {
            if let Some(value) = line.strip_prefix("Sentiment: ") {
                return match value.trim() {
                    "negative" => "negative",
                    "positive" => "positive",
                    _ => "neutral",
                };
            }
        }
        "neutral"
    }

    fn parse_snippets(prompt: &str) -> Vec<Snippet> {
        let Some(start) = prompt.find(SECTION_KNOWLEDGE) else {
            return Vec::new();
        };
        let section = &prompt[start + SECTION_KNOWLEDGE.len()..];
        let section = match section.find(SECTION_INSTRUCTIONS) {
            Some(end) => &section[..end],
            None => section,
        };

        let mut snippets = Vec::new();
        let mut current: Option<Snippet> = None;
        for line in section.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with('[') {
                if let Some(close) = trimmed.find("] ") {
                    if let Some(snippet) = current.take() {
                        snippets.push(snippet);
                    }
                    current = Some(Snippet {
                        title: trimmed[close + 2..].to_string(),
                        body: String::new(),
                    });
                    continue;
                }
            }
            if let Some(ref mut snippet) = current {
                if !trimmed.is_empty() {
                    if !snippet.body.is_empty() {
                        snippet.body.push(' ');
                    }
                    snippet.body.push_str(trimmed);
                }
            }
        }
        if let Some(snippet) = current {
            snippets.push(snippet);
        }
        snippets
    }
}

impl Default for TemplateModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerativeModel for TemplateModel {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let sentiment = Self::parse_sentiment(&request.prompt);
        let snippets = Self::parse_snippets(&request.prompt);

        let mut reply = String::from("Hello,\n\n");

        match sentiment {
            "negative" => reply.push_str(
                "I understand you're experiencing some frustration, and I \
                 sincerely apologize for any inconvenience this has caused.\n\n",
            ),
            "positive" => reply.push_str("Thank you for reaching out to us.\n\n"),
            _ => {}
        }

        if let Some(primary) = snippets.first() {
            reply.push_str(&format!(
                "Regarding your inquiry about {}:\n\n",
                primary.title.to_lowercase()
            ));
            reply.push_str(&primary.body);
            reply.push_str("\n\n");

            if snippets.len() > 1 {
                reply.push_str("Additionally, you might find the following information helpful:\n");
                for snippet in snippets.iter().skip(1).take(2) {
                    let preview: String = snippet.body.chars().take(100).collect();
                    reply.push_str(&format!("- {}: {}...\n", snippet.title, preview));
                }
                reply.push('\n');
            }
        } else {
            reply.push_str(
                "Thank you for your inquiry. We're currently looking into this \
                 matter and will get back to you with more detailed information \
                 shortly.\n\n",
            );
        }

        reply.push_str(
            "If you need further assistance, please don't hesitate to reach out \
             to our support team at support@company.com or call us at \
             1-800-123-4567.\n\n",
        );
        reply.push_str("Best regards,\nCustomer Support Team");

        Ok(CompletionResponse { text: reply })
    }

    fn model_name(&self) -> &str {
        "template"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::quality;

    fn prompt_with(sentiment: &str, knowledge: &str) -> String {
        format!(
            "## Customer message\nFrom: a@x.com\nSubject: Help\nSentiment: {sentiment}\n\
             Category: account\n\nBody text.\n\n{SECTION_KNOWLEDGE}\n{knowledge}\n\
             {SECTION_INSTRUCTIONS}\nDraft the reply.\n"
        )
    }

    #[tokio::test]
    async fn negative_sentiment_opens_with_apology() {
        let model = TemplateModel::new();
        let prompt = prompt_with("negative", "[1] Account Login Issues\nTry a password reset.\n");
        let reply = model.complete(CompletionRequest::new(prompt)).await.unwrap();
        assert!(reply.text.contains("sincerely apologize"));
        assert!(reply.text.contains("account login issues"));
    }

    #[tokio::test]
    async fn neutral_sentiment_skips_apology() {
        let model = TemplateModel::new();
        let prompt = prompt_with("neutral", "[1] Billing\nContact billing.\n");
        let reply = model.complete(CompletionRequest::new(prompt)).await.unwrap();
        assert!(!reply.text.contains("apologize"));
    }

    #[tokio::test]
    async fn no_knowledge_falls_back_to_generic_reply() {
        let model = TemplateModel::new();
        let prompt = prompt_with("neutral", "(no matching articles)\n");
        let reply = model.complete(CompletionRequest::new(prompt)).await.unwrap();
        assert!(reply.text.contains("currently looking into this matter"));
    }

    #[tokio::test]
    async fn secondary_snippets_are_listed() {
        let model = TemplateModel::new();
        let prompt = prompt_with(
            "neutral",
            "[1] Password Reset Process\nUse the forgot password link.\n\n\
             [2] Account Verification\nCheck your spam folder for the link.\n",
        );
        let reply = model.complete(CompletionRequest::new(prompt)).await.unwrap();
        assert!(reply.text.contains("password reset process"));
        assert!(reply.text.contains("- Account Verification:"));
    }

    #[tokio::test]
    async fn output_passes_the_quality_gate() {
        let model = TemplateModel::new();
        let prompt = prompt_with("negative", "[1] Outages\nCheck the status page.\n");
        let reply = model.complete(CompletionRequest::new(prompt)).await.unwrap();
        assert!(quality::check(&reply.text, 40).is_ok());
    }
}
