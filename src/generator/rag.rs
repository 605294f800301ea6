//! Retrieval-augmented response generation with retry and quality gating.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, info, warn};

use crate::analysis::AnalysisResult;
use crate::config::GenerationConfig;
use crate::error::LlmError;
use crate::generator::prompt;
use crate::generator::quality;
use crate::generator::types::{DraftResponse, GenerationFailure};
use crate::ingest::Message;
use crate::knowledge::KnowledgeStore;
use crate::llm::{CompletionRequest, GenerativeModel};

pub struct ResponseGenerator {
    knowledge: Arc<KnowledgeStore>,
    model: Arc<dyn GenerativeModel>,
    config: GenerationConfig,
}

impl ResponseGenerator {
    pub fn new(
        knowledge: Arc<KnowledgeStore>,
        model: Arc<dyn GenerativeModel>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            knowledge,
            model,
            config,
        }
    }

    /// Name of the model drafts are attributed to.
    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Produce a draft for an analyzed message.
    ///
    /// Transient retrieval and model errors retry with exponential backoff
    /// against one shared attempt budget. A quality-gate rejection earns
    /// exactly one stricter re-prompt before the draft is declared unusable.
    pub async fn generate(
        &self,
        message: &Message,
        analysis: &AnalysisResult,
    ) -> Result<DraftResponse, GenerationFailure> {
        let started = Instant::now();
        let mut attempts = 0u32;

        let query = prompt::retrieval_query(message, analysis);
        let hits = loop {
            match self.knowledge.retrieve(&query, self.config.top_k).await {
                Ok(hits) => break hits,
                Err(source) => {
                    attempts += 1;
                    if !source.is_transient() || attempts >= self.config.max_attempts {
                        warn!(
                            message_id = %message.id,
                            attempts,
                            error = %source,
                            "Knowledge retrieval failed"
                        );
                        return Err(GenerationFailure::Retrieval { source, attempts });
                    }
                    let delay = self.backoff_delay(attempts);
                    debug!(
                        message_id = %message.id,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %source,
                        "Transient retrieval error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };
        let used_item_ids: Vec<String> = hits.iter().map(|h| h.item.id.clone()).collect();
        debug!(
            message_id = %message.id,
            retrieved = hits.len(),
            "Knowledge retrieved for generation"
        );

        let user_prompt = prompt::build_prompt(message, analysis, &hits);

        let mut strict = false;
        loop {
            attempts += 1;
            let request = CompletionRequest::new(user_prompt.clone())
                .with_system(prompt::system_directive(analysis, strict))
                .with_temperature(0.3);

            let outcome =
                tokio::time::timeout(self.config.model_timeout, self.model.complete(request))
                    .await;

            let error = match outcome {
                Ok(Ok(response)) => match quality::check(&response.text, self.config.min_response_len) {
                    Ok(()) => {
                        info!(
                            message_id = %message.id,
                            attempts,
                            latency_ms = started.elapsed().as_millis() as u64,
                            "Draft accepted"
                        );
                        return Ok(DraftResponse {
                            content: response.text,
                            used_item_ids,
                            latency_ms: started.elapsed().as_millis() as u64,
                            attempts,
                            model: self.model.model_name().to_string(),
                        });
                    }
                    Err(reason) => {
                        if strict {
                            warn!(message_id = %message.id, %reason, "Draft rejected twice");
                            return Err(GenerationFailure::QualityRejected { reason, attempts });
                        }
                        warn!(message_id = %message.id, %reason, "Draft rejected, re-prompting");
                        strict = true;
                        continue;
                    }
                },
                Ok(Err(e)) => e,
                Err(_) => LlmError::Timeout {
                    timeout: self.config.model_timeout,
                },
            };

            if !error.is_transient() {
                warn!(message_id = %message.id, error = %error, "Model call failed permanently");
                return Err(GenerationFailure::Fatal(error));
            }
            if attempts >= self.config.max_attempts {
                warn!(
                    message_id = %message.id,
                    attempts,
                    error = %error,
                    "Attempt budget exhausted"
                );
                return Err(GenerationFailure::BudgetExhausted {
                    attempts,
                    last_error: error,
                });
            }

            let delay = self.backoff_delay(attempts);
            debug!(
                message_id = %message.id,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient model error, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Exponential backoff with jitter: base * 2^(attempt-1) plus up to
    /// half the base of random spread.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.backoff_base;
        let exp = base * (1u32 << (attempt - 1).min(8));
        let jitter_cap = (base.as_millis() as u64 / 2).max(1);
        let jitter = rand::thread_rng().gen_range(0..jitter_cap);
        exp + Duration::from_millis(jitter)
    }
}
