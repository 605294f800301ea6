//! End-to-end pipeline tests over an in-memory database.
//!
//! Each test builds the full orchestrator with the deterministic template
//! model (or a failing stub) and drives it by hand, so ordering assertions
//! don't depend on worker timing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use mail_triage::analysis::AnalysisEngine;
use mail_triage::config::{AnalysisConfig, GenerationConfig, QueueConfig};
use mail_triage::error::LlmError;
use mail_triage::generator::{ResponseGenerator, ResponseStatus, TemplateModel};
use mail_triage::ingest::{IngestOutcome, RawMessage};
use mail_triage::knowledge::{seed_defaults, HashEmbedder, KnowledgeStore};
use mail_triage::llm::{CompletionRequest, CompletionResponse, GenerativeModel};
use mail_triage::pipeline::{MessageStatus, Orchestrator, OrchestratorDeps};
use mail_triage::queue::WorkQueue;
use mail_triage::store::{Database, LibSqlBackend};

/// Model that always sleeps past the generation timeout.
struct HangingModel;

#[async_trait]
impl GenerativeModel for HangingModel {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!()
    }

    fn model_name(&self) -> &str {
        "hanging"
    }
}

struct Harness {
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn Database>,
}

async fn harness_with(
    model: Arc<dyn GenerativeModel>,
    generation: GenerationConfig,
    queue_config: QueueConfig,
) -> Harness {
    let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let knowledge = Arc::new(KnowledgeStore::new(
        store.clone(),
        Arc::new(HashEmbedder::new()),
    ));
    seed_defaults(&knowledge).await.unwrap();

    let engine = Arc::new(AnalysisEngine::new(
        AnalysisConfig::default(),
        store.clone(),
        None,
    ));
    let queue = Arc::new(WorkQueue::new(store.clone(), queue_config.clone()));
    let generator = Arc::new(ResponseGenerator::new(knowledge, model, generation));

    let orchestrator = Arc::new(Orchestrator::new(OrchestratorDeps {
        store: store.clone(),
        engine,
        queue,
        generator,
        queue_config,
    }));

    Harness {
        orchestrator,
        store,
    }
}

async fn harness() -> Harness {
    harness_with(
        Arc::new(TemplateModel::new()),
        GenerationConfig::default(),
        QueueConfig::default(),
    )
    .await
}

fn raw(provider_id: &str, subject: &str, body: &str) -> RawMessage {
    RawMessage {
        provider_message_id: Some(provider_id.into()),
        sender: "customer@example.com".into(),
        subject: subject.into(),
        body: body.into(),
        received_at: Utc::now(),
        provider_metadata: serde_json::json!({"source": "test"}),
    }
}

fn accepted_id(outcome: IngestOutcome) -> String {
    match outcome {
        IngestOutcome::Accepted(message) => message.id,
        IngestOutcome::Duplicate(kind) => panic!("unexpected duplicate: {kind:?}"),
    }
}

#[tokio::test]
async fn urgent_frustrated_email_is_drafted_first_with_empathy() {
    let h = harness().await;

    // A normal-priority question arrives first...
    let normal_id = accepted_id(
        h.orchestrator
            .ingest_and_enqueue(raw(
                "e2e-normal",
                "Question about plans",
                "Could you tell me more about the available subscription plans?",
            ))
            .await
            .unwrap(),
    );

    // ...then an urgent, frustrated login email.
    let urgent_id = accepted_id(
        h.orchestrator
            .ingest_and_enqueue(raw(
                "e2e-urgent",
                "Cannot access my account",
                "This is terrible. I cannot access my account and I am blocked \
                 from work. Please fix this immediately, it is critical.",
            ))
            .await
            .unwrap(),
    );

    // The urgent message jumps the line.
    assert!(h.orchestrator.process_next().await.unwrap());
    let urgent = h.store.get_message(&urgent_id).await.unwrap().unwrap();
    let normal = h.store.get_message(&normal_id).await.unwrap().unwrap();
    assert_eq!(urgent.status, MessageStatus::Drafted);
    assert_eq!(normal.status, MessageStatus::Queued);

    // And its draft opens with empathy, since sentiment was negative.
    let draft = h.store.latest_response(&urgent_id).await.unwrap().unwrap();
    assert!(
        draft.content.contains("apologize"),
        "expected empathetic opening in: {}",
        draft.content
    );
    assert!(!draft.used_item_ids.is_empty());

    // The normal message still gets drafted afterwards.
    assert!(h.orchestrator.process_next().await.unwrap());
    let normal = h.store.get_message(&normal_id).await.unwrap().unwrap();
    assert_eq!(normal.status, MessageStatus::Drafted);
}

#[tokio::test]
async fn same_provider_id_yields_one_message_and_one_draft() {
    let h = harness().await;

    let first = h
        .orchestrator
        .ingest_and_enqueue(raw("e2e-dup", "Refund", "I would like a refund for my order."))
        .await
        .unwrap();
    assert!(!first.is_duplicate());

    let second = h
        .orchestrator
        .ingest_and_enqueue(raw("e2e-dup", "Refund", "I would like a refund for my order."))
        .await
        .unwrap();
    assert!(second.is_duplicate());

    assert_eq!(h.store.count_messages().await.unwrap(), 1);

    // Exactly one queue entry to drain.
    assert!(h.orchestrator.process_next().await.unwrap());
    assert!(!h.orchestrator.process_next().await.unwrap());
}

#[tokio::test]
async fn repeated_timeouts_fail_the_message_with_attempt_count() {
    let generation = GenerationConfig {
        model_timeout: Duration::from_millis(50),
        backoff_base: Duration::from_millis(5),
        max_attempts: 3,
        ..GenerationConfig::default()
    };
    let h = harness_with(Arc::new(HangingModel), generation, QueueConfig::default()).await;

    let id = accepted_id(
        h.orchestrator
            .ingest_and_enqueue(raw("e2e-timeout", "Slow", "This will never complete."))
            .await
            .unwrap(),
    );

    assert!(h.orchestrator.process_next().await.unwrap());

    let message = h.store.get_message(&id).await.unwrap().unwrap();
    assert_eq!(message.status, MessageStatus::Failed);
    assert_eq!(message.attempt_count, 3);
    let note = message.failure_note.expect("failure note recorded");
    assert!(note.contains("3 attempts"), "note: {note}");

    // A failed response record carries the note for reviewers; no draft.
    let response = h.store.latest_response(&id).await.unwrap().unwrap();
    assert_eq!(response.status, ResponseStatus::Failed);
    assert_eq!(response.attempts, 3);
    assert!(response.content.contains("3 attempts"));
}

#[tokio::test]
async fn expired_lease_requeues_without_losing_the_message() {
    let queue_config = QueueConfig {
        lease_duration: Duration::ZERO,
        ..QueueConfig::default()
    };
    let h = harness_with(
        Arc::new(TemplateModel::new()),
        GenerationConfig::default(),
        queue_config,
    )
    .await;

    let id = accepted_id(
        h.orchestrator
            .ingest_and_enqueue(raw(
                "e2e-lease",
                "Outage report",
                "The system has been down for an hour, please advise.",
            ))
            .await
            .unwrap(),
    );

    // Simulate a worker that claimed the entry and died: mark the message
    // generating by hand, then sweep with a zero-length lease.
    let queue = WorkQueue::new(h.store.clone(), QueueConfig {
        lease_duration: Duration::ZERO,
        ..QueueConfig::default()
    });
    let lease = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(lease.message_id, id);
    h.store
        .update_message_status(&id, MessageStatus::Generating)
        .await
        .unwrap();

    let released = h.orchestrator.sweep_expired().await.unwrap();
    assert_eq!(released, 1);

    let message = h.store.get_message(&id).await.unwrap().unwrap();
    assert_eq!(message.status, MessageStatus::Queued);

    // A healthy worker now finishes the job; nothing was lost.
    assert!(h.orchestrator.process_next().await.unwrap());
    let message = h.store.get_message(&id).await.unwrap().unwrap();
    assert_eq!(message.status, MessageStatus::Drafted);
}

#[tokio::test]
async fn regeneration_produces_a_fresh_draft_and_supersedes_the_old() {
    let h = harness().await;

    let id = accepted_id(
        h.orchestrator
            .ingest_and_enqueue(raw(
                "e2e-regen",
                "Billing problem",
                "I was charged twice on my last invoice, please help.",
            ))
            .await
            .unwrap(),
    );
    assert!(h.orchestrator.process_next().await.unwrap());
    let first = h.store.latest_response(&id).await.unwrap().unwrap();

    h.orchestrator.request_regeneration(&id).await.unwrap();
    assert!(h.orchestrator.process_next().await.unwrap());

    let latest = h.store.latest_response(&id).await.unwrap().unwrap();
    assert_ne!(latest.id, first.id);

    let message = h.store.get_message(&id).await.unwrap().unwrap();
    assert_eq!(message.status, MessageStatus::Drafted);
}
