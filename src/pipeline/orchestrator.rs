//! Pipeline orchestration: ingest-to-queue and the generation worker loop.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::analysis::AnalysisEngine;
use crate::config::QueueConfig;
use crate::error::{Error, PipelineError};
use crate::generator::{ResponseGenerator, ResponseRecord};
use crate::ingest::{IngestGate, IngestOutcome, Message, RawMessage};
use crate::pipeline::state::MessageStatus;
use crate::queue::{LeasedEntry, WorkQueue};
use crate::store::Database;

/// Shared dependencies for the orchestrator.
pub struct OrchestratorDeps {
    pub store: Arc<dyn Database>,
    pub engine: Arc<AnalysisEngine>,
    pub queue: Arc<WorkQueue>,
    pub generator: Arc<ResponseGenerator>,
    pub queue_config: QueueConfig,
}

/// Handles to running workers; dropping without calling [`WorkerHandles::shutdown`]
/// detaches them.
pub struct WorkerHandles {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerHandles {
    /// Signal shutdown and wait for every worker to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        join_all(self.handles).await;
    }
}

/// Drives messages through the status state machine.
///
/// Every transition is persisted before the next stage runs, so a crash at
/// any point resumes from the last durable status.
pub struct Orchestrator {
    gate: IngestGate,
    deps: OrchestratorDeps,
}

impl Orchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            gate: IngestGate::new(deps.store.clone()),
            deps,
        }
    }

    fn store(&self) -> &Arc<dyn Database> {
        &self.deps.store
    }

    /// Ingest a raw message and, if accepted, analyze and enqueue it.
    ///
    /// Duplicates short-circuit after the gate. Analysis results persist
    /// through the durable cache, so the worker re-reads them for free.
    pub async fn ingest_and_enqueue(&self, raw: RawMessage) -> Result<IngestOutcome, Error> {
        let outcome = self.gate.ingest(raw).await?;
        let IngestOutcome::Accepted(ref message) = outcome else {
            return Ok(outcome);
        };

        let analysis = self.deps.engine.analyze(message).await?;
        self.transition(&message.id, MessageStatus::Analyzed).await?;

        self.deps.queue.enqueue(&message.id, analysis.priority).await?;
        self.transition(&message.id, MessageStatus::Queued).await?;

        info!(
            message_id = %message.id,
            priority = analysis.priority.as_str(),
            category = %analysis.category,
            "Message queued for generation"
        );
        Ok(outcome)
    }

    /// Re-queue a terminal message for a fresh draft.
    ///
    /// The previous draft is marked superseded so reviewers never see two
    /// live drafts for one message.
    pub async fn request_regeneration(&self, message_id: &str) -> Result<(), Error> {
        let message = self.get_message(message_id).await?;
        if !message.status.is_terminal() {
            return Err(PipelineError::InvalidTransition {
                from: message.status.to_string(),
                to: MessageStatus::Queued.to_string(),
            }
            .into());
        }

        let superseded = self.store().supersede_responses(message_id).await?;
        let analysis = self.deps.engine.analyze(&message).await?;
        self.deps.queue.enqueue(message_id, analysis.priority).await?;
        self.transition(message_id, MessageStatus::Queued).await?;

        info!(message_id, superseded, "Regeneration requested");
        Ok(())
    }

    /// Move a still-queued message to another priority lane.
    pub async fn reprioritize(
        &self,
        message_id: &str,
        priority: crate::analysis::Priority,
    ) -> Result<bool, Error> {
        Ok(self.deps.queue.reprioritize(message_id, priority).await?)
    }

    /// Revert expired leases and roll their messages back to `queued`.
    pub async fn sweep_expired(&self) -> Result<usize, Error> {
        let released = self.deps.queue.release_expired().await?;
        for message_id in &released {
            match self.get_message(message_id).await {
                Ok(message) if message.status == MessageStatus::Generating => {
                    self.transition(message_id, MessageStatus::Queued).await?;
                    warn!(message_id, "Lease expired, message re-queued");
                }
                Ok(_) => {}
                Err(e) => warn!(message_id, error = %e, "Released entry for missing message"),
            }
        }
        Ok(released.len())
    }

    /// Claim and process one queue entry. Returns `false` when the queue
    /// was empty.
    pub async fn process_next(&self) -> Result<bool, Error> {
        let Some(lease) = self.deps.queue.dequeue().await? else {
            return Ok(false);
        };
        self.process_entry(lease).await?;
        Ok(true)
    }

    async fn process_entry(&self, lease: LeasedEntry) -> Result<(), Error> {
        let message = match self.get_message(&lease.message_id).await {
            Ok(message) => message,
            Err(e) => {
                // Orphan entry; retire it so it stops cycling.
                warn!(message_id = %lease.message_id, error = %e, "Entry without message");
                self.deps.queue.complete(&lease).await?;
                return Ok(());
            }
        };

        if !message.status.can_transition_to(MessageStatus::Generating) {
            warn!(
                message_id = %message.id,
                status = %message.status,
                "Entry for message not in a runnable state, retiring"
            );
            self.deps.queue.complete(&lease).await?;
            return Ok(());
        }
        self.transition(&message.id, MessageStatus::Generating).await?;

        let analysis = self.deps.engine.analyze(&message).await?;
        let result = self.deps.generator.generate(&message, &analysis).await;

        // Durable state first, lease completion last: a worker that dies
        // anywhere above the completion leaves a leased entry the sweeper
        // redelivers, and the terminal status retires the redelivery
        // without a second model call. A worker that dies before persisting
        // loses nothing but the attempt.
        match result {
            Ok(draft) => {
                self.store()
                    .add_message_attempts(&message.id, draft.attempts)
                    .await?;

                let record = ResponseRecord::from_draft(&message.id, &draft);
                self.store().insert_response(&record).await?;
                self.transition(&message.id, MessageStatus::Drafted).await?;

                if !self.deps.queue.complete(&lease).await? {
                    warn!(message_id = %message.id, "Lease expired after draft was persisted");
                }
                info!(
                    message_id = %message.id,
                    response_id = %record.id,
                    attempts = draft.attempts,
                    latency_ms = draft.latency_ms,
                    "Draft ready for review"
                );
            }
            Err(failure) => {
                self.store()
                    .add_message_attempts(&message.id, failure.attempts())
                    .await?;

                let record = ResponseRecord::from_failure(
                    &message.id,
                    self.deps.generator.model_name(),
                    &failure,
                );
                self.store().insert_response(&record).await?;
                self.store()
                    .set_failure_note(&message.id, &failure.to_string())
                    .await?;
                self.transition(&message.id, MessageStatus::Failed).await?;

                if !self.deps.queue.complete(&lease).await? {
                    warn!(message_id = %message.id, "Lease expired after failure was persisted");
                }
                warn!(message_id = %message.id, failure = %failure, "Generation failed");
            }
        }
        Ok(())
    }

    /// Spawn `n` generation workers plus a lease sweeper.
    pub fn spawn_workers(self: &Arc<Self>, n: usize) -> WorkerHandles {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(n + 1);

        for worker_id in 0..n {
            let orchestrator = self.clone();
            let mut shutdown = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                info!(worker_id, "Worker started");
                orchestrator.worker_loop(worker_id, &mut shutdown).await;
                info!(worker_id, "Worker stopped");
            }));
        }

        {
            let orchestrator = self.clone();
            let mut shutdown = shutdown_rx;
            handles.push(tokio::spawn(async move {
                orchestrator.sweeper_loop(&mut shutdown).await;
            }));
        }

        WorkerHandles {
            shutdown_tx,
            handles,
        }
    }

    async fn worker_loop(&self, worker_id: usize, shutdown: &mut watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.process_next().await {
                Ok(true) => {}
                Ok(false) => {
                    if wait_or_shutdown(shutdown, self.deps.queue_config.poll_interval).await {
                        break;
                    }
                }
                // Storage loss is not recoverable from inside the loop;
                // per-message failures were already absorbed upstream.
                Err(Error::Database(e)) => {
                    error!(worker_id, error = %e, "Worker aborting on database error");
                    break;
                }
                Err(e) => {
                    warn!(worker_id, error = %e, "Entry processing failed, continuing");
                }
            }
        }
    }

    async fn sweeper_loop(&self, shutdown: &mut watch::Receiver<bool>) {
        loop {
            if wait_or_shutdown(shutdown, self.deps.queue_config.sweep_interval).await {
                break;
            }
            match self.sweep_expired().await {
                Ok(0) => {}
                Ok(released) => debug!(released, "Sweep released expired leases"),
                Err(e) => warn!(error = %e, "Lease sweep failed"),
            }
        }
    }

    async fn get_message(&self, id: &str) -> Result<Message, PipelineError> {
        self.store()
            .get_message(id)
            .await?
            .ok_or_else(|| PipelineError::MessageNotFound(id.to_string()))
    }

    /// Persist a status transition after validating it.
    async fn transition(&self, id: &str, to: MessageStatus) -> Result<(), PipelineError> {
        let message = self.get_message(id).await?;
        if !message.status.can_transition_to(to) {
            return Err(PipelineError::InvalidTransition {
                from: message.status.to_string(),
                to: to.to_string(),
            });
        }
        self.store().update_message_status(id, to).await?;
        debug!(message_id = %id, from = %message.status, to = %to, "Status transition");
        Ok(())
    }
}

/// Sleep for `duration`, returning early with `true` if shutdown fires.
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => *shutdown.borrow(),
        _ = shutdown.changed() => true,
    }
}
