//! End-to-end pipeline orchestration.
//!
//! Messages advance through a persisted status state machine:
//! `received → analyzed → queued → generating → drafted | failed`.
//! Every transition is checkpointed to the store, so a crash mid-pipeline
//! resumes from the last durable state instead of restarting from ingestion.

mod orchestrator;
mod state;

pub use orchestrator::{Orchestrator, OrchestratorDeps, WorkerHandles};
pub use state::MessageStatus;
