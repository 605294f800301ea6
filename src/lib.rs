//! Mail Triage — support email triage and response drafting pipeline.

pub mod analysis;
pub mod config;
pub mod error;
pub mod generator;
pub mod ingest;
pub mod knowledge;
pub mod llm;
pub mod pipeline;
pub mod queue;
pub mod store;

pub use error::{Error, Result};
