//! Deduplicated message ingestion.
//!
//! Raw messages from any fetch source enter through [`IngestGate::ingest`],
//! which computes a stable identity key and reserves it atomically against
//! the durable store. A message whose key is already reserved is reported as
//! a duplicate and produces no new row.

mod gate;
mod types;

pub use gate::IngestGate;
pub use types::{DuplicateKind, IngestOutcome, Message, RawMessage};
