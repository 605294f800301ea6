//! RAG response generation.
//!
//! A draft is produced by retrieving relevant knowledge items, assembling a
//! grounded prompt, calling the generative model under a hard timeout, and
//! gating the output for obvious scaffolding leakage before it is accepted.

mod prompt;
mod quality;
mod rag;
mod template;
mod types;

pub use rag::ResponseGenerator;
pub use template::TemplateModel;
pub use types::{DraftResponse, GenerationFailure, ResponseRecord, ResponseStatus};
