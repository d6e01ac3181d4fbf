//! Core Types
//!
//! Data model and unified error types shared across the crate.

pub mod candidate;
pub mod error;

pub use candidate::{DocumentCandidate, GenerationRequest, MergeStrategy, PipelineOutcome};
pub use error::{
    ErrorClassifier, ErrorKind, GenerationError, LoomError, RETRYABLE_KINDS, Result,
};
