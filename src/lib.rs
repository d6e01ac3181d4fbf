//! DocLoom - Resilient Document Generation over Unreliable LLM Backends
//!
//! A resilience and reconstruction layer for JSON document generation:
//! every call to the backend is wrapped in retries with jittered backoff and
//! a per-endpoint circuit breaker, every response is checked for structural
//! completeness against a configurable schema, and truncated or malformed
//! responses are rebuilt through continuation merging and bounded repair
//! before the best of N candidates is selected.
//!
//! ## Core Features
//!
//! - **Retry Policy**: Exponential backoff with symmetric jitter
//! - **Circuit Breaker**: Per-endpoint, with a single half-open trial
//! - **Completeness Checking**: Schema-driven, catches cut-off URLs and
//!   unbalanced structures that still parse
//! - **Continuation Merging**: Five ordered strategies to rebuild one
//!   document from a truncated response and its continuation
//! - **Best-of-N Pipeline**: Concurrent candidates, comparative scoring
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use docloom::{
//!     BreakerRegistry, CandidatePipeline, ConfigLoader, GenerationClient,
//!     GenerationRequest, HttpGenerator,
//! };
//!
//! let config = ConfigLoader::load()?;
//! let generator = Arc::new(HttpGenerator::new(config.backend.clone())?);
//! let registry = BreakerRegistry::new(config.circuit_breaker.breaker_config());
//! let client = GenerationClient::new(generator, config.retry.policy(), &registry);
//!
//! let pipeline = CandidatePipeline::new(client, config.schema, config.pipeline)?;
//! let request = GenerationRequest::new("write the newsletter document", &config.backend.model);
//! let outcome = pipeline.run(&request).await?;
//! ```
//!
//! ## Modules
//!
//! - [`client`]: Retry policy, circuit breaker, backend transport
//! - [`validation`]: Completeness checking, continuation merging, repair
//! - [`pipeline`]: Best-of-N candidate orchestration and scoring
//! - [`config`]: Layered Figment configuration

pub mod client;
pub mod config;
pub mod constants;
pub mod pipeline;
pub mod timeout;
pub mod types;
pub mod validation;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{CircuitConfig, Config, ConfigLoader, PipelineConfig, RetryConfig};

// Error Types
pub use types::{ErrorKind, GenerationError, LoomError, Result};

// Requests and Outcomes
pub use types::{DocumentCandidate, GenerationRequest, MergeStrategy, PipelineOutcome};

// =============================================================================
// Client Re-exports
// =============================================================================

pub use client::{
    BackendConfig, BreakerRegistry, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats,
    CircuitState, GenerationClient, Generator, HttpGenerator, RetryPolicy, SharedGenerator,
};

pub use timeout::{with_timeout, with_timeout_map};

// =============================================================================
// Validation Re-exports
// =============================================================================

pub use validation::{
    Completeness, CompletenessChecker, ComponentRule, ContinuationMerger, DocumentRepairer,
    MergeOutcome, RequiredSchema,
};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use pipeline::{CandidatePipeline, CandidateReport, PipelineStage, PipelineStats};
