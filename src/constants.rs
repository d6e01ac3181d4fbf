//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Retry policy constants
pub mod retry {
    /// Maximum retry attempts per generation call
    pub const MAX_RETRIES: u32 = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 1_000;

    /// Maximum delay between retries (seconds)
    pub const MAX_DELAY_SECS: u64 = 30;

    /// Exponential backoff base
    pub const EXPONENTIAL_BASE: f64 = 2.0;

    /// Symmetric jitter factor applied to the exponential delay
    pub const JITTER_FACTOR: f64 = 0.1;
}

/// Circuit breaker constants
pub mod circuit_breaker {
    /// Number of consecutive failures before opening circuit
    pub const FAILURE_THRESHOLD: u32 = 5;

    /// Duration to wait before attempting recovery (seconds)
    pub const RESET_TIMEOUT_SECS: u64 = 60;
}

/// Candidate pipeline constants
pub mod pipeline {
    /// Default number of independent generation candidates per run
    pub const DEFAULT_CANDIDATES: usize = 3;

    /// Continuation rounds allowed per candidate before routing to repair
    pub const MAX_CONTINUATION_ROUNDS: usize = 1;

    /// Repair-via-service escalations allowed per candidate
    pub const MAX_REPAIR_ESCALATIONS: usize = 1;

    /// Overall pipeline run deadline (seconds)
    pub const RUN_DEADLINE_SECS: u64 = 600;
}

/// HTTP/Network constants
pub mod network {
    /// Default request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

    /// Connection timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 30;
}

/// Generation sampling defaults
pub mod sampling {
    /// Default sampling temperature
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;

    /// Default nucleus sampling parameter
    pub const DEFAULT_TOP_P: f32 = 0.95;

    /// Default output token ceiling
    pub const DEFAULT_MAX_OUTPUT_TOKENS: usize = 8_192;
}
