//! Unified Error Type System
//!
//! Centralized error types for the entire crate.
//! Provides explicit error classification for retry and circuit breaker decisions.
//!
//! ## Error Kinds
//!
//! - **InvalidArgument**: Request is malformed (fail fast, don't retry)
//! - **ResourceExhausted**: Rate limiting / quota (retry with backoff)
//! - **Unavailable**: Backend temporarily down (retry with backoff)
//! - **DeadlineExceeded**: Call timed out (retry with backoff)
//! - **Internal**: Unclassified server-side failure (conservative retry)
//! - **CircuitOpen**: Synthetic, produced locally when the breaker rejects
//!   a call without attempting the network (never retried)
//!
//! ## Design Principles
//!
//! - Single unified error type (LoomError) for the entire crate
//! - Classification through an explicit mapping table, not ad-hoc substring
//!   matching; unrecognized codes fall back to `Internal`
//! - The set of retryable kinds is a named constant

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Kinds
// =============================================================================

/// Classified generation failure kinds driving retry and breaker decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Request malformed or rejected by the backend - don't retry
    InvalidArgument,
    /// Rate limited or quota exhausted - retry after backoff
    ResourceExhausted,
    /// Backend temporarily unavailable - retry after backoff
    Unavailable,
    /// Call exceeded its deadline - retry after backoff
    DeadlineExceeded,
    /// Unclassified server-side failure - conservative retry
    Internal,
    /// Circuit breaker rejected the call locally - don't retry
    CircuitOpen,
}

/// Kinds eligible for retry by [`crate::client::retry::RetryPolicy`].
///
/// `InvalidArgument` and `CircuitOpen` are deliberately absent: both are
/// terminal at the call site and propagate to the caller.
pub const RETRYABLE_KINDS: [ErrorKind; 4] = [
    ErrorKind::ResourceExhausted,
    ErrorKind::Unavailable,
    ErrorKind::DeadlineExceeded,
    ErrorKind::Internal,
];

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            Self::ResourceExhausted => write!(f, "RESOURCE_EXHAUSTED"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::DeadlineExceeded => write!(f, "DEADLINE_EXCEEDED"),
            Self::Internal => write!(f, "INTERNAL"),
            Self::CircuitOpen => write!(f, "CIRCUIT_OPEN"),
        }
    }
}

impl ErrorKind {
    /// Check if this kind is retryable on the same endpoint
    pub fn is_retryable(&self) -> bool {
        RETRYABLE_KINDS.contains(self)
    }
}

// =============================================================================
// Generation Error
// =============================================================================

/// Classified generation failure with kind, context, and endpoint
#[derive(Debug, Clone)]
pub struct GenerationError {
    /// Error kind for retry/breaker decisions
    pub kind: ErrorKind,
    /// Detailed error message
    pub message: String,
    /// Endpoint that produced the error
    pub endpoint: Option<String>,
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(endpoint) = &self.endpoint {
            write!(f, "[{}:{}] {}", endpoint, self.kind, self.message)
        } else {
            write!(f, "[{}] {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for GenerationError {}

impl GenerationError {
    /// Create a new generation error
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            endpoint: None,
        }
    }

    /// Create error with endpoint context
    pub fn with_endpoint(
        kind: ErrorKind,
        message: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            endpoint: Some(endpoint.into()),
        }
    }

    /// Synthetic error for calls rejected by an open circuit
    pub fn circuit_open(endpoint: impl Into<String>) -> Self {
        Self::with_endpoint(
            ErrorKind::CircuitOpen,
            "circuit breaker open, call not attempted",
            endpoint,
        )
    }

    /// Check if this error is retryable on the same endpoint
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Known remote error codes mapped to kinds.
///
/// Matched case-insensitively against the backend's error code field.
/// Anything not in this table classifies as `Internal`.
const CODE_TABLE: &[(&str, ErrorKind)] = &[
    ("INVALID_ARGUMENT", ErrorKind::InvalidArgument),
    ("INVALID_REQUEST_ERROR", ErrorKind::InvalidArgument),
    ("CONTEXT_LENGTH_EXCEEDED", ErrorKind::InvalidArgument),
    ("RESOURCE_EXHAUSTED", ErrorKind::ResourceExhausted),
    ("RATE_LIMIT_EXCEEDED", ErrorKind::ResourceExhausted),
    ("RATE_LIMIT_ERROR", ErrorKind::ResourceExhausted),
    ("INSUFFICIENT_QUOTA", ErrorKind::ResourceExhausted),
    ("UNAVAILABLE", ErrorKind::Unavailable),
    ("SERVICE_UNAVAILABLE", ErrorKind::Unavailable),
    ("OVERLOADED_ERROR", ErrorKind::Unavailable),
    ("DEADLINE_EXCEEDED", ErrorKind::DeadlineExceeded),
    ("TIMEOUT", ErrorKind::DeadlineExceeded),
    ("REQUEST_TIMEOUT", ErrorKind::DeadlineExceeded),
    ("INTERNAL", ErrorKind::Internal),
    ("SERVER_ERROR", ErrorKind::Internal),
    ("API_ERROR", ErrorKind::Internal),
];

/// Error classifier mapping backend status codes to [`ErrorKind`]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a backend error code string
    pub fn classify_code(code: &str, message: &str, endpoint: &str) -> GenerationError {
        let normalized = code.trim().to_ascii_uppercase().replace('-', "_");

        let kind = CODE_TABLE
            .iter()
            .find(|(known, _)| *known == normalized)
            .map(|(_, kind)| *kind)
            .unwrap_or(ErrorKind::Internal);

        GenerationError::with_endpoint(kind, message, endpoint)
    }

    /// Classify an HTTP status code directly
    pub fn classify_http_status(status: u16, message: &str, endpoint: &str) -> GenerationError {
        let kind = match status {
            // Auth failures are terminal: retrying a bad key never helps
            400 | 401 | 403 | 404 | 413 | 422 => ErrorKind::InvalidArgument,
            429 => ErrorKind::ResourceExhausted,
            408 | 504 => ErrorKind::DeadlineExceeded,
            502 | 503 | 529 => ErrorKind::Unavailable,
            _ => ErrorKind::Internal,
        };

        GenerationError::with_endpoint(kind, message, endpoint)
    }

    /// Classify a transport-level error from reqwest
    pub fn classify_transport(err: &reqwest::Error, endpoint: &str) -> GenerationError {
        let kind = if err.is_timeout() {
            ErrorKind::DeadlineExceeded
        } else if err.is_connect() {
            ErrorKind::Unavailable
        } else {
            ErrorKind::Internal
        };

        GenerationError::with_endpoint(kind, err.to_string(), endpoint)
    }
}

// =============================================================================
// Crate Error
// =============================================================================

#[derive(Debug, Error)]
pub enum LoomError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Generation Errors
    // -------------------------------------------------------------------------
    /// Classified generation failure with kind and retry hints
    #[error("generation error: {0}")]
    Generation(GenerationError),

    // -------------------------------------------------------------------------
    // Pipeline Errors
    // -------------------------------------------------------------------------
    /// Pipeline stage error carrying the last concrete failure
    #[error("pipeline failed in {stage}: {message}")]
    Pipeline { stage: String, message: String },

    /// Operation timeout with context
    #[error("timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    #[error("document repair failed: {0}")]
    Repair(String),

    #[error("config error: {0}")]
    Config(String),
}

impl From<GenerationError> for LoomError {
    fn from(err: GenerationError) -> Self {
        LoomError::Generation(err)
    }
}

pub type Result<T> = std::result::Result<T, LoomError>;

impl LoomError {
    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a pipeline stage error
    pub fn pipeline(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Pipeline {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Check if this error can be retried at the call site
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Generation(e) => e.is_retryable(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
