//! Generation Client
//!
//! Wraps a single call to the external generation service with circuit
//! breaker and retry policy, classifying raw failures into the
//! [`ErrorKind`](crate::types::ErrorKind) taxonomy.
//!
//! ## Strategy
//!
//! 1. Check the endpoint's circuit breaker before every network call
//! 2. Perform the call; record success/failure in the breaker
//! 3. On a retryable failure, sleep for the policy's backoff and retry
//! 4. Non-retryable failures propagate immediately to the caller
//!
//! Constructed explicitly and injected wherever generation is needed; there
//! is no ambient global client.

pub mod circuit_breaker;
pub mod provider;
pub mod retry;

pub use circuit_breaker::{
    BreakerRegistry, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState,
};
pub use provider::{BackendConfig, Generator, HttpGenerator, SharedGenerator};
pub use retry::RetryPolicy;

use std::sync::Arc;
use std::time::Instant;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::types::{GenerationError, GenerationRequest};

/// Resilient wrapper around one generation endpoint.
///
/// Cheap to clone; clones share the endpoint's circuit breaker.
#[derive(Clone)]
pub struct GenerationClient {
    generator: SharedGenerator,
    breaker: Arc<CircuitBreaker>,
    policy: RetryPolicy,
}

impl GenerationClient {
    /// Create a client for a generator, keying its breaker by endpoint name
    pub fn new(generator: SharedGenerator, policy: RetryPolicy, registry: &BreakerRegistry) -> Self {
        let breaker = registry.breaker(generator.name());
        Self {
            generator,
            breaker,
            policy,
        }
    }

    /// Endpoint name of the wrapped generator
    pub fn endpoint(&self) -> &str {
        self.generator.name()
    }

    /// Breaker statistics for this endpoint
    pub fn breaker_stats(&self) -> CircuitBreakerStats {
        self.breaker.stats()
    }

    /// Perform one logical generation call with retries
    pub async fn call(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<String, GenerationError> {
        self.call_with_deadline(request, None).await
    }

    /// Perform one logical generation call, giving up at `deadline`.
    ///
    /// The deadline is checked at the top of every retry iteration so a
    /// cancelled pipeline run stops issuing calls promptly.
    pub async fn call_with_deadline(
        &self,
        request: &GenerationRequest,
        deadline: Option<Instant>,
    ) -> std::result::Result<String, GenerationError> {
        let endpoint = self.generator.name();
        let mut last_error: Option<GenerationError> = None;

        for attempt in 0..=self.policy.max_retries {
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                return Err(GenerationError::with_endpoint(
                    crate::types::ErrorKind::DeadlineExceeded,
                    "pipeline deadline elapsed before call",
                    endpoint,
                ));
            }

            // A rejected call is not a retry attempt against the policy
            if !self.breaker.can_execute() {
                return Err(GenerationError::circuit_open(endpoint));
            }

            debug!(
                endpoint,
                attempt,
                max_retries = self.policy.max_retries,
                "generation attempt"
            );

            match self.generator.generate(request).await {
                Ok(text) => {
                    self.breaker.record_success();
                    return Ok(text);
                }
                Err(err) => {
                    self.breaker.record_failure();

                    warn!(
                        endpoint,
                        attempt,
                        kind = %err.kind,
                        error = %err.message,
                        "generation attempt failed"
                    );

                    if self.policy.should_retry(attempt, &err) {
                        let delay = self.policy.next_delay(attempt);
                        debug!(endpoint, delay_ms = delay.as_millis() as u64, "backing off");
                        last_error = Some(err);
                        sleep(delay).await;
                    } else {
                        // Non-retryable or retries exhausted: propagate as-is
                        return Err(err);
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            GenerationError::with_endpoint(
                crate::types::ErrorKind::Internal,
                "retry loop exhausted without a recorded error",
                endpoint,
            )
        }))
    }
}
