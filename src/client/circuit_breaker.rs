//! Circuit Breaker for Generation Endpoint Resilience
//!
//! Per-endpoint failure-rate state machine gating whether a call is attempted
//! at all.
//!
//! ## States
//!
//! - **Closed**: Normal operation, calls flow through
//! - **Open**: Endpoint is failing, calls are rejected immediately
//! - **HalfOpen**: Testing recovery, exactly one trial call permitted
//!
//! ## Transitions
//!
//! ```text
//! Closed --[failure_threshold reached]--> Open
//! Open --[reset_timeout elapsed]--> HalfOpen
//! HalfOpen --[trial success]--> Closed
//! HalfOpen --[trial failure]--> Open
//! ```

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::constants::circuit_breaker as cb_constants;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - calls flow through
    Closed,
    /// Endpoint is failing - calls rejected immediately
    Open,
    /// Testing recovery - one trial call allowed
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,
    /// Duration to wait before permitting a half-open trial
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: cb_constants::FAILURE_THRESHOLD,
            reset_timeout: Duration::from_secs(cb_constants::RESET_TIMEOUT_SECS),
        }
    }
}

/// Unified internal state - all mutable state in a single struct behind one
/// mutex so transitions stay atomic under concurrent candidate tasks
#[derive(Debug)]
struct CircuitBreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    /// When the outstanding half-open trial permit was granted. A trial
    /// that never resolves (caller cancelled mid-flight) goes stale after
    /// `reset_timeout` and the permit is re-issued.
    trial_started: Option<Instant>,
    blocked_count: u64,
}

impl CircuitBreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            trial_started: None,
            blocked_count: 0,
        }
    }

    fn reopen(&mut self) {
        self.state = CircuitState::Open;
        self.last_failure = Some(Instant::now());
        self.trial_started = None;
    }
}

/// Thread-safe circuit breaker with unified state management.
///
/// One instance per logical endpoint, shared by all concurrent candidate
/// tasks; lifetime matches the process.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    endpoint: String,
    inner: Mutex<CircuitBreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker for an endpoint
    pub fn new(endpoint: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            endpoint: endpoint.into(),
            inner: Mutex::new(CircuitBreakerInner::new()),
        }
    }

    /// Create with default configuration
    pub fn with_defaults(endpoint: impl Into<String>) -> Self {
        Self::new(endpoint, CircuitBreakerConfig::default())
    }

    /// Get current circuit state (applying the open -> half-open timeout)
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.apply_timeout(&mut inner);
        inner.state
    }

    /// Check if a call may proceed, consuming the half-open trial permit.
    ///
    /// Returns `true` if the call can be attempted, `false` if the circuit
    /// rejects it without a network call. A trial permit whose call never
    /// resolved (the caller was cancelled) goes stale after `reset_timeout`
    /// and is re-issued, so an abandoned trial cannot wedge the endpoint.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.lock();
        self.apply_timeout(&mut inner);

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                inner.blocked_count += 1;
                tracing::debug!(
                    endpoint = %self.endpoint,
                    "circuit breaker: call blocked (circuit OPEN)"
                );
                false
            }
            CircuitState::HalfOpen => {
                match inner.trial_started {
                    Some(started) if started.elapsed() <= self.config.reset_timeout => {
                        inner.blocked_count += 1;
                        tracing::debug!(
                            endpoint = %self.endpoint,
                            "circuit breaker: trial already in flight"
                        );
                        false
                    }
                    Some(_) => {
                        // Stale permit: the trial call was abandoned
                        inner.trial_started = Some(Instant::now());
                        tracing::warn!(
                            endpoint = %self.endpoint,
                            "circuit breaker: unresolved trial went stale, re-issuing permit"
                        );
                        true
                    }
                    None => {
                        inner.trial_started = Some(Instant::now());
                        tracing::debug!(
                            endpoint = %self.endpoint,
                            "circuit breaker: allowing half-open trial call"
                        );
                        true
                    }
                }
            }
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut inner = self.lock();

        // Any success resets the consecutive failure count
        inner.failure_count = 0;

        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Closed;
            inner.trial_started = None;
            inner.last_failure = None;

            tracing::info!(
                endpoint = %self.endpoint,
                "circuit breaker: closed (endpoint recovered)"
            );
        }
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                inner.last_failure = Some(Instant::now());

                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;

                    tracing::warn!(
                        endpoint = %self.endpoint,
                        failures = inner.failure_count,
                        reset_timeout = ?self.config.reset_timeout,
                        "circuit breaker: opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                // The trial failed; back to open with a fresh timeout window
                inner.reopen();

                tracing::warn!(
                    endpoint = %self.endpoint,
                    "circuit breaker: re-opened after failed trial"
                );
            }
            CircuitState::Open => {}
        }
    }

    /// Get statistics for monitoring
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.lock();

        CircuitBreakerStats {
            endpoint: self.endpoint.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            blocked_count: inner.blocked_count,
            time_since_failure: inner.last_failure.map(|t| t.elapsed()),
        }
    }

    /// Force reset to closed state (manual intervention)
    pub fn reset(&self) {
        let mut inner = self.lock();
        *inner = CircuitBreakerInner::new();

        tracing::info!(endpoint = %self.endpoint, "circuit breaker: manually reset to CLOSED");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CircuitBreakerInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open -> half-open once the reset timeout has elapsed
    fn apply_timeout(&self, inner: &mut CircuitBreakerInner) {
        if inner.state == CircuitState::Open
            && let Some(last_failure) = inner.last_failure
            && last_failure.elapsed() > self.config.reset_timeout
        {
            inner.state = CircuitState::HalfOpen;
            inner.trial_started = None;

            tracing::info!(
                endpoint = %self.endpoint,
                "circuit breaker: transitioning to HALF_OPEN (testing recovery)"
            );
        }
    }
}

/// Statistics for monitoring circuit breaker state
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub endpoint: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub blocked_count: u64,
    pub time_since_failure: Option<Duration>,
}

impl CircuitBreakerStats {
    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        let time_str = self
            .time_since_failure
            .map(|d| format!(" last_failure {:.1}s ago", d.as_secs_f64()))
            .unwrap_or_default();

        format!(
            "[{}] {} | failures={} blocked={}{}",
            self.endpoint, self.state, self.failure_count, self.blocked_count, time_str
        )
    }
}

// =============================================================================
// Breaker Registry
// =============================================================================

/// Per-endpoint breaker map shared across pipeline clones.
///
/// Lock-free reads via DashMap; each breaker serializes its own transitions.
#[derive(Clone, Default)]
pub struct BreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: Arc::new(DashMap::new()),
        }
    }

    /// Get or create the breaker for an endpoint
    pub fn breaker(&self, endpoint: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(endpoint.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(endpoint, self.config.clone()))
            })
            .clone()
    }

    /// Stats for all registered endpoints
    pub fn stats(&self) -> Vec<CircuitBreakerStats> {
        self.breakers
            .iter()
            .map(|entry| entry.value().stats())
            .collect()
    }

    /// Reset every registered breaker
    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config(threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            reset_timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn test_initial_state_is_closed() {
        let cb = CircuitBreaker::with_defaults("primary");
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_execute());
    }

    #[test]
    fn test_opens_after_exact_threshold() {
        let cb = CircuitBreaker::new("primary", fast_config(3));

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_execute());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_execute());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let cb = CircuitBreaker::new("primary", fast_config(3));

        cb.record_failure();
        cb.record_failure();
        cb.record_success();

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_permits_exactly_one_trial() {
        let cb = CircuitBreaker::new("primary", fast_config(1));

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(60));

        // Exactly one permit, then rejection until the trial resolves
        assert!(cb.can_execute());
        assert!(!cb.can_execute());
        assert!(!cb.can_execute());
    }

    #[test]
    fn test_half_open_trial_success_closes() {
        let cb = CircuitBreaker::new("primary", fast_config(1));

        cb.record_failure();
        std::thread::sleep(Duration::from_millis(60));

        assert!(cb.can_execute());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_execute());
    }

    #[test]
    fn test_abandoned_trial_permit_is_reissued() {
        let cb = CircuitBreaker::new("primary", fast_config(1));

        cb.record_failure();
        std::thread::sleep(Duration::from_millis(60));

        // Trial granted but never resolved (caller cancelled mid-flight)
        assert!(cb.can_execute());
        assert!(!cb.can_execute());

        // The stale permit must not wedge the endpoint forever
        std::thread::sleep(Duration::from_millis(60));
        assert!(cb.can_execute());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_trial_failure_reopens() {
        let cb = CircuitBreaker::new("primary", fast_config(1));

        cb.record_failure();
        std::thread::sleep(Duration::from_millis(60));

        assert!(cb.can_execute());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_execute());
    }

    #[test]
    fn test_blocked_count() {
        // Long timeout so the circuit stays open for the whole test
        let cb = CircuitBreaker::new(
            "primary",
            CircuitBreakerConfig {
                failure_threshold: 1,
                reset_timeout: Duration::from_secs(60),
            },
        );

        cb.record_failure();
        assert!(!cb.can_execute());
        assert!(!cb.can_execute());
        assert!(!cb.can_execute());

        assert_eq!(cb.stats().blocked_count, 3);
    }

    #[test]
    fn test_manual_reset() {
        let cb = CircuitBreaker::new(
            "primary",
            CircuitBreakerConfig {
                failure_threshold: 1,
                reset_timeout: Duration::from_secs(60),
            },
        );

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_execute());
    }

    #[test]
    fn test_registry_shares_breakers() {
        let registry = BreakerRegistry::new(fast_config(1));
        let a = registry.breaker("primary");
        let b = registry.breaker("primary");

        a.record_failure();
        assert_eq!(b.state(), CircuitState::Open);

        assert_eq!(registry.stats().len(), 1);
    }
}
