//! Configuration Types
//!
//! All configuration structures with sensible defaults. Every resilience
//! tunable from the retry policy, circuit breaker, and pipeline is exposed
//! here; the required schema rides along so deployments can change what
//! counts as "complete" without code changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::{BackendConfig, CircuitBreakerConfig, RetryPolicy};
use crate::constants::{circuit_breaker as cb_constants, pipeline as pl_constants, retry as retry_constants};
use crate::validation::RequiredSchema;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Retry policy tunables
    pub retry: RetryConfig,

    /// Circuit breaker tunables
    pub circuit_breaker: CircuitConfig,

    /// Candidate pipeline settings
    pub pipeline: PipelineConfig,

    /// Generation backend settings
    pub backend: BackendConfig,

    /// Required document schema
    pub schema: RequiredSchema,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitConfig::default(),
            pipeline: PipelineConfig::default(),
            backend: BackendConfig::default(),
            schema: RequiredSchema::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `LoomError::Config` on validation failure.
    pub fn validate(&self) -> crate::types::Result<()> {
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(crate::types::LoomError::Config(format!(
                "retry jitter_factor must be between 0.0 and 1.0, got {}",
                self.retry.jitter_factor
            )));
        }

        if self.retry.exponential_base < 1.0 {
            return Err(crate::types::LoomError::Config(format!(
                "retry exponential_base must be >= 1.0, got {}",
                self.retry.exponential_base
            )));
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(crate::types::LoomError::Config(
                "circuit_breaker failure_threshold must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.candidates == 0 {
            return Err(crate::types::LoomError::Config(
                "pipeline candidates must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.run_deadline_secs == 0 {
            return Err(crate::types::LoomError::Config(
                "pipeline run_deadline_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Retry Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum retry attempts per generation call
    pub max_retries: u32,
    /// Base delay for exponential backoff (milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay between retries (seconds)
    pub max_delay_secs: u64,
    /// Exponential backoff base
    pub exponential_base: f64,
    /// Symmetric jitter factor in `[0, 1]`
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: retry_constants::MAX_RETRIES,
            base_delay_ms: retry_constants::BASE_DELAY_MS,
            max_delay_secs: retry_constants::MAX_DELAY_SECS,
            exponential_base: retry_constants::EXPONENTIAL_BASE,
            jitter_factor: retry_constants::JITTER_FACTOR,
        }
    }
}

impl RetryConfig {
    /// Build the runtime retry policy
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_secs(self.max_delay_secs),
            exponential_base: self.exponential_base,
            jitter_factor: self.jitter_factor,
        }
    }
}

// =============================================================================
// Circuit Breaker Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Seconds to wait before permitting a half-open trial
    pub reset_timeout_secs: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: cb_constants::FAILURE_THRESHOLD,
            reset_timeout_secs: cb_constants::RESET_TIMEOUT_SECS,
        }
    }
}

impl CircuitConfig {
    /// Build the runtime breaker configuration
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            reset_timeout: Duration::from_secs(self.reset_timeout_secs),
        }
    }
}

// =============================================================================
// Pipeline Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of independent generation candidates per run
    pub candidates: usize,
    /// Overall run deadline (seconds)
    pub run_deadline_secs: u64,
    /// Alternate model substituted once after a non-retryable failure
    pub fallback_model: Option<String>,
    /// Criteria named in the scoring prompt
    pub scoring_criteria: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            candidates: pl_constants::DEFAULT_CANDIDATES,
            run_deadline_secs: pl_constants::RUN_DEADLINE_SECS,
            fallback_model: None,
            scoring_criteria: vec![
                "structural completeness".to_string(),
                "coverage of the requested content".to_string(),
                "internal coherence".to_string(),
            ],
        }
    }
}

impl PipelineConfig {
    pub fn run_deadline(&self) -> Duration {
        Duration::from_secs(self.run_deadline_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_jitter() {
        let mut config = Config::default();
        config.retry.jitter_factor = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_candidates() {
        let mut config = Config::default();
        config.pipeline.candidates = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_config_builds_policy() {
        let config = RetryConfig::default();
        let policy = config.policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_config_roundtrips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.retry.max_retries, config.retry.max_retries);
        assert_eq!(parsed.pipeline.candidates, config.pipeline.candidates);
    }
}
