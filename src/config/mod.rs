//! Configuration Module
//!
//! Layered configuration: built-in defaults, global config, project config,
//! and environment overrides, merged in that order.

pub mod loader;
pub mod types;

pub use loader::ConfigLoader;
pub use types::{CircuitConfig, Config, PipelineConfig, RetryConfig};
