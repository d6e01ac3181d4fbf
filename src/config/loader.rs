//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (~/.config/docloom/config.toml)
//! 3. Project config (.docloom/config.toml)
//! 4. Environment variables (DOCLOOM_* prefix)

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use tracing::debug;

use super::types::Config;
use crate::types::{LoomError, Result};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain using Figment:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Merge global config
        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        // Merge project config
        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from: {}", project_path.display());
            figment = figment.merge(Toml::file(&project_path));
        }

        // Merge environment variables (e.g., DOCLOOM_RETRY_MAX_RETRIES -> retry.max_retries)
        figment = figment.merge(Env::prefixed("DOCLOOM_").split('_').lowercase(true));

        let config: Config = figment
            .extract()
            .map_err(|e| LoomError::Config(format!("Configuration error: {}", e)))?;

        // Validate configuration after loading
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| LoomError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Get path to global config file (~/.config/docloom/config.toml)
    pub fn global_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "docloom").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get path to project config file
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".docloom/config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_default_config() {
        let config = ConfigLoader::load().unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[retry]
max_retries = 7

[pipeline]
candidates = 5
"#,
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.retry.max_retries, 7);
        assert_eq!(config.pipeline.candidates, 5);
        // Unset sections keep their defaults
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
    }

    #[test]
    fn test_load_from_file_rejects_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[retry]
jitter_factor = 3.0
"#,
        )
        .unwrap();

        assert!(ConfigLoader::load_from_file(&path).is_err());
    }
}
