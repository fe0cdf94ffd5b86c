//! Engine configuration.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. Explicit path (if provided)
//! 2. `~/.munin/config.toml` (user)
//! 3. `/etc/munin/config.toml` (system)
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration.
//!
//! ```toml
//! [pool]
//! workers = 5
//! task_timeout_secs = 300
//!
//! [cache]
//! enabled = true
//! max_bytes = 104857600
//!
//! [limits]
//! default_row_limit = 1000
//! query_timeout_secs = 60
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::cache::DEFAULT_MAX_BYTES;
use crate::pool::{DEFAULT_TASK_TIMEOUT, DEFAULT_WORKERS};
use crate::types::{DEFAULT_ROW_LIMIT, HARD_ROW_CEILING};
use crate::{MuninError, Result};

/// Engine configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Worker pool settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Number of workers (default: 5).
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Per-component time budget in seconds (default: 300).
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            task_timeout_secs: default_task_timeout(),
        }
    }
}

impl PoolConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_task_timeout() -> u64 {
    DEFAULT_TASK_TIMEOUT.as_secs()
}

/// Result cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// Disable to bypass the cache entirely (default: enabled).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Size budget in bytes (default: 100 MB).
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_bytes: default_max_bytes(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_bytes() -> usize {
    DEFAULT_MAX_BYTES
}

/// Query limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Row limit for components that configure none (default: 1000).
    #[serde(default = "default_row_limit")]
    pub default_row_limit: usize,
    /// Advisory per-query timeout forwarded to executors (default: 60).
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            default_row_limit: default_row_limit(),
            query_timeout_secs: default_query_timeout(),
        }
    }
}

impl LimitsConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

fn default_row_limit() -> usize {
    DEFAULT_ROW_LIMIT
}

fn default_query_timeout() -> u64 {
    60
}

impl EngineConfig {
    /// Load configuration from the standard locations.
    ///
    /// An explicit path must exist. Without one, the first existing file of
    /// `~/.munin/config.toml` and `/etc/munin/config.toml` is used, falling
    /// back to defaults when neither exists.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let Some(path) = Self::resolve_config_path(explicit_path)? else {
            debug!("no config file found, using defaults");
            return Ok(Self::default());
        };
        let content = fs::read_to_string(&path).map_err(|e| {
            MuninError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        let config = Self::from_toml_str(&content).map_err(|e| {
            MuninError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })?;
        debug!(?path, "loaded config");
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| MuninError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pool.workers == 0 {
            return Err(MuninError::Configuration(
                "pool.workers must be at least 1".to_string(),
            ));
        }
        if self.pool.task_timeout_secs == 0 {
            return Err(MuninError::Configuration(
                "pool.task_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.limits.default_row_limit > HARD_ROW_CEILING {
            return Err(MuninError::Configuration(format!(
                "limits.default_row_limit {} exceeds maximum allowed limit of {HARD_ROW_CEILING}",
                self.limits.default_row_limit
            )));
        }
        Ok(())
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(MuninError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".munin").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/munin/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }
}
