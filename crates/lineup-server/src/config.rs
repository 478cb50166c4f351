//! RON configuration for a lineup host.
//!
//! Every field is optional; a missing file section falls back to its
//! `Default`. Example:
//!
//! ```ron
//! (
//!     service: (
//!         key_space: (max_len: 32),
//!         rebalance: (proactive: true, max_key_len: 12),
//!     ),
//!     coordinator: (request_timeout: Some((secs: 2, nanos: 0))),
//!     log_filter: "lineup_store=debug,info",
//! )
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use lineup_client::CoordinatorConfig;
use lineup_store::ServiceConfig;

/// Default tracing filter when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineupConfig {
    pub service: ServiceConfig,
    pub coordinator: CoordinatorConfig,
    pub log_filter: String,
}

impl Default for LineupConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            coordinator: CoordinatorConfig::default(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

impl LineupConfig {
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    /// Load `path` if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
