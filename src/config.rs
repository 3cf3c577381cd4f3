//! Per-repository configuration.
//!
//! A repository can carry a `.drydock.yml` at its root naming the
//! third-party analyzer images to bring up when the caller did not list
//! any explicitly:
//!
//! ```yaml
//! global:
//!   images:
//!     - gcr.io/example/lint-analyzer:prod
//!     - gcr.io/example/sec-analyzer:prod
//! ```
//!
//! Lookup failures are never fatal: the orchestrator logs them and runs
//! with the built-in analyzers only.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Name of the per-repository config file.
pub const CONFIG_FILE: &str = ".drydock.yml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no {CONFIG_FILE} found in {0}")]
    NotFound(String),

    #[error("could not read {path}: {source}")]
    Unreadable {
        path: String,
        source: std::io::Error,
    },

    #[error("could not parse {path}: {source}")]
    Invalid {
        path: String,
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
struct GlobalConfig {
    #[serde(default)]
    global: GlobalSection,
}

#[derive(Debug, Default, Deserialize)]
struct GlobalSection {
    #[serde(default)]
    images: Vec<String>,
}

/// Returns the analyzer images configured for the repository at `dir`.
pub fn global_analyzer_images(dir: &Path) -> Result<Vec<String>, ConfigError> {
    let path = dir.join(CONFIG_FILE);
    if !path.exists() {
        return Err(ConfigError::NotFound(dir.display().to_string()));
    }
    let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Unreadable {
        path: path.display().to_string(),
        source,
    })?;
    let config: GlobalConfig =
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Invalid {
            path: path.display().to_string(),
            source,
        })?;
    Ok(config.global.images)
}
