//! Config file and command line settings.
//!
//! Settings come from an optional TOML file, by default
//! `<config_dir>/config.toml`:
//!
//! ```toml
//! url = "http://localhost:3000"
//! project = "my-project"
//! batch_size = 100
//! overscan = 20
//! timeout_secs = 30
//! ```
//!
//! Command line flags override the file.

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use rowcache_lib::SessionConfig;
use serde::Deserialize;
use thiserror::Error;

/// Config error type.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Settings, all optional. Used both for the file and for flag overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub url: Option<String>,
    pub project: Option<String>,
    pub batch_size: Option<usize>,
    pub overscan: Option<usize>,
    pub timeout_secs: Option<u64>,
}

impl Settings {
    /// Loads settings from `path`, or from the default config file.
    ///
    /// An explicit path must exist; a missing default file yields empty
    /// settings.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match crate::paths::config_file() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if !required && e.kind() == io::ErrorKind::NotFound => {
                log::debug!("No config file at {}", path.display());
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        log::debug!("Loaded config from {}", path.display());
        Self::parse(&text).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Returns these settings with every value set in `overrides` replaced.
    pub fn merge(self, overrides: Settings) -> Self {
        Self {
            url: overrides.url.or(self.url),
            project: overrides.project.or(self.project),
            batch_size: overrides.batch_size.or(self.batch_size),
            overscan: overrides.overscan.or(self.overscan),
            timeout_secs: overrides.timeout_secs.or(self.timeout_secs),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Session config with these settings applied over the defaults.
    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::default();
        if let Some(batch_size) = self.batch_size {
            config = config.with_batch_size(batch_size);
        }
        if let Some(overscan) = self.overscan {
            config = config.with_overscan(overscan);
        }
        if let Some(timeout) = self.timeout() {
            config = config.with_fetch_timeout(timeout);
        }
        config
    }
}
