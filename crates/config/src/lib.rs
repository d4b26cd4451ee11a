//! Configuration loading and validation.
//!
//! Sources are layered with [`figment`], later sources overriding earlier ones:
//!
//! 1. built-in defaults ([`Config::default`]),
//! 2. an optional configuration file (TOML, YAML or JSON, picked by extension),
//! 3. environment variables prefixed with [`ENV_PREFIX`], nested keys separated
//!    by a double underscore (`CONVERGE_POLL__ATTEMPTS=50`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of environment variables that override configuration values.
pub const ENV_PREFIX: &str = "CONVERGE_";
/// Polls before a wait gives up. Together with the interval: ~100s ceiling.
const DEFAULT_ATTEMPTS: u32 = 1000;
const DEFAULT_INTERVAL_MS: u64 = 100;

/// Harness configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory that holds files created for upload and download destinations.
    pub scratch_dir: PathBuf,
    pub poll: PollConfig,
    pub downloads: DownloadConfig,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            poll: PollConfig::default(),
            downloads: DownloadConfig::default(),
        }
    }
}

/// Polling budget shared by every wait operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Maximum number of times a condition is checked.
    pub attempts: u32,
    /// Delay between two checks, in milliseconds.
    pub interval_ms: u64,
}
impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}
impl Default for PollConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            interval_ms: DEFAULT_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// When `false` (the default), a download the service no longer reports is
    /// assumed to have finished and been reaped. When `true`, waiting keeps
    /// polling until the service reports the download as completed.
    pub require_observed_completion: bool,
}

impl Config {
    /// Load configuration from defaults, an optional file, and the environment.
    ///
    /// # Errors
    ///
    /// - [`NotFound`](ErrorKind::NotFound) if `file` is given but doesn't exist.
    /// - [`UnsupportedFormat`](ErrorKind::UnsupportedFormat) if the extension
    ///   of `file` isn't `toml`, `yaml`, `yml` or `json`.
    /// - [`Parse`](ErrorKind::Parse) if any source can't be deserialized.
    /// - [`Invalid`](ErrorKind::Invalid) if the merged result fails
    ///   [validation](Self::validate).
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = file {
            figment = figment.merge(file_provider(path)?);
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        let config: Config = figment.extract().or_raise(|| ErrorKind::Parse)?;
        config.validate()?;
        tracing::debug!(
            scratch_dir = %config.scratch_dir.display(),
            attempts = config.poll.attempts,
            interval_ms = config.poll.interval_ms,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Reject configurations the harness can't work with.
    pub fn validate(&self) -> Result<()> {
        if self.poll.attempts == 0 {
            exn::bail!(ErrorKind::Invalid("poll.attempts must be at least 1".to_string()));
        }
        if self.scratch_dir.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("scratch_dir must not be empty".to_string()));
        }
        Ok(())
    }
}

fn file_provider(path: &Path) -> Result<Figment> {
    if !path.is_file() {
        exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
    }
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    let provider = match extension.as_deref() {
        Some("toml") => Figment::from(Toml::file(path)),
        Some("yaml" | "yml") => Figment::from(Yaml::file(path)),
        Some("json") => Figment::from(Json::file(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    };
    Ok(provider)
}

fn default_scratch_dir() -> PathBuf {
    match ProjectDirs::from("", "", "converge") {
        Some(dirs) => dirs.cache_dir().join("scratch"),
        None => std::env::temp_dir().join("converge"),
    }
}
