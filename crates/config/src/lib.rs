//! Layered configuration for gantry.
//!
//! Sources, lowest priority first:
//!
//! 1. Built-in defaults ([`Config::default`]).
//! 2. A configuration file: the path given on the command line, or
//!    `gantry.toml` in the platform configuration directory if it exists.
//! 3. Environment variables prefixed with `GANTRY_`; `__` separates nested
//!    keys, e.g. `GANTRY_HTTP__TIMEOUT_SECS=10`.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use gantry_scanner::filter::DEFAULT_ARCHIVE_SUFFIX;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "GANTRY_";
pub const CONFIG_FILE_NAME: &str = "gantry.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Locations to scan, in order. Empty means the default directory under
    /// the work dir.
    pub locations: Vec<String>,
    /// Percent-encode raw locations before parsing them.
    pub encode_locations: bool,
    pub work_dir: Option<PathBuf>,
    /// Case-insensitive suffix that marks an archive.
    pub archive_suffix: String,
    pub file: FileConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            locations: Vec::new(),
            encode_locations: true,
            work_dir: None,
            archive_suffix: DEFAULT_ARCHIVE_SUFFIX.to_string(),
            file: FileConfig::default(),
            http: HttpConfig::default(),
        }
    }
}
impl Default for FileConfig {
    fn default() -> Self {
        Self { interval_ms: 5_000 }
    }
}
impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            interval_ms: 300_000,
            timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load defaults, then `path` (or the platform default file), then the
    /// environment, and validate the result.
    ///
    /// An explicit `path` must exist; the platform default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match path {
            Some(path) => {
                if !path.exists() {
                    exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
                }
                tracing::debug!(path = %path.display(), "Loading configuration file");
                figment = merge_file(figment, path)?;
            },
            None => {
                if let Some(path) = default_config_path().filter(|path| path.exists()) {
                    tracing::debug!(path = %path.display(), "Loading configuration file");
                    figment = figment.merge(Toml::file(path));
                }
            },
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract and validate a configuration from an already layered figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().map_err(|err| ErrorKind::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.archive_suffix.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("archive_suffix must not be empty".to_string()));
        }
        if self.file.interval_ms == 0 {
            exn::bail!(ErrorKind::Invalid("file.interval_ms must be greater than zero".to_string()));
        }
        if self.http.interval_ms == 0 {
            exn::bail!(ErrorKind::Invalid("http.interval_ms must be greater than zero".to_string()));
        }
        if self.http.timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid("http.timeout_secs must be greater than zero".to_string()));
        }
        Ok(())
    }

    /// Configured work dir, else the platform data directory, else the
    /// current directory.
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .or_else(|| project_dirs().map(|dirs| dirs.data_dir().to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn file_interval(&self) -> Duration {
        Duration::from_millis(self.file.interval_ms)
    }

    pub fn http_interval(&self) -> Duration {
        Duration::from_millis(self.http.interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }
}

/// `gantry.toml` in the platform configuration directory, if there is one.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "gantry")
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
    let figment = match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => exn::bail!(ErrorKind::Format(path.to_path_buf())),
    };
    Ok(figment)
}
