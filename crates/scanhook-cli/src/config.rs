//! TOML configuration for the demo binary.
//!
//! Every field has a default, so the binary runs with no config file at all.
//! Example:
//!
//! ```toml
//! [framing]
//! header = ""
//! trailer = "\r"
//! fixed_length = 0
//!
//! [scanner]
//! device_filter = ""
//! backend = "auto"        # auto | raw-input | global-hook
//! log_level = "info"
//! ```

use std::path::{Path, PathBuf};

use scanhook_capture::BackendKind;
use scanhook_core::FramingConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown backend `{0}`; expected auto, raw-input, or global-hook")]
    UnknownBackend(String),
}

/// Top-level configuration for the demo binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub framing: FramingConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
}

/// Capture and output settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScannerConfig {
    /// Stable device ID to listen to exclusively; empty accepts all devices.
    #[serde(default)]
    pub device_filter: String,
    /// Capture strategy: `auto`, `raw-input`, or `global-hook`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// `tracing` log level; overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_backend() -> String {
    "auto".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            device_filter: String::new(),
            backend: default_backend(),
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Loads the config from `path`. A missing file yields the defaults; a
    /// present but malformed file is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(toml::from_str(&text)?),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Parses the configured backend name.
    pub fn backend_kind(&self) -> Result<BackendKind, ConfigError> {
        match self.scanner.backend.as_str() {
            "auto" => Ok(BackendKind::Auto),
            "raw-input" => Ok(BackendKind::RawInput),
            "global-hook" => Ok(BackendKind::GlobalHook),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}
