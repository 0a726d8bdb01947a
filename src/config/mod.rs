//! Configuration for the message pipeline
//!
//! Deployment-level knobs only: frame pause timeout, asset fetching and
//! logging. Panel layouts and other UI settings are owned by the host
//! application.
//!
//! # Config Location
//!
//! The default config file lives in the platform config directory:
//! - **Linux**: `~/.config/dev.message-pipeline/pipeline.toml`
//! - **macOS**: `~/Library/Application Support/dev.message-pipeline/pipeline.toml`
//! - **Windows**: `%APPDATA%\dev.message-pipeline\pipeline.toml`
//!
//! # Example
//!
//! ```toml
//! frame_pause_timeout_ms = 2000
//! builtin_fetch = true
//!
//! [http]
//! user_agent = "my-viewer/1.0"
//!
//! [logging]
//! filter = "info,message_pipeline=debug"
//! log_dir = "/var/log/viewer"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PipelineError, Result, ResultExt};

/// Application identifier for config directories
pub const APP_ID: &str = "dev.message-pipeline";

/// Config filename inside the app config directory
pub const CONFIG_FILE: &str = "pipeline.toml";

/// Default upper bound on one frame pause, in milliseconds
pub const DEFAULT_FRAME_PAUSE_TIMEOUT_MS: u64 = 5000;

/// Default timeout for a single asset request, in milliseconds
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default `tracing` filter
pub const DEFAULT_LOG_FILTER: &str = "info,message_pipeline=debug";

/// Path of the default config file, if the platform has a config directory
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
}

/// HTTP client settings used for asset fetching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub request_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("message-pipeline/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence
    pub filter: String,
    /// Directory for daily rolling log files; stdout only when unset
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            log_dir: None,
        }
    }
}

/// Top-level pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on how long paused panels may hold a frame
    pub frame_pause_timeout_ms: u64,
    /// Fetch `package://` URIs through the HTTP transport when the Player can't.
    /// Off by default since `reqwest` has no handler for the scheme.
    pub builtin_fetch: bool,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_pause_timeout_ms: DEFAULT_FRAME_PAUSE_TIMEOUT_MS,
            builtin_fetch: false,
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn frame_pause_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_pause_timeout_ms)
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load the config at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(PipelineError::from)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml_str(&content)
    }

    /// Load the default config file, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = default_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Write the config as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(PipelineError::from)
                .context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(PipelineError::from)
            .with_context(|| format!("Failed to write config file {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.frame_pause_timeout(), Duration::from_millis(5000));
        assert!(!config.builtin_fetch);
        assert!(config.logging.log_dir.is_none());
        assert!(config.http.user_agent.starts_with("message-pipeline/"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            frame_pause_timeout_ms = 250

            [http]
            user_agent = "viewer/2"
            "#,
        )
        .unwrap();
        assert_eq!(config.frame_pause_timeout_ms, 250);
        assert!(!config.builtin_fetch);
        assert_eq!(config.http.user_agent, "viewer/2");
        assert_eq!(config.http.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = PipelineConfig::from_toml_str("frame_pause_timeout_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_default_path_ends_with_app_id() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with(Path::new(APP_ID).join(CONFIG_FILE)));
        }
    }
}
