//! Error handling for the message pipeline
//!
//! The reducer itself never fails. Errors only come out of the edges:
//! Player calls, asset fetching and configuration loading.

use thiserror::Error;

/// Main error type for message pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// An action that needs a Player was invoked while none is attached.
    ///
    /// Callers must check `player_state.presence` / capabilities first.
    #[error("No player is attached to the message pipeline")]
    NoPlayer,

    /// The Player does not implement an optional operation
    #[error("Player does not support {0}")]
    Unsupported(&'static str),

    /// Errors reported by the Player implementation
    #[error("Player error: {0}")]
    Player(String),

    /// Non-2xx response while fetching an asset
    #[error("Error {status}{} fetching {uri}", status_suffix(.status_text))]
    AssetFetch {
        uri: String,
        status: u16,
        status_text: String,
    },

    /// Asset could not be resolved through any fetch path
    #[error("Failed to fetch asset {uri}: {reason}")]
    Asset { uri: String, reason: String },

    /// Response carried no body
    #[error("Response for {0} has no body")]
    MissingBody(String),

    /// Malformed asset URI
    #[error("Invalid URI: {0}")]
    InvalidUri(#[from] url::ParseError),

    /// Transport-level HTTP errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The caller aborted the request
    #[error("Request aborted")]
    Aborted,

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

fn status_suffix(status_text: &str) -> String {
    if status_text.is_empty() {
        String::new()
    } else {
        format!(" ({})", status_text)
    }
}

impl PipelineError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether the error came from an explicit abort
    pub fn is_aborted(&self) -> bool {
        match self {
            PipelineError::Aborted => true,
            PipelineError::WithContext { source, .. } => source.is_aborted(),
            _ => false,
        }
    }
}

/// Result type alias for message pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::Unsupported("fetch_asset");
        assert_eq!(err.to_string(), "Player does not support fetch_asset");
    }

    #[test]
    fn test_asset_fetch_status_text() {
        let err = PipelineError::AssetFetch {
            uri: "https://example.com/a.stl".to_string(),
            status: 404,
            status_text: "Not Found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Error 404 (Not Found) fetching https://example.com/a.stl"
        );

        let err = PipelineError::AssetFetch {
            uri: "x".to_string(),
            status: 500,
            status_text: String::new(),
        };
        assert_eq!(err.to_string(), "Error 500 fetching x");
    }

    #[test]
    fn test_error_with_context() {
        let err = PipelineError::Aborted;
        let with_ctx = err.with_context("Fetching mesh");
        assert!(with_ctx.to_string().contains("Fetching mesh"));
        assert!(with_ctx.is_aborted());
    }

    #[test]
    fn test_result_ext_context() {
        let result: Result<()> = Err(PipelineError::Config("bad value".to_string()));
        let err = result.context("Loading pipeline.toml").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Loading pipeline.toml: Configuration error: bad value"
        );

        let ok: Result<u8> = Ok(1);
        assert_eq!(ok.with_context(|| unreachable!()).unwrap(), 1);
    }
}
