//! Error types for grib2pf feeds.

use thiserror::Error;

/// Result type alias using PfError.
pub type PfResult<T> = Result<T, PfError>;

/// Primary error type for feed polling and generation.
#[derive(Debug, Error)]
pub enum PfError {
    // === Fetch Errors ===
    #[error("Request to {url} failed: {message}")]
    Fetch { url: String, message: String },

    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Object listing failed for '{prefix}': {message}")]
    Listing { prefix: String, message: String },

    #[error("Timed out after {0}s")]
    Timeout(u64),

    // === Parse Errors ===
    #[error("Malformed index line {line} in {url}: {content}")]
    IndexParse {
        url: String,
        line: usize,
        content: String,
    },

    #[error("Invalid time template '{0}'")]
    InvalidTemplate(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    // === Render Errors ===
    #[error("Render engine reported error code {0}")]
    RenderFailed(i32),

    #[error("Render engine error: {0}")]
    RenderEngine(String),

    #[error("Generation superseded by newer data")]
    Superseded,

    // === Infrastructure Errors ===
    #[error("I/O error: {0}")]
    Io(String),
}

impl PfError {
    /// Whether the next scheduled poll should simply retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PfError::Fetch { .. }
                | PfError::Status { .. }
                | PfError::Listing { .. }
                | PfError::Timeout(_)
        )
    }
}

impl From<std::io::Error> for PfError {
    fn from(err: std::io::Error) -> Self {
        PfError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PfError {
    fn from(err: serde_json::Error) -> Self {
        PfError::RenderEngine(format!("JSON error: {}", err))
    }
}
