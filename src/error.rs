use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the slice-map core.
#[derive(Debug, Error)]
pub enum SliceMapError {
    /// Out-of-range coordinates or malformed subset/size values
    #[error("{0}")]
    Validation(String),

    /// The metadata service rejected the token or dataset
    #[error("metadata service returned {status}: {}", message.as_deref().unwrap_or("no message"))]
    UpstreamAuth { status: u16, message: Option<String> },

    /// Unknown tile or job key
    #[error("not found")]
    NotFound,

    /// Resolved data path is missing when the job runs
    #[error("source data missing: {}", .0.display())]
    SourceDataMissing(PathBuf),

    /// External pipeline exited non-zero or could not be launched
    #[error("pipeline failed: {0}")]
    PipelineFailure(String),

    #[error("job cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("metadata request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, SliceMapError>;

pub const RANGE_MESSAGE: &str = "numbers must be within [0.0, 1.0]";
