//! Error type shared by the library.
//!
//! Only request-fatal conditions live here. A failed vulnerability batch is
//! not an error: it is reported as [`QueryEnvelope::Failed`] and merged into
//! the result list as data.
//!
//! [`QueryEnvelope::Failed`]: crate::model::QueryEnvelope::Failed

use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The caller supplied a coordinate that cannot be looked up.
    #[error("invalid dependency: {0}")]
    Validation(String),

    #[error("failed to execute `{command}`: {source}")]
    ToolLaunch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("dependency tree generation failed with {status}: {output}")]
    ToolFailed { status: String, output: String },

    #[error("dependency tree generation timed out after {0:?}")]
    ToolTimeout(Duration),

    /// The build tool ran but reported no dependency lines.
    #[error("dependency tree report is empty")]
    EmptyTree,

    #[error("registry lookup failed: {0}")]
    Registry(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("request cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
