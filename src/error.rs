//! Error taxonomy for the tagging pipeline.
//!
//! Only a few of these ever reach `main`: configuration problems and the
//! initial store connection. Everything else is caught by the orchestrator and
//! turned into a skipped batch or a skipped topic.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = TaggerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TaggerError {
    /// The completion service could not be reached, timed out, or answered
    /// with a non-success status.
    #[error("completion service error: {message}")]
    Service {
        status: Option<u16>,
        message: String,
    },

    /// Connectivity or query failure in the relational store.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// A uniqueness constraint rejected an insert. Recovered where it happens.
    #[error("duplicate key: {what}")]
    DuplicateKey { what: String },

    /// A single topic could not be mapped to a keyword id.
    #[error("keyword resolution failed for {topic:?}: {source}")]
    KeywordResolution {
        topic: String,
        #[source]
        source: Box<TaggerError>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl TaggerError {
    /// Build a [`TaggerError::Service`] for a non-success HTTP status.
    pub fn status(status: u16, body: &str) -> Self {
        TaggerError::Service {
            status: Some(status),
            message: format!("endpoint returned {status}: {body}"),
        }
    }

    /// HTTP status carried by a service error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TaggerError::Service { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether retrying the same completion request could succeed.
    ///
    /// Transport failures (no status), rate limiting and server errors are
    /// transient; other client errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            TaggerError::Service { status: None, .. } => true,
            TaggerError::Service {
                status: Some(code), ..
            } => *code == 429 || *code >= 500,
            _ => false,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, TaggerError::DuplicateKey { .. })
    }
}

impl From<reqwest::Error> for TaggerError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() { "timed out" } else { "request failed" };
        TaggerError::Service {
            status: e.status().map(|s| s.as_u16()),
            message: format!("{kind}: {e}"),
        }
    }
}
