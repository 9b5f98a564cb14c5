//! Error taxonomy shared by the job repository, the processor registry and the
//! external collaborators.

use thiserror::Error;

pub type Result<T, E = ProcessorError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The store is unreachable or rejected the statement.
    #[error("store error: {0}")]
    Store(#[source] anyhow::Error),

    /// A URL resolved to a MIME type on the caller's blocklist.
    #[error("unsupported media kind {mime}: {} are not supported", blocked.join(", "))]
    UnsupportedMediaKind { mime: String, blocked: Vec<String> },

    /// Non-zero exit, spawn failure, timeout or unparsable output of the graph
    /// generator. The message is stored verbatim on the failed search.
    #[error("{0}")]
    ExternalTool(String),

    /// A watched result is not readable yet. Never a job failure.
    #[error("result not ready: {0}")]
    TransientRead(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid search name: {0:?}")]
    InvalidName(String),

    #[error("url scraper error: {0}")]
    UrlScraper(#[source] anyhow::Error),
}

impl ProcessorError {
    pub fn store(err: impl Into<anyhow::Error>) -> Self {
        ProcessorError::Store(err.into())
    }

    pub fn is_store(&self) -> bool {
        matches!(self, ProcessorError::Store(_))
    }
}

impl From<sqlx::Error> for ProcessorError {
    fn from(err: sqlx::Error) -> Self {
        ProcessorError::Store(err.into())
    }
}
