use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CrawlerError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::error::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),
    #[error("Navigation error: {0}")]
    NavigationError(#[from] NavError),
}

#[derive(Debug, thiserror::Error)]
pub enum NavError {
    #[error("element not found: {0}")]
    NotFound(String),
    #[error("timed out after {0:?} waiting for {1}")]
    TimedOut(Duration, String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("driver error: {0}")]
    Driver(String),
    #[error("unsupported action: {0}")]
    Unsupported(String),
    #[error("invalid selector: {0}")]
    InvalidSelector(String),
    #[error("no document loaded")]
    NoDocument,
}

/// Recoverable failure of one unit of work (page, subject or row).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("timed out: {0}")]
    TimedOut(String),
    #[error("reported {reported} comments but {actual} were rendered")]
    Consistency { reported: usize, actual: usize },
    #[error("unexpected: {0}")]
    Unexpected(String),
}

impl Fault {
    pub fn kind(&self) -> &'static str {
        match self {
            Fault::NotFound(_) => "not_found",
            Fault::TimedOut(_) => "timed_out",
            Fault::Consistency { .. } => "consistency",
            Fault::Unexpected(_) => "unexpected",
        }
    }
}

impl From<NavError> for Fault {
    fn from(err: NavError) -> Self {
        match err {
            NavError::NotFound(what) => Fault::NotFound(what),
            NavError::TimedOut(after, what) => Fault::TimedOut(format!("{what} after {after:?}")),
            other => Fault::Unexpected(other.to_string()),
        }
    }
}

impl From<CrawlerError> for Fault {
    fn from(err: CrawlerError) -> Self {
        Fault::Unexpected(err.to_string())
    }
}
