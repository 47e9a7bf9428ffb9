use thiserror::Error;

/// Fatal failure to start the page driver. A crawl run cannot proceed
/// without a session, so this is never retried by the core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Browser setup failed: {reason}")]
pub struct SetupError {
    pub reason: String,
}

impl SetupError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("Timed out fetching {url} after {attempts} attempt(s)")]
    FetchTimeout { url: String, attempts: u32 },

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Browser session is {0}")]
    SessionUnavailable(&'static str),

    #[error("Driver disconnected: {0}")]
    Disconnected(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Failed to write batch of {} article(s): {reason}", .urls.len())]
    BatchWrite { urls: Vec<String>, reason: String },

    #[error("Invalid date window: {0}")]
    InvalidWindow(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error("External error: {0}")]
    External(#[from] anyhow::Error),
}

impl Error {
    /// Only a driver setup failure aborts a run; everything else is scoped
    /// to one page, one article or one fetch attempt.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Setup(_))
    }

    /// Errors worth another navigation attempt inside `BrowserSession::fetch`.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Error::HttpStatus { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Error::Navigation(_) | Error::Io(_) => true,
            _ => false,
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::InvalidUrl(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
