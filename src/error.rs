//! Error types for the page indexer.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, PageIndexError>;

/// Errors that can occur in the page indexer.
#[derive(Error, Debug)]
pub enum PageIndexError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The document path does not exist.
    #[error("Document not found at '{0}'")]
    DocumentNotFound(PathBuf),

    /// The document type is not one we can read.
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// The document produced no pages.
    #[error("Document '{0}' contains no pages")]
    EmptyDocument(String),

    /// The document bytes could not be decoded.
    #[error("Corrupt document: {0}")]
    CorruptDocument(String),

    /// No page offset maps the TOC labels onto the document.
    #[error("Could not resolve TOC page offset: {0}")]
    OffsetUnresolved(String),

    /// The TOC could not be turned into a usable entry list.
    #[error("Malformed table of contents: {0}")]
    MalformedToc(String),

    /// The index file does not exist.
    #[error("Index file not found at '{0}'")]
    IndexNotFound(PathBuf),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// LLM API error.
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// The LLM endpoint is throttling us.
    #[error("LLM rate limit hit: {0}")]
    RateLimited(String),

    /// The LLM request did not complete in time.
    #[error("LLM request timed out: {0}")]
    Timeout(String),

    /// The LLM answered, but not in the shape we asked for.
    #[error("Malformed LLM response: {0}")]
    MalformedResponse(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tree structure error.
    #[error("Tree structure error: {0}")]
    TreeError(String),
}

impl PageIndexError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Transient collaborator failures worth repeating with the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::Timeout(_) | Self::MalformedResponse(_)
        )
    }

    /// Failures the pipeline recovers from by structuring the document without its TOC.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::OffsetUnresolved(_) | Self::MalformedToc(_))
    }
}

impl From<reqwest::Error> for PageIndexError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PageIndexError::Timeout(err.to_string())
        } else {
            PageIndexError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PageIndexError {
    fn from(err: serde_json::Error) -> Self {
        PageIndexError::MalformedResponse(err.to_string())
    }
}

impl From<lopdf::Error> for PageIndexError {
    fn from(err: lopdf::Error) -> Self {
        PageIndexError::CorruptDocument(err.to_string())
    }
}
