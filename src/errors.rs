use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Metadata source unreachable: {0}")]
    MetadataUnreachable(String),

    #[error("Could not resolve: {0}")]
    UnresolvableMetadata(String),

    #[error("Download error: {0}")]
    BackendFetch(String),

    #[error("No results found: {0}")]
    NoResults(String),

    #[error("Tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Cancelled")]
    Cancelled,
}

/// Failure classification surfaced on every error outcome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorKind {
    UnresolvableMetadata,
    MetadataUnreachable,
    BackendFetchFailed,
    NoResultsFound,
    InvalidInput,
    Cancelled,
}

impl AppError {
    /// Default classification. Call sites that know an error came from the
    /// metadata source tag it themselves.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidInput(_) | AppError::Validation(_) => ErrorKind::InvalidInput,
            AppError::MetadataUnreachable(_) => ErrorKind::MetadataUnreachable,
            AppError::UnresolvableMetadata(_) => ErrorKind::UnresolvableMetadata,
            AppError::NoResults(_) => ErrorKind::NoResultsFound,
            AppError::Cancelled => ErrorKind::Cancelled,
            AppError::Config(_)
            | AppError::Io(_)
            | AppError::Json(_)
            | AppError::Http(_)
            | AppError::Url(_)
            | AppError::BackendFetch(_)
            | AppError::ToolUnavailable(_)
            | AppError::Timeout(_) => ErrorKind::BackendFetchFailed,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
