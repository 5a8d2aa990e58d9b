use crate::downloader::OutputFormat;
use crate::errors::{AppError, Result};
use std::path::{Component, Path};

pub const MAX_QUERY_CHARS: usize = 500;

/// Checks everything a caller hands to `submit` before it reaches the
/// dispatcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct InputValidator;

impl InputValidator {
    pub fn new() -> Self {
        Self
    }

    /// Returns the trimmed query.
    pub fn validate_query(&self, query: &str) -> Result<String> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidInput("Query cannot be empty".to_string()));
        }

        if query.chars().count() > MAX_QUERY_CHARS {
            return Err(AppError::Validation(format!(
                "Query too long (max {} characters)",
                MAX_QUERY_CHARS
            )));
        }

        if query.contains('\0') {
            return Err(AppError::Validation("Null bytes not allowed in query".to_string()));
        }

        Ok(query.to_string())
    }

    pub fn validate_format(&self, format: &str) -> Result<OutputFormat> {
        format.parse()
    }

    /// The directory itself may not exist yet; it is created on first use.
    pub fn validate_output_dir(&self, path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(AppError::Validation("Output directory cannot be empty".to_string()));
        }

        // Check for path traversal attempts
        if path.components().any(|component| matches!(component, Component::ParentDir)) {
            return Err(AppError::Validation("Path traversal detected".to_string()));
        }

        if path.to_string_lossy().contains('\0') {
            return Err(AppError::Validation("Null bytes not allowed in output directory".to_string()));
        }

        if path.exists() && !path.is_dir() {
            return Err(AppError::Validation(format!("{:?} is not a directory", path)));
        }

        Ok(())
    }
}
