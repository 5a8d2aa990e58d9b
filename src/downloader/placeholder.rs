use std::path::{Path, PathBuf};
use std::sync::Arc;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use crate::downloader::http_pool::HttpPool;
use crate::errors::{AppError, Result};
use crate::utils::{ensure_dir_exists, sanitize_filename};

/// Non-audio output mode: saves one picture from a fixed image source
/// instead of resolving the query.
pub struct PlaceholderFetcher {
    http: Arc<HttpPool>,
    source_url: String,
}

impl PlaceholderFetcher {
    pub fn new(http: Arc<HttpPool>, source_url: impl Into<String>) -> Self {
        Self {
            http,
            source_url: source_url.into(),
        }
    }

    pub fn title_for(query: &str) -> String {
        format!("Placeholder for {}", query.trim())
    }

    /// Downloads the image into `destination` and returns the written path.
    pub async fn fetch(&self, query: &str, destination: &Path, cancel: &CancellationToken) -> Result<PathBuf> {
        log::info!("🖼️ [PLACEHOLDER] Image mode for '{}'", query);
        ensure_dir_exists(destination).await?;

        let fetched = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            fetched = self.http.get_bytes(&self.source_url) => fetched,
        };
        let fetched = fetched.map_err(|e| match e {
            AppError::BackendFetch(_) => e,
            other => AppError::BackendFetch(format!("Placeholder image unavailable: {}", other)),
        })?;

        let extension = extension_for(fetched.content_type.as_deref());
        let file_path = destination.join(placeholder_file_name(query, extension));
        tokio::fs::write(&file_path, &fetched.data).await?;

        log::info!("✅ [PLACEHOLDER] Saved {} bytes to {:?}", fetched.data.len(), file_path);
        Ok(file_path)
    }
}

/// `Placeholder_for_<query>_<NNN>.<ext>` with a random three digit suffix.
pub fn placeholder_file_name(query: &str, extension: &str) -> String {
    let stem = sanitize_filename(&query.trim().replace(' ', "_"));
    let suffix: u16 = rand::thread_rng().gen_range(100..=999);
    format!("Placeholder_for_{}_{}.{}", stem, suffix, extension)
}

pub fn extension_for(content_type: Option<&str>) -> &'static str {
    let mime = content_type
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase());
    match mime.as_deref() {
        Some("image/png") => "png",
        Some("image/webp") => "webp",
        Some("image/gif") => "gif",
        _ => "jpg",
    }
}
