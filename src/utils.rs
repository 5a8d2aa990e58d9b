use std::path::{Path, PathBuf};
use crate::errors::Result;
use log::{debug, info, warn};

/// Image extensions a media tool may leave next to an audio file after
/// embedding the cover.
pub const COVER_SIDECAR_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

const FOLDER_NAME_PUNCTUATION: [char; 6] = [' ', '.', '-', '_', '(', ')'];

/// Derives a directory name from a human readable title: keeps alphanumerics
/// and ` .-_()`, drops everything else, trims surrounding whitespace.
///
/// Distinct titles may collide; that is accepted.
pub fn sanitize_folder_name(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric() || FOLDER_NAME_PUNCTUATION.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Sanitizes a filename by replacing characters that are invalid on common
/// filesystems.
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Joins a sanitized collection title onto `parent`. Titles that sanitize to
/// nothing keep the parent unchanged.
pub fn collection_directory(parent: &Path, title: &str) -> PathBuf {
    let folder = sanitize_folder_name(title);
    if folder.is_empty() {
        parent.to_path_buf()
    } else {
        parent.join(folder)
    }
}

/// Creates a directory if it doesn't exist
pub async fn ensure_dir_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        tokio::fs::create_dir_all(path).await?;
        info!("📁 Created directory: {:?}", path);
    }
    Ok(())
}

/// Deletes `<stem>.<image ext>` files sitting next to `audio_file`. Failures
/// are logged and swallowed. Returns the removed paths.
pub async fn remove_cover_sidecars(audio_file: &Path) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    let (Some(parent), Some(stem)) = (audio_file.parent(), audio_file.file_stem()) else {
        return removed;
    };

    for ext in COVER_SIDECAR_EXTENSIONS {
        let mut name = stem.to_os_string();
        name.push(".");
        name.push(ext);
        let sidecar = parent.join(name);
        if sidecar == audio_file || !sidecar.exists() {
            continue;
        }
        match tokio::fs::remove_file(&sidecar).await {
            Ok(()) => {
                debug!("🧹 [CLEANUP] Removed cover sidecar: {:?}", sidecar);
                removed.push(sidecar);
            }
            Err(e) => warn!("⚠️ [CLEANUP] Could not remove cover sidecar {:?}: {}", sidecar, e),
        }
    }

    removed
}

/// Generates a unique ID for a submitted request
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
