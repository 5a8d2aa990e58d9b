use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use crate::downloader::ytdlp::run_tool;
use crate::downloader::{BackendId, DownloadOptions, FetchReport, FetchTarget, FetchedItem, OutputFormat, SourceBackend};
use crate::errors::{AppError, Result};
use crate::search::host_matches;
use crate::utils::ensure_dir_exists;

const DEEZER_DOMAINS: [&str; 2] = ["deezer.com", "deezer.page.link"];
const DEEMIX_AUDIO_EXTENSIONS: [&str; 2] = ["flac", "mp3"];
const DEFAULT_TITLE: &str = "Deezer Download";

/// Catalog backend driven through the external `deemix` tool. Optional at
/// runtime: without the binary or a login token every fetch fails with
/// `ToolUnavailable`.
///
/// Cover handling is left to the tool through its settings file, so fetches
/// never report an embedded cover and no sidecar cleanup happens afterwards.
pub struct DeezerBackend {
    deemix_path: String,
    arl: Option<String>,
    /// Used as `XDG_CONFIG_HOME` for the tool, which then reads
    /// `<config_root>/deemix/.arl`.
    config_root: PathBuf,
    fetch_timeout: Duration,
}

impl DeezerBackend {
    pub fn new(deemix_path: impl Into<String>, arl: Option<String>, config_root: PathBuf) -> Self {
        Self {
            deemix_path: deemix_path.into(),
            arl,
            config_root,
            fetch_timeout: Duration::from_secs(900),
        }
    }

    pub fn with_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    fn arl(&self) -> Option<&str> {
        self.arl.as_deref().map(str::trim).filter(|arl| !arl.is_empty())
    }

    /// `deemix --bitrate` value for the requested format.
    pub fn bitrate_for(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Flac => "flac",
            OutputFormat::Mp3 => "320",
            other => {
                log::warn!("⚠️ [DEEZER] {} is not offered by Deezer, using flac", other);
                "flac"
            }
        }
    }

    /// Settings merged by deemix over its defaults. With covers off, no
    /// artwork file is saved and none is embedded.
    pub fn settings_for(embed_cover: bool) -> serde_json::Value {
        let artwork_size = if embed_cover { 800 } else { 0 };
        serde_json::json!({
            "saveArtwork": embed_cover,
            "embeddedArtworkSize": artwork_size,
            "tags": { "cover": embed_cover },
        })
    }

    async fn write_settings(&self, embed_cover: bool) -> Result<()> {
        let dir = self.config_root.join("deemix");
        ensure_dir_exists(&dir).await?;
        let content = serde_json::to_string_pretty(&Self::settings_for(embed_cover))?;
        tokio::fs::write(dir.join("config.json"), content).await?;
        Ok(())
    }

    async fn write_arl(&self, arl: &str) -> Result<()> {
        let dir = self.config_root.join("deemix");
        ensure_dir_exists(&dir).await?;
        tokio::fs::write(dir.join(".arl"), arl).await?;
        Ok(())
    }
}

/// Audio files under `root`, recursively. A missing root is empty.
pub async fn snapshot_audio_files(root: &Path) -> Result<HashSet<PathBuf>> {
    let mut found = HashSet::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
            } else if is_deemix_audio(&path) {
                found.insert(path);
            }
        }
    }

    Ok(found)
}

fn is_deemix_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| DEEMIX_AUDIO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Files present after the run but not before, sorted by path.
pub fn new_files(before: &HashSet<PathBuf>, after: HashSet<PathBuf>) -> Vec<PathBuf> {
    let mut added: Vec<PathBuf> = after.into_iter().filter(|path| !before.contains(path)).collect();
    added.sort();
    added
}

#[async_trait]
impl SourceBackend for DeezerBackend {
    fn id(&self) -> BackendId {
        BackendId::Deezer
    }

    fn can_handle(&self, query: &str) -> bool {
        host_matches(query, &DEEZER_DOMAINS)
    }

    fn is_available(&self) -> bool {
        self.arl().is_some() && which::which(&self.deemix_path).is_ok()
    }

    async fn fetch(&self, target: &FetchTarget, options: &DownloadOptions, cancel: &CancellationToken) -> Result<FetchReport> {
        let arl = self
            .arl()
            .ok_or_else(|| AppError::ToolUnavailable("no Deezer ARL configured".to_string()))?;
        if which::which(&self.deemix_path).is_err() {
            return Err(AppError::ToolUnavailable(format!("{} not found on PATH", self.deemix_path)));
        }
        self.write_arl(arl).await?;
        self.write_settings(options.embed_cover).await?;

        let bitrate = Self::bitrate_for(options.output_format);
        log::info!("💿 [DEEZER] Fetching {} at bitrate {}", target.query, bitrate);
        let before = snapshot_audio_files(&target.destination).await?;

        let mut command = Command::new(&self.deemix_path);
        command
            .arg("--bitrate")
            .arg(bitrate)
            .arg("--path")
            .arg(&target.destination)
            .arg(&target.query)
            .env("XDG_CONFIG_HOME", &self.config_root);
        let output = run_tool(command, &self.deemix_path, self.fetch_timeout, cancel).await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            log::error!("❌ [DEEZER] deemix failed: {}", error.trim());
            return Err(AppError::BackendFetch(format!("deemix failed: {}", error.trim())));
        }

        let added = new_files(&before, snapshot_audio_files(&target.destination).await?);
        log::info!("✅ [DEEZER] {} new file(s) in {:?}", added.len(), target.destination);

        let items: Vec<FetchedItem> = added
            .into_iter()
            .map(|path| FetchedItem {
                title: path.file_stem().map(|stem| stem.to_string_lossy().to_string()),
                path: Some(path),
            })
            .collect();
        Ok(FetchReport {
            title: Some(DEFAULT_TITLE.to_string()),
            items,
            cover_embedded: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(dir: &Path) -> FetchTarget {
        FetchTarget {
            query: "https://www.deezer.com/track/3135556".to_string(),
            destination: dir.to_path_buf(),
            collection: false,
            search: false,
        }
    }

    #[test]
    fn test_can_handle_deezer_links() {
        let backend = DeezerBackend::new("deemix", None, PathBuf::from("/tmp"));
        assert!(backend.can_handle("https://www.deezer.com/en/album/302127"));
        assert!(backend.can_handle("https://deezer.page.link/abc"));
        assert!(!backend.can_handle("https://open.spotify.com/track/1"));
        assert_eq!(backend.search_prefix(), None);
    }

    #[test]
    fn test_bitrate_mapping() {
        assert_eq!(DeezerBackend::bitrate_for(OutputFormat::Flac), "flac");
        assert_eq!(DeezerBackend::bitrate_for(OutputFormat::Mp3), "320");
        assert_eq!(DeezerBackend::bitrate_for(OutputFormat::Wav), "flac");
    }

    #[tokio::test]
    async fn test_fetch_without_arl_is_tool_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let backend = DeezerBackend::new("deemix", Some("   ".into()), dir.path().to_path_buf());
        assert!(!backend.is_available());

        let options = DownloadOptions::new(OutputFormat::Flac, true, dir.path().to_path_buf());
        let result = backend.fetch(&target(dir.path()), &options, &CancellationToken::new()).await;
        assert!(matches!(result, Err(AppError::ToolUnavailable(_))));
    }

    #[tokio::test]
    async fn test_fetch_without_binary_is_tool_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let backend = DeezerBackend::new("no-such-deemix-binary", Some("token".into()), dir.path().to_path_buf());

        let options = DownloadOptions::new(OutputFormat::Mp3, true, dir.path().to_path_buf());
        let result = backend.fetch(&target(dir.path()), &options, &CancellationToken::new()).await;
        assert!(matches!(result, Err(AppError::ToolUnavailable(_))));
        assert!(!dir.path().join("deemix").join(".arl").exists());
    }

    #[tokio::test]
    async fn test_snapshot_diff_finds_nested_new_audio() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.flac"), b"a").unwrap();
        let before = snapshot_audio_files(dir.path()).await.unwrap();

        let album = dir.path().join("Artist - Album");
        std::fs::create_dir(&album).unwrap();
        std::fs::write(album.join("01 - Intro.flac"), b"a").unwrap();
        std::fs::write(album.join("cover.jpg"), b"i").unwrap();
        std::fs::write(dir.path().join("Single.MP3"), b"a").unwrap();

        let added = new_files(&before, snapshot_audio_files(dir.path()).await.unwrap());
        assert_eq!(added, vec![album.join("01 - Intro.flac"), dir.path().join("Single.MP3")]);
    }

    #[tokio::test]
    async fn test_settings_file_turns_artwork_off() {
        let dir = tempfile::tempdir().unwrap();
        let backend = DeezerBackend::new("deemix", Some("token".into()), dir.path().to_path_buf());
        backend.write_settings(false).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("deemix").join("config.json")).unwrap();
        let settings: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(settings["saveArtwork"], false);
        assert_eq!(settings["embeddedArtworkSize"], 0);
        assert_eq!(settings["tags"]["cover"], false);

        assert_eq!(DeezerBackend::settings_for(true)["saveArtwork"], true);
    }

    #[tokio::test]
    async fn test_snapshot_of_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let files = snapshot_audio_files(&dir.path().join("nope")).await.unwrap();
        assert!(files.is_empty());
    }
}
