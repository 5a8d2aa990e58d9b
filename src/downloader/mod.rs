pub mod http_pool;
pub mod manager;
pub mod placeholder;
pub mod strategies;
pub mod ytdlp;

use crate::errors::{AppError, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

/// Stable identifier of a registered backend. The serialized names are the
/// ones accepted in configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BackendId {
    #[serde(rename = "soundcloud")]
    SoundCloud,
    #[serde(rename = "video_platform")]
    VideoPlatform,
    #[serde(rename = "deezer")]
    Deezer,
}

impl BackendId {
    pub const ALL: [BackendId; 3] = [BackendId::SoundCloud, BackendId::VideoPlatform, BackendId::Deezer];

    pub fn display_name(&self) -> &'static str {
        match self {
            BackendId::SoundCloud => "SoundCloud",
            BackendId::VideoPlatform => "YouTube",
            BackendId::Deezer => "Deezer",
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Flac,
    Mp3,
    M4a,
    Wav,
    /// Not audio: fetches a placeholder picture instead of resolving anything.
    #[serde(rename = "image-gag", alias = "daronne")]
    ImageGag,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Flac => "flac",
            OutputFormat::Mp3 => "mp3",
            OutputFormat::M4a => "m4a",
            OutputFormat::Wav => "wav",
            OutputFormat::ImageGag => "jpg",
        }
    }

    pub fn is_audio(&self) -> bool {
        !matches!(self, OutputFormat::ImageGag)
    }
}

impl FromStr for OutputFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flac" => Ok(OutputFormat::Flac),
            "mp3" => Ok(OutputFormat::Mp3),
            "m4a" => Ok(OutputFormat::M4a),
            "wav" => Ok(OutputFormat::Wav),
            "image-gag" | "daronne" => Ok(OutputFormat::ImageGag),
            other => Err(AppError::InvalidInput(format!(
                "Unsupported format: {}. Supported formats: flac, mp3, m4a, wav, image-gag",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::ImageGag => f.write_str("image-gag"),
            other => f.write_str(other.extension()),
        }
    }
}

/// Per-request options. Playlist expansion clones these and only swaps the
/// destination directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadOptions {
    pub output_format: OutputFormat,
    pub embed_cover: bool,
    pub destination_directory: PathBuf,
}

impl DownloadOptions {
    pub fn new(output_format: OutputFormat, embed_cover: bool, destination_directory: PathBuf) -> Self {
        Self {
            output_format,
            embed_cover,
            destination_directory,
        }
    }

    pub fn with_destination(&self, destination_directory: PathBuf) -> Self {
        Self {
            destination_directory,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
    Cancelled,
}

/// Result of any resolution or fetch attempt, nested for playlists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadOutcome {
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    pub title: Option<String>,
    pub produced_file_paths: Vec<PathBuf>,
    pub message: Option<String>,
    pub is_playlist: bool,
    pub children: Vec<DownloadOutcome>,
}

impl DownloadOutcome {
    pub fn success(title: Option<String>, produced_file_paths: Vec<PathBuf>) -> Self {
        Self {
            status: OutcomeStatus::Success,
            kind: None,
            title,
            produced_file_paths,
            message: None,
            is_playlist: false,
            children: Vec::new(),
        }
    }

    /// Successful collection. The produced paths are the children's paths,
    /// in child order.
    pub fn playlist(title: String, children: Vec<DownloadOutcome>) -> Self {
        let produced_file_paths = children
            .iter()
            .flat_map(|child| child.produced_file_paths.iter().cloned())
            .collect();
        Self {
            status: OutcomeStatus::Success,
            kind: None,
            title: Some(title),
            produced_file_paths,
            message: None,
            is_playlist: true,
            children,
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        let status = if kind == ErrorKind::Cancelled {
            OutcomeStatus::Cancelled
        } else {
            OutcomeStatus::Error
        };
        Self {
            status,
            kind: Some(kind),
            title: None,
            produced_file_paths: Vec::new(),
            message: Some(message.into()),
            is_playlist: false,
            children: Vec::new(),
        }
    }

    pub fn from_error(error: &AppError) -> Self {
        Self::error(error.kind(), error.to_string())
    }

    pub fn cancelled() -> Self {
        Self::from_error(&AppError::Cancelled)
    }

    /// Marks an assembled outcome as cancelled, keeping its title, files
    /// and children.
    pub fn into_cancelled(self) -> Self {
        let cancelled = Self::cancelled();
        Self {
            status: cancelled.status,
            kind: cancelled.kind,
            message: cancelled.message,
            ..self
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    /// A success that carries nothing: no files, no title and no children.
    pub fn is_empty_success(&self) -> bool {
        self.is_success()
            && self.produced_file_paths.is_empty()
            && self.children.is_empty()
            && self.title.is_none()
    }
}

/// A collection (playlist, set, album) detected by a metadata peek.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub title: String,
}

/// What a backend is asked to fetch, after the shared pre-fetch step has
/// settled on the final destination.
#[derive(Debug, Clone)]
pub struct FetchTarget {
    pub query: String,
    pub destination: PathBuf,
    /// Set when the peek found a native collection.
    pub collection: bool,
    /// Set when `query` is a search directive.
    pub search: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedItem {
    pub title: Option<String>,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchReport {
    pub title: Option<String>,
    pub items: Vec<FetchedItem>,
    /// The tool was asked to embed the cover into the produced files.
    pub cover_embedded: bool,
}

impl FetchReport {
    pub fn paths(&self) -> Vec<PathBuf> {
        self.items.iter().filter_map(|item| item.path.clone()).collect()
    }
}

/// One external service able to fetch audio.
///
/// `can_handle` must be pure: the dispatcher calls it while classifying a
/// query and relies on it never touching the network.
#[async_trait::async_trait]
pub trait SourceBackend: Send + Sync {
    fn id(&self) -> BackendId;

    fn can_handle(&self, query: &str) -> bool;

    /// Prefix of the search directives this backend answers (`scsearch`,
    /// `ytsearch`), if it can search at all.
    fn search_prefix(&self) -> Option<&'static str> {
        None
    }

    /// Whether the backend's tooling is present at runtime.
    fn is_available(&self) -> bool {
        true
    }

    /// Lightweight, non-downloading look at the target to detect a native
    /// collection.
    async fn probe_collection(
        &self,
        _query: &str,
        _cancel: &CancellationToken,
    ) -> Result<Option<CollectionInfo>> {
        Ok(None)
    }

    async fn fetch(
        &self,
        target: &FetchTarget,
        options: &DownloadOptions,
        cancel: &CancellationToken,
    ) -> Result<FetchReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("FLAC".parse::<OutputFormat>().unwrap(), OutputFormat::Flac);
        assert_eq!(" m4a ".parse::<OutputFormat>().unwrap(), OutputFormat::M4a);
        assert_eq!("daronne".parse::<OutputFormat>().unwrap(), OutputFormat::ImageGag);
        assert_eq!("image-gag".parse::<OutputFormat>().unwrap(), OutputFormat::ImageGag);
        assert!("ogg".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_playlist_outcome_collects_child_paths_in_order() {
        let children = vec![
            DownloadOutcome::success(Some("a".into()), vec![PathBuf::from("a.flac")]),
            DownloadOutcome::error(ErrorKind::NoResultsFound, "none"),
            DownloadOutcome::success(Some("b".into()), vec![PathBuf::from("b.flac")]),
        ];
        let outcome = DownloadOutcome::playlist("Mix".into(), children);
        assert!(outcome.is_playlist);
        assert!(outcome.is_success());
        assert_eq!(outcome.children.len(), 3);
        assert_eq!(
            outcome.produced_file_paths,
            vec![PathBuf::from("a.flac"), PathBuf::from("b.flac")]
        );
    }

    #[test]
    fn test_cancelled_outcome_status() {
        let outcome = DownloadOutcome::cancelled();
        assert_eq!(outcome.status, OutcomeStatus::Cancelled);
        assert_eq!(outcome.kind, Some(ErrorKind::Cancelled));
    }

    #[test]
    fn test_empty_success_detection() {
        assert!(DownloadOutcome::success(None, vec![]).is_empty_success());
        assert!(!DownloadOutcome::success(Some("t".into()), vec![]).is_empty_success());
        assert!(!DownloadOutcome::error(ErrorKind::NoResultsFound, "x").is_empty_success());
    }

    #[test]
    fn test_outcome_json_shape() {
        let outcome = DownloadOutcome::success(Some("Song".into()), vec![PathBuf::from("/m/Song.flac")]);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["is_playlist"], false);
        assert!(json.get("kind").is_none());
        assert_eq!(json["produced_file_paths"][0], "/m/Song.flac");
    }
}
