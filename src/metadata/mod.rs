pub mod providers;

use serde::{Deserialize, Serialize};
use crate::errors::Result;

/// Normalized "artist - title" text. It has no further structure and is
/// dispatched again as free text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedTrackRef(pub String);

impl ResolvedTrackRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_text(self) -> String {
        self.0
    }
}

/// A resolved collection. Tracks keep page order and are not deduplicated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaylistManifest {
    pub title: String,
    pub ordered_tracks: Vec<ResolvedTrackRef>,
}

/// URL shape recognized by a metadata source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataShape {
    Playlist,
    Track,
}

/// A service consulted only for titles, never for audio.
#[async_trait::async_trait]
pub trait MetadataSource: Send + Sync {
    fn name(&self) -> &str;

    /// Pure URL inspection.
    fn classify(&self, query: &str) -> Option<MetadataShape>;

    /// `Ok(None)` when the page was reached but carries no usable title;
    /// `Err(AppError::MetadataUnreachable)` when the page could not be read.
    async fn resolve(&self, url: &str) -> Result<Option<ResolvedTrackRef>>;

    /// Tracks that fail to resolve are left out, so the manifest may be
    /// shorter than the number of links on the page.
    async fn resolve_playlist(&self, url: &str) -> Result<PlaylistManifest>;
}
