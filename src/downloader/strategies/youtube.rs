use std::sync::Arc;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use crate::downloader::strategies::cover_embeddable;
use crate::downloader::ytdlp::{MediaTool, ToolRequest};
use crate::downloader::{
    BackendId, CollectionInfo, DownloadOptions, FetchReport, FetchTarget, OutputFormat, SourceBackend,
};
use crate::errors::Result;
use crate::search::host_matches;

const VIDEO_PLATFORM_DOMAINS: [&str; 3] = ["youtube.com", "youtu.be", "music.youtube.com"];

/// Generic streaming-video backend, the universal fallback.
pub struct VideoPlatformBackend {
    tool: Arc<dyn MediaTool>,
}

impl VideoPlatformBackend {
    pub fn new(tool: Arc<dyn MediaTool>) -> Self {
        Self { tool }
    }

    /// Prefers the native m4a stream; transcodes only when another format
    /// was asked for.
    pub fn tool_request(target: &FetchTarget, options: &DownloadOptions) -> ToolRequest {
        let audio_format = match options.output_format {
            OutputFormat::M4a => None,
            other => Some(other),
        };
        ToolRequest {
            target: target.query.clone(),
            destination: target.destination.clone(),
            format_selector: "bestaudio[ext=m4a]/bestaudio/best".to_string(),
            audio_format,
            embed_thumbnail: options.embed_cover && cover_embeddable(options.output_format),
            add_metadata: true,
            allow_playlist: target.collection,
        }
    }
}

#[async_trait]
impl SourceBackend for VideoPlatformBackend {
    fn id(&self) -> BackendId {
        BackendId::VideoPlatform
    }

    fn can_handle(&self, query: &str) -> bool {
        host_matches(query, &VIDEO_PLATFORM_DOMAINS)
    }

    fn search_prefix(&self) -> Option<&'static str> {
        Some("ytsearch")
    }

    fn is_available(&self) -> bool {
        self.tool.is_available()
    }

    async fn probe_collection(&self, query: &str, cancel: &CancellationToken) -> Result<Option<CollectionInfo>> {
        self.tool.probe_collection(query, cancel).await
    }

    async fn fetch(&self, target: &FetchTarget, options: &DownloadOptions, cancel: &CancellationToken) -> Result<FetchReport> {
        log::info!("📺 [YOUTUBE] Fetching: {}", target.query);
        self.tool.fetch(&Self::tool_request(target, options), cancel).await
    }
}
