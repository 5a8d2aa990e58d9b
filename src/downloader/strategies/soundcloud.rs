use std::sync::Arc;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use crate::downloader::strategies::cover_embeddable;
use crate::downloader::ytdlp::{MediaTool, ToolRequest};
use crate::downloader::{BackendId, CollectionInfo, DownloadOptions, FetchReport, FetchTarget, SourceBackend};
use crate::errors::Result;
use crate::search::host_matches;

const SOUNDCLOUD_DOMAINS: [&str; 1] = ["soundcloud.com"];

pub struct SoundCloudBackend {
    tool: Arc<dyn MediaTool>,
}

impl SoundCloudBackend {
    pub fn new(tool: Arc<dyn MediaTool>) -> Self {
        Self { tool }
    }

    /// Always extracts audio and transcodes to the requested format.
    pub fn tool_request(target: &FetchTarget, options: &DownloadOptions) -> ToolRequest {
        ToolRequest {
            target: target.query.clone(),
            destination: target.destination.clone(),
            format_selector: "bestaudio/best".to_string(),
            audio_format: Some(options.output_format),
            embed_thumbnail: options.embed_cover && cover_embeddable(options.output_format),
            add_metadata: true,
            allow_playlist: target.collection,
        }
    }
}

#[async_trait]
impl SourceBackend for SoundCloudBackend {
    fn id(&self) -> BackendId {
        BackendId::SoundCloud
    }

    fn can_handle(&self, query: &str) -> bool {
        host_matches(query, &SOUNDCLOUD_DOMAINS)
    }

    fn search_prefix(&self) -> Option<&'static str> {
        Some("scsearch")
    }

    fn is_available(&self) -> bool {
        self.tool.is_available()
    }

    async fn probe_collection(&self, query: &str, cancel: &CancellationToken) -> Result<Option<CollectionInfo>> {
        self.tool.probe_collection(query, cancel).await
    }

    async fn fetch(&self, target: &FetchTarget, options: &DownloadOptions, cancel: &CancellationToken) -> Result<FetchReport> {
        log::info!("🎧 [SOUNDCLOUD] Fetching: {}", target.query);
        self.tool.fetch(&Self::tool_request(target, options), cancel).await
    }
}
