use std::sync::Arc;
use std::time::Duration;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use crate::config::AppConfig;
use crate::downloader::http_pool::HttpPool;
use crate::downloader::placeholder::PlaceholderFetcher;
use crate::downloader::strategies::{run_fetch, DeezerBackend, SoundCloudBackend, VideoPlatformBackend};
use crate::downloader::ytdlp::{MediaTool, YtDlp};
use crate::downloader::{BackendId, DownloadOptions, DownloadOutcome, OutcomeStatus, OutputFormat, SourceBackend};
use crate::errors::{AppError, ErrorKind, Result};
use crate::metadata::providers::SpotifyPageResolver;
use crate::metadata::{MetadataShape, MetadataSource, PlaylistManifest, ResolvedTrackRef};
use crate::search::{QueryState, SearchDirective, UrlTarget};
use crate::utils::{collection_directory, ensure_dir_exists};

/// Routing policy of the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherSettings {
    pub search_primary: BackendId,
    pub search_secondary: BackendId,
    /// Backend searched for every track text resolved from a metadata source.
    pub generic_backend: BackendId,
    pub max_concurrent: usize,
    pub peek_timeout: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            search_primary: BackendId::SoundCloud,
            search_secondary: BackendId::VideoPlatform,
            generic_backend: BackendId::VideoPlatform,
            max_concurrent: 3,
            peek_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&AppConfig> for DispatcherSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            search_primary: config.search_primary,
            search_secondary: config.search_secondary,
            generic_backend: config.generic_backend,
            max_concurrent: config.max_concurrent_downloads.max(1),
            peek_timeout: config.peek_timeout(),
        }
    }
}

/// Classifies queries, expands metadata playlists, walks the backend and
/// fallback chain, and folds everything into a `DownloadOutcome`.
pub struct ResolutionDispatcher {
    /// Priority order; the first backend whose `can_handle` matches wins.
    backends: Vec<Arc<dyn SourceBackend>>,
    metadata_sources: Vec<Arc<dyn MetadataSource>>,
    placeholder: Option<PlaceholderFetcher>,
    settings: DispatcherSettings,
}

impl ResolutionDispatcher {
    pub fn new(settings: DispatcherSettings) -> Self {
        Self {
            backends: Vec::new(),
            metadata_sources: Vec::new(),
            placeholder: None,
            settings,
        }
    }

    /// Wires the production backends, metadata source and image source.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mut http = HttpPool::new(config.http_timeout())?;
        if let Some(proxy) = &config.proxy {
            http = http.with_proxy(proxy)?;
        }
        let http = Arc::new(http);

        let tool: Arc<dyn MediaTool> = Arc::new(
            YtDlp::new(&config.ytdlp_path)
                .with_ffmpeg_location(config.ffmpeg_location.clone())
                .with_proxy(config.proxy.clone())
                .with_timeouts(config.fetch_timeout(), config.peek_timeout()),
        );
        let deezer = DeezerBackend::new(&config.deemix_path, config.deezer_arl.clone(), AppConfig::get_config_dir()?)
            .with_timeout(config.fetch_timeout());

        let mut dispatcher = Self::new(DispatcherSettings::from(config));
        dispatcher.register_backend(Arc::new(SoundCloudBackend::new(tool.clone())));
        dispatcher.register_backend(Arc::new(VideoPlatformBackend::new(tool)));
        dispatcher.register_backend(Arc::new(deezer));
        dispatcher.register_metadata_source(Arc::new(SpotifyPageResolver::new(http.clone())));
        dispatcher.set_placeholder(PlaceholderFetcher::new(http, &config.placeholder_image_url));
        dispatcher.apply_priority(&config.backend_priority);

        for backend in &dispatcher.backends {
            if !backend.is_available() {
                log::warn!("⚠️ [DISPATCH] {} is registered but its tooling is unavailable", backend.id());
            }
        }
        Ok(dispatcher)
    }

    pub fn register_backend(&mut self, backend: Arc<dyn SourceBackend>) {
        self.backends.push(backend);
    }

    pub fn register_metadata_source(&mut self, source: Arc<dyn MetadataSource>) {
        self.metadata_sources.push(source);
    }

    pub fn set_placeholder(&mut self, placeholder: PlaceholderFetcher) {
        self.placeholder = Some(placeholder);
    }

    /// Stable sort by position in `priority`; unlisted backends keep their
    /// registration order after the listed ones.
    pub fn apply_priority(&mut self, priority: &[BackendId]) {
        self.backends.sort_by_key(|backend| {
            priority
                .iter()
                .position(|id| *id == backend.id())
                .unwrap_or(usize::MAX)
        });
    }

    /// Backends in match order, with their runtime availability.
    pub fn backend_order(&self) -> Vec<(BackendId, bool)> {
        self.backends
            .iter()
            .map(|backend| (backend.id(), backend.is_available()))
            .collect()
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    /// Single entry point. Never fails: every error becomes an error
    /// outcome, and a triggered `cancel` becomes a cancelled one.
    pub async fn process(
        &self,
        query: &str,
        options: &DownloadOptions,
        force_fallback_backend: Option<BackendId>,
        cancel: &CancellationToken,
    ) -> DownloadOutcome {
        let query = query.trim();
        if query.is_empty() {
            return DownloadOutcome::error(ErrorKind::InvalidInput, "Query is empty");
        }
        if cancel.is_cancelled() {
            return DownloadOutcome::cancelled();
        }

        if options.output_format == OutputFormat::ImageGag {
            return self.fetch_placeholder(query, options, cancel).await;
        }

        let mut force = force_fallback_backend;
        let mut state = QueryState::Raw(query.to_string());
        loop {
            log::debug!("[DISPATCH] State: {:?}", state);
            state = match state {
                QueryState::Raw(raw) => self.classify(&raw),
                QueryState::ClassifiedUrl(UrlTarget::MetadataTrack { source, url }) => {
                    match self.resolve_track(source, &url, cancel).await {
                        Ok(track) => {
                            log::info!("🎯 [DISPATCH] {} resolved to '{}'", url, track.as_str());
                            force = Some(self.settings.generic_backend);
                            QueryState::ResolvedText(track.into_text())
                        }
                        Err(e) => return outcome_for(&e),
                    }
                }
                QueryState::ClassifiedUrl(UrlTarget::MetadataPlaylist { source, url }) => {
                    return self.expand_playlist(source, &url, options, cancel).await;
                }
                QueryState::ClassifiedUrl(UrlTarget::Backend { index, url }) => {
                    // Direct matches never fall back to another backend.
                    return run_fetch(self.backends[index].as_ref(), &url, options, self.settings.peek_timeout, cancel)
                        .await;
                }
                QueryState::ClassifiedSearch(directive) => {
                    return self.run_directive(&directive, options, cancel).await;
                }
                QueryState::ResolvedText(text) => {
                    return self.dispatch_text(&text, options, force, cancel).await;
                }
            };
        }
    }

    /// Metadata URL shapes first, then explicit search directives, then
    /// direct backend URLs. Anything else is free text.
    fn classify(&self, query: &str) -> QueryState {
        for (source, metadata) in self.metadata_sources.iter().enumerate() {
            let url = query.to_string();
            match metadata.classify(query) {
                Some(MetadataShape::Playlist) => {
                    return QueryState::ClassifiedUrl(UrlTarget::MetadataPlaylist { source, url })
                }
                Some(MetadataShape::Track) => {
                    return QueryState::ClassifiedUrl(UrlTarget::MetadataTrack { source, url })
                }
                None => {}
            }
        }

        if let Some(directive) = SearchDirective::parse(query, &self.search_prefixes()) {
            return QueryState::ClassifiedSearch(directive);
        }

        match self.match_backend(query) {
            Some(index) => QueryState::ClassifiedUrl(UrlTarget::Backend {
                index,
                url: query.to_string(),
            }),
            None => QueryState::ResolvedText(query.to_string()),
        }
    }

    fn search_prefixes(&self) -> Vec<&'static str> {
        self.backends.iter().filter_map(|backend| backend.search_prefix()).collect()
    }

    fn match_backend(&self, query: &str) -> Option<usize> {
        self.backends.iter().position(|backend| backend.can_handle(query))
    }

    fn backend(&self, id: BackendId) -> Option<&dyn SourceBackend> {
        self.backends
            .iter()
            .find(|backend| backend.id() == id)
            .map(|backend| backend.as_ref())
    }

    async fn fetch_placeholder(&self, query: &str, options: &DownloadOptions, cancel: &CancellationToken) -> DownloadOutcome {
        let Some(placeholder) = &self.placeholder else {
            return DownloadOutcome::error(ErrorKind::BackendFetchFailed, "Image mode has no image source configured");
        };
        match placeholder.fetch(query, &options.destination_directory, cancel).await {
            Ok(path) => DownloadOutcome::success(Some(PlaceholderFetcher::title_for(query)), vec![path]),
            Err(e) => outcome_for(&e),
        }
    }

    async fn resolve_track(&self, source: usize, url: &str, cancel: &CancellationToken) -> Result<ResolvedTrackRef> {
        let metadata = &self.metadata_sources[source];
        let resolved = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            resolved = metadata.resolve(url) => resolved,
        };
        match resolved {
            Ok(Some(track)) => Ok(track),
            Ok(None) => Err(AppError::UnresolvableMetadata(url.to_string())),
            Err(e) => Err(metadata_failure(e)),
        }
    }

    async fn fetch_manifest(&self, source: usize, url: &str, cancel: &CancellationToken) -> Result<PlaylistManifest> {
        let metadata = &self.metadata_sources[source];
        let manifest = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            manifest = metadata.resolve_playlist(url) => manifest,
        };
        let manifest = manifest.map_err(metadata_failure)?;
        if manifest.ordered_tracks.is_empty() {
            return Err(AppError::UnresolvableMetadata(url.to_string()));
        }
        Ok(manifest)
    }

    /// The outer outcome succeeds once the manifest is obtained; child
    /// failures only show up in `children`.
    async fn expand_playlist(
        &self,
        source: usize,
        url: &str,
        options: &DownloadOptions,
        cancel: &CancellationToken,
    ) -> DownloadOutcome {
        let manifest = match self.fetch_manifest(source, url, cancel).await {
            Ok(manifest) => manifest,
            Err(e) => return outcome_for(&e),
        };

        let folder = collection_directory(&options.destination_directory, &manifest.title);
        if let Err(e) = ensure_dir_exists(&folder).await {
            return outcome_for(&e);
        }
        log::info!(
            "📋 [PLAYLIST] '{}': {} tracks into {:?}",
            manifest.title,
            manifest.ordered_tracks.len(),
            folder
        );

        let child_options = options.with_destination(folder);
        let generic = Some(self.settings.generic_backend);
        let fetches: Vec<_> = manifest
            .ordered_tracks
            .iter()
            .map(|track| self.dispatch_text(track.as_str(), &child_options, generic, cancel))
            .collect();
        let children: Vec<DownloadOutcome> = stream::iter(fetches)
            .buffered(self.settings.max_concurrent.max(1))
            .collect()
            .await;

        if cancel.is_cancelled() {
            log::warn!("🛑 [PLAYLIST] '{}' cancelled after {} tracks", manifest.title, children.len());
            return DownloadOutcome::playlist(manifest.title, children).into_cancelled();
        }

        let failed = children.iter().filter(|child| !child.is_success()).count();
        log::info!(
            "✅ [PLAYLIST] '{}' done: {} ok, {} failed",
            manifest.title,
            children.len() - failed,
            failed
        );
        DownloadOutcome::playlist(manifest.title, children)
    }

    /// Free text: a direct backend match, else the forced backend's search,
    /// else the primary search with one fallback to the secondary.
    async fn dispatch_text(
        &self,
        text: &str,
        options: &DownloadOptions,
        force: Option<BackendId>,
        cancel: &CancellationToken,
    ) -> DownloadOutcome {
        if let Some(index) = self.match_backend(text) {
            return run_fetch(self.backends[index].as_ref(), text, options, self.settings.peek_timeout, cancel).await;
        }

        if let Some(forced) = force {
            log::info!("🔎 [DISPATCH] Searching {} for '{}'", forced, text);
            return self.search_on(forced, text, options, cancel).await;
        }

        let primary = self.search_on(self.settings.search_primary, text, options, cancel).await;
        if primary.status == OutcomeStatus::Cancelled {
            return primary;
        }
        if primary.is_success() && !primary.is_empty_success() {
            return primary;
        }

        log::warn!(
            "🔄 [DISPATCH] {} gave nothing usable for '{}' ({}), trying {}",
            self.settings.search_primary,
            text,
            primary.message.as_deref().unwrap_or("empty result"),
            self.settings.search_secondary
        );
        self.search_on(self.settings.search_secondary, text, options, cancel).await
    }

    async fn search_on(
        &self,
        id: BackendId,
        text: &str,
        options: &DownloadOptions,
        cancel: &CancellationToken,
    ) -> DownloadOutcome {
        let Some(backend) = self.backend(id) else {
            return DownloadOutcome::error(ErrorKind::BackendFetchFailed, format!("{} is not registered", id));
        };
        let Some(prefix) = backend.search_prefix() else {
            return DownloadOutcome::error(ErrorKind::BackendFetchFailed, format!("{} cannot search", id));
        };
        let directive = SearchDirective::new(prefix, text);
        run_fetch(backend, &directive.to_query(), options, self.settings.peek_timeout, cancel).await
    }

    async fn run_directive(
        &self,
        directive: &SearchDirective,
        options: &DownloadOptions,
        cancel: &CancellationToken,
    ) -> DownloadOutcome {
        let owner = self
            .backends
            .iter()
            .find(|backend| backend.search_prefix() == Some(directive.prefix.as_str()));
        match owner {
            Some(backend) => {
                run_fetch(backend.as_ref(), &directive.to_query(), options, self.settings.peek_timeout, cancel).await
            }
            None => DownloadOutcome::error(
                ErrorKind::BackendFetchFailed,
                format!("No backend answers '{}' searches", directive.prefix),
            ),
        }
    }
}

/// Errors from a metadata call site are metadata failures, whatever their
/// underlying cause.
fn metadata_failure(error: AppError) -> AppError {
    match error {
        AppError::Cancelled | AppError::MetadataUnreachable(_) | AppError::UnresolvableMetadata(_) => error,
        other => AppError::MetadataUnreachable(other.to_string()),
    }
}

fn outcome_for(error: &AppError) -> DownloadOutcome {
    match error {
        AppError::Cancelled => log::warn!("🛑 [DISPATCH] Cancelled"),
        other => log::error!("❌ [DISPATCH] {}", other),
    }
    DownloadOutcome::from_error(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let config = AppConfig {
            max_concurrent_downloads: 0,
            generic_backend: BackendId::SoundCloud,
            peek_timeout_secs: 7,
            ..AppConfig::default()
        };
        let settings = DispatcherSettings::from(&config);
        assert_eq!(settings.max_concurrent, 1);
        assert_eq!(settings.generic_backend, BackendId::SoundCloud);
        assert_eq!(settings.search_primary, BackendId::SoundCloud);
        assert_eq!(settings.search_secondary, BackendId::VideoPlatform);
        assert_eq!(settings.peek_timeout, Duration::from_secs(7));
    }

    #[test]
    fn test_metadata_failure_tagging() {
        let http = metadata_failure(AppError::BackendFetch("boom".into()));
        assert_eq!(http.kind(), ErrorKind::MetadataUnreachable);
        assert_eq!(metadata_failure(AppError::Cancelled).kind(), ErrorKind::Cancelled);
        let empty = metadata_failure(AppError::UnresolvableMetadata("x".into()));
        assert_eq!(empty.kind(), ErrorKind::UnresolvableMetadata);
    }

    #[tokio::test]
    async fn test_empty_query_is_invalid_input() {
        let dispatcher = ResolutionDispatcher::new(DispatcherSettings::default());
        let options = DownloadOptions::new(OutputFormat::Flac, true, std::env::temp_dir());
        let outcome = dispatcher.process("   ", &options, None, &CancellationToken::new()).await;
        assert_eq!(outcome.kind, Some(ErrorKind::InvalidInput));
    }
}
