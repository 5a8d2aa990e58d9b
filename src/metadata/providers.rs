use crate::downloader::http_pool::HttpPool;
use crate::errors::{AppError, Result};
use crate::metadata::{MetadataShape, MetadataSource, PlaylistManifest, ResolvedTrackRef};
use crate::search::host_matches;
use futures::stream::{self, StreamExt};
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use url::Url;

const SPOTIFY_DOMAINS: [&str; 1] = ["open.spotify.com"];
const SITE_SUFFIX: &str = " | Spotify";
const DEFAULT_PLAYLIST_TITLE: &str = "Unknown Playlist";
const TRACK_RESOLVE_CONCURRENCY: usize = 4;

fn title_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex"))
}

fn heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").expect("valid heading regex"))
}

fn track_link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']*/track/[^"']*)["']"#).expect("valid link regex")
    })
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"))
}

/// Resolves Spotify web pages into track text without API credentials, by
/// reading the page title and the track links of the initially rendered page.
pub struct SpotifyPageResolver {
    http: Arc<HttpPool>,
}

impl SpotifyPageResolver {
    pub fn new(http: Arc<HttpPool>) -> Self {
        Self { http }
    }

    /// Only the `open.spotify.com` host is handled; playlist and album pages
    /// are collections, anything else is a single track.
    pub fn classify_url(query: &str) -> Option<MetadataShape> {
        if !host_matches(query, &SPOTIFY_DOMAINS) {
            return None;
        }
        if query.contains("/playlist/") || query.contains("/album/") {
            Some(MetadataShape::Playlist)
        } else {
            Some(MetadataShape::Track)
        }
    }

    async fn resolve_or_skip(&self, link: String) -> Option<ResolvedTrackRef> {
        match self.resolve(&link).await {
            Ok(track) => track,
            Err(e) => {
                log::warn!("⚠️ [SPOTIFY] Dropping track {}: {}", link, e);
                None
            }
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        self.http
            .get_text(url)
            .await
            .map_err(|e| AppError::MetadataUnreachable(format!("{}: {}", url, e)))
    }
}

/// Text of the page `<title>`, without the site suffix.
pub fn extract_track_title(html: &str) -> Option<String> {
    let raw = title_regex().captures(html)?.get(1)?.as_str();
    let title = decode_entities(raw);
    let title = title.trim();
    let title = title.strip_suffix(SITE_SUFFIX).unwrap_or(title).trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

/// Text of the first `<h1>`, with `|` removed.
pub fn extract_collection_title(html: &str) -> Option<String> {
    let raw = heading_regex().captures(html)?.get(1)?.as_str();
    let text = tag_regex().replace_all(raw, "");
    let title = decode_entities(&text).replace('|', "");
    let title = title.trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

/// Track links in document order, deduplicated by their raw `href`.
pub fn extract_track_links(html: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    track_link_regex()
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).map(|m| decode_entities(m.as_str())))
        .filter(|href| seen.insert(href.clone()))
        .collect()
}

fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

#[async_trait::async_trait]
impl MetadataSource for SpotifyPageResolver {
    fn name(&self) -> &str {
        "spotify"
    }

    fn classify(&self, query: &str) -> Option<MetadataShape> {
        Self::classify_url(query)
    }

    async fn resolve(&self, url: &str) -> Result<Option<ResolvedTrackRef>> {
        log::info!("🔍 [SPOTIFY] Resolving track page: {}", url);
        let html = self.fetch_page(url).await?;
        let title = extract_track_title(&html);
        match &title {
            Some(t) => log::info!("✅ [SPOTIFY] Resolved to: {}", t),
            None => log::warn!("⚠️ [SPOTIFY] No title found on {}", url),
        }
        Ok(title.map(ResolvedTrackRef))
    }

    async fn resolve_playlist(&self, url: &str) -> Result<PlaylistManifest> {
        log::info!("🔍 [SPOTIFY] Resolving collection page: {}", url);
        let html = self.fetch_page(url).await?;
        let title = extract_collection_title(&html).unwrap_or_else(|| DEFAULT_PLAYLIST_TITLE.to_string());
        let base = Url::parse(url)?;

        let links: Vec<String> = extract_track_links(&html)
            .into_iter()
            .filter_map(|href| match base.join(&href) {
                Ok(full) => Some(full.to_string()),
                Err(e) => {
                    log::debug!("Skipping unusable track link {}: {}", href, e);
                    None
                }
            })
            .collect();
        log::info!("📊 [SPOTIFY] '{}' lists {} track links", title, links.len());

        let lookups: Vec<_> = links.into_iter().map(|link| self.resolve_or_skip(link)).collect();
        let resolved: Vec<Option<ResolvedTrackRef>> = stream::iter(lookups)
            .buffered(TRACK_RESOLVE_CONCURRENCY)
            .collect()
            .await;

        let ordered_tracks: Vec<ResolvedTrackRef> = resolved.into_iter().flatten().collect();
        log::info!("✅ [SPOTIFY] Manifest '{}' has {} tracks", title, ordered_tracks.len());

        Ok(PlaylistManifest { title, ordered_tracks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolver() -> SpotifyPageResolver {
        let http = HttpPool::new(Duration::from_secs(5)).unwrap();
        SpotifyPageResolver::new(Arc::new(http))
    }

    async fn serve(server: &MockServer, route: &str, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_classify_url_shapes() {
        assert_eq!(
            SpotifyPageResolver::classify_url("https://open.spotify.com/playlist/37i9dQZF1DX"),
            Some(MetadataShape::Playlist)
        );
        assert_eq!(
            SpotifyPageResolver::classify_url("https://open.spotify.com/album/1ATL5GLyefJaxhQzSPVrLX"),
            Some(MetadataShape::Playlist)
        );
        assert_eq!(
            SpotifyPageResolver::classify_url("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC?si=x"),
            Some(MetadataShape::Track)
        );
        assert_eq!(SpotifyPageResolver::classify_url("https://soundcloud.com/a/b"), None);
        assert_eq!(SpotifyPageResolver::classify_url("spotify playlist"), None);
    }

    #[test]
    fn test_extract_track_title_strips_suffix_and_entities() {
        let html = "<html><head><title>Rock &amp; Roll - Led Zeppelin | Spotify</title></head></html>";
        assert_eq!(extract_track_title(html).as_deref(), Some("Rock & Roll - Led Zeppelin"));
        assert_eq!(extract_track_title("<title>   </title>"), None);
        assert_eq!(extract_track_title("<p>no title</p>"), None);
    }

    #[test]
    fn test_extract_collection_title() {
        let html = r#"<h1 class="x"><span>Road | Trip</span></h1>"#;
        assert_eq!(extract_collection_title(html).as_deref(), Some("Road  Trip"));
        assert_eq!(extract_collection_title("<div></div>"), None);
    }

    #[test]
    fn test_extract_track_links_dedupes_in_order() {
        let html = r#"
            <a href="/track/b">B</a>
            <a class="x" href="/track/a">A</a>
            <a href="/artist/z">Z</a>
            <a href="/track/b">B again</a>
        "#;
        assert_eq!(extract_track_links(html), vec!["/track/b", "/track/a"]);
    }

    #[tokio::test]
    async fn test_resolve_returns_none_without_title() {
        let server = MockServer::start().await;
        serve(&server, "/track/empty", 200, "<html><body>nothing</body></html>").await;

        let track = resolver().resolve(&format!("{}/track/empty", server.uri())).await.unwrap();
        assert_eq!(track, None);
    }

    #[tokio::test]
    async fn test_resolve_unreachable_page_is_distinct_error() {
        let server = MockServer::start().await;
        serve(&server, "/track/gone", 404, "").await;

        let result = resolver().resolve(&format!("{}/track/gone", server.uri())).await;
        assert!(matches!(result, Err(AppError::MetadataUnreachable(_))));
    }

    #[tokio::test]
    async fn test_resolve_playlist_omits_failed_tracks_and_keeps_order() {
        let server = MockServer::start().await;
        let page = r#"<html><head><title>Mix | Spotify</title></head><body>
            <h1>Summer | Mix</h1>
            <a href="/track/one">1</a>
            <a href="/track/two">2</a>
            <a href="/track/one">1 again</a>
            <a href="/track/three">3</a>
        </body></html>"#;
        serve(&server, "/playlist/abc", 200, page).await;
        serve(&server, "/track/one", 200, "<title>First - Artist | Spotify</title>").await;
        serve(&server, "/track/two", 500, "").await;
        serve(&server, "/track/three", 200, "<title>Third - Artist | Spotify</title>").await;

        let manifest = resolver()
            .resolve_playlist(&format!("{}/playlist/abc", server.uri()))
            .await
            .unwrap();

        assert_eq!(manifest.title, "Summer  Mix");
        assert_eq!(
            manifest.ordered_tracks,
            vec![
                ResolvedTrackRef("First - Artist".into()),
                ResolvedTrackRef("Third - Artist".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_resolve_playlist_defaults_title() {
        let server = MockServer::start().await;
        serve(&server, "/playlist/untitled", 200, "<html><body></body></html>").await;

        let manifest = resolver()
            .resolve_playlist(&format!("{}/playlist/untitled", server.uri()))
            .await
            .unwrap();
        assert_eq!(manifest.title, DEFAULT_PLAYLIST_TITLE);
        assert!(manifest.ordered_tracks.is_empty());
    }
}
