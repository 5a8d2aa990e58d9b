use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use crate::downloader::{CollectionInfo, FetchReport, FetchedItem, OutputFormat};
use crate::errors::{AppError, Result};

const UNKNOWN_PLAYLIST: &str = "Unknown Playlist";

/// Declarative option set handed to the media tool for one fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    pub target: String,
    pub destination: PathBuf,
    pub format_selector: String,
    /// Transcode target; `None` keeps the source encoding.
    pub audio_format: Option<OutputFormat>,
    pub embed_thumbnail: bool,
    pub add_metadata: bool,
    pub allow_playlist: bool,
}

impl ToolRequest {
    pub fn output_template(&self) -> PathBuf {
        self.destination.join("%(title)s.%(ext)s")
    }
}

/// External program that peeks at and downloads media.
#[async_trait]
pub trait MediaTool: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    async fn probe_collection(&self, target: &str, cancel: &CancellationToken) -> Result<Option<CollectionInfo>>;

    async fn fetch(&self, request: &ToolRequest, cancel: &CancellationToken) -> Result<FetchReport>;
}

/// yt-dlp driven as a subprocess.
pub struct YtDlp {
    ytdlp_path: String,
    ffmpeg_location: Option<PathBuf>,
    proxy: Option<String>,
    fetch_timeout: Duration,
    peek_timeout: Duration,
}

/// Subset of `--dump-single-json` output used to detect collections.
#[derive(Debug, Deserialize)]
struct ProbeInfo {
    #[serde(rename = "_type")]
    kind: Option<String>,
    title: Option<String>,
}

/// One line printed after each file reaches its final location.
#[derive(Debug, Deserialize)]
struct MovedFile {
    title: Option<String>,
    filepath: Option<PathBuf>,
}

impl YtDlp {
    pub fn new(ytdlp_path: impl Into<String>) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            ffmpeg_location: None,
            proxy: None,
            fetch_timeout: Duration::from_secs(900),
            peek_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_ffmpeg_location(mut self, location: Option<PathBuf>) -> Self {
        self.ffmpeg_location = location;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_timeouts(mut self, fetch_timeout: Duration, peek_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self.peek_timeout = peek_timeout;
        self
    }

    pub fn probe_args(&self, target: &str) -> Vec<String> {
        let mut args: Vec<String> = [
            "--flat-playlist",
            "--dump-single-json",
            "--skip-download",
            "--no-warnings",
            "--ignore-errors",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        self.push_network_args(&mut args);
        args.push("--".to_string());
        args.push(target.to_string());
        args
    }

    pub fn fetch_args(&self, request: &ToolRequest) -> Vec<String> {
        let mut args = vec![
            "--format".to_string(),
            request.format_selector.clone(),
            "--output".to_string(),
            request.output_template().to_string_lossy().to_string(),
            "--no-warnings".to_string(),
            "--ignore-errors".to_string(),
            "--no-simulate".to_string(),
            "--print".to_string(),
            "after_move:%(.{title,filepath})j".to_string(),
            if request.allow_playlist { "--yes-playlist" } else { "--no-playlist" }.to_string(),
        ];

        if let Some(format) = request.audio_format {
            args.extend([
                "--extract-audio".to_string(),
                "--audio-format".to_string(),
                format.extension().to_string(),
                "--audio-quality".to_string(),
                "0".to_string(),
            ]);
        }
        if request.add_metadata {
            args.push("--embed-metadata".to_string());
        }
        if request.embed_thumbnail {
            args.push("--write-thumbnail".to_string());
            args.push("--embed-thumbnail".to_string());
        }
        if let Some(ffmpeg) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(ffmpeg.to_string_lossy().to_string());
        }
        self.push_network_args(&mut args);

        args.push("--".to_string());
        args.push(request.target.clone());
        args
    }

    fn push_network_args(&self, args: &mut Vec<String>) {
        if let Some(proxy) = &self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }
    }

    async fn run(&self, args: Vec<String>, timeout: Duration, cancel: &CancellationToken) -> Result<Output> {
        log::debug!("🚀 [YTDLP] Running: {} {:?}", self.ytdlp_path, args);
        let mut command = Command::new(&self.ytdlp_path);
        command.args(&args);
        run_tool(command, &self.ytdlp_path, timeout, cancel).await
    }
}

/// Spawns `command` with piped output and waits for it, killing the process
/// on cancellation or timeout.
pub(crate) async fn run_tool(
    mut command: Command,
    program: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Output> {
    if cancel.is_cancelled() {
        return Err(AppError::Cancelled);
    }

    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AppError::ToolUnavailable(format!("{} not found on PATH", program)),
            _ => AppError::Io(e),
        })?;

    // Dropping the wait future drops the child, which kills it.
    tokio::select! {
        _ = cancel.cancelled() => {
            log::warn!("🛑 [TOOL] Cancelled, killing {}", program);
            Err(AppError::Cancelled)
        }
        waited = tokio::time::timeout(timeout, child.wait_with_output()) => match waited {
            Ok(output) => Ok(output?),
            Err(_) => Err(AppError::Timeout(format!(
                "{} did not finish within {}s",
                program,
                timeout.as_secs()
            ))),
        },
    }
}

/// Reads the collection title from `--dump-single-json` output, if the
/// target is a collection.
pub fn parse_probe_output(stdout: &str) -> Result<Option<CollectionInfo>> {
    let info: ProbeInfo = serde_json::from_str(stdout.trim())?;
    if info.kind.as_deref() != Some("playlist") {
        return Ok(None);
    }
    let title = info
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_PLAYLIST.to_string());
    Ok(Some(CollectionInfo { title }))
}

/// Collects the per-file lines printed after each move. Other output is
/// ignored.
pub fn parse_fetch_output(stdout: &str) -> Vec<FetchedItem> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<MovedFile>(line.trim()).ok())
        .map(|moved| FetchedItem {
            title: moved.title,
            path: moved.filepath,
        })
        .collect()
}

#[async_trait]
impl MediaTool for YtDlp {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    fn is_available(&self) -> bool {
        which::which(&self.ytdlp_path).is_ok()
    }

    async fn probe_collection(&self, target: &str, cancel: &CancellationToken) -> Result<Option<CollectionInfo>> {
        log::info!("🔍 [YTDLP] Peeking at: {}", target);
        let output = self.run(self.probe_args(target), self.peek_timeout, cancel).await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::BackendFetch(format!("yt-dlp peek failed: {}", error.trim())));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_probe_output(&stdout)
    }

    async fn fetch(&self, request: &ToolRequest, cancel: &CancellationToken) -> Result<FetchReport> {
        let start_time = std::time::Instant::now();
        log::info!("⬇️ [YTDLP] Fetching {} into {:?}", request.target, request.destination);

        let output = self.run(self.fetch_args(request), self.fetch_timeout, cancel).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let items = parse_fetch_output(&stdout);

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            if items.is_empty() {
                log::error!("❌ [YTDLP] yt-dlp failed: {}", error.trim());
                return Err(AppError::BackendFetch(format!("yt-dlp failed: {}", error.trim())));
            }
            // Partial collection: keep what made it to disk.
            log::warn!("⚠️ [YTDLP] yt-dlp reported errors after {} files: {}", items.len(), error.trim());
        }

        log::info!(
            "✅ [YTDLP] {} file(s) fetched (took {:.2} seconds)",
            items.len(),
            start_time.elapsed().as_secs_f64()
        );
        Ok(FetchReport {
            title: items.first().and_then(|item| item.title.clone()),
            items,
            cover_embedded: request.embed_thumbnail,
        })
    }
}
