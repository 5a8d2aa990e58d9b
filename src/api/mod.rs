use std::path::PathBuf;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use crate::config::AppConfig;
use crate::downloader::manager::ResolutionDispatcher;
use crate::downloader::{DownloadOptions, DownloadOutcome};
use crate::errors::Result;
use crate::security::InputValidator;
use crate::utils::{ensure_dir_exists, generate_request_id};

fn default_format() -> String {
    "flac".to_string()
}

/// Structured form of `submit`, as a front end would post it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmitRequest {
    pub query: String,
    #[serde(default)]
    pub no_cover: bool,
    #[serde(default = "default_format")]
    pub format: String,
}

/// Request surface of the engine. Owns the current output directory; every
/// submit reads it once, so a later change never redirects a request that
/// is already running.
pub struct Session {
    dispatcher: Arc<ResolutionDispatcher>,
    output_dir: RwLock<PathBuf>,
    validator: InputValidator,
}

impl Session {
    pub fn new(dispatcher: Arc<ResolutionDispatcher>, output_dir: PathBuf) -> Self {
        Self {
            dispatcher,
            output_dir: RwLock::new(output_dir),
            validator: InputValidator::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let dispatcher = ResolutionDispatcher::from_config(config)?;
        Ok(Self::new(Arc::new(dispatcher), config.download_path.clone()))
    }

    pub fn dispatcher(&self) -> &ResolutionDispatcher {
        &self.dispatcher
    }

    pub async fn output_dir(&self) -> PathBuf {
        self.output_dir.read().await.clone()
    }

    pub async fn select_output_dir(&self, dir: PathBuf) -> Result<()> {
        self.validator.validate_output_dir(&dir)?;
        ensure_dir_exists(&dir).await?;
        log::info!("📁 [SESSION] Output directory is now {:?}", dir);
        *self.output_dir.write().await = dir;
        Ok(())
    }

    pub async fn submit(&self, query: &str, no_cover: bool, format: &str, cancel: &CancellationToken) -> DownloadOutcome {
        let request_id = generate_request_id();

        let query = match self.validator.validate_query(query) {
            Ok(query) => query,
            Err(e) => {
                log::warn!("⚠️ [{}] Rejected query: {}", request_id, e);
                return DownloadOutcome::from_error(&e);
            }
        };
        let output_format = match self.validator.validate_format(format) {
            Ok(format) => format,
            Err(e) => {
                log::warn!("⚠️ [{}] Rejected format: {}", request_id, e);
                return DownloadOutcome::from_error(&e);
            }
        };

        let options = DownloadOptions::new(output_format, !no_cover, self.output_dir().await);
        log::info!(
            "🎵 [{}] Submit '{}' as {} into {:?}",
            request_id,
            query,
            output_format,
            options.destination_directory
        );

        let start_time = std::time::Instant::now();
        let outcome = self.dispatcher.process(&query, &options, None, cancel).await;
        log::info!(
            "🏁 [{}] Finished with {:?} (took {:.2} seconds)",
            request_id,
            outcome.status,
            start_time.elapsed().as_secs_f64()
        );
        outcome
    }

    pub async fn submit_request(&self, request: &SubmitRequest, cancel: &CancellationToken) -> DownloadOutcome {
        self.submit(&request.query, request.no_cover, &request.format, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::downloader::http_pool::HttpPool;
    use crate::downloader::manager::DispatcherSettings;
    use crate::downloader::placeholder::PlaceholderFetcher;
    use crate::errors::ErrorKind;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session_with_placeholder(url: String, dir: PathBuf) -> Session {
        let mut dispatcher = ResolutionDispatcher::new(DispatcherSettings::default());
        let http = HttpPool::new(Duration::from_secs(5)).unwrap();
        dispatcher.set_placeholder(PlaceholderFetcher::new(Arc::new(http), url));
        Session::new(Arc::new(dispatcher), dir)
    }

    #[test]
    fn test_submit_request_defaults() {
        let request: SubmitRequest = serde_json::from_str(r#"{"query": "Song X"}"#).unwrap();
        assert_eq!(request.format, "flac");
        assert!(!request.no_cover);
    }

    #[tokio::test]
    async fn test_invalid_input_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with_placeholder("http://127.0.0.1:9".into(), dir.path().to_path_buf());
        let cancel = CancellationToken::new();

        let empty = session.submit("  ", false, "flac", &cancel).await;
        assert_eq!(empty.kind, Some(ErrorKind::InvalidInput));

        let bad_format = session.submit("Song X", false, "ogg", &cancel).await;
        assert_eq!(bad_format.kind, Some(ErrorKind::InvalidInput));
    }

    #[tokio::test]
    async fn test_submit_uses_selected_output_dir() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![1u8, 2, 3], "image/png"))
            .mount(&server)
            .await;
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let session = session_with_placeholder(server.uri(), first.path().to_path_buf());

        let target = second.path().join("picked");
        session.select_output_dir(target.clone()).await.unwrap();
        assert_eq!(session.output_dir().await, target);

        let request = SubmitRequest {
            query: "Song X".into(),
            no_cover: false,
            format: "daronne".into(),
        };
        let outcome = session.submit_request(&request, &CancellationToken::new()).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.produced_file_paths.len(), 1);
        let produced = &outcome.produced_file_paths[0];
        assert_eq!(produced.parent(), Some(target.as_path()));
        assert_eq!(produced.extension().and_then(|e| e.to_str()), Some("png"));
    }

    #[tokio::test]
    async fn test_select_output_dir_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with_placeholder("http://127.0.0.1:9".into(), dir.path().to_path_buf());
        assert!(session.select_output_dir(PathBuf::from("/music/../etc")).await.is_err());
        assert_eq!(session.output_dir().await, dir.path());
    }
}
