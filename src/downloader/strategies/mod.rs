pub mod deezer;
pub mod soundcloud;
pub mod youtube;

// Re-export backends for easy access
pub use deezer::DeezerBackend;
pub use soundcloud::SoundCloudBackend;
pub use youtube::VideoPlatformBackend;

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use crate::downloader::{
    CollectionInfo, DownloadOptions, DownloadOutcome, FetchReport, FetchTarget, OutputFormat, SourceBackend,
};
use crate::errors::{AppError, Result};
use crate::search::is_search_directive;
use crate::utils::{collection_directory, ensure_dir_exists, remove_cover_sidecars};

/// Containers the media tool can embed a cover into.
pub(crate) fn cover_embeddable(format: OutputFormat) -> bool {
    matches!(format, OutputFormat::Flac | OutputFormat::Mp3 | OutputFormat::M4a)
}

/// Runs one backend fetch with the shared pre and post steps: native
/// collection detection, destination redirect, sidecar cleanup. Never fails;
/// errors come back as error outcomes.
pub async fn run_fetch(
    backend: &dyn SourceBackend,
    query: &str,
    options: &DownloadOptions,
    peek_timeout: Duration,
    cancel: &CancellationToken,
) -> DownloadOutcome {
    match try_fetch(backend, query, options, peek_timeout, cancel).await {
        Ok(outcome) => outcome,
        Err(AppError::Cancelled) => {
            log::warn!("🛑 [{}] Cancelled: {}", backend.id(), query);
            DownloadOutcome::cancelled()
        }
        Err(e) => {
            log::error!("❌ [{}] Fetch failed for {}: {}", backend.id(), query, e);
            DownloadOutcome::from_error(&e)
        }
    }
}

async fn try_fetch(
    backend: &dyn SourceBackend,
    query: &str,
    options: &DownloadOptions,
    peek_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<DownloadOutcome> {
    if cancel.is_cancelled() {
        return Err(AppError::Cancelled);
    }

    let search = backend
        .search_prefix()
        .map(|prefix| is_search_directive(query, &[prefix]))
        .unwrap_or(false);

    let collection = if search {
        None
    } else {
        peek_collection(backend, query, peek_timeout, cancel).await
    };
    if cancel.is_cancelled() {
        return Err(AppError::Cancelled);
    }

    let destination = match &collection {
        Some(info) => {
            let dir = collection_directory(&options.destination_directory, &info.title);
            log::info!("📂 [{}] Collection '{}' goes to {:?}", backend.id(), info.title, dir);
            dir
        }
        None => options.destination_directory.clone(),
    };
    ensure_dir_exists(&destination).await?;

    let target = FetchTarget {
        query: query.to_string(),
        destination: destination.clone(),
        collection: collection.is_some(),
        search,
    };
    let report = backend
        .fetch(&target, &options.with_destination(destination), cancel)
        .await?;

    if search && report.items.is_empty() {
        return Err(AppError::NoResults(format!("{} returned nothing for {}", backend.id(), query)));
    }

    // Only sidecars of a cover that went into the file are redundant.
    if report.cover_embedded {
        for path in report.paths() {
            remove_cover_sidecars(&path).await;
        }
    }

    Ok(into_outcome(report, collection))
}

/// Best effort: any peek failure means "not a collection".
async fn peek_collection(
    backend: &dyn SourceBackend,
    query: &str,
    peek_timeout: Duration,
    cancel: &CancellationToken,
) -> Option<CollectionInfo> {
    match tokio::time::timeout(peek_timeout, backend.probe_collection(query, cancel)).await {
        Ok(Ok(info)) => info,
        Ok(Err(e)) => {
            log::debug!("Peek failed for {}, using original destination: {}", query, e);
            None
        }
        Err(_) => {
            log::warn!("⚠️ [{}] Peek timed out after {}s", backend.id(), peek_timeout.as_secs());
            None
        }
    }
}

fn into_outcome(report: FetchReport, collection: Option<CollectionInfo>) -> DownloadOutcome {
    match collection {
        Some(info) => {
            let children = report
                .items
                .into_iter()
                .map(|item| DownloadOutcome::success(item.title, item.path.into_iter().collect()))
                .collect();
            DownloadOutcome::playlist(info.title, children)
        }
        None => {
            let paths = report.paths();
            DownloadOutcome::success(report.title, paths)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeTool;
    use super::*;
    use crate::errors::ErrorKind;
    use crate::downloader::OutcomeStatus;
    use std::sync::Arc;

    fn options(dir: &std::path::Path, embed_cover: bool) -> DownloadOptions {
        DownloadOptions::new(OutputFormat::Flac, embed_cover, dir.to_path_buf())
    }

    const PEEK: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_single_item_fetch_cleans_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let tool = Arc::new(FakeTool::with_titles(&["Artist - Song"]));
        let backend = SoundCloudBackend::new(tool.clone());

        let outcome = run_fetch(
            &backend,
            "https://soundcloud.com/artist/song",
            &options(dir.path(), true),
            PEEK,
            &CancellationToken::new(),
        )
        .await;

        assert!(outcome.is_success());
        assert!(!outcome.is_playlist);
        assert_eq!(outcome.title.as_deref(), Some("Artist - Song"));
        assert_eq!(outcome.produced_file_paths, vec![dir.path().join("Artist - Song.flac")]);
        assert!(!dir.path().join("Artist - Song.jpg").exists());
        assert_eq!(tool.probes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sidecar_kept_without_cover_embedding() {
        let dir = tempfile::tempdir().unwrap();
        let tool = Arc::new(FakeTool::with_titles(&["Song"]));
        let backend = SoundCloudBackend::new(tool);

        run_fetch(&backend, "https://soundcloud.com/a/song", &options(dir.path(), false), PEEK, &CancellationToken::new()).await;

        assert!(dir.path().join("Song.jpg").exists());
    }

    #[tokio::test]
    async fn test_wav_keeps_existing_cover_file() {
        let dir = tempfile::tempdir().unwrap();
        let tool = Arc::new(FakeTool::with_titles(&["Song"]));
        let backend = SoundCloudBackend::new(tool.clone());
        let options = DownloadOptions::new(OutputFormat::Wav, true, dir.path().to_path_buf());

        let outcome = run_fetch(&backend, "https://soundcloud.com/a/song", &options, PEEK, &CancellationToken::new()).await;

        assert!(outcome.is_success());
        assert!(!tool.last_request().embed_thumbnail);
        assert!(dir.path().join("Song.wav").exists());
        assert!(dir.path().join("Song.jpg").exists());
    }

    #[tokio::test]
    async fn test_native_collection_redirects_and_nests() {
        let dir = tempfile::tempdir().unwrap();
        let tool = Arc::new(FakeTool {
            collection: Some(CollectionInfo { title: "Night: Drive!".into() }),
            ..FakeTool::with_titles(&["One", "Two"])
        });
        let backend = SoundCloudBackend::new(tool.clone());

        let outcome = run_fetch(
            &backend,
            "https://soundcloud.com/a/sets/night-drive",
            &options(dir.path(), true),
            PEEK,
            &CancellationToken::new(),
        )
        .await;

        let folder = dir.path().join("Night Drive");
        assert!(outcome.is_playlist);
        assert_eq!(outcome.title.as_deref(), Some("Night: Drive!"));
        assert_eq!(outcome.children.len(), 2);
        assert_eq!(outcome.children[1].produced_file_paths, vec![folder.join("Two.flac")]);
        assert_eq!(tool.last_request().destination, folder);
        assert!(tool.last_request().allow_playlist);
    }

    #[tokio::test]
    async fn test_failed_peek_keeps_destination() {
        let dir = tempfile::tempdir().unwrap();
        let tool = Arc::new(FakeTool {
            probe_fails: true,
            ..FakeTool::with_titles(&["Song"])
        });
        let backend = SoundCloudBackend::new(tool.clone());

        let outcome = run_fetch(&backend, "https://soundcloud.com/a/b", &options(dir.path(), true), PEEK, &CancellationToken::new()).await;

        assert!(outcome.is_success());
        assert_eq!(tool.last_request().destination, dir.path());
    }

    #[tokio::test]
    async fn test_search_skips_peek_and_reports_no_results() {
        let dir = tempfile::tempdir().unwrap();
        let tool = Arc::new(FakeTool::default());
        let backend = SoundCloudBackend::new(tool.clone());

        let outcome = run_fetch(&backend, "scsearch1:nothing here", &options(dir.path(), true), PEEK, &CancellationToken::new()).await;

        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert_eq!(outcome.kind, Some(ErrorKind::NoResultsFound));
        assert!(tool.probes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let tool = Arc::new(FakeTool::with_titles(&["Song"]));
        let backend = SoundCloudBackend::new(tool.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = run_fetch(&backend, "https://soundcloud.com/a/b", &options(dir.path(), true), PEEK, &cancel).await;

        assert_eq!(outcome.status, OutcomeStatus::Cancelled);
        assert!(tool.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_cover_embeddable_formats() {
        assert!(cover_embeddable(OutputFormat::Flac));
        assert!(cover_embeddable(OutputFormat::M4a));
        assert!(!cover_embeddable(OutputFormat::Wav));
    }
}
