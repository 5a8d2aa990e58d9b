//! Turns music links and free-text searches into audio files on disk.
//!
//! A query is classified (metadata-only service link, backend link, search
//! directive or free text), expanded when it names a playlist, and handed
//! to the first backend able to fetch it, with a fixed fallback chain for
//! free text. [`api::Session`] is the request surface.

pub mod api;
pub mod config;
pub mod downloader;
pub mod errors;
pub mod metadata;
pub mod search;
pub mod security;
pub mod utils;


pub use api::{Session, SubmitRequest};
pub use config::AppConfig;
pub use downloader::manager::{DispatcherSettings, ResolutionDispatcher};
pub use downloader::{BackendId, DownloadOptions, DownloadOutcome, OutcomeStatus, OutputFormat};
pub use errors::{AppError, ErrorKind, Result};
