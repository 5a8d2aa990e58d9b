use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::downloader::{BackendId, OutputFormat};
use crate::errors::{AppError, Result};

const APP_DIR: &str = "tunefetch";
const ENV_PREFIX: &str = "TUNEFETCH";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub download_path: PathBuf,
    pub preferred_format: OutputFormat,
    pub embed_cover: bool,
    pub max_concurrent_downloads: usize,
    pub backend_priority: Vec<BackendId>,
    pub search_primary: BackendId,
    pub search_secondary: BackendId,
    pub generic_backend: BackendId,
    pub ytdlp_path: String,
    pub ffmpeg_location: Option<PathBuf>,
    pub deemix_path: String,
    pub deezer_arl: Option<String>,
    pub proxy: Option<String>,
    pub http_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub peek_timeout_secs: u64,
    pub placeholder_image_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_path: dirs::download_dir()
                .map(|dir| dir.join(APP_DIR))
                .unwrap_or_else(|| PathBuf::from("./downloads")),
            preferred_format: OutputFormat::Flac,
            embed_cover: true,
            max_concurrent_downloads: 3,
            backend_priority: BackendId::ALL.to_vec(),
            search_primary: BackendId::SoundCloud,
            search_secondary: BackendId::VideoPlatform,
            generic_backend: BackendId::VideoPlatform,
            ytdlp_path: "yt-dlp".to_string(),
            ffmpeg_location: None,
            deemix_path: "deemix".to_string(),
            deezer_arl: None,
            proxy: None,
            http_timeout_secs: 15,
            fetch_timeout_secs: 900,
            peek_timeout_secs: 30,
            placeholder_image_url: "https://loremflickr.com/640/480".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads the persisted configuration, writing the defaults on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            let config = AppConfig::default();
            config.save_to(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    /// Layers the JSON file at `path` (if present) and `TUNEFETCH_*`
    /// environment variables over the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_layered(path, Self::environment())
    }

    /// `TUNEFETCH_PROXY` style names; `__` nests, lists are comma separated.
    fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("backend_priority")
    }

    fn load_layered(path: &Path, environment: config::Environment) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(environment)
            .build()?;

        let mut config: AppConfig = settings.try_deserialize()?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(config_dir) = config_path.parent() {
            if !config_dir.exists() {
                std::fs::create_dir_all(config_dir)?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AppError::Config(config::ConfigError::Message("Could not find config directory".to_string())))?;

        Ok(config_dir.join(APP_DIR))
    }

    pub fn get_config_path() -> Result<PathBuf> {
        Ok(Self::get_config_dir()?.join("config.json"))
    }

    /// Removes duplicate priorities and appends any backend the list left
    /// out, so every backend stays reachable.
    fn normalize(&mut self) {
        let mut priority: Vec<BackendId> = Vec::with_capacity(BackendId::ALL.len());
        for id in self.backend_priority.iter().chain(BackendId::ALL.iter()) {
            if !priority.contains(id) {
                priority.push(*id);
            }
        }
        self.backend_priority = priority;

        if self.max_concurrent_downloads == 0 {
            self.max_concurrent_downloads = 1;
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn peek_timeout(&self) -> Duration {
        Duration::from_secs(self.peek_timeout_secs)
    }
}
