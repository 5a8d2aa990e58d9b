use std::time::Duration;
use reqwest::{Client, ClientBuilder, Proxy};
use crate::errors::{AppError, Result};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Shared HTTP client for metadata pages and placeholder images
pub struct HttpPool {
    client: Client,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

/// Body of a successful binary fetch.
#[derive(Debug, Clone)]
pub struct FetchedBytes {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

impl HttpPool {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Self::builder(timeout).build()?;

        Ok(Self {
            client,
            timeout,
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
        })
    }

    pub fn with_proxy(mut self, proxy_url: &str) -> Result<Self> {
        let proxy = Proxy::all(proxy_url)?;
        self.client = Self::builder(self.timeout).proxy(proxy).build()?;
        Ok(self)
    }

    pub fn with_retry_policy(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay = retry_delay;
        self
    }

    fn builder(timeout: Duration) -> ClientBuilder {
        ClientBuilder::new()
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(15))
            .user_agent(USER_AGENT)
            .gzip(true)
            .brotli(true)
            .tcp_keepalive(Duration::from_secs(60))
    }

    /// Fetches a page body as text. Non-2xx statuses are errors.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    /// Fetches a binary body, retrying transient failures.
    pub async fn get_bytes(&self, url: &str) -> Result<FetchedBytes> {
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            log::info!("🌐 [HTTP] Attempt {} of {} for URL: {}", attempt, self.max_retries, url);

            match self.try_get_bytes(url).await {
                Ok(fetched) => return Ok(fetched),
                Err(e) => {
                    log::warn!("⚠️ [HTTP] Attempt {} failed: {}", attempt, e);
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        log::error!("❌ [HTTP] All {} attempts failed", self.max_retries);
        Err(last_error.unwrap_or_else(|| AppError::BackendFetch(format!("No attempt made for {}", url))))
    }

    async fn try_get_bytes(&self, url: &str) -> Result<FetchedBytes> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(AppError::BackendFetch(format!("HTTP error: {}", response.status())));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let data = response.bytes().await?.to_vec();

        Ok(FetchedBytes { data, content_type })
    }
}
