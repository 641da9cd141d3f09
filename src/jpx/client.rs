// src/jpx/client.rs
use crate::utils::error::FetchError;
use reqwest::header;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const JPX_BASE_URL: &str = "https://www.jpx.co.jp/";
pub const LISTING_URL: &str = "https://www.jpx.co.jp/listing/stocks/new/";

const JPX_USER_AGENT: &str = "jpx_ipo_extractor/0.1 (new listing research)";
// The listing service is a single public site. Keep a polite gap between requests.
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 500;
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Spaces out requests shared by every worker: each caller waits until at least
/// `delay` has passed since the previous caller was released.
pub struct Throttle {
    delay: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            next_slot: Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        let mut next_slot = self.next_slot.lock().await;
        if let Some(at) = *next_slot {
            tokio::time::sleep_until(at).await;
        }
        *next_slot = Some(Instant::now() + self.delay);
    }
}

/// HTTP access to the exchange site.
pub struct JpxClient {
    http: reqwest::Client,
    throttle: Throttle,
}

impl JpxClient {
    /// Creates a reqwest client configured for the exchange site.
    pub fn new(request_delay: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(JPX_USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            throttle: Throttle::new(request_delay),
        })
    }

    /// Downloads the listing page. The site serves UTF-8 but does not always say
    /// so, so the body is decoded as UTF-8 regardless of the declared charset.
    pub async fn fetch_listing_page(&self, url: &str) -> Result<String, FetchError> {
        let response = self.get(url, "text/html,application/xhtml+xml,*/*").await?;
        let body = response.bytes().await?;
        tracing::debug!("Downloaded listing page ({} bytes) from {}", body.len(), url);
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Downloads a PDF filing.
    pub async fn fetch_document(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.get(url, "application/pdf,*/*").await?;
        let body = response.bytes().await?;
        tracing::debug!("Downloaded {} bytes from {}", body.len(), url);
        Ok(body.to_vec())
    }

    async fn get(&self, url: &str, accept: &str) -> Result<reqwest::Response, FetchError> {
        let url = reqwest::Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;

        self.throttle.wait().await;
        tracing::info!("Downloading from: {}", url);

        let response = self
            .http
            .get(url.clone())
            .header(header::ACCEPT, accept)
            .send()
            .await?; // Propagates reqwest::Error as FetchError::Network

        let status = response.status();
        if !status.is_success() {
            tracing::error!("HTTP error status: {} for URL: {}", status, url);
            if status == reqwest::StatusCode::FORBIDDEN || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                tracing::warn!("Received {} - slow down with --request-delay-ms.", status);
                return Err(FetchError::RateLimited);
            }
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(FetchError::NotFound(url.to_string()));
            }
            return Err(FetchError::Http(status));
        }

        Ok(response)
    }
}
