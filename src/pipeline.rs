// src/pipeline.rs
//! One crawl: listing page -> seen-set selection -> document enrichment.
//!
//! Enrichment runs on a bounded pool of tasks. Every request goes through the
//! client's shared throttle, and each record's enrichment runs under a timeout;
//! a record that times out keeps its base fields and empty enrichment.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::extractors::shareholders::DEFAULT_MAX_CONTINUATION_PAGES;
use crate::extractors::{Extraction, OutlineClassifier, ShareholderStitcher};
use crate::jpx::client::{DEFAULT_REQUEST_DELAY_MS, JPX_BASE_URL, LISTING_URL};
use crate::jpx::{listing, IssueRecord, JpxClient};
use crate::storage::SeenSet;
use crate::utils::error::{AppError, ExtractError};

/// Runtime settings for a crawl.
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub listing_url: String,
    pub base_url: String,
    /// Skip issues already in the seen-set (and remember new ones).
    pub incremental: bool,
    pub concurrency: usize,
    pub request_delay: Duration,
    pub record_timeout: Duration,
    pub max_continuation_pages: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            listing_url: LISTING_URL.to_string(),
            base_url: JPX_BASE_URL.to_string(),
            incremental: true,
            concurrency: 4,
            request_delay: Duration::from_millis(DEFAULT_REQUEST_DELAY_MS),
            record_timeout: Duration::from_secs(300),
            max_continuation_pages: DEFAULT_MAX_CONTINUATION_PAGES,
        }
    }
}

/// What a run produced.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Issues found on the listing page, before selection.
    pub listed: usize,
    /// Selected records in listing order, enriched.
    pub records: Vec<IssueRecord>,
    pub degraded_documents: usize,
    pub timed_out: usize,
}

/// A record after enrichment, with how many of its documents degraded.
#[derive(Debug)]
struct Enriched {
    record: IssueRecord,
    degraded: usize,
    timed_out: bool,
}

pub struct Crawler {
    client: Arc<JpxClient>,
    config: CrawlerConfig,
}

impl Crawler {
    pub fn new(config: CrawlerConfig) -> Result<Self, AppError> {
        let client = JpxClient::new(config.request_delay)?;
        Ok(Self {
            client: Arc::new(client),
            config,
        })
    }

    /// Fetches the listing, selects records against `seen`, and enriches them.
    /// Only a listing-page failure is an error; document failures degrade.
    pub async fn run(&self, seen: &mut SeenSet) -> Result<RunReport, AppError> {
        let base = Url::parse(&self.config.base_url)
            .map_err(|e| AppError::Config(format!("Invalid base URL '{}': {}", self.config.base_url, e)))?;

        let html = self.client.fetch_listing_page(&self.config.listing_url).await?;
        let listed = listing::parse_listing(&html, &base)?;
        let listed_count = listed.len();

        let selected = seen.select(listed, self.config.incremental);
        let enriched = self.enrich_all(selected).await;

        let mut report = RunReport {
            listed: listed_count,
            ..Default::default()
        };
        for item in enriched {
            report.degraded_documents += item.degraded;
            report.timed_out += usize::from(item.timed_out);
            report.records.push(item.record);
        }
        Ok(report)
    }

    async fn enrich_all(&self, records: Vec<IssueRecord>) -> Vec<Enriched> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (index, record) in records.iter().cloned().enumerate() {
            let semaphore = semaphore.clone();
            let client = self.client.clone();
            let timeout = self.config.record_timeout;
            let max_pages = self.config.max_continuation_pages;

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let name = record.issue_name.clone();
                let fallback = record.clone();
                match tokio::time::timeout(timeout, enrich_record(&client, record, max_pages)).await {
                    Ok(enriched) => (index, enriched),
                    Err(_) => {
                        tracing::warn!("Enrichment of '{}' timed out after {:?}; keeping base fields", name, timeout);
                        (index, Enriched { record: fallback, degraded: 0, timed_out: true })
                    }
                }
            });
        }

        let mut slots: Vec<Option<Enriched>> = records.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, enriched)) => slots[index] = Some(enriched),
                Err(e) => tracing::error!("Enrichment task failed: {}", e),
            }
        }

        // A task that panicked still leaves its base record in the output.
        slots
            .into_iter()
            .zip(records)
            .map(|(slot, record)| {
                slot.unwrap_or(Enriched {
                    record,
                    degraded: 0,
                    timed_out: false,
                })
            })
            .collect()
    }
}

async fn enrich_record(client: &JpxClient, mut record: IssueRecord, max_pages: usize) -> Enriched {
    let mut degraded = 0;

    if let Some(url) = record.outline_pdf_url.clone() {
        let outcome = extract_document(client, &url, |bytes| OutlineClassifier::new().classify_pdf(bytes)).await;
        degraded += usize::from(log_outcome(&record.issue_name, "outline", &outcome));
        record.outline = outcome.into_value();
    }

    if let Some(url) = record.prospectus_pdf_url.clone() {
        let outcome = extract_document(client, &url, move |bytes| {
            ShareholderStitcher::new(max_pages).stitch_pdf(bytes)
        })
        .await;
        degraded += usize::from(log_outcome(&record.issue_name, "prospectus", &outcome));
        record.shareholders = outcome.into_value();
    }

    Enriched {
        record,
        degraded,
        timed_out: false,
    }
}

/// Downloads `url` and runs `extract` on a blocking thread. Fetch and join
/// failures degrade to `T::default()`.
async fn extract_document<T, F>(client: &JpxClient, url: &str, extract: F) -> Extraction<T>
where
    T: Default + Send + 'static,
    F: FnOnce(&[u8]) -> Extraction<T> + Send + 'static,
{
    let bytes = match client.fetch_document(url).await {
        Ok(bytes) => bytes,
        Err(e) => return Extraction::degraded(T::default(), ExtractError::Unavailable(e.to_string())),
    };

    match tokio::task::spawn_blocking(move || extract(&bytes)).await {
        Ok(outcome) => outcome,
        Err(e) => Extraction::degraded(T::default(), ExtractError::Pdf(e.to_string())),
    }
}

/// Logs a document outcome; returns true when it degraded.
fn log_outcome<T>(issue: &str, kind: &str, outcome: &Extraction<T>) -> bool {
    match outcome.error() {
        None => {
            tracing::info!(issue, kind, "Document extracted");
            false
        }
        Some(e) => {
            tracing::warn!(issue, kind, "Document degraded: {}", e);
            true
        }
    }
}
