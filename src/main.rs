// src/main.rs
mod extractors;
mod jpx;
mod pdf;
mod pipeline;
mod storage;
mod utils;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use extractors::shareholders::DEFAULT_MAX_CONTINUATION_PAGES;
use jpx::client::{DEFAULT_REQUEST_DELAY_MS, JPX_BASE_URL, LISTING_URL};
use pipeline::{Crawler, CrawlerConfig, RunReport};
use storage::SeenSet;
use utils::AppError;

/// Command Line Interface for the JPX new-listing crawler
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON file holding issue names processed by earlier runs
    #[arg(long, default_value = "searched_ipo.json")]
    seen_file: PathBuf,

    /// CSV file to write the records to
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Do not write CSV output
    #[arg(long)]
    no_csv: bool,

    /// Also write records and run counters as JSON
    #[arg(long)]
    json_output: Option<PathBuf>,

    /// Output every listed issue instead of only ones not seen before
    #[arg(long)]
    all: bool,

    /// Documents fetched and parsed in parallel
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Minimum gap between requests to the exchange site, in milliseconds
    #[arg(long, default_value_t = DEFAULT_REQUEST_DELAY_MS)]
    request_delay_ms: u64,

    /// Give up on a record's documents after this many seconds
    #[arg(long, default_value_t = 300)]
    record_timeout_secs: u64,

    /// Pages past the first to follow a shareholder table across
    #[arg(long, default_value_t = DEFAULT_MAX_CONTINUATION_PAGES)]
    max_continuation_pages: usize,

    /// Listing page URL
    #[arg(long, default_value = LISTING_URL)]
    listing_url: String,

    /// Debug logging (RUST_LOG still wins when set)
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn crawler_config(&self) -> CrawlerConfig {
        CrawlerConfig {
            listing_url: self.listing_url.clone(),
            base_url: JPX_BASE_URL.to_string(),
            incremental: !self.all,
            concurrency: self.concurrency,
            request_delay: Duration::from_millis(self.request_delay_ms),
            record_timeout: Duration::from_secs(self.record_timeout_secs),
            max_continuation_pages: self.max_continuation_pages,
        }
    }

    /// The CSV destination, or `None` when CSV output is switched off.
    fn csv_destination(&self) -> Result<Option<&PathBuf>, AppError> {
        if self.no_csv {
            return Ok(None);
        }
        self.output
            .as_ref()
            .map(Some)
            .ok_or_else(|| AppError::Config("Please provide a CSV filename with --output (or pass --no-csv)".to_string()))
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Parse CLI Arguments
    let args = Args::parse();

    // 2. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging(args.verbose);
    tracing::info!("Starting processing for args: {:?}", args);

    // 3. Output destination must be known before anything is fetched
    let csv_path = args.csv_destination()?;

    // 4. Load the seen-set in every mode so saving never drops history
    let mut seen = SeenSet::load(&args.seen_file)?;

    // 5. Crawl
    let crawler = Crawler::new(args.crawler_config())?;
    let report = crawler.run(&mut seen).await?;

    tracing::info!(
        "Processing finished. Listed: {}, processed: {}, degraded documents: {}, timed out: {}",
        report.listed,
        report.records.len(),
        report.degraded_documents,
        report.timed_out
    );

    // 6. Persist
    persist(&args, csv_path, &seen, &report)
}

/// Writes the run's outputs, then the seen-set. An issue only becomes seen
/// once its record has been written.
fn persist(args: &Args, csv_path: Option<&PathBuf>, seen: &SeenSet, report: &RunReport) -> Result<(), AppError> {
    if let Some(path) = csv_path {
        storage::save_records_csv(path, &report.records)?;
    }
    if let Some(path) = &args.json_output {
        storage::save_run_summary(path, report)?;
    }
    seen.save(&args.seen_file)?;
    Ok(())
}
