// src/utils/error.rs
use thiserror::Error;

// Define specific error types for different parts of the application
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error), // Automatically convert reqwest errors

    #[error("HTTP error: {0}")]
    Http(reqwest::StatusCode), // e.g., 500 Internal Server Error

    #[error("Request refused by the exchange site (rate limit or blocked User-Agent)")]
    RateLimited,

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Invalid URL '{0}'")]
    InvalidUrl(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("PDF could not be read: {0}")]
    Pdf(String),

    #[error("Page {0} is out of range")]
    PageOutOfRange(usize),

    #[error("Ownership section heading not found in any page")]
    HeadingNotFound,

    #[error("Expected table header marker missing on page {page}")]
    HeaderMismatch { page: usize },

    #[error("Ownership table not closed after {pages} page(s)")]
    Unterminated { pages: usize },

    #[error("Document fetch failed: {0}")]
    Unavailable(String),

    #[error("HTML parsing error: {0}")]
    HtmlParseError(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("Listing fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
