// src/jpx/models.rs
use serde::Serialize;

use crate::extractors::normalize::Numeric;
use crate::extractors::{OutlineSummary, ShareholderList};

/// One new-listing entry from the exchange page, plus whatever the attached
/// filings yielded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IssueRecord {
    pub date_of_listing: String,
    pub issue_name: String, // identity key for the seen-set
    pub code: String,
    pub outline_pdf_url: Option<String>,
    pub market_segment: String,
    pub prospectus_pdf_url: Option<String>,
    pub share_price: Numeric,
    #[serde(flatten)]
    pub outline: OutlineSummary,
    #[serde(flatten)]
    pub shareholders: ShareholderList,
}

impl IssueRecord {
    /// Whether the exchange has published enough for this record to be final:
    /// a name and a share price. Records failing this are retried next run.
    pub fn is_finalized(&self) -> bool {
        !self.issue_name.trim().is_empty() && !self.share_price.is_missing()
    }
}
