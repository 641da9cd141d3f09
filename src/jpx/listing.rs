// src/jpx/listing.rs
//! Parses the new-listing table on the exchange's listing page.
//!
//! Each issue occupies two consecutive `<tr>` rows:
//! - row 0: date / issue name / code / outline PDF link
//! - row 1: market segment / prospectus PDF link / (unused) / share price

use once_cell::sync::Lazy;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use super::models::IssueRecord;
use crate::extractors::normalize::parse_numeric;
use crate::utils::error::ExtractError;

// --- CSS Selectors (Lazy Static) ---
static LISTING_TABLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.component-normal-table").expect("Failed to compile LISTING_TABLE_SELECTOR")
});

static BODY_ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tbody tr").expect("Failed to compile BODY_ROW_SELECTOR"));

static CELL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td").expect("Failed to compile CELL_SELECTOR"));

static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("Failed to compile LINK_SELECTOR"));

/// Builds base records (no enrichment yet) from the listing page HTML.
/// Relative PDF links are resolved against `base`.
pub fn parse_listing(html: &str, base: &Url) -> Result<Vec<IssueRecord>, ExtractError> {
    let document = Html::parse_document(html);

    let table = document
        .select(&LISTING_TABLE_SELECTOR)
        .next()
        .ok_or_else(|| ExtractError::HtmlParseError("new-listing table not found".to_string()))?;

    let rows: Vec<ElementRef> = table.select(&BODY_ROW_SELECTOR).collect();
    if rows.len() % 2 != 0 {
        tracing::warn!("Listing table has an unpaired trailing row; ignoring it");
    }

    let records: Vec<IssueRecord> = rows
        .chunks_exact(2)
        .map(|pair| build_record(pair[0], pair[1], base))
        .collect();

    tracing::info!("Parsed {} issue(s) from listing page", records.len());
    Ok(records)
}

fn build_record(first: ElementRef, second: ElementRef, base: &Url) -> IssueRecord {
    let first: Vec<ElementRef> = first.select(&CELL_SELECTOR).collect();
    let second: Vec<ElementRef> = second.select(&CELL_SELECTOR).collect();

    IssueRecord {
        date_of_listing: listing_date(&cell_text(&first, 0)),
        issue_name: cell_text(&first, 1).trim().to_string(),
        code: cell_text(&first, 2).trim().to_string(),
        outline_pdf_url: cell_link(&first, 3, base),
        market_segment: cell_text(&second, 0).trim().to_string(),
        prospectus_pdf_url: cell_link(&second, 1, base),
        share_price: parse_numeric(cell_text(&second, 3).trim()),
        ..Default::default()
    }
}

fn cell_text(cells: &[ElementRef], index: usize) -> String {
    cells
        .get(index)
        .map(|cell| cell.text().collect::<String>())
        .unwrap_or_default()
}

/// "2024年1月1日（予定）" -> "2024年1月1日"
fn listing_date(raw: &str) -> String {
    let end = raw.find(['（', '(']).unwrap_or(raw.len());
    raw[..end].trim().to_string()
}

fn cell_link(cells: &[ElementRef], index: usize, base: &Url) -> Option<String> {
    let href = cells
        .get(index)?
        .select(&LINK_SELECTOR)
        .next()?
        .value()
        .attr("href")?
        .trim();
    if href.is_empty() {
        return None;
    }

    match base.join(href) {
        Ok(url) => Some(url.to_string()),
        Err(e) => {
            tracing::warn!("Skipping unresolvable link '{}': {}", href, e);
            None
        }
    }
}
