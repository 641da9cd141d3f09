// src/storage/mod.rs
pub mod seen;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::jpx::IssueRecord;
use crate::pipeline::RunReport;
use crate::utils::error::StorageError;

pub use seen::SeenSet;

/// Output column order.
pub const CSV_COLUMNS: [&str; 15] = [
    "date of listing",
    "issue name",
    "code",
    "outline pdf url",
    "market segment",
    "prospectus pdf url",
    "share price",
    "issue_name (English name)",
    "No. of Issued Shares",
    "No. of Issued Shares (incl. treasury shares)",
    "Managing Trading Participant",
    "Public Offering/Secondary Offering",
    "Public Offering / Secondary Offering - (Placement Underwritten and Purchased by Principal Underwriting Participants)",
    "Original Share Offers",
    "Shareholders – Holding stake",
];

// Spreadsheet tools need the BOM to pick UTF-8 for the Japanese columns.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// One CSV line. List fields are written as JSON arrays.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    date_of_listing: &'a str,
    issue_name: &'a str,
    code: &'a str,
    outline_pdf_url: &'a str,
    market_segment: &'a str,
    prospectus_pdf_url: &'a str,
    share_price: String,
    english_name: &'a str,
    issued_shares: &'a str,
    issued_shares_incl_treasury: &'a str,
    managing_participant: &'a str,
    public_offerings: String,
    underwriter_offering: &'a str,
    offer_sources: String,
    shareholders: String,
}

impl<'a> CsvRow<'a> {
    fn from_record(record: &'a IssueRecord) -> Result<Self, StorageError> {
        Ok(Self {
            date_of_listing: &record.date_of_listing,
            issue_name: &record.issue_name,
            code: &record.code,
            outline_pdf_url: record.outline_pdf_url.as_deref().unwrap_or(""),
            market_segment: &record.market_segment,
            prospectus_pdf_url: record.prospectus_pdf_url.as_deref().unwrap_or(""),
            share_price: record.share_price.to_string(),
            english_name: &record.outline.english_name,
            issued_shares: &record.outline.issued_shares,
            issued_shares_incl_treasury: &record.outline.issued_shares_incl_treasury,
            managing_participant: &record.outline.managing_participant,
            public_offerings: list_cell(&record.outline.public_offerings)?,
            underwriter_offering: &record.outline.underwriter_offering,
            offer_sources: list_cell(&record.outline.offer_sources)?,
            shareholders: list_cell(&record.shareholders.holdings)?,
        })
    }
}

fn list_cell(items: &[String]) -> Result<String, StorageError> {
    serde_json::to_string(items).map_err(|e| StorageError::SerializationError(e.to_string()))
}

/// Writes the header and one row per record to any writer.
pub fn write_records_csv<W: Write>(writer: W, records: &[IssueRecord]) -> Result<(), StorageError> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    writer.write_record(CSV_COLUMNS)?;
    for record in records {
        writer.serialize(CsvRow::from_record(record)?)?;
    }
    writer.flush()?;
    Ok(())
}

/// Saves the records as a UTF-8 (with BOM) CSV file, creating parent directories.
pub fn save_records_csv(path: &Path, records: &[IssueRecord]) -> Result<PathBuf, StorageError> {
    ensure_parent(path)?;
    let mut file = fs::File::create(path)?;
    file.write_all(UTF8_BOM)?;
    write_records_csv(file, records)?;

    tracing::info!("Saved {} record(s) to {}", records.len(), path.display());
    Ok(path.to_path_buf())
}

/// Saves the run's records and counters as pretty JSON.
pub fn save_run_summary(path: &Path, report: &RunReport) -> Result<PathBuf, StorageError> {
    ensure_parent(path)?;

    let summary = serde_json::json!({
        "extraction_timestamp": chrono::Utc::now().to_rfc3339(),
        "listed": report.listed,
        "selected": report.records.len(),
        "degraded_documents": report.degraded_documents,
        "timed_out": report.timed_out,
        "records": report.records,
    });

    let summary_str = serde_json::to_string_pretty(&summary)
        .map_err(|e| StorageError::SerializationError(e.to_string()))?;
    fs::write(path, summary_str)?;

    tracing::info!("Saved run summary to {}", path.display());
    Ok(path.to_path_buf())
}

fn ensure_parent(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::normalize::Numeric;
    use crate::extractors::{OutlineSummary, ShareholderList};

    fn sample_record() -> IssueRecord {
        IssueRecord {
            date_of_listing: "2024年1月1日".to_string(),
            issue_name: "ExampleCo".to_string(),
            code: "1234".to_string(),
            outline_pdf_url: Some("https://www.jpx.co.jp/a.pdf".to_string()),
            market_segment: "グロース".to_string(),
            prospectus_pdf_url: None,
            share_price: Numeric::Number(1200.0),
            outline: OutlineSummary {
                english_name: "Example Co.".to_string(),
                offer_sources: vec!["A".to_string(), "B".to_string()],
                ..Default::default()
            },
            shareholders: ShareholderList {
                holdings: vec!["X 1,000".to_string()],
            },
        }
    }

    #[test]
    fn test_csv_has_fixed_header_and_row() {
        let mut buffer = Vec::new();
        write_records_csv(&mut buffer, &[sample_record()]).unwrap();

        let mut reader = csv::ReaderBuilder::new().from_reader(buffer.as_slice());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), CSV_COLUMNS.to_vec());

        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(&row[0], "2024年1月1日");
        assert_eq!(&row[5], "");
        assert_eq!(&row[6], "1200");
        assert_eq!(&row[7], "Example Co.");
        assert_eq!(&row[11], "[]");
        assert_eq!(&row[13], r#"["A","B"]"#);
        assert_eq!(&row[14], r#"["X 1,000"]"#);
    }

    #[test]
    fn test_empty_run_still_writes_header() {
        let mut buffer = Vec::new();
        write_records_csv(&mut buffer, &[]).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("date of listing,issue name"));
    }

    #[test]
    fn test_saved_csv_starts_with_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("ipo.csv");
        save_records_csv(&path, &[sample_record()]).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
    }

    #[test]
    fn test_run_summary_lists_flattened_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let report = RunReport {
            listed: 3,
            records: vec![sample_record()],
            degraded_documents: 1,
            timed_out: 0,
        };
        save_run_summary(&path, &report).unwrap();

        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["listed"], 3);
        assert_eq!(json["selected"], 1);
        assert_eq!(json["records"][0]["english_name"], "Example Co.");
        assert_eq!(json["records"][0]["holdings"][0], "X 1,000");
        assert_eq!(json["records"][0]["share_price"], 1200.0);
    }
}
