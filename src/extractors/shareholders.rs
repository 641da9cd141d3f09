// src/extractors/shareholders.rs
//! Major-shareholder table ("大株主の状況") extraction from a prospectus.
//!
//! The table starts on the first page whose text carries the section heading
//! and may run over several following pages. The anchor page always ends in a
//! total row ("計"). Continuation pages sometimes stop without one, so there a
//! row reporting 100% ownership also ends the table.
//!
//! The 100% rule is a heuristic about how the exchange's filings are laid out,
//! not something the format guarantees.

use serde::Serialize;

use super::normalize::normalize;
use super::Extraction;
use crate::pdf::{LopdfDocument, PdfDocument, TableGrid};
use crate::utils::error::ExtractError;

// --- Constants ---
const OWNERSHIP_HEADING: &str = "大株主の状況";
const NAME_COLUMN_MARKER: &str = "氏名又は名称";
const TOTAL_MARKER: &str = "計";
const FULL_OWNERSHIP_MARKER: &str = "100";

const NAME_COL: usize = 0;
const AMOUNT_COL: usize = 2;
const PERCENT_COL: usize = 3;

/// Continuation pages read past the anchor page before giving up.
pub const DEFAULT_MAX_CONTINUATION_PAGES: usize = 10;

/// Ownership rows as `"{name} {amount}"`, in table order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ShareholderList {
    pub holdings: Vec<String>,
}

/// Row predicate that ends the table.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Terminator {
    /// Anchor page: only an explicit total row.
    TotalRow,
    /// Continuation pages: a total row, or a row at 100% ownership.
    TotalOrFullOwnership,
}

impl Terminator {
    fn ends_table(self, row: &[String]) -> bool {
        let cell = |i: usize| row.get(i).map(String::as_str).unwrap_or("");
        let total = cell(NAME_COL).contains(TOTAL_MARKER);
        match self {
            Terminator::TotalRow => total,
            Terminator::TotalOrFullOwnership => total || cell(PERCENT_COL).contains(FULL_OWNERSHIP_MARKER),
        }
    }
}

#[derive(Debug, PartialEq)]
enum PageScan {
    Closed,
    Open,
}

pub struct ShareholderStitcher {
    max_continuation_pages: usize,
}

impl Default for ShareholderStitcher {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONTINUATION_PAGES)
    }
}

impl ShareholderStitcher {
    pub fn new(max_continuation_pages: usize) -> Self {
        Self { max_continuation_pages }
    }

    /// Loads a prospectus from memory and stitches its ownership table.
    pub fn stitch_pdf(&self, bytes: &[u8]) -> Extraction<ShareholderList> {
        match LopdfDocument::load(bytes) {
            Ok(document) => self.stitch(&document),
            Err(e) => {
                tracing::warn!("Prospectus PDF could not be loaded: {}", e);
                Extraction::degraded(ShareholderList::default(), e)
            }
        }
    }

    /// Finds the ownership table and follows it across pages.
    ///
    /// Hard failures (missing heading, missing header row, unreadable page)
    /// yield an empty list. Running out of pages, or hitting the page ceiling,
    /// keeps the rows read so far and reports [`ExtractError::Unterminated`].
    pub fn stitch(&self, document: &dyn PdfDocument) -> Extraction<ShareholderList> {
        let Some(anchor) = locate_anchor(document) else {
            tracing::debug!("No page mentions '{}'", OWNERSHIP_HEADING);
            return Extraction::degraded(ShareholderList::default(), ExtractError::HeadingNotFound);
        };
        tracing::debug!("Ownership section anchored on page {}", anchor + 1);

        let mut holdings = Vec::new();
        let mut pages_read = 0;

        // Anchor page plus at most `max_continuation_pages` more, read lazily.
        let pages = (anchor..document.page_count()).take(self.max_continuation_pages + 1);
        for (offset, page) in pages.enumerate() {
            let terminator = if offset == 0 {
                Terminator::TotalRow
            } else {
                Terminator::TotalOrFullOwnership
            };

            let grid = match ownership_table(document, page) {
                Ok(grid) => grid,
                Err(e) => {
                    tracing::warn!("Abandoning ownership table at page {}: {}", page + 1, e);
                    return Extraction::degraded(ShareholderList::default(), e);
                }
            };

            pages_read += 1;
            if scan_rows(&grid, terminator, &mut holdings) == PageScan::Closed {
                tracing::debug!(
                    rows = holdings.len(),
                    pages = pages_read,
                    "Ownership table closed on page {}",
                    page + 1
                );
                return Extraction::Complete(ShareholderList { holdings });
            }
        }

        tracing::warn!(
            rows = holdings.len(),
            "Ownership table still open after {} page(s)",
            pages_read
        );
        Extraction::degraded(
            ShareholderList { holdings },
            ExtractError::Unterminated { pages: pages_read },
        )
    }
}

/// First page whose text contains the section heading. Pages whose text cannot
/// be extracted are skipped.
fn locate_anchor(document: &dyn PdfDocument) -> Option<usize> {
    (0..document.page_count()).find(|&page| match document.page_text(page) {
        Ok(text) => text.contains(OWNERSHIP_HEADING),
        Err(e) => {
            tracing::debug!("Skipping page {} while locating heading: {}", page + 1, e);
            false
        }
    })
}

/// The first table on `page` whose header row carries the name column marker.
fn ownership_table(document: &dyn PdfDocument, page: usize) -> Result<TableGrid, ExtractError> {
    document
        .page_tables(page)?
        .into_iter()
        .find(has_name_column)
        .ok_or(ExtractError::HeaderMismatch { page: page + 1 })
}

fn has_name_column(grid: &TableGrid) -> bool {
    grid.row(0)
        .map(|header| header.iter().any(|cell| normalize(cell).contains(NAME_COLUMN_MARKER)))
        .unwrap_or(false)
}

/// Appends the data rows of `grid` until `terminator` fires.
fn scan_rows(grid: &TableGrid, terminator: Terminator, holdings: &mut Vec<String>) -> PageScan {
    for row in grid.rows().skip(1) {
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        if terminator.ends_table(row) {
            return PageScan::Closed;
        }

        let name = row.get(NAME_COL).map(String::as_str).unwrap_or("");
        let amount = row.get(AMOUNT_COL).map(String::as_str).unwrap_or("");
        holdings.push(format!("{} {}", join_lines(name), amount.trim()));
    }
    PageScan::Open
}

fn join_lines(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '\n' | '\r' | '\u{2028}'))
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::testing::{pdf_bytes, FakeDocument, Placed};

    const HEADER: [&str; 4] = ["氏名又は名称", "住所", "所有株式数(株)", "発行済株式総数に対する所有株式数の割合(%)"];

    fn table(rows: &[[&str; 4]]) -> TableGrid {
        let mut all = vec![HEADER.to_vec()];
        all.extend(rows.iter().map(|r| r.to_vec()));
        TableGrid::from_rows(all)
    }

    fn caption() -> TableGrid {
        TableGrid::from_rows([vec!["(4) 大株主の状況"]])
    }

    #[test]
    fn test_anchor_page_closes_on_total_row() {
        let document = FakeDocument::new()
            .page("目次", vec![])
            .page(
                "(4) 大株主の状況",
                vec![caption(), table(&[["X", "東京都", "1,000", "10"], ["計", "", "10,000", "100"]])],
            )
            .page("", vec![table(&[["Y", "大阪府", "500", "5"]])]);

        let outcome = ShareholderStitcher::default().stitch(&document);
        assert!(outcome.is_complete());
        assert_eq!(outcome.into_value().holdings, vec!["X 1,000"]);
    }

    #[test]
    fn test_full_ownership_row_does_not_end_anchor_page() {
        let document = FakeDocument::new().page(
            "大株主の状況",
            vec![table(&[
                ["親会社", "東京都", "9,000", "100"],
                ["計", "", "9,000", "100"],
            ])],
        );

        let outcome = ShareholderStitcher::default().stitch(&document);
        assert_eq!(outcome.into_value().holdings, vec!["親会社 9,000"]);
    }

    #[test]
    fn test_continuation_page_ends_at_full_ownership_row() {
        let document = FakeDocument::new()
            .page(
                "大株主の状況",
                vec![table(&[["A", "東京都", "300", "30"], ["B", "東京都", "200", "20"]])],
            )
            .page(
                "",
                vec![table(&[
                    ["C", "大阪府", "100", "10"],
                    ["", "", "600", "100.00"],
                    ["D", "大阪府", "50", "5"],
                ])],
            );

        let outcome = ShareholderStitcher::default().stitch(&document);
        assert!(outcome.is_complete());
        assert_eq!(outcome.into_value().holdings, vec!["A 300", "B 200", "C 100"]);
    }

    #[test]
    fn test_continuation_spans_several_pages() {
        let document = FakeDocument::new()
            .page("大株主の状況", vec![table(&[["A", "", "1", "1"]])])
            .page("", vec![table(&[["B", "", "2", "2"]])])
            .page("", vec![table(&[["C", "", "3", "3"], ["計", "", "6", "6"]])]);

        let outcome = ShareholderStitcher::default().stitch(&document);
        assert!(outcome.is_complete());
        assert_eq!(outcome.into_value().holdings, vec!["A 1", "B 2", "C 3"]);
    }

    #[test]
    fn test_page_ceiling_keeps_rows_and_flags_unterminated() {
        let document = FakeDocument::new()
            .page("大株主の状況", vec![table(&[["A", "", "1", "1"]])])
            .page("", vec![table(&[["B", "", "2", "2"]])])
            .page("", vec![table(&[["計", "", "3", "3"]])]);

        let outcome = ShareholderStitcher::new(1).stitch(&document);
        assert_eq!(outcome.error(), Some(&ExtractError::Unterminated { pages: 2 }));
        assert_eq!(outcome.into_value().holdings, vec!["A 1", "B 2"]);
    }

    #[test]
    fn test_document_ending_mid_table_is_unterminated() {
        let document = FakeDocument::new().page("大株主の状況", vec![table(&[["A", "", "1", "1"]])]);

        let outcome = ShareholderStitcher::default().stitch(&document);
        assert_eq!(outcome.error(), Some(&ExtractError::Unterminated { pages: 1 }));
        assert_eq!(outcome.into_value().holdings, vec!["A 1"]);
    }

    #[test]
    fn test_missing_heading_yields_empty_list() {
        let document = FakeDocument::new().page("事業の内容", vec![table(&[["A", "", "1", "1"]])]);

        let outcome = ShareholderStitcher::default().stitch(&document);
        assert_eq!(outcome.error(), Some(&ExtractError::HeadingNotFound));
        assert!(outcome.into_value().holdings.is_empty());
    }

    #[test]
    fn test_anchor_without_header_marker_is_abandoned() {
        let wrong = TableGrid::from_rows([vec!["項目", "内容"], vec!["A", "B"]]);
        let document = FakeDocument::new().page("大株主の状況", vec![caption(), wrong]);

        let outcome = ShareholderStitcher::default().stitch(&document);
        assert_eq!(outcome.error(), Some(&ExtractError::HeaderMismatch { page: 1 }));
        assert!(outcome.into_value().holdings.is_empty());
    }

    #[test]
    fn test_continuation_without_header_marker_is_abandoned() {
        let document = FakeDocument::new()
            .page("大株主の状況", vec![table(&[["A", "", "1", "1"]])])
            .page("", vec![TableGrid::from_rows([vec!["B", "", "2", "2"]])]);

        let outcome = ShareholderStitcher::default().stitch(&document);
        assert_eq!(outcome.error(), Some(&ExtractError::HeaderMismatch { page: 2 }));
        assert!(outcome.into_value().holdings.is_empty());
    }

    #[test]
    fn test_unreadable_pages_are_skipped_while_locating() {
        let document = FakeDocument::new()
            .broken_page()
            .page("大株主の状況", vec![table(&[["A", "", "1", "1"], ["計", "", "1", "1"]])]);

        let outcome = ShareholderStitcher::default().stitch(&document);
        assert!(outcome.is_complete());
        assert_eq!(outcome.into_value().holdings, vec!["A 1"]);
    }

    #[test]
    fn test_names_lose_line_breaks() {
        let document = FakeDocument::new().page(
            "大株主の状況",
            vec![table(&[["株式会社\nサンプル", "", "500", "50"], ["計", "", "500", "50"]])],
        );

        let outcome = ShareholderStitcher::default().stitch(&document);
        assert_eq!(outcome.into_value().holdings, vec!["株式会社サンプル 500"]);
    }

    #[test]
    fn test_stitch_pdf_follows_a_generated_prospectus() {
        let header = |y: f32| {
            vec![
                Placed::at(50.0, y, "氏名又は名称"),
                Placed::at(200.0, y, "住所"),
                Placed::at(350.0, y, "所有株式数(株)"),
                Placed::at(450.0, y, "割合(%)"),
            ]
        };
        let row = |y: f32, cells: [&'static str; 4]| {
            vec![
                Placed::at(50.0, y, cells[0]),
                Placed::at(200.0, y, cells[1]),
                Placed::at(350.0, y, cells[2]),
                Placed::at(450.0, y, cells[3]),
            ]
        };

        let mut anchor = vec![Placed::at(50.0, 780.0, "(4) 大株主の状況")];
        anchor.extend(header(760.0));
        anchor.extend(row(740.0, ["株式会社ABC", "東京都港区", "1,000,000", "40.00"]));
        anchor.extend(row(720.0, ["山田太郎", "東京都渋谷区", "500,000", "20.00"]));

        let mut continuation = header(780.0);
        continuation.extend(row(760.0, ["佐藤花子", "大阪府", "250,000", "10.00"]));
        continuation.push(Placed::at(50.0, 740.0, "計"));
        continuation.push(Placed::at(350.0, 740.0, "1,750,000"));
        continuation.push(Placed::at(450.0, 740.0, "70.00"));

        let bytes = pdf_bytes(&[vec![Placed::at(50.0, 780.0, "目次")], anchor, continuation]);

        let outcome = ShareholderStitcher::default().stitch_pdf(&bytes);
        assert!(outcome.is_complete());
        assert_eq!(
            outcome.into_value().holdings,
            vec!["株式会社ABC 1,000,000", "山田太郎 500,000", "佐藤花子 250,000"]
        );
    }
}
