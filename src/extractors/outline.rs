// src/extractors/outline.rs
//! Key-value classification of the one-page listing outline ("新規上場会社概要").
//!
//! Column 0 of every row is a label, column 1 its value. Each row is checked
//! against an ordered rule table; every rule that matches is applied, so a row
//! can feed more than one field. The share-offer-source rule also opens a
//! continuation run: following rows with a blank label extend the same list.

// --- Imports ---
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::normalize::{clean, normalize};
use super::Extraction;
use crate::pdf::{LopdfDocument, PdfDocument, TableGrid};

// --- Label / Value Keywords ---
const ENGLISH_NAME_LABEL: &str = "英訳名";
const ISSUED_SHARES_LABEL: &str = "発行済株式総数";
const ISSUED_SHARES_AT_LISTING_LABEL: &str = "上場時発行済株式総数";
const MANAGING_PARTICIPANT_LABEL: &str = "幹事取引参加者";
const OFFER_SOURCE_LABEL: &str = "売出株放出元";
const PUBLIC_OFFERING_VALUE: &str = "公募";
const UNDERWRITER_OFFERING_VALUE: &str = "売出し（引受人の買取引受による売出し）";

// Keywords are compared in normalized form, same as the cells.
static UNDERWRITER_OFFERING_KEY: Lazy<String> = Lazy::new(|| normalize(UNDERWRITER_OFFERING_VALUE));

static DIGIT_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+").expect("Failed to compile DIGIT_RUN_RE"));

// --- Data Structures ---
/// Fields read from an outline document. Every field is optional in practice:
/// anything the document does not carry stays at its default.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutlineSummary {
    pub english_name: String,
    pub issued_shares: String,
    pub issued_shares_incl_treasury: String,
    pub managing_participant: String,
    pub public_offerings: Vec<String>,
    pub underwriter_offering: String,
    pub offer_sources: Vec<String>,
}

/// One outline row in both raw and comparison form.
#[derive(Debug)]
struct Row<'a> {
    raw_value: &'a str,
    label: String,
    value: String,
}

impl<'a> Row<'a> {
    fn from_cells(cells: &'a [String]) -> Self {
        let cell = |i: usize| cells.get(i).map(String::as_str).unwrap_or("");
        Self {
            raw_value: cell(1),
            label: normalize(cell(0)),
            value: normalize(cell(1)),
        }
    }

    fn value_text(&self) -> String {
        self.raw_value.trim().to_string()
    }
}

/// A labelled row handler. `continues_into` names the list that blank-label
/// rows directly below a match are appended to.
struct Rule {
    name: &'static str,
    matches: fn(&Row) -> bool,
    apply: fn(&mut OutlineSummary, &Row),
    continues_into: Option<fn(&mut OutlineSummary) -> &mut Vec<String>>,
}

// --- Rule Table (evaluated in order) ---
static OUTLINE_RULES: &[Rule] = &[
    Rule {
        name: "english_name",
        matches: is_english_name,
        apply: set_english_name,
        continues_into: None,
    },
    Rule {
        name: "issued_shares",
        matches: is_issued_shares,
        apply: set_issued_shares,
        continues_into: None,
    },
    Rule {
        name: "issued_shares_incl_treasury",
        matches: is_issued_shares_at_listing,
        apply: set_issued_shares_at_listing,
        continues_into: None,
    },
    Rule {
        name: "managing_participant",
        matches: is_managing_participant,
        apply: set_managing_participant,
        continues_into: None,
    },
    Rule {
        name: "public_offering",
        matches: is_public_offering,
        apply: push_public_offering,
        continues_into: None,
    },
    Rule {
        name: "underwriter_offering",
        matches: is_underwriter_offering,
        apply: set_underwriter_offering,
        continues_into: None,
    },
    Rule {
        name: "offer_source",
        matches: is_offer_source,
        apply: push_offer_source,
        continues_into: Some(offer_sources),
    },
];

fn is_english_name(row: &Row) -> bool {
    row.label == ENGLISH_NAME_LABEL
}

fn set_english_name(summary: &mut OutlineSummary, row: &Row) {
    summary.english_name = clean(row.raw_value);
}

fn is_issued_shares(row: &Row) -> bool {
    row.label == ISSUED_SHARES_LABEL
}

fn set_issued_shares(summary: &mut OutlineSummary, row: &Row) {
    summary.issued_shares = row.value_text();
}

fn is_issued_shares_at_listing(row: &Row) -> bool {
    row.label == ISSUED_SHARES_AT_LISTING_LABEL
}

fn set_issued_shares_at_listing(summary: &mut OutlineSummary, row: &Row) {
    summary.issued_shares_incl_treasury = row.value_text();
}

fn is_managing_participant(row: &Row) -> bool {
    row.label == MANAGING_PARTICIPANT_LABEL
}

fn set_managing_participant(summary: &mut OutlineSummary, row: &Row) {
    summary.managing_participant = row.value_text();
}

fn is_public_offering(row: &Row) -> bool {
    row.value.contains(PUBLIC_OFFERING_VALUE) && DIGIT_RUN_RE.is_match(&row.value)
}

fn push_public_offering(summary: &mut OutlineSummary, row: &Row) {
    summary.public_offerings.push(row.value_text());
}

fn is_underwriter_offering(row: &Row) -> bool {
    row.value.contains(UNDERWRITER_OFFERING_KEY.as_str())
}

fn set_underwriter_offering(summary: &mut OutlineSummary, row: &Row) {
    summary.underwriter_offering = match DIGIT_RUN_RE.find(&row.value) {
        Some(digits) => digits.as_str().to_string(),
        None => row.value_text(),
    };
}

fn is_offer_source(row: &Row) -> bool {
    row.label.contains(OFFER_SOURCE_LABEL)
}

fn push_offer_source(summary: &mut OutlineSummary, row: &Row) {
    summary.offer_sources.push(row.value_text());
}

fn offer_sources(summary: &mut OutlineSummary) -> &mut Vec<String> {
    &mut summary.offer_sources
}

// --- Main Classifier Structure ---
pub struct OutlineClassifier {
    rules: &'static [Rule],
}

impl Default for OutlineClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl OutlineClassifier {
    pub fn new() -> Self {
        Self { rules: OUTLINE_RULES }
    }

    /// Loads a PDF from memory and classifies it. Load failures degrade to the
    /// default summary.
    pub fn classify_pdf(&self, bytes: &[u8]) -> Extraction<OutlineSummary> {
        match LopdfDocument::load(bytes) {
            Ok(document) => self.classify(&document),
            Err(e) => {
                tracing::warn!("Outline PDF could not be loaded: {}", e);
                Extraction::degraded(OutlineSummary::default(), e)
            }
        }
    }

    /// Classifies every table on every page of an outline document.
    ///
    /// A page that cannot be read stops the scan; fields gathered from earlier
    /// pages are kept.
    pub fn classify(&self, document: &dyn PdfDocument) -> Extraction<OutlineSummary> {
        let mut summary = OutlineSummary::default();

        for page in 0..document.page_count() {
            let tables = match document.page_tables(page) {
                Ok(tables) => tables,
                Err(e) => {
                    tracing::warn!("Outline page {} unreadable, keeping partial summary: {}", page + 1, e);
                    return Extraction::degraded(summary, e);
                }
            };
            for grid in &tables {
                self.classify_grid(grid, &mut summary);
            }
        }

        tracing::debug!(
            english_name = %summary.english_name,
            public_offerings = summary.public_offerings.len(),
            offer_sources = summary.offer_sources.len(),
            "Outline classified"
        );
        Extraction::Complete(summary)
    }

    /// Applies the rule table to one grid, folding matches into `summary`.
    pub fn classify_grid(&self, grid: &TableGrid, summary: &mut OutlineSummary) {
        let rows: Vec<Row> = grid.rows().map(Row::from_cells).collect();

        let mut index = 0;
        while index < rows.len() {
            let row = &rows[index];
            index += 1;

            let mut continuation = None;
            for rule in self.rules {
                if (rule.matches)(row) {
                    tracing::trace!("Rule '{}' matched label '{}'", rule.name, row.label);
                    (rule.apply)(summary, row);
                    continuation = continuation.or(rule.continues_into);
                }
            }

            let Some(target) = continuation else { continue };
            // Blank-label rows below belong to the list just started.
            while let Some(next) = rows.get(index) {
                if !next.label.is_empty() {
                    break;
                }
                target(summary).push(next.value_text());
                index += 1;
            }
        }
    }
}
