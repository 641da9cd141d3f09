// src/storage/seen.rs
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::jpx::IssueRecord;
use crate::utils::error::StorageError;

/// Issue names already emitted by earlier runs, persisted as a JSON array.
/// Only ever grows.
#[derive(Debug, Default)]
pub struct SeenSet {
    names: Vec<String>, // insertion order, as written to disk
    index: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the set from `path`. A missing file is an empty set (first run).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No seen-set at {}, starting fresh", path.display());
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path)?;
        let names: Vec<String> = serde_json::from_str(&content)
            .map_err(|e| StorageError::SerializationError(format!("{}: {}", path.display(), e)))?;

        let mut seen = Self::new();
        for name in names {
            seen.insert(name);
        }
        tracing::info!("Loaded {} seen issue name(s) from {}", seen.len(), path.display());
        Ok(seen)
    }

    /// Overwrites `path` with the current set.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&self.names)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        fs::write(path, json)?;

        tracing::info!("Saved {} seen issue name(s) to {}", self.len(), path.display());
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains(name)
    }

    /// Returns false when the name was already present.
    pub fn insert(&mut self, name: String) -> bool {
        if self.index.insert(name.clone()) {
            self.names.push(name);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Picks the records this run should process.
    ///
    /// Incremental: keep unseen, finalized records (name and share price
    /// present) and remember their names. Unfinalized records are left out of
    /// the set so a later run picks them up. Full output: everything passes and
    /// the set is untouched.
    pub fn select(&mut self, records: Vec<IssueRecord>, incremental: bool) -> Vec<IssueRecord> {
        if !incremental {
            return records;
        }

        let total = records.len();
        let selected: Vec<IssueRecord> = records
            .into_iter()
            .filter(|record| {
                if !record.is_finalized() {
                    tracing::debug!("Deferring '{}': share price not published yet", record.issue_name);
                    return false;
                }
                if self.contains(&record.issue_name) {
                    tracing::debug!("Skipping '{}': already seen", record.issue_name);
                    return false;
                }
                self.insert(record.issue_name.clone())
            })
            .collect();

        tracing::info!("Selected {} new issue(s) out of {}", selected.len(), total);
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::normalize::Numeric;

    fn record(name: &str, price: Numeric) -> IssueRecord {
        IssueRecord {
            issue_name: name.to_string(),
            share_price: price,
            ..Default::default()
        }
    }

    fn listing() -> Vec<IssueRecord> {
        vec![
            record("Alpha", Numeric::Number(1000.0)),
            record("Beta", Numeric::Text("-".to_string())),
            record("Gamma", Numeric::Number(2500.0)),
            record("", Numeric::Number(900.0)),
        ]
    }

    #[test]
    fn test_incremental_selection_skips_seen_and_unfinalized() {
        let mut seen = SeenSet::new();
        seen.insert("Gamma".to_string());

        let selected = seen.select(listing(), true);
        let names: Vec<&str> = selected.iter().map(|r| r.issue_name.as_str()).collect();
        assert_eq!(names, vec!["Alpha"]);
        assert!(seen.contains("Alpha"));
        assert!(!seen.contains("Beta"));
    }

    #[test]
    fn test_second_incremental_pass_is_empty() {
        let mut seen = SeenSet::new();
        let first = seen.select(listing(), true);
        assert_eq!(first.len(), 2);

        let second = seen.select(listing(), true);
        assert!(second.is_empty());
    }

    #[test]
    fn test_duplicate_names_within_one_listing_are_kept_once() {
        let mut seen = SeenSet::new();
        let listing = vec![
            record("Alpha", Numeric::Number(1.0)),
            record("Alpha", Numeric::Number(1.0)),
        ];
        assert_eq!(seen.select(listing, true).len(), 1);
    }

    #[test]
    fn test_full_output_passes_everything_and_leaves_set_alone() {
        let mut seen = SeenSet::new();
        seen.insert("Alpha".to_string());

        let selected = seen.select(listing(), false);
        assert_eq!(selected.len(), 4);
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_save_and_load_keep_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("searched_ipo.json");

        let mut seen = SeenSet::new();
        seen.insert("Zeta".to_string());
        seen.insert("Alpha".to_string());
        seen.save(&path).unwrap();

        let loaded = SeenSet::load(&path).unwrap();
        assert_eq!(loaded.names, vec!["Zeta", "Alpha"]);
        assert!(loaded.contains("Alpha"));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let seen = SeenSet::load(dir.path().join("absent.json")).unwrap();
        assert_eq!(seen.len(), 0);
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("searched_ipo.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(SeenSet::load(&path), Err(StorageError::SerializationError(_))));
    }
}
