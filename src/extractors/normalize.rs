// src/extractors/normalize.rs
//! Cell text canonicalization and locale-aware numeric parsing.

use serde::{Serialize, Serializer};

/// Characters that never carry meaning in a label or value comparison.
const NOISE_CHARS: &[char] = &['-', ',', '\n', '\t', '\r', '（', '）'];

/// Thousands separators accepted by [`parse_numeric`].
const THOUSANDS_SEPARATORS: &[char] = &[',', '，'];

/// Dash glyphs that stand for a minus sign in exchange documents.
const DASHES: &[char] = &['-', '−', '－', '‐', '–'];

/// Canonical comparison form of a cell: noise characters removed, trimmed,
/// lower-cased, and with every whitespace character dropped.
///
/// Idempotent: `normalize(&normalize(s)) == normalize(s)`.
pub fn normalize(raw: &str) -> String {
    strip_noise(raw)
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Removes noise characters but keeps case and word spacing. Runs of
/// whitespace collapse to a single space.
pub fn clean(raw: &str) -> String {
    strip_noise(raw).split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_noise(raw: &str) -> String {
    raw.chars().filter(|c| !NOISE_CHARS.contains(c)).collect()
}

/// Either a parsed number or the original text when it did not parse.
#[derive(Debug, Clone, PartialEq)]
pub enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    /// True for blank text or a bare dash placeholder ("-", "－").
    pub fn is_missing(&self) -> bool {
        match self {
            Numeric::Number(_) => false,
            Numeric::Text(text) => text.trim().chars().all(|c| DASHES.contains(&c)),
        }
    }
}

impl Default for Numeric {
    fn default() -> Self {
        Numeric::Text(String::new())
    }
}

impl std::fmt::Display for Numeric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Numeric::Number(n) => write!(f, "{}", n),
            Numeric::Text(text) => f.write_str(text),
        }
    }
}

impl Serialize for Numeric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Numeric::Number(n) => serializer.serialize_f64(*n),
            Numeric::Text(text) => serializer.serialize_str(text),
        }
    }
}

/// Parses `"1,234"`, `"-5"`, `"－5"` and friends. Anything that still fails to
/// parse comes back as [`Numeric::Text`] holding the untouched input.
pub fn parse_numeric(raw: &str) -> Numeric {
    let stripped: String = raw
        .trim()
        .chars()
        .filter(|c| !THOUSANDS_SEPARATORS.contains(c))
        .collect();

    let candidate = match stripped.strip_prefix(DASHES) {
        Some(rest) => format!("-{}", rest),
        None => stripped,
    };

    match candidate.parse::<f64>() {
        Ok(value) if value.is_finite() => Numeric::Number(value),
        _ => Numeric::Text(raw.to_string()),
    }
}
