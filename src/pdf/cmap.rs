// src/pdf/cmap.rs
//! ToUnicode CMaps: the character codes a font draws with, mapped back to text.
//!
//! Filings embed CID fonts whose codes are glyph ids, so without the font's
//! CMap the shown strings are meaningless. Only the parts needed for text
//! recovery are read: the code width from `codespacerange`, plus `bfchar` and
//! `bfrange` entries (both the offset and the array form).

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

static CODESPACE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"begincodespacerange\s*<([0-9A-Fa-f]+)>").expect("Failed to compile CODESPACE_RE")
});
static BFCHAR_SECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)beginbfchar(.*?)endbfchar").expect("Failed to compile BFCHAR_SECTION_RE")
});
static BFRANGE_SECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)beginbfrange(.*?)endbfrange").expect("Failed to compile BFRANGE_SECTION_RE")
});
static BFCHAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]*)>").expect("Failed to compile BFCHAR_RE")
});
static BFRANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]+)>\s*(?:<([0-9A-Fa-f]*)>|\[([^\]]*)\])")
        .expect("Failed to compile BFRANGE_RE")
});
static HEX_STRING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([0-9A-Fa-f]*)>").expect("Failed to compile HEX_STRING_RE"));

/// Codes are two bytes unless the CMap says otherwise.
const DEFAULT_CODE_LEN: usize = 2;

#[derive(Debug, Clone, Default)]
pub struct ToUnicode {
    code_len: usize,
    chars: HashMap<u32, String>,
    ranges: Vec<CodeRange>,
}

/// `low..=high` maps onto `start`, with the last UTF-16 unit offset per code.
#[derive(Debug, Clone)]
struct CodeRange {
    low: u32,
    high: u32,
    start: Vec<u16>,
}

impl ToUnicode {
    /// Reads a (decompressed) CMap stream. Entries that do not parse are skipped.
    pub fn parse(data: &[u8]) -> Self {
        let content = String::from_utf8_lossy(data);
        let code_len = CODESPACE_RE
            .captures(&content)
            .map(|caps| (caps[1].len() / 2).max(1))
            .unwrap_or(DEFAULT_CODE_LEN);

        let mut map = Self {
            code_len,
            ..Default::default()
        };

        for section in BFCHAR_SECTION_RE.captures_iter(&content) {
            for caps in BFCHAR_RE.captures_iter(&section[1]) {
                if let Some(code) = parse_code(&caps[1]) {
                    map.chars.insert(code, utf16_text(&hex_units(&caps[2])));
                }
            }
        }

        for section in BFRANGE_SECTION_RE.captures_iter(&content) {
            for caps in BFRANGE_RE.captures_iter(&section[1]) {
                let (Some(low), Some(high)) = (parse_code(&caps[1]), parse_code(&caps[2])) else {
                    continue;
                };
                if let Some(start) = caps.get(3) {
                    map.ranges.push(CodeRange {
                        low,
                        high,
                        start: hex_units(start.as_str()),
                    });
                } else if let Some(list) = caps.get(4) {
                    for (code, dst) in (low..=high).zip(HEX_STRING_RE.captures_iter(list.as_str())) {
                        map.chars.insert(code, utf16_text(&hex_units(&dst[1])));
                    }
                }
            }
        }

        tracing::trace!(
            code_len = map.code_len,
            chars = map.chars.len(),
            ranges = map.ranges.len(),
            "Parsed ToUnicode CMap"
        );
        map
    }

    /// Text for a shown string. Unmapped codes are dropped.
    pub fn decode(&self, bytes: &[u8]) -> String {
        bytes
            .chunks(self.code_len)
            .filter_map(|code| self.lookup(code_value(code)))
            .collect()
    }

    fn lookup(&self, code: u32) -> Option<String> {
        if let Some(text) = self.chars.get(&code) {
            return Some(text.clone());
        }
        self.ranges
            .iter()
            .find(|range| (range.low..=range.high).contains(&code))
            .map(|range| {
                let mut units = range.start.clone();
                if let Some(last) = units.last_mut() {
                    *last = last.wrapping_add((code - range.low) as u16);
                }
                utf16_text(&units)
            })
    }
}

fn parse_code(hex: &str) -> Option<u32> {
    u32::from_str_radix(hex, 16).ok()
}

fn code_value(code: &[u8]) -> u32 {
    code.iter().fold(0, |acc, &byte| (acc << 8) | u32::from(byte))
}

fn hex_units(hex: &str) -> Vec<u16> {
    hex.as_bytes()
        .chunks(4)
        .filter_map(|unit| std::str::from_utf8(unit).ok())
        .filter_map(|unit| u16::from_str_radix(unit, 16).ok())
        .collect()
}

fn utf16_text(units: &[u16]) -> String {
    String::from_utf16_lossy(units)
}
