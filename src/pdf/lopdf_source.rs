// src/pdf/lopdf_source.rs
//! [`PdfDocument`] over lopdf.
//!
//! lopdf's own text extraction drops positions, so pages are read by walking
//! their content streams: the text and graphics matrices are tracked through
//! `cm`/`Tm`/`Td`/`TD`/`T*`, and every shown string becomes a [`TextRun`] at
//! its user-space origin. Glyph advances are estimated (one em for wide
//! characters, half an em otherwise), which is enough to separate cells.

use std::collections::BTreeMap;

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use once_cell::unsync::OnceCell;

use super::cmap::ToUnicode;
use super::layout::{self, TextRun};
use super::{PdfDocument, TableGrid};
use crate::utils::error::ExtractError;

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

pub struct LopdfDocument {
    document: Document,
    page_ids: Vec<ObjectId>, // in page order
    runs: Vec<OnceCell<Vec<TextRun>>>,
}

impl LopdfDocument {
    /// Parses a PDF held in memory.
    pub fn load(bytes: &[u8]) -> Result<Self, ExtractError> {
        let document = Document::load_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;
        let page_ids: Vec<ObjectId> = document.get_pages().into_values().collect();
        tracing::debug!("Loaded PDF with {} page(s)", page_ids.len());

        Ok(Self {
            runs: page_ids.iter().map(|_| OnceCell::new()).collect(),
            document,
            page_ids,
        })
    }

    /// Positioned text of a page, read once and cached.
    fn page_runs(&self, page: usize) -> Result<&[TextRun], ExtractError> {
        let (Some(&page_id), Some(cell)) = (self.page_ids.get(page), self.runs.get(page)) else {
            return Err(ExtractError::PageOutOfRange(page));
        };
        cell.get_or_try_init(|| self.read_runs(page_id))
            .map(Vec::as_slice)
            .map_err(|e| ExtractError::Pdf(format!("page {}: {}", page + 1, e)))
    }

    fn read_runs(&self, page_id: ObjectId) -> Result<Vec<TextRun>, lopdf::Error> {
        let fonts = self
            .document
            .get_page_fonts(page_id)
            .into_iter()
            .map(|(name, font)| (name, FontDecoder::for_font(&self.document, font)))
            .collect();

        let data = self.document.get_page_content(page_id)?;
        let content = Content::decode(&data)?;

        let mut reader = PageReader::new(fonts);
        for operation in &content.operations {
            reader.apply(&operation.operator, &operation.operands);
        }
        Ok(reader.runs)
    }
}

impl PdfDocument for LopdfDocument {
    fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn page_text(&self, page: usize) -> Result<String, ExtractError> {
        Ok(layout::text_from_runs(self.page_runs(page)?))
    }

    fn page_tables(&self, page: usize) -> Result<Vec<TableGrid>, ExtractError> {
        Ok(layout::tables_from_runs(self.page_runs(page)?))
    }
}

/// How a font's shown strings become text.
enum FontDecoder {
    ToUnicode(ToUnicode),
    /// Simple font with a named (or default) encoding.
    Encoding(Option<String>),
}

impl FontDecoder {
    fn for_font(document: &Document, font: &Dictionary) -> Self {
        if let Some(map) = to_unicode_stream(document, font) {
            return FontDecoder::ToUnicode(ToUnicode::parse(&map));
        }
        let encoding = font
            .get(b"Encoding")
            .ok()
            .and_then(|encoding| encoding.as_name().ok())
            .map(|name| String::from_utf8_lossy(name).into_owned());
        FontDecoder::Encoding(encoding)
    }

    fn decode(&self, bytes: &[u8]) -> String {
        match self {
            FontDecoder::ToUnicode(map) => map.decode(bytes),
            FontDecoder::Encoding(encoding) => Document::decode_text(encoding.as_deref(), bytes),
        }
    }
}

fn to_unicode_stream(document: &Document, font: &Dictionary) -> Option<Vec<u8>> {
    let id = font.get(b"ToUnicode").ok()?.as_reference().ok()?;
    let stream = document.get_object(id).ok()?.as_stream().ok()?;
    Some(
        stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone()),
    )
}

/// Text-showing state machine for one content stream.
struct PageReader {
    fonts: BTreeMap<Vec<u8>, FontDecoder>,
    font: Option<Vec<u8>>,
    font_size: f32,
    leading: f32,
    ctm: Matrix,
    saved: Vec<Matrix>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    runs: Vec<TextRun>,
}

impl PageReader {
    fn new(fonts: BTreeMap<Vec<u8>, FontDecoder>) -> Self {
        Self {
            fonts,
            font: None,
            font_size: 0.0,
            leading: 0.0,
            ctm: IDENTITY,
            saved: Vec::new(),
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            runs: Vec::new(),
        }
    }

    fn apply(&mut self, operator: &str, operands: &[Object]) {
        let number = |i: usize| operands.get(i).and_then(as_number).unwrap_or(0.0);
        match operator {
            "q" => self.saved.push(self.ctm),
            "Q" => self.ctm = self.saved.pop().unwrap_or(IDENTITY),
            "cm" => self.ctm = multiply(&matrix_from(operands), &self.ctm),
            "BT" => {
                self.text_matrix = IDENTITY;
                self.line_matrix = IDENTITY;
            }
            "Tf" => {
                self.font = operands.first().and_then(|name| name.as_name().ok()).map(<[u8]>::to_vec);
                self.font_size = number(1);
            }
            "TL" => self.leading = number(0),
            "Td" => self.next_line(number(0), number(1)),
            "TD" => {
                self.leading = -number(1);
                self.next_line(number(0), number(1));
            }
            "Tm" => {
                self.line_matrix = matrix_from(operands);
                self.text_matrix = self.line_matrix;
            }
            "T*" => self.next_line(0.0, -self.leading),
            "Tj" => self.show_operand(operands.first()),
            "'" => {
                self.next_line(0.0, -self.leading);
                self.show_operand(operands.first());
            }
            "\"" => {
                self.next_line(0.0, -self.leading);
                self.show_operand(operands.get(2));
            }
            "TJ" => {
                let Some(Object::Array(items)) = operands.first() else { return };
                for item in items {
                    match item {
                        Object::String(bytes, _) => self.show(bytes),
                        // Adjustments are in thousandths of an em, positive moves left.
                        other => {
                            if let Some(adjust) = as_number(other) {
                                self.advance(-adjust / 1000.0 * self.font_size);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn next_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = multiply(&[1.0, 0.0, 0.0, 1.0, tx, ty], &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn advance(&mut self, tx: f32) {
        self.text_matrix = multiply(&[1.0, 0.0, 0.0, 1.0, tx, 0.0], &self.text_matrix);
    }

    fn show_operand(&mut self, operand: Option<&Object>) {
        if let Some(Object::String(bytes, _)) = operand {
            self.show(bytes);
        }
    }

    fn show(&mut self, bytes: &[u8]) {
        let text = match self.font.as_ref().and_then(|name| self.fonts.get(name)) {
            Some(decoder) => decoder.decode(bytes),
            None => Document::decode_text(None, bytes),
        };
        let advance = text.chars().map(glyph_ems).sum::<f32>() * self.font_size;

        if !text.trim().is_empty() {
            let placed = multiply(&self.text_matrix, &self.ctm);
            self.runs.push(TextRun {
                x: placed[4],
                y: placed[5],
                width: advance * placed[0].hypot(placed[1]),
                size: self.font_size * placed[2].hypot(placed[3]),
                text,
            });
        }
        self.advance(advance);
    }
}

fn glyph_ems(c: char) -> f32 {
    if c.is_ascii() || ('\u{FF61}'..='\u{FF9F}').contains(&c) {
        0.5
    } else {
        1.0
    }
}

fn as_number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn matrix_from(operands: &[Object]) -> Matrix {
    let mut matrix = IDENTITY;
    if operands.len() == 6 {
        for (slot, operand) in matrix.iter_mut().zip(operands) {
            *slot = as_number(operand).unwrap_or(0.0);
        }
    }
    matrix
}

/// `a` then `b`, in PDF row-vector convention.
fn multiply(a: &Matrix, b: &Matrix) -> Matrix {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}
