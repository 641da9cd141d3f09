// src/pdf/mod.rs
//! Page-level access to PDF filings.
//!
//! The extraction engine only ever sees a [`PdfDocument`]: plain text per page and
//! the table grids found on that page. How a page becomes a grid is the
//! implementor's business; [`LopdfDocument`] is the bundled adapter, which
//! lays out positioned text runs from the page content streams.

mod cmap;
pub mod layout;
pub mod lopdf_source;

use crate::utils::error::ExtractError;

pub use lopdf_source::LopdfDocument;

/// One table on one page, stored row-major as raw cell text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableGrid {
    rows: Vec<Vec<String>>,
}

impl TableGrid {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    /// Convenience constructor from anything string-like.
    #[cfg(test)]
    pub fn from_rows<R, S>(rows: impl IntoIterator<Item = R>) -> Self
    where
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
        }
    }

    #[cfg(test)]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, index: usize) -> Option<&[String]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[String]> {
        self.rows.iter().map(Vec::as_slice)
    }

    /// Cell text, or `""` when the row is shorter than `col` (ragged grids are normal).
    #[cfg(test)]
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// A paginated document the extractors can read. Pages are zero-indexed.
pub trait PdfDocument {
    fn page_count(&self) -> usize;

    /// Extracted plain text of a page, used for locating sections.
    fn page_text(&self, page: usize) -> Result<String, ExtractError>;

    /// Every table detected on a page, in reading order.
    fn page_tables(&self, page: usize) -> Result<Vec<TableGrid>, ExtractError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream, StringFormat};

    use super::*;

    /// ToUnicode map for a two-byte code space where every code is its own
    /// UTF-16 unit, so test strings can be shown as UTF-16BE.
    const IDENTITY_CMAP: &str = "/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
1 beginbfrange
<0000> <FFFF> <0000>
endbfrange
endcmap
end
end";

    /// A string drawn at an absolute position on a generated page.
    #[derive(Debug, Clone, Copy)]
    pub struct Placed {
        x: f32,
        y: f32,
        text: &'static str,
    }

    impl Placed {
        pub fn at(x: f32, y: f32, text: &'static str) -> Self {
            Self { x, y, text }
        }
    }

    /// Builds a real PDF, one page per entry, drawing each string in its own
    /// `BT`/`ET` block with a CID font (size 10) the way filings do.
    pub fn pdf_bytes(pages: &[Vec<Placed>]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let cmap_id = doc.add_object(Stream::new(dictionary! {}, IDENTITY_CMAP.as_bytes().to_vec()));
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "TestGothic",
            "Encoding" => "Identity-H",
            "ToUnicode" => cmap_id,
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for cells in pages {
            let mut operations = Vec::new();
            for cell in cells {
                let utf16: Vec<u8> = cell.text.encode_utf16().flat_map(u16::to_be_bytes).collect();
                operations.extend([
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 10.into()]),
                    Operation::new(
                        "Tm",
                        vec![
                            1.into(),
                            0.into(),
                            0.into(),
                            1.into(),
                            Object::Real(cell.x.into()),
                            Object::Real(cell.y.into()),
                        ],
                    ),
                    Operation::new("Tj", vec![Object::String(utf16, StringFormat::Hexadecimal)]),
                    Operation::new("ET", vec![]),
                ]);
            }
            let content = Content { operations }.encode().unwrap();
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages.len() as i64,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    /// Scripted document for driving the extractors without real PDFs.
    #[derive(Debug, Default)]
    pub struct FakeDocument {
        pages: Vec<FakePage>,
    }

    #[derive(Debug)]
    enum FakePage {
        Ok { text: String, tables: Vec<TableGrid> },
        Broken,
    }

    impl FakeDocument {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn page(mut self, text: &str, tables: Vec<TableGrid>) -> Self {
            self.pages.push(FakePage::Ok {
                text: text.to_string(),
                tables,
            });
            self
        }

        /// A page whose extraction always fails.
        pub fn broken_page(mut self) -> Self {
            self.pages.push(FakePage::Broken);
            self
        }
    }

    impl PdfDocument for FakeDocument {
        fn page_count(&self) -> usize {
            self.pages.len()
        }

        fn page_text(&self, page: usize) -> Result<String, ExtractError> {
            match self.pages.get(page) {
                Some(FakePage::Ok { text, .. }) => Ok(text.clone()),
                Some(FakePage::Broken) => Err(ExtractError::Pdf(format!("page {} is corrupt", page + 1))),
                None => Err(ExtractError::PageOutOfRange(page)),
            }
        }

        fn page_tables(&self, page: usize) -> Result<Vec<TableGrid>, ExtractError> {
            match self.pages.get(page) {
                Some(FakePage::Ok { tables, .. }) => Ok(tables.clone()),
                Some(FakePage::Broken) => Err(ExtractError::Pdf(format!("page {} is corrupt", page + 1))),
                None => Err(ExtractError::PageOutOfRange(page)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_out_of_bounds_is_blank() {
        let grid = TableGrid::from_rows([vec!["a", "b"], vec!["c"]]);
        assert_eq!(grid.cell(0, 1), "b");
        assert_eq!(grid.cell(1, 1), "");
        assert_eq!(grid.cell(5, 0), "");
        assert_eq!(grid.row_count(), 2);
    }
}
