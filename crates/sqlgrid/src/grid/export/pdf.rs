//! Landscape A4 table in a built-in font.

use std::sync::Arc;

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};

use crate::error::{Error, ErrorKind, Result};
use crate::grid::export::{Renderer, RendererRegistration, Table};

const PAGE_WIDTH: f32 = 297.0;
const PAGE_HEIGHT: f32 = 210.0;
const MARGIN: f32 = 10.0;
const LINE_HEIGHT: f32 = 6.0;
const FONT_SIZE: f32 = 9.0;
/// Approximate Helvetica advance at `FONT_SIZE`, in millimetres.
const CHAR_WIDTH: f32 = 1.7;

#[derive(Debug, Clone, Copy, Default)]
pub struct Pdf;

fn pdf_failed(err: impl std::fmt::Display) -> Error {
    Error::new(ErrorKind::Driver, format!("pdf export: {err}"))
}

/// Cut `text` to what fits in `width` millimetres.
fn fit(text: &str, width: f32) -> String {
    let max = (width / CHAR_WIDTH).floor().max(1.0) as usize;
    if text.chars().count() <= max {
        return text.to_owned();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('~');
    cut
}

struct Cursor<'a> {
    layer: PdfLayerReference,
    font: &'a IndirectFontRef,
    bold: &'a IndirectFontRef,
    y: f32,
}

impl Cursor<'_> {
    fn line(&mut self, cells: &[String], column_width: f32, header: bool) {
        let font = if header { self.bold } else { self.font };
        for (idx, cell) in cells.iter().enumerate() {
            let x = MARGIN + column_width * idx as f32;
            self.layer
                .use_text(fit(cell, column_width), FONT_SIZE, Mm(x), Mm(self.y), font);
        }
        self.y -= LINE_HEIGHT;
    }
}

impl Renderer for Pdf {
    fn content_type(&self) -> &'static str {
        "application/pdf"
    }

    fn extension(&self) -> &'static str {
        "pdf"
    }

    fn render(&self, table: &Table) -> Result<Vec<u8>> {
        let (doc, page, layer) = PdfDocument::new("export", Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "table");
        let font = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_failed)?;
        let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_failed)?;
        let column_width = (PAGE_WIDTH - 2.0 * MARGIN) / table.titles.len().max(1) as f32;
        let top = PAGE_HEIGHT - MARGIN - LINE_HEIGHT;

        let mut cursor = Cursor {
            layer: doc.get_page(page).get_layer(layer),
            font: &font,
            bold: &bold,
            y: top,
        };
        cursor.line(&table.titles, column_width, true);
        for row in &table.rows {
            if cursor.y < MARGIN {
                let (page, layer) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "table");
                cursor.layer = doc.get_page(page).get_layer(layer);
                cursor.y = top;
                cursor.line(&table.titles, column_width, true);
            }
            cursor.line(row, column_width, false);
        }
        drop(cursor);
        doc.save_to_bytes().map_err(pdf_failed)
    }
}

fn new_pdf() -> Arc<dyn Renderer> {
    Arc::new(Pdf)
}

inventory::submit! {
    RendererRegistration { name: "pdf", create: new_pdf }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_cells_are_cut() {
        assert_eq!(fit("short", 50.0), "short");
        assert_eq!(fit("abcdefghij", CHAR_WIDTH * 5.5), "abcd~");
    }

    #[test]
    fn renders_a_pdf_document_across_pages() {
        let table = Table {
            titles: vec!["Id".into(), "Brand".into()],
            rows: (0..80).map(|i| vec![i.to_string(), "BMW".into()]).collect(),
        };
        let out = Pdf.render(&table).unwrap();
        assert!(out.starts_with(b"%PDF"));
    }
}
