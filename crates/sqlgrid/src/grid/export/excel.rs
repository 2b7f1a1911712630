//! Single-sheet xlsx workbook.

use std::sync::Arc;

use rust_xlsxwriter::{Format, Workbook, XlsxError};

use crate::error::{Error, ErrorKind, Result};
use crate::grid::export::{Renderer, RendererRegistration, Table};

#[derive(Debug, Clone, Copy, Default)]
pub struct Excel;

fn xlsx_failed(err: XlsxError) -> Error {
    Error::new(ErrorKind::Driver, format!("excel export: {err}"))
}

impl Renderer for Excel {
    fn content_type(&self) -> &'static str {
        "application/octet-stream"
    }

    fn extension(&self) -> &'static str {
        "xlsx"
    }

    fn render(&self, table: &Table) -> Result<Vec<u8>> {
        let mut workbook = Workbook::new();
        let bold = Format::new().set_bold();
        let sheet = workbook.add_worksheet();

        for (col, title) in table.titles.iter().enumerate() {
            sheet
                .write_string_with_format(0, column(col)?, title, &bold)
                .map_err(xlsx_failed)?;
        }
        for (idx, row) in table.rows.iter().enumerate() {
            let line = u32::try_from(idx + 1)
                .map_err(|_| Error::new(ErrorKind::InvalidParam, "too many rows for one sheet"))?;
            for (col, value) in row.iter().enumerate() {
                sheet.write_string(line, column(col)?, value).map_err(xlsx_failed)?;
            }
        }
        workbook.save_to_buffer().map_err(xlsx_failed)
    }
}

fn column(idx: usize) -> Result<u16> {
    u16::try_from(idx).map_err(|_| Error::new(ErrorKind::InvalidParam, "too many columns for one sheet"))
}

fn new_excel() -> Arc<dyn Renderer> {
    Arc::new(Excel)
}

inventory::submit! {
    RendererRegistration { name: "excel", create: new_excel }
}
