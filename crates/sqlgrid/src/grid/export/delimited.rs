//! `;`-separated CSV.

use std::sync::Arc;

use crate::error::{Error, ErrorKind, Result};
use crate::grid::export::{Renderer, RendererRegistration, Table};

#[derive(Debug, Clone, Copy)]
pub struct Csv {
    pub delimiter: u8,
}

impl Default for Csv {
    fn default() -> Self {
        Self { delimiter: b';' }
    }
}

fn write_failed(err: impl std::fmt::Display) -> Error {
    Error::new(ErrorKind::Driver, format!("csv export: {err}"))
}

impl Renderer for Csv {
    fn content_type(&self) -> &'static str {
        "text/csv"
    }

    fn extension(&self) -> &'static str {
        "csv"
    }

    fn render(&self, table: &Table) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(Vec::new());
        writer.write_record(&table.titles).map_err(write_failed)?;
        for row in &table.rows {
            writer.write_record(row).map_err(write_failed)?;
        }
        writer.into_inner().map_err(write_failed)
    }
}

fn new_csv() -> Arc<dyn Renderer> {
    Arc::new(Csv::default())
}

inventory::submit! {
    RendererRegistration { name: "csv", create: new_csv }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn semicolon_separated_with_quoting() {
        let table = Table {
            titles: vec!["Id".into(), "Brand".into()],
            rows: vec![
                vec!["1".into(), "BMW".into()],
                vec!["2".into(), "Rolls; Royce".into()],
            ],
        };
        let out = Csv::default().render(&table).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Id;Brand\n1;BMW\n2;\"Rolls; Royce\"\n");
    }
}
