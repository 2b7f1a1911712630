//! Export renderers, looked up by the `type` request parameter.
//!
//! `csv`, `excel` and `pdf` are built in with the `export` feature. More can
//! be added with [`register`].

use std::sync::{Arc, OnceLock};

use serde_json::Value as Json;

use crate::error::{Error, ErrorKind, Result};
use crate::grid::callback::text;
use crate::registry::Registry;

#[cfg(feature = "export")]
pub mod delimited;
#[cfg(feature = "export")]
pub mod excel;
#[cfg(feature = "export")]
pub mod pdf;

/// Header titles and text cells, one row per exported record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub titles: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Project `data` rows onto `(id, title)` columns; ids are dot paths.
    pub fn build(columns: &[(String, String)], data: &Json) -> Self {
        let rows: Vec<&Json> = match data {
            Json::Array(rows) => rows.iter().collect(),
            Json::Null => Vec::new(),
            single => vec![single],
        };
        Self {
            titles: columns.iter().map(|(_, title)| title.clone()).collect(),
            rows: rows
                .into_iter()
                .map(|row| columns.iter().map(|(id, _)| cell(row, id)).collect())
                .collect(),
        }
    }
}

fn cell(row: &Json, path: &str) -> String {
    match path.split_once('.') {
        None => row.get(path).map(text).unwrap_or_default(),
        Some((head, rest)) => match row.get(head) {
            Some(Json::Array(items)) => items
                .iter()
                .map(|item| cell(item, rest))
                .collect::<Vec<_>>()
                .join(", "),
            Some(nested) => cell(nested, rest),
            None => String::new(),
        },
    }
}

pub trait Renderer: Send + Sync {
    fn content_type(&self) -> &'static str;

    /// File extension of the download.
    fn extension(&self) -> &'static str;

    fn render(&self, table: &Table) -> Result<Vec<u8>>;
}

pub type RendererFactory = fn() -> Arc<dyn Renderer>;

/// Link-time registration of an export renderer.
pub struct RendererRegistration {
    pub name: &'static str,
    pub create: RendererFactory,
}

inventory::collect!(RendererRegistration);

fn renderers() -> &'static Registry<dyn Renderer> {
    static RENDERERS: OnceLock<Registry<dyn Renderer>> = OnceLock::new();
    RENDERERS.get_or_init(|| {
        let registry = Registry::new("export renderer");
        for registration in inventory::iter::<RendererRegistration> {
            if let Err(err) = registry.register(registration.name, (registration.create)()) {
                tracing::warn!(target: "sqlgrid::grid", error = %err, "skipping export renderer");
            }
        }
        registry
    })
}

pub fn register(name: &str, renderer: Arc<dyn Renderer>) -> Result<()> {
    renderers().register(name, renderer)
}

pub fn get(name: &str) -> Result<Arc<dyn Renderer>> {
    renderers()
        .get(name)
        .ok_or_else(|| Error::new(ErrorKind::UnknownProvider, format!("export renderer `{name}`")))
}

pub fn names() -> Vec<String> {
    renderers().names()
}
