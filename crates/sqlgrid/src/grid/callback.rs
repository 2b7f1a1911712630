//! Per-field value callbacks applied to rendered rows.
//!
//! A callback sees the object that holds its field (the row itself for
//! top-level fields, the related object for `radio.brand`) and its result
//! replaces the field's value there. Under a to-many relation it runs once
//! per element.

use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::{Map, Value as Json};

use crate::error::Result;
use crate::grid::field::Field;

pub type CallbackFn = dyn Fn(&Map<String, Json>, &[Json]) -> Result<Json> + Send + Sync;

#[derive(Clone)]
pub struct FieldCallback {
    func: Arc<CallbackFn>,
    args: Vec<Json>,
}

impl fmt::Debug for FieldCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCallback").field("args", &self.args).finish_non_exhaustive()
    }
}

impl FieldCallback {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&Map<String, Json>, &[Json]) -> Result<Json> + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
            args: Vec::new(),
        }
    }

    /// Extra arguments handed to every invocation.
    pub fn with_args(mut self, args: Vec<Json>) -> Self {
        self.args = args;
        self
    }

    pub fn call(&self, row: &Map<String, Json>) -> Result<Json> {
        (self.func)(row, &self.args)
    }
}

/// Interpolate `{{path}}` placeholders from the row.
///
/// A path that crosses a relation array repeats the whole template once per
/// element, joined with `, `.
pub fn decorator(format: &str, html_escape: bool) -> FieldCallback {
    let format = format.to_owned();
    FieldCallback::new(move |row, _| Ok(Json::String(interpolate(&format, row, html_escape))))
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([\w.]+)\s*\}\}").expect("invalid built-in placeholder regex")
    })
}

pub fn interpolate(format: &str, row: &Map<String, Json>, html_escape: bool) -> String {
    let paths: Vec<&str> = placeholder()
        .captures_iter(format)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();

    if let Some((prefix, items)) = paths.iter().find_map(|p| first_array(row, p)) {
        return items
            .iter()
            .map(|item| {
                render(format, html_escape, |path| {
                    match path.strip_prefix(prefix).and_then(|rest| rest.strip_prefix('.')) {
                        Some(rest) => lookup_text(item, rest),
                        None => lookup_text(&Json::Object(row.clone()), path),
                    }
                })
            })
            .collect::<Vec<_>>()
            .join(", ");
    }
    let root = Json::Object(row.clone());
    render(format, html_escape, |path| lookup_text(&root, path))
}

fn render(format: &str, html_escape: bool, resolve: impl Fn(&str) -> String) -> String {
    placeholder()
        .replace_all(format, |caps: &regex::Captures<'_>| {
            let text = resolve(&caps[1]);
            if html_escape { escape(&text) } else { text }
        })
        .into_owned()
}

/// The first array met while walking `path`, with the prefix that reaches it.
fn first_array<'a, 'p>(row: &'a Map<String, Json>, path: &'p str) -> Option<(&'p str, &'a Vec<Json>)> {
    let mut current = row;
    let mut consumed = 0;
    for segment in path.split('.') {
        consumed += segment.len();
        match current.get(segment)? {
            Json::Array(items) if consumed < path.len() => return Some((&path[..consumed], items)),
            Json::Object(next) => current = next,
            _ => return None,
        }
        consumed += 1;
    }
    None
}

fn lookup_text(value: &Json, path: &str) -> String {
    let mut current = value;
    for (idx, segment) in path.split('.').enumerate() {
        match current {
            Json::Object(map) => match map.get(segment) {
                Some(next) => current = next,
                None => return String::new(),
            },
            Json::Array(items) => {
                let rest: Vec<&str> = path.split('.').skip(idx).collect();
                return items
                    .iter()
                    .map(|item| lookup_text(item, &rest.join(".")))
                    .collect::<Vec<_>>()
                    .join(", ");
            }
            _ => return String::new(),
        }
    }
    text(current)
}

/// Plain-text form of a JSON value.
pub fn text(value: &Json) -> String {
    match value {
        Json::Null => String::new(),
        Json::String(s) => s.clone(),
        Json::Array(items) => items.iter().map(text).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Run every field callback over `row`, deepest paths first.
pub fn apply(fields: &[Field], row: &mut Json) -> Result<()> {
    let mut callbacks: Vec<(&str, &FieldCallback)> = Vec::new();
    collect(fields, &mut callbacks);
    callbacks.sort_by_key(|(id, _)| std::cmp::Reverse(id.matches('.').count()));

    for (id, callback) in callbacks {
        let segments: Vec<&str> = id.split('.').collect();
        apply_at(row, &segments, callback)?;
    }
    Ok(())
}

fn collect<'a>(fields: &'a [Field], out: &mut Vec<(&'a str, &'a FieldCallback)>) {
    for field in fields {
        if let Some(callback) = &field.callback {
            out.push((field.id.as_str(), callback));
        }
        collect(&field.fields, out);
    }
}

fn apply_at(value: &mut Json, segments: &[&str], callback: &FieldCallback) -> Result<()> {
    match value {
        Json::Array(items) => {
            for item in items {
                apply_at(item, segments, callback)?;
            }
            Ok(())
        }
        Json::Object(map) => match segments {
            [] => Ok(()),
            [last] => {
                let replaced = callback.call(map)?;
                map.insert((*last).to_owned(), replaced);
                Ok(())
            }
            [head, rest @ ..] => match map.get_mut(*head) {
                Some(next) => apply_at(next, rest, callback),
                None => Ok(()),
            },
        },
        _ => Ok(()),
    }
}
