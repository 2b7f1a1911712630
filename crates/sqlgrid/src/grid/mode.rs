//! Request modes and the per-mode values grid fields carry.

use std::fmt;

use http::Method;
use serde::{Serialize, Serializer};

use crate::error::{Error, ErrorKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Create,
    Update,
    Delete,
    Callback,
    Head,
    Table,
    Details,
    UpdateView,
    CreateView,
    Export,
}

impl Mode {
    /// Resolve the mode from the HTTP method and the `mode` query parameter.
    pub fn detect(method: &Method, param: Option<&str>) -> Result<Mode> {
        let param = param.map(str::trim).filter(|p| !p.is_empty());
        let mode = match (method.as_str(), param) {
            ("GET", None) => Mode::Table,
            ("GET", Some("head")) => Mode::Head,
            ("GET", Some("callback")) => Mode::Callback,
            ("GET", Some("create")) => Mode::CreateView,
            ("GET", Some("update")) => Mode::UpdateView,
            ("GET", Some("details")) => Mode::Details,
            ("GET", Some("export")) => Mode::Export,
            ("POST", None) => Mode::Create,
            ("PUT", None) => Mode::Update,
            ("DELETE", None) => Mode::Delete,
            (method, param) => {
                return Err(Error::new(
                    ErrorKind::UnknownMode,
                    format!("{method} with mode `{}`", param.unwrap_or_default()),
                ));
            }
        };
        Ok(mode)
    }

    /// The field view a mode renders with.
    pub fn field_mode(self) -> FieldMode {
        match self {
            Mode::Create | Mode::CreateView => FieldMode::Create,
            Mode::Update | Mode::UpdateView => FieldMode::Update,
            Mode::Details => FieldMode::Details,
            Mode::Export => FieldMode::Export,
            Mode::Delete | Mode::Callback | Mode::Head | Mode::Table => FieldMode::Table,
        }
    }

    /// Modes that address one row by its primary key(s).
    pub fn needs_primary(self) -> bool {
        matches!(self, Mode::Details | Mode::UpdateView | Mode::Update | Mode::Delete)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Create => "create",
            Mode::Update => "update",
            Mode::Delete => "delete",
            Mode::Callback => "callback",
            Mode::Head => "head",
            Mode::Table => "table",
            Mode::Details => "details",
            Mode::UpdateView => "update_view",
            Mode::CreateView => "create_view",
            Mode::Export => "export",
        })
    }
}

/// The five views a field can look different in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldMode {
    Table,
    Create,
    Update,
    Details,
    Export,
}

impl FieldMode {
    pub const ALL: [FieldMode; 5] = [
        FieldMode::Table,
        FieldMode::Create,
        FieldMode::Update,
        FieldMode::Details,
        FieldMode::Export,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// One value per [`FieldMode`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeValue<T> {
    values: [T; 5],
}

impl<T: Clone> ModeValue<T> {
    /// The same value in every mode.
    pub fn all(value: T) -> Self {
        Self {
            values: [value.clone(), value.clone(), value.clone(), value.clone(), value],
        }
    }

    pub fn get(&self, mode: FieldMode) -> &T {
        &self.values[mode.index()]
    }

    pub fn set(&mut self, mode: FieldMode, value: T) -> &mut Self {
        self.values[mode.index()] = value;
        self
    }

    pub fn set_all(&mut self, value: T) -> &mut Self {
        *self = Self::all(value);
        self
    }
}

impl<T: Serialize> Serialize for ModeValue<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(5))?;
        for (name, value) in ["table", "create", "update", "details", "export"].iter().zip(&self.values) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
