//! Per-grid settings, serialized into table responses.

use serde::{Deserialize, Serialize};

use crate::grid::mode::Mode;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Allowed export types; empty allows every registered renderer.
    pub exports: Vec<String>,
    pub action: ActionConfig,
    pub filter: FilterConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionConfig {
    pub position_left: bool,
    pub disable_create: bool,
    pub disable_update: bool,
    pub disable_delete: bool,
    pub disable_details: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub disable: bool,
    /// Apply the user's saved default view to table requests.
    pub allow_saved: bool,
}

impl GridConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Whether the action switches turn `mode` off.
    pub fn disables(&self, mode: Mode) -> bool {
        match mode {
            Mode::Create | Mode::CreateView => self.action.disable_create,
            Mode::Update | Mode::UpdateView => self.action.disable_update,
            Mode::Delete => self.action.disable_delete,
            Mode::Details => self.action.disable_details,
            Mode::Callback | Mode::Head | Mode::Table | Mode::Export => false,
        }
    }

    pub fn allows_export(&self, kind: &str) -> bool {
        self.exports.is_empty() || self.exports.iter().any(|e| e == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_json_fills_defaults() {
        let config: GridConfig = serde_json::from_str(
            r#"{"title": "Cars", "exports": ["csv"], "action": {"disable_delete": true}}"#,
        )
        .unwrap();
        assert_eq!(config.title, "Cars");
        assert!(config.disables(Mode::Delete));
        assert!(!config.disables(Mode::Update));
        assert!(config.allows_export("csv"));
        assert!(!config.allows_export("pdf"));
        assert!(!config.filter.allow_saved);
        assert!(GridConfig::default().allows_export("pdf"));
    }
}
