//! Grid column definitions.

use std::collections::BTreeMap;

use serde_json::json;

use crate::grid::callback::FieldCallback;
use crate::grid::mode::{FieldMode, ModeValue};

/// A column the grid can show, sort, filter and edit.
///
/// `id` is the dot path of the value inside a row (`brand`, `radio.brand`);
/// `reference_id` is the physical column conditions are written against.
#[derive(Debug, Clone, Default)]
pub struct Field {
    pub id: String,
    pub reference_id: String,
    pub primary: bool,
    pub field_type: String,
    pub title: ModeValue<String>,
    pub description: ModeValue<String>,
    pub position: ModeValue<i64>,
    pub remove: ModeValue<bool>,
    pub hidden: ModeValue<bool>,
    pub view: ModeValue<String>,
    pub read_only: bool,
    pub sortable: bool,
    pub filterable: bool,
    pub groupable: bool,
    pub options: BTreeMap<String, serde_json::Value>,
    pub callback: Option<FieldCallback>,
    pub fields: Vec<Field>,
}

impl Field {
    pub fn new(id: impl Into<String>, field_type: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            reference_id: id.clone(),
            title: ModeValue::all(title_case(leaf(&id))),
            field_type: field_type.into(),
            id,
            ..Self::default()
        }
    }

    pub fn set_title(&mut self, title: &str) -> &mut Self {
        self.title.set_all(title.to_owned());
        self
    }

    pub fn set_description(&mut self, description: &str) -> &mut Self {
        self.description.set_all(description.to_owned());
        self
    }

    pub fn set_position(&mut self, position: i64) -> &mut Self {
        self.position.set_all(position);
        self
    }

    pub fn set_remove(&mut self, remove: bool) -> &mut Self {
        self.remove.set_all(remove);
        self
    }

    pub fn set_remove_in(&mut self, mode: FieldMode, remove: bool) -> &mut Self {
        self.remove.set(mode, remove);
        self
    }

    pub fn set_hidden(&mut self, hidden: bool) -> &mut Self {
        self.hidden.set_all(hidden);
        self
    }

    pub fn set_view(&mut self, view: &str) -> &mut Self {
        self.view.set_all(view.to_owned());
        self
    }

    pub fn set_option(&mut self, key: &str, value: serde_json::Value) -> &mut Self {
        self.options.insert(key.to_owned(), value);
        self
    }

    pub fn set_callback(&mut self, callback: FieldCallback) -> &mut Self {
        self.callback = Some(callback);
        self
    }

    pub fn is_removed(&self, mode: FieldMode) -> bool {
        *self.remove.get(mode)
    }

    /// The field as `head` shows it in `mode`; removed children are left out.
    pub fn head(&self, mode: FieldMode) -> serde_json::Value {
        let children: Vec<serde_json::Value> = sorted(&self.fields, mode)
            .into_iter()
            .map(|f| f.head(mode))
            .collect();
        json!({
            "id": self.id,
            "type": self.field_type,
            "primary": self.primary,
            "title": self.title.get(mode),
            "description": self.description.get(mode),
            "position": self.position.get(mode),
            "hidden": self.hidden.get(mode),
            "view": self.view.get(mode),
            "readOnly": self.read_only,
            "sortable": self.sortable,
            "filterable": self.filterable,
            "groupable": self.groupable,
            "options": self.options,
            "fields": children,
        })
    }
}

/// Fields visible in `mode`, ordered by their position there.
pub fn sorted(fields: &[Field], mode: FieldMode) -> Vec<&Field> {
    let mut visible: Vec<&Field> = fields.iter().filter(|f| !f.is_removed(mode)).collect();
    visible.sort_by_key(|f| *f.position.get(mode));
    visible
}

/// Find a field by its dot path, descending into children.
pub fn find<'a>(fields: &'a [Field], id: &str) -> Option<&'a Field> {
    fields.iter().find_map(|f| {
        if f.id == id {
            Some(f)
        } else {
            find(&f.fields, id)
        }
    })
}

pub fn find_mut<'a>(fields: &'a mut [Field], id: &str) -> Option<&'a mut Field> {
    for field in fields.iter_mut() {
        if field.id == id {
            return Some(field);
        }
        if let Some(found) = find_mut(&mut field.fields, id) {
            return Some(found);
        }
    }
    None
}

fn leaf(id: &str) -> &str {
    id.rsplit('.').next().unwrap_or(id)
}

/// `owner_id` becomes `Owner Id`.
fn title_case(name: &str) -> String {
    name.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fields() -> Vec<Field> {
        let mut id = Field::new("id", "Integer");
        id.set_position(1);
        let mut name = Field::new("first_name", "Text");
        name.set_position(0);
        let mut radio = Field::new("radio", "Relation");
        radio.set_position(2);
        radio.fields.push(Field::new("radio.brand", "Text"));
        vec![id, name, radio]
    }

    #[test]
    fn titles_come_from_the_leaf_name() {
        assert_eq!(Field::new("owner_id", "Integer").title.get(FieldMode::Table), "Owner Id");
        assert_eq!(Field::new("radio.brand", "Text").title.get(FieldMode::Details), "Brand");
    }

    #[test]
    fn sorting_respects_mode_and_removal() {
        let mut fields = fields();
        fields[0].set_remove_in(FieldMode::Export, true);

        let ids: Vec<&str> = sorted(&fields, FieldMode::Table).iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, ["first_name", "id", "radio"]);
        let ids: Vec<&str> = sorted(&fields, FieldMode::Export).iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, ["first_name", "radio"]);
    }

    #[test]
    fn nested_lookup() {
        let mut fields = fields();
        assert_eq!(find(&fields, "radio.brand").map(|f| f.field_type.as_str()), Some("Text"));
        find_mut(&mut fields, "radio.brand").unwrap().set_title("Radio");
        let head = fields[2].head(FieldMode::Table);
        assert_eq!(head["fields"][0]["title"], "Radio");
        assert!(find(&fields, "radio.volume").is_none());
    }
}
