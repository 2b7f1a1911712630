//! Dynamic object graph exchanged between models, strategies and the grid.

use std::collections::BTreeMap;

use crate::error::{Error, ErrorKind, Result};
use crate::orm::model::ModelDescriptor;
use crate::value::Value;

/// Field values keyed by Rust field name, plus loaded relations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub fields: BTreeMap<String, Value>,
    pub relations: BTreeMap<String, RelationData>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelationData {
    One(Option<Box<Record>>),
    Many(Vec<Record>),
}

impl RelationData {
    pub fn records(&self) -> Vec<&Record> {
        match self {
            RelationData::One(one) => one.iter().map(|r| r.as_ref()).collect(),
            RelationData::Many(many) => many.iter().collect(),
        }
    }

    pub fn records_mut(&mut self) -> Vec<&mut Record> {
        match self {
            RelationData::One(one) => one.iter_mut().map(|r| r.as_mut()).collect(),
            RelationData::Many(many) => many.iter_mut().collect(),
        }
    }
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(field.to_owned(), value.into());
        self
    }

    pub fn relation(&self, field: &str) -> Option<&RelationData> {
        self.relations.get(field)
    }

    /// JSON object with fields first, then relations (`null`, object or array).
    pub fn to_json(&self) -> serde_json::Value {
        let mut out = serde_json::Map::new();
        for (name, value) in &self.fields {
            out.insert(name.clone(), value.to_json());
        }
        for (name, data) in &self.relations {
            let json = match data {
                RelationData::One(None) => serde_json::Value::Null,
                RelationData::One(Some(record)) => record.to_json(),
                RelationData::Many(records) => {
                    serde_json::Value::Array(records.iter().map(Record::to_json).collect())
                }
            };
            out.insert(name.clone(), json);
        }
        serde_json::Value::Object(out)
    }

    /// Parse a JSON object against `descriptor`; unknown keys are rejected.
    pub fn from_json(descriptor: &ModelDescriptor, json: &serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(map) = json else {
            return Err(Error::new(
                ErrorKind::JsonInvalid,
                format!("`{}` expects a JSON object", descriptor.name),
            ));
        };

        let mut record = Record::default();
        for (key, value) in map {
            if descriptor.field(key).is_some() {
                record.fields.insert(key.clone(), Value::from_json(value));
                continue;
            }
            let Some(relation) = descriptor.relation(key) else {
                return Err(Error::new(
                    ErrorKind::JsonInvalid,
                    format!("unknown key `{key}` for `{}`", descriptor.name),
                ));
            };
            let target = relation.model.descriptor();
            let data = match value {
                serde_json::Value::Null if relation.many => RelationData::Many(Vec::new()),
                serde_json::Value::Null => RelationData::One(None),
                serde_json::Value::Array(items) if relation.many => RelationData::Many(
                    items
                        .iter()
                        .map(|item| Record::from_json(&target, item))
                        .collect::<Result<_>>()?,
                ),
                serde_json::Value::Object(_) if !relation.many => {
                    RelationData::One(Some(Box::new(Record::from_json(&target, value)?)))
                }
                _ => {
                    return Err(Error::new(
                        ErrorKind::JsonInvalid,
                        format!("relation `{key}` has the wrong shape"),
                    ));
                }
            };
            record.relations.insert(key.clone(), data);
        }
        Ok(record)
    }
}
