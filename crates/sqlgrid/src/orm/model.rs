//! Static model descriptions produced by `#[derive(Model)]`.
//!
//! The derive emits a [`ModelDescriptor`] (fields, relations, table hints)
//! and value accessors. Everything that needs the database, such as column
//! types, primaries reported by the schema and join-table checks, happens
//! later in [`init`](crate::orm::metadata::init).

use std::fmt;

use crate::error::{Error, ErrorKind, Result};
use crate::orm::field::Permission;
use crate::orm::record::{Record, RelationData};
use crate::value::Value;

/// Runtime handle to a model type.
#[derive(Clone, Copy)]
pub struct ModelType {
    name: fn() -> &'static str,
    describe: fn() -> ModelDescriptor,
}

impl ModelType {
    pub fn of<M: Model>() -> Self {
        Self {
            name: std::any::type_name::<M>,
            describe: M::descriptor,
        }
    }

    /// Fully qualified type name; the identity used for caching and cycle checks.
    pub fn name(&self) -> &'static str {
        (self.name)()
    }

    pub fn descriptor(&self) -> ModelDescriptor {
        (self.describe)()
    }
}

impl PartialEq for ModelType {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for ModelType {}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModelType").field(&self.name()).finish()
    }
}

#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    /// Struct name as written, e.g. `UserGrid`.
    pub name: &'static str,
    pub type_name: &'static str,
    pub table: Option<&'static str>,
    pub database: Option<&'static str>,
    pub strategy: Option<&'static str>,
    pub fields: Vec<FieldDecl>,
    pub relations: Vec<RelationDecl>,
}

impl ModelDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDecl> {
        self.relations.iter().find(|r| r.field == name)
    }

    /// Fields tagged `primary`, falling back to a field called `id`.
    pub fn primaries(&self) -> Vec<&FieldDecl> {
        let tagged: Vec<_> = self.fields.iter().filter(|f| f.primary).collect();
        if !tagged.is_empty() {
            return tagged;
        }
        self.field("id").into_iter().collect()
    }
}

/// One scalar struct field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: &'static str,
    pub column: Option<&'static str>,
    pub primary: bool,
    pub custom: bool,
    pub permission: Permission,
    pub select: Option<&'static str>,
    pub validator: Option<&'static str>,
}

impl FieldDecl {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            column: None,
            primary: false,
            custom: false,
            permission: Permission::ALL,
            select: None,
            validator: None,
        }
    }

    pub fn column_name(&self) -> &'static str {
        self.column.unwrap_or(self.name)
    }
}

/// One relation field (`Option<T>`, `Option<Box<T>>` or `Vec<T>`).
#[derive(Debug, Clone)]
pub struct RelationDecl {
    pub field: &'static str,
    /// Kind as written on the attribute; `None` infers from `many`.
    pub kind: Option<&'static str>,
    pub many: bool,
    pub model: ModelType,
    pub fk: Option<&'static str>,
    pub afk: Option<&'static str>,
    pub join_table: Option<&'static str>,
    pub join_fk: Option<&'static str>,
    pub join_afk: Option<&'static str>,
    pub polymorphic: Option<&'static str>,
    pub polymorphic_value: Option<&'static str>,
    pub permission: Permission,
    pub custom: bool,
}

impl RelationDecl {
    pub fn new(field: &'static str, many: bool, model: ModelType) -> Self {
        Self {
            field,
            kind: None,
            many,
            model,
            fk: None,
            afk: None,
            join_table: None,
            join_fk: None,
            join_afk: None,
            polymorphic: None,
            polymorphic_value: None,
            permission: Permission::ALL,
            custom: false,
        }
    }
}

/// Scalar field access, derived for models and for `#[orm(flatten)]` embeds.
pub trait ModelFields {
    fn field_decls() -> Vec<FieldDecl>;

    fn has_field(field: &str) -> bool {
        Self::field_decls().iter().any(|f| f.name == field)
    }

    fn get_value(&self, field: &str) -> Option<Value>;

    /// Assign `value`; `Ok(false)` when the field does not exist.
    fn set_value(&mut self, field: &str, value: Value) -> Result<bool>;
}

/// A persisted struct with relations.
pub trait Model: ModelFields + Default + Clone + Send + Sync + 'static {
    fn descriptor() -> ModelDescriptor;

    fn get_relation(&self, field: &str) -> Option<RelationData>;

    fn set_relation(&mut self, field: &str, data: RelationData) -> Result<bool>;

    fn to_record(&self) -> Record {
        let descriptor = Self::descriptor();
        let mut record = Record::default();
        for decl in &descriptor.fields {
            if let Some(value) = self.get_value(decl.name) {
                record.fields.insert(decl.name.to_owned(), value);
            }
        }
        for decl in &descriptor.relations {
            if let Some(data) = self.get_relation(decl.field) {
                record.relations.insert(decl.field.to_owned(), data);
            }
        }
        record
    }

    /// Overwrite the fields and relations present in `record`.
    fn apply_record(&mut self, record: &Record) -> Result<()> {
        for (name, value) in &record.fields {
            if !self.set_value(name, value.clone())? {
                return Err(Error::new(
                    ErrorKind::MissingStructField,
                    format!("`{}` has no field `{name}`", Self::descriptor().name),
                ));
            }
        }
        for (name, data) in &record.relations {
            if !self.set_relation(name, data.clone())? {
                return Err(Error::new(
                    ErrorKind::MissingStructField,
                    format!("`{}` has no relation `{name}`", Self::descriptor().name),
                ));
            }
        }
        Ok(())
    }

    fn from_record(record: &Record) -> Result<Self> {
        let mut model = Self::default();
        model.apply_record(record)?;
        Ok(model)
    }
}

/// Container types allowed on relation fields.
pub trait RelationField: Sized {
    const MANY: bool;

    fn model_type() -> ModelType;

    fn to_relation(&self) -> RelationData;

    fn from_relation(data: RelationData) -> Result<Self>;
}

fn shape_mismatch(expected: &str) -> Error {
    Error::new(ErrorKind::RelationKind, format!("relation data is not {expected}"))
}

impl<T: Model> RelationField for Option<T> {
    const MANY: bool = false;

    fn model_type() -> ModelType {
        ModelType::of::<T>()
    }

    fn to_relation(&self) -> RelationData {
        RelationData::One(self.as_ref().map(|m| Box::new(m.to_record())))
    }

    fn from_relation(data: RelationData) -> Result<Self> {
        match data {
            RelationData::One(None) => Ok(None),
            RelationData::One(Some(record)) => T::from_record(&record).map(Some),
            RelationData::Many(_) => Err(shape_mismatch("a single record")),
        }
    }
}

impl<T: Model> RelationField for Option<Box<T>> {
    const MANY: bool = false;

    fn model_type() -> ModelType {
        ModelType::of::<T>()
    }

    fn to_relation(&self) -> RelationData {
        RelationData::One(self.as_ref().map(|m| Box::new(m.to_record())))
    }

    fn from_relation(data: RelationData) -> Result<Self> {
        <Option<T> as RelationField>::from_relation(data).map(|m| m.map(Box::new))
    }
}

impl<T: Model> RelationField for Vec<T> {
    const MANY: bool = true;

    fn model_type() -> ModelType {
        ModelType::of::<T>()
    }

    fn to_relation(&self) -> RelationData {
        RelationData::Many(self.iter().map(Model::to_record).collect())
    }

    fn from_relation(data: RelationData) -> Result<Self> {
        match data {
            RelationData::Many(records) => records.iter().map(T::from_record).collect(),
            RelationData::One(_) => Err(shape_mismatch("a list of records")),
        }
    }
}
