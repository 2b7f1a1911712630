//! Resolved ORM relations.

use std::fmt;

use crate::error::{Error, ErrorKind, Result};
use crate::orm::field::{Field, Permission};
use crate::orm::model::ModelType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    HasOne,
    BelongsTo,
    HasMany,
    ManyToMany,
}

impl RelationKind {
    /// Parse an attribute spelling: `has_one`, `HasOne` and `hasone` are all accepted.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized: String = raw
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "hasone" => Ok(RelationKind::HasOne),
            "belongsto" => Ok(RelationKind::BelongsTo),
            "hasmany" => Ok(RelationKind::HasMany),
            "manytomany" => Ok(RelationKind::ManyToMany),
            _ => Err(Error::new(ErrorKind::RelationKind, format!("unknown relation kind `{raw}`"))),
        }
    }

    /// Whether the relation holds a list of targets.
    pub fn is_many(&self) -> bool {
        matches!(self, RelationKind::HasMany | RelationKind::ManyToMany)
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RelationKind::HasOne => "has_one",
            RelationKind::BelongsTo => "belongs_to",
            RelationKind::HasMany => "has_many",
            RelationKind::ManyToMany => "many_to_many",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTable {
    pub name: String,
    /// Column pointing at the caller.
    pub foreign_key: String,
    /// Column pointing at the target.
    pub association_foreign_key: String,
}

/// Target-side id and discriminator columns of a polymorphic relation.
#[derive(Debug, Clone, PartialEq)]
pub struct Polymorphic {
    pub field: Field,
    pub type_field: Field,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub field: String,
    pub kind: RelationKind,
    pub model: ModelType,
    /// Key on the caller.
    pub foreign_key: Field,
    /// Key on the target.
    pub association_foreign_key: Field,
    pub join_table: Option<JoinTable>,
    pub polymorphic: Option<Polymorphic>,
    pub self_reference: bool,
    pub permission: Permission,
    pub declared: Permission,
    pub custom: bool,
}

impl Relation {
    pub fn readable(&self) -> bool {
        !self.custom && self.permission.read
    }

    pub fn writable(&self) -> bool {
        !self.custom && self.permission.write
    }

    /// Target-side fields a loaded child must always carry.
    pub fn target_keys(&self) -> Vec<String> {
        let mut keys = vec![self.association_foreign_key.name.clone()];
        if let Some(poly) = &self.polymorphic {
            keys.push(poly.type_field.name.clone());
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_parse_loosely() {
        assert_eq!(RelationKind::parse("has_one").unwrap(), RelationKind::HasOne);
        assert_eq!(RelationKind::parse("BelongsTo").unwrap(), RelationKind::BelongsTo);
        assert_eq!(RelationKind::parse("many-to-many").unwrap(), RelationKind::ManyToMany);
        assert_eq!(RelationKind::parse("owns").unwrap_err().kind(), ErrorKind::RelationKind);
        assert!(RelationKind::HasMany.is_many());
        assert!(!RelationKind::BelongsTo.is_many());
    }
}
