//! Per-call field and relation permission masks.

use std::collections::BTreeSet;

use crate::orm::field::Permission;
use crate::orm::metadata::Metadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Whitelist,
    Blacklist,
}

/// Dot-notated field paths (`brand`, `radio.brand`) under one policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WbList {
    pub policy: Policy,
    pub fields: Vec<String>,
}

impl WbList {
    pub fn whitelist<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            policy: Policy::Whitelist,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn blacklist<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            policy: Policy::Blacklist,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    fn leaves(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str).filter(|f| !f.contains('.'))
    }

    /// Relations named by a dotted path, i.e. touched below this level.
    fn touched(&self) -> BTreeSet<&str> {
        self.fields
            .iter()
            .filter_map(|f| f.split_once('.').map(|(head, _)| head))
            .collect()
    }

    /// The list forwarded to `relation`'s scope.
    ///
    /// A whitelist naming the relation itself grants all of it, so the
    /// child gets no list at all.
    pub fn child(&self, relation: &str) -> Option<WbList> {
        if self.policy == Policy::Whitelist && self.leaves().any(|f| f == relation) {
            return None;
        }
        let fields: Vec<String> = self
            .fields
            .iter()
            .filter_map(|f| f.split_once('.'))
            .filter(|(head, _)| *head == relation)
            .map(|(_, rest)| rest.to_owned())
            .collect();
        if fields.is_empty() && self.policy == Policy::Blacklist {
            return None;
        }
        Some(WbList {
            policy: self.policy,
            fields,
        })
    }

    /// Mask `metadata` in place.
    ///
    /// Primaries, the caller-side key of every granted relation and the
    /// `mandatory` names (target-side keys handed down by the parent scope)
    /// always stay readable.
    pub fn apply(&self, metadata: &mut Metadata, mandatory: &[String]) {
        let leaves: BTreeSet<&str> = self.leaves().collect();
        let touched = self.touched();

        for relation in &mut metadata.relations {
            let name = relation.field.as_str();
            relation.permission = match self.policy {
                Policy::Whitelist if leaves.contains(name) || touched.contains(name) => relation.declared,
                Policy::Whitelist => Permission::NONE,
                Policy::Blacklist if leaves.contains(name) => Permission::NONE,
                Policy::Blacklist => relation.declared,
            };
        }

        let mut keep: BTreeSet<String> = mandatory.iter().cloned().collect();
        for relation in metadata.relations.iter().filter(|r| r.permission.read || r.permission.write) {
            keep.insert(relation.foreign_key.name.clone());
        }

        for field in &mut metadata.fields {
            let listed = leaves.contains(field.name.as_str());
            field.permission = match self.policy {
                Policy::Whitelist if listed => field.declared,
                Policy::Whitelist => Permission::NONE,
                Policy::Blacklist if listed => Permission::NONE,
                Policy::Blacklist => field.declared,
            };
            if field.is_primary() || keep.contains(&field.name) {
                field.permission = Permission {
                    read: true,
                    write: field.declared.write,
                };
            }
        }
    }
}

/// Restore every declared permission, then apply `list` if any.
pub fn mask(metadata: &mut Metadata, list: Option<&WbList>, mandatory: &[String]) {
    for field in &mut metadata.fields {
        field.permission = field.declared;
    }
    for relation in &mut metadata.relations {
        relation.permission = relation.declared;
    }
    match list {
        Some(list) => list.apply(metadata, mandatory),
        None => {
            for field in metadata.fields.iter_mut().filter(|f| mandatory.contains(&f.name)) {
                field.permission.read = true;
            }
        }
    }
}
