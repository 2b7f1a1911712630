//! `#[orm(...)]` attribute parsing.

use syn::meta::ParseNestedMeta;
use syn::{DeriveInput, LitStr, Result};

use crate::syn_types::{option_inner, vec_inner};

#[derive(Default)]
pub(crate) struct ModelAttrs {
    pub table: Option<String>,
    pub database: Option<String>,
    pub strategy: Option<String>,
}

fn lit_str(meta: &ParseNestedMeta) -> Result<String> {
    let lit: LitStr = meta.value()?.parse()?;
    Ok(lit.value())
}

/// Struct-level `#[orm(table = "..", database = "..", strategy = "..")]`.
pub(crate) fn model_attrs(input: &DeriveInput) -> Result<ModelAttrs> {
    let mut attrs = ModelAttrs::default();
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("orm")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                attrs.table = Some(lit_str(&meta)?);
            } else if meta.path.is_ident("database") {
                attrs.database = Some(lit_str(&meta)?);
            } else if meta.path.is_ident("strategy") {
                attrs.strategy = Some(lit_str(&meta)?);
            } else {
                return Err(meta.error("expected `table`, `database` or `strategy`"));
            }
            Ok(())
        })?;
    }
    Ok(attrs)
}

#[derive(Default)]
pub(crate) struct RelationAttrs {
    /// Spelled kind; `None` for a bare `relation` (inferred from the type).
    pub kind: Option<String>,
    pub fk: Option<String>,
    pub afk: Option<String>,
    pub join_table: Option<String>,
    pub join_fk: Option<String>,
    pub join_afk: Option<String>,
    pub polymorphic: Option<String>,
    pub polymorphic_value: Option<String>,
}

pub(crate) enum FieldKind {
    Scalar,
    Flatten,
    Skip,
    Relation(RelationAttrs),
}

pub(crate) struct FieldAttrs {
    pub column: Option<String>,
    pub primary: bool,
    pub custom: bool,
    pub read: bool,
    pub write: bool,
    pub select: Option<String>,
    pub validate: Option<String>,
    pub kind: FieldKind,
}

impl Default for FieldAttrs {
    fn default() -> Self {
        Self {
            column: None,
            primary: false,
            custom: false,
            read: true,
            write: true,
            select: None,
            validate: None,
            kind: FieldKind::Scalar,
        }
    }
}

pub(crate) struct ParsedField {
    pub ident: syn::Ident,
    pub name: String,
    pub ty: syn::Type,
    pub attrs: FieldAttrs,
}

pub(crate) fn field_attrs(field: &syn::Field) -> Result<FieldAttrs> {
    let mut attrs = FieldAttrs::default();
    let mut relation: Option<RelationAttrs> = None;
    let mut relation_keys = RelationAttrs::default();
    let mut flatten = false;
    let mut skip = false;

    for attr in field.attrs.iter().filter(|a| a.path().is_ident("orm")) {
        attr.parse_nested_meta(|meta| {
            let path = &meta.path;
            if path.is_ident("primary") {
                attrs.primary = true;
            } else if path.is_ident("custom") {
                attrs.custom = true;
            } else if path.is_ident("skip") {
                skip = true;
            } else if path.is_ident("flatten") {
                flatten = true;
            } else if path.is_ident("column") {
                attrs.column = Some(lit_str(&meta)?);
            } else if path.is_ident("select") {
                attrs.select = Some(lit_str(&meta)?);
            } else if path.is_ident("validate") {
                attrs.validate = Some(lit_str(&meta)?);
            } else if path.is_ident("permission") {
                let (read, write) = if meta.input.peek(syn::Token![=]) {
                    match lit_str(&meta)?.as_str() {
                        "r" => (true, false),
                        "w" => (false, true),
                        "rw" | "wr" => (true, true),
                        "" => (false, false),
                        _ => return Err(meta.error("permission must be \"r\", \"w\" or \"rw\"")),
                    }
                } else {
                    (false, false)
                };
                attrs.read = read;
                attrs.write = write;
            } else if ["has_one", "belongs_to", "has_many", "many_to_many"]
                .iter()
                .any(|k| path.is_ident(k))
            {
                let kind = path.get_ident().map(ToString::to_string);
                relation.get_or_insert_with(RelationAttrs::default).kind = kind;
            } else if path.is_ident("relation") {
                let kind = if meta.input.peek(syn::Token![=]) {
                    Some(lit_str(&meta)?)
                } else {
                    None
                };
                relation.get_or_insert_with(RelationAttrs::default).kind = kind;
            } else if path.is_ident("fk") {
                relation_keys.fk = Some(lit_str(&meta)?);
            } else if path.is_ident("afk") {
                relation_keys.afk = Some(lit_str(&meta)?);
            } else if path.is_ident("join_table") {
                relation_keys.join_table = Some(lit_str(&meta)?);
            } else if path.is_ident("join_fk") {
                relation_keys.join_fk = Some(lit_str(&meta)?);
            } else if path.is_ident("join_afk") {
                relation_keys.join_afk = Some(lit_str(&meta)?);
            } else if path.is_ident("polymorphic") {
                relation_keys.polymorphic = Some(lit_str(&meta)?);
            } else if path.is_ident("polymorphic_value") {
                relation_keys.polymorphic_value = Some(lit_str(&meta)?);
            } else {
                return Err(meta.error("unknown field attribute"));
            }
            Ok(())
        })?;
    }

    attrs.kind = match (relation, flatten, skip) {
        (_, _, true) => FieldKind::Skip,
        (Some(_), true, _) => {
            return Err(syn::Error::new_spanned(field, "a relation cannot be flattened"));
        }
        (Some(kind), false, _) => {
            if option_inner(&field.ty).is_none() && vec_inner(&field.ty).is_none() {
                return Err(syn::Error::new_spanned(
                    &field.ty,
                    "relation fields must be Option<T>, Option<Box<T>> or Vec<T>",
                ));
            }
            FieldKind::Relation(RelationAttrs {
                kind: kind.kind,
                ..relation_keys
            })
        }
        (None, true, _) => FieldKind::Flatten,
        (None, false, _) => {
            let has_keys = relation_keys.fk.is_some()
                || relation_keys.afk.is_some()
                || relation_keys.join_table.is_some()
                || relation_keys.polymorphic.is_some();
            if has_keys {
                return Err(syn::Error::new_spanned(
                    field,
                    "relation keys need a relation kind such as `has_one` or `relation`",
                ));
            }
            FieldKind::Scalar
        }
    };
    Ok(attrs)
}

/// Named fields of a struct with their parsed attributes.
pub(crate) fn parse_fields(input: &DeriveInput) -> Result<Vec<ParsedField>> {
    let syn::Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(input, "only structs can be derived"));
    };
    let syn::Fields::Named(named) = &data.fields else {
        return Err(syn::Error::new_spanned(input, "only structs with named fields are supported"));
    };
    named
        .named
        .iter()
        .map(|field| {
            let ident = field
                .ident
                .clone()
                .ok_or_else(|| syn::Error::new_spanned(field, "unnamed field"))?;
            Ok(ParsedField {
                name: syn::ext::IdentExt::unraw(&ident).to_string(),
                ident,
                ty: field.ty.clone(),
                attrs: field_attrs(field)?,
            })
        })
        .collect()
}
