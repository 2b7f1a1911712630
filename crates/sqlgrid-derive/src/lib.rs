//! Derive macros for sqlgrid
//!
//! Provides `#[derive(Model)]` and `#[derive(Fields)]`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod attrs;
mod fields;
mod model;
mod syn_types;

/// Derive `Model` (and `ModelFields`) for a struct.
///
/// # Example
///
/// ```ignore
/// use sqlgrid::Model;
///
/// #[derive(Debug, Clone, Default, Model)]
/// #[orm(table = "cars")]
/// struct Car {
///     #[orm(primary)]
///     id: i64,
///     brand: String,
///     #[orm(has_one, polymorphic = "owner", polymorphic_value = "car")]
///     radio: Option<Radio>,
///     #[orm(many_to_many, join_table = "car_tags")]
///     tags: Vec<Tag>,
/// }
/// ```
///
/// # Struct attributes
///
/// - `#[orm(table = "name")]` - table; defaults to the pluralized snake_case struct name
/// - `#[orm(database = "name")]` - database; defaults to the builder's
/// - `#[orm(strategy = "name")]` - loading strategy; defaults to `eager`
///
/// # Field attributes
///
/// - `primary`, `custom`, `skip`, `flatten`
/// - `column = ".."`, `select = "EXPR"`, `validate = ".."`
/// - `permission` (deny both), `permission = "r" | "w" | "rw"`
/// - `has_one`, `belongs_to`, `has_many`, `many_to_many`, `relation`, `relation = ".."`
/// - `fk`, `afk`, `join_table`, `join_fk`, `join_afk`, `polymorphic`, `polymorphic_value`
#[proc_macro_derive(Model, attributes(orm))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    model::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

/// Derive `ModelFields` for a value struct embedded with `#[orm(flatten)]`.
#[proc_macro_derive(Fields, attributes(orm))]
pub fn derive_fields(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    fields::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
