//! `ModelFields`: scalar field declarations and by-name value access.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, Result};

use crate::attrs::{FieldKind, ParsedField, parse_fields};

/// `Some("..")` / `None` as tokens.
pub(crate) fn opt(value: &Option<String>) -> TokenStream {
    match value {
        Some(v) => quote!(::core::option::Option::Some(#v)),
        None => quote!(::core::option::Option::None),
    }
}

/// `impl ModelFields` for the scalar and flattened fields of `input`.
pub(crate) fn impl_model_fields(input: &DeriveInput, fields: &[ParsedField]) -> TokenStream {
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut decls = Vec::new();
    let mut getters = Vec::new();
    let mut setters = Vec::new();
    let mut nested_get = Vec::new();
    let mut nested_set = Vec::new();

    for field in fields {
        let member = &field.ident;
        let name = &field.name;
        let ty = &field.ty;
        match &field.attrs.kind {
            FieldKind::Scalar => {
                let attrs = &field.attrs;
                let column = opt(&attrs.column);
                let select = opt(&attrs.select);
                let validator = opt(&attrs.validate);
                let (primary, custom, read, write) = (attrs.primary, attrs.custom, attrs.read, attrs.write);
                decls.push(quote! {
                    decls.push(::sqlgrid::orm::FieldDecl {
                        name: #name,
                        column: #column,
                        primary: #primary,
                        custom: #custom,
                        permission: ::sqlgrid::orm::Permission { read: #read, write: #write },
                        select: #select,
                        validator: #validator,
                    });
                });
                getters.push(quote! {
                    #name => ::core::option::Option::Some(::sqlgrid::ToValue::to_value(&self.#member)),
                });
                setters.push(quote! {
                    #name => {
                        self.#member = ::sqlgrid::FromValue::from_value(value).map_err(|e| e.context(#name))?;
                        ::core::result::Result::Ok(true)
                    }
                });
            }
            FieldKind::Flatten => {
                decls.push(quote! {
                    decls.extend(<#ty as ::sqlgrid::orm::ModelFields>::field_decls());
                });
                nested_get.push(quote! {
                    if let ::core::option::Option::Some(found) = ::sqlgrid::orm::ModelFields::get_value(&self.#member, field) {
                        return ::core::option::Option::Some(found);
                    }
                });
                nested_set.push(quote! {
                    if <#ty as ::sqlgrid::orm::ModelFields>::has_field(field) {
                        return ::sqlgrid::orm::ModelFields::set_value(&mut self.#member, field, value);
                    }
                });
            }
            FieldKind::Skip | FieldKind::Relation(_) => {}
        }
    }

    quote! {
        impl #impl_generics ::sqlgrid::orm::ModelFields for #ident #ty_generics #where_clause {
            fn field_decls() -> ::std::vec::Vec<::sqlgrid::orm::FieldDecl> {
                let mut decls = ::std::vec::Vec::new();
                #(#decls)*
                decls
            }

            fn get_value(&self, field: &str) -> ::core::option::Option<::sqlgrid::Value> {
                match field {
                    #(#getters)*
                    _ => {
                        #(#nested_get)*
                        ::core::option::Option::None
                    }
                }
            }

            fn set_value(&mut self, field: &str, value: ::sqlgrid::Value) -> ::sqlgrid::Result<bool> {
                match field {
                    #(#setters)*
                    _ => {
                        #(#nested_set)*
                        let _ = value;
                        ::core::result::Result::Ok(false)
                    }
                }
            }
        }
    }
}

pub(crate) fn expand(input: DeriveInput) -> Result<TokenStream> {
    let fields = parse_fields(&input)?;
    if let Some(field) = fields.iter().find(|f| matches!(f.attrs.kind, FieldKind::Relation(_))) {
        return Err(syn::Error::new_spanned(
            &field.ident,
            "relations are only supported on `#[derive(Model)]`",
        ));
    }
    Ok(impl_model_fields(&input, &fields))
}
