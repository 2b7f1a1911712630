//! `Model`: descriptor plus relation accessors.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, Result};

use crate::attrs::{FieldKind, model_attrs, parse_fields};
use crate::fields::{impl_model_fields, opt};

pub(crate) fn expand(input: DeriveInput) -> Result<TokenStream> {
    let model = model_attrs(&input)?;
    let fields = parse_fields(&input)?;
    let ident = &input.ident;
    let struct_name = ident.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let table = opt(&model.table);
    let database = opt(&model.database);
    let strategy = opt(&model.strategy);

    let mut relations = Vec::new();
    let mut getters = Vec::new();
    let mut setters = Vec::new();
    for field in &fields {
        let FieldKind::Relation(rel) = &field.attrs.kind else {
            continue;
        };
        let member = &field.ident;
        let name = &field.name;
        let ty = &field.ty;
        let kind = opt(&rel.kind);
        let fk = opt(&rel.fk);
        let afk = opt(&rel.afk);
        let join_table = opt(&rel.join_table);
        let join_fk = opt(&rel.join_fk);
        let join_afk = opt(&rel.join_afk);
        let polymorphic = opt(&rel.polymorphic);
        let polymorphic_value = opt(&rel.polymorphic_value);
        let (read, write, custom) = (field.attrs.read, field.attrs.write, field.attrs.custom);

        relations.push(quote! {
            ::sqlgrid::orm::RelationDecl {
                field: #name,
                kind: #kind,
                many: <#ty as ::sqlgrid::orm::RelationField>::MANY,
                model: <#ty as ::sqlgrid::orm::RelationField>::model_type(),
                fk: #fk,
                afk: #afk,
                join_table: #join_table,
                join_fk: #join_fk,
                join_afk: #join_afk,
                polymorphic: #polymorphic,
                polymorphic_value: #polymorphic_value,
                permission: ::sqlgrid::orm::Permission { read: #read, write: #write },
                custom: #custom,
            }
        });
        getters.push(quote! {
            #name => ::core::option::Option::Some(::sqlgrid::orm::RelationField::to_relation(&self.#member)),
        });
        setters.push(quote! {
            #name => {
                self.#member = <#ty as ::sqlgrid::orm::RelationField>::from_relation(data).map_err(|e| e.context(#name))?;
                ::core::result::Result::Ok(true)
            }
        });
    }

    let model_fields = impl_model_fields(&input, &fields);
    Ok(quote! {
        #model_fields

        impl #impl_generics ::sqlgrid::orm::Model for #ident #ty_generics #where_clause {
            fn descriptor() -> ::sqlgrid::orm::ModelDescriptor {
                ::sqlgrid::orm::ModelDescriptor {
                    name: #struct_name,
                    type_name: ::core::any::type_name::<Self>(),
                    table: #table,
                    database: #database,
                    strategy: #strategy,
                    fields: <Self as ::sqlgrid::orm::ModelFields>::field_decls(),
                    relations: ::std::vec![#(#relations),*],
                }
            }

            fn get_relation(&self, field: &str) -> ::core::option::Option<::sqlgrid::orm::RelationData> {
                match field {
                    #(#getters)*
                    _ => ::core::option::Option::None,
                }
            }

            fn set_relation(&mut self, field: &str, data: ::sqlgrid::orm::RelationData) -> ::sqlgrid::Result<bool> {
                match field {
                    #(#setters)*
                    _ => {
                        let _ = data;
                        ::core::result::Result::Ok(false)
                    }
                }
            }
        }
    })
}
