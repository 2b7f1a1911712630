//! The unit a strategy operates on: masked metadata plus its context.

use crate::error::Result;
use crate::orm::Context;
use crate::orm::field::Field;
use crate::orm::metadata::{self, Metadata};
use crate::orm::record::Record;
use crate::orm::relation::Relation;
use crate::orm::wblist::{self, WbList};
use crate::ql::{Builder, Condition, Select};
use crate::row::Row;

#[derive(Debug, Clone)]
pub struct Scope {
    pub metadata: Metadata,
    pub ctx: Context,
    /// Type names of the models above this one on the loading chain.
    pub parents: Vec<String>,
    wblist: Option<WbList>,
}

impl Scope {
    pub fn new(ctx: Context, mut metadata: Metadata, wblist: Option<WbList>) -> Self {
        wblist::mask(&mut metadata, wblist.as_ref(), &[]);
        Self {
            metadata,
            ctx,
            parents: Vec::new(),
            wblist,
        }
    }

    /// Scope of `relation`'s target, carrying the forwarded permission list.
    pub async fn relation_scope(&self, relation: &Relation) -> Result<Scope> {
        let mut metadata = metadata::init(relation.model, &self.ctx).await?;
        let wblist = self.wblist.as_ref().and_then(|list| list.child(&relation.field));
        wblist::mask(&mut metadata, wblist.as_ref(), &relation.target_keys());

        let mut parents = self.parents.clone();
        parents.push(self.metadata.name.clone());
        Ok(Scope {
            metadata,
            ctx: self.ctx.clone(),
            parents,
            wblist,
        })
    }

    pub fn builder(&self) -> &Builder {
        &self.ctx.builder
    }

    pub fn in_tx(&self) -> bool {
        self.ctx.builder.in_tx()
    }

    pub fn table(&self) -> String {
        self.metadata.qualified_table(&self.ctx.builder)
    }

    /// Another table in this model's database, qualified the same way.
    pub fn sibling_table(&self, name: &str) -> String {
        if self.metadata.database_name == self.ctx.builder.config().database {
            name.to_owned()
        } else {
            format!("{}.{name}", self.metadata.database_name)
        }
    }

    pub fn readable_fields(&self) -> impl Iterator<Item = &Field> {
        self.metadata.fields.iter().filter(|f| f.readable())
    }

    pub fn writable_fields(&self) -> impl Iterator<Item = &Field> {
        self.metadata.fields.iter().filter(|f| f.writable())
    }

    pub fn primaries(&self) -> Vec<&Field> {
        self.metadata.primaries()
    }

    /// Readable relations whose target is not already on the loading chain.
    pub fn readable_relations(&self) -> Vec<&Relation> {
        self.metadata
            .relations
            .iter()
            .filter(|r| r.readable() && !self.parents.iter().any(|p| p == r.model.name()))
            .collect()
    }

    pub fn writable_relations(&self) -> Vec<&Relation> {
        self.metadata
            .relations
            .iter()
            .filter(|r| r.writable() && !self.parents.iter().any(|p| p == r.model.name()))
            .collect()
    }

    /// Projection: plain columns, or `(expr) AS "column"` for computed fields.
    pub fn select_columns(&self) -> Vec<String> {
        self.readable_fields()
            .map(|f| match &f.sql_select {
                Some(expr) => format!("!({expr}) AS {}", self.ctx.builder.quote(f.column_name())),
                None => f.column_name().to_owned(),
            })
            .collect()
    }

    pub fn select(&self, condition: Condition) -> Select<'_> {
        self.ctx
            .builder
            .select(&self.table())
            .columns(self.select_columns())
            .condition(condition)
    }

    /// Map a fetched row onto field names; unmapped columns are dropped.
    pub fn record_from_row(&self, row: Row) -> Record {
        let mut record = Record::new();
        for (column, value) in row.into_pairs() {
            if let Some(field) = self.metadata.field_by_column(&column) {
                record.fields.insert(field.name.clone(), value);
            }
        }
        record
    }
}

#[cfg(all(test, feature = "derive"))]
mod tests {
    use super::*;
    use crate::orm::fixtures;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn relation_scope_forwards_the_list_and_keys() {
        let (ctx, _conn) = fixtures::context();
        let car = metadata::init(crate::orm::ModelType::of::<fixtures::Car>(), &ctx).await.unwrap();
        let scope = Scope::new(ctx, car, Some(WbList::whitelist(["brand", "radio.brand"])));

        assert_eq!(scope.select_columns(), ["id", "brand"]);
        let radio = scope.metadata.relation("radio").unwrap().clone();
        let child = scope.relation_scope(&radio).await.unwrap();
        assert_eq!(child.select_columns(), ["id", "brand", "owner_id", "owner_type"]);
        assert_eq!(child.parents.len(), 1);
        // Radio has no relations, the Car chain entry is what blocks cycles.
        assert!(child.readable_relations().is_empty());
    }

    #[tokio::test]
    async fn computed_fields_render_as_aliases() {
        let (ctx, _conn) = fixtures::context();
        let person = metadata::init(crate::orm::ModelType::of::<fixtures::Person>(), &ctx).await.unwrap();
        let scope = Scope::new(ctx, person, None);
        assert_eq!(
            scope.select_columns(),
            ["id", "name", "!(UPPER(name)) AS \"shout\""]
        );
    }
}
