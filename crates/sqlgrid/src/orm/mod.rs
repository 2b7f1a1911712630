//! Relational mapping over the query layer.
//!
//! Models are plain structs with `#[derive(Model)]`. [`metadata::init`]
//! checks them against the live schema once and caches the result; an
//! [`Orm`] then reads and writes whole record graphs through the model's
//! [`Strategy`](strategy::Strategy).

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::Cache;
use crate::error::{Error, ErrorKind, Result};
use crate::ql::{Builder, Condition};

pub mod field;
pub mod metadata;
pub mod model;
pub mod record;
pub mod relation;
pub mod scope;
pub mod strategy;
pub mod wblist;

#[cfg(all(test, feature = "derive"))]
pub(crate) mod fixtures;

pub use field::{Field, Permission};
pub use metadata::Metadata;
pub use model::{FieldDecl, Model, ModelDescriptor, ModelFields, ModelType, RelationDecl, RelationField};
pub use record::{Record, RelationData};
pub use relation::{JoinTable, Polymorphic, Relation, RelationKind};
pub use scope::Scope;
pub use wblist::{Policy, WbList};

/// What every ORM call needs: a builder and the metadata cache.
#[derive(Clone)]
pub struct Context {
    pub builder: Builder,
    pub cache: Option<Arc<dyn Cache>>,
    pub ttl: Duration,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("builder", &self.builder)
            .field("cache", &self.cache.is_some())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl Context {
    pub fn new(builder: Builder) -> Self {
        Self {
            builder,
            cache: None,
            ttl: Duration::ZERO,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        self.cache = Some(cache);
        self.ttl = ttl;
        self
    }

    /// Same cache, different builder.
    pub fn with_builder(&self, builder: Builder) -> Self {
        Self {
            builder,
            cache: self.cache.clone(),
            ttl: self.ttl,
        }
    }

    pub(crate) fn cache(&self) -> Result<&Arc<dyn Cache>> {
        match &self.cache {
            Some(cache) if !self.ttl.is_zero() => Ok(cache),
            _ => Err(Error::new(ErrorKind::NoCache, "the ORM needs a cache with a non-zero ttl")),
        }
    }
}

/// Typed entry point for one model.
///
/// Each call runs on a forked builder, so write operations get their own
/// transaction. When the context's builder already holds an open
/// transaction the call joins it instead.
pub struct Orm<M: Model> {
    ctx: Context,
    metadata: Metadata,
    wblist: Option<WbList>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> std::fmt::Debug for Orm<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orm")
            .field("model", &self.metadata.name)
            .field("wblist", &self.wblist)
            .finish()
    }
}

impl<M: Model> Orm<M> {
    pub async fn init(ctx: &Context) -> Result<Self> {
        let metadata = metadata::init(ModelType::of::<M>(), ctx).await?;
        Ok(Self {
            ctx: ctx.clone(),
            metadata,
            wblist: None,
            _model: PhantomData,
        })
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Permission list for the next call only.
    pub fn set_wb_list(&mut self, list: WbList) -> &mut Self {
        self.wblist = Some(list);
        self
    }

    fn scope(&mut self) -> Result<(Scope, Arc<dyn strategy::Strategy>)> {
        let builder = if self.ctx.builder.in_tx() {
            self.ctx.builder.clone()
        } else {
            self.ctx.builder.fork()
        };
        let strategy = strategy::get(&self.metadata.strategy)?;
        let scope = Scope::new(
            self.ctx.with_builder(builder),
            self.metadata.clone(),
            self.wblist.take(),
        );
        Ok((scope, strategy))
    }

    pub async fn first_record(&mut self, condition: &Condition) -> Result<Record> {
        let (scope, strategy) = self.scope()?;
        strategy.first(&scope, condition).await
    }

    pub async fn all_records(&mut self, condition: &Condition) -> Result<Vec<Record>> {
        let (scope, strategy) = self.scope()?;
        strategy.all(&scope, condition).await
    }

    pub async fn create_record(&mut self, record: &mut Record) -> Result<()> {
        let (scope, strategy) = self.scope()?;
        strategy.create(&scope, record).await
    }

    pub async fn update_record(&mut self, condition: &Condition, record: &mut Record) -> Result<u64> {
        let (scope, strategy) = self.scope()?;
        strategy.update(&scope, condition, record).await
    }

    pub async fn first(&mut self, condition: &Condition) -> Result<M> {
        let record = self.first_record(condition).await?;
        M::from_record(&record)
    }

    pub async fn all(&mut self, condition: &Condition) -> Result<Vec<M>> {
        self.all_records(condition)
            .await?
            .iter()
            .map(M::from_record)
            .collect()
    }

    /// Insert `model` and its writable relations; generated keys are written back.
    pub async fn create(&mut self, model: &mut M) -> Result<()> {
        let mut record = model.to_record();
        self.create_record(&mut record).await?;
        model.apply_record(&record)
    }

    pub async fn update(&mut self, condition: &Condition, model: &mut M) -> Result<u64> {
        let mut record = model.to_record();
        let affected = self.update_record(condition, &mut record).await?;
        model.apply_record(&record)?;
        Ok(affected)
    }

    pub async fn update_by_primary(&mut self, model: &mut M) -> Result<u64> {
        let condition = self.primary_condition(&model.to_record())?;
        self.update(&condition, model).await
    }

    pub async fn delete(&mut self, condition: &Condition) -> Result<u64> {
        let (scope, strategy) = self.scope()?;
        strategy.delete(&scope, condition).await
    }

    pub async fn delete_by_primary(&mut self, model: &M) -> Result<u64> {
        let condition = self.primary_condition(&model.to_record())?;
        self.delete(&condition).await
    }

    /// `SELECT COUNT(*)` over the condition's WHERE/GROUP/HAVING.
    ///
    /// A grouped condition counts its groups through a derived table.
    pub async fn count(&self, condition: &Condition) -> Result<i64> {
        let mut condition = condition.clone();
        condition.reset(&[
            crate::ql::Clause::Order,
            crate::ql::Clause::Limit,
            crate::ql::Clause::Offset,
        ]);
        let builder = &self.ctx.builder;
        let table = self.metadata.qualified_table(builder);

        if condition.has(crate::ql::Clause::Group) {
            let (suffix, args) = condition.render(builder.quote_char())?;
            let sql = format!(
                "SELECT COUNT(*) AS total FROM (SELECT 1 AS one FROM {}{suffix}) AS t",
                builder.quote(&table)
            );
            let sql = builder.placeholder().render(&sql);
            let rows = builder.run_query(&sql, &args, builder.in_tx()).await?;
            return match rows.first() {
                Some(row) => row.try_get("total"),
                None => Ok(0),
            };
        }

        let select = builder
            .select(&table)
            .columns(["!COUNT(*) AS total"])
            .condition(condition);
        let row = if builder.in_tx() {
            select.first_tx().await?
        } else {
            select.first().await?
        };
        row.try_get("total")
    }

    /// `pk = ?` for every primary of `record`; `MissingPrimary` when one is unset.
    pub fn primary_condition(&self, record: &Record) -> Result<Condition> {
        let mut condition = Condition::new();
        for primary in self.metadata.primaries() {
            let value = record
                .get(&primary.name)
                .filter(|v| !v.is_zero())
                .cloned()
                .ok_or_else(|| {
                    Error::new(
                        ErrorKind::MissingPrimary,
                        format!("`{}` is not set", primary.name),
                    )
                })?;
            condition.and_where(
                &format!("{} = ?", self.ctx.builder.quote(primary.column_name())),
                vec![value],
            );
        }
        Ok(condition)
    }
}

#[cfg(all(test, feature = "derive"))]
mod tests {
    use super::*;
    use crate::orm::fixtures::{self, Car};
    use crate::row::Row;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn count_drops_paging_and_order() {
        let (ctx, conn) = fixtures::context();
        conn.on_query("COUNT(*)", vec![Row::from_pairs([("total", Value::Int(12))])]);
        let cars = Orm::<Car>::init(&ctx).await.unwrap();

        let mut condition = Condition::new();
        condition.and_where("brand = ?", crate::args!["BMW"]).order(["-id"]).limit(5).offset(10);
        assert_eq!(cars.count(&condition).await.unwrap(), 12);

        let (sql, args) = conn.statements_matching("COUNT(*)").remove(0);
        assert_eq!(sql, r#"SELECT COUNT(*) AS total FROM "cars" WHERE brand = ?"#);
        assert_eq!(args, crate::args!["BMW"]);
    }

    #[tokio::test]
    async fn grouped_count_counts_groups() {
        let (ctx, conn) = fixtures::context();
        conn.on_query("COUNT(*)", vec![Row::from_pairs([("total", Value::Int(2))])]);
        let cars = Orm::<Car>::init(&ctx).await.unwrap();

        let mut condition = Condition::new();
        condition
            .and_where("brand <> ?", crate::args!["Lada"])
            .group(["brand"])
            .order(["brand"])
            .limit(5);
        assert_eq!(cars.count(&condition).await.unwrap(), 2);

        let (sql, args) = conn.statements_matching("COUNT(*)").remove(0);
        assert_eq!(
            sql,
            r#"SELECT COUNT(*) AS total FROM (SELECT 1 AS one FROM "cars" WHERE brand <> ? GROUP BY "brand") AS t"#
        );
        assert_eq!(args, crate::args!["Lada"]);
    }

    #[tokio::test]
    async fn primary_condition_needs_every_key() {
        let (ctx, _conn) = fixtures::context();
        let cars = Orm::<Car>::init(&ctx).await.unwrap();

        let err = cars.primary_condition(&Car::default().to_record()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingPrimary);

        let car = Car {
            id: 4,
            ..Car::default()
        };
        let condition = cars.primary_condition(&car.to_record()).unwrap();
        assert_eq!(condition.args(crate::ql::Clause::Where), [Value::Int(4)]);
    }
}
