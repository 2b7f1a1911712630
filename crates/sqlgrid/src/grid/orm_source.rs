//! A [`Source`] backed by an [`Orm`] model.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value as Json, json};

use crate::error::{Error, ErrorKind, Result};
use crate::grid::field::Field;
use crate::grid::mode::FieldMode;
use crate::grid::request::Request;
use crate::grid::source::Source;
use crate::orm::{self, Context, Model, Orm, Record, WbList, metadata};
use crate::ql::Condition;
use crate::ql::column::AbstractType;

/// What a named callback receives.
#[derive(Debug, Clone)]
pub struct CallbackArgs {
    pub ctx: Context,
    pub request: Request,
}

pub type SourceCallback = Arc<dyn Fn(CallbackArgs) -> BoxFuture<'static, Result<Json>> + Send + Sync>;

pub struct OrmSource<M: Model> {
    ctx: Context,
    orm: Option<Orm<M>>,
    wblist: Option<WbList>,
    callbacks: BTreeMap<String, SourceCallback>,
}

impl<M: Model> std::fmt::Debug for OrmSource<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrmSource")
            .field("model", &M::descriptor().name)
            .field("wblist", &self.wblist)
            .field("callbacks", &self.callbacks.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<M: Model> OrmSource<M> {
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            orm: None,
            wblist: None,
            callbacks: BTreeMap::new(),
        }
    }

    /// Permission list applied to every read and write of this source.
    pub fn with_wb_list(mut self, list: WbList) -> Self {
        self.wblist = Some(list);
        self
    }

    pub fn on_callback<F, Fut>(mut self, name: &str, callback: F) -> Self
    where
        F: Fn(CallbackArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Json>> + Send + 'static,
    {
        self.callbacks
            .insert(name.to_owned(), Arc::new(move |args| callback(args).boxed()));
        self
    }

    fn orm(&mut self) -> Result<&mut Orm<M>> {
        let orm = self
            .orm
            .as_mut()
            .ok_or_else(|| Error::new(ErrorKind::Unconfigured, "source used before init"))?;
        if let Some(list) = &self.wblist {
            orm.set_wb_list(list.clone());
        }
        Ok(orm)
    }
}

fn scalar(field: &orm::Field, id: String, position: i64) -> Field {
    let ty = field.column.ty.as_ref().map_or("Text", AbstractType::name);
    let mut out = Field::new(id, ty);
    out.reference_id = field.column_name().to_owned();
    out.primary = field.is_primary();
    out.read_only = !field.writable();
    out.set_position(position);
    if !field.permission.read {
        out.set_remove(true);
    }
    if field.is_primary() && field.column.autoincrement {
        out.set_remove_in(FieldMode::Create, true);
    }
    if let Some(AbstractType::Select { items } | AbstractType::MultiSelect { items }) = &field.column.ty {
        out.set_option("items", json!(items));
    }
    out
}

#[async_trait]
impl<M: Model> Source for OrmSource<M> {
    async fn init(&mut self, grid_id: &str) -> Result<()> {
        tracing::debug!(target: "sqlgrid::grid", grid = grid_id, model = M::descriptor().name, "init orm source");
        self.orm = Some(Orm::<M>::init(&self.ctx).await?);
        Ok(())
    }

    /// Top-level columns are sortable; plain ones are filterable too.
    /// Relations become `Relation` fields holding their target's columns.
    async fn fields(&mut self) -> Result<Vec<Field>> {
        let metadata = self.orm()?.metadata().clone();
        let mut fields = Vec::new();
        let mut position = 0;

        for field in metadata.fields.iter().filter(|f| !f.custom) {
            let mut out = scalar(field, field.name.clone(), position);
            out.sortable = true;
            out.filterable = field.sql_select.is_none();
            fields.push(out);
            position += 1;
        }

        for relation in &metadata.relations {
            let target = metadata::init(relation.model, &self.ctx).await?;
            let mut out = Field::new(relation.field.clone(), "Relation");
            out.read_only = !relation.permission.write;
            out.set_position(position);
            out.set_option("many", json!(relation.kind.is_many()));
            if !relation.permission.read {
                out.set_remove(true);
            }
            out.fields = target
                .fields
                .iter()
                .filter(|f| !f.custom)
                .enumerate()
                .map(|(idx, f)| scalar(f, format!("{}.{}", relation.field, f.name), idx as i64))
                .collect();
            fields.push(out);
            position += 1;
        }
        Ok(fields)
    }

    fn quote_char(&self) -> char {
        self.ctx.builder.quote_char()
    }

    async fn first(&mut self, condition: &Condition) -> Result<Json> {
        Ok(self.orm()?.first_record(condition).await?.to_json())
    }

    async fn all(&mut self, condition: &Condition) -> Result<Json> {
        let records = self.orm()?.all_records(condition).await?;
        Ok(Json::Array(records.iter().map(Record::to_json).collect()))
    }

    async fn count(&mut self, condition: &Condition) -> Result<i64> {
        self.orm()?.count(condition).await
    }

    async fn create(&mut self, body: Json) -> Result<Json> {
        let mut record = Record::from_json(&M::descriptor(), &body)?;
        let orm = self.orm()?;
        orm.create_record(&mut record).await?;
        let mut pkeys = Map::new();
        for primary in orm.metadata().primaries() {
            let value = record.get(&primary.name).map_or(Json::Null, |v| v.to_json());
            pkeys.insert(primary.name.clone(), value);
        }
        Ok(Json::Object(pkeys))
    }

    async fn update(&mut self, condition: &Condition, body: Json) -> Result<u64> {
        let mut record = Record::from_json(&M::descriptor(), &body)?;
        self.orm()?.update_record(condition, &mut record).await
    }

    async fn delete(&mut self, condition: &Condition) -> Result<u64> {
        self.orm()?.delete(condition).await
    }

    async fn callback(&mut self, name: &str, request: &Request) -> Result<Json> {
        let callback = self
            .callbacks
            .get(name)
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::InvalidParam, format!("unknown callback `{name}`")))?;
        callback(CallbackArgs {
            ctx: self.ctx.clone(),
            request: request.clone(),
        })
        .await
    }

    fn context(&self) -> Option<&Context> {
        Some(&self.ctx)
    }
}
