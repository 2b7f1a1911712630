//! Saved grid views: per-user filters, sort order and column positions.
//!
//! A view is stored as a [`UserGrid`] row keyed by `(user_id, grid_id)` with
//! its filters, sorts and positions in child tables. Only the row flagged
//! `is_default` is applied to table requests.

use crate::Model;
use crate::error::Result;
use crate::grid::field::{self, Field};
use crate::grid::mode::FieldMode;
use crate::grid::query::FILTER_PREFIX;
use crate::grid::request::Request;
use crate::orm::{Context, Orm};
use crate::ql::Condition;
use crate::value::Value;

#[derive(Debug, Clone, Default, PartialEq, Model)]
#[orm(table = "user_grids")]
pub struct UserGrid {
    #[orm(primary)]
    pub id: i64,
    pub user_id: i64,
    pub grid_id: String,
    pub name: String,
    pub is_default: bool,
    #[orm(has_many)]
    pub filters: Vec<UserGridFilter>,
    #[orm(has_many)]
    pub sorts: Vec<UserGridSort>,
    #[orm(has_many)]
    pub positions: Vec<UserGridPosition>,
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
#[orm(table = "user_grid_filters")]
pub struct UserGridFilter {
    #[orm(primary)]
    pub id: i64,
    pub user_grid_id: i64,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
#[orm(table = "user_grid_sorts")]
pub struct UserGridSort {
    #[orm(primary)]
    pub id: i64,
    pub user_grid_id: i64,
    pub key: String,
    pub desc: bool,
    pub position: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
#[orm(table = "user_grid_positions")]
pub struct UserGridPosition {
    #[orm(primary)]
    pub id: i64,
    pub user_grid_id: i64,
    pub key: String,
    pub position: i64,
}

/// The user's default view of `grid_id`, if one is saved.
pub async fn load(ctx: &Context, user_id: i64, grid_id: &str) -> Result<Option<UserGrid>> {
    let mut orm = Orm::<UserGrid>::init(ctx).await?;
    let builder = &ctx.builder;
    let mut condition = Condition::new();
    condition.and_where(
        &format!(
            "{} = ? AND {} = ? AND {} = ?",
            builder.quote("user_id"),
            builder.quote("grid_id"),
            builder.quote("is_default"),
        ),
        vec![Value::Int(user_id), Value::from(grid_id), Value::Bool(true)],
    );
    match orm.first(&condition).await {
        Ok(view) => Ok(Some(view)),
        Err(err) if err.is_no_rows() => Ok(None),
        Err(err) => Err(err),
    }
}

impl UserGrid {
    /// Merge the view into a table request.
    ///
    /// Parameters already on the request win. Keys that no longer name a
    /// filterable (or sortable) field are skipped.
    pub fn apply(&self, request: &mut Request, fields: &mut [Field]) {
        for filter in &self.filters {
            let param = format!("{FILTER_PREFIX}{}", filter.key);
            let known = field::find(fields, &filter.key).is_some_and(|f| f.filterable);
            if known && !request.has(&param) {
                request.params.insert(param, filter.value.clone());
            }
        }

        if !request.has("sort") {
            let mut sorts: Vec<&UserGridSort> = self
                .sorts
                .iter()
                .filter(|s| field::find(fields, &s.key).is_some_and(|f| f.sortable))
                .collect();
            sorts.sort_by_key(|s| s.position);
            if !sorts.is_empty() {
                let sort = sorts
                    .iter()
                    .map(|s| if s.desc { format!("-{}", s.key) } else { s.key.clone() })
                    .collect::<Vec<_>>()
                    .join(",");
                request.params.insert("sort".to_owned(), sort);
            }
        }

        for position in &self.positions {
            if let Some(field) = field::find_mut(fields, &position.key) {
                field.position.set(FieldMode::Table, position.position);
            }
        }
    }
}
