//! CRUD grid over a [`Source`].
//!
//! A [`Grid`] turns one HTTP-shaped [`Request`] into one [`Response`]: it
//! resolves the [`Mode`] from the method and `mode` parameter, checks it
//! against the grid's [`GridConfig`], builds the query condition from the
//! request parameters and answers with the field head, data rows and
//! pagination the mode calls for. Exports answer with a file instead.
//!
//! ```ignore
//! let mut grid = Grid::new("cars", "index").with_cache(cache, Duration::from_secs(300));
//! grid.set_source(OrmSource::<Car>::new(ctx)).await?;
//! grid.field_mut("brand")?.set_title("Make");
//! let response = grid.render(&Request::from_http(req)?).await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value as Json};

use crate::cache::{Cache, get_as};
use crate::ql::Condition;
use crate::error::{Error, ErrorKind, Result};

pub mod callback;
pub mod config;
pub mod export;
pub mod field;
pub mod mode;
pub mod orm_source;
pub mod pagination;
#[cfg(feature = "derive")]
pub mod preferences;
pub mod query;
pub mod request;
pub mod source;

pub use callback::{FieldCallback, decorator};
pub use config::{ActionConfig, FilterConfig, GridConfig};
pub use field::Field;
pub use mode::{FieldMode, Mode, ModeValue};
pub use orm_source::{CallbackArgs, OrmSource};
pub use pagination::Pagination;
pub use request::{Principal, Request, Response};
pub use source::Source;

pub struct Grid {
    id: String,
    config: GridConfig,
    cache: Option<(Arc<dyn Cache>, Duration)>,
    source: Option<Box<dyn Source>>,
    fields: Vec<Field>,
}

impl std::fmt::Debug for Grid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grid")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("fields", &self.fields.len())
            .field("source", &self.source.is_some())
            .finish()
    }
}

impl Grid {
    /// A grid identified as `controller:action`.
    pub fn new(controller: &str, action: &str) -> Self {
        let id = format!("{controller}:{action}");
        Self {
            config: GridConfig::new(id.clone()),
            id,
            cache: None,
            source: None,
            fields: Vec::new(),
        }
    }

    pub fn with_config(mut self, mut config: GridConfig) -> Self {
        if config.id.is_empty() {
            config.id = self.id.clone();
        }
        self.config = config;
        self
    }

    /// Share field definitions between grids with the same id.
    pub fn with_cache(mut self, cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        self.cache = Some((cache, ttl));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut GridConfig {
        &mut self.config
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Field by dot path, for per-request changes.
    pub fn field_mut(&mut self, id: &str) -> Result<&mut Field> {
        field::find_mut(&mut self.fields, id)
            .ok_or_else(|| Error::new(ErrorKind::UnknownColumn, format!("grid has no field `{id}`")))
    }

    /// Initialize `source` and load its fields, from the cache when present.
    pub async fn set_source<S: Source + 'static>(&mut self, mut source: S) -> Result<()> {
        source.init(&self.id).await?;
        self.fields = self.load_fields(&mut source).await?;
        self.source = Some(Box::new(source));
        Ok(())
    }

    async fn load_fields(&self, source: &mut dyn Source) -> Result<Vec<Field>> {
        let key = format!("grid:{}", self.id);
        if let Some((cache, _)) = &self.cache {
            if let Some(hit) = get_as::<Vec<Field>>(cache.as_ref(), &key) {
                tracing::trace!(target: "sqlgrid::grid", grid = %self.id, "fields cache hit");
                return Ok((*hit).clone());
            }
        }
        let fields = source.fields().await?;
        if let Some((cache, ttl)) = &self.cache {
            tracing::trace!(target: "sqlgrid::grid", grid = %self.id, "fields cache miss");
            cache.set(&key, Arc::new(fields.clone()), (!ttl.is_zero()).then_some(*ttl));
        }
        Ok(fields)
    }

    /// Answer `request`. Failures become a 500 carrying the error kind.
    pub async fn render(&mut self, request: &Request) -> Response {
        match self.try_render(request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(target: "sqlgrid::grid", grid = %self.id, error = %err, "render failed");
                Response::error(&err)
            }
        }
    }

    fn gate(&self, mode: Mode, request: &Request) -> Result<()> {
        if self.config.disables(mode) {
            return Err(Error::forbidden(format!("{mode} is disabled for `{}`", self.id)));
        }
        if mode == Mode::Export {
            if let Some(kind) = request.param("type") {
                if !self.config.allows_export(kind) {
                    return Err(Error::forbidden(format!("export `{kind}` is not allowed")));
                }
            }
        }
        Ok(())
    }

    async fn try_render(&mut self, request: &Request) -> Result<Response> {
        let mode = Mode::detect(&request.method, request.param("mode"))?;
        self.gate(mode, request)?;

        let Grid {
            id,
            config,
            source,
            fields,
            ..
        } = self;
        let source = source
            .as_mut()
            .ok_or_else(|| Error::new(ErrorKind::Unconfigured, "grid has no source"))?;
        let quote = source.quote_char();
        let field_mode = mode.field_mode();
        tracing::debug!(target: "sqlgrid::grid", grid = %id, %mode, "render");

        // resolved before the source sees the request
        let primary = if mode.needs_primary() {
            query::primary_condition(fields, request, quote)?
        } else {
            Condition::new()
        };

        let mut out = Map::new();
        match mode {
            Mode::Head => {
                out.insert("head".into(), head(fields, field_mode));
            }
            Mode::CreateView => {
                out.insert("head".into(), head(fields, field_mode));
                out.insert("title".into(), Json::String(config.title.clone()));
            }
            Mode::Details | Mode::UpdateView => {
                let mut data = source.first(&primary).await?;
                present(fields, field_mode, &mut data)?;
                out.insert("head".into(), head(fields, field_mode));
                out.insert("title".into(), Json::String(config.title.clone()));
                out.insert("data".into(), data);
            }
            Mode::Table => {
                let mut request = request.clone();
                #[cfg(feature = "derive")]
                if config.filter.allow_saved {
                    apply_saved_view(id, &**source, &mut request, fields).await?;
                }
                let mut condition = query::table_condition(fields, &request, quote, !config.filter.disable)?;
                let total = source.count(&condition).await?;
                let pagination = Pagination::new(total, request.int_param("limit")?, request.int_param("page")?)?;
                pagination.apply(&mut condition);
                let mut data = source.all(&condition).await?;
                present(fields, field_mode, &mut data)?;

                out.insert("config".into(), serde_json::to_value(&*config)?);
                if !request.has("noheader") {
                    out.insert("head".into(), head(fields, field_mode));
                }
                out.insert("pagination".into(), serde_json::to_value(pagination)?);
                out.insert("data".into(), data);
            }
            Mode::Export => {
                let kind = request
                    .param("type")
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| Error::new(ErrorKind::InvalidParam, "export `type` is required"))?;
                let renderer = export::get(kind)?;
                let condition = query::table_condition(fields, request, quote, !config.filter.disable)?;
                let mut data = source.all(&condition).await?;
                present(fields, field_mode, &mut data)?;
                let table = export::Table::build(&export_columns(fields), &data);
                let body = renderer.render(&table)?;
                return Response::attachment(renderer.content_type(), renderer.extension(), body);
            }
            Mode::Create => {
                let body = request.json_body()?;
                check_writable(fields, &body)?;
                let pkeys = source.create(body).await?;
                out.insert("pkeys".into(), pkeys);
            }
            Mode::Update => {
                let body = request.json_body()?;
                check_writable(fields, &body)?;
                let affected = source.update(&primary, body).await?;
                out.insert("data".into(), Json::from(affected));
            }
            Mode::Delete => {
                let affected = source.delete(&primary).await?;
                out.insert("data".into(), Json::from(affected));
            }
            Mode::Callback => {
                let name = request
                    .param("callback")
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| Error::new(ErrorKind::InvalidParam, "`callback` is required"))?;
                let data = source.callback(name, request).await?;
                out.insert("data".into(), data);
            }
        }
        Response::json(&Json::Object(out))
    }
}

#[cfg(feature = "derive")]
async fn apply_saved_view(grid_id: &str, source: &dyn Source, request: &mut Request, fields: &mut [Field]) -> Result<()> {
    let (Some(principal), Some(ctx)) = (request.principal, source.context()) else {
        return Ok(());
    };
    if let Some(view) = preferences::load(ctx, principal.user_id, grid_id).await? {
        tracing::debug!(target: "sqlgrid::grid", grid = grid_id, view = %view.name, "applying saved view");
        view.apply(request, fields);
    }
    Ok(())
}

fn head(fields: &[Field], mode: FieldMode) -> Json {
    Json::Array(field::sorted(fields, mode).into_iter().map(|f| f.head(mode)).collect())
}

/// Run field callbacks, then drop values of fields removed in `mode`.
fn present(fields: &[Field], mode: FieldMode, data: &mut Json) -> Result<()> {
    callback::apply(fields, data)?;
    strip_removed(fields, mode, data);
    Ok(())
}

fn strip_removed(fields: &[Field], mode: FieldMode, data: &mut Json) {
    match data {
        Json::Array(rows) => {
            for row in rows {
                strip_removed(fields, mode, row);
            }
        }
        Json::Object(map) => {
            for field in fields {
                let key = field.id.rsplit('.').next().unwrap_or(&field.id);
                if field.is_removed(mode) {
                    map.remove(key);
                } else if !field.fields.is_empty() {
                    if let Some(nested) = map.get_mut(key) {
                        strip_removed(&field.fields, mode, nested);
                    }
                }
            }
        }
        _ => {}
    }
}

/// Export columns: scalar fields as they are, relations as their children.
fn export_columns(fields: &[Field]) -> Vec<(String, String)> {
    let mode = FieldMode::Export;
    let mut columns = Vec::new();
    for field in field::sorted(fields, mode) {
        if field.fields.is_empty() {
            columns.push((field.id.clone(), field.title.get(mode).clone()));
        } else {
            for child in field::sorted(&field.fields, mode) {
                columns.push((child.id.clone(), child.title.get(mode).clone()));
            }
        }
    }
    columns
}

/// Body keys may not name read-only fields.
fn check_writable(fields: &[Field], body: &Json) -> Result<()> {
    let Some(map) = body.as_object() else {
        return Ok(());
    };
    for key in map.keys() {
        if field::find(fields, key).is_some_and(|f| f.read_only) {
            return Err(Error::forbidden(format!("field `{key}` is read-only")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::ql::Condition;
    use crate::value::Value;
    use async_trait::async_trait;
    use http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
    use http::{Method, StatusCode};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};

    type Calls = Arc<Mutex<Vec<(&'static str, String, Vec<Value>)>>>;

    #[derive(Default)]
    struct StubSource {
        total: i64,
        data: Json,
        calls: Calls,
        field_loads: Arc<AtomicUsize>,
    }

    impl StubSource {
        fn record(&self, op: &'static str, condition: &Condition) -> Result<()> {
            let (sql, args) = condition.render('"')?;
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((op, sql, args));
            Ok(())
        }
    }

    #[async_trait]
    impl Source for StubSource {
        async fn init(&mut self, _grid_id: &str) -> Result<()> {
            Ok(())
        }

        async fn fields(&mut self) -> Result<Vec<Field>> {
            self.field_loads.fetch_add(1, Ordering::SeqCst);
            let mut id = Field::new("id", "Integer");
            id.primary = true;
            id.sortable = true;
            id.filterable = true;
            let mut name = Field::new("first_name", "Text");
            name.sortable = true;
            name.filterable = true;
            name.set_position(1);
            let mut radio = Field::new("radio", "Relation");
            radio.set_position(2);
            radio.fields.push(Field::new("radio.brand", "Text"));
            Ok(vec![id, name, radio])
        }

        async fn first(&mut self, condition: &Condition) -> Result<Json> {
            self.record("first", condition)?;
            Ok(self.data.clone())
        }

        async fn all(&mut self, condition: &Condition) -> Result<Json> {
            self.record("all", condition)?;
            Ok(self.data.clone())
        }

        async fn count(&mut self, condition: &Condition) -> Result<i64> {
            self.record("count", condition)?;
            Ok(self.total)
        }

        async fn create(&mut self, _body: Json) -> Result<Json> {
            Ok(json!({"id": 11}))
        }

        async fn update(&mut self, condition: &Condition, _body: Json) -> Result<u64> {
            self.record("update", condition)?;
            Ok(1)
        }

        async fn delete(&mut self, condition: &Condition) -> Result<u64> {
            self.record("delete", condition)?;
            Ok(1)
        }

        async fn callback(&mut self, name: &str, _request: &Request) -> Result<Json> {
            Ok(json!({ "called": name }))
        }
    }

    async fn grid(source: StubSource) -> Grid {
        let mut grid = Grid::new("users", "index");
        grid.set_source(source).await.unwrap();
        grid
    }

    fn get(query: &str) -> Request {
        Request::new(Method::GET, query).unwrap()
    }

    fn ids(head: &Json) -> Vec<&str> {
        head.as_array()
            .unwrap()
            .iter()
            .map(|f| f["id"].as_str().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn table_render_with_sort_filter_and_paging() {
        let calls = Calls::default();
        let mut grid = grid(StubSource {
            total: 20,
            data: json!("some data"),
            calls: calls.clone(),
            ..StubSource::default()
        })
        .await;

        let response = grid
            .render(&get("sort=id,-first_name&filter_id=1&limit=5&page=2"))
            .await;
        assert_eq!(response.status, StatusCode::OK);
        let body = response.json_body().unwrap();
        assert_eq!(ids(&body["head"]), ["id", "first_name", "radio"]);
        assert_eq!(body["data"], "some data");
        assert_eq!(body["pagination"]["limit"], 5);
        assert_eq!(body["pagination"]["currentPage"], 2);
        assert_eq!(body["pagination"]["totalPages"], 4);
        assert_eq!(body["config"]["id"], "users:index");

        let calls = calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                (
                    "count",
                    r#" WHERE "id" = ? ORDER BY "id" ASC, "first_name" DESC"#.to_owned(),
                    vec![Value::Int(1)]
                ),
                (
                    "all",
                    r#" WHERE "id" = ? ORDER BY "id" ASC, "first_name" DESC LIMIT 5 OFFSET 5"#.to_owned(),
                    vec![Value::Int(1)]
                ),
            ]
        );
    }

    #[tokio::test]
    async fn noheader_and_unbounded_limit() {
        let calls = Calls::default();
        let mut grid = grid(StubSource {
            total: 40,
            data: json!([]),
            calls: calls.clone(),
            ..StubSource::default()
        })
        .await;
        let body = grid.render(&get("noheader=1&limit=-1")).await.json_body().unwrap();
        assert!(body.get("head").is_none());
        assert_eq!(body["pagination"]["totalPages"], 1);
        let calls = calls.lock().unwrap().clone();
        assert_eq!(calls[1].1, "");
    }

    #[tokio::test]
    async fn callbacks_run_and_removed_fields_are_dropped() {
        let mut grid = grid(StubSource {
            total: 1,
            data: json!([{"id": 3, "first_name": "Ann", "radio": {"brand": "Sony"}}]),
            ..StubSource::default()
        })
        .await;
        grid.field_mut("first_name")
            .unwrap()
            .set_callback(decorator("{{first_name}} #{{id}}", false));
        grid.field_mut("radio.brand").unwrap().set_remove(true);

        let body = grid.render(&get("")).await.json_body().unwrap();
        assert_eq!(body["data"], json!([{"id": 3, "first_name": "Ann #3", "radio": {}}]));
        assert_eq!(body["head"][2]["fields"], json!([]));
    }

    #[tokio::test]
    async fn details_need_the_primary_key() {
        let calls = Calls::default();
        let mut grid = grid(StubSource {
            data: json!({"id": 7, "first_name": "Bo"}),
            calls: calls.clone(),
            ..StubSource::default()
        })
        .await;

        let response = grid.render(&get("mode=details")).await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(&response.body[..], b"missing primary key");

        let body = grid.render(&get("mode=details&id=7")).await.json_body().unwrap();
        assert_eq!(body["data"]["first_name"], "Bo");
        assert_eq!(calls.lock().unwrap()[0].1, r#" WHERE "id" = ?"#);
    }

    #[tokio::test]
    async fn disabled_actions_are_forbidden() {
        let mut config = GridConfig::default();
        config.action.disable_delete = true;
        config.exports = vec!["csv".into()];
        let mut grid = grid(StubSource::default()).await.with_config(config);

        let delete = Request::new(Method::DELETE, "id=1").unwrap();
        let response = grid.render(&delete).await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(&response.body[..], b"forbidden");

        let response = grid.render(&get("mode=export&type=pdf")).await;
        assert_eq!(&response.body[..], b"forbidden");
        assert_eq!(grid.config().id, "users:index");
    }

    #[tokio::test]
    async fn unknown_mode() {
        let mut grid = grid(StubSource::default()).await;
        let response = grid.render(&Request::new(Method::POST, "mode=head").unwrap()).await;
        assert_eq!(&response.body[..], b"unknown mode");
    }

    #[tokio::test]
    async fn writes_report_keys_and_counts() {
        let mut grid = grid(StubSource::default()).await;
        grid.field_mut("first_name").unwrap().read_only = true;

        let create = Request::new(Method::POST, "").unwrap().with_body(r#"{"id": 0}"#);
        let body = grid.render(&create).await.json_body().unwrap();
        assert_eq!(body, json!({"pkeys": {"id": 11}}));

        let update = Request::new(Method::PUT, "id=11").unwrap().with_body(r#"{"first_name": "X"}"#);
        assert_eq!(&grid.render(&update).await.body[..], b"forbidden");

        let empty = Request::new(Method::PUT, "id=11").unwrap();
        assert_eq!(&grid.render(&empty).await.body[..], b"request body is empty");

        let delete = Request::new(Method::DELETE, "id=11").unwrap();
        assert_eq!(grid.render(&delete).await.json_body().unwrap(), json!({"data": 1}));
    }

    #[tokio::test]
    async fn row_writes_without_primary_key_never_reach_the_source() {
        let calls = Calls::default();
        let mut grid = grid(StubSource {
            calls: calls.clone(),
            ..StubSource::default()
        })
        .await;

        let update = Request::new(Method::PUT, "").unwrap().with_body(r#"{"first_name": "X"}"#);
        assert_eq!(&grid.render(&update).await.body[..], b"missing primary key");
        let delete = Request::new(Method::DELETE, "").unwrap();
        assert_eq!(&grid.render(&delete).await.body[..], b"missing primary key");
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn callback_mode() {
        let mut grid = grid(StubSource::default()).await;
        let body = grid
            .render(&get("mode=callback&callback=lookup"))
            .await
            .json_body()
            .unwrap();
        assert_eq!(body["data"], json!({"called": "lookup"}));
        let response = grid.render(&get("mode=callback")).await;
        assert_eq!(&response.body[..], b"invalid parameter");
    }

    #[tokio::test]
    async fn fields_are_cached_and_cloned_per_grid() {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        let loads = Arc::new(AtomicUsize::new(0));

        let mut first = Grid::new("users", "index").with_cache(cache.clone(), Duration::from_secs(60));
        first
            .set_source(StubSource {
                field_loads: loads.clone(),
                ..StubSource::default()
            })
            .await
            .unwrap();
        first.field_mut("first_name").unwrap().set_title("Given Name");

        let mut second = Grid::new("users", "index").with_cache(cache, Duration::from_secs(60));
        second
            .set_source(StubSource {
                field_loads: loads.clone(),
                ..StubSource::default()
            })
            .await
            .unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        let title = second.fields()[1].title.get(FieldMode::Table);
        assert_eq!(title, "First Name");
        assert_eq!(second.field_mut("nope").unwrap_err().kind(), ErrorKind::UnknownColumn);
    }

    #[cfg(feature = "export")]
    #[tokio::test]
    async fn csv_export_is_an_attachment() {
        let mut grid = grid(StubSource {
            data: json!([{"id": 1, "first_name": "Ann", "radio": {"brand": "Sony"}}]),
            ..StubSource::default()
        })
        .await;
        let response = grid.render(&get("mode=export&type=csv&sort=-id")).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.headers[CONTENT_TYPE], "text/csv");
        assert_eq!(response.headers[CONTENT_DISPOSITION], "attachment; filename=\"export.csv\"");
        assert_eq!(&response.body[..], b"Id;First Name;Brand\n1;Ann;Sony\n");
    }
}
