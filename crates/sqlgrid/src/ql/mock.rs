//! Scripted in-memory connection for tests.
//!
//! Every statement is recorded. Queries are answered from scripts keyed by a
//! substring of the statement; describe queries against
//! `information_schema` are answered from tables declared with
//! [`MockConnection::table`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::config::DatabaseConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::ql::builder::Builder;
use crate::ql::column::{AbstractType, Column, ForeignKey};
use crate::ql::conn::{Connection, ExecResult, Executor, Transaction};
use crate::ql::driver::{Driver, mysql};
use crate::ql::information::{describe_columns, describe_foreign_keys};
use crate::ql::placeholder::Placeholder;
use crate::row::Row;
use crate::value::Value;

enum Reply {
    Rows(Vec<Row>),
    Exec(ExecResult),
}

struct Script {
    needle: String,
    reply: Reply,
    once: bool,
}

#[derive(Default)]
struct State {
    log: Vec<(String, Vec<Value>)>,
    scripts: Vec<Script>,
    failures: Vec<(String, ErrorKind)>,
    tables: HashMap<String, Vec<Column>>,
}

#[derive(Default)]
pub struct MockConnection {
    state: Mutex<State>,
}

impl std::fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnection")
            .field("statements", &self.statements().len())
            .finish()
    }
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer every query containing `needle` with `rows`.
    pub fn on_query(&self, needle: &str, rows: Vec<Row>) -> &Self {
        self.script(needle, Reply::Rows(rows), false)
    }

    /// Answer the next query containing `needle` with `rows`.
    pub fn on_query_once(&self, needle: &str, rows: Vec<Row>) -> &Self {
        self.script(needle, Reply::Rows(rows), true)
    }

    pub fn on_exec(&self, needle: &str, result: ExecResult) -> &Self {
        self.script(needle, Reply::Exec(result), false)
    }

    /// Fail every statement containing `needle`.
    pub fn fail_on(&self, needle: &str, kind: ErrorKind) -> &Self {
        self.state().failures.push((needle.to_owned(), kind));
        self
    }

    /// Declare a table for describe queries; columns are numbered in order.
    pub fn table(&self, name: &str, columns: Vec<Column>) -> &Self {
        let columns = columns
            .into_iter()
            .enumerate()
            .map(|(idx, mut column)| {
                column.table = name.to_owned();
                if column.position == 0 {
                    column.position = idx as i64 + 1;
                }
                column
            })
            .collect();
        self.state().tables.insert(name.to_owned(), columns);
        self
    }

    fn script(&self, needle: &str, reply: Reply, once: bool) -> &Self {
        self.state().scripts.push(Script {
            needle: needle.to_owned(),
            reply,
            once,
        });
        self
    }

    /// Every statement run so far, including `BEGIN`/`COMMIT`/`ROLLBACK`.
    pub fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.state().log.clone()
    }

    pub fn statements_matching(&self, needle: &str) -> Vec<(String, Vec<Value>)> {
        self.state()
            .log
            .iter()
            .filter(|(sql, _)| sql.contains(needle))
            .cloned()
            .collect()
    }

    pub fn clear_log(&self) {
        self.state().log.clear();
    }

    fn record(&self, sql: &str, args: &[Value]) -> Result<()> {
        let mut state = self.state();
        state.log.push((sql.to_owned(), args.to_vec()));
        match state.failures.iter().find(|(needle, _)| sql.contains(needle.as_str())) {
            Some((needle, kind)) => Err(Error::new(*kind, format!("scripted failure on `{needle}`"))),
            None => Ok(()),
        }
    }

    fn take_reply(&self, sql: &str, rows: bool) -> Option<Reply> {
        let mut state = self.state();
        let matches = |s: &Script| {
            sql.contains(s.needle.as_str()) && matches!((&s.reply, rows), (Reply::Rows(_), true) | (Reply::Exec(_), false))
        };
        if let Some(idx) = state.scripts.iter().position(|s| s.once && matches(s)) {
            return Some(state.scripts.remove(idx).reply);
        }
        state.scripts.iter().rev().find(|s| !s.once && matches(s)).map(|s| match &s.reply {
            Reply::Rows(rows) => Reply::Rows(rows.clone()),
            Reply::Exec(result) => Reply::Exec(*result),
        })
    }

    fn describe(&self, sql: &str, args: &[Value]) -> Option<Vec<Row>> {
        if !(sql.contains("information_schema") && sql.contains("AS column_type")) {
            return None;
        }
        let state = self.state();
        let (idx, columns) = args.iter().enumerate().find_map(|(idx, arg)| {
            arg.as_str()
                .and_then(|name| state.tables.get(name))
                .map(|columns| (idx, columns))
        })?;
        let wanted: Vec<&str> = args[idx + 1..].iter().filter_map(Value::as_str).collect();
        Some(
            columns
                .iter()
                .filter(|c| wanted.is_empty() || wanted.contains(&c.name.as_str()))
                .map(|c| {
                    Row::from_pairs([
                        ("column_name", Value::from(c.name.as_str())),
                        ("ordinal_position", Value::Int(c.position)),
                        ("is_nullable", Value::from(if c.nullable { "YES" } else { "NO" })),
                        ("is_primary", Value::Int(i64::from(c.primary))),
                        ("column_type", Value::from(c.raw.as_str())),
                        (
                            "column_default",
                            c.default_value.as_deref().map(Value::from).unwrap_or_default(),
                        ),
                        ("max_length", c.length.map(Value::Int).unwrap_or_default()),
                        ("is_autoincrement", Value::Int(i64::from(c.autoincrement))),
                    ])
                })
                .collect(),
        )
    }
}

#[async_trait]
impl Executor for MockConnection {
    async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        self.record(sql, args)?;
        if let Some(rows) = self.describe(sql, args) {
            return Ok(rows);
        }
        match self.take_reply(sql, true) {
            Some(Reply::Rows(rows)) => Ok(rows),
            _ => Ok(Vec::new()),
        }
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        self.record(sql, args)?;
        match self.take_reply(sql, false) {
            Some(Reply::Exec(result)) => Ok(result),
            _ => Ok(ExecResult {
                rows_affected: 1,
                last_insert_id: None,
            }),
        }
    }
}

/// Transactions share the connection's script and log.
///
/// Dropping one that was neither committed nor rolled back logs `ROLLBACK`,
/// like the pooled backends do.
struct MockTransaction {
    conn: Arc<MockConnection>,
    finished: AtomicBool,
}

impl Drop for MockTransaction {
    fn drop(&mut self) {
        if !self.finished.swap(true, Ordering::AcqRel) {
            let _ = self.conn.record("ROLLBACK", &[]);
        }
    }
}

#[async_trait]
impl Executor for MockTransaction {
    async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        self.conn.query(sql, args).await
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        self.conn.execute(sql, args).await
    }
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn commit(&self) -> Result<()> {
        self.conn.record("COMMIT", &[])?;
        self.finished.store(true, Ordering::Release);
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.conn.record("ROLLBACK", &[])?;
        self.finished.store(true, Ordering::Release);
        Ok(())
    }
}

/// `Connection` wrapper so transactions can hold an `Arc` to the shared state.
#[derive(Debug, Clone)]
pub struct MockPool(pub Arc<MockConnection>);

#[async_trait]
impl Executor for MockPool {
    async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        self.0.query(sql, args).await
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        self.0.execute(sql, args).await
    }
}

#[async_trait]
impl Connection for MockPool {
    async fn begin(&self) -> Result<Arc<dyn Transaction>> {
        self.0.record("BEGIN", &[])?;
        Ok(Arc::new(MockTransaction {
            conn: self.0.clone(),
            finished: AtomicBool::new(false),
        }))
    }
}

/// MySQL-flavoured dialect with configurable placeholder and quote.
#[derive(Debug, Clone, Copy)]
pub struct MockDriver {
    pub placeholder: Placeholder,
    pub quote: char,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self {
            placeholder: Placeholder::QUESTION,
            quote: '"',
        }
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn connect(&self, _config: &DatabaseConfig) -> Result<Arc<dyn Connection>> {
        Ok(Arc::new(MockPool(Arc::new(MockConnection::new()))))
    }

    async fn describe(
        &self,
        builder: &Builder,
        database: &str,
        table: &str,
        columns: &[String],
    ) -> Result<Vec<Column>> {
        describe_columns(builder, &mysql::COLUMNS, vec![Value::from(database)], table, columns).await
    }

    async fn foreign_keys(&self, builder: &Builder, database: &str, table: &str) -> Result<Vec<ForeignKey>> {
        describe_foreign_keys(builder, &mysql::FOREIGN_KEYS, vec![Value::from(database)], table).await
    }

    fn type_mapping(&self, raw: &str, column: &Column) -> Option<AbstractType> {
        mysql::type_mapping(raw, column)
    }

    fn placeholder(&self) -> Placeholder {
        self.placeholder
    }

    fn quote_character(&self) -> char {
        self.quote
    }
}

fn mock_config() -> DatabaseConfig {
    DatabaseConfig::new("mock").database("shop")
}

/// Builder over a fresh mock connection using the `?`/`"` mock dialect.
pub fn mock_builder() -> (Builder, Arc<MockConnection>) {
    mock_builder_with(Arc::new(MockDriver::default()))
}

pub fn mock_builder_for(placeholder: Placeholder, quote: char) -> (Builder, Arc<MockConnection>) {
    mock_builder_with(Arc::new(MockDriver { placeholder, quote }))
}

/// Builder over a fresh mock connection speaking `driver`'s dialect.
pub fn mock_builder_with(driver: Arc<dyn Driver>) -> (Builder, Arc<MockConnection>) {
    let conn = Arc::new(MockConnection::new());
    let builder = Builder::from_parts(mock_config(), driver, Arc::new(MockPool(conn.clone())));
    (builder, conn)
}
