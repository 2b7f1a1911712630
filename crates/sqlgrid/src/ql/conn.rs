//! Connection seams between the builders and a database backend.
//!
//! A driver hands the [`Builder`](crate::ql::Builder) a [`Connection`]
//! (usually a pool). Transactions are pinned to one pooled connection and
//! exposed as a [`Transaction`]; both run statements through [`Executor`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Generated id reported natively by the backend (MySQL family).
    pub last_insert_id: Option<i64>,
}

#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a statement (already in dialect placeholder syntax) and collect its rows.
    async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>>;

    async fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult>;
}

#[async_trait]
pub trait Connection: Executor {
    /// Check out a dedicated connection and start a transaction on it.
    async fn begin(&self) -> Result<Arc<dyn Transaction>>;
}

#[async_trait]
pub trait Transaction: Executor {
    async fn commit(&self) -> Result<()>;

    async fn rollback(&self) -> Result<()>;
}
