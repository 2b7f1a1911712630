//! Statement factory bound to one connection pool.
//!
//! A `Builder` carries a single transaction slot. `tx()` fills it, `commit()`
//! and `rollback()` clear it, and every `*_tx` statement variant runs on the
//! open transaction. A statement error inside the transaction rolls it back
//! before the error is returned.
//!
//! Clones share the slot. Use [`Builder::fork`] to get a builder on the same
//! pool with a slot of its own, one per transactional unit of work.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crate::config::DatabaseConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::ql::conn::{Connection, ExecResult, Transaction};
use crate::ql::delete::Delete;
use crate::ql::driver::{self, Driver};
use crate::ql::ident::quote_identifier;
use crate::ql::information::Information;
use crate::ql::insert::Insert;
use crate::ql::placeholder::Placeholder;
use crate::ql::select::Select;
use crate::ql::update::Update;
use crate::row::Row;
use crate::value::Value;

type TxSlot = Arc<Mutex<Option<Arc<dyn Transaction>>>>;

struct Shared {
    config: DatabaseConfig,
    driver: Arc<dyn Driver>,
    conn: Arc<dyn Connection>,
}

#[derive(Clone)]
pub struct Builder {
    shared: Arc<Shared>,
    tx: TxSlot,
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("driver", &self.shared.driver.name())
            .field("database", &self.shared.config.database)
            .field("in_tx", &self.in_tx())
            .finish()
    }
}

impl Builder {
    /// Resolve the configured driver and open its pool.
    pub async fn connect(config: DatabaseConfig) -> Result<Self> {
        let driver = driver::get(&config.driver)?;
        let conn = driver.connect(&config).await?;
        tracing::info!(
            target: "sqlgrid::sql",
            driver = driver.name(),
            host = %config.host,
            database = %config.database,
            "connected"
        );
        Ok(Self::from_parts(config, driver, conn))
    }

    /// Use an externally provided connection with the configured driver's dialect.
    pub fn with_connection(config: DatabaseConfig, conn: Arc<dyn Connection>) -> Result<Self> {
        let driver = driver::get(&config.driver)?;
        Ok(Self::from_parts(config, driver, conn))
    }

    pub fn from_parts(
        config: DatabaseConfig,
        driver: Arc<dyn Driver>,
        conn: Arc<dyn Connection>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                driver,
                conn,
            }),
            tx: Arc::new(Mutex::new(None)),
        }
    }

    /// Same pool and dialect, fresh (empty) transaction slot.
    pub fn fork(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            tx: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.shared.config
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.shared.driver
    }

    pub fn placeholder(&self) -> Placeholder {
        self.shared.driver.placeholder()
    }

    pub fn quote_char(&self) -> char {
        self.shared.driver.quote_character()
    }

    /// Quote an identifier path for this dialect.
    pub fn quote(&self, ident: &str) -> String {
        quote_identifier(ident, self.quote_char())
    }

    pub fn select(&self, from: &str) -> Select<'_> {
        Select::new(self, from)
    }

    pub fn insert(&self, into: &str) -> Insert<'_> {
        Insert::new(self, into)
    }

    pub fn update(&self, table: &str) -> Update<'_> {
        Update::new(self, table)
    }

    pub fn delete(&self, from: &str) -> Delete<'_> {
        Delete::new(self, from)
    }

    /// Schema introspection for `table` or `database.table`.
    pub fn information(&self, table: &str) -> Information<'_> {
        Information::new(self, table)
    }

    pub fn in_tx(&self) -> bool {
        self.slot().is_some()
    }

    /// Open a transaction in this builder's slot.
    pub async fn tx(&self) -> Result<()> {
        if self.in_tx() {
            return Err(Error::new(
                ErrorKind::TransactionActive,
                "a transaction is already open on this builder",
            ));
        }

        let tx = self.shared.conn.begin().await?;
        let raced = {
            let mut slot = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                true
            } else {
                *slot = Some(tx.clone());
                false
            }
        };
        if raced {
            tx.rollback().await?;
            return Err(Error::new(
                ErrorKind::TransactionActive,
                "a transaction is already open on this builder",
            ));
        }
        tracing::debug!(target: "sqlgrid::sql", "transaction started");
        Ok(())
    }

    pub async fn commit(&self) -> Result<()> {
        let tx = self.take_tx()?;
        tx.commit().await?;
        tracing::debug!(target: "sqlgrid::sql", "transaction committed");
        Ok(())
    }

    pub async fn rollback(&self) -> Result<()> {
        let tx = self.take_tx()?;
        tx.rollback().await?;
        tracing::debug!(target: "sqlgrid::sql", "transaction rolled back");
        Ok(())
    }

    /// Open a transaction unless one is already running.
    ///
    /// Returns `true` when the caller opened it and must hand the outcome to
    /// [`Builder::finish`].
    pub async fn begin_owned(&self) -> Result<bool> {
        if self.in_tx() {
            return Ok(false);
        }
        self.tx().await?;
        Ok(true)
    }

    /// Close a transaction opened by [`Builder::begin_owned`]: commit on
    /// success, roll back on failure and keep the original error.
    pub async fn finish<T>(&self, owned: bool, result: Result<T>) -> Result<T> {
        if !owned {
            return result;
        }
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if self.in_tx() {
                    if let Err(rollback_err) = self.rollback().await {
                        tracing::warn!(target: "sqlgrid::sql", error = %rollback_err, "rollback failed");
                    }
                }
                Err(err)
            }
        }
    }

    fn slot(&self) -> Option<Arc<dyn Transaction>> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn take_tx(&self) -> Result<Arc<dyn Transaction>> {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| Error::new(ErrorKind::NoActiveTransaction, "no transaction is open"))
    }

    fn active_tx(&self) -> Result<Arc<dyn Transaction>> {
        self.slot()
            .ok_or_else(|| Error::new(ErrorKind::NoActiveTransaction, "no transaction is open"))
    }

    /// Statement failed inside the transaction: roll it back and clear the slot.
    async fn abort(&self, err: &Error) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        tracing::warn!(target: "sqlgrid::sql", error = %err, "statement failed, rolling back transaction");
        if let Some(tx) = tx {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(target: "sqlgrid::sql", error = %rollback_err, "rollback failed");
            }
        }
    }

    fn log(&self, sql: &str, args: &[Value], started: Instant, in_tx: bool) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if self.shared.config.debug {
            tracing::debug!(target: "sqlgrid::sql", sql, args = ?args, elapsed_ms, in_tx, "statement");
        } else {
            tracing::trace!(target: "sqlgrid::sql", sql, args = ?args, elapsed_ms, in_tx, "statement");
        }
    }

    pub(crate) async fn run_query(&self, sql: &str, args: &[Value], in_tx: bool) -> Result<Vec<Row>> {
        let started = Instant::now();
        let result = if in_tx {
            let tx = self.active_tx()?;
            let result = tx.query(sql, args).await;
            if let Err(err) = &result {
                self.abort(err).await;
            }
            result
        } else {
            self.shared.conn.query(sql, args).await
        };
        self.log(sql, args, started, in_tx);
        result
    }

    pub(crate) async fn run_exec(&self, sql: &str, args: &[Value], in_tx: bool) -> Result<ExecResult> {
        let started = Instant::now();
        let result = if in_tx {
            let tx = self.active_tx()?;
            let result = tx.execute(sql, args).await;
            if let Err(err) = &result {
                self.abort(err).await;
            }
            result
        } else {
            self.shared.conn.execute(sql, args).await
        };
        self.log(sql, args, started, in_tx);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::ql::mock::mock_builder;

    #[tokio::test]
    async fn second_tx_is_rejected() {
        let (builder, _conn) = mock_builder();
        builder.tx().await.unwrap();
        let err = builder.tx().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransactionActive);
        builder.commit().await.unwrap();
        assert!(!builder.in_tx());
    }

    #[tokio::test]
    async fn commit_without_tx_fails() {
        let (builder, _conn) = mock_builder();
        assert_eq!(builder.commit().await.unwrap_err().kind(), ErrorKind::NoActiveTransaction);
        assert_eq!(builder.rollback().await.unwrap_err().kind(), ErrorKind::NoActiveTransaction);
    }

    #[tokio::test]
    async fn statement_error_in_tx_rolls_back() {
        let (builder, conn) = mock_builder();
        conn.fail_on("DELETE", ErrorKind::Driver);

        builder.tx().await.unwrap();
        let err = builder
            .delete("robots")
            .and_where("id = ?", args![1])
            .exec_tx()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Driver);
        assert!(!builder.in_tx());
        assert_eq!(builder.commit().await.unwrap_err().kind(), ErrorKind::NoActiveTransaction);
        assert_eq!(conn.statements_matching("ROLLBACK").len(), 1);
    }

    #[tokio::test]
    async fn dropping_builder_with_open_tx_rolls_back() {
        let (builder, conn) = mock_builder();
        builder.tx().await.unwrap();
        drop(builder);

        let statements: Vec<String> = conn.statements().into_iter().map(|(sql, _)| sql).collect();
        assert_eq!(statements, ["BEGIN", "ROLLBACK"]);
    }

    #[tokio::test]
    async fn committed_tx_is_not_rolled_back_on_drop() {
        let (builder, conn) = mock_builder();
        builder.tx().await.unwrap();
        builder.commit().await.unwrap();
        drop(builder);
        assert!(conn.statements_matching("ROLLBACK").is_empty());
    }

    #[tokio::test]
    async fn fork_has_its_own_slot() {
        let (builder, _conn) = mock_builder();
        let shared = builder.clone();
        let forked = builder.fork();

        builder.tx().await.unwrap();
        assert!(shared.in_tx());
        assert!(!forked.in_tx());
        forked.tx().await.unwrap();
        forked.rollback().await.unwrap();
        shared.commit().await.unwrap();
        assert!(!builder.in_tx());
    }

    #[tokio::test]
    async fn finish_commits_or_rolls_back() {
        let (builder, conn) = mock_builder();
        let owned = builder.begin_owned().await.unwrap();
        assert!(owned);
        assert!(!builder.begin_owned().await.unwrap());
        builder.finish(owned, Ok(())).await.unwrap();
        assert_eq!(conn.statements_matching("COMMIT").len(), 1);

        let owned = builder.begin_owned().await.unwrap();
        let err = builder
            .finish::<()>(owned, Err(Error::new(ErrorKind::NoValues, "x")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoValues);
        assert_eq!(conn.statements_matching("ROLLBACK").len(), 1);
    }
}
