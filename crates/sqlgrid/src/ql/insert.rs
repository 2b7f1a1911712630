//! `INSERT` builder with batching.

use std::collections::BTreeMap;

use crate::error::{Error, ErrorKind, Result};
use crate::ql::builder::Builder;
use crate::value::Value;

/// Rows per generated `INSERT` statement unless overridden.
pub const DEFAULT_BATCH: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertResult {
    pub rows_affected: u64,
    /// Id of the last inserted row, when the backend reports one.
    pub last_insert_id: Option<i64>,
}

/// Multi-row insert. The column list comes from the first value map; rows
/// missing a column insert `NULL` for it.
#[derive(Debug, Clone)]
pub struct Insert<'a> {
    builder: &'a Builder,
    into: String,
    columns: Vec<String>,
    values: Vec<BTreeMap<String, Value>>,
    batch: usize,
    returning: Option<String>,
}

impl<'a> Insert<'a> {
    pub(crate) fn new(builder: &'a Builder, into: &str) -> Self {
        Self {
            builder,
            into: into.to_owned(),
            columns: Vec::new(),
            values: Vec::new(),
            batch: DEFAULT_BATCH,
            returning: None,
        }
    }

    pub fn values(mut self, rows: Vec<BTreeMap<String, Value>>) -> Self {
        self.values.extend(rows);
        self
    }

    pub fn value(mut self, row: BTreeMap<String, Value>) -> Self {
        self.values.push(row);
        self
    }

    /// Fix the column list instead of deriving it from the first row.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Rows per statement; zero is treated as one.
    pub fn batch(mut self, size: usize) -> Self {
        self.batch = size.max(1);
        self
    }

    /// Ask for the generated key of `column`. Dialects with `RETURNING`
    /// append it to the statement; the MySQL family reports it natively.
    pub fn last_inserted_id(mut self, column: &str) -> Self {
        self.returning = Some(column.to_owned());
        self
    }

    fn column_list(&self) -> Vec<String> {
        if !self.columns.is_empty() {
            return self.columns.clone();
        }
        self.values
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// One `(sql, args)` pair per batch.
    pub fn to_sql(&self) -> Result<Vec<(String, Vec<Value>)>> {
        if self.values.is_empty() {
            return Err(Error::new(
                ErrorKind::NoValues,
                format!("insert into `{}` has no rows", self.into),
            ));
        }
        let columns = self.column_list();
        if columns.is_empty() {
            return Err(Error::new(
                ErrorKind::NoValues,
                format!("insert into `{}` has no columns", self.into),
            ));
        }

        let head = format!(
            "INSERT INTO {} ({}) VALUES ",
            self.builder.quote(&self.into),
            columns
                .iter()
                .map(|c| self.builder.quote(c))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let tuple = format!("({})", vec!["?"; columns.len()].join(", "));
        let returning = self
            .returning
            .as_deref()
            .filter(|_| self.builder.driver().returning())
            .map(|col| format!(" RETURNING {}", self.builder.quote(col)));
        let placeholder = self.builder.placeholder();

        let statements = self
            .values
            .chunks(self.batch)
            .map(|chunk| {
                let mut args = Vec::with_capacity(chunk.len() * columns.len());
                for row in chunk {
                    for column in &columns {
                        args.push(row.get(column).cloned().unwrap_or(Value::Null));
                    }
                }
                let mut sql = head.clone();
                sql.push_str(&vec![tuple.as_str(); chunk.len()].join(", "));
                if let Some(returning) = &returning {
                    sql.push_str(returning);
                }
                (placeholder.render(&sql), args)
            })
            .collect();
        Ok(statements)
    }

    /// Run every batch. More than one batch outside a transaction runs
    /// inside a private one so the insert is all-or-nothing.
    pub async fn exec(&self) -> Result<InsertResult> {
        let statements = self.to_sql()?;
        if statements.len() == 1 {
            return self.run(self.builder, statements, false).await;
        }

        let fork = self.builder.fork();
        fork.tx().await?;
        let result = self.run(&fork, statements, true).await;
        fork.finish(true, result).await
    }

    pub async fn exec_tx(&self) -> Result<InsertResult> {
        let statements = self.to_sql()?;
        self.run(self.builder, statements, true).await
    }

    async fn run(
        &self,
        builder: &Builder,
        statements: Vec<(String, Vec<Value>)>,
        in_tx: bool,
    ) -> Result<InsertResult> {
        let returning = self
            .returning
            .as_deref()
            .filter(|_| builder.driver().returning());

        let mut total = InsertResult::default();
        for (sql, args) in statements {
            match returning {
                Some(column) => {
                    let rows = builder.run_query(&sql, &args, in_tx).await?;
                    total.rows_affected += rows.len() as u64;
                    if let Some(id) = rows.last().and_then(|r| r.get(column)).and_then(Value::as_i64) {
                        total.last_insert_id = Some(id);
                    }
                }
                None => {
                    let res = builder.run_exec(&sql, &args, in_tx).await?;
                    total.rows_affected += res.rows_affected;
                    if res.last_insert_id.is_some() {
                        total.last_insert_id = res.last_insert_id;
                    }
                }
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::ql::conn::ExecResult;
    use crate::ql::mock::{mock_builder, mock_builder_with};
    use crate::ql::driver::postgres::PostgresDriver;
    use crate::row::Row;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn robot(id: i64, name: &str) -> BTreeMap<String, Value> {
        BTreeMap::from([
            ("id".to_string(), Value::Int(id)),
            ("name".to_string(), Value::from(name)),
        ])
    }

    #[test]
    fn batches_split_rows() {
        let (builder, _) = mock_builder();
        let rows: Vec<_> = (1..=5).map(|i| robot(i, "r")).collect();
        let statements = builder.insert("robots").values(rows).batch(2).to_sql().unwrap();
        assert_eq!(statements.len(), 3);
        assert_eq!(
            statements[0].0,
            r#"INSERT INTO "robots" ("id", "name") VALUES (?, ?), (?, ?)"#
        );
        assert_eq!(statements[2].0, r#"INSERT INTO "robots" ("id", "name") VALUES (?, ?)"#);
        assert_eq!(statements[0].1, args![1, "r", 2, "r"]);

        for (n, batch) in [(1usize, 1usize), (50, 50), (51, 50), (120, 7)] {
            let rows: Vec<_> = (0..n as i64).map(|i| robot(i, "r")).collect();
            let count = builder.insert("robots").values(rows).batch(batch).to_sql().unwrap().len();
            assert_eq!(count, n.div_ceil(batch));
        }
    }

    #[test]
    fn missing_keys_insert_null() {
        let (builder, _) = mock_builder();
        let partial = BTreeMap::from([("id".to_string(), Value::Int(9))]);
        let statements = builder
            .insert("robots")
            .value(robot(1, "a"))
            .value(partial)
            .to_sql()
            .unwrap();
        assert_eq!(statements[0].1, args![1, "a", 9, Value::Null]);
    }

    #[test]
    fn empty_insert_fails() {
        let (builder, _) = mock_builder();
        let err = builder.insert("robots").to_sql().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoValues);
    }

    #[tokio::test]
    async fn single_batch_reports_native_id() {
        let (builder, conn) = mock_builder();
        conn.on_exec("INSERT", ExecResult { rows_affected: 1, last_insert_id: Some(42) });

        let result = builder
            .insert("robots")
            .value(robot(0, "Eve"))
            .last_inserted_id("id")
            .exec()
            .await
            .unwrap();
        assert_eq!(result, InsertResult { rows_affected: 1, last_insert_id: Some(42) });
        assert!(conn.statements_matching("BEGIN").is_empty());
    }

    #[tokio::test]
    async fn several_batches_run_in_private_transaction() {
        let (builder, conn) = mock_builder();
        conn.on_exec("INSERT", ExecResult { rows_affected: 2, last_insert_id: None });

        let rows: Vec<_> = (1..=4).map(|i| robot(i, "r")).collect();
        let result = builder.insert("robots").values(rows).batch(2).exec().await.unwrap();
        assert_eq!(result.rows_affected, 4);
        assert_eq!(conn.statements_matching("BEGIN").len(), 1);
        assert_eq!(conn.statements_matching("COMMIT").len(), 1);
        assert!(!builder.in_tx());
    }

    #[tokio::test]
    async fn failed_batch_rolls_back() {
        let (builder, conn) = mock_builder();
        conn.fail_on("INSERT", ErrorKind::Driver);

        let rows: Vec<_> = (1..=3).map(|i| robot(i, "r")).collect();
        let err = builder.insert("robots").values(rows).batch(2).exec().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Driver);
        assert_eq!(conn.statements_matching("ROLLBACK").len(), 1);
        assert!(conn.statements_matching("COMMIT").is_empty());
    }

    #[tokio::test]
    async fn returning_dialect_reads_id_from_rows() {
        let (builder, conn) = mock_builder_with(Arc::new(PostgresDriver));
        conn.on_query("RETURNING", vec![Row::from_pairs([("id", Value::Int(7))])]);

        let result = builder
            .insert("robots")
            .value(robot(0, "Eve"))
            .last_inserted_id("id")
            .exec()
            .await
            .unwrap();
        assert_eq!(result.last_insert_id, Some(7));
        assert_eq!(
            conn.statements()[0].0,
            r#"INSERT INTO "robots" ("id", "name") VALUES ($1, $2) RETURNING "id""#
        );
    }
}
