//! MySQL / MariaDB dialect.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::ql::builder::Builder;
use crate::ql::column::{AbstractType, Column, ForeignKey};
use crate::ql::conn::Connection;
use crate::ql::driver::{Driver, parse_items, parse_size};
use crate::ql::information::{ColumnQuery, ForeignKeyQuery, describe_columns, describe_foreign_keys};
use crate::ql::placeholder::Placeholder;
use crate::value::Value;

pub(crate) const COLUMNS: ColumnQuery = ColumnQuery {
    from: "information_schema.COLUMNS",
    name: "COLUMN_NAME",
    position: "ORDINAL_POSITION",
    nullable: "IS_NULLABLE",
    primary: "(COLUMN_KEY = 'PRI')",
    raw_type: "COLUMN_TYPE",
    default_value: "COLUMN_DEFAULT",
    length: "CHARACTER_MAXIMUM_LENGTH",
    autoincrement: "(EXTRA LIKE '%auto_increment%')",
    scope: "TABLE_SCHEMA = ?",
    table: "TABLE_NAME",
};

pub(crate) const FOREIGN_KEYS: ForeignKeyQuery = ForeignKeyQuery {
    from: "information_schema.KEY_COLUMN_USAGE",
    joins: &[],
    constraint: "CONSTRAINT_NAME",
    column: "COLUMN_NAME",
    referenced_table: "REFERENCED_TABLE_NAME",
    referenced_column: "REFERENCED_COLUMN_NAME",
    scope: "TABLE_SCHEMA = ? AND TABLE_NAME = ? AND REFERENCED_TABLE_NAME IS NOT NULL",
};

#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDriver;

#[async_trait]
impl Driver for MysqlDriver {
    fn name(&self) -> &'static str {
        "mysql"
    }

    async fn connect(&self, config: &DatabaseConfig) -> Result<Arc<dyn Connection>> {
        connect(config)
    }

    async fn describe(
        &self,
        builder: &Builder,
        database: &str,
        table: &str,
        columns: &[String],
    ) -> Result<Vec<Column>> {
        describe_columns(builder, &COLUMNS, vec![Value::from(database)], table, columns).await
    }

    async fn foreign_keys(&self, builder: &Builder, database: &str, table: &str) -> Result<Vec<ForeignKey>> {
        describe_foreign_keys(builder, &FOREIGN_KEYS, vec![Value::from(database)], table).await
    }

    fn type_mapping(&self, raw: &str, column: &Column) -> Option<AbstractType> {
        type_mapping(raw, column)
    }

    fn placeholder(&self) -> Placeholder {
        Placeholder::QUESTION
    }

    fn quote_character(&self) -> char {
        '`'
    }
}

/// Classify a MySQL `COLUMN_TYPE` spelling.
pub(crate) fn type_mapping(raw: &str, column: &Column) -> Option<AbstractType> {
    let lower = raw.trim().to_ascii_lowercase();
    let unsigned = lower.contains("unsigned");
    let base = lower
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or_default();
    let size = parse_size(&lower).or(column.length);

    let ty = match base {
        "tinyint" => AbstractType::integer(8, unsigned),
        "smallint" => AbstractType::integer(16, unsigned),
        "mediumint" => AbstractType::integer(24, unsigned),
        "int" | "integer" => AbstractType::integer(32, unsigned),
        "bigint" => AbstractType::integer(64, unsigned),
        "varchar" | "char" => AbstractType::Text { size },
        "tinytext" | "text" | "mediumtext" | "longtext" | "json" => AbstractType::TextArea { size: column.length },
        "enum" => AbstractType::Select { items: parse_items(raw) },
        "set" => AbstractType::MultiSelect { items: parse_items(raw) },
        "float" | "double" | "decimal" => AbstractType::Float,
        "date" => AbstractType::Date,
        "datetime" | "timestamp" => AbstractType::DateTime,
        "time" => AbstractType::Time,
        _ => return None,
    };
    Some(ty)
}

#[cfg(not(feature = "mysql"))]
fn connect(config: &DatabaseConfig) -> Result<Arc<dyn Connection>> {
    Err(crate::error::Error::new(
        crate::error::ErrorKind::Unconfigured,
        format!("driver `{}` needs the `mysql` feature", config.driver),
    ))
}

#[cfg(feature = "mysql")]
fn connect(config: &DatabaseConfig) -> Result<Arc<dyn Connection>> {
    Ok(Arc::new(pool::MysqlPool::new(config)))
}

#[cfg(feature = "mysql")]
mod pool {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
    use mysql_async::consts::ColumnType;
    use mysql_async::prelude::Queryable;
    use mysql_async::{Conn, OptsBuilder, Params, Pool, PoolConstraints, PoolOpts, TxOpts};
    use tokio::sync::Mutex;

    use crate::config::DatabaseConfig;
    use crate::error::{Error, ErrorKind, Result};
    use crate::ql::conn::{Connection, ExecResult, Executor, Transaction};
    use crate::row::Row;
    use crate::value::Value;

    pub(super) struct MysqlPool {
        pool: Pool,
    }

    impl MysqlPool {
        pub(super) fn new(config: &DatabaseConfig) -> Self {
            let mut pool_opts = PoolOpts::default();
            if let Some(constraints) = PoolConstraints::new(0, config.max_connections.max(1)) {
                pool_opts = pool_opts.with_constraints(constraints);
            }
            let opts = OptsBuilder::default()
                .ip_or_hostname(config.host.clone())
                .tcp_port(config.port_or(3306))
                .user(Some(config.username.clone()))
                .pass(Some(config.password.clone()).filter(|p| !p.is_empty()))
                .db_name(Some(config.database.clone()).filter(|d| !d.is_empty()))
                .pool_opts(pool_opts);
            Self { pool: Pool::new(opts) }
        }
    }

    #[async_trait]
    impl Executor for MysqlPool {
        async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
            let mut conn = self.pool.get_conn().await?;
            query(&mut conn, sql, args).await
        }

        async fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
            let mut conn = self.pool.get_conn().await?;
            execute(&mut conn, sql, args).await
        }
    }

    #[async_trait]
    impl Connection for MysqlPool {
        async fn begin(&self) -> Result<Arc<dyn Transaction>> {
            let tx = self.pool.start_transaction(TxOpts::default()).await?;
            Ok(Arc::new(MysqlTransaction { tx: Mutex::new(Some(tx)) }))
        }
    }

    /// A pooled connection pinned for the life of one transaction.
    ///
    /// `mysql_async` rolls an unfinished transaction back when it is dropped,
    /// before the connection is reused.
    struct MysqlTransaction {
        tx: Mutex<Option<mysql_async::Transaction<'static>>>,
    }

    fn closed() -> Error {
        Error::new(ErrorKind::NoActiveTransaction, "transaction already closed")
    }

    #[async_trait]
    impl Executor for MysqlTransaction {
        async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
            let mut tx = self.tx.lock().await;
            query(tx.as_mut().ok_or_else(closed)?, sql, args).await
        }

        async fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
            let mut tx = self.tx.lock().await;
            execute(tx.as_mut().ok_or_else(closed)?, sql, args).await
        }
    }

    #[async_trait]
    impl Transaction for MysqlTransaction {
        async fn commit(&self) -> Result<()> {
            let tx = self.tx.lock().await.take().ok_or_else(closed)?;
            tx.commit().await?;
            Ok(())
        }

        async fn rollback(&self) -> Result<()> {
            let tx = self.tx.lock().await.take().ok_or_else(closed)?;
            tx.rollback().await?;
            Ok(())
        }
    }

    /// Something statements run on: a pooled `Conn` or an open transaction.
    trait Session: Queryable {
        fn outcome(&self) -> ExecResult;
    }

    impl Session for Conn {
        fn outcome(&self) -> ExecResult {
            ExecResult {
                rows_affected: self.affected_rows(),
                last_insert_id: self.last_insert_id().and_then(|id| i64::try_from(id).ok()),
            }
        }
    }

    impl Session for mysql_async::Transaction<'_> {
        fn outcome(&self) -> ExecResult {
            ExecResult {
                rows_affected: self.affected_rows(),
                last_insert_id: self.last_insert_id().and_then(|id| i64::try_from(id).ok()),
            }
        }
    }

    async fn query<S: Session>(conn: &mut S, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        let rows: Vec<mysql_async::Row> = conn.exec(sql, params(args)?).await?;
        rows.into_iter().map(decode_row).collect()
    }

    async fn execute<S: Session>(conn: &mut S, sql: &str, args: &[Value]) -> Result<ExecResult> {
        conn.exec_drop(sql, params(args)?).await?;
        Ok(conn.outcome())
    }

    fn params(args: &[Value]) -> Result<Params> {
        if args.is_empty() {
            return Ok(Params::Empty);
        }
        args.iter()
            .map(encode)
            .collect::<Result<Vec<_>>>()
            .map(Params::Positional)
    }

    fn encode(value: &Value) -> Result<mysql_async::Value> {
        use chrono::{Datelike, Timelike};

        Ok(match value {
            Value::Null => mysql_async::Value::NULL,
            Value::Bool(v) => mysql_async::Value::Int(i64::from(*v)),
            Value::Int(v) => mysql_async::Value::Int(*v),
            Value::Float(v) => mysql_async::Value::Double(*v),
            Value::Text(v) => mysql_async::Value::Bytes(v.clone().into_bytes()),
            Value::Bytes(v) => mysql_async::Value::Bytes(v.clone()),
            Value::Json(v) => mysql_async::Value::Bytes(v.to_string().into_bytes()),
            Value::Date(d) => mysql_async::Value::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0),
            Value::DateTime(dt) => mysql_async::Value::Date(
                dt.year() as u16,
                dt.month() as u8,
                dt.day() as u8,
                dt.hour() as u8,
                dt.minute() as u8,
                dt.second() as u8,
                dt.nanosecond() / 1_000,
            ),
            Value::Time(t) => mysql_async::Value::Time(
                false,
                0,
                t.hour() as u8,
                t.minute() as u8,
                t.second() as u8,
                t.nanosecond() / 1_000,
            ),
            Value::List(_) => {
                return Err(Error::new(
                    ErrorKind::UnsupportedArgumentKind,
                    "list arguments must be expanded before execution",
                ));
            }
        })
    }

    fn decode_row(row: mysql_async::Row) -> Result<Row> {
        let columns: Vec<(String, ColumnType)> = row
            .columns_ref()
            .iter()
            .map(|c| (c.name_str().into_owned(), c.column_type()))
            .collect();
        let raw = row.unwrap();
        let mut names = Vec::with_capacity(columns.len());
        let mut values = Vec::with_capacity(columns.len());
        for ((name, ty), value) in columns.into_iter().zip(raw) {
            values.push(decode(&name, ty, value)?);
            names.push(name);
        }
        Ok(Row::new(names.into(), values))
    }

    fn decode(name: &str, ty: ColumnType, value: mysql_async::Value) -> Result<Value> {
        Ok(match value {
            mysql_async::Value::NULL => Value::Null,
            mysql_async::Value::Int(v) => Value::Int(v),
            mysql_async::Value::UInt(v) => match i64::try_from(v) {
                Ok(v) => Value::Int(v),
                Err(_) => Value::Text(v.to_string()),
            },
            mysql_async::Value::Float(v) => Value::Float(f64::from(v)),
            mysql_async::Value::Double(v) => Value::Float(v),
            mysql_async::Value::Bytes(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Value::Text(text),
                Err(err) => Value::Bytes(err.into_bytes()),
            },
            mysql_async::Value::Date(y, m, d, h, mi, s, us) => {
                let date = NaiveDate::from_ymd_opt(i32::from(y), u32::from(m), u32::from(d))
                    .ok_or_else(|| Error::decode(name, "invalid date"))?;
                if ty == ColumnType::MYSQL_TYPE_DATE {
                    Value::Date(date)
                } else {
                    let time = NaiveTime::from_hms_micro_opt(u32::from(h), u32::from(mi), u32::from(s), us)
                        .ok_or_else(|| Error::decode(name, "invalid time"))?;
                    Value::DateTime(NaiveDateTime::new(date, time))
                }
            }
            mysql_async::Value::Time(negative, days, h, mi, s, us) => {
                if negative || days > 0 {
                    return Err(Error::decode(name, "time outside of a single day"));
                }
                let time = NaiveTime::from_hms_micro_opt(u32::from(h), u32::from(mi), u32::from(s), us)
                    .ok_or_else(|| Error::decode(name, "invalid time"))?;
                Value::Time(time)
            }
        })
    }
}
