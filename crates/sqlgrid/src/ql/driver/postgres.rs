//! PostgreSQL dialect.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::ql::builder::Builder;
use crate::ql::column::{AbstractType, Column, ForeignKey};
use crate::ql::conn::Connection;
use crate::ql::driver::Driver;
use crate::ql::information::{ColumnQuery, ForeignKeyQuery, describe_columns, describe_foreign_keys};
use crate::ql::placeholder::Placeholder;
use crate::value::Value;

// information_schema columns are domain types; cast so rows decode as plain text/int8.
const COLUMNS: ColumnQuery = ColumnQuery {
    from: "information_schema.columns c",
    name: "c.column_name::text",
    position: "c.ordinal_position::bigint",
    nullable: "c.is_nullable::text",
    primary: "EXISTS (SELECT 1 FROM information_schema.table_constraints tc \
              JOIN information_schema.key_column_usage kcu \
              ON kcu.constraint_name = tc.constraint_name AND kcu.table_schema = tc.table_schema \
              AND kcu.table_name = tc.table_name \
              WHERE tc.constraint_type = 'PRIMARY KEY' AND kcu.table_schema = c.table_schema \
              AND kcu.table_name = c.table_name AND kcu.column_name = c.column_name)",
    raw_type: "c.data_type::text",
    default_value: "c.column_default::text",
    length: "c.character_maximum_length::bigint",
    autoincrement: "(COALESCE(c.column_default::text, '') LIKE 'nextval(%' OR c.is_identity::text = 'YES')",
    scope: "c.table_catalog = ? AND c.table_schema = ?",
    table: "c.table_name",
};

const FOREIGN_KEYS: ForeignKeyQuery = ForeignKeyQuery {
    from: "information_schema.table_constraints tc",
    joins: &[
        (
            "information_schema.key_column_usage kcu",
            "tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema",
        ),
        (
            "information_schema.constraint_column_usage ccu",
            "ccu.constraint_name = tc.constraint_name AND ccu.table_schema = tc.table_schema",
        ),
    ],
    constraint: "tc.constraint_name::text",
    column: "kcu.column_name::text",
    referenced_table: "ccu.table_name::text",
    referenced_column: "ccu.column_name::text",
    scope: "tc.constraint_type = 'FOREIGN KEY' AND tc.table_catalog = ? AND tc.table_schema = ? AND tc.table_name = ?",
};

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDriver;

impl PostgresDriver {
    fn scope(builder: &Builder, database: &str) -> Vec<Value> {
        let schema = builder.config().schema.as_str();
        let schema = if schema.is_empty() { "public" } else { schema };
        vec![Value::from(database), Value::from(schema)]
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    fn name(&self) -> &'static str {
        "postgres"
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
        describe_columns(builder, &COLUMNS, Self::scope(builder, database), table, columns).await
    }

    async fn foreign_keys(&self, builder: &Builder, database: &str, table: &str) -> Result<Vec<ForeignKey>> {
        describe_foreign_keys(builder, &FOREIGN_KEYS, Self::scope(builder, database), table).await
    }

    fn type_mapping(&self, raw: &str, column: &Column) -> Option<AbstractType> {
        let raw = raw.trim().to_ascii_lowercase();
        let ty = match raw.as_str() {
            "smallint" => AbstractType::integer(16, false),
            "integer" => AbstractType::integer(32, false),
            "bigint" => AbstractType::integer(64, false),
            "boolean" => AbstractType::Integer { min: 0, max: 1 },
            "character varying" | "character" => AbstractType::Text { size: column.length },
            "text" | "json" | "jsonb" => AbstractType::TextArea { size: column.length },
            "real" | "double precision" | "numeric" => AbstractType::Float,
            "date" => AbstractType::Date,
            t if t.starts_with("timestamp") => AbstractType::DateTime,
            t if t.starts_with("time") => AbstractType::Time,
            _ => return None,
        };
        Some(ty)
    }

    fn placeholder(&self) -> Placeholder {
        Placeholder::DOLLAR
    }

    fn quote_character(&self) -> char {
        '"'
    }

    fn returning(&self) -> bool {
        true
    }
}

#[cfg(not(feature = "postgres"))]
fn connect(config: &DatabaseConfig) -> Result<Arc<dyn Connection>> {
    Err(crate::error::Error::new(
        crate::error::ErrorKind::Unconfigured,
        format!("driver `{}` needs the `postgres` feature", config.driver),
    ))
}

#[cfg(feature = "postgres")]
fn connect(config: &DatabaseConfig) -> Result<Arc<dyn Connection>> {
    Ok(Arc::new(pool::PgPool::new(config)?))
}

#[cfg(feature = "postgres")]
mod pool {
    use std::str::FromStr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use bytes::BytesMut;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
    use rust_decimal::Decimal;
    use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
    use tokio_postgres::NoTls;
    use tokio_postgres::types::{IsNull, Kind, ToSql, Type, to_sql_checked};

    use crate::config::{DatabaseConfig, postgres_dsn};
    use crate::error::{Error, ErrorKind, Result};
    use crate::ql::conn::{Connection, ExecResult, Executor, Transaction};
    use crate::row::Row;
    use crate::value::Value;

    type BoxError = Box<dyn std::error::Error + Sync + Send>;

    pub(super) struct PgPool {
        pool: Pool,
    }

    impl PgPool {
        pub(super) fn new(config: &DatabaseConfig) -> Result<Self> {
            let pg_config: tokio_postgres::Config = postgres_dsn(config)
                .parse()
                .map_err(|e: tokio_postgres::Error| Error::new(ErrorKind::ConfigError, e.to_string()))?;
            let mgr = Manager::from_config(
                pg_config,
                NoTls,
                ManagerConfig {
                    recycling_method: RecyclingMethod::Fast,
                },
            );
            let pool = Pool::builder(mgr)
                .max_size(config.max_connections.max(1))
                .build()
                .map_err(|e| Error::new(ErrorKind::ConfigError, e.to_string()))?;
            Ok(Self { pool })
        }
    }

    #[async_trait]
    impl Executor for PgPool {
        async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
            let client = self.pool.get().await?;
            query(&client, sql, args).await
        }

        async fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
            let client = self.pool.get().await?;
            execute(&client, sql, args).await
        }
    }

    #[async_trait]
    impl Connection for PgPool {
        async fn begin(&self) -> Result<Arc<dyn Transaction>> {
            let client = self.pool.get().await?;
            client.batch_execute("BEGIN").await?;
            Ok(Arc::new(PgTransaction {
                client: Some(client),
                finished: AtomicBool::new(false),
            }))
        }
    }

    /// A pooled client pinned for the life of one transaction.
    ///
    /// Dropped unfinished, the client is rolled back before it returns to the
    /// pool, or detached from the pool when that is not possible.
    struct PgTransaction {
        client: Option<Object>,
        finished: AtomicBool,
    }

    impl PgTransaction {
        fn client(&self) -> Result<&Object> {
            self.client
                .as_ref()
                .ok_or_else(|| Error::new(ErrorKind::NoActiveTransaction, "transaction already closed"))
        }

        async fn close(&self, statement: &str) -> Result<()> {
            self.client()?.batch_execute(statement).await?;
            self.finished.store(true, Ordering::Release);
            Ok(())
        }
    }

    impl Drop for PgTransaction {
        fn drop(&mut self) {
            if self.finished.swap(true, Ordering::AcqRel) {
                return;
            }
            let Some(client) = self.client.take() else {
                return;
            };
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(err) = client.batch_execute("ROLLBACK").await {
                            tracing::warn!(target: "sqlgrid::sql", error = %err, "rollback of abandoned transaction failed");
                            drop(Object::take(client));
                        }
                    });
                }
                Err(_) => {
                    tracing::warn!(target: "sqlgrid::sql", "abandoned transaction outside a runtime, discarding connection");
                    drop(Object::take(client));
                }
            }
        }
    }

    #[async_trait]
    impl Executor for PgTransaction {
        async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
            query(self.client()?, sql, args).await
        }

        async fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
            execute(self.client()?, sql, args).await
        }
    }

    #[async_trait]
    impl Transaction for PgTransaction {
        async fn commit(&self) -> Result<()> {
            self.close("COMMIT").await
        }

        async fn rollback(&self) -> Result<()> {
            self.close("ROLLBACK").await
        }
    }

    async fn query(client: &Object, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        reject_lists(args)?;
        let stmt = client.prepare_cached(sql).await?;
        let params: Vec<PgValue<'_>> = args.iter().map(PgValue).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let rows = client.query(&stmt, &refs).await?;

        let Some(first) = rows.first() else {
            return Ok(Vec::new());
        };
        let names: Arc<[String]> = first.columns().iter().map(|c| c.name().to_owned()).collect();
        rows.iter()
            .map(|row| {
                let values = (0..row.len()).map(|idx| decode(row, idx)).collect::<Result<Vec<_>>>()?;
                Ok(Row::new(names.clone(), values))
            })
            .collect()
    }

    async fn execute(client: &Object, sql: &str, args: &[Value]) -> Result<ExecResult> {
        reject_lists(args)?;
        let stmt = client.prepare_cached(sql).await?;
        let params: Vec<PgValue<'_>> = args.iter().map(PgValue).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let rows_affected = client.execute(&stmt, &refs).await?;
        Ok(ExecResult {
            rows_affected,
            last_insert_id: None,
        })
    }

    fn reject_lists(args: &[Value]) -> Result<()> {
        if args.iter().any(|a| matches!(a, Value::List(_))) {
            return Err(Error::new(
                ErrorKind::UnsupportedArgumentKind,
                "list arguments must be expanded before execution",
            ));
        }
        Ok(())
    }

    fn decode(row: &tokio_postgres::Row, idx: usize) -> Result<Value> {
        let column = &row.columns()[idx];
        let name = column.name();
        let get = |e: tokio_postgres::Error| Error::decode(name, e);

        let value = match *column.type_() {
            Type::BOOL => row.try_get::<_, Option<bool>>(idx).map_err(get)?.map(Value::Bool),
            Type::INT2 => row.try_get::<_, Option<i16>>(idx).map_err(get)?.map(|v| Value::Int(v.into())),
            Type::INT4 => row.try_get::<_, Option<i32>>(idx).map_err(get)?.map(|v| Value::Int(v.into())),
            Type::INT8 => row.try_get::<_, Option<i64>>(idx).map_err(get)?.map(Value::Int),
            Type::OID => row.try_get::<_, Option<u32>>(idx).map_err(get)?.map(|v| Value::Int(v.into())),
            Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx).map_err(get)?.map(|v| Value::Float(v.into())),
            Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx).map_err(get)?.map(Value::Float),
            Type::NUMERIC => row
                .try_get::<_, Option<Decimal>>(idx)
                .map_err(get)?
                .map(|v| v.to_f64().map(Value::Float).unwrap_or_else(|| Value::Text(v.to_string()))),
            Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx).map_err(get)?.map(Value::Bytes),
            Type::DATE => row.try_get::<_, Option<NaiveDate>>(idx).map_err(get)?.map(Value::Date),
            Type::TIME => row.try_get::<_, Option<NaiveTime>>(idx).map_err(get)?.map(Value::Time),
            Type::TIMESTAMP => row
                .try_get::<_, Option<NaiveDateTime>>(idx)
                .map_err(get)?
                .map(Value::DateTime),
            Type::TIMESTAMPTZ => row
                .try_get::<_, Option<DateTime<Utc>>>(idx)
                .map_err(get)?
                .map(|v| Value::DateTime(v.naive_utc())),
            Type::JSON | Type::JSONB => row
                .try_get::<_, Option<serde_json::Value>>(idx)
                .map_err(get)?
                .map(Value::Json),
            Type::UUID => row
                .try_get::<_, Option<uuid::Uuid>>(idx)
                .map_err(get)?
                .map(|v| Value::Text(v.to_string())),
            _ => row.try_get::<_, Option<String>>(idx).map_err(get)?.map(Value::Text),
        };
        Ok(value.unwrap_or(Value::Null))
    }

    /// Binds a [`Value`] to whatever type the server inferred for the parameter.
    #[derive(Debug)]
    struct PgValue<'a>(&'a Value);

    fn unsupported(value: &Value, ty: &Type) -> BoxError {
        format!("cannot bind {} argument to {ty}", value.kind_name()).into()
    }

    fn is_text(ty: &Type) -> bool {
        matches!(*ty, Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN)
    }

    impl ToSql for PgValue<'_> {
        fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
            match self.0 {
                Value::Null => Ok(IsNull::Yes),
                Value::Bool(v) => match *ty {
                    Type::BOOL => v.to_sql(ty, out),
                    Type::INT2 => i16::from(*v).to_sql(ty, out),
                    Type::INT4 => i32::from(*v).to_sql(ty, out),
                    Type::INT8 => i64::from(*v).to_sql(ty, out),
                    _ if is_text(ty) => v.to_string().to_sql(ty, out),
                    _ => Err(unsupported(self.0, ty)),
                },
                Value::Int(v) => match *ty {
                    Type::INT2 => i16::try_from(*v)?.to_sql(ty, out),
                    Type::INT4 => i32::try_from(*v)?.to_sql(ty, out),
                    Type::INT8 => v.to_sql(ty, out),
                    Type::OID => u32::try_from(*v)?.to_sql(ty, out),
                    Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                    Type::FLOAT8 => (*v as f64).to_sql(ty, out),
                    Type::NUMERIC => Decimal::from(*v).to_sql(ty, out),
                    Type::BOOL => (*v != 0).to_sql(ty, out),
                    _ if is_text(ty) => v.to_string().to_sql(ty, out),
                    _ => Err(unsupported(self.0, ty)),
                },
                Value::Float(v) => match *ty {
                    Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                    Type::FLOAT8 => v.to_sql(ty, out),
                    Type::NUMERIC => Decimal::from_f64(*v)
                        .ok_or_else(|| unsupported(self.0, ty))?
                        .to_sql(ty, out),
                    _ if is_text(ty) => v.to_string().to_sql(ty, out),
                    _ => Err(unsupported(self.0, ty)),
                },
                Value::Text(v) => match *ty {
                    Type::INT2 => v.trim().parse::<i16>()?.to_sql(ty, out),
                    Type::INT4 => v.trim().parse::<i32>()?.to_sql(ty, out),
                    Type::INT8 => v.trim().parse::<i64>()?.to_sql(ty, out),
                    Type::FLOAT4 => v.trim().parse::<f32>()?.to_sql(ty, out),
                    Type::FLOAT8 => v.trim().parse::<f64>()?.to_sql(ty, out),
                    Type::NUMERIC => Decimal::from_str(v.trim())?.to_sql(ty, out),
                    Type::BOOL => matches!(v.as_str(), "1" | "t" | "true" | "TRUE").to_sql(ty, out),
                    Type::UUID => uuid::Uuid::parse_str(v)?.to_sql(ty, out),
                    Type::DATE => v.parse::<NaiveDate>()?.to_sql(ty, out),
                    Type::TIME => v.parse::<NaiveTime>()?.to_sql(ty, out),
                    Type::TIMESTAMP => NaiveDateTime::parse_from_str(v, "%Y-%m-%d %H:%M:%S%.f")?.to_sql(ty, out),
                    Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(v)?.to_sql(ty, out),
                    // text, varchar and enum labels share the plain byte encoding
                    _ if is_text(ty) || matches!(ty.kind(), Kind::Enum(_)) => {
                        out.extend_from_slice(v.as_bytes());
                        Ok(IsNull::No)
                    }
                    _ => Err(unsupported(self.0, ty)),
                },
                Value::Bytes(v) => v.to_sql(ty, out),
                Value::Date(v) => match *ty {
                    Type::TIMESTAMP => v.and_time(NaiveTime::MIN).to_sql(ty, out),
                    _ if is_text(ty) => v.to_string().to_sql(ty, out),
                    _ => v.to_sql(ty, out),
                },
                Value::Time(v) => match *ty {
                    _ if is_text(ty) => v.to_string().to_sql(ty, out),
                    _ => v.to_sql(ty, out),
                },
                Value::DateTime(v) => match *ty {
                    Type::TIMESTAMPTZ => DateTime::<Utc>::from_naive_utc_and_offset(*v, Utc).to_sql(ty, out),
                    Type::DATE => v.date().to_sql(ty, out),
                    _ if is_text(ty) => v.to_string().to_sql(ty, out),
                    _ => v.to_sql(ty, out),
                },
                Value::Json(v) => match *ty {
                    Type::JSON | Type::JSONB => v.to_sql(ty, out),
                    _ if is_text(ty) => v.to_string().to_sql(ty, out),
                    _ => Err(unsupported(self.0, ty)),
                },
                Value::List(_) => Err(unsupported(self.0, ty)),
            }
        }

        fn accepts(_ty: &Type) -> bool {
            true
        }

        to_sql_checked!();
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn bind(value: &Value, ty: &Type) -> std::result::Result<BytesMut, BoxError> {
            let mut out = BytesMut::new();
            PgValue(value).to_sql(ty, &mut out)?;
            Ok(out)
        }

        #[test]
        fn text_binds_as_raw_bytes_only_to_text_and_enums() {
            let value = Value::from("sony");
            assert_eq!(&bind(&value, &Type::VARCHAR).unwrap()[..], b"sony");

            let mood = Type::new("mood".into(), 0, Kind::Enum(vec!["sony".into()]), "public".into());
            assert_eq!(&bind(&value, &mood).unwrap()[..], b"sony");

            assert!(bind(&value, &Type::INT4_ARRAY).is_err());
            assert!(bind(&value, &Type::POINT).is_err());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(raw: &str, length: Option<i64>) -> Option<AbstractType> {
        let column = Column {
            length,
            ..Column::default()
        };
        PostgresDriver.type_mapping(raw, &column)
    }

    #[test]
    fn type_mapping() {
        assert_eq!(map("integer", None), Some(AbstractType::integer(32, false)));
        assert_eq!(map("boolean", None), Some(AbstractType::Integer { min: 0, max: 1 }));
        assert_eq!(map("character varying", Some(40)), Some(AbstractType::Text { size: Some(40) }));
        assert_eq!(map("jsonb", None), Some(AbstractType::TextArea { size: None }));
        assert_eq!(map("double precision", None), Some(AbstractType::Float));
        assert_eq!(map("timestamp with time zone", None), Some(AbstractType::DateTime));
        assert_eq!(map("time without time zone", None), Some(AbstractType::Time));
        assert_eq!(map("date", None), Some(AbstractType::Date));
        assert_eq!(map("tsvector", None), None);
    }

    #[test]
    fn dialect() {
        assert_eq!(PostgresDriver.placeholder(), Placeholder::DOLLAR);
        assert_eq!(PostgresDriver.quote_character(), '"');
        assert!(PostgresDriver.returning());
    }
}
