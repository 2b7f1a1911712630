//! Database drivers.
//!
//! A [`Driver`] owns a dialect (placeholder style, identifier quoting,
//! `RETURNING` support), the way to open a [`Connection`] pool, and the
//! information-schema queries used for introspection. Drivers are looked up
//! by name; `mysql`, `mariadb`, `postgres` and `postgresql` are built in.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use crate::config::DatabaseConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::ql::builder::Builder;
use crate::ql::column::{AbstractType, Column, ForeignKey};
use crate::ql::conn::Connection;
use crate::ql::placeholder::Placeholder;
use crate::registry::Registry;

pub mod mysql;
pub mod postgres;

pub use mysql::MysqlDriver;
pub use postgres::PostgresDriver;

#[async_trait]
pub trait Driver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Open a connection pool for `config`.
    async fn connect(&self, config: &DatabaseConfig) -> Result<Arc<dyn Connection>>;

    /// Columns of `database.table`, restricted to `columns` when non-empty,
    /// ordered by position.
    async fn describe(
        &self,
        builder: &Builder,
        database: &str,
        table: &str,
        columns: &[String],
    ) -> Result<Vec<Column>>;

    /// Foreign keys declared on `database.table`.
    async fn foreign_keys(&self, builder: &Builder, database: &str, table: &str) -> Result<Vec<ForeignKey>>;

    /// Classify a raw column type; `None` when the type has no abstract form.
    fn type_mapping(&self, raw: &str, column: &Column) -> Option<AbstractType>;

    fn placeholder(&self) -> Placeholder;

    fn quote_character(&self) -> char;

    /// Whether `INSERT ... RETURNING` is supported.
    fn returning(&self) -> bool {
        false
    }
}

/// Link-time registration of a driver.
pub struct DriverRegistration {
    pub name: &'static str,
    pub create: fn() -> Arc<dyn Driver>,
}

inventory::collect!(DriverRegistration);

fn new_mysql() -> Arc<dyn Driver> {
    Arc::new(MysqlDriver)
}

fn new_postgres() -> Arc<dyn Driver> {
    Arc::new(PostgresDriver)
}

inventory::submit! { DriverRegistration { name: "mysql", create: new_mysql } }
inventory::submit! { DriverRegistration { name: "mariadb", create: new_mysql } }
inventory::submit! { DriverRegistration { name: "postgres", create: new_postgres } }
inventory::submit! { DriverRegistration { name: "postgresql", create: new_postgres } }

fn drivers() -> &'static Registry<dyn Driver> {
    static DRIVERS: OnceLock<Registry<dyn Driver>> = OnceLock::new();
    DRIVERS.get_or_init(|| {
        let registry = Registry::new("driver");
        for entry in inventory::iter::<DriverRegistration> {
            if let Err(err) = registry.register(entry.name, (entry.create)()) {
                tracing::warn!(target: "sqlgrid::sql", error = %err, "skipping driver");
            }
        }
        registry
    })
}

/// Add a driver under `name`; names cannot be replaced.
pub fn register(name: &str, driver: Arc<dyn Driver>) -> Result<()> {
    drivers().register(name, driver)
}

pub fn get(name: &str) -> Result<Arc<dyn Driver>> {
    drivers()
        .get(name)
        .ok_or_else(|| Error::new(ErrorKind::UnknownDriver, format!("driver `{name}` is not registered")))
}

/// Registered driver names, sorted.
pub fn names() -> Vec<String> {
    drivers().names()
}

/// Items of an `enum('a','b')` / `set('a','b')` type spelling.
pub(crate) fn parse_items(raw: &str) -> Vec<String> {
    let Some(start) = raw.find('(') else {
        return Vec::new();
    };
    let Some(end) = raw.rfind(')') else {
        return Vec::new();
    };
    if end <= start {
        return Vec::new();
    }

    let mut items = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = raw[start + 1..end].chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\'' if quoted && chars.peek() == Some(&'\'') => {
                chars.next();
                current.push('\'');
            }
            '\'' => {
                if quoted {
                    items.push(std::mem::take(&mut current));
                }
                quoted = !quoted;
            }
            _ if quoted => current.push(ch),
            _ => {}
        }
    }
    items
}

/// Declared size in `varchar(255)`-style spellings.
pub(crate) fn parse_size(raw: &str) -> Option<i64> {
    let start = raw.find('(')?;
    let end = raw[start..].find(')')? + start;
    raw[start + 1..end].split(',').next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        for name in ["mysql", "mariadb", "postgres", "postgresql"] {
            assert!(get(name).is_ok(), "{name}");
        }
        assert_eq!(get("postgresql").unwrap().placeholder(), Placeholder::DOLLAR);
        assert_eq!(get("mysql").unwrap().quote_character(), '`');
        assert_eq!(get("sqlite").err().unwrap().kind(), ErrorKind::UnknownDriver);
    }

    #[test]
    fn names_cannot_be_replaced() {
        let err = register("mysql", Arc::new(PostgresDriver)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateProvider);
        assert_eq!(get("mysql").unwrap().name(), "mysql");
    }

    #[test]
    fn enum_items_are_unquoted() {
        assert_eq!(parse_items("enum('red','green','it''s')"), vec!["red", "green", "it's"]);
        assert_eq!(parse_items("set('a')"), vec!["a"]);
        assert!(parse_items("int").is_empty());
    }

    #[test]
    fn sizes() {
        assert_eq!(parse_size("varchar(255)"), Some(255));
        assert_eq!(parse_size("decimal(10,2)"), Some(10));
        assert_eq!(parse_size("text"), None);
    }
}
