//! Typed configuration and the layered JSON loader.
//!
//! Configuration lives in `<name>.json` under a directory. When an
//! environment is given, `<env>.<name>.json` is merged over it key by key,
//! with the environment file winning.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind, Result};

/// Where to find a layered configuration.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub filepath: PathBuf,
    pub name: String,
    pub env: Option<String>,
}

impl LoadOptions {
    pub fn new(filepath: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            filepath: filepath.into(),
            name: name.into(),
            env: None,
        }
    }

    pub fn env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }
}

/// Read `<name>.json` (plus the env overlay) and deserialize it into `T`.
pub fn load<T: DeserializeOwned>(options: &LoadOptions) -> Result<T> {
    let merged = load_value(options)?;
    serde_json::from_value(merged).map_err(|e| Error::new(ErrorKind::ConfigError, e.to_string()))
}

/// Read and merge the JSON documents without deserializing.
pub fn load_value(options: &LoadOptions) -> Result<serde_json::Value> {
    if options.filepath.as_os_str().is_empty() {
        return Err(Error::new(ErrorKind::ConfigError, "filepath is required"));
    }
    if options.name.is_empty() {
        return Err(Error::new(ErrorKind::ConfigError, "config name is required"));
    }

    let base = read_json(&options.filepath.join(format!("{}.json", options.name)))?;
    let Some(env) = options.env.as_deref().filter(|e| !e.is_empty()) else {
        return Ok(base);
    };

    let overlay = read_json(&options.filepath.join(format!("{env}.{}.json", options.name)))?;
    let mut merged = base;
    merge(&mut merged, overlay);
    Ok(merged)
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::new(ErrorKind::ConfigError, format!("{}: {e}", path.display()))
    })?;
    serde_json::from_str(&raw)
        .map_err(|e| Error::new(ErrorKind::ConfigError, format!("{}: {e}", path.display())))
}

/// Deep-merge `overlay` into `base`; objects merge per key, everything else is replaced.
pub fn merge(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Connection settings for a [`Builder`](crate::ql::Builder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub driver: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    /// PostgreSQL schema used for introspection; `public` when empty.
    pub schema: String,
    /// Log every statement at debug level.
    pub debug: bool,
    pub max_connections: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: String::new(),
            host: "127.0.0.1".to_string(),
            port: 0,
            username: String::new(),
            password: String::new(),
            database: String::new(),
            schema: String::new(),
            debug: false,
            max_connections: 16,
        }
    }
}

impl DatabaseConfig {
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            ..Self::default()
        }
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Connection string in the format of the configured driver family.
    pub fn dsn(&self) -> Result<String> {
        match self.driver.as_str() {
            "mysql" | "mariadb" => Ok(mysql_dsn(self)),
            "postgres" | "postgresql" => Ok(postgres_dsn(self)),
            other => Err(Error::new(ErrorKind::UnknownDriver, format!("no dsn format for `{other}`"))),
        }
    }

    pub(crate) fn port_or(&self, default: u16) -> u16 {
        if self.port == 0 { default } else { self.port }
    }
}

/// `user:pass@tcp(host:port)/db?charset=utf8&parseTime=true`
pub fn mysql_dsn(config: &DatabaseConfig) -> String {
    format!(
        "{}:{}@tcp({}:{})/{}?charset=utf8&parseTime=true",
        config.username,
        config.password,
        config.host,
        config.port_or(3306),
        config.database
    )
}

/// `host=H port=P user=U [password=W] [dbname=D] sslmode=disable`
pub fn postgres_dsn(config: &DatabaseConfig) -> String {
    let mut dsn = format!(
        "host={} port={} user={}",
        config.host,
        config.port_or(5432),
        config.username
    );
    if !config.password.is_empty() {
        dsn.push_str(&format!(" password={}", config.password));
    }
    if !config.database.is_empty() {
        dsn.push_str(&format!(" dbname={}", config.database));
    }
    dsn.push_str(" sslmode=disable");
    dsn
}
