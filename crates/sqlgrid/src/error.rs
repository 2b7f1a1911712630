//! Error types for sqlgrid

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Result type alias for sqlgrid operations
pub type Result<T> = std::result::Result<T, Error>;

type BoxedSource = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Classification of every failure the crate reports.
///
/// The `Display` form of a kind is what the grid exposes to clients, so it
/// never carries statement text or argument values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // validation
    ArgumentMismatch,
    UnsupportedArgumentKind,
    UnknownColumn,
    NoValues,
    NoPrimary,
    MissingPrimary,
    MissingStructField,
    JsonInvalid,
    BodyEmpty,
    InvalidParam,
    Decode,

    // configuration
    Unconfigured,
    NoCache,
    NoDatabase,
    DuplicateProvider,
    UnknownDriver,
    UnknownStrategy,
    UnknownProvider,
    ConfigError,

    // schema
    SchemaMismatch,
    TableNotFound,
    RelationKind,
    PolymorphicNotAllowed,
    SelfReference,

    // runtime
    NoRows,
    NoActiveTransaction,
    TransactionActive,
    Forbidden,
    UnknownMode,
    Driver,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ArgumentMismatch => "argument mismatch",
            ErrorKind::UnsupportedArgumentKind => "unsupported argument kind",
            ErrorKind::UnknownColumn => "unknown column",
            ErrorKind::NoValues => "no values",
            ErrorKind::NoPrimary => "no primary key",
            ErrorKind::MissingPrimary => "missing primary key",
            ErrorKind::MissingStructField => "missing struct field",
            ErrorKind::JsonInvalid => "invalid json",
            ErrorKind::BodyEmpty => "request body is empty",
            ErrorKind::InvalidParam => "invalid parameter",
            ErrorKind::Decode => "decode error",
            ErrorKind::Unconfigured => "unconfigured",
            ErrorKind::NoCache => "no cache",
            ErrorKind::NoDatabase => "no database",
            ErrorKind::DuplicateProvider => "duplicate provider",
            ErrorKind::UnknownDriver => "unknown driver",
            ErrorKind::UnknownStrategy => "unknown strategy",
            ErrorKind::UnknownProvider => "unknown provider",
            ErrorKind::ConfigError => "config error",
            ErrorKind::SchemaMismatch => "schema mismatch",
            ErrorKind::TableNotFound => "table not found",
            ErrorKind::RelationKind => "invalid relation kind",
            ErrorKind::PolymorphicNotAllowed => "polymorphic not allowed",
            ErrorKind::SelfReference => "self reference",
            ErrorKind::NoRows => "no rows",
            ErrorKind::NoActiveTransaction => "no active transaction",
            ErrorKind::TransactionActive => "transaction already active",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::UnknownMode => "unknown mode",
            ErrorKind::Driver => "driver error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by every fallible operation.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    source: Option<BoxedSource>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a backend error, keeping it reachable through `source()`.
    pub fn driver<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind: ErrorKind::Driver,
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }

    /// Create a decode error for a specific column or field
    pub fn decode(column: impl AsRef<str>, message: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::Decode,
            format!("{}: {}", column.as_ref(), message),
        )
    }

    pub fn no_rows(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoRows, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if no row matched a `first` lookup.
    pub fn is_no_rows(&self) -> bool {
        self.kind == ErrorKind::NoRows
    }

    /// Prefix the message with the name of the item being processed.
    pub fn context(mut self, what: impl fmt::Display) -> Self {
        self.message = format!("{what}: {}", self.message);
        self
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self {
            kind: ErrorKind::JsonInvalid,
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self {
            kind: ErrorKind::ConfigError,
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for Error {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::driver(err)
    }
}

#[cfg(feature = "postgres")]
impl From<deadpool_postgres::PoolError> for Error {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::driver(err)
    }
}

#[cfg(feature = "mysql")]
impl From<mysql_async::Error> for Error {
    fn from(err: mysql_async::Error) -> Self {
        Self::driver(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = Error::new(ErrorKind::NoValues, "update of \"robots\"");
        assert_eq!(err.to_string(), "no values: update of \"robots\"");
        assert_eq!(err.kind().to_string(), "no values");
    }

    #[test]
    fn driver_errors_keep_their_source() {
        let io = std::io::Error::other("socket closed");
        let err = Error::driver(io);
        assert_eq!(err.kind(), ErrorKind::Driver);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn context_prefixes_message() {
        let err = Error::decode("age", "expected integer").context("users");
        assert_eq!(err.message(), "users: age: expected integer");
        assert_eq!(err.kind(), ErrorKind::Decode);
    }
}
