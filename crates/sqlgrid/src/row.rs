//! Result rows decoded into [`Value`]s

use std::sync::Arc;

use crate::error::{Error, ErrorKind, Result};
use crate::value::{FromValue, Value};

/// One result row; column names are shared between the rows of a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Convenience constructor for literal rows (tests, mock drivers).
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let (columns, values): (Vec<String>, Vec<Value>) =
            pairs.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Self {
            columns: columns.into(),
            values,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|idx| self.values.get(idx))
    }

    pub fn get_at(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Decode a column, returning a `Decode` error naming the column on failure.
    pub fn try_get<T: FromValue>(&self, column: &str) -> Result<T> {
        let value = self.get(column).cloned().ok_or_else(|| {
            Error::new(ErrorKind::UnknownColumn, format!("column `{column}` not in row"))
        })?;
        T::from_value(value).map_err(|e| e.context(column))
    }

    pub fn try_get_at<T: FromValue>(&self, idx: usize) -> Result<T> {
        let value = self.values.get(idx).cloned().ok_or_else(|| {
            Error::new(ErrorKind::UnknownColumn, format!("column #{idx} not in row"))
        })?;
        T::from_value(value).map_err(|e| e.context(idx))
    }

    pub fn into_pairs(self) -> impl Iterator<Item = (String, Value)> {
        self.columns.to_vec().into_iter().zip(self.values)
    }
}
