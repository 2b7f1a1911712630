//! `UPDATE` builder.

use std::collections::BTreeMap;

use crate::error::{Error, ErrorKind, Result};
use crate::ql::builder::Builder;
use crate::ql::condition::Condition;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Update<'a> {
    builder: &'a Builder,
    table: String,
    values: BTreeMap<String, Value>,
    columns: Vec<String>,
    condition: Condition,
}

impl<'a> Update<'a> {
    pub(crate) fn new(builder: &'a Builder, table: &str) -> Self {
        Self {
            builder,
            table: table.to_owned(),
            values: BTreeMap::new(),
            columns: Vec::new(),
            condition: Condition::new(),
        }
    }

    pub fn set(mut self, values: BTreeMap<String, Value>) -> Self {
        self.values = values;
        self
    }

    /// Restrict and order the assigned columns; each must have a value.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn and_where(mut self, fragment: &str, args: Vec<Value>) -> Self {
        self.condition.and_where(fragment, args);
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    pub fn to_sql(&self) -> Result<(String, Vec<Value>)> {
        if self.values.is_empty() {
            return Err(Error::new(
                ErrorKind::NoValues,
                format!("update of `{}` has no values", self.table),
            ));
        }

        let columns: Vec<&String> = if self.columns.is_empty() {
            self.values.keys().collect()
        } else {
            self.columns.iter().collect()
        };

        let mut sets = Vec::with_capacity(columns.len());
        let mut args = Vec::with_capacity(columns.len());
        for column in columns {
            let value = self.values.get(column).ok_or_else(|| {
                Error::new(
                    ErrorKind::UnknownColumn,
                    format!("column `{column}` has no value in update of `{}`", self.table),
                )
            })?;
            sets.push(format!("{} = ?", self.builder.quote(column)));
            args.push(value.clone());
        }

        let mut sql = format!("UPDATE {} SET {}", self.builder.quote(&self.table), sets.join(", "));
        let (suffix, where_args) = self.condition.render(self.builder.quote_char())?;
        sql.push_str(&suffix);
        args.extend(where_args);

        Ok((self.builder.placeholder().render(&sql), args))
    }

    /// Returns the number of affected rows.
    pub async fn exec(&self) -> Result<u64> {
        let (sql, args) = self.to_sql()?;
        Ok(self.builder.run_exec(&sql, &args, false).await?.rows_affected)
    }

    pub async fn exec_tx(&self) -> Result<u64> {
        let (sql, args) = self.to_sql()?;
        Ok(self.builder.run_exec(&sql, &args, true).await?.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::ql::mock::mock_builder;
    use pretty_assertions::assert_eq;

    fn values() -> BTreeMap<String, Value> {
        BTreeMap::from([
            ("name".to_string(), Value::from("Eve")),
            ("owner_id".to_string(), Value::Int(3)),
        ])
    }

    #[test]
    fn renders_sets_then_condition() {
        let (builder, _) = mock_builder();
        let (sql, args) = builder
            .update("robots")
            .set(values())
            .and_where("id = ?", args![7])
            .to_sql()
            .unwrap();
        assert_eq!(sql, r#"UPDATE "robots" SET "name" = ?, "owner_id" = ? WHERE id = ?"#);
        assert_eq!(args, args!["Eve", 3, 7]);
    }

    #[test]
    fn fixed_columns_must_exist() {
        let (builder, _) = mock_builder();
        let (sql, _) = builder.update("robots").set(values()).columns(["owner_id"]).to_sql().unwrap();
        assert_eq!(sql, r#"UPDATE "robots" SET "owner_id" = ?"#);

        let err = builder
            .update("robots")
            .set(values())
            .columns(["color"])
            .to_sql()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownColumn);
    }

    #[test]
    fn empty_values_fail() {
        let (builder, _) = mock_builder();
        let err = builder.update("robots").to_sql().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoValues);
    }
}
