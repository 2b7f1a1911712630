//! `DELETE` builder.

use crate::error::Result;
use crate::ql::builder::Builder;
use crate::ql::condition::Condition;
use crate::value::Value;

/// `DELETE FROM <from> [condition]`; without a `WHERE` every row is deleted.
#[derive(Debug, Clone)]
pub struct Delete<'a> {
    builder: &'a Builder,
    from: String,
    condition: Condition,
}

impl<'a> Delete<'a> {
    pub(crate) fn new(builder: &'a Builder, from: &str) -> Self {
        Self {
            builder,
            from: from.to_owned(),
            condition: Condition::new(),
        }
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
        let (suffix, args) = self.condition.render(self.builder.quote_char())?;
        let sql = format!("DELETE FROM {}{suffix}", self.builder.quote(&self.from));
        Ok((self.builder.placeholder().render(&sql), args))
    }

    pub async fn exec(&self) -> Result<u64> {
        let (sql, args) = self.to_sql()?;
        Ok(self.builder.run_exec(&sql, &args, false).await?.rows_affected)
    }

    pub async fn exec_tx(&self) -> Result<u64> {
        let (sql, args) = self.to_sql()?;
        Ok(self.builder.run_exec(&sql, &args, true).await?.rows_affected)
    }
}
