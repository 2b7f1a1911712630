//! `SELECT` builder.

use crate::error::{Error, Result};
use crate::ql::builder::Builder;
use crate::ql::condition::Condition;
use crate::row::Row;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    fn keyword(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL JOIN",
        }
    }
}

#[derive(Debug, Clone)]
struct Join {
    kind: JoinType,
    table: String,
    on: Condition,
}

/// `SELECT <cols> FROM <from> [joins] [condition]`.
///
/// Columns prefixed with `!` are emitted verbatim; everything else is quoted.
/// The `ON` clause of each join comes from its own condition; `ON`
/// fragments on the main condition are not rendered.
#[derive(Debug, Clone)]
pub struct Select<'a> {
    builder: &'a Builder,
    from: String,
    columns: Vec<String>,
    joins: Vec<Join>,
    condition: Condition,
}

impl<'a> Select<'a> {
    pub(crate) fn new(builder: &'a Builder, from: &str) -> Self {
        Self {
            builder,
            from: from.to_owned(),
            columns: Vec::new(),
            joins: Vec::new(),
            condition: Condition::new(),
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn join(mut self, kind: JoinType, table: &str, on: Condition) -> Self {
        self.joins.push(Join {
            kind,
            table: table.to_owned(),
            on,
        });
        self
    }

    pub fn and_where(mut self, fragment: &str, args: Vec<Value>) -> Self {
        self.condition.and_where(fragment, args);
        self
    }

    pub fn having(mut self, fragment: &str, args: Vec<Value>) -> Self {
        self.condition.having(fragment, args);
        self
    }

    pub fn group<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.condition.group(columns);
        self
    }

    pub fn order<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.condition.order(columns);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.condition.limit(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.condition.offset(n);
        self
    }

    /// Replace the whole condition.
    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    pub fn condition_mut(&mut self) -> &mut Condition {
        &mut self.condition
    }

    /// Render the statement in the builder's dialect.
    pub fn to_sql(&self) -> Result<(String, Vec<Value>)> {
        let quote = self.builder.quote_char();
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(|c| self.builder.quote(c))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut sql = format!("SELECT {columns} FROM {}", self.builder.quote(&self.from));
        let mut args = Vec::new();
        for join in &self.joins {
            let (on, on_args) = join.on.render_on()?;
            sql.push_str(&format!(
                " {} {} ON {on}",
                join.kind.keyword(),
                self.builder.quote(&join.table)
            ));
            args.extend(on_args);
        }

        let (suffix, where_args) = self.condition.render(quote)?;
        sql.push_str(&suffix);
        args.extend(where_args);

        Ok((self.builder.placeholder().render(&sql), args))
    }

    /// First row of the result; `NoRows` when there is none.
    pub async fn first(&self) -> Result<Row> {
        self.fetch_first(false).await
    }

    pub async fn first_tx(&self) -> Result<Row> {
        self.fetch_first(true).await
    }

    pub async fn all(&self) -> Result<Vec<Row>> {
        let (sql, args) = self.to_sql()?;
        self.builder.run_query(&sql, &args, false).await
    }

    pub async fn all_tx(&self) -> Result<Vec<Row>> {
        let (sql, args) = self.to_sql()?;
        self.builder.run_query(&sql, &args, true).await
    }

    async fn fetch_first(&self, in_tx: bool) -> Result<Row> {
        let (sql, args) = self.to_sql()?;
        let rows = self.builder.run_query(&sql, &args, in_tx).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::no_rows(format!("no row in `{}`", self.from)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::error::ErrorKind;
    use crate::ql::mock::{mock_builder, mock_builder_for};
    use crate::ql::placeholder::Placeholder;
    use pretty_assertions::assert_eq;

    #[test]
    fn simple_select_expands_list() {
        let (builder, _) = mock_builder();
        let (sql, args) = builder
            .select("robots")
            .columns(["id", "name"])
            .and_where("id IN (?)", args![vec![1, 2, 3, 4]])
            .to_sql()
            .unwrap();
        assert_eq!(sql, r#"SELECT "id", "name" FROM "robots" WHERE id IN (?, ?, ?, ?)"#);
        assert_eq!(args, args![1, 2, 3, 4]);
    }

    #[test]
    fn raw_columns_and_aliases() {
        let (builder, _) = mock_builder();
        let (sql, _) = builder
            .select("shop.robots r")
            .columns(["r.id", "r.name label", "!COUNT(*) AS total"])
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            r#"SELECT "r"."id", "r"."name" "label", COUNT(*) AS total FROM "shop"."robots" "r""#
        );
    }

    #[test]
    fn join_args_come_before_where_args() {
        let (builder, _) = mock_builder_for(Placeholder::DOLLAR, '"');
        let mut on = Condition::new();
        on.on("o.id = r.owner_id AND o.active = ?", args![true]);
        let (sql, args) = builder
            .select("robots r")
            .columns(["r.id"])
            .join(JoinType::Left, "owners o", on)
            .and_where("r.name = ?", args!["Wall-E"])
            .having("COUNT(*) > ?", args![0])
            .group(["r.id"])
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            r#"SELECT "r"."id" FROM "robots" "r" LEFT JOIN "owners" "o" ON o.id = r.owner_id AND o.active = $1 WHERE r.name = $2 GROUP BY "r"."id" HAVING COUNT(*) > $3"#
        );
        assert_eq!(args, args![true, "Wall-E", 0]);
        assert_eq!(Placeholder::DOLLAR.count(&sql), args.len());
    }

    #[tokio::test]
    async fn all_returns_rows_in_order() {
        let (builder, conn) = mock_builder();
        conn.on_query(
            "FROM \"robots\"",
            (1..=4)
                .map(|id| Row::from_pairs([("id", Value::Int(id)), ("name", Value::from(format!("r{id}")))]))
                .collect(),
        );

        let rows = builder
            .select("robots")
            .columns(["id", "name"])
            .and_where("id IN (?)", args![vec![1, 2, 3, 4]])
            .order(["id"])
            .all()
            .await
            .unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.try_get("id").unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);

        let executed = conn.statements();
        assert_eq!(executed.len(), 1);
        assert_eq!(
            executed[0].0,
            r#"SELECT "id", "name" FROM "robots" WHERE id IN (?, ?, ?, ?) ORDER BY "id" ASC"#
        );
    }

    #[tokio::test]
    async fn first_without_rows_is_no_rows() {
        let (builder, _) = mock_builder();
        let err = builder.select("robots").first().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoRows);
    }

    #[tokio::test]
    async fn first_tx_requires_open_transaction() {
        let (builder, _) = mock_builder();
        let err = builder.select("robots").first_tx().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoActiveTransaction);
    }

    #[test]
    fn condition_errors_surface_on_render() {
        let (builder, _) = mock_builder();
        let err = builder
            .select("robots")
            .and_where("id = ? AND name = ?", args![1])
            .to_sql()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentMismatch);
    }
}
