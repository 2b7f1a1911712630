//! Schema introspection through `information_schema`.

use crate::error::{Error, ErrorKind, Result};
use crate::ql::builder::Builder;
use crate::ql::column::{Column, ForeignKey, TableColumn};
use crate::ql::ident::split_table;
use crate::ql::select::{JoinType, Select};
use crate::row::Row;
use crate::value::Value;

/// Describes one table. The database comes from a `db.table` prefix or,
/// failing that, from the builder's configuration.
#[derive(Debug, Clone)]
pub struct Information<'a> {
    builder: &'a Builder,
    table: String,
}

impl<'a> Information<'a> {
    pub(crate) fn new(builder: &'a Builder, table: &str) -> Self {
        Self {
            builder,
            table: table.to_owned(),
        }
    }

    fn target(&self) -> Result<(String, String)> {
        let (database, table) = split_table(&self.table);
        let database = database
            .filter(|d| !d.is_empty())
            .unwrap_or(self.builder.config().database.as_str());
        if database.is_empty() {
            return Err(Error::new(
                ErrorKind::NoDatabase,
                format!("no database for table `{}`", self.table),
            ));
        }
        Ok((database.to_owned(), table.to_owned()))
    }

    /// Columns of the table (all of them when `columns` is empty).
    pub async fn describe(&self, columns: &[String]) -> Result<Vec<Column>> {
        let (database, table) = self.target()?;
        let described = self
            .builder
            .driver()
            .describe(self.builder, &database, &table, columns)
            .await?;
        if described.is_empty() {
            return Err(Error::new(
                ErrorKind::TableNotFound,
                format!("table `{database}.{table}` not found"),
            ));
        }
        Ok(described)
    }

    pub async fn foreign_keys(&self) -> Result<Vec<ForeignKey>> {
        let (database, table) = self.target()?;
        self.builder
            .driver()
            .foreign_keys(self.builder, &database, &table)
            .await
    }
}

/// Per-dialect expressions producing the aliased describe columns.
pub(crate) struct ColumnQuery {
    pub from: &'static str,
    pub name: &'static str,
    pub position: &'static str,
    pub nullable: &'static str,
    pub primary: &'static str,
    pub raw_type: &'static str,
    pub default_value: &'static str,
    pub length: &'static str,
    pub autoincrement: &'static str,
    /// Filter selecting the database (and schema); one `?` per scope argument.
    pub scope: &'static str,
    pub table: &'static str,
}

impl ColumnQuery {
    fn select<'b>(&self, builder: &'b Builder) -> Select<'b> {
        let aliased = [
            (self.name, "column_name"),
            (self.position, "ordinal_position"),
            (self.nullable, "is_nullable"),
            (self.primary, "is_primary"),
            (self.raw_type, "column_type"),
            (self.default_value, "column_default"),
            (self.length, "max_length"),
            (self.autoincrement, "is_autoincrement"),
        ];
        builder
            .select(self.from)
            .columns(aliased.map(|(expr, alias)| format!("!{expr} AS {alias}")))
    }
}

/// Run a describe query and decode its rows into [`Column`]s.
pub(crate) async fn describe_columns(
    builder: &Builder,
    query: &ColumnQuery,
    scope: Vec<Value>,
    table: &str,
    columns: &[String],
) -> Result<Vec<Column>> {
    let mut select = query
        .select(builder)
        .and_where(query.scope, scope)
        .and_where(&format!("{} = ?", query.table), vec![Value::from(table)]);
    if !columns.is_empty() {
        select = select.and_where(
            &format!("{} IN (?)", query.name),
            vec![Value::List(columns.iter().map(|c| Value::from(c.as_str())).collect())],
        );
    }
    let rows = select.order([format!("!{} ASC", query.position)]).all().await?;

    let driver = builder.driver();
    rows.iter()
        .map(|row| {
            let mut column = decode_column(table, row)?;
            column.ty = driver.type_mapping(&column.raw, &column);
            Ok(column)
        })
        .collect()
}

fn decode_column(table: &str, row: &Row) -> Result<Column> {
    let nullable: String = row.try_get("is_nullable")?;
    Ok(Column {
        table: table.to_owned(),
        name: row.try_get("column_name")?,
        position: row.try_get("ordinal_position")?,
        nullable: nullable.eq_ignore_ascii_case("YES"),
        primary: row.try_get("is_primary")?,
        ty: None,
        raw: row.try_get("column_type")?,
        default_value: row.try_get("column_default")?,
        length: row.try_get("max_length")?,
        autoincrement: row.try_get("is_autoincrement")?,
    })
}

/// Per-dialect foreign key lookup.
pub(crate) struct ForeignKeyQuery {
    pub from: &'static str,
    pub joins: &'static [(&'static str, &'static str)],
    pub constraint: &'static str,
    pub column: &'static str,
    pub referenced_table: &'static str,
    pub referenced_column: &'static str,
    pub scope: &'static str,
}

pub(crate) async fn describe_foreign_keys(
    builder: &Builder,
    query: &ForeignKeyQuery,
    scope: Vec<Value>,
    table: &str,
) -> Result<Vec<ForeignKey>> {
    let mut select = builder.select(query.from).columns([
        format!("!{} AS constraint_name", query.constraint),
        format!("!{} AS column_name", query.column),
        format!("!{} AS referenced_table", query.referenced_table),
        format!("!{} AS referenced_column", query.referenced_column),
    ]);
    for (joined, on) in query.joins {
        let mut condition = crate::ql::condition::Condition::new();
        condition.on(on, Vec::new());
        select = select.join(JoinType::Inner, joined, condition);
    }
    let mut args = scope;
    args.push(Value::from(table));
    let rows = select.and_where(query.scope, args).all().await?;

    rows.iter()
        .map(|row| {
            Ok(ForeignKey {
                name: row.try_get("constraint_name")?,
                primary: TableColumn {
                    table: table.to_owned(),
                    column: row.try_get("column_name")?,
                },
                secondary: TableColumn {
                    table: row.try_get("referenced_table")?,
                    column: row.try_get("referenced_column")?,
                },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::ql::column::AbstractType;
    use crate::ql::mock::{MockConnection, MockDriver, MockPool, mock_builder};
    use std::sync::Arc;

    fn robots() -> Vec<Column> {
        vec![
            Column {
                primary: true,
                raw: "int(10) unsigned".into(),
                autoincrement: true,
                ..Column::named("robots", "id")
            },
            Column {
                raw: "varchar(70)".into(),
                length: Some(70),
                ..Column::named("robots", "name")
            },
            Column {
                nullable: true,
                raw: "enum('droid','mechanical')".into(),
                ..Column::named("robots", "type")
            },
        ]
    }

    #[tokio::test]
    async fn describe_maps_types_in_position_order() {
        let (builder, conn) = mock_builder();
        conn.table("robots", robots());

        let columns = builder.information("robots").describe(&[]).await.unwrap();
        let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "name", "type"]);
        assert!(columns[0].primary);
        assert_eq!(columns[0].ty, Some(AbstractType::Integer { min: 0, max: u32::MAX as u64 }));
        assert_eq!(columns[1].ty, Some(AbstractType::Text { size: Some(70) }));
        assert_eq!(
            columns[2].ty,
            Some(AbstractType::Select { items: vec!["droid".into(), "mechanical".into()] })
        );

        let sql = &conn.statements_matching("column_name")[0].0;
        assert!(sql.contains("ORDER BY ORDINAL_POSITION ASC"), "{sql}");
    }

    #[tokio::test]
    async fn describe_filters_columns() {
        let (builder, conn) = mock_builder();
        conn.table("robots", robots());
        let columns = builder
            .information("shop.robots")
            .describe(&["name".to_string()])
            .await
            .unwrap();
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].name, "name");

        let (_, args) = &conn.statements_matching("column_name")[0];
        assert_eq!(args, &vec![Value::from("shop"), Value::from("robots"), Value::from("name")]);
    }

    #[tokio::test]
    async fn unknown_table_is_not_found() {
        let (builder, _) = mock_builder();
        let err = builder.information("ghosts").describe(&[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TableNotFound);
    }

    #[tokio::test]
    async fn database_is_required() {
        let conn = Arc::new(MockConnection::new());
        let builder = Builder::from_parts(DatabaseConfig::new("mock"), Arc::new(MockDriver::default()), Arc::new(MockPool(conn)));
        let err = builder.information("robots").describe(&[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoDatabase);
    }

    #[tokio::test]
    async fn foreign_keys_point_at_referenced_column() {
        let (builder, conn) = mock_builder();
        conn.on_query(
            "KEY_COLUMN_USAGE",
            vec![Row::from_pairs([
                ("constraint_name", Value::from("fk_parts_robot")),
                ("column_name", Value::from("robot_id")),
                ("referenced_table", Value::from("robots")),
                ("referenced_column", Value::from("id")),
            ])],
        );
        let keys = builder.information("parts").foreign_keys().await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].primary, TableColumn { table: "parts".into(), column: "robot_id".into() });
        assert_eq!(keys[0].secondary, TableColumn { table: "robots".into(), column: "id".into() });
    }
}
