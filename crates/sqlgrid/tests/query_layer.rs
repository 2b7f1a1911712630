use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use sqlgrid::ql::mock::mock_builder;
use sqlgrid::ql::{Condition, ExecResult};
use sqlgrid::{ErrorKind, Value, args};

fn robot(id: i64, name: &str) -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("id".to_owned(), Value::Int(id)),
        ("name".to_owned(), Value::from(name)),
    ])
}

#[tokio::test]
async fn select_expands_list_arguments() {
    let (builder, conn) = mock_builder();
    builder
        .select("robots")
        .columns(["id", "name"])
        .and_where("id IN (?)", args![vec![1, 2, 3, 4]])
        .all()
        .await
        .unwrap();

    assert_eq!(
        conn.statements(),
        vec![(
            r#"SELECT "id", "name" FROM "robots" WHERE id IN (?, ?, ?, ?)"#.to_owned(),
            args![1, 2, 3, 4],
        )]
    );
}

#[tokio::test]
async fn batched_insert_commits_once() {
    let (builder, conn) = mock_builder();
    conn.on_exec(
        "INSERT",
        ExecResult {
            rows_affected: 1,
            last_insert_id: None,
        },
    );

    let rows = vec![robot(1, "Eve"), robot(2, "Wall-E"), robot(3, "M-O"), robot(4, "Burn-E")];
    let result = builder.insert("robots").values(rows).batch(1).exec().await.unwrap();
    assert_eq!(result.rows_affected, 4);

    let statements: Vec<String> = conn.statements().into_iter().map(|(sql, _)| sql).collect();
    let insert = r#"INSERT INTO "robots" ("id", "name") VALUES (?, ?)"#;
    assert_eq!(statements, ["BEGIN", insert, insert, insert, insert, "COMMIT"]);
}

#[tokio::test]
async fn statement_failure_inside_transaction_rolls_back() {
    let (builder, conn) = mock_builder();
    conn.fail_on("UPDATE", ErrorKind::Driver);

    builder.tx().await.unwrap();
    let err = builder
        .update("robots")
        .set(BTreeMap::from([("name".to_owned(), Value::from("Eve"))]))
        .and_where("id = ?", args![1])
        .exec_tx()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Driver);
    assert!(!builder.in_tx());
    assert_eq!(conn.statements_matching("ROLLBACK").len(), 1);
}

#[test]
fn condition_expansion() {
    let mut condition = Condition::new();
    condition
        .and_where("id IN (?)", args![vec![1, 2, 3]])
        .and_where("name = ?", args!["Wall-E"]);
    let (sql, args) = condition.render('"').unwrap();
    assert_eq!(sql, " WHERE id IN (?, ?, ?) AND name = ?");
    assert_eq!(args, args![1, 2, 3, "Wall-E"]);
}

#[test]
fn reset_then_where_equals_fresh_condition() {
    let mut reused = Condition::new();
    reused.and_where("a = ?", args![1]).order(["-a"]).limit(3);
    reused.reset(&sqlgrid::ql::Clause::ALL).and_where("b = ?", args![2]);

    let mut fresh = Condition::new();
    fresh.and_where("b = ?", args![2]);
    assert_eq!(reused.render('"').unwrap(), fresh.render('"').unwrap());
}
