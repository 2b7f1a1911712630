#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use http::{Method, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::json;
use sqlgrid::cache::MemoryCache;
use sqlgrid::grid::{Grid, OrmSource, Request};
use sqlgrid::orm::{Context, Orm, WbList};
use sqlgrid::ql::mock::{MockConnection, mock_builder};
use sqlgrid::ql::{Column, Condition, ExecResult};
use sqlgrid::{Model, Row, Value, args};

#[derive(Debug, Clone, Default, PartialEq, Model)]
#[orm(table = "cars")]
struct Car {
    #[orm(primary)]
    id: i64,
    owner_id: i64,
    brand: String,
    #[orm(has_one, polymorphic = "owner", polymorphic_value = "car")]
    radio: Option<Radio>,
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
struct Radio {
    #[orm(primary)]
    id: i64,
    brand: String,
    owner_id: i64,
    owner_type: String,
}

fn int(name: &str, primary: bool) -> Column {
    Column {
        name: name.to_owned(),
        raw: "int(11)".to_owned(),
        primary,
        autoincrement: primary,
        ..Column::default()
    }
}

fn text(name: &str) -> Column {
    Column {
        name: name.to_owned(),
        raw: "varchar(255)".to_owned(),
        length: Some(255),
        nullable: true,
        ..Column::default()
    }
}

fn context() -> (Context, Arc<MockConnection>) {
    let (builder, conn) = mock_builder();
    conn.table("cars", vec![int("id", true), int("owner_id", false), text("brand")]);
    conn.table(
        "radios",
        vec![int("id", true), text("brand"), int("owner_id", false), text("owner_type")],
    );
    let ctx = Context::new(builder).with_cache(Arc::new(MemoryCache::new()), Duration::from_secs(60));
    (ctx, conn)
}

fn car_row(id: i64, brand: &str) -> Row {
    Row::from_pairs([
        ("id", Value::Int(id)),
        ("owner_id", Value::Int(9)),
        ("brand", Value::from(brand)),
    ])
}

fn without_describes(conn: &MockConnection) -> Vec<(String, Vec<Value>)> {
    conn.statements()
        .into_iter()
        .filter(|(sql, _)| !sql.contains("information_schema"))
        .collect()
}

#[tokio::test]
async fn whitelisted_fetch_through_polymorphic_relation() {
    let (ctx, conn) = context();
    conn.on_query("FROM \"cars\"", vec![car_row(1, "BMW")]);
    conn.on_query(
        "FROM \"radios\"",
        vec![Row::from_pairs([
            ("id", Value::Int(3)),
            ("brand", Value::from("Sony")),
            ("owner_id", Value::Int(1)),
            ("owner_type", Value::from("car")),
        ])],
    );

    let mut orm = Orm::<Car>::init(&ctx).await.unwrap();
    orm.set_wb_list(WbList::whitelist(["id", "owner_id", "brand", "radio.brand"]));
    let mut condition = Condition::new();
    condition.and_where("id = ?", args![1]);
    let car = orm.first(&condition).await.unwrap();

    assert_eq!((car.id, car.owner_id, car.brand.as_str()), (1, 9, "BMW"));
    let radio = car.radio.unwrap();
    assert_eq!(radio.brand, "Sony");
    assert_eq!(radio.owner_type, "car");
    assert_eq!(radio.owner_id, car.id);

    let radios = conn.statements_matching("FROM \"radios\"");
    assert_eq!(radios.len(), 1);
    assert_eq!(radios[0].1, args![1, "car"]);
}

async fn car_grid(ctx: Context) -> Grid {
    let source = OrmSource::<Car>::new(ctx).with_wb_list(WbList::whitelist(["id", "owner_id", "brand"]));
    let mut grid = Grid::new("cars", "index").with_cache(Arc::new(MemoryCache::new()), Duration::from_secs(60));
    grid.set_source(source).await.unwrap();
    grid
}

#[tokio::test]
async fn table_render_counts_then_pages() {
    let (ctx, conn) = context();
    conn.on_query("FROM \"cars\"", vec![car_row(2, "BMW"), car_row(1, "BMW")]);
    conn.on_query("COUNT(*)", vec![Row::from_pairs([("total", Value::Int(3))])]);
    let mut grid = car_grid(ctx).await;
    conn.clear_log();

    let response = grid
        .render(&Request::new(Method::GET, "sort=-id&filter_brand=BMW&limit=2").unwrap())
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json_body().unwrap();
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["pagination"]["totalPages"], 2);
    assert_eq!(body["pagination"]["next"], 2);
    assert_eq!(body["data"][0]["id"], 2);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(2));
    let head: Vec<&str> = body["head"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["id"].as_str().unwrap())
        .collect();
    assert_eq!(head, ["id", "owner_id", "brand", "radio"]);

    let statements = without_describes(&conn);
    assert_eq!(
        statements[0],
        (
            r#"SELECT COUNT(*) AS total FROM "cars" WHERE "brand" = ?"#.to_owned(),
            args!["BMW"]
        )
    );
    assert!(
        statements[1]
            .0
            .ends_with(r#"FROM "cars" WHERE "brand" = ? ORDER BY "id" DESC LIMIT 2 OFFSET 0"#),
        "{}",
        statements[1].0
    );
}

#[tokio::test]
async fn create_and_delete_through_the_grid() {
    let (ctx, conn) = context();
    conn.on_exec(
        "INSERT INTO \"cars\"",
        ExecResult {
            rows_affected: 1,
            last_insert_id: Some(5),
        },
    );
    conn.on_query("FROM \"cars\"", vec![car_row(5, "Audi")]);
    let mut grid = car_grid(ctx).await;

    let create = Request::new(Method::POST, "")
        .unwrap()
        .with_body(r#"{"brand": "Audi", "owner_id": 9}"#);
    let body = grid.render(&create).await.json_body().unwrap();
    assert_eq!(body, json!({"pkeys": {"id": 5}}));

    let delete = Request::new(Method::DELETE, "id=5").unwrap();
    let response = grid.render(&delete).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(conn.statements_matching("DELETE FROM \"cars\"").len(), 1);
}

#[tokio::test]
async fn policy_violations_never_reach_the_database() {
    let (ctx, conn) = context();
    let mut grid = car_grid(ctx).await;
    conn.clear_log();

    let response = grid
        .render(&Request::new(Method::GET, "filter_radio=1").unwrap())
        .await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(&response.body[..], b"forbidden");
    assert!(conn.statements().is_empty());
}
