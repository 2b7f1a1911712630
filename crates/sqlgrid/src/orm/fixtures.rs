//! Models and a declared mock schema shared by the ORM tests.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::MemoryCache;
use crate::orm::metadata::{self, Metadata};
use crate::orm::{Context, ModelType};
use crate::ql::column::Column;
use crate::ql::mock::{MockConnection, mock_builder};
use crate::Model;

#[derive(Debug, Clone, Default, PartialEq, Model)]
#[orm(table = "cars")]
pub struct Car {
    #[orm(primary)]
    pub id: i64,
    pub owner_id: i64,
    pub brand: String,
    pub color: String,
    #[orm(has_one, polymorphic = "owner", polymorphic_value = "car")]
    pub radio: Option<Radio>,
    #[orm(belongs_to, fk = "owner_id")]
    pub owner: Option<Person>,
    #[orm(many_to_many)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
pub struct Radio {
    #[orm(primary)]
    pub id: i64,
    pub brand: String,
    pub owner_id: i64,
    pub owner_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
#[orm(table = "people")]
pub struct Person {
    #[orm(primary)]
    pub id: i64,
    pub name: String,
    #[orm(select = "UPPER(name)")]
    pub shout: String,
    #[orm(has_many, afk = "owner_id")]
    pub cars: Vec<Car>,
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
pub struct Tag {
    pub id: i64,
    pub label: String,
}

#[derive(Debug, Clone, Default, Model)]
#[orm(table = "tags")]
pub struct BadKind {
    pub id: i64,
    #[orm(has_many)]
    pub radio: Option<Radio>,
}

#[derive(Debug, Clone, Default, Model)]
#[orm(table = "tags")]
pub struct BadSelf {
    pub id: i64,
    #[orm(has_one)]
    pub parent: Option<Box<BadSelf>>,
}

#[derive(Debug, Clone, Default, Model)]
#[orm(table = "tags")]
pub struct BadPolymorphic {
    pub id: i64,
    #[orm(belongs_to, polymorphic = "owner")]
    pub radio: Option<Radio>,
}

#[derive(Debug, Clone, Default, Model)]
#[orm(table = "tags")]
pub struct BadKey {
    pub id: i64,
    #[orm(belongs_to, fk = "nope")]
    pub radio: Option<Radio>,
}

pub fn int_column(name: &str, primary: bool) -> Column {
    Column {
        name: name.to_owned(),
        raw: "int(11)".to_owned(),
        primary,
        autoincrement: primary,
        ..Column::default()
    }
}

pub fn text_column(name: &str) -> Column {
    Column {
        name: name.to_owned(),
        raw: "varchar(255)".to_owned(),
        length: Some(255),
        nullable: true,
        ..Column::default()
    }
}

pub fn declare_schema(conn: &MockConnection) {
    conn.table(
        "cars",
        vec![
            int_column("id", true),
            int_column("owner_id", false),
            text_column("brand"),
            text_column("color"),
        ],
    );
    conn.table(
        "radios",
        vec![
            int_column("id", true),
            text_column("brand"),
            int_column("owner_id", false),
            text_column("owner_type"),
        ],
    );
    conn.table("people", vec![int_column("id", true), text_column("name")]);
    conn.table("tags", vec![int_column("id", true), text_column("label")]);
    conn.table("car_tags", vec![int_column("car_id", false), int_column("tag_id", false)]);
}

/// Context over a mock connection with the schema above and a memory cache.
pub fn context() -> (Context, Arc<MockConnection>) {
    let (builder, conn) = mock_builder();
    declare_schema(&conn);
    let ctx = Context::new(builder).with_cache(Arc::new(MemoryCache::new()), Duration::from_secs(60));
    (ctx, conn)
}

pub async fn car_metadata() -> Metadata {
    let (ctx, _conn) = context();
    metadata::init(ModelType::of::<Car>(), &ctx).await.unwrap()
}

pub async fn radio_metadata() -> Metadata {
    let (ctx, _conn) = context();
    metadata::init(ModelType::of::<Radio>(), &ctx).await.unwrap()
}
