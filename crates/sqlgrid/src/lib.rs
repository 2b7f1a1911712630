//! # sqlgrid
//!
//! SQL builders, a relational ORM and a CRUD grid for MySQL and PostgreSQL.
//!
//! ## Layers
//!
//! - **Query layer** ([`ql`]): dialect-aware `SELECT/INSERT/UPDATE/DELETE`
//!   builders with `?` placeholders, list expansion and a single
//!   transaction slot per [`Builder`](ql::Builder)
//! - **ORM** ([`orm`]): models described by `#[derive(Model)]`, metadata built
//!   once from the information schema and cached, relations loaded and written
//!   through a pluggable strategy (`eager` by default)
//! - **Grid** ([`grid`]): one HTTP-shaped entry point per resource that
//!   serves field metadata, paginated listings, CRUD and exports
//!
//! ## Query Builder
//!
//! ```ignore
//! use sqlgrid::{args, ql::Builder, config::DatabaseConfig};
//!
//! let builder = Builder::connect(DatabaseConfig::new("mysql").database("shop")).await?;
//!
//! let rows = builder
//!     .select("robots")
//!     .columns(["id", "name"])
//!     .and_where("id IN (?)", args![vec![1, 2, 3, 4]])
//!     .order(["-id"])
//!     .all()
//!     .await?;
//!
//! builder.tx().await?;
//! builder.update("robots").set(values).and_where("id = ?", args![1]).exec_tx().await?;
//! builder.commit().await?;
//! ```
//!
//! ## ORM
//!
//! ```ignore
//! #[derive(Debug, Clone, Default, Model)]
//! #[orm(table = "cars", database = "shop")]
//! struct Car {
//!     #[orm(primary)]
//!     id: i64,
//!     name: String,
//!     radio_id: i64,
//!     #[orm(belongs_to)]
//!     radio: Option<Radio>,
//! }
//!
//! let mut cars = Orm::<Car>::init(&ctx).await?;
//! cars.set_wb_list(WbList::whitelist(["name", "radio.brand"]));
//! let car = cars.first(Condition::new().and_where("id = ?", args![1])).await?;
//! ```
//!
//! ## Grid
//!
//! ```ignore
//! let mut grid = Grid::new("cars", "index").with_config(config);
//! grid.set_source(OrmSource::<Car>::new(ctx)).await?;
//! let response = grid.render(&Request::from_http(req)?).await.into_http();
//! ```

extern crate self as sqlgrid;

pub mod cache;
pub mod config;
pub mod error;
pub mod grid;
pub mod orm;
pub mod ql;
pub mod registry;
pub mod row;
pub mod value;

pub use error::{Error, ErrorKind, Result};
pub use row::Row;
pub use value::{FromValue, ToValue, Value};

#[cfg(feature = "derive")]
pub use sqlgrid_derive::{Fields, Model};
