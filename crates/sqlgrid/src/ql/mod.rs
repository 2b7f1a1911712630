//! Query layer: dialect-aware statement builders over pluggable drivers.
//!
//! ```ignore
//! let builder = Builder::connect(DatabaseConfig::new("postgres").database("shop")).await?;
//! let rows = builder
//!     .select("robots")
//!     .columns(["id", "name"])
//!     .and_where("id IN (?)", args![vec![1, 2, 3]])
//!     .all()
//!     .await?;
//! ```

pub mod builder;
pub mod column;
pub mod condition;
pub mod conn;
pub mod delete;
pub mod driver;
pub mod ident;
pub mod information;
pub mod insert;
pub mod placeholder;
pub mod select;
pub mod update;

#[cfg(any(test, feature = "testing"))]
pub mod mock;

pub use builder::Builder;
pub use column::{AbstractType, Column, ForeignKey, TableColumn};
pub use condition::{Clause, Condition};
pub use conn::{Connection, ExecResult, Executor, Transaction};
pub use delete::Delete;
pub use driver::Driver;
pub use information::Information;
pub use insert::{Insert, InsertResult};
pub use placeholder::Placeholder;
pub use select::{JoinType, Select};
pub use update::Update;
