//! Where a grid reads and writes its rows.

use async_trait::async_trait;
use serde_json::Value as Json;

use crate::error::Result;
use crate::grid::field::Field;
use crate::grid::request::Request;
use crate::orm::Context;
use crate::ql::Condition;

#[async_trait]
pub trait Source: Send + Sync {
    /// Called once by [`Grid::set_source`](crate::grid::Grid::set_source).
    async fn init(&mut self, grid_id: &str) -> Result<()>;

    /// Field definitions; the grid caches them per grid id.
    async fn fields(&mut self) -> Result<Vec<Field>>;

    /// Identifier quote of the backing dialect.
    fn quote_char(&self) -> char {
        '"'
    }

    async fn first(&mut self, condition: &Condition) -> Result<Json>;

    async fn all(&mut self, condition: &Condition) -> Result<Json>;

    async fn count(&mut self, condition: &Condition) -> Result<i64>;

    /// Insert `body`; returns the generated primary key(s) as an object.
    async fn create(&mut self, body: Json) -> Result<Json>;

    async fn update(&mut self, condition: &Condition, body: Json) -> Result<u64>;

    async fn delete(&mut self, condition: &Condition) -> Result<u64>;

    /// Serve a named callback request.
    async fn callback(&mut self, name: &str, request: &Request) -> Result<Json>;

    /// ORM context, when the source has one; used for saved views.
    fn context(&self) -> Option<&Context> {
        None
    }
}
