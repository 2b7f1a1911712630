//! Loading and persistence strategies.
//!
//! A strategy turns a [`Scope`] plus a [`Condition`] into reads and writes
//! of a whole record graph. Strategies are looked up by name; models pick
//! one with `#[orm(strategy = "...")]` and fall back to [`DEFAULT`].

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use crate::error::{Error, ErrorKind, Result};
use crate::orm::record::Record;
use crate::orm::scope::Scope;
use crate::ql::Condition;
use crate::registry::Registry;

pub mod eager;

pub use eager::Eager;

pub const DEFAULT: &str = "eager";

#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// First matching record with its readable relations; `NoRows` when none match.
    async fn first(&self, scope: &Scope, condition: &Condition) -> Result<Record>;

    async fn all(&self, scope: &Scope, condition: &Condition) -> Result<Vec<Record>>;

    /// Insert the graph, writing generated keys back into `record`.
    async fn create(&self, scope: &Scope, record: &mut Record) -> Result<()>;

    /// Update the first matching row and reconcile its relations with `record`.
    async fn update(&self, scope: &Scope, condition: &Condition, record: &mut Record) -> Result<u64>;

    /// Delete every matching row together with its join rows and children.
    async fn delete(&self, scope: &Scope, condition: &Condition) -> Result<u64>;
}

pub type StrategyFactory = fn() -> Arc<dyn Strategy>;

/// Link-time registration of a strategy.
pub struct StrategyRegistration {
    pub name: &'static str,
    pub create: StrategyFactory,
}

inventory::collect!(StrategyRegistration);

fn new_eager() -> Arc<dyn Strategy> {
    Arc::new(Eager)
}

inventory::submit! {
    StrategyRegistration { name: DEFAULT, create: new_eager }
}

fn strategies() -> &'static Registry<dyn Strategy> {
    static STRATEGIES: OnceLock<Registry<dyn Strategy>> = OnceLock::new();
    STRATEGIES.get_or_init(|| {
        let registry = Registry::new("strategy");
        for registration in inventory::iter::<StrategyRegistration> {
            if let Err(err) = registry.register(registration.name, (registration.create)()) {
                tracing::warn!(target: "sqlgrid::orm", error = %err, "skipping strategy");
            }
        }
        registry
    })
}

pub fn register(name: &str, strategy: Arc<dyn Strategy>) -> Result<()> {
    strategies().register(name, strategy)
}

pub fn get(name: &str) -> Result<Arc<dyn Strategy>> {
    strategies()
        .get(name)
        .ok_or_else(|| Error::new(ErrorKind::UnknownStrategy, format!("strategy `{name}`")))
}

pub fn names() -> Vec<String> {
    strategies().names()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eager_is_built_in() {
        assert_eq!(get(DEFAULT).unwrap().name(), "eager");
        assert!(names().contains(&"eager".to_string()));
        assert_eq!(get("lazy").err().unwrap().kind(), ErrorKind::UnknownStrategy);
        assert_eq!(register("eager", new_eager()).unwrap_err().kind(), ErrorKind::DuplicateProvider);
    }
}
