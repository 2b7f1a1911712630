//! Append-only named registries.
//!
//! Drivers, loading strategies, cache providers and export renderers are all
//! looked up by name through a [`Registry`]. Built-ins are submitted with
//! `inventory` and seeded the first time a registry is touched; later
//! registrations may add names but never replace one.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{Error, ErrorKind, Result};

pub struct Registry<T: ?Sized> {
    what: &'static str,
    entries: RwLock<HashMap<String, Arc<T>>>,
}

impl<T: ?Sized> Registry<T> {
    pub fn new(what: &'static str) -> Self {
        Self {
            what,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Add `item` under `name`; a name can only be registered once.
    pub fn register(&self, name: &str, item: Arc<T>) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(name) {
            return Err(Error::new(
                ErrorKind::DuplicateProvider,
                format!("{} `{name}` is already registered", self.what),
            ));
        }
        entries.insert(name.to_owned(), item);
        tracing::debug!(target: "sqlgrid::registry", kind = self.what, name, "registered");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl<T: ?Sized> std::fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("what", &self.what)
            .field("names", &self.names())
            .finish()
    }
}
