//! In-process cache used for model metadata and grid field definitions.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{Error, ErrorKind, Result};
use crate::registry::Registry;

/// A cached entry. Values are immutable snapshots; callers clone what they need.
pub type CacheValue = Arc<dyn Any + Send + Sync>;

/// `get/set/exist` with a time-to-live.
pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Option<CacheValue>;

    /// Store `value`; `None` keeps it until deleted.
    fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>);

    fn exist(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn delete(&self, key: &str);
}

/// Fetch and downcast a cached value.
pub fn get_as<T: Any + Send + Sync>(cache: &dyn Cache, key: &str) -> Option<Arc<T>> {
    cache.get(key).and_then(|v| v.downcast::<T>().ok())
}

#[derive(Debug)]
struct Entry {
    value: CacheValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Size at which `set` first sweeps expired entries.
const SWEEP_MIN: usize = 64;

#[derive(Debug)]
struct Entries {
    map: HashMap<String, Entry>,
    sweep_at: usize,
}

impl Default for Entries {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            sweep_at: SWEEP_MIN,
        }
    }
}

/// Map-backed cache.
///
/// Expired entries are dropped when read, and swept from `set` whenever the
/// map has grown to twice its size after the previous sweep.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<Entries>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stored entries, expired ones included until they are swept.
    pub fn len(&self) -> usize {
        self.entries().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<CacheValue> {
        let mut entries = self.entries();
        let expired = match entries.map.get(key) {
            None => return None,
            Some(entry) => entry.is_expired(Instant::now()),
        };
        if expired {
            entries.map.remove(key);
            return None;
        }
        entries.map.get(key).map(|e| e.value.clone())
    }

    fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) {
        let now = Instant::now();
        let expires_at = ttl.map(|ttl| now + ttl);
        let mut entries = self.entries();
        if entries.map.len() >= entries.sweep_at {
            entries.map.retain(|_, entry| !entry.is_expired(now));
            entries.sweep_at = (entries.map.len() * 2).max(SWEEP_MIN);
        }
        entries.map.insert(key.to_owned(), Entry { value, expires_at });
    }

    fn delete(&self, key: &str) {
        self.entries().map.remove(key);
    }
}

/// Constructor for a named cache provider.
pub type CacheFactory = fn() -> Arc<dyn Cache>;

/// Link-time registration of a cache provider.
pub struct CacheProvider {
    pub name: &'static str,
    pub create: CacheFactory,
}

inventory::collect!(CacheProvider);

fn new_memory_cache() -> Arc<dyn Cache> {
    Arc::new(MemoryCache::new())
}

inventory::submit! {
    CacheProvider { name: "memory", create: new_memory_cache }
}

fn providers() -> &'static Registry<CacheFactory> {
    static PROVIDERS: OnceLock<Registry<CacheFactory>> = OnceLock::new();
    PROVIDERS.get_or_init(|| {
        let registry = Registry::new("cache provider");
        for provider in inventory::iter::<CacheProvider> {
            if let Err(err) = registry.register(provider.name, Arc::new(provider.create)) {
                tracing::warn!(target: "sqlgrid::cache", error = %err, "skipping cache provider");
            }
        }
        registry
    })
}

/// Register a cache provider at runtime.
pub fn register(name: &str, create: CacheFactory) -> Result<()> {
    providers().register(name, Arc::new(create))
}

/// Create a new cache instance from a registered provider.
pub fn provider(name: &str) -> Result<Arc<dyn Cache>> {
    let create = providers().get(name).ok_or_else(|| {
        Error::new(ErrorKind::UnknownProvider, format!("cache provider `{name}`"))
    })?;
    Ok((*create)())
}
