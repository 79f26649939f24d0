use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::market::types::Quote;

struct CacheEntry {
    value: Quote,
    expires_at: Instant,
}

/// Short-lived quote cache plus the last-known-good record per key.
///
/// Guarantees:
/// - Every read hands out an owned copy; callers may mutate freely.
/// - `last_good` only ever holds quotes the validator reported healthy
///   (enforced by the resolver, the only writer).
///
/// Cheap to clone; clones share the same storage.
#[derive(Clone)]
pub struct QuoteCache {
    ttl: Duration,
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
    last_good: Arc<Mutex<HashMap<String, Quote>>>,
}

impl QuoteCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(Mutex::new(HashMap::new())),
            last_good: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a copy of the cached quote if it has not expired.
    /// Expired entries are dropped on the way out.
    pub fn get_fresh(&self, key: &str) -> Option<Quote> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                debug!(key, "cache entry expired");
                None
            }
            None => None,
        }
    }

    #[instrument(skip(self, quote), target = "cache", level = "debug")]
    pub fn put(&self, key: &str, quote: &Quote) {
        let entry = CacheEntry {
            value: quote.clone(),
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.lock().insert(key.to_string(), entry);
    }

    pub fn last_good(&self, key: &str) -> Option<Quote> {
        self.last_good.lock().get(key).cloned()
    }

    /// Stores a healthy quote as the fallback for `key`.
    /// Warnings from the fetch that produced it are not carried over.
    pub fn remember_good(&self, key: &str, quote: &Quote) {
        let mut stored = quote.clone();
        stored.warnings.clear();
        self.last_good.lock().insert(key.to_string(), stored);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
