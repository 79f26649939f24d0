use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Minimal counters for operational visibility.
#[derive(Clone, Default)]
pub struct Counters {
    pub ticks: Arc<AtomicU64>,
    pub tick_failures: Arc<AtomicU64>,

    pub renames_applied: Arc<AtomicU64>,
    pub renames_skipped: Arc<AtomicU64>,

    // quote resolution
    pub upstream_fetches: Arc<AtomicU64>,
    pub cache_hits: Arc<AtomicU64>,
    pub coalesced_waits: Arc<AtomicU64>,
    pub fallbacks_used: Arc<AtomicU64>,
}

/// Point-in-time copy of [`Counters`], cheap to log or assert on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub ticks: u64,
    pub tick_failures: u64,
    pub renames_applied: u64,
    pub renames_skipped: u64,
    pub upstream_fetches: u64,
    pub cache_hits: u64,
    pub coalesced_waits: u64,
    pub fallbacks_used: u64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        let read = |c: &Arc<AtomicU64>| c.load(Ordering::Relaxed);
        CountersSnapshot {
            ticks: read(&self.ticks),
            tick_failures: read(&self.tick_failures),
            renames_applied: read(&self.renames_applied),
            renames_skipped: read(&self.renames_skipped),
            upstream_fetches: read(&self.upstream_fetches),
            cache_hits: read(&self.cache_hits),
            coalesced_waits: read(&self.coalesced_waits),
            fallbacks_used: read(&self.fallbacks_used),
        }
    }
}
