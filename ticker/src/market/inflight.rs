use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tracing::{debug, warn};

type SharedFetch<T> = Shared<BoxFuture<'static, Option<T>>>;

/// Whether a caller started the fetch or joined one already running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchRole {
    Leader,
    Follower,
}

/// At most one pending fetch per key; every concurrent caller for the key
/// awaits the same outcome.
///
/// The fetch runs on its own task, so a caller being dropped never cancels it
/// for the others. The entry is removed as soon as the fetch settles.
pub struct InFlightCoordinator<T> {
    pending: Arc<Mutex<HashMap<String, SharedFetch<T>>>>,
}

impl<T> Clone for InFlightCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<T> Default for InFlightCoordinator<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InFlightCoordinator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }

    /// Joins the pending fetch for `key` or starts one with `make`.
    ///
    /// `None` means the fetch task died before producing a value.
    pub async fn run<F, Fut>(&self, key: &str, make: F) -> (Option<T>, FetchRole)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (shared, role) = {
            let mut pending = self.pending.lock();
            match pending.get(key) {
                Some(existing) => (existing.clone(), FetchRole::Follower),
                None => {
                    let shared = self.spawn_fetch(key.to_string(), make());
                    pending.insert(key.to_string(), shared.clone());
                    (shared, FetchRole::Leader)
                }
            }
        };

        if role == FetchRole::Follower {
            debug!(key, "joined in-flight fetch");
        }

        let out = shared.clone().await;
        self.release(key, &shared);
        (out, role)
    }

    fn spawn_fetch<Fut>(&self, key: String, fut: Fut) -> SharedFetch<T>
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        let registry = Arc::clone(&self.pending);
        let handle = tokio::spawn(async move {
            let out = fut.await;
            // Settled: later callers must start a fresh fetch.
            registry.lock().remove(&key);
            out
        });

        async move {
            match handle.await {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(error = %e, "in-flight fetch task failed");
                    None
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Drops the entry if it still refers to `settled`. Covers fetch tasks that
    /// panicked before cleaning up after themselves.
    fn release(&self, key: &str, settled: &SharedFetch<T>) {
        let mut pending = self.pending.lock();
        if pending
            .get(key)
            .is_some_and(|current| current.ptr_eq(settled))
        {
            pending.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let coord: InFlightCoordinator<u32> = InFlightCoordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks = (0..8).map(|_| {
            let coord = coord.clone();
            let calls = Arc::clone(&calls);
            async move {
                coord
                    .run("EURUSD:15", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        42
                    })
                    .await
            }
        });

        let results = futures::future::join_all(tasks).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|(v, _)| *v == Some(42)));
        assert_eq!(
            results
                .iter()
                .filter(|(_, role)| *role == FetchRole::Leader)
                .count(),
            1
        );
        assert_eq!(coord.in_flight(), 0);
    }

    #[tokio::test]
    async fn settled_key_starts_a_new_fetch() {
        let coord: InFlightCoordinator<u32> = InFlightCoordinator::new();

        let (first, role1) = coord.run("k", || async { 1 }).await;
        let (second, role2) = coord.run("k", || async { 2 }).await;

        assert_eq!(first, Some(1));
        assert_eq!(second, Some(2));
        assert_eq!(role1, FetchRole::Leader);
        assert_eq!(role2, FetchRole::Leader);
    }

    #[tokio::test]
    async fn panicking_fetch_yields_none_and_clears_entry() {
        let coord: InFlightCoordinator<u32> = InFlightCoordinator::new();

        let (out, _) = coord
            .run("k", || async {
                if true {
                    panic!("boom");
                }
                0
            })
            .await;

        assert_eq!(out, None);
        assert_eq!(coord.in_flight(), 0);
    }
}
