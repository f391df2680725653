//! A cache where, per key, at most one fetch ("thunk") runs at a time.
//! Concurrent callers for the same key share the one in-flight fetch's
//! outcome instead of each hitting the upstream independently.
//!
//! Grounded on `once_map::OnceMap` (`DashMap` + a once-cell per key), but
//! generalized beyond `get_or_try_init`: callers can `get` without
//! supplying a fetch, `set` to force a fresh fetch, and a failed fetch is
//! evicted with a compare-and-delete so a slow, now-stale failure can
//! never clobber a faster caller's subsequent success for the same key.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry as DashEntry;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Outcome of a plain `get`: either the memoized value/error of an
/// existing entry, or `Miss` if no entry exists for the key at all.
#[derive(Debug)]
pub enum CacheError<E> {
    Miss,
    Thunk(E),
}

enum Slot<V, E> {
    Pending,
    Done(Result<Arc<V>, E>),
}

struct Holder<V, E> {
    state: Mutex<Slot<V, E>>,
    notify: Notify,
}

impl<V, E> Holder<V, E> {
    fn pending() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(Slot::Pending),
            notify: Notify::new(),
        })
    }
}

pub struct CoalescingCache<K, V, E> {
    entries: DashMap<K, Arc<Holder<V, E>>>,
}

impl<K, V, E> Default for CoalescingCache<K, V, E>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, E> CoalescingCache<K, V, E>
where
    K: Eq + Hash + Clone,
    E: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Return the memoized outcome of the entry at `key`, waiting for an
    /// in-flight fetch to finish if one is running. Never starts a fetch
    /// itself.
    pub async fn get(&self, key: &K) -> Result<Arc<V>, CacheError<E>> {
        let holder = self
            .entries
            .get(key)
            .map(|e| Arc::clone(e.value()))
            .ok_or(CacheError::Miss)?;
        wait_for(&holder).await.map_err(CacheError::Thunk)
    }

    /// Install a fresh holder for `key`, unconditionally replacing
    /// whatever was there, and run `fetch` immediately.
    pub async fn set<F, Fut>(&self, key: K, fetch: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let holder = Holder::pending();
        self.entries.insert(key.clone(), Arc::clone(&holder));
        run_and_store(&self.entries, &key, &holder, fetch).await
    }

    /// Return the existing entry's outcome if one is present (waiting for
    /// it to finish if still in flight); otherwise register a new holder
    /// and run `fetch`, exactly once, for every caller racing on `key`.
    pub async fn get_or_set<F, Fut>(&self, key: K, fetch: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let (holder, is_new) = match self.entries.entry(key.clone()) {
            DashEntry::Occupied(o) => (Arc::clone(o.get()), false),
            DashEntry::Vacant(v) => {
                let holder = Holder::pending();
                v.insert(Arc::clone(&holder));
                (holder, true)
            }
        };

        if is_new {
            run_and_store(&self.entries, &key, &holder, fetch).await
        } else {
            wait_for(&holder).await
        }
    }

    /// Remove the entry at `key`, if any, regardless of its state.
    pub fn del(&self, key: &K) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

async fn wait_for<V, E: Clone>(holder: &Arc<Holder<V, E>>) -> Result<Arc<V>, E> {
    loop {
        let notified = holder.notify.notified();
        {
            let guard = holder.state.lock().unwrap();
            if let Slot::Done(outcome) = &*guard {
                return outcome.clone();
            }
        }
        notified.await;
    }
}

async fn run_and_store<K, V, E, F, Fut>(
    entries: &DashMap<K, Arc<Holder<V, E>>>,
    key: &K,
    holder: &Arc<Holder<V, E>>,
    fetch: F,
) -> Result<Arc<V>, E>
where
    K: Eq + Hash + Clone,
    E: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>>,
{
    let outcome = fetch().await.map(Arc::new);
    {
        let mut guard = holder.state.lock().unwrap();
        *guard = Slot::Done(outcome.clone());
    }
    holder.notify.notify_waiters();

    if outcome.is_err() {
        // Compare-and-delete: only evict if the map still points at the
        // holder we installed. If a later `set`/`get_or_set` has already
        // replaced it, leave that newer entry alone.
        entries.remove_if(key, |_, current| Arc::ptr_eq(current, holder));
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn get_on_empty_cache_is_a_miss() {
        let cache: CoalescingCache<&str, i32, &str> = CoalescingCache::new();
        assert!(matches!(cache.get(&"k").await, Err(CacheError::Miss)));
    }

    #[tokio::test]
    async fn get_or_set_populates_and_get_then_reads_it_back() {
        let cache: CoalescingCache<&str, i32, &str> = CoalescingCache::new();
        let v = cache.get_or_set("k", || async { Ok::<_, &str>(42) }).await;
        assert_eq!(*v.unwrap(), 42);

        let got = cache.get(&"k").await.unwrap();
        assert_eq!(*got, 42);
    }

    #[tokio::test]
    async fn concurrent_get_or_set_dedupes_to_one_fetch() {
        let cache: Arc<CoalescingCache<&str, i32, &str>> = Arc::new(CoalescingCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_set("k", || {
                        let calls = Arc::clone(&calls);
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<_, &str>(7)
                        }
                    })
                    .await
            }));
        }

        for h in handles {
            let v = h.await.unwrap().unwrap();
            assert_eq!(*v, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_fetch_is_not_memoized_and_a_retry_can_succeed() {
        let cache: CoalescingCache<&str, i32, &str> = CoalescingCache::new();

        let err = cache
            .get_or_set("k", || async { Err::<i32, _>("boom") })
            .await
            .unwrap_err();
        assert_eq!(err, "boom");

        // The failed entry must have been evicted: `get` sees a miss...
        assert!(matches!(cache.get(&"k").await, Err(CacheError::Miss)));

        // ...and a retry runs a fresh fetch that can succeed.
        let v = cache.get_or_set("k", || async { Ok::<_, &str>(9) }).await;
        assert_eq!(*v.unwrap(), 9);
    }

    #[tokio::test]
    async fn straggling_failure_does_not_evict_a_newer_success() {
        let cache: Arc<CoalescingCache<&str, i32, &str>> = Arc::new(CoalescingCache::new());

        // `set` always installs a brand new holder and runs immediately,
        // so we can simulate a slow failing fetch racing a fast success
        // by running the slow one in the background after the fast one
        // has already replaced the entry.
        let slow_cache = Arc::clone(&cache);
        let slow = tokio::spawn(async move {
            slow_cache
                .set("k", || async {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Err::<i32, _>("late failure")
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(5)).await;
        let fast = cache.set("k", || async { Ok::<_, &str>(100) }).await;
        assert_eq!(*fast.unwrap(), 100);

        let slow_result = slow.await.unwrap();
        assert_eq!(slow_result.unwrap_err(), "late failure");

        // The straggler's compare-and-delete must have been a no-op: the
        // fast, newer success is still in the cache.
        let got = cache.get(&"k").await.unwrap();
        assert_eq!(*got, 100);
    }

    #[tokio::test]
    async fn del_removes_any_entry() {
        let cache: CoalescingCache<&str, i32, &str> = CoalescingCache::new();
        cache.get_or_set("k", || async { Ok::<_, &str>(1) }).await.unwrap();
        cache.del(&"k");
        assert!(matches!(cache.get(&"k").await, Err(CacheError::Miss)));
    }

    #[tokio::test]
    async fn clear_removes_all_entries() {
        let cache: CoalescingCache<&str, i32, &str> = CoalescingCache::new();
        cache.get_or_set("a", || async { Ok::<_, &str>(1) }).await.unwrap();
        cache.get_or_set("b", || async { Ok::<_, &str>(2) }).await.unwrap();
        cache.clear();
        assert!(matches!(cache.get(&"a").await, Err(CacheError::Miss)));
        assert!(matches!(cache.get(&"b").await, Err(CacheError::Miss)));
    }

    #[tokio::test]
    async fn set_forces_a_fresh_fetch_even_on_a_populated_key() {
        let cache: CoalescingCache<&str, i32, &str> = CoalescingCache::new();
        cache.get_or_set("k", || async { Ok::<_, &str>(1) }).await.unwrap();
        let v = cache.set("k", || async { Ok::<_, &str>(2) }).await;
        assert_eq!(*v.unwrap(), 2);
    }
}
