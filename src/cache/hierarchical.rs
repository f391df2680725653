//! A stack of cache layers read top-to-bottom, with writes confined to the
//! top layer. Modeled on the `RwLock`-guarded `Vec` lookup tables used
//! elsewhere in the teacher crate for layered config/env resolution,
//! generalized here into a stack of `CacheLayer` trait objects so a test
//! can push an in-memory mock below (or above) the real coalescing cache.
//!
//! The lock guards only the stack itself (which `Arc<dyn CacheLayer>`s are
//! currently in play), never the layers' own internal state — each layer
//! manages its own concurrency.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::hash::Hash;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use super::coalescing::{CacheError, CoalescingCache};

pub type Fetch<V, E> = Box<dyn FnOnce() -> BoxFuture<'static, Result<V, E>> + Send>;

#[async_trait]
pub trait CacheLayer<K, V, E>: Send + Sync
where
    K: Send + Sync,
    V: Send + Sync,
    E: Send + Sync,
{
    async fn get(&self, key: &K) -> Result<Arc<V>, CacheError<E>>;
    async fn set(&self, key: K, fetch: Fetch<V, E>) -> Result<Arc<V>, E>;
    async fn get_or_set(&self, key: K, fetch: Fetch<V, E>) -> Result<Arc<V>, E>;
    fn del(&self, key: &K);
    fn clear(&self);
}

#[async_trait]
impl<K, V, E> CacheLayer<K, V, E> for CoalescingCache<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Result<Arc<V>, CacheError<E>> {
        CoalescingCache::get(self, key).await
    }

    async fn set(&self, key: K, fetch: Fetch<V, E>) -> Result<Arc<V>, E> {
        CoalescingCache::set(self, key, move || fetch()).await
    }

    async fn get_or_set(&self, key: K, fetch: Fetch<V, E>) -> Result<Arc<V>, E> {
        CoalescingCache::get_or_set(self, key, move || fetch()).await
    }

    fn del(&self, key: &K) {
        CoalescingCache::del(self, key)
    }

    fn clear(&self) {
        CoalescingCache::clear(self)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HierarchicalCacheError {
    #[error("cannot pop the last remaining cache layer")]
    SingleLevel,
}

pub struct HierarchicalCache<K, V, E> {
    stack: RwLock<Vec<Arc<dyn CacheLayer<K, V, E>>>>,
}

impl<K, V, E> HierarchicalCache<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(base: Arc<dyn CacheLayer<K, V, E>>) -> Self {
        Self {
            stack: RwLock::new(vec![base]),
        }
    }

    pub fn push(&self, layer: Arc<dyn CacheLayer<K, V, E>>) {
        self.stack.write().unwrap().push(layer);
    }

    /// Remove the top layer. Refuses to pop the last remaining level, so
    /// the stack is never empty.
    pub fn pop(&self) -> Result<(), HierarchicalCacheError> {
        let mut stack = self.stack.write().unwrap();
        if stack.len() <= 1 {
            return Err(HierarchicalCacheError::SingleLevel);
        }
        stack.pop();
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.stack.read().unwrap().len()
    }

    fn snapshot(&self) -> Vec<Arc<dyn CacheLayer<K, V, E>>> {
        self.stack.read().unwrap().clone()
    }

    fn top(&self) -> Arc<dyn CacheLayer<K, V, E>> {
        self.stack
            .read()
            .unwrap()
            .last()
            .expect("hierarchical cache stack is never empty")
            .clone()
    }

    /// Read top-to-bottom: the first layer with an entry wins. A miss at
    /// one layer falls through to the next; an actual thunk error (a
    /// layer that has an entry but it memoized a failure) stops the
    /// search and is returned directly.
    pub async fn get(&self, key: &K) -> Result<Arc<V>, CacheError<E>> {
        for layer in self.snapshot().iter().rev() {
            match layer.get(key).await {
                Ok(value) => return Ok(value),
                Err(CacheError::Miss) => continue,
                Err(err @ CacheError::Thunk(_)) => return Err(err),
            }
        }
        Err(CacheError::Miss)
    }

    /// Writes land on the top layer only.
    pub async fn set<F, Fut>(&self, key: K, fetch: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<V, E>> + Send + 'static,
    {
        self.top().set(key, Box::new(move || Box::pin(fetch()))).await
    }

    pub async fn get_or_set<F, Fut>(&self, key: K, fetch: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<V, E>> + Send + 'static,
    {
        match self.get(&key).await {
            Ok(value) => Ok(value),
            Err(CacheError::Thunk(err)) => Err(err),
            Err(CacheError::Miss) => {
                self.top()
                    .get_or_set(key, Box::new(move || Box::pin(fetch())))
                    .await
            }
        }
    }

    pub fn del(&self, key: &K) {
        self.top().del(key);
    }

    pub fn clear(&self) {
        self.top().clear();
    }
}
