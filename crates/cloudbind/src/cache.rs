//! Single-flight loading cache with explicit invalidation
//!
//! Each key owns a `tokio::sync::OnceCell`. Concurrent first access to a key
//! runs the loader once; everyone else awaits the same cell. A failed load
//! leaves the cell empty so the next caller retries. Entries never expire on
//! their own; [`InvalidatingCache::invalidate`] drops one.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, RwLock};
use tokio::sync::OnceCell;

/// Loading cache keyed by `K`.
#[derive(Debug)]
pub struct InvalidatingCache<K, V> {
    cells: RwLock<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> Default for InvalidatingCache<K, V> {
    fn default() -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> InvalidatingCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, key: &K) -> Arc<OnceCell<V>> {
        {
            let cells = self.cells.read().unwrap_or_else(|e| e.into_inner());
            if let Some(cell) = cells.get(key) {
                return cell.clone();
            }
        }
        let mut cells = self.cells.write().unwrap_or_else(|e| e.into_inner());
        cells
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Get the value for `key`, loading it with `init` if absent.
    ///
    /// At most one `init` runs per key at a time; concurrent callers wait for
    /// it and share its value.
    ///
    /// # Errors
    ///
    /// Returns the loader's error. The entry stays unloaded.
    pub async fn get_or_try_init<F, Fut, E>(&self, key: &K, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = self.cell(key);
        cell.get_or_try_init(init).await.cloned()
    }

    /// Loaded value for `key`, without loading.
    pub fn get(&self, key: &K) -> Option<V> {
        let cells = self.cells.read().unwrap_or_else(|e| e.into_inner());
        cells.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Drop the entry for `key`. Returns whether a loaded value was dropped.
    ///
    /// A load already in flight completes for its waiters; later callers start
    /// a fresh load.
    pub fn invalidate(&self, key: &K) -> bool {
        let mut cells = self.cells.write().unwrap_or_else(|e| e.into_inner());
        cells
            .remove(key)
            .is_some_and(|cell| cell.initialized())
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.cells.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Number of loaded entries.
    pub fn len(&self) -> usize {
        let cells = self.cells.read().unwrap_or_else(|e| e.into_inner());
        cells.values().filter(|cell| cell.initialized()).count()
    }

    /// Check if nothing is loaded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_loads_run_once() {
        let cache = Arc::new(InvalidatingCache::<String, Arc<String>>::new());
        let loads = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let cache = cache.clone();
                let loads = loads.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_try_init(&"sg-web".to_string(), || async {
                            loads.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<_, String>(Arc::new("loaded".to_string()))
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().as_str(), "loaded");
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let cache = InvalidatingCache::<&str, u32>::new();
        let err = cache
            .get_or_try_init(&"k", || async { Err::<u32, _>("boom") })
            .await
            .unwrap_err();
        assert_eq!(err, "boom");
        assert!(cache.get(&"k").is_none());

        let value = cache.get_or_try_init(&"k", || async { Ok::<_, &str>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let cache = InvalidatingCache::<&str, u32>::new();
        cache.get_or_try_init(&"k", || async { Ok::<_, ()>(1) }).await.unwrap();
        assert!(cache.invalidate(&"k"));
        assert!(!cache.invalidate(&"k"));
        assert!(cache.is_empty());

        let value = cache.get_or_try_init(&"k", || async { Ok::<_, ()>(2) }).await.unwrap();
        assert_eq!(value, 2);
    }
}
