use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use tokio::sync::Mutex;

/// Deduplicates concurrent work per key: while a future for `key` is running,
/// every `get_or_create` for that key awaits the same future.
pub struct InFlightCache<K, V> {
    inflight: Mutex<HashMap<K, Shared<BoxFuture<'static, V>>>>,
}

impl<K, V> Default for InFlightCache<K, V> {
    fn default() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> InFlightCache<K, V>
where
    K: Eq + Hash + Clone + Send,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// `factory` only runs when nothing is in flight for `key`.
    pub async fn get_or_create<F, Fut>(&self, key: K, factory: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let shared = {
            let mut guard = self.inflight.lock().await;
            match guard.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let created = factory().boxed().shared();
                    guard.insert(key.clone(), created.clone());
                    created
                }
            }
        };

        let value = shared.clone().await;

        let mut guard = self.inflight.lock().await;
        if guard.get(&key).is_some_and(|current| current.ptr_eq(&shared)) {
            guard.remove(&key);
        }
        value
    }

    pub async fn in_flight(&self) -> usize {
        self.inflight.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_future() {
        let cache: Arc<InFlightCache<String, u32>> = Arc::new(InFlightCache::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let runs = runs.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_create("0xABC".to_owned(), move || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        7
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap_or_default(), 7);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(cache.in_flight().await, 0);
    }

    #[tokio::test]
    async fn finished_entries_are_recreated() {
        let cache: InFlightCache<&'static str, usize> = InFlightCache::new();
        let runs = Arc::new(AtomicUsize::new(0));

        for expected in 1..=2 {
            let counter = runs.clone();
            let value = cache
                .get_or_create("key", move || async move {
                    counter.fetch_add(1, Ordering::SeqCst) + 1
                })
                .await;
            assert_eq!(value, expected);
        }
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let cache: InFlightCache<&'static str, &'static str> = InFlightCache::new();
        let a = cache.get_or_create("a", || async { "first" });
        let b = cache.get_or_create("b", || async { "second" });
        let (a, b) = tokio::join!(a, b);
        assert_eq!((a, b), ("first", "second"));
    }
}
