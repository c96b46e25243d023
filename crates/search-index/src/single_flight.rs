use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

/// Coalesces concurrent requests for the same key onto a single execution
/// of `init`, and memoizes the result for the lifetime of the
/// `SingleFlight` itself.
///
/// Grounded on the resolver's requirement in §5: "at most one in-flight
/// create per `(program, visibility)` key; other callers wait on the
/// in-flight result." A fresh `SingleFlight` (one per indexer instance, per
/// release phase) starts empty, so memoization never leaks across phases.
pub struct SingleFlight<K, V> {
    inflight: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self { inflight: Mutex::new(HashMap::new()) }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub async fn get_or_init<F, Fut>(&self, key: K, init: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let cell = {
            let mut map = self.inflight.lock().await;
            map.entry(key).or_insert_with(|| Arc::new(OnceCell::new())).clone()
        };
        cell.get_or_init(init).await.clone()
    }

    pub async fn snapshot(&self) -> Vec<(K, V)>
    where
        K: Clone,
    {
        let map = self.inflight.lock().await;
        map.iter().filter_map(|(k, v)| v.get().map(|v| (k.clone(), v.clone()))).collect()
    }

    pub async fn clear(&self) {
        self.inflight.lock().await.clear();
    }

    /// Drops every memoized entry whose completed value matches `predicate`.
    /// In-flight (not-yet-completed) entries are left untouched.
    pub async fn retain_values(&self, mut predicate: impl FnMut(&V) -> bool)
    where
        V: Send + Sync,
    {
        let mut map = self.inflight.lock().await;
        map.retain(|_, cell| match cell.get() {
            Some(v) => predicate(v),
            None => true,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn coalesces_concurrent_calls_for_the_same_key() {
        let sf: Arc<SingleFlight<&'static str, u32>> = Arc::new(SingleFlight::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let sf = sf.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                sf.get_or_init("prg1", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                    42
                })
                .await
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
