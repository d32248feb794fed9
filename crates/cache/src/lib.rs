//! A two-tier, race-deduplicating LRU cache.
//!
//! The strong tier holds its entries outright, up to a fixed capacity; once
//! evicted from the strong tier an entry drops into the soft tier as a
//! `Weak` reference, which survives only as long as something else keeps
//! the value alive. `get` promotes soft hits back into the strong tier.
//!
//! Concurrent `get` calls for the same missing key share one computation:
//! the first caller installs an in-flight slot and runs the user function
//! outside the lock; everyone else waits on a condvar for that slot to
//! resolve rather than recomputing.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex, Weak};

enum Resolution<V> {
    Value(Arc<V>),
    Failed(Arc<String>),
}

struct InFlight<V> {
    resolution: Mutex<Option<Resolution<V>>>,
    condvar: Condvar,
}

struct Inner<K, V> {
    strong: HashMap<K, Arc<V>>,
    recency: VecDeque<K>,
    soft: HashMap<K, Weak<V>>,
    in_flight: HashMap<K, Arc<InFlight<V>>>,
}

/// A retirement callback, invoked with the key and value of an entry
/// leaving the cache for good.
type Retire<K, V> = dyn Fn(&K, &Arc<V>) + Send + Sync;

/// A two-tier LRU cache of `Arc`-shared values, keyed by `K`.
pub struct Cache<K, V> {
    strong_capacity: usize,
    soft_capacity: usize,
    inner: Mutex<Inner<K, V>>,
    on_retire: Option<Box<Retire<K, V>>>,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(strong_capacity: usize, soft_capacity: usize) -> Self {
        Cache {
            strong_capacity,
            soft_capacity,
            inner: Mutex::new(Inner {
                strong: HashMap::new(),
                recency: VecDeque::new(),
                soft: HashMap::new(),
                in_flight: HashMap::new(),
            }),
            on_retire: None,
        }
    }

    pub fn with_retirement(mut self, f: impl Fn(&K, &Arc<V>) + Send + Sync + 'static) -> Self {
        self.on_retire = Some(Box::new(f));
        self
    }

    /// Look up `key`, computing and installing it via `compute` on a miss.
    /// Concurrent misses on the same key share one `compute` call.
    pub fn get(&self, key: &K, compute: impl FnOnce() -> Result<V, String>) -> Result<Arc<V>, String> {
        let mut guard = self.inner.lock().expect("cache lock poisoned");
        purge_defunct(&mut guard.soft);

        if let Some(v) = guard.strong.get(key).cloned() {
            touch(&mut guard.recency, key);
            return Ok(v);
        }
        if let Some(weak) = guard.soft.get(key)
            && let Some(v) = weak.upgrade()
        {
            guard.soft.remove(key);
            promote(&mut guard, self.strong_capacity, self.soft_capacity, self.on_retire.as_deref(), key.clone(), v.clone());
            return Ok(v);
        }

        if let Some(existing) = guard.in_flight.get(key).cloned() {
            drop(guard);
            let mut slot = existing.resolution.lock().expect("in-flight slot poisoned");
            while slot.is_none() {
                slot = existing.condvar.wait(slot).expect("in-flight wait poisoned");
            }
            return match slot.as_ref().unwrap() {
                Resolution::Value(v) => Ok(v.clone()),
                Resolution::Failed(e) => Err((**e).clone()),
            };
        }

        let marker = Arc::new(InFlight {
            resolution: Mutex::new(None),
            condvar: Condvar::new(),
        });
        guard.in_flight.insert(key.clone(), marker.clone());
        drop(guard);

        let outcome = compute();

        let mut guard = self.inner.lock().expect("cache lock poisoned");
        guard.in_flight.remove(key);
        let result = match outcome {
            Ok(value) => {
                let arc = Arc::new(value);
                promote(&mut guard, self.strong_capacity, self.soft_capacity, self.on_retire.as_deref(), key.clone(), arc.clone());
                Ok(arc)
            }
            Err(e) => Err(Arc::new(e)),
        };
        drop(guard);

        let mut slot = marker.resolution.lock().expect("in-flight slot poisoned");
        *slot = Some(match &result {
            Ok(v) => Resolution::Value(v.clone()),
            Err(e) => Resolution::Failed(e.clone()),
        });
        marker.condvar.notify_all();
        drop(slot);

        result.map_err(|e| (*e).clone())
    }

    /// Hit-only lookup: returns `None` instead of computing on a miss.
    pub fn poll(&self, key: &K) -> Option<Arc<V>> {
        let mut guard = self.inner.lock().expect("cache lock poisoned");
        purge_defunct(&mut guard.soft);
        if let Some(v) = guard.strong.get(key).cloned() {
            touch(&mut guard.recency, key);
            return Some(v);
        }
        if let Some(weak) = guard.soft.get(key)
            && let Some(v) = weak.upgrade()
        {
            guard.soft.remove(key);
            promote(&mut guard, self.strong_capacity, self.soft_capacity, self.on_retire.as_deref(), key.clone(), v.clone());
            return Some(v);
        }
        None
    }

    pub fn remove(&self, key: &K) {
        let mut guard = self.inner.lock().expect("cache lock poisoned");
        purge_defunct(&mut guard.soft);
        guard.soft.remove(key);
        guard.recency.retain(|k| k != key);
        if let Some(v) = guard.strong.remove(key)
            && let Some(cb) = &self.on_retire
        {
            cb(key, &v);
        }
    }

    /// Drain both tiers, invoking the retirement callback for every
    /// surviving strong entry. Waits for any in-flight computations first.
    pub fn clear(&self) {
        loop {
            let waiters: Vec<Arc<InFlight<V>>> = {
                let guard = self.inner.lock().expect("cache lock poisoned");
                guard.in_flight.values().cloned().collect()
            };
            if waiters.is_empty() {
                break;
            }
            for w in waiters {
                let mut slot = w.resolution.lock().expect("in-flight slot poisoned");
                while slot.is_none() {
                    slot = w.condvar.wait(slot).expect("in-flight wait poisoned");
                }
            }
        }

        let mut guard = self.inner.lock().expect("cache lock poisoned");
        guard.soft.clear();
        guard.recency.clear();
        let strong = std::mem::take(&mut guard.strong);
        drop(guard);
        if let Some(cb) = &self.on_retire {
            for (k, v) in &strong {
                cb(k, v);
            }
        }
    }

    pub fn strong_len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").strong.len()
    }

    pub fn soft_len(&self) -> usize {
        let mut guard = self.inner.lock().expect("cache lock poisoned");
        purge_defunct(&mut guard.soft);
        guard.soft.len()
    }
}

fn purge_defunct<K: Eq + Hash + Clone, V>(soft: &mut HashMap<K, Weak<V>>) {
    soft.retain(|_, w| w.strong_count() > 0);
}

fn touch<K: Eq + Clone>(recency: &mut VecDeque<K>, key: &K) {
    if let Some(pos) = recency.iter().position(|k| k == key) {
        recency.remove(pos);
    }
    recency.push_back(key.clone());
}

fn promote<K: Eq + Hash + Clone, V>(
    guard: &mut Inner<K, V>,
    strong_capacity: usize,
    soft_capacity: usize,
    on_retire: Option<&Retire<K, V>>,
    key: K,
    value: Arc<V>,
) {
    guard.strong.insert(key.clone(), value);
    touch(&mut guard.recency, &key);
    while guard.strong.len() > strong_capacity {
        let Some(evict_key) = guard.recency.pop_front() else { break };
        if let Some(v) = guard.strong.remove(&evict_key) {
            guard.soft.insert(evict_key, Arc::downgrade(&v));
        }
    }
    while guard.soft.len() > soft_capacity {
        let Some(stale_key) = guard.soft.keys().next().cloned() else { break };
        if let Some(weak) = guard.soft.remove(&stale_key)
            && let Some(v) = weak.upgrade()
            && let Some(cb) = on_retire
        {
            cb(&stale_key, &v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn concurrent_misses_on_the_same_key_compute_once() {
        let cache: Arc<Cache<&'static str, u32>> = Arc::new(Cache::new(4, 4));
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..64 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(thread::spawn(move || {
                cache
                    .get(&"k", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(5));
                        Ok(42u32)
                    })
                    .unwrap()
            }));
        }
        for h in handles {
            assert_eq!(*h.join().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn strong_eviction_demotes_to_soft_and_survives_via_external_arc() {
        let cache: Cache<i32, String> = Cache::new(2, 8);
        let a = cache.get(&1, || Ok("a".to_string())).unwrap();
        cache.get(&2, || Ok("b".to_string())).unwrap();
        cache.get(&3, || Ok("c".to_string())).unwrap(); // evicts 1 from strong
        assert_eq!(cache.strong_len(), 2);
        // `a` is still alive (we're holding it), so it should be promotable from soft.
        let refetched = cache.get(&1, || panic!("should not recompute while a is alive")).unwrap();
        assert_eq!(*refetched, "a");
        drop(a);
    }

    #[test]
    fn remove_invokes_retirement_callback() {
        let retired = Arc::new(Mutex::new(Vec::new()));
        let retired_clone = retired.clone();
        let cache: Cache<i32, i32> = Cache::new(4, 4).with_retirement(move |k, v| {
            retired_clone.lock().unwrap().push((*k, **v));
        });
        cache.get(&1, || Ok(10)).unwrap();
        cache.remove(&1);
        assert_eq!(*retired.lock().unwrap(), vec![(1, 10)]);
    }

    #[test]
    fn clear_retires_every_surviving_binding() {
        let retired = Arc::new(Mutex::new(Vec::new()));
        let retired_clone = retired.clone();
        let cache: Cache<i32, i32> = Cache::new(4, 4).with_retirement(move |k, v| {
            retired_clone.lock().unwrap().push((*k, **v));
        });
        cache.get(&1, || Ok(10)).unwrap();
        cache.get(&2, || Ok(20)).unwrap();
        cache.clear();
        let mut r = retired.lock().unwrap().clone();
        r.sort();
        assert_eq!(r, vec![(1, 10), (2, 20)]);
        assert_eq!(cache.strong_len(), 0);
    }

    #[test]
    fn poll_does_not_compute_on_miss() {
        let cache: Cache<i32, i32> = Cache::new(4, 4);
        assert!(cache.poll(&1).is_none());
    }

    #[test]
    fn failed_computation_propagates_to_all_waiters_and_clears_in_flight() {
        let cache: Arc<Cache<&'static str, u32>> = Arc::new(Cache::new(4, 4));
        let err = cache.get(&"k", || Err("boom".to_string())).unwrap_err();
        assert_eq!(err, "boom");
        // A later call is free to retry rather than being stuck replaying the failure.
        let v = cache.get(&"k", || Ok(7)).unwrap();
        assert_eq!(*v, 7);
    }
}
