//! Ordered listener bookkeeping.
//!
//! [`ListenerRegistry`] backs both the provider-side `on`/`removeListener`
//! surface and the host [`Emitter`](crate::host::Emitter). Listeners run
//! outside the registry lock, so a listener may add or remove listeners
//! (including itself) while being dispatched.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A callback invoked with a reference to the dispatched event.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Handle returned when registering a listener, used to remove it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

struct Entry<K, E> {
    id: ListenerId,
    key: K,
    once: bool,
    listener: Listener<E>,
}

/// Registry of listeners keyed by event name, in registration order.
pub struct ListenerRegistry<K, E> {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry<K, E>>>,
}

impl<K, E> Default for ListenerRegistry<K, E> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<K: fmt::Debug + Copy + PartialEq, E> fmt::Debug for ListenerRegistry<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<K> = self.lock().iter().map(|e| e.key).collect();
        f.debug_struct("ListenerRegistry")
            .field("listeners", &keys)
            .finish()
    }
}

impl<K: Copy + PartialEq, E> ListenerRegistry<K, E> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry<K, E>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, key: K, listener: Listener<E>, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Entry {
            id,
            key,
            once,
            listener,
        });
        id
    }

    /// Register a listener for `key`.
    pub fn add(&self, key: K, listener: Listener<E>) -> ListenerId {
        self.insert(key, listener, false)
    }

    /// Register a listener that is removed after its first invocation.
    pub fn add_once(&self, key: K, listener: Listener<E>) -> ListenerId {
        self.insert(key, listener, true)
    }

    /// Remove the listener `id` registered for `key`.
    ///
    /// Returns `false` if no such listener was registered.
    pub fn remove(&self, key: K, id: ListenerId) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|e| !(e.id == id && e.key == key));
        entries.len() != before
    }

    /// Number of listeners registered for `key`.
    #[must_use]
    pub fn count(&self, key: K) -> usize {
        self.lock().iter().filter(|e| e.key == key).count()
    }

    /// Distinct keys with at least one listener, in first-registration order.
    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        let mut keys: Vec<K> = Vec::new();
        for entry in self.lock().iter() {
            if !keys.contains(&entry.key) {
                keys.push(entry.key);
            }
        }
        keys
    }

    /// Invoke every listener registered for `key`, returning how many ran.
    pub fn dispatch(&self, key: K, event: &E) -> usize {
        let listeners: Vec<Listener<E>> = {
            let mut entries = self.lock();
            let selected = entries
                .iter()
                .filter(|e| e.key == key)
                .map(|e| Arc::clone(&e.listener))
                .collect();
            entries.retain(|e| !(e.once && e.key == key));
            selected
        };

        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter(hits: &Arc<AtomicUsize>) -> Listener<u32> {
        let hits = Arc::clone(hits);
        Arc::new(move |_: &u32| {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_dispatch_only_matching_key() {
        let registry: ListenerRegistry<&'static str, u32> = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        registry.add("a", counter(&hits));
        registry.add("b", counter(&hits));

        assert_eq!(registry.dispatch("a", &1), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(registry.keys(), vec!["a", "b"]);
    }

    #[test]
    fn test_once_listener_runs_once() {
        let registry: ListenerRegistry<&'static str, u32> = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        registry.add_once("a", counter(&hits));

        registry.dispatch("a", &1);
        registry.dispatch("a", &2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(registry.count("a"), 0);
    }

    #[test]
    fn test_remove_requires_matching_key() {
        let registry: ListenerRegistry<&'static str, u32> = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let id = registry.add("a", counter(&hits));

        assert!(!registry.remove("b", id));
        assert!(registry.remove("a", id));
        assert!(!registry.remove("a", id));
        assert!(registry.keys().is_empty());
    }

    #[test]
    fn test_listener_can_remove_itself() {
        let registry: Arc<ListenerRegistry<&'static str, u32>> = Arc::new(ListenerRegistry::new());
        let slot = Arc::new(Mutex::new(None::<ListenerId>));
        let listener: Listener<u32> = {
            let registry = Arc::clone(&registry);
            let slot = Arc::clone(&slot);
            Arc::new(move |_: &u32| {
                if let Some(id) = *slot.lock().unwrap() {
                    registry.remove("a", id);
                }
            })
        };
        let id = registry.add("a", listener);
        *slot.lock().unwrap() = Some(id);

        registry.dispatch("a", &1);
        assert_eq!(registry.count("a"), 0);
    }
}
