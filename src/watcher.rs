//! Resource modification watching.
//!
//! Entries are keyed by resource locator; each entry holds one listener per
//! cache key, so registering the same key twice replaces instead of piling up.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use crate::resource::ResourceStream;

pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

pub trait ModificationWatcher: Send + Sync {
    /// Watch `resource` and call `listener` when its modification time
    /// changes. Returns false when `key` was already registered for it.
    fn add(&self, resource: Arc<dyn ResourceStream>, key: &str, listener: ChangeListener) -> bool;

    /// Stop watching the resource and drop its listeners
    fn remove(&self, locator: &str);

    fn clear(&self);
}

struct WatchEntry {
    resource: Arc<dyn ResourceStream>,
    last_modified: Option<SystemTime>,
    listeners: HashMap<String, ChangeListener>,
}

/// Watcher that compares modification times whenever [`check`] runs, either
/// called directly or from the thread started by [`start`].
///
/// [`check`]: PollingWatcher::check
/// [`start`]: PollingWatcher::start
#[derive(Default)]
pub struct PollingWatcher {
    entries: DashMap<String, WatchEntry>,
}

impl PollingWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn listener_count(&self, locator: &str) -> usize {
        self.entries
            .get(locator)
            .map(|e| e.listeners.len())
            .unwrap_or(0)
    }

    /// Compare every watched resource with its recorded modification time
    /// and fire the listeners of the changed ones. Returns how many resources
    /// changed.
    pub fn check(&self) -> usize {
        let mut fired: Vec<(String, Vec<ChangeListener>)> = Vec::new();
        for mut entry in self.entries.iter_mut() {
            let current = entry.resource.last_modified();
            if current != entry.last_modified {
                entry.last_modified = current;
                let listeners = entry.listeners.values().cloned().collect();
                fired.push((entry.key().clone(), listeners));
            }
        }
        // listeners call back into the cache, so no shard lock may be held here
        let changed = fired.len();
        for (locator, listeners) in fired {
            tracing::info!(resource = %locator, listeners = listeners.len(), "resource modified");
            for listener in listeners {
                listener();
            }
        }
        changed
    }

    /// Poll every `interval` on a background thread. The thread ends once
    /// the watcher is dropped.
    pub fn start(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        std::thread::spawn(move || loop {
            std::thread::sleep(interval);
            match weak.upgrade() {
                Some(watcher) => {
                    watcher.check();
                }
                None => {
                    tracing::debug!("watcher dropped, polling thread exits");
                    break;
                }
            }
        })
    }
}

impl ModificationWatcher for PollingWatcher {
    fn add(&self, resource: Arc<dyn ResourceStream>, key: &str, listener: ChangeListener) -> bool {
        let locator = resource.locator();
        let mut entry = self.entries.entry(locator).or_insert_with(|| WatchEntry {
            last_modified: resource.last_modified(),
            resource,
            listeners: HashMap::new(),
        });
        entry.listeners.insert(key.to_string(), listener).is_none()
    }

    fn remove(&self, locator: &str) {
        self.entries.remove(locator);
    }

    fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::StringResource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, ChangeListener) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let listener: ChangeListener = Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (count, listener)
    }

    #[test]
    fn test_registration_is_idempotent_per_key() {
        let watcher = PollingWatcher::new();
        let resource = Arc::new(StringResource::new("mem:a", "x"));
        let (_, first) = counter();
        let (_, second) = counter();
        assert!(watcher.add(resource.clone(), "A.html", first));
        assert!(!watcher.add(resource.clone(), "A.html", second));
        let (_, other) = counter();
        assert!(watcher.add(resource, "B.html", other));
        assert_eq!(watcher.len(), 1);
        assert_eq!(watcher.listener_count("mem:a"), 2);
    }

    #[test]
    fn test_check_fires_on_change_only() {
        let watcher = PollingWatcher::new();
        let resource = Arc::new(StringResource::new("mem:a", "x"));
        let (count, listener) = counter();
        watcher.add(resource.clone(), "A.html", listener);

        assert_eq!(watcher.check(), 0);
        resource.touch();
        assert_eq!(watcher.check(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(watcher.check(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let watcher = PollingWatcher::new();
        let (_, listener) = counter();
        watcher.add(Arc::new(StringResource::new("mem:a", "x")), "k", listener.clone());
        watcher.add(Arc::new(StringResource::new("mem:b", "x")), "k", listener);
        watcher.remove("mem:a");
        assert_eq!(watcher.len(), 1);
        watcher.clear();
        assert!(watcher.is_empty());
    }
}
