//! Markup cache: one parsed (and, with inheritance, merged) markup per cache
//! key, loaded on first request and dropped when a resource it was built
//! from changes.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use crate::error::{MarkupError, MarkupResult};
use crate::filter::ContainerContext;
use crate::markup::Markup;
use crate::merge;
use crate::parser::MarkupParser;
use crate::registry::{ComponentRegistry, MarkupContainer};
use crate::resource::{
    CacheKeyProvider, DefaultCacheKeyProvider, MarkupResourceProvider, MarkupResourceStream,
};
use crate::settings::MarkupSettings;
use crate::stream::MarkupStream;
use crate::watcher::{ChangeListener, ModificationWatcher, PollingWatcher};

/// Cache value: the markup, or the remembered fact that there is none
#[derive(Debug, Clone)]
pub enum CachedMarkup {
    Present(Arc<Markup>),
    NoMarkup,
}

impl CachedMarkup {
    pub fn markup(&self) -> Option<Arc<Markup>> {
        match self {
            CachedMarkup::Present(markup) => Some(markup.clone()),
            CachedMarkup::NoMarkup => None,
        }
    }
}

pub type InvalidationListener = Arc<dyn Fn(&str) + Send + Sync>;

struct CacheInner {
    entries: DashMap<String, CachedMarkup>,
    /// Serializes every load; lookups of present keys never take it
    load_lock: Mutex<()>,
    resource_provider: Box<dyn MarkupResourceProvider>,
    key_provider: Box<dyn CacheKeyProvider>,
    watcher: Option<Arc<dyn ModificationWatcher>>,
    registry: Arc<ComponentRegistry>,
    settings: MarkupSettings,
    /// base key → keys of markups merged from it
    dependents: DashMap<String, HashSet<String>>,
    invalidation_listeners: Mutex<Vec<InvalidationListener>>,
    loads: AtomicUsize,
}

impl CacheInner {
    /// Removal waits for a running load, so a merge in progress has recorded
    /// its dependency on the base before the base can go away
    fn remove_markup(&self, key: &str) {
        let _guard = self.load_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.remove_locked(key);
    }

    fn remove_locked(&self, key: &str) {
        let removed = self.entries.remove(key).is_some();
        if removed {
            tracing::debug!(key, "removed markup from cache");
        }
        let listeners: Vec<InvalidationListener> = self
            .invalidation_listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for listener in &listeners {
            listener(key);
        }
        if let Some((_, dependents)) = self.dependents.remove(key) {
            for dependent in dependents {
                self.remove_locked(&dependent);
            }
        }
    }
}

pub struct MarkupCacheBuilder {
    registry: Arc<ComponentRegistry>,
    resource_provider: Box<dyn MarkupResourceProvider>,
    key_provider: Box<dyn CacheKeyProvider>,
    watcher: Option<Arc<dyn ModificationWatcher>>,
    settings: MarkupSettings,
}

impl MarkupCacheBuilder {
    pub fn key_provider(mut self, provider: Box<dyn CacheKeyProvider>) -> Self {
        self.key_provider = provider;
        self
    }

    pub fn watcher(mut self, watcher: Arc<dyn ModificationWatcher>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn settings(mut self, settings: MarkupSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Without an explicit watcher, a configured poll interval starts a
    /// [`PollingWatcher`]
    pub fn build(self) -> MarkupCache {
        let watcher = match (self.watcher, self.settings.poll_interval_ms) {
            (Some(watcher), _) => Some(watcher),
            (None, Some(ms)) => {
                let polling = Arc::new(PollingWatcher::new());
                polling.start(Duration::from_millis(ms));
                tracing::info!(interval_ms = ms, "started markup resource polling");
                Some(polling as Arc<dyn ModificationWatcher>)
            }
            (None, None) => None,
        };
        MarkupCache {
            inner: Arc::new(CacheInner {
                entries: DashMap::new(),
                load_lock: Mutex::new(()),
                resource_provider: self.resource_provider,
                key_provider: self.key_provider,
                watcher,
                registry: self.registry,
                settings: self.settings,
                dependents: DashMap::new(),
                invalidation_listeners: Mutex::new(Vec::new()),
                loads: AtomicUsize::new(0),
            }),
        }
    }
}

/// Shared handle; clones refer to the same cache
#[derive(Clone)]
pub struct MarkupCache {
    inner: Arc<CacheInner>,
}

impl MarkupCache {
    pub fn builder(
        registry: Arc<ComponentRegistry>,
        resource_provider: Box<dyn MarkupResourceProvider>,
    ) -> MarkupCacheBuilder {
        MarkupCacheBuilder {
            registry,
            resource_provider,
            key_provider: Box::new(DefaultCacheKeyProvider),
            watcher: None,
            settings: MarkupSettings::default(),
        }
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.inner.registry
    }

    pub fn settings(&self) -> &MarkupSettings {
        &self.inner.settings
    }

    // ─── Lookup ──────────────────────────────────────────────────────────────

    /// Markup of `class` (default: the container's class) as requested by
    /// `container`. `Ok(None)` means no markup exists; that answer is cached
    /// as well.
    pub fn get_markup(
        &self,
        container: &MarkupContainer,
        class: Option<&str>,
        enforce_reload: bool,
    ) -> MarkupResult<Option<Arc<Markup>>> {
        let inner = &self.inner;
        let typed;
        let container = if container.has_markup_type() {
            container
        } else {
            typed = container
                .clone()
                .with_markup_type(inner.settings.markup_type.clone());
            &typed
        };
        inner.registry.require(container.class())?;
        let class = class.unwrap_or(container.class());
        if !inner.registry.is_assignable(class, container.class()) {
            return Err(MarkupError::ClassNotAssignable {
                class: class.to_string(),
                container: container.class().to_string(),
            });
        }

        let key = inner.key_provider.cache_key(container, class);
        if !enforce_reload {
            if let Some(cached) = key.as_deref().and_then(|k| inner.entries.get(k)) {
                return Ok(cached.markup());
            }
        }

        let guard = inner.load_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.get_markup_locked(&guard, container, class, key, enforce_reload)
    }

    fn get_markup_locked(
        &self,
        guard: &MutexGuard<'_, ()>,
        container: &MarkupContainer,
        class: &str,
        key: Option<String>,
        enforce_reload: bool,
    ) -> MarkupResult<Option<Arc<Markup>>> {
        let inner = &self.inner;
        if !enforce_reload {
            if let Some(cached) = key.as_deref().and_then(|k| inner.entries.get(k)) {
                return Ok(cached.markup());
            }
        }

        let stream = match self.locate(container, class, key.clone()) {
            Some(stream) => stream,
            None => {
                tracing::debug!(class, key = ?key, "no markup found");
                if let Some(key) = key {
                    inner.entries.insert(key, CachedMarkup::NoMarkup);
                }
                return Ok(None);
            }
        };

        let markup = match self.load(guard, container, &stream, enforce_reload) {
            Ok(markup) => Arc::new(markup),
            Err(err) => {
                if let Some(key) = &key {
                    inner.entries.remove(key);
                }
                if err.is_resource_error() {
                    tracing::warn!(class, resource = %stream.locator(), error = %err, "markup resource could not be read");
                    return Ok(None);
                }
                return Err(err);
            }
        };

        if let Some(key) = key {
            inner.entries.insert(key.clone(), CachedMarkup::Present(markup.clone()));
            self.watch(&key, &markup);
        }
        Ok(Some(markup))
    }

    /// First resource the provider finds for `class` or, failing that, for
    /// one of its ancestors
    fn locate(
        &self,
        container: &MarkupContainer,
        class: &str,
        key: Option<String>,
    ) -> Option<MarkupResourceStream> {
        let inner = &self.inner;
        inner.registry.ancestors(class).into_iter().find_map(|candidate| {
            let stream = inner
                .resource_provider
                .locate(container, &candidate)?
                .into_markup_stream();
            let stream = if stream.markup_class().is_none() {
                stream.with_markup_class(candidate)
            } else {
                stream
            };
            let stream = if stream.container_class().is_none() {
                stream.with_container_class(container.class())
            } else {
                stream
            };
            Some(stream.with_cache_key(key.clone()))
        })
    }

    /// Parse a located resource and resolve its inheritance
    fn load(
        &self,
        guard: &MutexGuard<'_, ()>,
        container: &MarkupContainer,
        stream: &MarkupResourceStream,
        enforce_reload: bool,
    ) -> MarkupResult<Markup> {
        let inner = &self.inner;
        let markup_class = stream.display_class().to_string();
        let is_page = inner.registry.is_page(&markup_class);
        inner.loads.fetch_add(1, Ordering::SeqCst);

        let markup = MarkupParser::new(stream.clone(), &inner.settings)
            .with_container(ContainerContext::new(markup_class.clone(), is_page))
            .parse()?;

        let extend = match merge::extend_index(&markup)? {
            Some(extend) => extend,
            None => return Ok(markup),
        };

        let missing_base = || MarkupError::MissingBaseMarkup {
            class: markup_class.clone(),
        };
        let parent = inner.registry.parent(&markup_class).ok_or_else(missing_base)?;
        let base_key = inner.key_provider.cache_key(container, &parent);
        let base = self
            .get_markup_locked(guard, container, &parent, base_key.clone(), enforce_reload)?
            .ok_or_else(missing_base)?;

        let merged = merge::merge(&markup, extend, &base, is_page)?;
        if let (Some(base_key), Some(key)) = (base_key, stream.cache_key()) {
            inner
                .dependents
                .entry(base_key)
                .or_default()
                .insert(key.to_string());
        }
        Ok(merged)
    }

    /// Invalidate `key` when its own resource or any base resource changes
    fn watch(&self, key: &str, markup: &Markup) {
        let watcher = match &self.inner.watcher {
            Some(watcher) => watcher,
            None => return,
        };
        let weak: Weak<CacheInner> = Arc::downgrade(&self.inner);
        let owned_key = key.to_string();
        let listener: ChangeListener = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove_markup(&owned_key);
            }
        });
        let resources = std::iter::once(markup.resource()).chain(markup.bases().iter());
        for resource in resources {
            if let Some(resource) = resource.resource() {
                watcher.add(resource.clone(), key, listener.clone());
            }
        }
    }

    /// Cursor over the container's markup. With `throw_if_missing`, a class
    /// without markup is an error instead of `Ok(None)`.
    pub fn get_markup_stream(
        &self,
        container: &MarkupContainer,
        throw_if_missing: bool,
    ) -> MarkupResult<Option<MarkupStream>> {
        match self.get_markup(container, None, false)? {
            Some(markup) => Ok(Some(MarkupStream::new(markup))),
            None if throw_if_missing => Err(MarkupError::MarkupNotFound {
                class: container.class().to_string(),
            }),
            None => Ok(None),
        }
    }

    pub fn has_associated_markup(&self, container: &MarkupContainer) -> MarkupResult<bool> {
        Ok(self.get_markup(container, None, false)?.is_some())
    }

    // ─── Maintenance ─────────────────────────────────────────────────────────

    /// Drop `key` and every merged markup built on top of it
    pub fn remove_markup(&self, key: &str) {
        self.inner.remove_markup(key);
    }

    /// Drop every entry, dependency and watch registration
    pub fn clear(&self) {
        let _guard = self.inner.load_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.inner.entries.clear();
        self.inner.dependents.clear();
        if let Some(watcher) = &self.inner.watcher {
            watcher.clear();
        }
        tracing::info!("markup cache cleared");
    }

    /// Called with the cache key of every removed entry. Listeners run while
    /// loads are blocked and must not look up markup themselves.
    pub fn add_invalidation_listener(&self, listener: InvalidationListener) {
        self.inner
            .invalidation_listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.entries.contains_key(key)
    }

    pub fn entry(&self, key: &str) -> Option<CachedMarkup> {
        self.inner.entries.get(key).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Number of parse runs so far
    pub fn load_count(&self) -> usize {
        self.inner.loads.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ComponentKind;
    use crate::resource::{ProvidedResource, StringResource};
    use std::collections::HashMap;

    struct MapProvider {
        files: HashMap<String, Arc<StringResource>>,
    }

    impl MarkupResourceProvider for MapProvider {
        fn locate(&self, _container: &MarkupContainer, class: &str) -> Option<ProvidedResource> {
            self.files
                .get(class)
                .map(|r| ProvidedResource::Plain(r.clone()))
        }
    }

    fn cache(files: &[(&str, &str)]) -> MarkupCache {
        let registry = Arc::new(ComponentRegistry::new());
        registry.register("Base", None, ComponentKind::Panel);
        registry.register("Derived", Some("Base"), ComponentKind::Panel);
        registry.register("Inherits", Some("Base"), ComponentKind::Panel);
        let files = files
            .iter()
            .map(|(class, content)| {
                (class.to_string(), Arc::new(StringResource::new(format!("mem:{}", class), *content)))
            })
            .collect();
        MarkupCache::builder(registry, Box::new(MapProvider { files })).build()
    }

    #[test]
    fn test_class_without_markup_uses_ancestor_markup() {
        let cache = cache(&[("Base", "<p>base</p>")]);
        let markup = cache
            .get_markup(&MarkupContainer::new("Inherits"), None, false)
            .unwrap()
            .unwrap();
        assert_eq!(markup.to_markup_string(false), "<p>base</p>");
        assert_eq!(markup.resource().markup_class(), Some("Base"));
    }

    #[test]
    fn test_not_assignable() {
        let cache = cache(&[]);
        let result = cache.get_markup(&MarkupContainer::new("Base"), Some("Derived"), false);
        assert!(matches!(result, Err(MarkupError::ClassNotAssignable { .. })));
    }

    #[test]
    fn test_unknown_container() {
        let cache = cache(&[]);
        let result = cache.get_markup(&MarkupContainer::new("Nope"), None, false);
        assert!(matches!(result, Err(MarkupError::UnknownComponentClass { .. })));
    }

    #[test]
    fn test_markup_stream_when_missing() {
        let cache = cache(&[]);
        let container = MarkupContainer::new("Base");
        assert!(cache.get_markup_stream(&container, false).unwrap().is_none());
        assert!(matches!(
            cache.get_markup_stream(&container, true),
            Err(MarkupError::MarkupNotFound { .. })
        ));
        assert!(!cache.has_associated_markup(&container).unwrap());
    }

    #[test]
    fn test_enforce_reload_parses_again() {
        let cache = cache(&[("Base", "<p>base</p>")]);
        let container = MarkupContainer::new("Base");
        let first = cache.get_markup(&container, None, false).unwrap().unwrap();
        let second = cache.get_markup(&container, None, true).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(cache.load_count(), 2);
    }
}
