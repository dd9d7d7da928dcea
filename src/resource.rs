//! Markup resources and the two lookup collaborators of the cache: the
//! resource provider (where is the markup of a class) and the cache key
//! provider (under which key is it stored).

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use crate::error::{MarkupError, MarkupResult};
use crate::registry::MarkupContainer;

/// A readable markup source with a modification time
pub trait ResourceStream: Send + Sync {
    /// Stable identity of the resource (a path, a URL, a name)
    fn locator(&self) -> String;

    fn read(&self) -> io::Result<Vec<u8>>;

    /// `None` when the resource is gone or has no notion of time
    fn last_modified(&self) -> Option<SystemTime>;
}

/// Markup file on the local file system
#[derive(Debug, Clone)]
pub struct FileResource {
    path: PathBuf,
}

impl FileResource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResourceStream for FileResource {
    fn locator(&self) -> String {
        self.path.display().to_string()
    }

    fn read(&self) -> io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }

    fn last_modified(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }
}

/// In-memory markup. Replacing the content bumps the modification time, so
/// the watcher sees it like an edited file.
pub struct StringResource {
    locator: String,
    state: Mutex<(String, SystemTime)>,
}

impl StringResource {
    pub fn new(locator: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            state: Mutex::new((content.into(), SystemTime::now())),
        }
    }

    pub fn set_content(&self, content: impl Into<String>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.0 = content.into();
        state.1 = Self::later_than(state.1);
    }

    /// Change the modification time without touching the content
    pub fn touch(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.1 = Self::later_than(state.1);
    }

    fn later_than(previous: SystemTime) -> SystemTime {
        let now = SystemTime::now();
        if now > previous {
            now
        } else {
            previous + Duration::from_millis(1)
        }
    }
}

impl ResourceStream for StringResource {
    fn locator(&self) -> String {
        self.locator.clone()
    }

    fn read(&self) -> io::Result<Vec<u8>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.0.as_bytes().to_vec())
    }

    fn last_modified(&self) -> Option<SystemTime> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Some(state.1)
    }
}

/// A resource together with what it was looked up for: the markup class it
/// belongs to, the requesting container, locale/style/variation and the
/// cache key it is stored under.
#[derive(Clone, Default)]
pub struct MarkupResourceStream {
    resource: Option<Arc<dyn ResourceStream>>,
    locator: String,
    markup_class: Option<String>,
    container_class: Option<String>,
    locale: Option<String>,
    style: Option<String>,
    variation: Option<String>,
    markup_type: Option<String>,
    cache_key: Option<String>,
}

impl MarkupResourceStream {
    pub fn new(resource: Arc<dyn ResourceStream>) -> Self {
        let locator = resource.locator();
        Self {
            resource: Some(resource),
            locator,
            ..Default::default()
        }
    }

    /// A stream with no backing resource, for markup parsed from a string
    pub fn detached(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            ..Default::default()
        }
    }

    pub fn with_markup_class(mut self, class: impl Into<String>) -> Self {
        self.markup_class = Some(class.into());
        self
    }

    pub fn with_container_class(mut self, class: impl Into<String>) -> Self {
        self.container_class = Some(class.into());
        self
    }

    pub fn with_locale(mut self, locale: Option<String>) -> Self {
        self.locale = locale;
        self
    }

    pub fn with_style(mut self, style: Option<String>) -> Self {
        self.style = style;
        self
    }

    pub fn with_variation(mut self, variation: Option<String>) -> Self {
        self.variation = variation;
        self
    }

    pub fn with_markup_type(mut self, markup_type: impl Into<String>) -> Self {
        self.markup_type = Some(markup_type.into());
        self
    }

    pub fn with_cache_key(mut self, key: Option<String>) -> Self {
        self.cache_key = key;
        self
    }

    pub fn resource(&self) -> Option<&Arc<dyn ResourceStream>> {
        self.resource.as_ref()
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn markup_class(&self) -> Option<&str> {
        self.markup_class.as_deref()
    }

    pub fn container_class(&self) -> Option<&str> {
        self.container_class.as_deref()
    }

    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    pub fn style(&self) -> Option<&str> {
        self.style.as_deref()
    }

    pub fn variation(&self) -> Option<&str> {
        self.variation.as_deref()
    }

    pub fn markup_type(&self) -> Option<&str> {
        self.markup_type.as_deref()
    }

    pub fn cache_key(&self) -> Option<&str> {
        self.cache_key.as_deref()
    }

    /// Name used in diagnostics and provenance: the markup class when known,
    /// else the locator
    pub fn display_class(&self) -> &str {
        self.markup_class.as_deref().unwrap_or(&self.locator)
    }

    pub fn read(&self) -> MarkupResult<Vec<u8>> {
        let resource = self.resource.as_ref().ok_or_else(|| MarkupError::ResourceRead {
            location: self.locator.clone(),
            message: "no backing resource".to_string(),
        })?;
        resource.read().map_err(|e| MarkupError::ResourceRead {
            location: self.locator.clone(),
            message: e.to_string(),
        })
    }

    pub fn last_modified(&self) -> Option<SystemTime> {
        self.resource.as_ref().and_then(|r| r.last_modified())
    }
}

impl fmt::Debug for MarkupResourceStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkupResourceStream")
            .field("locator", &self.locator)
            .field("markup_class", &self.markup_class)
            .field("container_class", &self.container_class)
            .field("locale", &self.locale)
            .field("style", &self.style)
            .field("variation", &self.variation)
            .field("markup_type", &self.markup_type)
            .field("cache_key", &self.cache_key)
            .finish()
    }
}

impl fmt::Display for MarkupResourceStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.markup_class {
            Some(class) => write!(f, "{} ({})", self.locator, class),
            None => f.write_str(&self.locator),
        }
    }
}

// ─── Providers ───────────────────────────────────────────────────────────────

/// What a resource provider hands back. A plain stream is wrapped into a
/// [`MarkupResourceStream`] by the cache.
pub enum ProvidedResource {
    Markup(MarkupResourceStream),
    Plain(Arc<dyn ResourceStream>),
}

impl ProvidedResource {
    pub fn into_markup_stream(self) -> MarkupResourceStream {
        match self {
            ProvidedResource::Markup(stream) => stream,
            ProvidedResource::Plain(resource) => MarkupResourceStream::new(resource),
        }
    }
}

/// Locates the markup resource of `class` for a requesting container
pub trait MarkupResourceProvider: Send + Sync {
    fn locate(&self, container: &MarkupContainer, class: &str) -> Option<ProvidedResource>;
}

/// Computes the cache key of a lookup; `None` disables caching for it
pub trait CacheKeyProvider: Send + Sync {
    fn cache_key(&self, container: &MarkupContainer, class: &str) -> Option<String>;
}

/// `class[_locale][_style][_variation].type`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCacheKeyProvider;

impl CacheKeyProvider for DefaultCacheKeyProvider {
    fn cache_key(&self, container: &MarkupContainer, class: &str) -> Option<String> {
        let mut key = class.to_string();
        for part in [container.locale(), container.style(), container.variation()]
            .into_iter()
            .flatten()
        {
            key.push('_');
            key.push_str(part);
        }
        key.push('.');
        key.push_str(container.markup_type());
        Some(key)
    }
}

/// Looks for `<root>/<class path>[_<style>][_<locale>].<type>` files.
///
/// `com.example.HomePage` maps to `com/example/HomePage`. Locales are tried
/// from most to least specific (`de_CH`, `de`, none), styles before no style.
#[derive(Debug, Clone, Default)]
pub struct DirectoryResourceProvider {
    roots: Vec<PathBuf>,
}

impl DirectoryResourceProvider {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn add_root(&mut self, root: impl Into<PathBuf>) {
        self.roots.push(root.into());
    }

    /// Relative file names to try, most specific first
    pub fn candidates(container: &MarkupContainer, class: &str) -> Vec<String> {
        let base = class.replace("::", "/").replace('.', "/");

        let mut styles: Vec<Option<String>> = Vec::new();
        match (container.variation(), container.style()) {
            (Some(v), Some(s)) => styles.push(Some(format!("{}_{}", v, s))),
            (Some(v), None) => styles.push(Some(v.to_string())),
            (None, Some(s)) => styles.push(Some(s.to_string())),
            (None, None) => {}
        }
        styles.push(None);

        let mut locales: Vec<Option<String>> = Vec::new();
        if let Some(locale) = container.locale() {
            let parts: Vec<&str> = locale.split('_').collect();
            for n in (1..=parts.len()).rev() {
                locales.push(Some(parts[..n].join("_")));
            }
        }
        locales.push(None);

        let mut out = Vec::new();
        for style in &styles {
            for locale in &locales {
                let mut name = base.clone();
                if let Some(s) = style {
                    name.push('_');
                    name.push_str(s);
                }
                if let Some(l) = locale {
                    name.push('_');
                    name.push_str(l);
                }
                name.push('.');
                name.push_str(container.markup_type());
                out.push(name);
            }
        }
        out
    }
}

impl MarkupResourceProvider for DirectoryResourceProvider {
    fn locate(&self, container: &MarkupContainer, class: &str) -> Option<ProvidedResource> {
        for candidate in Self::candidates(container, class) {
            for root in &self.roots {
                let path = root.join(&candidate);
                if path.is_file() {
                    tracing::debug!(class, path = %path.display(), "located markup file");
                    let stream = MarkupResourceStream::new(Arc::new(FileResource::new(path)))
                        .with_markup_class(class)
                        .with_container_class(container.class())
                        .with_locale(container.locale().map(str::to_string))
                        .with_style(container.style().map(str::to_string))
                        .with_variation(container.variation().map(str::to_string))
                        .with_markup_type(container.markup_type());
                    return Some(ProvidedResource::Markup(stream));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cache_key() {
        let container = MarkupContainer::new("app.HomePage")
            .with_locale("de_CH")
            .with_style("dark");
        let key = DefaultCacheKeyProvider.cache_key(&container, "app.BasePage");
        assert_eq!(key.as_deref(), Some("app.BasePage_de_CH_dark.html"));
    }

    #[test]
    fn test_candidates_most_specific_first() {
        let container = MarkupContainer::new("app.HomePage")
            .with_locale("de_CH")
            .with_style("dark");
        let candidates = DirectoryResourceProvider::candidates(&container, "app.HomePage");
        assert_eq!(candidates[0], "app/HomePage_dark_de_CH.html");
        assert_eq!(candidates[2], "app/HomePage_dark.html");
        assert_eq!(candidates.last().map(String::as_str), Some("app/HomePage.html"));
        assert_eq!(candidates.len(), 6);
    }

    #[test]
    fn test_string_resource_touch_changes_time() {
        let resource = StringResource::new("mem:Base", "<p/>");
        let before = resource.last_modified().unwrap();
        resource.touch();
        assert!(resource.last_modified().unwrap() > before);
        resource.set_content("<b/>");
        assert_eq!(resource.read().unwrap(), b"<b/>".to_vec());
    }

    #[test]
    fn test_detached_stream_cannot_be_read() {
        let stream = MarkupResourceStream::detached("<string>");
        assert!(matches!(stream.read(), Err(MarkupError::ResourceRead { .. })));
    }
}
