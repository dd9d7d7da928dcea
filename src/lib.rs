//! # NullTrace Markup
//!
//! Component markup loading for the NullTrace web front-end.
//!
//! ## Features
//! - Streaming tag scanner with a pluggable filter chain
//! - Fragment tree over the flat element list, addressed by component path
//! - Markup inheritance (`<wicket:extend>` / `<wicket:child>`) with head
//!   contributions and body `onload` merged across the chain
//! - Thread-safe markup cache with negative caching and change-driven
//!   invalidation of every markup merged from a modified file
//!
//! ## Example: parse a single template
//! ```ignore
//! use nulltrace_markup::parse_markup;
//!
//! let markup = parse_markup(r#"<div wicket:id="greeting">Hello</div>"#)
//!     .expect("Failed to parse markup");
//! assert!(markup.find_fragment("greeting").is_some());
//! ```
//!
//! ## Example: cached lookup with inheritance
//! ```ignore
//! use std::sync::Arc;
//! use nulltrace_markup::{
//!     ComponentKind, ComponentRegistry, DirectoryResourceProvider, MarkupCache, MarkupContainer,
//! };
//!
//! let registry = Arc::new(ComponentRegistry::new());
//! registry.register("app.BasePage", None, ComponentKind::Page);
//! registry.register("app.HomePage", Some("app.BasePage"), ComponentKind::Page);
//!
//! let provider = DirectoryResourceProvider::new(vec!["templates".into()]);
//! let cache = MarkupCache::builder(registry, Box::new(provider)).build();
//! let markup = cache
//!     .get_markup(&MarkupContainer::new("app.HomePage"), None, false)?
//!     .expect("HomePage has markup");
//! println!("{}", markup.to_markup_string(true));
//! ```

pub mod cache;
pub mod error;
pub mod filter;
pub mod fragment;
pub mod head;
pub mod markup;
pub mod merge;
pub mod parser;
pub mod registry;
pub mod resource;
pub mod settings;
pub mod stream;
pub mod tag;
pub mod tokenizer;
pub mod watcher;

// --- Core types ---
pub use error::{MarkupError, MarkupResult};
pub use fragment::{FragmentNode, MarkupFragment};
pub use markup::{Markup, MarkupElement, RawText};
pub use settings::MarkupSettings;
pub use stream::MarkupStream;
pub use tag::{Attributes, ReservedKind, Tag, TagType};

// --- Loading ---
pub use cache::{CachedMarkup, MarkupCache, MarkupCacheBuilder};
pub use parser::MarkupParser;
pub use registry::{ComponentKind, ComponentRegistry, MarkupContainer};
pub use resource::{
    CacheKeyProvider, DefaultCacheKeyProvider, DirectoryResourceProvider, FileResource,
    MarkupResourceProvider, MarkupResourceStream, ProvidedResource, ResourceStream, StringResource,
};
pub use watcher::{ModificationWatcher, PollingWatcher};

use filter::ContainerContext;

/// Parse a template with default settings, outside of any container
pub fn parse_markup(input: &str) -> MarkupResult<Markup> {
    parse_markup_with_settings(input, &MarkupSettings::default())
}

/// Parse a template with custom settings
pub fn parse_markup_with_settings(input: &str, settings: &MarkupSettings) -> MarkupResult<Markup> {
    MarkupParser::new(MarkupResourceStream::detached("<string>"), settings).parse_str(input)
}

/// Parse a derived and a base template and merge them.
///
/// The derived template must contain `<wicket:extend>`; the base one is
/// looked up for `<wicket:child>`. With `is_page`, the result gets a head
/// section for the accumulated head contributions.
pub fn merge_markup(derived: &str, base: &str, is_page: bool) -> MarkupResult<Markup> {
    let settings = MarkupSettings::default();
    let parse = |class: &str, input: &str| {
        MarkupParser::new(
            MarkupResourceStream::detached(format!("{}.html", class)).with_markup_class(class),
            &settings,
        )
        .with_container(ContainerContext::new(class, is_page))
        .parse_str(input)
    };
    let derived = parse("Derived", derived)?;
    let base = parse("Base", base)?;
    match merge::extend_index(&derived)? {
        Some(extend) => merge::merge(&derived, extend, &base, is_page),
        None => Err(MarkupError::MissingExtendTag {
            class: "Derived".to_string(),
            location: derived.location().to_string(),
            namespace: derived.wicket_namespace().to_string(),
        }),
    }
}
