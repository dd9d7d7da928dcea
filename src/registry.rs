//! Component classes and their declared parents.
//!
//! Markup inheritance only needs to know the immediate base of a class, so the
//! class hierarchy is an explicit table instead of anything reflective.

use dashmap::DashMap;
use std::collections::HashSet;

use crate::error::{MarkupError, MarkupResult};
use crate::settings::DEFAULT_MARKUP_TYPE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Page,
    Panel,
    Border,
    Component,
}

#[derive(Debug, Clone)]
struct ClassEntry {
    parent: Option<String>,
    kind: ComponentKind,
}

/// Class name → (parent, kind) table, safe to share between threads
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    classes: DashMap<String, ClassEntry>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `class` with an optional parent. Re-registering replaces
    /// the previous entry.
    pub fn register(&self, class: impl Into<String>, parent: Option<&str>, kind: ComponentKind) {
        self.classes.insert(
            class.into(),
            ClassEntry {
                parent: parent.map(str::to_string),
                kind,
            },
        );
    }

    pub fn contains(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    pub fn parent(&self, class: &str) -> Option<String> {
        self.classes.get(class).and_then(|e| e.parent.clone())
    }

    pub fn kind(&self, class: &str) -> Option<ComponentKind> {
        self.classes.get(class).map(|e| e.kind)
    }

    pub fn is_page(&self, class: &str) -> bool {
        self.kind(class) == Some(ComponentKind::Page)
    }

    /// `class` followed by its ancestors, nearest first. Stops on a cycle
    /// or an unregistered parent.
    pub fn ancestors(&self, class: &str) -> Vec<String> {
        let mut chain = vec![class.to_string()];
        let mut seen: HashSet<String> = chain.iter().cloned().collect();
        let mut current = class.to_string();
        while let Some(parent) = self.parent(&current) {
            if !seen.insert(parent.clone()) {
                tracing::warn!(class, parent = %parent, "cycle in component class hierarchy");
                break;
            }
            chain.push(parent.clone());
            current = parent;
        }
        chain
    }

    /// True when `class` is `container` or one of its ancestors
    pub fn is_assignable(&self, class: &str, container: &str) -> bool {
        self.ancestors(container).iter().any(|c| c == class)
    }

    pub fn require(&self, class: &str) -> MarkupResult<ComponentKind> {
        self.kind(class).ok_or_else(|| MarkupError::UnknownComponentClass {
            class: class.to_string(),
        })
    }
}

/// The component asking for markup: its class plus the variant dimensions
/// that select a markup file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupContainer {
    class: String,
    locale: Option<String>,
    style: Option<String>,
    variation: Option<String>,
    markup_type: Option<String>,
}

impl MarkupContainer {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            locale: None,
            style: None,
            variation: None,
            markup_type: None,
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn with_variation(mut self, variation: impl Into<String>) -> Self {
        self.variation = Some(variation.into());
        self
    }

    pub fn with_markup_type(mut self, markup_type: impl Into<String>) -> Self {
        self.markup_type = Some(markup_type.into());
        self
    }

    pub fn class(&self) -> &str {
        &self.class
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

    /// Explicit markup type, else `html`. The cache fills in
    /// `MarkupSettings::markup_type` for containers without one.
    pub fn markup_type(&self) -> &str {
        self.markup_type.as_deref().unwrap_or(DEFAULT_MARKUP_TYPE)
    }

    pub fn has_markup_type(&self) -> bool {
        self.markup_type.is_some()
    }
}
