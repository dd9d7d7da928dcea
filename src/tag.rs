use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MarkupError, MarkupResult};

/// Open, close or open-close (`<br/>`) form of a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagType {
    Open,
    Close,
    OpenClose,
}

/// Tags of the reserved namespace that the pipeline treats specially.
///
/// Classification is done once while filtering; afterwards every query is a
/// plain enum comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservedKind {
    Extend,
    Child,
    Head,
    Body,
    Panel,
    Border,
    Remove,
    Param,
    Link,
    Component,
    Message,
    Fragment,
    Container,
    Enclosure,
}

impl ReservedKind {
    pub const ALL: &'static [ReservedKind] = &[
        ReservedKind::Extend,
        ReservedKind::Child,
        ReservedKind::Head,
        ReservedKind::Body,
        ReservedKind::Panel,
        ReservedKind::Border,
        ReservedKind::Remove,
        ReservedKind::Param,
        ReservedKind::Link,
        ReservedKind::Component,
        ReservedKind::Message,
        ReservedKind::Fragment,
        ReservedKind::Container,
        ReservedKind::Enclosure,
    ];

    /// Case-insensitive lookup of a reserved tag name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    pub fn name(self) -> &'static str {
        match self {
            ReservedKind::Extend => "extend",
            ReservedKind::Child => "child",
            ReservedKind::Head => "head",
            ReservedKind::Body => "body",
            ReservedKind::Panel => "panel",
            ReservedKind::Border => "border",
            ReservedKind::Remove => "remove",
            ReservedKind::Param => "param",
            ReservedKind::Link => "link",
            ReservedKind::Component => "component",
            ReservedKind::Message => "message",
            ReservedKind::Fragment => "fragment",
            ReservedKind::Container => "container",
            ReservedKind::Enclosure => "enclosure",
        }
    }

    /// Panels, borders and extends own their whole markup file; no head
    /// section can follow them.
    pub fn is_major(self) -> bool {
        matches!(
            self,
            ReservedKind::Panel | ReservedKind::Border | ReservedKind::Extend
        )
    }

    /// Kinds that may occur several times per file and therefore get a
    /// numbered auto id.
    pub fn is_repeatable(self) -> bool {
        matches!(
            self,
            ReservedKind::Message
                | ReservedKind::Link
                | ReservedKind::Enclosure
                | ReservedKind::Head
                | ReservedKind::Component
                | ReservedKind::Param
                | ReservedKind::Body
        )
    }
}

/// Attribute map that keeps insertion order and unique keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Insert or replace. A replaced value keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => Some(std::mem::replace(v, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A parsed tag.
///
/// Tags are built mutable by the tokenizer, edited by the filter chain and
/// frozen once the markup is complete. Every setter fails on a frozen tag;
/// [`Tag::mutable`] hands out an editable copy instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    name: String,
    namespace: Option<String>,
    tag_type: TagType,
    attributes: Attributes,
    pos: usize,
    length: usize,
    line: usize,
    column: usize,
    id: Option<String>,
    auto_component: bool,
    reserved: Option<ReservedKind>,
    has_no_close_tag: bool,
    open_index: Option<usize>,
    markup_class: Option<String>,
    modified: bool,
    ignore: bool,
    immutable: bool,
    source: Option<String>,
}

impl Tag {
    pub fn new(name: impl Into<String>, namespace: Option<String>, tag_type: TagType) -> Self {
        Self {
            name: name.into(),
            namespace,
            tag_type,
            attributes: Attributes::new(),
            pos: 0,
            length: 0,
            line: 0,
            column: 0,
            id: None,
            auto_component: false,
            reserved: None,
            has_no_close_tag: false,
            open_index: None,
            markup_class: None,
            modified: false,
            ignore: false,
            immutable: false,
            source: None,
        }
    }

    /// Build a tag with its source span
    pub(crate) fn at(
        name: impl Into<String>,
        namespace: Option<String>,
        tag_type: TagType,
        pos: usize,
        length: usize,
        line: usize,
        column: usize,
    ) -> Self {
        let mut tag = Self::new(name, namespace, tag_type);
        tag.pos = pos;
        tag.length = length;
        tag.line = line;
        tag.column = column;
        tag
    }

    /// Attach the exact source text the tag was read from
    pub(crate) fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    /// A zero-length tag inserted by a filter or the merger in front of
    /// `anchor`. It has no source text and is rendered from its fields.
    pub fn synthetic(name: &str, tag_type: TagType, anchor: &Tag) -> Tag {
        let mut tag = Tag::at(name, None, tag_type, anchor.pos, 0, anchor.line, anchor.column);
        tag.modified = true;
        tag
    }

    /// Zero-length close tag for this open tag, placed right after it
    pub fn synthetic_close(&self) -> Tag {
        let mut tag = Tag::at(
            self.name.clone(),
            self.namespace.clone(),
            TagType::Close,
            self.pos + self.length,
            0,
            self.line,
            self.column,
        );
        tag.modified = true;
        tag
    }

    // ─── Accessors ───────────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// `ns:name` or plain `name`
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}:{}", ns, self.name),
            None => self.name.clone(),
        }
    }

    pub fn tag_type(&self) -> TagType {
        self.tag_type
    }

    pub fn is_open(&self) -> bool {
        self.tag_type == TagType::Open
    }

    pub fn is_close(&self) -> bool {
        self.tag_type == TagType::Close
    }

    pub fn is_open_close(&self) -> bool {
        self.tag_type == TagType::OpenClose
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key)
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn is_auto_component(&self) -> bool {
        self.auto_component
    }

    pub fn reserved_kind(&self) -> Option<ReservedKind> {
        self.reserved
    }

    pub fn is_reserved(&self) -> bool {
        self.reserved.is_some()
    }

    pub fn is_reserved_kind(&self, kind: ReservedKind) -> bool {
        self.reserved == Some(kind)
    }

    pub fn is_extend(&self) -> bool {
        self.is_reserved_kind(ReservedKind::Extend)
    }

    pub fn is_child(&self) -> bool {
        self.is_reserved_kind(ReservedKind::Child)
    }

    /// `<wicket:head>`
    pub fn is_head_region(&self) -> bool {
        self.is_reserved_kind(ReservedKind::Head)
    }

    pub fn is_major(&self) -> bool {
        self.reserved.map(ReservedKind::is_major).unwrap_or(false)
    }

    /// Literal (non reserved) `<head>`
    pub fn is_plain_head(&self) -> bool {
        self.namespace.is_none() && self.name.eq_ignore_ascii_case("head")
    }

    /// Literal (non reserved) `<body>`
    pub fn is_plain_body(&self) -> bool {
        self.namespace.is_none() && self.name.eq_ignore_ascii_case("body")
    }

    pub fn has_no_close_tag(&self) -> bool {
        self.has_no_close_tag
    }

    /// Element index of the matching open tag (close tags only)
    pub fn open_index(&self) -> Option<usize> {
        self.open_index
    }

    /// Class whose markup file contributed this tag (set by the merger)
    pub fn markup_class(&self) -> Option<&str> {
        self.markup_class.as_deref()
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn is_ignored(&self) -> bool {
        self.ignore
    }

    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    /// Source text as read, if the tag came from a markup file
    pub fn source_text(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Markup text of the tag: the untouched source when nothing changed,
    /// otherwise rendered from its fields
    pub fn to_markup(&self) -> String {
        match &self.source {
            Some(source) if !self.modified => source.clone(),
            _ => self.to_string(),
        }
    }

    /// Structural correspondence: `self` is the close tag of `open`
    pub fn closes(&self, open: &Tag) -> bool {
        self.is_close()
            && open.is_open()
            && self.name.eq_ignore_ascii_case(&open.name)
            && self.namespace == open.namespace
    }

    // ─── Mutation ────────────────────────────────────────────────────────────

    fn check_mutable(&self) -> MarkupResult<()> {
        if self.immutable {
            return Err(MarkupError::ImmutableTag {
                tag: self.to_string(),
            });
        }
        Ok(())
    }

    /// Editable copy of a frozen tag. Edits on the copy never reach the
    /// original, which may be shared by cached markup.
    pub fn mutable(&self) -> Tag {
        let mut copy = self.clone();
        copy.immutable = false;
        copy
    }

    /// Same as [`Tag::mutable`] but reuses `self` when it is not frozen
    pub fn into_mutable(mut self) -> Tag {
        self.immutable = false;
        self
    }

    /// Freeze the tag. Idempotent.
    pub fn make_immutable(&mut self) {
        self.immutable = true;
    }

    pub fn set_type(&mut self, tag_type: TagType) -> MarkupResult<()> {
        self.check_mutable()?;
        if self.tag_type != tag_type {
            self.tag_type = tag_type;
            self.modified = true;
        }
        Ok(())
    }

    pub fn set_namespace(&mut self, namespace: Option<String>) -> MarkupResult<()> {
        self.check_mutable()?;
        if self.namespace != namespace {
            self.namespace = namespace;
            self.modified = true;
        }
        Ok(())
    }

    pub fn set_id(&mut self, id: impl Into<String>) -> MarkupResult<()> {
        self.check_mutable()?;
        self.id = Some(id.into());
        Ok(())
    }

    pub fn set_auto_component(&mut self, auto: bool) -> MarkupResult<()> {
        self.check_mutable()?;
        self.auto_component = auto;
        Ok(())
    }

    pub fn set_reserved(&mut self, kind: Option<ReservedKind>) -> MarkupResult<()> {
        self.check_mutable()?;
        self.reserved = kind;
        Ok(())
    }

    pub fn set_has_no_close_tag(&mut self, value: bool) -> MarkupResult<()> {
        self.check_mutable()?;
        self.has_no_close_tag = value;
        Ok(())
    }

    pub fn set_open_index(&mut self, index: Option<usize>) -> MarkupResult<()> {
        self.check_mutable()?;
        self.open_index = index;
        Ok(())
    }

    pub fn set_markup_class(&mut self, class: impl Into<String>) -> MarkupResult<()> {
        self.check_mutable()?;
        self.markup_class = Some(class.into());
        Ok(())
    }

    pub fn set_modified(&mut self, modified: bool) -> MarkupResult<()> {
        self.check_mutable()?;
        self.modified = modified;
        Ok(())
    }

    pub fn set_ignore(&mut self, ignore: bool) -> MarkupResult<()> {
        self.check_mutable()?;
        self.ignore = ignore;
        Ok(())
    }

    /// Stretch the source span, e.g. to swallow a removed region
    pub fn set_length(&mut self, length: usize) -> MarkupResult<()> {
        self.check_mutable()?;
        self.length = length;
        Ok(())
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) -> MarkupResult<()> {
        self.check_mutable()?;
        self.attributes.insert(key, value);
        self.modified = true;
        Ok(())
    }

    pub fn remove_attribute(&mut self, key: &str) -> MarkupResult<Option<String>> {
        self.check_mutable()?;
        let removed = self.attributes.remove(key);
        if removed.is_some() {
            self.modified = true;
        }
        Ok(removed)
    }

    /// Attribute insertion used by the tokenizer; does not flag the tag as
    /// modified.
    pub(crate) fn push_parsed_attribute(&mut self, key: String, value: String) -> bool {
        if self.attributes.contains(&key) {
            return false;
        }
        self.attributes.insert(key, value);
        true
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<")?;
        if self.is_close() {
            f.write_str("/")?;
        }
        f.write_str(&self.qualified_name())?;
        if !self.is_close() {
            for (key, value) in self.attributes.iter() {
                write!(f, " {}=\"{}\"", key, value.replace('"', "&quot;"))?;
            }
        }
        if self.is_open_close() {
            f.write_str("/")?;
        }
        f.write_str(">")
    }
}
