use std::fmt::Write as _;

use crate::error::{MarkupError, MarkupResult};
use crate::fragment::{build_tree, MarkupFragment};
use crate::resource::MarkupResourceStream;
use crate::settings::DEFAULT_NAMESPACE;
use crate::tag::Tag;

/// Unparsed source text between two relevant tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawText {
    offset: usize,
    text: String,
}

impl RawText {
    pub fn new(offset: usize, text: impl Into<String>) -> Self {
        Self {
            offset,
            text: text.into(),
        }
    }

    /// Byte offset in the source the text starts at
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarkupElement {
    Text(RawText),
    Tag(Tag),
}

impl MarkupElement {
    pub fn as_tag(&self) -> Option<&Tag> {
        match self {
            MarkupElement::Tag(tag) => Some(tag),
            MarkupElement::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&RawText> {
        match self {
            MarkupElement::Text(text) => Some(text),
            MarkupElement::Tag(_) => None,
        }
    }

    pub fn is_tag(&self) -> bool {
        matches!(self, MarkupElement::Tag(_))
    }

    pub fn to_markup(&self) -> String {
        match self {
            MarkupElement::Text(text) => text.text.clone(),
            MarkupElement::Tag(tag) => tag.to_markup(),
        }
    }

    fn freeze(&mut self) {
        if let MarkupElement::Tag(tag) = self {
            tag.make_immutable();
        }
    }

    fn thaw(&self) -> MarkupElement {
        match self {
            MarkupElement::Tag(tag) => MarkupElement::Tag(tag.mutable()),
            MarkupElement::Text(text) => MarkupElement::Text(text.clone()),
        }
    }
}

/// Parse (or merge) result: the flat element list, the fragment tree over it
/// and what was detected about the source.
///
/// Markup returned by the parser, the merger or the cache is immutable;
/// [`Markup::mutable_copy`] is the only way to edit it.
#[derive(Debug, Clone)]
pub struct Markup {
    resource: MarkupResourceStream,
    /// Base markup resources merged into this one, nearest first
    bases: Vec<MarkupResourceStream>,
    elements: Vec<MarkupElement>,
    root: MarkupFragment,
    encoding: Option<String>,
    wicket_namespace: String,
    xml_declaration: Option<String>,
    doctype: Option<String>,
    immutable: bool,
}

impl Markup {
    pub fn new(resource: MarkupResourceStream) -> Self {
        Self {
            resource,
            bases: Vec::new(),
            elements: Vec::new(),
            root: MarkupFragment::default(),
            encoding: None,
            wicket_namespace: DEFAULT_NAMESPACE.to_string(),
            xml_declaration: None,
            doctype: None,
            immutable: false,
        }
    }

    // ─── Accessors ───────────────────────────────────────────────────────────

    pub fn resource(&self) -> &MarkupResourceStream {
        &self.resource
    }

    pub fn location(&self) -> &str {
        self.resource.locator()
    }

    pub fn bases(&self) -> &[MarkupResourceStream] {
        &self.bases
    }

    /// True for the result of an inheritance merge
    pub fn is_merged(&self) -> bool {
        !self.bases.is_empty()
    }

    pub fn elements(&self) -> &[MarkupElement] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MarkupElement> {
        self.elements.get(index)
    }

    pub fn tag(&self, index: usize) -> Option<&Tag> {
        self.elements.get(index).and_then(MarkupElement::as_tag)
    }

    pub fn root(&self) -> &MarkupFragment {
        &self.root
    }

    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    pub fn wicket_namespace(&self) -> &str {
        &self.wicket_namespace
    }

    pub fn xml_declaration(&self) -> Option<&str> {
        self.xml_declaration.as_deref()
    }

    pub fn doctype(&self) -> Option<&str> {
        self.doctype.as_deref()
    }

    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    // ─── Building ────────────────────────────────────────────────────────────

    pub(crate) fn set_bases(&mut self, bases: Vec<MarkupResourceStream>) {
        self.bases = bases;
    }

    pub(crate) fn set_encoding(&mut self, encoding: Option<String>) {
        self.encoding = encoding;
    }

    pub(crate) fn set_wicket_namespace(&mut self, namespace: impl Into<String>) {
        self.wicket_namespace = namespace.into();
    }

    pub(crate) fn set_xml_declaration(&mut self, declaration: Option<String>) {
        self.xml_declaration = declaration;
    }

    pub(crate) fn set_doctype(&mut self, doctype: Option<String>) {
        self.doctype = doctype;
    }

    fn check_mutable(&self, operation: &str) -> MarkupResult<()> {
        if self.immutable {
            return Err(MarkupError::ImmutableMarkup {
                location: self.location().to_string(),
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    pub fn add_element(&mut self, element: MarkupElement) -> MarkupResult<()> {
        self.check_mutable("add_element")?;
        self.elements.push(element);
        Ok(())
    }

    /// Append raw text, joining it with a directly preceding text element
    pub fn add_text(&mut self, offset: usize, text: &str) -> MarkupResult<()> {
        self.check_mutable("add_text")?;
        if text.is_empty() {
            return Ok(());
        }
        if let Some(MarkupElement::Text(last)) = self.elements.last_mut() {
            last.text.push_str(text);
            return Ok(());
        }
        self.elements.push(MarkupElement::Text(RawText::new(offset, text)));
        Ok(())
    }

    pub fn elements_mut(&mut self) -> MarkupResult<&mut Vec<MarkupElement>> {
        self.check_mutable("edit elements")?;
        Ok(&mut self.elements)
    }

    /// Link close tags to their open tags, build the fragment tree and
    /// freeze everything
    pub fn assemble(mut self) -> MarkupResult<Markup> {
        self.check_mutable("assemble")?;
        self.link_close_tags()?;
        self.root = build_tree(&self.elements, self.resource.locator())?;
        self.make_immutable();
        Ok(self)
    }

    fn link_close_tags(&mut self) -> MarkupResult<()> {
        let mut stack: Vec<usize> = Vec::new();
        for index in 0..self.elements.len() {
            let tag = match &self.elements[index] {
                MarkupElement::Tag(tag) => tag,
                MarkupElement::Text(_) => continue,
            };
            if tag.is_open() && !tag.has_no_close_tag() {
                stack.push(index);
                continue;
            }
            if !tag.is_close() {
                continue;
            }
            let open_index = match stack.pop() {
                Some(open_index) => open_index,
                None => {
                    return Err(MarkupError::UnbalancedTag {
                        location: self.location().to_string(),
                        tag: tag.to_string(),
                        expected: "no open tag".to_string(),
                    })
                }
            };
            let matches = match &self.elements[open_index] {
                MarkupElement::Tag(open) => tag.closes(open),
                MarkupElement::Text(_) => false,
            };
            if !matches {
                let expected = self.elements[open_index].to_markup();
                return Err(MarkupError::UnbalancedTag {
                    location: self.location().to_string(),
                    tag: tag.to_string(),
                    expected,
                });
            }
            if let MarkupElement::Tag(close) = &mut self.elements[index] {
                close.set_open_index(Some(open_index))?;
            }
        }
        if let Some(&open_index) = stack.last() {
            return Err(MarkupError::UnclosedTag {
                location: self.location().to_string(),
                tag: self.elements[open_index].to_markup(),
            });
        }
        Ok(())
    }

    /// Freeze the markup and every tag in it. Idempotent.
    pub fn make_immutable(&mut self) {
        if self.immutable {
            return;
        }
        for element in &mut self.elements {
            element.freeze();
        }
        self.immutable = true;
    }

    /// Editable deep copy; the original (possibly cached) markup is untouched
    pub fn mutable_copy(&self) -> Markup {
        let mut copy = self.clone();
        copy.elements = self.elements.iter().map(MarkupElement::thaw).collect();
        copy.immutable = false;
        copy
    }

    // ─── Lookup ──────────────────────────────────────────────────────────────

    /// Fragment of the component at `path`. The root itself is addressable
    /// by its id when the tree collapsed onto a single fragment.
    pub fn find_fragment(&self, path: &str) -> Option<&MarkupFragment> {
        let trimmed = path.trim_matches('/');
        if let (Some(_), Some(id)) = (self.root.open_index(), self.root.id()) {
            if trimmed == id {
                return Some(&self.root);
            }
            if let Some(rest) = trimmed.strip_prefix(id).and_then(|r| r.strip_prefix('/')) {
                if let Some(found) = self.root.child_fragment(rest) {
                    return Some(found);
                }
            }
        }
        self.root.child_fragment(trimmed)
    }

    pub fn get_fragment(&self, path: &str, throw_if_missing: bool) -> MarkupResult<Option<&MarkupFragment>> {
        match self.find_fragment(path) {
            Some(found) => Ok(Some(found)),
            None if throw_if_missing => Err(MarkupError::FragmentNotFound {
                path: path.to_string(),
                location: self.location().to_string(),
            }),
            None => Ok(None),
        }
    }

    pub fn fragment_for_element(&self, index: usize) -> Option<&MarkupFragment> {
        self.root.fragment_for_element(index)
    }

    // ─── Rendering ───────────────────────────────────────────────────────────

    /// Concatenated markup text. With `strip_reserved` every tag of the
    /// reserved namespace is left out, their content is kept.
    pub fn to_markup_string(&self, strip_reserved: bool) -> String {
        let mut out = String::new();
        for element in &self.elements {
            match element {
                MarkupElement::Tag(tag) if strip_reserved && tag.is_reserved() => {}
                other => out.push_str(&other.to_markup()),
            }
        }
        out
    }

    /// One element per line, `highlight` marked with `>>`
    pub fn debug_string(&self, highlight: Option<usize>) -> String {
        debug_elements(&self.elements, highlight)
    }
}

pub(crate) fn debug_elements(elements: &[MarkupElement], highlight: Option<usize>) -> String {
    let mut out = String::new();
    for (index, element) in elements.iter().enumerate() {
        let marker = if Some(index) == highlight { ">>" } else { "  " };
        let text = match element {
            MarkupElement::Text(raw) => format!("{:?}", truncate(raw.text(), 60)),
            MarkupElement::Tag(tag) => {
                let mut s = tag.to_markup();
                if let Some(id) = tag.id() {
                    let _ = write!(s, "  [id={}{}]", id, if tag.is_auto_component() { ", auto" } else { "" });
                }
                if let Some(class) = tag.markup_class() {
                    let _ = write!(s, "  [from {}]", class);
                }
                s
            }
        };
        let _ = writeln!(out, "{} {:4}: {}", marker, index, text);
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push_str("...");
    out
}

impl std::fmt::Display for Markup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_markup_string(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::TagType;

    fn span(tag_type: TagType) -> MarkupElement {
        let mut tag = Tag::new("span", None, tag_type);
        tag.set_id("label").unwrap();
        MarkupElement::Tag(tag)
    }

    fn sample() -> Markup {
        let mut markup = Markup::new(MarkupResourceStream::detached("sample.html"));
        markup.add_text(0, "<p>").unwrap();
        markup.add_element(span(TagType::Open)).unwrap();
        markup.add_text(0, "text").unwrap();
        markup.add_element(span(TagType::Close)).unwrap();
        markup.add_text(0, "</p>").unwrap();
        markup.assemble().unwrap()
    }

    #[test]
    fn test_assemble_links_close_tags() {
        let markup = sample();
        assert_eq!(markup.tag(3).unwrap().open_index(), Some(1));
        assert!(markup.tag(1).unwrap().is_immutable());
        assert_eq!(markup.find_fragment("label").unwrap().open_index(), Some(1));
    }

    #[test]
    fn test_frozen_markup_rejects_edits() {
        let mut markup = sample();
        markup.make_immutable();
        markup.make_immutable();
        let result = markup.add_text(0, "x");
        assert!(matches!(result, Err(MarkupError::ImmutableMarkup { .. })));
    }

    #[test]
    fn test_mutable_copy_is_independent() {
        let markup = sample();
        let mut copy = markup.mutable_copy();
        copy.add_text(0, "<hr>").unwrap();
        if let Some(MarkupElement::Tag(tag)) = copy.elements_mut().unwrap().get_mut(1) {
            tag.put("class", "big").unwrap();
        }
        assert_eq!(markup.len(), 5);
        assert!(markup.tag(1).unwrap().attribute("class").is_none());
        assert!(markup.is_immutable());
    }

    #[test]
    fn test_adjacent_text_is_joined() {
        let mut markup = Markup::new(MarkupResourceStream::detached("t"));
        markup.add_text(0, "a").unwrap();
        markup.add_text(1, "b").unwrap();
        assert_eq!(markup.len(), 1);
        assert_eq!(markup.to_markup_string(false), "ab");
    }

    #[test]
    fn test_mismatched_close_is_unbalanced() {
        let mut markup = Markup::new(MarkupResourceStream::detached("t"));
        markup.add_element(span(TagType::Open)).unwrap();
        markup
            .add_element(MarkupElement::Tag(Tag::new("div", None, TagType::Close)))
            .unwrap();
        assert!(matches!(markup.assemble(), Err(MarkupError::UnbalancedTag { .. })));
    }

    #[test]
    fn test_debug_string_highlights() {
        let markup = sample();
        let debug = markup.debug_string(Some(1));
        assert!(debug.lines().nth(1).unwrap().starts_with(">>"));
        assert!(debug.contains("[id=label]"));
    }
}
