//! Fragment tree over the flat element list of a [`Markup`](crate::Markup).
//!
//! Nodes refer to elements by index, so the tree never owns tags or text and
//! close tags never point back into the tree.

use crate::error::{MarkupError, MarkupResult};
use crate::markup::MarkupElement;

/// Separator of component ids in a fragment path
pub const PATH_SEPARATOR: char = '/';

#[derive(Debug, Clone, PartialEq)]
pub enum FragmentNode {
    /// Raw text, or a tag that closes the enclosing fragment
    Element(usize),
    Fragment(MarkupFragment),
}

/// One addressable component tag and everything up to its close tag.
///
/// The synthetic root has no open tag.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MarkupFragment {
    open: Option<usize>,
    id: Option<String>,
    auto: bool,
    path: String,
    children: Vec<FragmentNode>,
}

impl MarkupFragment {
    fn root() -> Self {
        Self::default()
    }

    fn seeded(open: usize, id: Option<String>, auto: bool, path: String) -> Self {
        Self {
            open: Some(open),
            id,
            auto,
            path,
            children: vec![FragmentNode::Element(open)],
        }
    }

    /// Element index of the defining open tag; `None` for the root
    pub fn open_index(&self) -> Option<usize> {
        self.open
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Framework generated id; transparent for path lookups
    pub fn is_auto(&self) -> bool {
        self.auto
    }

    /// Path of user ids from the root, auto ids left out
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn children(&self) -> &[FragmentNode] {
        &self.children
    }

    /// Direct child fragments
    pub fn fragments(&self) -> impl Iterator<Item = &MarkupFragment> {
        self.children.iter().filter_map(|node| match node {
            FragmentNode::Fragment(f) => Some(f),
            FragmentNode::Element(_) => None,
        })
    }

    /// Look up a descendant by id or `a/b/c` path. Auto fragments are
    /// searched through as if they were not there.
    pub fn child_fragment(&self, path: &str) -> Option<&MarkupFragment> {
        let path = path.trim_matches(PATH_SEPARATOR);
        if path.is_empty() {
            return None;
        }
        let (head, rest) = match path.split_once(PATH_SEPARATOR) {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };

        for child in self.fragments() {
            if child.id() == Some(head) {
                match rest {
                    None => return Some(child),
                    Some(rest) => {
                        if let Some(found) = child.child_fragment(rest) {
                            return Some(found);
                        }
                    }
                }
            }
            if child.is_auto() {
                if let Some(found) = child.child_fragment(path) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Like [`child_fragment`](Self::child_fragment), but a missing path is an
    /// error when `throw_if_missing` is set
    pub fn get_child_fragment(
        &self,
        path: &str,
        throw_if_missing: bool,
        location: &str,
    ) -> MarkupResult<Option<&MarkupFragment>> {
        match self.child_fragment(path) {
            Some(found) => Ok(Some(found)),
            None if throw_if_missing => Err(MarkupError::FragmentNotFound {
                path: path.to_string(),
                location: location.to_string(),
            }),
            None => Ok(None),
        }
    }

    /// Fragment whose open tag is element `index`
    pub fn fragment_for_element(&self, index: usize) -> Option<&MarkupFragment> {
        if self.open == Some(index) {
            return Some(self);
        }
        self.fragments().find_map(|f| f.fragment_for_element(index))
    }

    /// Depth-first element indices, in source order
    pub fn flatten(&self) -> Vec<usize> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<usize>) {
        for node in &self.children {
            match node {
                FragmentNode::Element(index) => out.push(*index),
                FragmentNode::Fragment(fragment) => fragment.flatten_into(out),
            }
        }
    }
}

fn child_path(base: &str, id: &str) -> String {
    if base.is_empty() {
        id.to_string()
    } else {
        format!("{}{}{}", base, PATH_SEPARATOR, id)
    }
}

/// Build the fragment tree of a balanced element list
pub fn build_tree(elements: &[MarkupElement], location: &str) -> MarkupResult<MarkupFragment> {
    let mut current = MarkupFragment::root();
    let mut base_path = String::new();
    let mut stack: Vec<(MarkupFragment, String)> = Vec::new();

    for (index, element) in elements.iter().enumerate() {
        let tag = match element {
            MarkupElement::Text(_) => {
                current.children.push(FragmentNode::Element(index));
                continue;
            }
            MarkupElement::Tag(tag) => tag,
        };

        let id = tag.id().map(str::to_string);
        let auto = tag.is_auto_component();
        let path = match (&id, auto) {
            (Some(id), false) => child_path(&base_path, id),
            _ => base_path.clone(),
        };

        if tag.is_close() {
            current.children.push(FragmentNode::Element(index));
            let (parent, parent_path) = stack.pop().ok_or_else(|| MarkupError::UnbalancedTag {
                location: location.to_string(),
                tag: tag.to_string(),
                expected: "no open tag".to_string(),
            })?;
            let done = std::mem::replace(&mut current, parent);
            current.children.push(FragmentNode::Fragment(done));
            base_path = parent_path;
        } else if tag.is_open_close() || tag.has_no_close_tag() {
            current
                .children
                .push(FragmentNode::Fragment(MarkupFragment::seeded(index, id, auto, path)));
        } else {
            let child = MarkupFragment::seeded(index, id, auto, path.clone());
            let parent = std::mem::replace(&mut current, child);
            stack.push((parent, std::mem::replace(&mut base_path, path)));
        }
    }

    if !stack.is_empty() {
        let tag = current
            .open
            .and_then(|i| elements.get(i))
            .map(|e| e.to_markup())
            .unwrap_or_default();
        return Err(MarkupError::UnclosedTag {
            location: location.to_string(),
            tag,
        });
    }

    if current.children.len() == 1 {
        if let Some(FragmentNode::Fragment(_)) = current.children.first() {
            if let Some(FragmentNode::Fragment(only)) = current.children.pop() {
                return Ok(only);
            }
        }
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::RawText;
    use crate::tag::{Tag, TagType};

    fn open(name: &str, id: &str, auto: bool) -> MarkupElement {
        let mut tag = Tag::new(name, None, TagType::Open);
        tag.set_id(id).unwrap();
        tag.set_auto_component(auto).unwrap();
        MarkupElement::Tag(tag)
    }

    fn close(name: &str, id: &str) -> MarkupElement {
        let mut tag = Tag::new(name, None, TagType::Close);
        tag.set_id(id).unwrap();
        MarkupElement::Tag(tag)
    }

    fn text(s: &str) -> MarkupElement {
        MarkupElement::Text(RawText::new(0, s))
    }

    #[test]
    fn test_nested_paths_skip_auto_ids() {
        let elements = vec![
            text("<html>"),
            open("head", "_header_", true),
            close("head", "_header_"),
            open("div", "outer", false),
            open("span", "inner", false),
            close("span", "inner"),
            close("div", "outer"),
            text("</html>"),
        ];
        let root = build_tree(&elements, "test").unwrap();
        let inner = root.child_fragment("outer/inner").unwrap();
        assert_eq!(inner.path(), "outer/inner");
        assert_eq!(inner.open_index(), Some(4));
        assert_eq!(root.child_fragment("_header_").unwrap().path(), "");
        assert_eq!(root.flatten(), (0..elements.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_lookup_through_auto_wrapper() {
        let elements = vec![
            open("body", "_body", true),
            open("span", "label", false),
            close("span", "label"),
            close("body", "_body"),
            text("\n"),
        ];
        let root = build_tree(&elements, "test").unwrap();
        let label = root.child_fragment("label").unwrap();
        assert_eq!(label.path(), "label");
    }

    #[test]
    fn test_single_fragment_root_collapses() {
        let elements = vec![open("div", "only", false), text("x"), close("div", "only")];
        let root = build_tree(&elements, "test").unwrap();
        assert_eq!(root.open_index(), Some(0));
        assert_eq!(root.id(), Some("only"));
    }

    #[test]
    fn test_unclosed_tag_fails() {
        let elements = vec![open("div", "a", false), text("x")];
        let result = build_tree(&elements, "test");
        assert!(matches!(result, Err(MarkupError::UnclosedTag { .. })));
    }

    #[test]
    fn test_missing_path_with_throw() {
        let elements = vec![text("plain")];
        let root = build_tree(&elements, "page.html").unwrap();
        assert!(root.get_child_fragment("nope", false, "page.html").unwrap().is_none());
        let err = root.get_child_fragment("nope", true, "page.html").unwrap_err();
        assert!(matches!(err, MarkupError::FragmentNotFound { .. }));
    }
}
