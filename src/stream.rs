use std::sync::Arc;

use crate::error::{MarkupError, MarkupResult};
use crate::markup::{Markup, MarkupElement};
use crate::tag::Tag;

/// Read-only cursor over a shared, immutable [`Markup`]
#[derive(Debug, Clone)]
pub struct MarkupStream {
    markup: Arc<Markup>,
    index: usize,
}

impl MarkupStream {
    pub fn new(markup: Arc<Markup>) -> Self {
        Self { markup, index: 0 }
    }

    pub fn markup(&self) -> &Arc<Markup> {
        &self.markup
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    pub fn has_more(&self) -> bool {
        self.index < self.markup.len()
    }

    pub fn get(&self) -> Option<&MarkupElement> {
        self.markup.get(self.index)
    }

    /// Current element, if it is a tag
    pub fn tag(&self) -> Option<&Tag> {
        self.markup.tag(self.index)
    }

    /// Advance and return the new current element
    pub fn next_element(&mut self) -> Option<&MarkupElement> {
        if self.index < self.markup.len() {
            self.index += 1;
        }
        self.markup.get(self.index)
    }

    pub fn skip_raw_text(&mut self) {
        while let Some(MarkupElement::Text(_)) = self.get() {
            self.index += 1;
        }
    }

    /// Move past the component whose open tag is the current element,
    /// including its body and close tag
    pub fn skip_component(&mut self) -> MarkupResult<()> {
        let open = match self.tag() {
            Some(tag) if !tag.is_close() => tag,
            _ => return Err(self.error("skip_component needs an open tag at the current position")),
        };
        if open.is_open_close() || open.has_no_close_tag() {
            self.index += 1;
            return Ok(());
        }
        let from = self.index;
        let close = (from + 1..self.markup.len()).find(|&i| {
            self.markup
                .tag(i)
                .map_or(false, |t| t.is_close() && t.open_index() == Some(from))
        });
        match close {
            Some(close) => {
                self.index = close + 1;
                Ok(())
            }
            None => Err(self.error(format!("No close tag found for '{}'", open))),
        }
    }

    /// Element index of the open tag of the component at `path`
    pub fn find_component_index(&self, path: &str) -> MarkupResult<usize> {
        self.markup
            .find_fragment(path)
            .and_then(|f| f.open_index())
            .ok_or_else(|| MarkupError::FragmentNotFound {
                path: path.to_string(),
                location: self.markup.location().to_string(),
            })
    }

    /// Error at the current position with the element list as context
    pub fn error(&self, message: impl Into<String>) -> MarkupError {
        MarkupError::MarkupStream {
            location: self.markup.location().to_string(),
            index: self.index,
            message: message.into(),
            context: self.debug_string(),
        }
    }

    pub fn debug_string(&self) -> String {
        self.markup.debug_string(Some(self.index))
    }
}
