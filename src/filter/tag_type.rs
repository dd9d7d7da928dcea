use super::{MarkupFilter, ParseContext, TagSource};
use crate::error::MarkupResult;
use crate::tag::{Tag, TagType};

/// HTML elements that never have a close tag
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

pub fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(name))
}

/// Marks void elements and expands `<span wicket:id="x"/>` into an open tag
/// plus a synthetic close, so the component gets a body to render into.
#[derive(Debug, Default)]
pub struct TagTypeHandler {
    pending: Option<Tag>,
}

impl TagTypeHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MarkupFilter for TagTypeHandler {
    fn name(&self) -> &'static str {
        "tag_type"
    }

    fn next_tag(
        &mut self,
        ctx: &mut ParseContext<'_>,
        upstream: &mut dyn TagSource,
    ) -> MarkupResult<Option<Tag>> {
        if let Some(close) = self.pending.take() {
            return Ok(Some(close));
        }
        let mut tag = match upstream.next_tag(ctx)? {
            Some(tag) => tag,
            None => return Ok(None),
        };
        if tag.namespace().is_some() {
            return Ok(Some(tag));
        }

        if is_void_element(tag.name()) {
            if tag.is_open() {
                tag.set_has_no_close_tag(true)?;
            }
        } else if tag.is_open_close() && tag.id().is_some() {
            tag.set_type(TagType::Open)?;
            self.pending = Some(tag.synthetic_close());
        }
        Ok(Some(tag))
    }
}
