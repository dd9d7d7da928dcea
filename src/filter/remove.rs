use super::{MarkupFilter, ParseContext, TagSource};
use crate::error::MarkupResult;
use crate::tag::{ReservedKind, Tag};

/// Drops `<wicket:remove>` regions.
///
/// The open tag is handed on flagged as ignored, with its span stretched over
/// the whole region, so the parser skips the region's text as well.
#[derive(Debug, Default)]
pub struct RemoveHandler;

impl RemoveHandler {
    pub fn new() -> Self {
        Self
    }
}

impl MarkupFilter for RemoveHandler {
    fn name(&self) -> &'static str {
        "remove"
    }

    fn next_tag(
        &mut self,
        ctx: &mut ParseContext<'_>,
        upstream: &mut dyn TagSource,
    ) -> MarkupResult<Option<Tag>> {
        let mut open = match upstream.next_tag(ctx)? {
            Some(tag) => tag,
            None => return Ok(None),
        };
        if !open.is_reserved_kind(ReservedKind::Remove) {
            return Ok(Some(open));
        }
        if open.is_close() {
            return Err(ctx.error(
                open.pos(),
                Some(&open),
                "Close tag of a remove region without an open tag",
            ));
        }
        if open.is_open_close() {
            return Err(ctx.error(
                open.pos(),
                Some(&open),
                "A remove tag must not be an open-close tag",
            ));
        }

        let close = loop {
            let tag = match upstream.next_tag(ctx)? {
                Some(tag) => tag,
                None => {
                    return Err(ctx.error(
                        open.pos(),
                        Some(&open),
                        "Did not find the close tag of the remove region",
                    ))
                }
            };
            if tag.is_reserved_kind(ReservedKind::Remove) && tag.is_close() {
                break tag;
            }
            if tag.id().is_some() {
                return Err(ctx.error(
                    tag.pos(),
                    Some(&tag),
                    "Remove regions must not contain component or reserved tags",
                ));
            }
        };

        let end = close.pos() + close.length();
        open.set_length(end - open.pos())?;
        open.set_ignore(true)?;
        Ok(Some(open))
    }
}
