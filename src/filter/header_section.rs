use std::collections::VecDeque;

use super::{MarkupFilter, ParseContext, TagSource};
use crate::error::MarkupResult;
use crate::tag::{Tag, TagType};

pub const HEADER_ID: &str = "_header_";

/// Literal `<head>`/`</head>` pair marked as the page header
pub fn header_pair(anchor: &Tag) -> MarkupResult<(Tag, Tag)> {
    let mut open = Tag::synthetic("head", TagType::Open, anchor);
    open.set_id(HEADER_ID)?;
    open.set_auto_component(true)?;
    let mut close = open.synthetic_close();
    close.set_id(HEADER_ID)?;
    close.set_auto_component(true)?;
    Ok((open, close))
}

/// Page-only bookkeeping for the header section.
///
/// The literal `<head>` becomes an auto component. A page that reaches
/// `<body>` without any `<head>` or `<wicket:head>` gets an empty header
/// inserted in front of the body.
#[derive(Debug, Default)]
pub struct HeaderSectionHandler {
    queue: VecDeque<Tag>,
    head_region_seen: bool,
    done: bool,
}

impl HeaderSectionHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MarkupFilter for HeaderSectionHandler {
    fn name(&self) -> &'static str {
        "header_section"
    }

    fn next_tag(
        &mut self,
        ctx: &mut ParseContext<'_>,
        upstream: &mut dyn TagSource,
    ) -> MarkupResult<Option<Tag>> {
        if let Some(tag) = self.queue.pop_front() {
            return Ok(Some(tag));
        }
        let mut tag = match upstream.next_tag(ctx)? {
            Some(tag) => tag,
            None => return Ok(None),
        };
        if self.done {
            return Ok(Some(tag));
        }

        if tag.is_head_region() {
            self.head_region_seen = true;
        } else if tag.is_plain_head() && tag.is_open() {
            if tag.id().is_none() {
                tag.set_id(HEADER_ID)?;
                tag.set_auto_component(true)?;
            }
            ctx.head_found = true;
            self.done = true;
        } else if tag.is_plain_body() && tag.is_open() {
            self.done = true;
            if !ctx.head_found && !self.head_region_seen {
                tracing::debug!(location = %ctx.location, "inserting empty <head> before <body>");
                let (open, close) = header_pair(&tag)?;
                ctx.head_found = true;
                self.queue.push_back(close);
                self.queue.push_back(tag);
                return Ok(Some(open));
            }
        }
        Ok(Some(tag))
    }
}
