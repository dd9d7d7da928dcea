//! `<wicket:head>` regions: collecting them from a derived markup and giving
//! pages a literal `<head>` around them.

use crate::error::MarkupResult;
use crate::filter::header_pair;
use crate::markup::MarkupElement;
use crate::tag::Tag;

fn tag_at(elements: &[MarkupElement], index: usize) -> Option<&Tag> {
    elements.get(index).and_then(MarkupElement::as_tag)
}

pub fn has_literal_head(elements: &[MarkupElement]) -> bool {
    elements
        .iter()
        .filter_map(MarkupElement::as_tag)
        .any(|tag| tag.is_plain_head() && tag.is_open())
}

pub fn has_head_regions(elements: &[MarkupElement]) -> bool {
    elements
        .iter()
        .filter_map(MarkupElement::as_tag)
        .any(Tag::is_head_region)
}

/// Every head region (open tag through close tag) in `elements[..until]`,
/// in source order, as editable copies
pub fn copy_head_regions(elements: &[MarkupElement], until: usize) -> Vec<MarkupElement> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    for element in elements.iter().take(until) {
        match element {
            MarkupElement::Tag(tag) if tag.is_head_region() => {
                out.push(MarkupElement::Tag(tag.mutable()));
                if tag.is_open() {
                    depth += 1;
                } else if tag.is_close() {
                    depth = depth.saturating_sub(1);
                }
            }
            MarkupElement::Tag(tag) if depth > 0 => out.push(MarkupElement::Tag(tag.mutable())),
            MarkupElement::Text(text) if depth > 0 => out.push(MarkupElement::Text(text.clone())),
            _ => {}
        }
    }
    out
}

/// Insert a `<head>`/`</head>` pair from the first head region open tag to
/// the last head region close tag. No-op without head regions.
pub fn wrap_head_regions(elements: &mut Vec<MarkupElement>) -> MarkupResult<()> {
    let first = elements
        .iter()
        .position(|e| e.as_tag().map_or(false, |t| t.is_head_region() && !t.is_close()));
    let last = elements
        .iter()
        .rposition(|e| e.as_tag().map_or(false, |t| t.is_head_region() && !t.is_open()));
    let (first, last) = match (first, last) {
        (Some(first), Some(last)) if first <= last => (first, last),
        _ => return Ok(()),
    };

    let (open, _) = match tag_at(elements, first) {
        Some(tag) => header_pair(tag)?,
        None => return Ok(()),
    };
    let (_, close) = match tag_at(elements, last) {
        Some(tag) => header_pair(tag)?,
        None => return Ok(()),
    };
    tracing::debug!(first, last, "wrapping head regions in a <head> element");
    elements.insert(last + 1, MarkupElement::Tag(close));
    elements.insert(first, MarkupElement::Tag(open));
    Ok(())
}
