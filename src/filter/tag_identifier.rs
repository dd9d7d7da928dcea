use std::collections::HashMap;

use super::{MarkupFilter, ParseContext, TagSource};
use crate::error::MarkupResult;
use crate::tag::{ReservedKind, Tag};

/// Classifies tags of the reserved namespace and assigns component ids.
///
/// A `wicket:id` attribute names a user component. Reserved tags without one
/// get an auto id (`_extend`, `_head_2`, ...) that stays out of fragment
/// paths.
#[derive(Debug, Default)]
pub struct TagIdentifier {
    counters: HashMap<ReservedKind, usize>,
}

impl TagIdentifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn auto_id(&mut self, kind: ReservedKind) -> String {
        if !kind.is_repeatable() {
            return format!("_{}", kind.name());
        }
        let n = self.counters.entry(kind).or_insert(0);
        *n += 1;
        if *n == 1 {
            format!("_{}", kind.name())
        } else {
            format!("_{}_{}", kind.name(), n)
        }
    }
}

impl MarkupFilter for TagIdentifier {
    fn name(&self) -> &'static str {
        "tag_identifier"
    }

    fn next_tag(
        &mut self,
        ctx: &mut ParseContext<'_>,
        upstream: &mut dyn TagSource,
    ) -> MarkupResult<Option<Tag>> {
        let mut tag = match upstream.next_tag(ctx)? {
            Some(tag) => tag,
            None => return Ok(None),
        };

        let id_attr = ctx.reserved_attribute("id");
        let user_id = tag.attribute(&id_attr).map(str::to_string);
        if let Some(id) = &user_id {
            if id.trim().is_empty() {
                return Err(ctx.error(
                    tag.pos(),
                    Some(&tag),
                    format!("The '{}' attribute must not be empty", id_attr),
                ));
            }
        }

        if ctx.is_reserved_namespace(&tag) {
            let kind = ReservedKind::from_name(tag.name()).ok_or_else(|| {
                ctx.error(
                    tag.pos(),
                    Some(&tag),
                    format!(
                        "Unknown tag name with namespace '{}': '{}'",
                        ctx.wicket_namespace,
                        tag.name()
                    ),
                )
            })?;
            tag.set_reserved(Some(kind))?;
            // close tags take their id from the open tag
            if tag.is_close() {
                return Ok(Some(tag));
            }
            match user_id {
                Some(id) => tag.set_id(id)?,
                None => {
                    let id = self.auto_id(kind);
                    tag.set_id(id)?;
                    tag.set_auto_component(true)?;
                }
            }
        } else if let Some(id) = user_id {
            tag.set_id(id)?;
        }
        Ok(Some(tag))
    }
}
