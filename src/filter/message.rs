use super::{MarkupFilter, ParseContext, TagSource};
use crate::error::MarkupResult;
use crate::tag::Tag;

/// Tags with a `wicket:message="attr:key"` attribute need their attribute
/// localized at render time, so they become auto components.
#[derive(Debug, Default)]
pub struct MessageAttributeHandler {
    counter: usize,
}

impl MessageAttributeHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MarkupFilter for MessageAttributeHandler {
    fn name(&self) -> &'static str {
        "message"
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
        if tag.is_close() || tag.id().is_some() {
            return Ok(Some(tag));
        }
        let attr = ctx.reserved_attribute("message");
        if let Some(value) = tag.attribute(&attr) {
            if !value.contains(':') {
                return Err(ctx.error(
                    tag.pos(),
                    Some(&tag),
                    format!("'{}' must look like 'attribute:key', found '{}'", attr, value),
                ));
            }
            self.counter += 1;
            tag.set_id(format!("_message_attr_{}", self.counter))?;
            tag.set_auto_component(true)?;
        }
        Ok(Some(tag))
    }
}

#[cfg(test)]
mod tests {
    use crate::filter::test_support::run;
    use crate::filter::ContainerContext;

    #[test]
    fn test_message_attribute_makes_auto_component() {
        let container = Some(ContainerContext::new("app.Panel", false));
        let tags = run("<input type=\"submit\" wicket:message=\"value:save\">", container).unwrap();
        assert_eq!(tags[0].id(), Some("_message_attr_1"));
        assert!(tags[0].is_auto_component());
    }

    #[test]
    fn test_needs_container_context() {
        let tags = run("<img wicket:message=\"alt:logo\">", None).unwrap();
        assert_eq!(tags[0].id(), None);
    }

    #[test]
    fn test_malformed_message_attribute() {
        let container = Some(ContainerContext::new("app.Panel", false));
        assert!(run("<img wicket:message=\"logo\">", container).is_err());
    }
}
