use super::{MarkupFilter, ParseContext, TagSource};
use crate::error::MarkupResult;
use crate::tag::Tag;

pub const BODY_ID: &str = "_body";

/// Makes the literal `<body>` addressable, so the merger and components can
/// contribute to its `onload` attribute.
#[derive(Debug, Default)]
pub struct BodyOnLoadHandler;

impl BodyOnLoadHandler {
    pub fn new() -> Self {
        Self
    }
}

impl MarkupFilter for BodyOnLoadHandler {
    fn name(&self) -> &'static str {
        "body_onload"
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
        if tag.is_plain_body() && tag.is_open() && tag.id().is_none() {
            tag.set_id(BODY_ID)?;
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
    fn test_body_gets_auto_id() {
        let container = Some(ContainerContext::new("app.Panel", false));
        let tags = run("<body onload=\"init()\"><p>x</p></body>", container).unwrap();
        assert_eq!(tags[0].id(), Some("_body"));
        assert!(tags[0].is_auto_component());
    }

    #[test]
    fn test_explicit_body_id_wins() {
        let container = Some(ContainerContext::new("app.Panel", false));
        let tags = run("<body wicket:id=\"page\"></body>", container).unwrap();
        assert_eq!(tags[0].id(), Some("page"));
    }
}
