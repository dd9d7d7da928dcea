use super::{MarkupFilter, ParseContext, TagSource};
use crate::error::MarkupResult;
use crate::tag::Tag;

/// Gives every element inside `<wicket:head>` an `id` attribute, so header
/// contributions of several markup files can be told apart and deduplicated.
#[derive(Debug, Default)]
pub struct HeadForceTagIdHandler {
    depth: usize,
    counter: usize,
}

impl HeadForceTagIdHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MarkupFilter for HeadForceTagIdHandler {
    fn name(&self) -> &'static str {
        "head_force_id"
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

        if tag.is_head_region() {
            if tag.is_open() {
                self.depth += 1;
            } else if tag.is_close() {
                self.depth = self.depth.saturating_sub(1);
            }
            return Ok(Some(tag));
        }

        if self.depth > 0 && !tag.is_close() && !tag.is_reserved() && tag.attribute("id").is_none() {
            let prefix = ctx
                .container
                .as_ref()
                .map(|c| c.simple_name().to_string())
                .unwrap_or_else(|| "head".to_string());
            self.counter += 1;
            tag.put("id", format!("{}_{}", prefix, self.counter))?;
        }
        Ok(Some(tag))
    }
}

#[cfg(test)]
mod tests {
    use crate::filter::test_support::run;
    use crate::filter::ContainerContext;

    #[test]
    fn test_head_children_get_ids() {
        let container = Some(ContainerContext::new("com.app.BasePage", true));
        let tags = run(
            "<wicket:head><script src=\"a.js\"></script><style id=\"own\">p{}</style></wicket:head><p>x</p>",
            container,
        )
        .unwrap();
        assert_eq!(tags[1].attribute("id"), Some("BasePage_1"));
        assert_eq!(tags[1].to_markup(), "<script src=\"a.js\" id=\"BasePage_1\">");
        assert_eq!(tags[3].attribute("id"), Some("own"));
        assert!(tags[6].attribute("id").is_none());
    }
}
