use super::{MarkupFilter, ParseContext, TagSource};
use crate::error::MarkupResult;
use crate::tag::Tag;

/// Namespace URI that marks an `xmlns:` prefix as the reserved namespace
pub const WICKET_NAMESPACE_URI: &str = "http://wicket.apache.org";

/// Picks up `xmlns:x="http://wicket.apache.org..."` declarations, switches the
/// reserved prefix to `x` for the rest of the stream and strips the
/// declaration from the tag.
#[derive(Debug, Default)]
pub struct NamespaceHandler;

impl NamespaceHandler {
    pub fn new() -> Self {
        Self
    }
}

impl MarkupFilter for NamespaceHandler {
    fn name(&self) -> &'static str {
        "namespace"
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
        if tag.is_close() {
            return Ok(Some(tag));
        }

        let declaration = tag
            .attributes()
            .iter()
            .find(|(key, value)| key.starts_with("xmlns:") && value.starts_with(WICKET_NAMESPACE_URI))
            .map(|(key, _)| key.to_string());
        if let Some(key) = declaration {
            let prefix = key["xmlns:".len()..].to_string();
            if prefix != ctx.wicket_namespace {
                tracing::debug!(location = %ctx.location, prefix = %prefix, "reserved namespace prefix changed");
            }
            ctx.wicket_namespace = prefix;
            tag.remove_attribute(&key)?;
        }
        Ok(Some(tag))
    }
}

#[cfg(test)]
mod tests {
    use crate::filter::test_support::run;

    #[test]
    fn test_declaration_switches_prefix() {
        let tags = run(
            "<html xmlns:wcn=\"http://wicket.apache.org/dtds.data/wicket-xhtml1.4-strict.dtd\"><wcn:panel>x</wcn:panel></html>",
            None,
        )
        .unwrap();
        assert_eq!(tags[0].to_markup(), "<html>");
        assert!(tags[1].is_major());
        assert_eq!(tags[1].id(), Some("_panel"));
    }

    #[test]
    fn test_other_namespaces_are_kept() {
        let tags = run("<html xmlns:x=\"urn:other\"><x:b/></html>", None).unwrap();
        assert_eq!(tags[0].attribute("xmlns:x"), Some("urn:other"));
        assert!(!tags[1].is_reserved());
    }
}
