use super::{MarkupFilter, ParseContext, TagSource};
use crate::error::MarkupResult;
use crate::tag::{ReservedKind, Tag};

/// Attribute carrying the link target, per element
fn link_attribute(name: &str) -> Option<&'static str> {
    match name.to_ascii_lowercase().as_str() {
        "a" | "link" | "area" => Some("href"),
        "script" | "img" | "input" | "embed" => Some("src"),
        _ => None,
    }
}

/// A link the framework has to resolve against the markup's location
fn is_relative(target: &str) -> bool {
    let target = target.trim();
    !(target.is_empty()
        || target.starts_with('/')
        || target.starts_with('#')
        || target.starts_with('?')
        || target.contains("://")
        || target.contains("${")
        || target.starts_with("mailto:")
        || target.starts_with("javascript:")
        || target.starts_with("data:"))
}

/// Turns relative links inside `<wicket:link>` (or everywhere, with
/// automatic linking enabled) into auto components.
#[derive(Debug, Default)]
pub struct AutoLinkResolver {
    depth: usize,
    counter: usize,
}

impl AutoLinkResolver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MarkupFilter for AutoLinkResolver {
    fn name(&self) -> &'static str {
        "autolink"
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

        if tag.is_reserved_kind(ReservedKind::Link) {
            if tag.is_open() {
                self.depth += 1;
            } else if tag.is_close() {
                self.depth = self.depth.saturating_sub(1);
            }
            return Ok(Some(tag));
        }

        let active = self.depth > 0 || ctx.settings.automatic_linking;
        if !active || tag.is_close() || tag.id().is_some() || tag.namespace().is_some() {
            return Ok(Some(tag));
        }
        let relative = link_attribute(tag.name())
            .and_then(|attr| tag.attribute(attr))
            .map(is_relative)
            .unwrap_or(false);
        if relative {
            self.counter += 1;
            tag.set_id(format!("_autolink_{}", self.counter))?;
            tag.set_auto_component(true)?;
        }
        Ok(Some(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::is_relative;
    use crate::filter::test_support::{run, run_with};
    use crate::settings::MarkupSettings;

    #[test]
    fn test_links_inside_link_region() {
        let tags = run(
            "<a href=\"Other.html\">o</a><wicket:link><a href=\"Other.html\">o</a><img src=\"/abs.png\"/></wicket:link>",
            None,
        )
        .unwrap();
        assert_eq!(tags[0].id(), None);
        assert_eq!(tags[3].id(), Some("_autolink_1"));
        assert!(tags[3].is_auto_component());
        assert_eq!(tags[5].id(), None);
    }

    #[test]
    fn test_automatic_linking_setting() {
        let settings = MarkupSettings {
            automatic_linking: true,
            ..Default::default()
        };
        let tags = run_with("<link rel=\"stylesheet\" href=\"style.css\">", None, &settings).unwrap();
        assert_eq!(tags[0].id(), Some("_autolink_1"));
    }

    #[test]
    fn test_relative_targets() {
        assert!(is_relative("page.html"));
        assert!(is_relative("../img/logo.png"));
        assert!(!is_relative("http://example.com/"));
        assert!(!is_relative("#top"));
        assert!(!is_relative("mailto:me@example.com"));
    }
}
