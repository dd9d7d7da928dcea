use super::{MarkupFilter, ParseContext, TagSource};
use crate::error::MarkupResult;
use crate::tag::Tag;

/// Elements whose close tag HTML allows to be left out
const OPTIONAL_CLOSE: &[&str] = &[
    "p", "li", "td", "tr", "th", "option", "dt", "dd", "thead", "tbody", "tfoot", "colgroup",
];

fn close_is_optional(tag: &Tag) -> bool {
    tag.namespace().is_none() && OPTIONAL_CLOSE.iter().any(|n| n.eq_ignore_ascii_case(tag.name()))
}

fn same_element(a: &Tag, b: &Tag) -> bool {
    a.namespace() == b.namespace() && a.name().eq_ignore_ascii_case(b.name())
}

/// Balance check: every close tag needs an open tag, and every open tag
/// needs a close tag unless HTML makes it optional.
///
/// A void element may still be written with an explicit close right after
/// it (`<img></img>`); the pair is then treated like any other element.
#[derive(Debug, Default)]
pub struct HtmlHandler {
    stack: Vec<Tag>,
    /// Tag read ahead after a void open, `Some(None)` at end of stream
    pending: Option<Option<Tag>>,
}

impl HtmlHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MarkupFilter for HtmlHandler {
    fn name(&self) -> &'static str {
        "html_handler"
    }

    fn next_tag(
        &mut self,
        ctx: &mut ParseContext<'_>,
        upstream: &mut dyn TagSource,
    ) -> MarkupResult<Option<Tag>> {
        let next = match self.pending.take() {
            Some(next) => next,
            None => upstream.next_tag(ctx)?,
        };
        let mut tag = match next {
            Some(tag) => tag,
            None => {
                while let Some(open) = self.stack.pop() {
                    if !close_is_optional(&open) {
                        return Err(ctx.error(
                            open.pos(),
                            Some(&open),
                            format!("Tag '{}' does not have a close tag", open.qualified_name()),
                        ));
                    }
                }
                return Ok(None);
            }
        };

        if tag.is_open() && tag.has_no_close_tag() {
            let following = upstream.next_tag(ctx)?;
            let closes_void = following
                .as_ref()
                .map_or(false, |close| close.is_close() && same_element(&tag, close));
            if closes_void {
                tag.set_has_no_close_tag(false)?;
                self.stack.push(tag.clone());
            }
            self.pending = Some(following);
        } else if tag.is_open() {
            self.stack.push(tag.clone());
        } else if tag.is_close() {
            loop {
                let open = match self.stack.pop() {
                    Some(open) => open,
                    None => {
                        return Err(ctx.error(
                            tag.pos(),
                            Some(&tag),
                            format!(
                                "Tag '</{}>' does not have a matching open tag",
                                tag.qualified_name()
                            ),
                        ))
                    }
                };
                if same_element(&open, &tag) {
                    break;
                }
                if !close_is_optional(&open) {
                    return Err(ctx.error(
                        tag.pos(),
                        Some(&tag),
                        format!(
                            "Tag '</{}>' does not match open tag '{}' at line {}, column {}",
                            tag.qualified_name(),
                            open.qualified_name(),
                            open.line(),
                            open.column()
                        ),
                    ));
                }
            }
        }
        Ok(Some(tag))
    }
}

#[cfg(test)]
mod tests {
    use crate::error::MarkupError;
    use crate::filter::test_support::run;

    #[test]
    fn test_balanced_markup_passes() {
        let result = run("<ul><li>a<li>b</ul><table><tr><td>x</table>", None);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
    }

    #[test]
    fn test_stray_close_tag() {
        let result = run("<div>x</div></span>", None);
        match result {
            Err(MarkupError::ParseError { message, line, column, .. }) => {
                assert!(message.contains("</span>"));
                assert_eq!((line, column), (1, 13));
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_mismatched_close() {
        let result = run("<div><span>x</div>", None);
        assert!(result.is_err());
    }

    #[test]
    fn test_void_element_with_explicit_close() {
        let result = run("<p><img src=\"a.png\"></img></p>", None);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let tags = result.unwrap();
        assert_eq!(tags.len(), 4);
        assert!(tags[1].is_open() && !tags[1].has_no_close_tag());
        assert!(tags[2].is_close());
        assert_eq!(tags[2].name(), "img");
    }

    #[test]
    fn test_void_close_after_other_tag_is_stray() {
        let result = run("<p><br><b>x</b></br></p>", None);
        assert!(result.is_err());
    }

    #[test]
    fn test_void_element_at_end_of_stream() {
        let result = run("<br>", None);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let tags = result.unwrap();
        assert_eq!(tags.len(), 1);
        assert!(tags[0].has_no_close_tag());
    }

    #[test]
    fn test_unclosed_at_end() {
        let result = run("<div><p>text", None);
        match result {
            Err(MarkupError::ParseError { message, .. }) => assert!(message.contains("div")),
            other => panic!("expected parse error, got {:?}", other),
        }
    }
}
