//! Pull-based filter chain between the tokenizer and the parser.
//!
//! Every stage asks the stage below it for the next tag and may rewrite it,
//! drop it or hand out synthetic tags first. Stage 0 sits right on top of the
//! tokenizer; the parser pulls from the last stage.

mod autolink;
mod body_onload;
mod head_force_id;
mod header_section;
mod html_handler;
mod message;
mod namespace;
mod remove;
mod tag_identifier;
mod tag_type;

pub use autolink::AutoLinkResolver;
pub use body_onload::{BodyOnLoadHandler, BODY_ID};
pub use head_force_id::HeadForceTagIdHandler;
pub use header_section::{header_pair, HeaderSectionHandler, HEADER_ID};
pub use html_handler::HtmlHandler;
pub use message::MessageAttributeHandler;
pub use namespace::{NamespaceHandler, WICKET_NAMESPACE_URI};
pub use remove::RemoveHandler;
pub use tag_identifier::TagIdentifier;
pub use tag_type::{is_void_element, TagTypeHandler, VOID_ELEMENTS};

use crate::error::{MarkupError, MarkupResult};
use crate::settings::MarkupSettings;
use crate::tag::Tag;
use crate::tokenizer::{line_col, Tokenizer};

/// Component the markup is parsed for. Without it the container dependent
/// stages (message attributes, body and head bookkeeping) are left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerContext {
    pub class: String,
    pub is_page: bool,
}

impl ContainerContext {
    pub fn new(class: impl Into<String>, is_page: bool) -> Self {
        Self {
            class: class.into(),
            is_page,
        }
    }

    /// Class name without package or module path
    pub fn simple_name(&self) -> &str {
        simple_class_name(&self.class)
    }
}

pub(crate) fn simple_class_name(class: &str) -> &str {
    let after_module = class.rsplit("::").next().unwrap_or(class);
    after_module.rsplit('.').next().unwrap_or(after_module)
}

/// State shared by all stages during one parse
pub struct ParseContext<'a> {
    pub input: &'a str,
    pub location: String,
    pub settings: &'a MarkupSettings,
    /// Prefix of the reserved namespace; an `xmlns:` declaration may change
    /// it mid-stream
    pub wicket_namespace: String,
    pub container: Option<ContainerContext>,
    /// A literal `<head>` was seen (or inserted)
    pub head_found: bool,
}

impl<'a> ParseContext<'a> {
    pub fn new(
        input: &'a str,
        location: impl Into<String>,
        settings: &'a MarkupSettings,
        container: Option<ContainerContext>,
    ) -> Self {
        Self {
            input,
            location: location.into(),
            settings,
            wicket_namespace: settings.wicket_namespace.clone(),
            container,
            head_found: false,
        }
    }

    /// `wicket:<local>` with the current namespace prefix
    pub fn reserved_attribute(&self, local: &str) -> String {
        format!("{}:{}", self.wicket_namespace, local)
    }

    pub fn is_reserved_namespace(&self, tag: &Tag) -> bool {
        tag.namespace() == Some(self.wicket_namespace.as_str())
    }

    /// Positioned parse error with the offending source line
    pub fn error(&self, pos: usize, tag: Option<&Tag>, message: impl Into<String>) -> MarkupError {
        let (line, column) = line_col(self.input, pos);
        let source_line = self.input.lines().nth(line - 1).unwrap_or("");
        let caret = format!("{}^", " ".repeat(column.saturating_sub(1)));
        MarkupError::ParseError {
            location: self.location.clone(),
            line,
            column,
            message: message.into(),
            tag: tag.map(|t| t.to_string()),
            context: format!("{}\n{}", source_line, caret),
        }
    }
}

/// Producer of tags for a stage: the rest of the chain below it
pub trait TagSource {
    fn next_tag(&mut self, ctx: &mut ParseContext<'_>) -> MarkupResult<Option<Tag>>;
}

pub trait MarkupFilter: Send {
    fn name(&self) -> &'static str;

    fn next_tag(
        &mut self,
        ctx: &mut ParseContext<'_>,
        upstream: &mut dyn TagSource,
    ) -> MarkupResult<Option<Tag>>;
}

struct Upstream<'c, 'a> {
    filters: &'c mut [Box<dyn MarkupFilter>],
    tokenizer: &'c mut Tokenizer<'a>,
}

impl TagSource for Upstream<'_, '_> {
    fn next_tag(&mut self, ctx: &mut ParseContext<'_>) -> MarkupResult<Option<Tag>> {
        match self.filters.split_last_mut() {
            Some((last, rest)) => {
                let mut below = Upstream {
                    filters: rest,
                    tokenizer: &mut *self.tokenizer,
                };
                last.next_tag(ctx, &mut below)
            }
            None => self
                .tokenizer
                .next_tag()
                .map_err(|e| ctx.error(e.pos, None, e.message)),
        }
    }
}

/// Tokenizer plus stages, in pull order
pub struct FilterChain<'a> {
    tokenizer: Tokenizer<'a>,
    filters: Vec<Box<dyn MarkupFilter>>,
}

impl<'a> FilterChain<'a> {
    /// Chain without any stage: the bare tokenizer
    pub fn new(input: &'a str) -> Self {
        Self {
            tokenizer: Tokenizer::new(input),
            filters: Vec::new(),
        }
    }

    /// The standard stages in their fixed order
    pub fn standard(input: &'a str, container: Option<&ContainerContext>) -> Self {
        let mut chain = Self::new(input);
        chain.append(Box::new(TagIdentifier::new()));
        chain.append(Box::new(TagTypeHandler::new()));
        chain.append(Box::new(HtmlHandler::new()));
        chain.append(Box::new(RemoveHandler::new()));
        chain.append(Box::new(AutoLinkResolver::new()));
        chain.append(Box::new(NamespaceHandler::new()));
        if let Some(container) = container {
            chain.append(Box::new(MessageAttributeHandler::new()));
            chain.append(Box::new(BodyOnLoadHandler::new()));
            if container.is_page {
                chain.append(Box::new(HeaderSectionHandler::new()));
            }
        }
        chain.append(Box::new(HeadForceTagIdHandler::new()));
        chain
    }

    /// Add a stage on top of the chain
    pub fn append(&mut self, filter: Box<dyn MarkupFilter>) {
        self.filters.push(filter);
    }

    /// Stage names, tokenizer side first
    pub fn filter_names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn doctype(&self) -> Option<&str> {
        self.tokenizer.doctype()
    }

    pub fn next_tag(&mut self, ctx: &mut ParseContext<'_>) -> MarkupResult<Option<Tag>> {
        let mut top = Upstream {
            filters: &mut self.filters[..],
            tokenizer: &mut self.tokenizer,
        };
        top.next_tag(ctx)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Run `input` through the standard chain and collect every tag
    pub fn run(input: &str, container: Option<ContainerContext>) -> MarkupResult<Vec<Tag>> {
        let settings = MarkupSettings::default();
        run_with(input, container, &settings)
    }

    pub fn run_with(
        input: &str,
        container: Option<ContainerContext>,
        settings: &MarkupSettings,
    ) -> MarkupResult<Vec<Tag>> {
        let mut chain = FilterChain::standard(input, container.as_ref());
        let mut ctx = ParseContext::new(input, "test.html", settings, container);
        let mut tags = Vec::new();
        while let Some(tag) = chain.next_tag(&mut ctx)? {
            tags.push(tag);
        }
        Ok(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_order() {
        let chain = FilterChain::standard("", Some(&ContainerContext::new("app.Home", true)));
        assert_eq!(
            chain.filter_names(),
            vec![
                "tag_identifier",
                "tag_type",
                "html_handler",
                "remove",
                "autolink",
                "namespace",
                "message",
                "body_onload",
                "header_section",
                "head_force_id",
            ]
        );
    }

    #[test]
    fn test_container_stages_are_optional() {
        let chain = FilterChain::standard("", None);
        assert!(!chain.filter_names().contains(&"message"));
        let panel = FilterChain::standard("", Some(&ContainerContext::new("app.Panel", false)));
        assert!(panel.filter_names().contains(&"body_onload"));
        assert!(!panel.filter_names().contains(&"header_section"));
    }

    #[test]
    fn test_tokenizer_error_is_positioned() {
        let settings = MarkupSettings::default();
        let input = "<p>\n  <b class=x";
        let mut chain = FilterChain::new(input);
        let mut ctx = ParseContext::new(input, "t.html", &settings, None);
        chain.next_tag(&mut ctx).unwrap();
        match chain.next_tag(&mut ctx) {
            Err(MarkupError::ParseError { line, column, .. }) => {
                assert_eq!((line, column), (2, 3));
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_simple_class_name() {
        assert_eq!(simple_class_name("com.app.HomePage"), "HomePage");
        assert_eq!(simple_class_name("app::pages::Home"), "Home");
        assert_eq!(simple_class_name("Home"), "Home");
    }
}
