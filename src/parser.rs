//! Markup parser: pulls tags through the filter chain and turns the source
//! into the flat element list of a [`Markup`].
//!
//! Only relevant tags (tags with a component id) become elements of their
//! own. Everything else, ordinary tags included, is kept as raw text.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{MarkupError, MarkupResult};
use crate::filter::{ContainerContext, FilterChain, MarkupFilter, ParseContext};
use crate::head;
use crate::markup::{debug_elements, Markup, MarkupElement, RawText};
use crate::resource::MarkupResourceStream;
use crate::settings::MarkupSettings;
use crate::tag::Tag;
use crate::tokenizer::{decode, is_supported_encoding, read_xml_declaration};

static COMMENT_RE: OnceLock<Regex> = OnceLock::new();
static CONDITIONAL_COMMENT_RE: OnceLock<Regex> = OnceLock::new();
static BLANKS_RE: OnceLock<Regex> = OnceLock::new();
static LINE_BREAKS_RE: OnceLock<Regex> = OnceLock::new();

fn comment_re() -> &'static Regex {
    COMMENT_RE.get_or_init(|| Regex::new(r"(?s)<!--(.*?)-->").unwrap())
}

fn conditional_comment_re() -> &'static Regex {
    CONDITIONAL_COMMENT_RE.get_or_init(|| Regex::new(r"(?s)^\[if .+\]>.*<!\[endif\]$").unwrap())
}

fn blanks_re() -> &'static Regex {
    BLANKS_RE.get_or_init(|| Regex::new(r"[ \t]+").unwrap())
}

fn line_breaks_re() -> &'static Regex {
    LINE_BREAKS_RE.get_or_init(|| Regex::new(r"( ?[\r\n] ?)+").unwrap())
}

/// Drop HTML comments, keeping `<!--[if IE]>...<![endif]-->` conditional
/// comments intact
pub fn strip_comments(text: &str) -> String {
    comment_re()
        .replace_all(text, |caps: &regex::Captures| {
            if conditional_comment_re().is_match(&caps[1]) {
                caps[0].to_string()
            } else {
                String::new()
            }
        })
        .into_owned()
}

/// Collapse runs of blanks to one space and runs of line breaks to one `\n`.
/// Text containing `<pre` is left alone.
pub fn compress_whitespace(text: &str) -> String {
    if text.contains("<pre") {
        return text.to_string();
    }
    let text = blanks_re().replace_all(text, " ");
    line_breaks_re().replace_all(&text, "\n").into_owned()
}

struct OpenEntry {
    tag: Tag,
    element: Option<usize>,
}

/// Accumulates raw text between relevant tags
struct TextBuffer {
    text: String,
    offset: Option<usize>,
}

impl TextBuffer {
    fn push(&mut self, offset: usize, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.offset.is_none() {
            self.offset = Some(offset);
        }
        self.text.push_str(text);
    }

    fn flush(&mut self, settings: &MarkupSettings, elements: &mut Vec<MarkupElement>) {
        let offset = match self.offset.take() {
            Some(offset) => offset,
            None => return,
        };
        let mut text = std::mem::take(&mut self.text);
        if settings.strip_comments {
            text = strip_comments(&text);
        }
        if settings.compress_whitespace {
            text = compress_whitespace(&text);
        }
        if !text.is_empty() {
            elements.push(MarkupElement::Text(RawText::new(offset, text)));
        }
    }
}

pub struct MarkupParser {
    resource: MarkupResourceStream,
    settings: MarkupSettings,
    container: Option<ContainerContext>,
    extra_filters: Vec<Box<dyn MarkupFilter>>,
}

impl MarkupParser {
    pub fn new(resource: MarkupResourceStream, settings: &MarkupSettings) -> Self {
        Self {
            resource,
            settings: settings.clone(),
            container: None,
            extra_filters: Vec::new(),
        }
    }

    /// Parse for a requesting component; enables the container stages
    pub fn with_container(mut self, container: ContainerContext) -> Self {
        self.container = Some(container);
        self
    }

    /// Add a stage on top of the standard chain
    pub fn add_filter(mut self, filter: Box<dyn MarkupFilter>) -> Self {
        self.extra_filters.push(filter);
        self
    }

    /// Read the resource and parse it
    pub fn parse(self) -> MarkupResult<Markup> {
        let bytes = self.resource.read()?;
        self.parse_bytes(&bytes)
    }

    pub fn parse_bytes(self, bytes: &[u8]) -> MarkupResult<Markup> {
        let declaration = read_xml_declaration(bytes);
        let encoding = declaration
            .as_ref()
            .and_then(|d| d.encoding.clone())
            .unwrap_or_else(|| self.settings.default_encoding.clone());
        if !is_supported_encoding(&encoding) {
            return Err(MarkupError::UnsupportedEncoding {
                location: self.resource.locator().to_string(),
                encoding,
            });
        }
        let skip = declaration.as_ref().map(|d| d.len).unwrap_or(0);
        let input = decode(&bytes[skip..], &encoding).map_err(|message| MarkupError::ResourceRead {
            location: self.resource.locator().to_string(),
            message,
        })?;
        self.run(&input, declaration.map(|d| d.text), encoding)
    }

    /// Parse already decoded markup
    pub fn parse_str(self, input: &str) -> MarkupResult<Markup> {
        let declaration = read_xml_declaration(input.as_bytes());
        let skip = declaration.as_ref().map(|d| d.len).unwrap_or(0);
        let encoding = declaration
            .as_ref()
            .and_then(|d| d.encoding.clone())
            .unwrap_or_else(|| "UTF-8".to_string());
        self.run(&input[skip..], declaration.map(|d| d.text), encoding)
    }

    fn run(self, input: &str, declaration: Option<String>, encoding: String) -> MarkupResult<Markup> {
        let location = self.resource.locator().to_string();
        if declaration.is_none() && self.settings.throw_on_missing_xml_declaration {
            return Err(MarkupError::ParseError {
                location,
                line: 1,
                column: 1,
                message: "The markup must start with an XML declaration".to_string(),
                tag: None,
                context: String::new(),
            });
        }

        let is_page = self.container.as_ref().map_or(false, |c| c.is_page);
        let mut chain = FilterChain::standard(input, self.container.as_ref());
        for filter in self.extra_filters {
            chain.append(filter);
        }
        let mut ctx = ParseContext::new(input, location.clone(), &self.settings, self.container.clone());

        let mut elements: Vec<MarkupElement> = Vec::new();
        let mut open_stack: Vec<OpenEntry> = Vec::new();
        let mut buffer = TextBuffer {
            text: String::new(),
            offset: None,
        };
        let mut text_start = 0usize;

        loop {
            let mut tag = match chain.next_tag(&mut ctx) {
                Ok(Some(tag)) => tag,
                Ok(None) => break,
                Err(err) => return Err(with_partial_context(err, &elements)),
            };

            let pos = tag.pos().max(text_start);
            buffer.push(text_start, &input[text_start..pos]);
            let end = (tag.pos() + tag.length()).max(pos);

            if tag.is_ignored() {
                text_start = end;
                continue;
            }

            if tag.is_close() {
                if let Some(found) = open_stack.iter().rposition(|o| tag.closes(&o.tag)) {
                    for unclosed in open_stack.drain(found + 1..) {
                        mark_no_close_tag(&mut elements, unclosed.element)?;
                    }
                    if let Some(OpenEntry { element: Some(index), .. }) = open_stack.pop() {
                        copy_identity(&mut tag, &elements[index])?;
                    }
                }
            }

            let relevant = tag.id().is_some();
            let awaits_close = (tag.is_open() && !tag.has_no_close_tag()).then(|| tag.clone());
            let mut element = None;
            if relevant {
                buffer.flush(&self.settings, &mut elements);
                element = Some(elements.len());
                elements.push(MarkupElement::Tag(tag));
            } else if tag.is_modified() {
                buffer.push(pos, &tag.to_markup());
            } else {
                buffer.push(pos, &input[pos..end]);
            }
            if let Some(tag) = awaits_close {
                open_stack.push(OpenEntry { tag, element });
            }
            text_start = end;
        }

        buffer.push(text_start, &input[text_start..]);
        buffer.flush(&self.settings, &mut elements);
        for unclosed in open_stack {
            mark_no_close_tag(&mut elements, unclosed.element)?;
        }

        if is_page
            && head::has_head_regions(&elements)
            && !head::has_literal_head(&elements)
            && !elements.iter().filter_map(MarkupElement::as_tag).any(Tag::is_extend)
        {
            head::wrap_head_regions(&mut elements)?;
        }

        let mut markup = Markup::new(self.resource);
        markup.set_encoding(Some(encoding));
        markup.set_xml_declaration(declaration);
        markup.set_doctype(chain.doctype().map(str::to_string));
        markup.set_wicket_namespace(ctx.wicket_namespace.clone());
        for element in elements {
            markup.add_element(element)?;
        }
        let markup = markup.assemble()?;
        tracing::debug!(
            location = %location,
            elements = markup.len(),
            namespace = markup.wicket_namespace(),
            "parsed markup"
        );
        Ok(markup)
    }
}

fn copy_identity(close: &mut Tag, open: &MarkupElement) -> MarkupResult<()> {
    if let MarkupElement::Tag(open) = open {
        if let Some(id) = open.id() {
            close.set_id(id)?;
        }
        close.set_auto_component(open.is_auto_component())?;
        close.set_reserved(open.reserved_kind())?;
    }
    Ok(())
}

fn mark_no_close_tag(elements: &mut [MarkupElement], index: Option<usize>) -> MarkupResult<()> {
    if let Some(MarkupElement::Tag(tag)) = index.and_then(|i| elements.get_mut(i)) {
        tag.set_has_no_close_tag(true)?;
    }
    Ok(())
}

fn with_partial_context(err: MarkupError, elements: &[MarkupElement]) -> MarkupError {
    match err {
        MarkupError::ParseError {
            location,
            line,
            column,
            message,
            tag,
            context,
        } => MarkupError::ParseError {
            location,
            line,
            column,
            message,
            tag,
            context: format!("{}\nParsed so far:\n{}", context, debug_elements(elements, None)),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> MarkupResult<Markup> {
        MarkupParser::new(MarkupResourceStream::detached("test.html"), &MarkupSettings::default())
            .parse_str(input)
    }

    fn parse_page(input: &str) -> MarkupResult<Markup> {
        MarkupParser::new(MarkupResourceStream::detached("test.html"), &MarkupSettings::default())
            .with_container(ContainerContext::new("app.HomePage", true))
            .parse_str(input)
    }

    #[test]
    fn test_plain_markup_is_one_text_element() {
        let markup = parse("<html><body><p class='x'>Hello</p></body></html>").unwrap();
        assert_eq!(markup.len(), 1);
        assert_eq!(
            markup.to_markup_string(false),
            "<html><body><p class='x'>Hello</p></body></html>"
        );
    }

    #[test]
    fn test_component_tags_become_elements() {
        let input = "<div><span wicket:id=\"label\">x</span><br/></div>";
        let markup = parse(input).unwrap();
        assert_eq!(markup.len(), 5);
        let open = markup.tag(1).unwrap();
        assert_eq!(open.id(), Some("label"));
        let close = markup.tag(3).unwrap();
        assert_eq!(close.id(), Some("label"));
        assert_eq!(close.open_index(), Some(1));
        assert_eq!(markup.to_markup_string(false), input);
    }

    #[test]
    fn test_remove_region_is_dropped() {
        let markup = parse("<p>a<wicket:remove><i>b</i></wicket:remove>c</p>").unwrap();
        assert_eq!(markup.to_markup_string(false), "<p>ac</p>");
    }

    #[test]
    fn test_unclosed_optional_component_tag() {
        let markup = parse("<ul><li wicket:id=\"row\">a</ul>").unwrap();
        let li = markup.tag(1).unwrap();
        assert!(li.has_no_close_tag());
        assert!(markup.find_fragment("row").is_some());
    }

    #[test]
    fn test_parse_error_carries_partial_elements() {
        let result = parse("<div><span wicket:id=\"a\">x</span>\n</p></div>");
        match result {
            Err(MarkupError::ParseError { line, context, .. }) => {
                assert_eq!(line, 2);
                assert!(context.contains("Parsed so far"));
                assert!(context.contains("[id=a]"));
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_strip_comments_keeps_conditional() {
        let text = "a<!-- note -->b<!--[if IE]><p>ie</p><![endif]-->c";
        assert_eq!(strip_comments(text), "ab<!--[if IE]><p>ie</p><![endif]-->c");
    }

    #[test]
    fn test_compress_whitespace() {
        assert_eq!(compress_whitespace("a  \t b\n\n  \n c"), "a b\nc");
        assert_eq!(compress_whitespace("<pre>  x  </pre>"), "<pre>  x  </pre>");
    }

    #[test]
    fn test_settings_apply_to_text() {
        let settings = MarkupSettings {
            strip_comments: true,
            compress_whitespace: true,
            ..Default::default()
        };
        let markup = MarkupParser::new(MarkupResourceStream::detached("t"), &settings)
            .parse_str("<p>a   <!-- x --> b</p>")
            .unwrap();
        assert_eq!(markup.to_markup_string(false), "<p>a b</p>");
    }

    #[test]
    fn test_xml_declaration_and_encoding() {
        let bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n<p>caf\xe9</p>";
        let markup = MarkupParser::new(MarkupResourceStream::detached("t"), &MarkupSettings::default())
            .parse_bytes(bytes)
            .unwrap();
        assert_eq!(markup.encoding(), Some("ISO-8859-1"));
        assert!(markup.xml_declaration().unwrap().starts_with("<?xml"));
        assert_eq!(markup.to_markup_string(false), "\n<p>caf\u{e9}</p>");
    }

    #[test]
    fn test_unsupported_encoding() {
        let bytes = b"<?xml version=\"1.0\" encoding=\"EBCDIC\"?><p/>";
        let result = MarkupParser::new(MarkupResourceStream::detached("t"), &MarkupSettings::default())
            .parse_bytes(bytes);
        assert!(matches!(result, Err(MarkupError::UnsupportedEncoding { .. })));
    }

    #[test]
    fn test_missing_declaration_when_required() {
        let settings = MarkupSettings {
            throw_on_missing_xml_declaration: true,
            ..Default::default()
        };
        let result = MarkupParser::new(MarkupResourceStream::detached("t"), &settings).parse_str("<p/>");
        assert!(result.is_err());
    }

    #[test]
    fn test_page_head_regions_get_wrapped() {
        let markup = parse_page("<html><wicket:head><title>t</title></wicket:head><body>x</body></html>")
            .unwrap();
        assert_eq!(
            markup.to_markup_string(true),
            "<html><head><title id=\"HomePage_1\">t</title></head><body>x</body></html>"
        );
    }

    #[test]
    fn test_page_without_head_gets_one() {
        let markup = parse_page("<html><body>x</body></html>").unwrap();
        assert_eq!(markup.to_markup_string(false), "<html><head></head><body>x</body></html>");
        assert!(markup.find_fragment("_header_").is_some());
    }

    struct EmphasisFilter;

    impl MarkupFilter for EmphasisFilter {
        fn name(&self) -> &'static str {
            "emphasis"
        }

        fn next_tag(
            &mut self,
            ctx: &mut ParseContext<'_>,
            upstream: &mut dyn crate::filter::TagSource,
        ) -> MarkupResult<Option<Tag>> {
            let mut tag = match upstream.next_tag(ctx)? {
                Some(tag) => tag,
                None => return Ok(None),
            };
            if tag.name() == "em" && tag.is_open() {
                tag.set_id("em")?;
            }
            Ok(Some(tag))
        }
    }

    #[test]
    fn test_extra_filter_runs_last() {
        let markup = MarkupParser::new(MarkupResourceStream::detached("test.html"), &MarkupSettings::default())
            .add_filter(Box::new(EmphasisFilter))
            .parse_str("<p><em>x</em></p>")
            .unwrap();
        let em = markup.find_fragment("em").expect("em fragment");
        assert_eq!(em.flatten(), vec![1, 2, 3]);
        assert_eq!(markup.tag(3).unwrap().id(), Some("em"));
    }
}
