//! Tolerant pull tokenizer for HTML-like markup.
//!
//! Produces open, close and open-close tags with ordered attributes and byte
//! positions. Everything between tags (text, comments, CDATA, DOCTYPE,
//! processing instructions) is skipped here; the parser recovers it from the
//! positions as raw text.

use memchr::{memchr, memchr_iter, memmem};

use crate::tag::{Tag, TagType};

const COMMENT_START: &str = "<!--";
const COMMENT_END: &str = "-->";
const CDATA_START: &str = "<![CDATA[";
const CDATA_END: &str = "]]>";

/// Low level syntax problem; the parser turns it into a positioned error
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub pos: usize,
    pub message: String,
}

impl SyntaxError {
    fn new(pos: usize, message: impl Into<String>) -> Self {
        Self {
            pos,
            message: message.into(),
        }
    }
}

/// `<?xml ...?>` found at the very start of a markup file
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDeclaration {
    pub text: String,
    pub encoding: Option<String>,
    /// Bytes consumed, including a leading byte order mark
    pub len: usize,
}

/// Read the XML declaration from undecoded bytes. The declaration is ASCII by
/// definition, so this runs before the encoding is known.
pub fn read_xml_declaration(bytes: &[u8]) -> Option<XmlDeclaration> {
    let bom = if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) { 3 } else { 0 };
    let rest = &bytes[bom..];
    if !rest.starts_with(b"<?xml") {
        return None;
    }
    let end = memmem::find(rest, b"?>")? + 2;
    let text = String::from_utf8_lossy(&rest[..end]).into_owned();
    let encoding = pseudo_attribute(&text, "encoding");
    Some(XmlDeclaration {
        text,
        encoding,
        len: bom + end,
    })
}

fn pseudo_attribute(decl: &str, name: &str) -> Option<String> {
    let idx = decl.find(name)?;
    let rest = decl[idx + name.len()..].trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &rest[1..];
    let end = value.find(quote)?;
    Some(value[..end].to_string())
}

const UTF8_NAMES: &[&str] = &["utf-8", "utf8"];
const LATIN1_NAMES: &[&str] = &["iso-8859-1", "latin1", "latin-1", "us-ascii", "ascii"];

pub fn is_supported_encoding(encoding: &str) -> bool {
    let lower = encoding.to_ascii_lowercase();
    UTF8_NAMES.contains(&lower.as_str()) || LATIN1_NAMES.contains(&lower.as_str())
}

/// Decode markup bytes with the declared (or default) encoding
pub fn decode(bytes: &[u8], encoding: &str) -> Result<String, String> {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    let lower = encoding.to_ascii_lowercase();
    if UTF8_NAMES.contains(&lower.as_str()) {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| format!("invalid UTF-8 at byte {}", e.utf8_error().valid_up_to()))
    } else if LATIN1_NAMES.contains(&lower.as_str()) {
        Ok(bytes.iter().map(|&b| b as char).collect())
    } else {
        Err(format!("unsupported encoding '{}'", encoding))
    }
}

/// 1-based line and column of a byte offset
pub fn line_col(input: &str, pos: usize) -> (usize, usize) {
    let pos = pos.min(input.len());
    let before = &input.as_bytes()[..pos];
    let line = memchr_iter(b'\n', before).count() + 1;
    let line_start = before.iter().rposition(|&b| b == b'\n').map(|p| p + 1).unwrap_or(0);
    let column = input[line_start..pos].chars().count() + 1;
    (line, column)
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b':'
}

fn is_name_end(b: u8) -> bool {
    b.is_ascii_whitespace() || b == b'>' || b == b'/' || b == b'='
}

fn find_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    let n = needle.len();
    let mut i = 0;
    while i + n <= haystack.len() {
        let rel = memchr(needle[0], &haystack[i..])?;
        i += rel;
        if i + n > haystack.len() {
            return None;
        }
        if haystack[i..i + n].eq_ignore_ascii_case(needle) {
            return Some(i);
        }
        i += 1;
    }
    None
}

pub struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    // incremental line tracking
    line: usize,
    line_start: usize,
    counted_to: usize,
    raw_text_until: Option<&'static str>,
    doctype: Option<String>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            line_start: 0,
            counted_to: 0,
            raw_text_until: None,
            doctype: None,
        }
    }

    pub fn input(&self) -> &'a str {
        self.input
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn doctype(&self) -> Option<&str> {
        self.doctype.as_deref()
    }

    fn advance_lines_to(&mut self, pos: usize) {
        if pos <= self.counted_to {
            return;
        }
        let bytes = &self.input.as_bytes()[self.counted_to..pos];
        for nl in memchr_iter(b'\n', bytes) {
            self.line += 1;
            self.line_start = self.counted_to + nl + 1;
        }
        self.counted_to = pos;
    }

    fn column_of(&self, pos: usize) -> usize {
        self.input[self.line_start..pos].chars().count() + 1
    }

    /// Next tag in source order, or `None` at end of input
    pub fn next_tag(&mut self) -> Result<Option<Tag>, SyntaxError> {
        let input = self.input;
        let bytes = input.as_bytes();

        if let Some(raw) = self.raw_text_until.take() {
            let close = format!("</{}", raw);
            match find_ignore_ascii_case(&bytes[self.pos..], close.as_bytes()) {
                Some(rel) => self.pos += rel,
                None => {
                    self.pos = bytes.len();
                    return Ok(None);
                }
            }
        }

        loop {
            let rel = match memchr(b'<', &bytes[self.pos..]) {
                Some(rel) => rel,
                None => {
                    self.pos = bytes.len();
                    return Ok(None);
                }
            };
            let start = self.pos + rel;
            let rest = &input[start..];

            if rest.starts_with(COMMENT_START) {
                self.pos = self.skip_past(start, COMMENT_START.len(), COMMENT_END, "comment")?;
                continue;
            }
            if rest.starts_with(CDATA_START) {
                self.pos = self.skip_past(start, CDATA_START.len(), CDATA_END, "CDATA section")?;
                continue;
            }
            if rest.starts_with("<!") {
                let end = self.skip_past(start, 2, ">", "declaration")?;
                let body = &input[start + 2..end - 1];
                if body.get(..7).map_or(false, |k| k.eq_ignore_ascii_case("doctype")) {
                    self.doctype = Some(body[7..].trim().to_string());
                }
                self.pos = end;
                continue;
            }
            if rest.starts_with("<?") {
                self.pos = self.skip_past(start, 2, "?>", "processing instruction")?;
                continue;
            }

            let next = bytes.get(start + 1).copied();
            let tag = match next {
                Some(b'/') => self.read_close_tag(start)?,
                Some(b) if is_name_start(b) => self.read_open_tag(start)?,
                _ => {
                    // a lone '<' in text
                    self.pos = start + 1;
                    continue;
                }
            };
            let tag = match tag {
                Some(tag) => tag,
                None => continue,
            };

            if tag.is_open() && tag.namespace().is_none() {
                if tag.name().eq_ignore_ascii_case("script") {
                    self.raw_text_until = Some("script");
                } else if tag.name().eq_ignore_ascii_case("style") {
                    self.raw_text_until = Some("style");
                }
            }
            return Ok(Some(tag));
        }
    }

    fn skip_past(
        &self,
        start: usize,
        skip: usize,
        end: &str,
        what: &str,
    ) -> Result<usize, SyntaxError> {
        let from = start + skip;
        memmem::find(&self.input.as_bytes()[from..], end.as_bytes())
            .map(|rel| from + rel + end.len())
            .ok_or_else(|| SyntaxError::new(start, format!("Unterminated {}", what)))
    }

    fn read_name(&self, from: usize) -> usize {
        let bytes = self.input.as_bytes();
        let mut i = from;
        while i < bytes.len() && !is_name_end(bytes[i]) {
            i += 1;
        }
        i
    }

    fn skip_whitespace(&self, from: usize) -> usize {
        let bytes = self.input.as_bytes();
        let mut i = from;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        i
    }

    fn make_tag(&mut self, raw_name: &str, tag_type: TagType, start: usize, end: usize) -> Tag {
        self.advance_lines_to(start);
        let column = self.column_of(start);
        let (namespace, name) = match raw_name.split_once(':') {
            Some((ns, local)) if !ns.is_empty() && !local.is_empty() => {
                (Some(ns.to_string()), local.to_string())
            }
            _ => (None, raw_name.to_string()),
        };
        Tag::at(name, namespace, tag_type, start, end - start, self.line, column)
            .with_source(&self.input[start..end])
    }

    fn read_close_tag(&mut self, start: usize) -> Result<Option<Tag>, SyntaxError> {
        let input = self.input;
        let bytes = input.as_bytes();
        let name_end = self.read_name(start + 2);
        if name_end == start + 2 {
            self.pos = start + 1;
            return Ok(None);
        }
        let raw_name = &input[start + 2..name_end];
        let gt = self.skip_whitespace(name_end);
        if bytes.get(gt) != Some(&b'>') {
            return Err(SyntaxError::new(
                start,
                format!("Malformed close tag '</{}'", raw_name),
            ));
        }
        let tag = self.make_tag(raw_name, TagType::Close, start, gt + 1);
        self.pos = gt + 1;
        Ok(Some(tag))
    }

    fn read_open_tag(&mut self, start: usize) -> Result<Option<Tag>, SyntaxError> {
        let input = self.input;
        let bytes = input.as_bytes();
        let name_end = self.read_name(start + 1);
        let raw_name = self.input[start + 1..name_end].to_string();
        let mut attributes: Vec<(String, String)> = Vec::new();
        let mut i = name_end;

        let (tag_type, end) = loop {
            i = self.skip_whitespace(i);
            match bytes.get(i) {
                None => {
                    return Err(SyntaxError::new(
                        start,
                        format!("Unexpected end of markup inside tag '<{}'", raw_name),
                    ))
                }
                Some(b'>') => break (TagType::Open, i + 1),
                Some(b'/') if bytes.get(i + 1) == Some(&b'>') => {
                    break (TagType::OpenClose, i + 2)
                }
                Some(b'/') => {
                    i += 1;
                    continue;
                }
                Some(_) => {}
            }

            let key_end = self.read_name(i);
            if key_end == i {
                return Err(SyntaxError::new(
                    i,
                    format!("Expected attribute name in tag '<{}'", raw_name),
                ));
            }
            let key = self.input[i..key_end].to_string();
            i = self.skip_whitespace(key_end);

            let value = if bytes.get(i) == Some(&b'=') {
                i = self.skip_whitespace(i + 1);
                match bytes.get(i) {
                    Some(&q) if q == b'"' || q == b'\'' => {
                        let close = memchr(q, &bytes[i + 1..]).ok_or_else(|| {
                            SyntaxError::new(
                                i,
                                format!("Unterminated value of attribute '{}'", key),
                            )
                        })?;
                        let value = self.input[i + 1..i + 1 + close].to_string();
                        i = i + 1 + close + 1;
                        value
                    }
                    Some(_) => {
                        let from = i;
                        while i < bytes.len()
                            && !bytes[i].is_ascii_whitespace()
                            && bytes[i] != b'>'
                            && !(bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'>'))
                        {
                            i += 1;
                        }
                        self.input[from..i].to_string()
                    }
                    None => {
                        return Err(SyntaxError::new(
                            start,
                            format!("Unexpected end of markup inside tag '<{}'", raw_name),
                        ))
                    }
                }
            } else {
                String::new()
            };

            if attributes.iter().any(|(k, _)| *k == key) {
                return Err(SyntaxError::new(
                    start,
                    format!("Duplicate attribute '{}' in tag '<{}'", key, raw_name),
                ));
            }
            attributes.push((key, value));
        };

        let mut tag = self.make_tag(&raw_name, tag_type, start, end);
        for (key, value) in attributes {
            tag.push_parsed_attribute(key, value);
        }
        self.pos = end;
        Ok(Some(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(input: &str) -> Vec<Tag> {
        let mut tokenizer = Tokenizer::new(input);
        let mut out = Vec::new();
        while let Some(tag) = tokenizer.next_tag().unwrap() {
            out.push(tag);
        }
        out
    }

    #[test]
    fn test_basic_tags_and_positions() {
        let input = "<p>hi <b class='x' hidden>there</b><br/></p>";
        let tags = tags(input);
        let names: Vec<_> = tags.iter().map(|t| t.to_string()).collect();
        assert_eq!(
            names,
            vec!["<p>", "<b class=\"x\" hidden=\"\">", "</b>", "<br/>", "</p>"]
        );
        assert_eq!(&input[tags[1].pos()..tags[1].pos() + tags[1].length()], "<b class='x' hidden>");
    }

    #[test]
    fn test_namespace_split() {
        let tags = tags("<wicket:extend>x</wicket:extend>");
        assert_eq!(tags[0].namespace(), Some("wicket"));
        assert_eq!(tags[0].name(), "extend");
        assert!(tags[1].is_close());
    }

    #[test]
    fn test_comments_cdata_and_doctype_are_skipped() {
        let input = "<!DOCTYPE html><!-- <b> --><![CDATA[<i>]]><p/>";
        let mut tokenizer = Tokenizer::new(input);
        let tag = tokenizer.next_tag().unwrap().unwrap();
        assert_eq!(tag.name(), "p");
        assert_eq!(tokenizer.doctype(), Some("html"));
    }

    #[test]
    fn test_script_body_is_raw_text() {
        let tags = tags("<script>if (a < b) { x = '<div>'; }</script><span/>");
        let names: Vec<_> = tags.iter().map(|t| t.to_string()).collect();
        assert_eq!(names, vec!["<script>", "</script>", "<span/>"]);
    }

    #[test]
    fn test_duplicate_attribute_is_an_error() {
        let mut tokenizer = Tokenizer::new("<a href=\"x\" href=\"y\">");
        assert!(tokenizer.next_tag().is_err());
    }

    #[test]
    fn test_unterminated_tag_is_an_error() {
        let mut tokenizer = Tokenizer::new("<p>text <span class=\"x\"");
        assert!(tokenizer.next_tag().unwrap().is_some());
        let err = tokenizer.next_tag().unwrap_err();
        assert_eq!(err.pos, 8);
    }

    #[test]
    fn test_lone_angle_bracket_is_text() {
        let tags = tags("a < b <i>c</i>");
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn test_line_and_column() {
        let tags = tags("<a>\n  <b/>\n</a>");
        assert_eq!((tags[1].line(), tags[1].column()), (2, 3));
        assert_eq!(line_col("<a>\n  <b/>", 6), (2, 3));
    }

    #[test]
    fn test_xml_declaration_and_decode() {
        let bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><p>\xe9</p>";
        let decl = read_xml_declaration(bytes).unwrap();
        assert_eq!(decl.encoding.as_deref(), Some("ISO-8859-1"));
        let text = decode(&bytes[decl.len..], "ISO-8859-1").unwrap();
        assert_eq!(text, "<p>\u{e9}</p>");
        assert!(decode(b"x", "EBCDIC").is_err());
    }
}
