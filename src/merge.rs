//! Markup inheritance: splicing the `<wicket:extend>` region of a derived
//! markup into the `<wicket:child>` placeholder of its base markup.
//!
//! The merged markup is a new element list; tags are copied out of both
//! inputs and stamped with the class whose markup contributed them.

use crate::error::{MarkupError, MarkupResult};
use crate::head;
use crate::markup::{Markup, MarkupElement};
use crate::tag::{Tag, TagType};

/// Index of the `<wicket:extend>` open tag, or `None` when the markup does
/// not use inheritance.
///
/// Text, `<wicket:head>` regions and auto tags such as the page's `<head>` or
/// `<body>` may precede the extend tag; any other tag may not.
pub fn extend_index(markup: &Markup) -> MarkupResult<Option<usize>> {
    let mut head_depth = 0usize;
    for (index, element) in markup.elements().iter().enumerate() {
        let tag = match element {
            MarkupElement::Tag(tag) => tag,
            MarkupElement::Text(_) => continue,
        };
        if tag.is_head_region() {
            if tag.is_open() {
                head_depth += 1;
            } else if tag.is_close() {
                head_depth = head_depth.saturating_sub(1);
            }
            continue;
        }
        if head_depth > 0 || (tag.is_auto_component() && !tag.is_reserved()) {
            continue;
        }
        if tag.is_extend() && tag.is_open() {
            return Ok(Some(index));
        }

        let extend_later = markup.elements()[index..]
            .iter()
            .filter_map(MarkupElement::as_tag)
            .any(Tag::is_extend);
        if extend_later {
            return Err(MarkupError::ExtendNotFirst {
                class: markup.resource().display_class().to_string(),
                location: markup.location().to_string(),
                namespace: markup.wicket_namespace().to_string(),
                tag: tag.to_string(),
            });
        }
        return Ok(None);
    }
    Ok(None)
}

fn stamped(element: &MarkupElement, class: &str) -> MarkupResult<MarkupElement> {
    Ok(match element {
        MarkupElement::Tag(tag) => {
            let mut tag = tag.mutable();
            if tag.markup_class().is_none() {
                tag.set_markup_class(class)?;
            }
            MarkupElement::Tag(tag)
        }
        MarkupElement::Text(text) => MarkupElement::Text(text.clone()),
    })
}

/// `base;derived`, without doubling a separator the base already has
fn concat_onload(base: &str, derived: &str) -> String {
    let base = base.trim_end();
    if base.is_empty() || base.ends_with(';') {
        format!("{}{}", base, derived)
    } else {
        format!("{};{}", base, derived)
    }
}

struct Merger<'m> {
    derived: &'m Markup,
    base: &'m Markup,
    base_class: String,
    derived_class: String,
    head_regions: Vec<MarkupElement>,
    derived_onload: Option<String>,
    out: Vec<MarkupElement>,
    head_seen: bool,
    head_done: bool,
}

impl<'m> Merger<'m> {
    fn new(derived: &'m Markup, extend: usize, base: &'m Markup) -> MarkupResult<Self> {
        let derived_class = derived.resource().display_class().to_string();
        let head_regions = head::copy_head_regions(derived.elements(), extend)
            .iter()
            .map(|e| stamped(e, &derived_class))
            .collect::<MarkupResult<Vec<_>>>()?;
        let derived_onload = derived
            .elements()
            .iter()
            .filter_map(MarkupElement::as_tag)
            .find(|t| t.is_plain_body() && t.is_open())
            .and_then(|t| t.attribute("onload"))
            .map(str::to_string);
        Ok(Self {
            derived,
            base,
            base_class: base.resource().display_class().to_string(),
            derived_class,
            head_done: head_regions.is_empty(),
            head_regions,
            derived_onload,
            out: Vec::new(),
            head_seen: false,
        })
    }

    fn splice_head(&mut self) {
        self.out.append(&mut self.head_regions);
        self.head_done = true;
    }

    /// Next tag of the base after `index`, skipping text
    fn next_base_tag(&self, index: usize) -> Option<&'m Tag> {
        self.base.elements()[index + 1..]
            .iter()
            .find_map(MarkupElement::as_tag)
    }

    /// Copy one base element, splicing the derived head regions in at the
    /// first suitable place on the way
    fn copy_base(&mut self, index: usize) -> MarkupResult<()> {
        let element = stamped(&self.base.elements()[index], &self.base_class)?;
        let mut tag = match element {
            MarkupElement::Tag(tag) => tag,
            text => {
                self.out.push(text);
                return Ok(());
            }
        };

        if !self.head_done {
            if tag.is_head_region() && tag.is_close() && !self.head_seen {
                let more_regions = self
                    .next_base_tag(index)
                    .map_or(false, |next| next.is_head_region() && next.is_open());
                self.out.push(MarkupElement::Tag(tag));
                if !more_regions {
                    self.splice_head();
                }
                return Ok(());
            }
            if tag.is_plain_head() && tag.is_open() {
                self.head_seen = true;
            } else if (tag.is_plain_head() && tag.is_close()) || (tag.is_plain_body() && tag.is_open()) {
                self.splice_head();
            } else if tag.is_major() {
                self.head_regions.clear();
                self.head_done = true;
            }
        }

        if tag.is_plain_body() && tag.is_open() {
            if let Some(derived) = &self.derived_onload {
                let value = match tag.attribute("onload") {
                    Some(base) => concat_onload(base, derived),
                    None => derived.clone(),
                };
                tag.put("onload", value)?;
            }
        }
        self.out.push(MarkupElement::Tag(tag));
        Ok(())
    }

    fn missing(&self, make: fn(String, String, String) -> MarkupError) -> MarkupError {
        make(
            self.base_class.clone(),
            self.base.location().to_string(),
            self.base.wicket_namespace().to_string(),
        )
    }

    fn run(mut self, extend: usize, is_page: bool) -> MarkupResult<Markup> {
        let base_len = self.base.len();

        // 1. base up to the child marker
        let mut child_index = None;
        for index in 0..base_len {
            if let Some(tag) = self.base.tag(index) {
                let own_child = tag.is_child()
                    && tag.markup_class().map_or(true, |c| c == self.base_class);
                if own_child {
                    if tag.is_close() {
                        return Err(self.missing(|class, location, namespace| {
                            MarkupError::UnexpectedChildClose { class, location, namespace }
                        }));
                    }
                    child_index = Some(index);
                    break;
                }
            }
            self.copy_base(index)?;
        }
        let child_index = match child_index {
            Some(index) => index,
            None => {
                return Err(self.missing(|class, location, namespace| MarkupError::MissingChildTag {
                    class,
                    location,
                    namespace,
                }))
            }
        };
        if !self.head_done {
            self.splice_head();
        }

        let mut child = match stamped(&self.base.elements()[child_index], &self.base_class)? {
            MarkupElement::Tag(tag) => tag,
            MarkupElement::Text(_) => {
                return Err(self.missing(|class, location, namespace| MarkupError::MissingChildTag {
                    class,
                    location,
                    namespace,
                }))
            }
        };
        let open_close = child.is_open_close();
        if open_close {
            child.set_type(TagType::Open)?;
        }
        let child_close = if open_close {
            let mut close = child.synthetic_close();
            if let Some(id) = child.id() {
                close.set_id(id)?;
            }
            close.set_auto_component(child.is_auto_component())?;
            close.set_reserved(child.reserved_kind())?;
            close.set_markup_class(self.base_class.clone())?;
            Some(close)
        } else {
            None
        };
        self.out.push(MarkupElement::Tag(child));

        // 2. the derived extend region, extend tags included
        let extend_close = (extend + 1..self.derived.len())
            .find(|&i| {
                self.derived
                    .tag(i)
                    .map_or(false, |t| t.is_extend() && t.is_close() && t.open_index() == Some(extend))
            })
            .ok_or_else(|| MarkupError::MissingExtendCloseTag {
                class: self.derived_class.clone(),
                location: self.derived.location().to_string(),
                namespace: self.derived.wicket_namespace().to_string(),
            })?;
        for index in extend..=extend_close {
            let element = stamped(&self.derived.elements()[index], &self.derived_class)?;
            self.out.push(element);
        }

        // 3. the child close tag; whatever the base had in between is dropped
        let resume = match child_close {
            Some(close) => {
                self.out.push(MarkupElement::Tag(close));
                child_index + 1
            }
            None => {
                let mut close_index = None;
                for index in child_index + 1..base_len {
                    let tag = match self.base.tag(index) {
                        Some(tag) => tag,
                        None => continue,
                    };
                    if tag.is_child() && tag.is_close() {
                        close_index = Some(index);
                        break;
                    }
                    return Err(MarkupError::ReservedTagInChild {
                        class: self.base_class.clone(),
                        location: self.base.location().to_string(),
                        namespace: self.base.wicket_namespace().to_string(),
                        tag: tag.to_string(),
                    });
                }
                let close_index = close_index.ok_or_else(|| {
                    self.missing(|class, location, namespace| MarkupError::MissingChildCloseTag {
                        class,
                        location,
                        namespace,
                    })
                })?;
                let close = stamped(&self.base.elements()[close_index], &self.base_class)?;
                self.out.push(close);
                close_index + 1
            }
        };

        // 4. rest of the base
        for index in resume..base_len {
            self.copy_base(index)?;
        }

        if is_page && head::has_head_regions(&self.out) && !head::has_literal_head(&self.out) {
            head::wrap_head_regions(&mut self.out)?;
        }

        let mut bases = vec![self.base.resource().clone()];
        bases.extend(self.base.bases().iter().cloned());

        let mut merged = Markup::new(self.derived.resource().clone());
        merged.set_bases(bases);
        merged.set_encoding(self.derived.encoding().map(str::to_string));
        merged.set_wicket_namespace(self.derived.wicket_namespace());
        merged.set_xml_declaration(self.base.xml_declaration().map(str::to_string));
        merged.set_doctype(self.base.doctype().map(str::to_string));
        for element in self.out {
            merged.add_element(element)?;
        }
        merged.assemble()
    }
}

/// Merge `derived` (whose extend open tag is element `extend`) into `base`.
/// `is_page` enables the final `<head>` wrapping of head regions.
pub fn merge(derived: &Markup, extend: usize, base: &Markup, is_page: bool) -> MarkupResult<Markup> {
    let merger = Merger::new(derived, extend, base)?;
    tracing::debug!(
        derived = %derived.resource().display_class(),
        base = %base.resource().display_class(),
        "merging markup"
    );
    merger.run(extend, is_page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ContainerContext;
    use crate::parser::MarkupParser;
    use crate::resource::MarkupResourceStream;
    use crate::settings::MarkupSettings;

    fn parse(class: &str, input: &str, is_page: bool) -> Markup {
        MarkupParser::new(
            MarkupResourceStream::detached(format!("{}.html", class)).with_markup_class(class),
            &MarkupSettings::default(),
        )
        .with_container(ContainerContext::new(class, is_page))
        .parse_str(input)
        .unwrap()
    }

    fn merged(derived: &str, base: &str, is_page: bool) -> MarkupResult<Markup> {
        let derived = parse("Derived", derived, is_page);
        let base = parse("Base", base, is_page);
        let extend = extend_index(&derived)?.expect("derived markup extends");
        merge(&derived, extend, &base, is_page)
    }

    #[test]
    fn test_extend_index() {
        let markup = parse("D", "<wicket:head><b>x</b></wicket:head>\n<wicket:extend>y</wicket:extend>", false);
        assert_eq!(extend_index(&markup).unwrap(), Some(4));
        let plain = parse("P", "<div wicket:id=\"a\"></div>", false);
        assert_eq!(extend_index(&plain).unwrap(), None);
    }

    #[test]
    fn test_extend_after_component_fails() {
        let markup = parse("D", "<span wicket:id=\"a\"></span><wicket:extend>y</wicket:extend>", false);
        assert!(matches!(extend_index(&markup), Err(MarkupError::ExtendNotFirst { .. })));
    }

    #[test]
    fn test_open_close_child_is_replaced() {
        let result = merged(
            "<wicket:extend><p>hi</p></wicket:extend>",
            "<div><wicket:child/></div>",
            false,
        )
        .unwrap();
        assert_eq!(result.to_markup_string(true), "<div><p>hi</p></div>");
        assert!(result.is_merged());
        let child = result.tag(1).unwrap();
        assert!(child.is_child() && child.is_open());
        assert_eq!(child.markup_class(), Some("Base"));
        assert_eq!(result.tag(2).unwrap().markup_class(), Some("Derived"));
    }

    #[test]
    fn test_open_child_region_drops_base_content() {
        let result = merged(
            "<wicket:extend>new</wicket:extend>",
            "<div><wicket:child>default</wicket:child></div>",
            false,
        )
        .unwrap();
        assert_eq!(result.to_markup_string(true), "<div>new</div>");
    }

    #[test]
    fn test_tag_inside_child_region_fails() {
        let result = merged(
            "<wicket:extend>new</wicket:extend>",
            "<wicket:child><span wicket:id=\"x\"></span></wicket:child>",
            false,
        );
        assert!(matches!(result, Err(MarkupError::ReservedTagInChild { .. })));
    }

    #[test]
    fn test_missing_child_names_base() {
        let result = merged("<wicket:extend>x</wicket:extend>", "<div>no child</div>", false);
        match result {
            Err(MarkupError::MissingChildTag { class, location, .. }) => {
                assert_eq!(class, "Base");
                assert_eq!(location, "Base.html");
            }
            other => panic!("expected missing child error, got {:?}", other),
        }
    }

    #[test]
    fn test_body_onload_is_concatenated() {
        let result = merged(
            "<html><body onload=\"second()\"><wicket:extend>x</wicket:extend></body></html>",
            "<html><head></head><body onload=\"first()\"><wicket:child/></body></html>",
            true,
        )
        .unwrap();
        let body = result
            .elements()
            .iter()
            .filter_map(MarkupElement::as_tag)
            .find(|t| t.is_plain_body() && t.is_open())
            .unwrap();
        assert_eq!(body.attribute("onload"), Some("first();second()"));
    }

    #[test]
    fn test_concat_onload() {
        assert_eq!(concat_onload("a()", "b()"), "a();b()");
        assert_eq!(concat_onload("a();", "b()"), "a();b()");
    }

    #[test]
    fn test_panel_base_gets_no_head_splice() {
        let result = merged(
            "<wicket:head><style>d</style></wicket:head><wicket:extend>x</wicket:extend>",
            "<wicket:panel><wicket:child/></wicket:panel>",
            false,
        )
        .unwrap();
        assert!(!result.to_markup_string(false).contains("<style"));
    }
}
