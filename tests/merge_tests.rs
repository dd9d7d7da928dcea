use nulltrace_markup::{merge_markup, MarkupElement, MarkupError};
use pretty_assertions::assert_eq;

#[test]
fn test_child_region_is_replaced() {
    let result = merge_markup(
        "<wicket:extend><p>hi</p></wicket:extend>",
        "<html><head></head><body><wicket:child/></body></html>",
        true,
    );
    assert!(result.is_ok(), "Failed: {:?}", result.err());
    let merged = result.unwrap();
    assert_eq!(
        merged.to_markup_string(true),
        "<html><head></head><body><p>hi</p></body></html>"
    );
    assert!(merged.is_merged());
    assert_eq!(merged.bases().len(), 1);
    assert_eq!(merged.bases()[0].locator(), "Base.html");
}

#[test]
fn test_head_contributions_accumulate_base_first() {
    let merged = merge_markup(
        "<wicket:head><script>B</script></wicket:head><wicket:extend>X</wicket:extend>",
        "<html><wicket:head><script>A</script></wicket:head><body><wicket:child/></body></html>",
        true,
    )
    .unwrap();
    let output = merged.to_markup_string(true);

    assert_eq!(output.matches("<head>").count(), 1, "{}", output);
    assert_eq!(output.matches("</head>").count(), 1, "{}", output);
    let head_end = output.find("</head>").unwrap();
    let a = output.find(">A<").expect("base script");
    let b = output.find(">B<").expect("derived script");
    assert!(a < b, "base contribution must come first: {}", output);
    assert!(b < head_end, "derived contribution must be inside head: {}", output);
    assert!(output.contains("<body>X</body>"), "{}", output);
}

#[test]
fn test_derived_head_goes_into_literal_base_head() {
    let merged = merge_markup(
        "<wicket:head><style>d</style></wicket:head><wicket:extend>X</wicket:extend>",
        "<html><head><title>t</title></head><body><wicket:child/></body></html>",
        true,
    )
    .unwrap();
    let output = merged.to_markup_string(true);
    let title = output.find("<title>").unwrap();
    let style = output.find("<style").unwrap();
    let head_end = output.find("</head>").unwrap();
    assert!(title < style && style < head_end, "{}", output);
    assert_eq!(output.matches("<head").count(), 1, "{}", output);
}

#[test]
fn test_missing_child_names_base() {
    let result = merge_markup("<wicket:extend>x</wicket:extend>", "<div>no child here</div>", false);
    match result {
        Err(MarkupError::MissingChildTag { class, location, namespace }) => {
            assert_eq!(class, "Base");
            assert_eq!(location, "Base.html");
            assert_eq!(namespace, "wicket");
        }
        other => panic!("expected missing child error, got {:?}", other),
    }
}

#[test]
fn test_derived_without_extend() {
    let result = merge_markup("<div>plain</div>", "<wicket:child/>", false);
    assert!(matches!(result, Err(MarkupError::MissingExtendTag { .. })));
}

#[test]
fn test_merged_tags_remember_their_class() {
    let merged = merge_markup(
        "<wicket:extend><span wicket:id=\"label\"></span></wicket:extend>",
        "<div wicket:id=\"frame\"><wicket:child/></div>",
        false,
    )
    .unwrap();
    let class_of = |id: &str| {
        merged
            .elements()
            .iter()
            .filter_map(MarkupElement::as_tag)
            .find(|t| t.id() == Some(id) && t.is_open())
            .and_then(|t| t.markup_class().map(str::to_string))
    };
    assert_eq!(class_of("frame").as_deref(), Some("Base"));
    assert_eq!(class_of("label").as_deref(), Some("Derived"));
    assert!(merged.find_fragment("frame").is_some());
}

#[test]
fn test_merged_markup_is_a_fresh_tree() {
    let merged = merge_markup(
        "<wicket:extend>new</wicket:extend>",
        "<div><wicket:child>old</wicket:child></div>",
        false,
    )
    .unwrap();
    assert!(merged.is_immutable());
    let expected: Vec<usize> = (0..merged.len()).collect();
    assert_eq!(merged.root().flatten(), expected);
    assert_eq!(merged.to_markup_string(true), "<div>new</div>");
}
