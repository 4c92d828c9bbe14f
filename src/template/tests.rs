use super::*;

fn t(template: &str) -> URITemplate {
    URITemplate::new(template, false).unwrap()
}

#[test]
fn test_parse_components() {
    let tpl = t("/widgets/{id}/parts/{part: [a-z]+}");
    assert_eq!(tpl.template(), "/widgets/{id}/parts/{part: [a-z]+}");
    let kinds: Vec<_> = tpl.components().iter().map(|c| c.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ComponentType::Literal,
            ComponentType::DefaultRegex,
            ComponentType::Literal,
            ComponentType::CustomRegex
        ]
    );
    assert_eq!(tpl.literal_char_count(), "/widgets/".len() + "/parts/".len());
    assert_eq!(tpl.capture_group_count(), 2);
    assert_eq!(tpl.complex_expressions(), 1);
    assert_eq!(tpl.count_path_param_names(), 2);
}

#[test]
fn test_normalization() {
    assert_eq!(t("widgets/").template(), "/widgets");
    assert_eq!(t("").template(), "/");
    assert!(t("/").is_root());
}

#[test]
fn test_nested_braces_in_regex() {
    let tpl = t("/codes/{code: [0-9]{3}}");
    assert_eq!(tpl.capture_group_count(), 1);
    let m = tpl.match_path("/codes/404").unwrap();
    assert_eq!(m.values.as_slice(), &["404"]);
    assert!(tpl.match_path("/codes/40").is_none());
}

#[test]
fn test_invalid_templates() {
    assert!(URITemplate::new("/a/{id", false).is_err());
    assert!(URITemplate::new("/a/id}", false).is_err());
    assert!(URITemplate::new("/a/{ }", false).is_err());
    assert!(URITemplate::new("/a/{id: (}", false).is_err());
}

#[test]
fn test_literal_beats_variable() {
    let literal = t("/widgets/special");
    let var = t("/widgets/{id}");
    assert!(literal < var);
    assert_eq!(literal.specificity_cmp(&var), std::cmp::Ordering::Less);
}

#[test]
fn test_more_groups_then_complex_first() {
    let two = t("/a/{x}-{y}");
    let one = t("/a/{x}-");
    assert_eq!(two.literal_char_count(), one.literal_char_count());
    assert!(two < one);

    let plain = t("/a/{x}");
    let complex = t("/a/{x: \\d+}");
    assert_eq!(plain.literal_char_count(), complex.literal_char_count());
    assert!(complex < plain);
}

#[test]
fn test_distinct_templates_never_equal() {
    let a = t("/{a}");
    let b = t("/{b}");
    assert_eq!(a.specificity_cmp(&b), std::cmp::Ordering::Equal);
    assert_ne!(a.cmp(&b), std::cmp::Ordering::Equal);
}

#[test]
fn test_exact_match_allows_trailing_slash() {
    let tpl = t("/widgets/{id}");
    let m = tpl.match_path("/widgets/7").unwrap();
    assert_eq!(m.values.as_slice(), &["7"]);
    assert!(tpl.match_path("/widgets/7/").is_some());
    assert!(tpl.match_path("/widgets/7/parts").is_none());
    assert!(tpl.match_path("/widgets").is_none());
}

#[test]
fn test_prefix_match_captures_remaining() {
    let tpl = URITemplate::new("/widgets/{id}", true).unwrap();
    let m = tpl.match_path("/widgets/7/parts/3").unwrap();
    assert_eq!(m.values.as_slice(), &["7"]);
    assert_eq!(m.remaining, "/parts/3");

    let m = tpl.match_path("/widgets/7").unwrap();
    assert_eq!(m.remaining, "");
    assert!(tpl.match_path("/widgetsX/7").is_none());
}

#[test]
fn test_root_templates() {
    let root_prefix = URITemplate::new("/", true).unwrap();
    assert_eq!(root_prefix.match_path("/anything/here").unwrap().remaining, "/anything/here");
    assert_eq!(root_prefix.match_path("").unwrap().remaining, "");

    let root = t("/");
    assert!(root.match_path("").is_some());
    assert!(root.match_path("/").is_some());
    assert!(root.match_path("/x").is_none());
}

#[test]
fn test_param_names_in_order() {
    let tpl = t("/{a}/x/{b}");
    let names: Vec<&str> = tpl.param_names().map(|n| n.as_ref()).collect();
    assert_eq!(names, vec!["a", "b"]);
}
