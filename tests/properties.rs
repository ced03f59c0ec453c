//! Property-based tests for filtering.
//!
//! - Both filters write identical bytes for any input under the baseline
//!   policy, which has no rules that need lookahead.
//! - Markup made only of allowed elements passes through unchanged, so
//!   filtering is idempotent on it.
//! - Whatever the input, a browser parsing the output finds no script
//!   element and no event handler attribute.
//! - Entity escaping round-trips.

use std::sync::Arc;

use proptest::prelude::*;
use scraper::{Html, Selector};
use xss_guard::escape::{escape, unescape};
use xss_guard::{FilterBuilder, Policy, StreamFilter, TreeFilter};

fn filters() -> (TreeFilter, StreamFilter) {
    let policy = Arc::new(Policy::baseline());
    (
        FilterBuilder::new(Arc::clone(&policy)).build_tree(),
        FilterBuilder::new(policy).build_stream(),
    )
}

/// Pieces of hostile and ordinary markup.
const PIECES: &[&str] = &[
    "<p>",
    "</p>",
    "<b>",
    "</b>",
    "<font color=red>",
    "</font>",
    "<div class=\"x\">",
    "</div>",
    "<script>",
    "</script>",
    "<object data=\"a.swf\">",
    "</object>",
    "<param name=\"allowScriptAccess\" value=\"always\">",
    "<param name=\"movie\" value=\"https://x/a.swf\">",
    "<embed src=\"a.swf\">",
    "<a href=\"javascript:alert(1)\">",
    "<a href=\"/ok\">",
    "</a>",
    "<img src=x onerror=alert(1)>",
    "<br/>",
    "<!-- note -->",
    "<!--[if IE]>",
    "<!--[if !mso]-->",
    "<![if !IE]>",
    "<![endif]-->",
    "<!--[endif]-->",
    "<![endif]>",
    "<b title=\"-->\">",
    "<p title=\"--!><script>\">",
    "<i title='--><img src=x onerror=alert(1)>'>",
    "</i>",
    "<b title=a<script>",
    "<!-- -->",
    "--!>",
    "-->",
    "<",
    ">",
    "&amp;",
];

/// Random concatenations of [`PIECES`] and plain words.
fn fragment_strategy() -> impl Strategy<Value = String> {
    let piece = prop_oneof![
        3 => prop::sample::select(PIECES).prop_map(str::to_string),
        1 => "[a-z ]{1,6}",
    ];
    prop::collection::vec(piece, 0..24).prop_map(|pieces| pieces.concat())
}

/// Nested markup built only from elements and attributes the baseline allows.
fn allowed_markup_strategy() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        "[a-z][a-z ]{0,8}",
        Just("<br/>".to_string()),
        Just("<!-- c -->".to_string()),
    ];
    leaf.prop_recursive(4, 32, 4, |inner| {
        (
            prop_oneof![
                Just("b"),
                Just("i"),
                Just("p"),
                Just("div"),
                Just("span"),
                Just("em")
            ],
            prop::option::of("[a-z]{1,5}"),
            prop::collection::vec(inner, 0..4),
        )
            .prop_map(|(tag, class, children)| match class {
                Some(class) => format!("<{tag} class=\"{class}\">{}</{tag}>", children.concat()),
                None => format!("<{tag}>{}</{tag}>", children.concat()),
            })
    })
}

proptest! {
    #[test]
    fn tree_and_stream_agree(input in fragment_strategy()) {
        let (tree, stream) = filters();
        prop_assert_eq!(tree.filter(&input), stream.filter(&input));
    }

    #[test]
    fn allowed_markup_is_a_fixed_point(input in allowed_markup_strategy()) {
        let (tree, stream) = filters();
        let once = tree.filter(&input);
        prop_assert_eq!(&once, &input);
        prop_assert_eq!(tree.filter(&once), once.clone());
        prop_assert_eq!(stream.filter(&once), once);
    }

    #[test]
    fn reparsed_output_has_no_script(input in fragment_strategy()) {
        let output = xss_guard::sanitize(&input);
        let document = Html::parse_fragment(&output);
        let scripts = Selector::parse("script, iframe").unwrap();
        prop_assert_eq!(document.select(&scripts).count(), 0, "{}", output);
        let all = Selector::parse("*").unwrap();
        for element in document.select(&all) {
            for (name, _) in element.value().attrs() {
                prop_assert!(!name.starts_with("on"), "{} survived in {}", name, output);
            }
        }
    }

    #[test]
    fn escape_round_trips(s in any::<String>()) {
        let escaped = escape(&s);
        prop_assert!(!escaped.contains('<') && !escaped.contains('"'));
        prop_assert_eq!(unescape(&escaped), s.clone());
    }
}
