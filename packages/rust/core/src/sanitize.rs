//! Plain-text cleanup for CRM note bodies.
//!
//! This is a best-effort tag stripper, not a markup parser: any `<...>` span
//! is removed, entities such as `&amp;` are left as-is, and a `>` inside an
//! attribute value ends the tag early.

use regex::Regex;
use std::sync::LazyLock;

/// Matches one `<...>` tag span.
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));

/// Remove every `<...>` span from `body`.
pub fn strip_markup(body: &str) -> String {
    TAG_RE.replace_all(body, "").into_owned()
}

/// Clean each note body and join them with newlines, preserving order.
pub fn join_notes<S: AsRef<str>>(bodies: &[S]) -> String {
    bodies
        .iter()
        .map(|body| strip_markup(body.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_inline_tags() {
        assert_eq!(strip_markup("<b>Hello</b> world"), "Hello world");
    }

    #[test]
    fn strips_tags_with_attributes() {
        assert_eq!(
            strip_markup(r#"<p style="color:red">Call <a href="x">Jane</a></p>"#),
            "Call Jane"
        );
    }

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(strip_markup("budget 5k < 10k"), "budget 5k < 10k");
        assert_eq!(strip_markup(""), "");
    }

    #[test]
    fn comparison_pair_reads_as_a_tag() {
        assert_eq!(strip_markup("5 < 10 and 10 > 5"), "5  5");
    }

    #[test]
    fn entities_are_not_decoded() {
        assert_eq!(strip_markup("<p>R&amp;D</p>"), "R&amp;D");
    }

    #[test]
    fn join_preserves_order() {
        let joined = join_notes(&["<p>first</p>", "second", "<i>third</i>"]);
        assert_eq!(joined, "first\nsecond\nthird");
    }

    #[test]
    fn join_of_nothing_is_empty() {
        let none: [&str; 0] = [];
        assert_eq!(join_notes(&none), "");
    }
}
