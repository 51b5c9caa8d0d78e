//! Rich-text normalization for note and message bodies

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static LINE_ENDINGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r\n?").expect("valid line ending regex"));

static BLOCK_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</(?:p|div|tr|h[1-6])\s*>|<(?:p|div|tr|h[1-6]|br)\b[^>]*/>|<br\b[^>]*>")
        .expect("valid block break regex")
});

static BLOCK_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(?:p|div|tr|h[1-6])\b[^>]*>").expect("valid block open regex"));

static LIST_ITEM_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<li\b[^>]*>").expect("valid list item regex"));

static LIST_ITEM_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</li\s*>").expect("valid list item close regex"));

static ANY_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));

static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(?:(lt|gt|quot|apos|nbsp|#39);|amp;?)").expect("valid entity regex"));

static BLANK_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("valid blank run regex"));

/// Convert an HTML-ish body to plain text.
///
/// Entities are decoded in a single pass, so `&amp;lt;` becomes `&lt;` and not `<`.
pub fn to_plain_text(markup: &str) -> String {
    let text = LINE_ENDINGS.replace_all(markup, "\n");
    let text = BLOCK_BREAK.replace_all(&text, "\n");
    let text = BLOCK_OPEN.replace_all(&text, "");
    let text = LIST_ITEM_OPEN.replace_all(&text, "• ");
    let text = LIST_ITEM_CLOSE.replace_all(&text, "\n");
    let text = ANY_TAG.replace_all(&text, "");
    let text = ENTITY.replace_all(&text, |caps: &Captures| {
        match caps.get(1).map(|m| m.as_str()) {
            Some("lt") => "<",
            Some("gt") => ">",
            Some("quot") => "\"",
            Some("apos") | Some("#39") => "'",
            Some("nbsp") => " ",
            _ => "&",
        }
    });
    let text = BLANK_RUNS.replace_all(&text, "\n\n");
    text.trim().to_string()
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Escape text for an HTML body, one `<div>` per line
pub fn to_html(text: &str) -> String {
    let normalized = LINE_ENDINGS.replace_all(text, "\n");
    normalized
        .split('\n')
        .map(|line| {
            let escaped = escape_html(line);
            if escaped.is_empty() {
                "<div><br></div>".to_string()
            } else {
                format!("<div>{}</div>", escaped)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_entities() {
        assert_eq!(to_plain_text("&lt;b&gt;&amp;&nbsp;x"), "<b>& x");
    }

    #[test]
    fn test_entities_single_pass() {
        assert_eq!(to_plain_text("&amp;lt;"), "&lt;");
        assert_eq!(to_plain_text("a &amp b"), "a & b");
        assert_eq!(to_plain_text("it&#39;s &quot;ok&quot;"), "it's \"ok\"");
    }

    #[test]
    fn test_block_tags_become_lines() {
        let html = "<div>First</div><div>Second<br>Third</div><p>Fourth</p>";
        assert_eq!(to_plain_text(html), "First\nSecond\nThird\nFourth");
    }

    #[test]
    fn test_headings_and_self_closing() {
        assert_eq!(to_plain_text("<h1>Title</h1>Body<br/>End"), "Title\nBody\nEnd");
        assert_eq!(to_plain_text("<DIV CLASS=\"x\">A</DIV>B"), "A\nB");
    }

    #[test]
    fn test_pre_is_not_a_paragraph() {
        assert_eq!(to_plain_text("<pre>code</pre>"), "code");
    }

    #[test]
    fn test_list_items() {
        let html = "<ul><li>one</li><li class=\"x\">two</li></ul>";
        assert_eq!(to_plain_text(html), "• one\n• two");
    }

    #[test]
    fn test_crlf_and_blank_runs() {
        assert_eq!(to_plain_text("a\r\n\r\n\r\n\r\nb\rc"), "a\n\nb\nc");
        assert_eq!(to_plain_text("<div>a</div><div></div><div></div><div>b</div>"), "a\n\nb");
    }

    #[test]
    fn test_to_html_escapes_and_wraps() {
        assert_eq!(
            to_html("Buy <milk> & eggs\n\nthen \"go\""),
            "<div>Buy &lt;milk&gt; &amp; eggs</div><div><br></div><div>then &quot;go&quot;</div>"
        );
    }

    #[test]
    fn test_to_html_then_plain_text() {
        let text = "Line <1> & more\nLine 2";
        assert_eq!(to_plain_text(&to_html(text)), text);
    }

    proptest! {
        #[test]
        fn prop_plain_text_unchanged(s in "[a-zA-Z0-9 .,!?'\"\t\n-]{0,64}") {
            prop_assume!(!s.contains("\n\n\n"));
            prop_assert_eq!(to_plain_text(&s), s.trim());
        }

        #[test]
        fn prop_idempotent_on_markup(
            parts in proptest::collection::vec(
                prop_oneof![
                    Just("<div>".to_string()),
                    Just("</div>".to_string()),
                    Just("<br>".to_string()),
                    Just("<p>".to_string()),
                    Just("</p>".to_string()),
                    Just("<b>".to_string()),
                    Just("</b>".to_string()),
                    Just("&amp;".to_string()),
                    Just("&nbsp;".to_string()),
                    Just("&quot;".to_string()),
                    // no 'a': "&" followed by "amp" would decode again
                    "[b-z ]{1,8}",
                ],
                0..24,
            )
        ) {
            let once = to_plain_text(&parts.concat());
            prop_assert_eq!(to_plain_text(&once), once.clone());
        }
    }
}
