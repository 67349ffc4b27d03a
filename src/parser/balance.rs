use std::sync::LazyLock;

use regex::Regex;

static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(/?)([A-Za-z_][\w:.\-]*)[^<>]*?(/?)>").unwrap());

/// Tags that carry no textual structure and may appear unpaired.
const IGNORED: &[&str] = &["comment", "figure"];

/// Whether every opening tag in `markup` is closed in order. Attributes,
/// self-closing tags, comments and figure tags do not count.
pub fn is_balanced(markup: &str) -> bool {
    let markup = COMMENT_RE.replace_all(markup, "");
    let mut stack: Vec<&str> = Vec::new();

    for caps in TAG_RE.captures_iter(&markup) {
        let closing = !caps[1].is_empty();
        let self_closing = !caps[3].is_empty();
        let name = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        if self_closing || IGNORED.contains(&name) {
            continue;
        }
        if !closing {
            stack.push(name);
        } else if stack.pop() != Some(name) {
            return false;
        }
    }
    stack.is_empty()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_pairs_balance() {
        assert!(is_balanced(r#"<div id="a"><ab>x <m>gold</m> <del>y</del></ab></div>"#));
        assert!(is_balanced(""));
    }

    #[test]
    fn crossed_or_open_tags_do_not() {
        assert!(!is_balanced("<ab><m>x</ab></m>"));
        assert!(!is_balanced("<ab>x"));
        assert!(!is_balanced("x</ab>"));
    }

    #[test]
    fn ignored_constructs() {
        assert!(is_balanced(r#"<ab>x<ill/><figure size="large"> y <comment rid="c_1"/></ab>"#));
        assert!(is_balanced("<ab>x <!-- <m> stray --> y</ab>"));
        assert!(is_balanced(r#"<ab render="bold" margin="left-top">x</ab>"#));
    }

    #[test]
    fn fragments_joined_by_paragraph_break() {
        let joined = format!("{}\n\n{}", r#"<div id="x"><ab>a</ab></div>"#, r#"<div id="x" continues="yes"><ab>b</ab></div>"#);
        assert!(is_balanced(&joined));
    }
}
