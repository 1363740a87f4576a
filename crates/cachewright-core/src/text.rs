//! Plain-text to HTML helpers shared by descriptions and log comments

use regex::Regex;
use std::sync::LazyLock;

static NEWLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r\n|\n\r|\n|\r").expect("static regex"));

static LINE_BREAKS_AND_TABS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n\t]+").expect("static regex"));

/// Escape the HTML special characters `& < > "`
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Normalize `\r\n` and lone `\r` to `\n`
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Insert `<br />` before every newline, keeping the newline sequence itself
pub fn nl2br(text: &str) -> String {
    NEWLINE.replace_all(text, "<br />$0").into_owned()
}

/// Collapse runs of line breaks and tabs into a single space and trim
pub fn collapse_to_line(text: &str) -> String {
    LINE_BREAKS_AND_TABS.replace_all(text, " ").trim().to_string()
}

/// Keep runs of spaces visible once rendered as HTML
pub fn preserve_double_spaces(html: &str) -> String {
    // two passes, so that three or more spaces are covered as well
    html.replace("  ", "&nbsp; ").replace("  ", "&nbsp; ")
}
