//! Removal of recording-only markup from locators.

use regex::Regex;
use std::sync::LazyLock;

/// Class the recorder adds to the element under the cursor while capturing.
pub const HIGHLIGHT_CLASS: &str = "workflow-recorder-highlight";

static HIGHLIGHT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.workflow-recorder-highlight([^\w-]|$)").expect("valid highlight regex")
});

static POSITIONAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":nth-(?:last-)?(?:child|of-type)\(").expect("valid nth regex"));

static SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid space regex"));

/// Strip the highlight class and the redundant `css=` prefix.
/// Returns `None` when nothing usable is left.
pub fn sanitize_locator(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix("css=").unwrap_or(trimmed).trim();
    for prefix in ["xpath=", "text=", "role="] {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            return (!rest.trim().is_empty()).then(|| trimmed.to_string());
        }
    }
    let cleaned = HIGHLIGHT_RE.replace_all(trimmed, "$1");
    let cleaned = SPACES_RE.replace_all(cleaned.trim(), " ");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Whether the locator depends on sibling position.
pub fn is_positional(locator: &str) -> bool {
    POSITIONAL_RE.is_match(locator)
}

/// Whitespace-normalized text, `None` if empty.
pub fn normalize_text(text: &str) -> Option<String> {
    let normalized = SPACES_RE.replace_all(text.trim(), " ");
    (!normalized.is_empty()).then(|| normalized.into_owned())
}

/// Escape a value for use inside a double-quoted attribute selector.
pub fn escape_attr(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// True for strings usable as-is after `#` or `.` in CSS.
pub fn is_css_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    let first = match chars.next() {
        Some('-') => chars.next(),
        other => other,
    };
    matches!(first, Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
