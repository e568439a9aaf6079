//! Normalisation of string texts before they enter the repository.

use std::sync::LazyLock;

use regex::Regex;

use crate::version::Version;

/// Syntax generation of the language packs a text belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    /// Branches up to 1.9.
    Legacy = 1,
    /// Branches from 2.0 on.
    Modern = 2,
}

impl TextFormat {
    pub fn for_version(version: &Version) -> Self {
        if version.is_legacy_format() {
            TextFormat::Legacy
        } else {
            TextFormat::Modern
        }
    }
}

// VT, FF, lone CR, NEL, LINE SEPARATOR, PARAGRAPH SEPARATOR
static LINE_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x0B\x0C\r\x{85}\x{2028}\x{2029}]").expect("valid regex"));

// C0 controls except TAB and LF, DEL, C1 controls except NEL, ZWSP, BOM, U+FFFD
static CONTROL_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x00-\x08\x0E-\x1F\x7F\x{80}-\x{84}\x{86}-\x{9F}\x{200B}\x{FEFF}\x{FFFD}]+")
        .expect("valid regex")
});

static TRAILING_BLANKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+\n").expect("valid regex"));

static MODERN_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

static LEGACY_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{4,}").expect("valid regex"));

/// Full clean-up: unify line breaks, drop control characters, strip
/// trailing blanks on every line and collapse runs of empty lines.
///
/// Modern texts keep at most one empty line in a row, legacy texts two.
pub fn clean_text(text: &str, format: TextFormat) -> String {
    let unified = text.trim().replace("\r\n", "\n");
    let unified = LINE_BREAKS.replace_all(&unified, "\n");
    let stripped = CONTROL_CHARS.replace_all(&unified, "");
    let stripped = TRAILING_BLANKS.replace_all(&stripped, "\n");
    let collapsed = match format {
        TextFormat::Modern => MODERN_BLANK_LINES.replace_all(&stripped, "\n\n"),
        TextFormat::Legacy => LEGACY_BLANK_LINES.replace_all(&stripped, "\n\n\n"),
    };
    collapsed.trim().to_string()
}

/// Minimal pass used for strings flagged `no_cleaning`.
pub fn strip_control_chars(text: &str) -> String {
    CONTROL_CHARS.replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_control_characters() {
        assert_eq!(clean_text("Hi\u{0}there\u{7}", TextFormat::Modern), "Hithere");
        assert_eq!(clean_text("\u{FEFF}Hello", TextFormat::Modern), "Hello");
        assert_eq!(clean_text("tab\tkept", TextFormat::Modern), "tab\tkept");
    }

    #[test]
    fn unifies_line_breaks() {
        assert_eq!(clean_text("a\r\nb\rc", TextFormat::Modern), "a\nb\nc");
        assert_eq!(clean_text("a\u{2028}b", TextFormat::Modern), "a\nb");
        assert_eq!(clean_text("line  \nnext", TextFormat::Modern), "line\nnext");
    }

    #[test]
    fn collapses_blank_lines_per_format() {
        let text = "one\n\n\n\n\ntwo";
        assert_eq!(clean_text(text, TextFormat::Modern), "one\n\ntwo");
        assert_eq!(clean_text(text, TextFormat::Legacy), "one\n\n\ntwo");
        assert_eq!(clean_text("one\n\n\ntwo", TextFormat::Legacy), "one\n\n\ntwo");
    }

    #[test]
    fn minimal_pass_keeps_layout() {
        assert_eq!(strip_control_chars("  a\n\n\n\nb\u{1}  "), "  a\n\n\n\nb  ");
    }
}
