use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use super::text::{self, TextFormat};

/// One translatable string inside a [`Component`](super::Component).
///
/// `text == None` with `deleted == true` is a tombstone: the string existed
/// and was removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct LangString {
    pub id: String,
    pub text: Option<String>,
    pub timestamp: i64,
    pub deleted: bool,
    pub no_cleaning: bool,
}

impl LangString {
    pub fn new(id: impl Into<String>, text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            text: Some(text.into()),
            timestamp,
            deleted: false,
            no_cleaning: false,
        }
    }

    /// A deletion record for `id`.
    pub fn tombstone(id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            text: None,
            timestamp,
            deleted: true,
            no_cleaning: false,
        }
    }

    pub fn with_no_cleaning(mut self, no_cleaning: bool) -> Self {
        self.no_cleaning = no_cleaning;
        self
    }

    /// Text as seen by readers; tombstones have none.
    pub fn visible_text(&self) -> Option<&str> {
        if self.deleted {
            None
        } else {
            self.text.as_deref()
        }
    }

    /// Whether the two strings carry a different value.
    ///
    /// Two deleted strings never differ; a deleted and a live one always do.
    /// Texts are compared trimmed unless either side opts out of cleaning.
    pub fn differ(&self, other: &LangString) -> bool {
        match (self.visible_text(), other.visible_text()) {
            (None, None) => false,
            (None, Some(_)) | (Some(_), None) => true,
            (Some(a), Some(b)) => {
                if self.no_cleaning || other.no_cleaning {
                    a != b
                } else {
                    a.trim() != b.trim()
                }
            }
        }
    }

    pub fn clean_text(&mut self, format: TextFormat) {
        if let Some(current) = self.text.as_deref() {
            let cleaned = if self.no_cleaning {
                text::strip_control_chars(current)
            } else {
                text::clean_text(current, format)
            };
            self.text = Some(cleaned);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deleted_strings_never_differ() {
        let a = LangString::tombstone("x", 1);
        let mut b = LangString::new("x", "leftover", 2);
        b.deleted = true;
        assert!(!a.differ(&b));
    }

    #[test]
    fn deleted_and_live_differ() {
        let a = LangString::tombstone("x", 1);
        let b = LangString::new("x", "Hi", 2);
        assert!(a.differ(&b));
        assert!(b.differ(&a));
    }

    #[test]
    fn comparison_is_trimmed_unless_no_cleaning() {
        let a = LangString::new("x", "Hi ", 1);
        let b = LangString::new("x", " Hi", 2);
        assert!(!a.differ(&b));
        let raw = b.clone().with_no_cleaning(true);
        assert!(a.differ(&raw));
    }

    #[test]
    fn clean_text_respects_no_cleaning() {
        let mut cleaned = LangString::new("x", "  a\n\n\n\nb\u{1} ", 1);
        cleaned.clean_text(TextFormat::Modern);
        assert_eq!(cleaned.text.as_deref(), Some("a\n\nb"));

        let mut raw = LangString::new("x", "  a\n\n\n\nb\u{1} ", 1).with_no_cleaning(true);
        raw.clean_text(TextFormat::Modern);
        assert_eq!(raw.text.as_deref(), Some("  a\n\n\n\nb "));
    }
}
