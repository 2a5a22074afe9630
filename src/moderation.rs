//! Content moderation
//!
//! Flags messages containing a banned phrase, compared case-insensitively.

/// Phrase banned by default
pub const DEFAULT_BANNED_PHRASE: &str = "i hate professor";

/// Case-insensitive substring filter
#[derive(Debug, Clone)]
pub struct ModerationFilter {
    phrase: String,
}

impl ModerationFilter {
    pub fn new(phrase: &str) -> Self {
        Self {
            phrase: phrase.to_lowercase(),
        }
    }

    /// Whether `text` must get its sender removed
    pub fn is_violation(&self, text: &str) -> bool {
        !self.phrase.is_empty() && text.to_lowercase().contains(&self.phrase)
    }
}

impl Default for ModerationFilter {
    fn default() -> Self {
        Self::new(DEFAULT_BANNED_PHRASE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_any_case() {
        let filter = ModerationFilter::default();
        assert!(filter.is_violation("I HATE PROFESSOR"));
        assert!(filter.is_violation("well, i Hate Professor x"));
        assert!(!filter.is_violation("i hate prof, i like the professor"));
        assert!(!filter.is_violation(""));
    }

    #[test]
    fn test_empty_phrase_disables_filter() {
        let filter = ModerationFilter::new("");
        assert!(!filter.is_violation("anything"));
    }
}
