//! User-defined text replacements
//!
//! Replacements are case-insensitive regex substitutions applied in their
//! configured order. They run after filtering and speaker announcement, so a
//! replacement can also change how a speaker's name is pronounced.

use log::{debug, warn};
use regex::{Regex, RegexBuilder};

/// One configured substitution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextReplacement {
    /// Pattern searched for in the text
    pub match_pattern: String,
    /// Text substituted for each match (`$1` style group references allowed)
    pub replacement: String,
}

impl TextReplacement {
    pub fn new(match_pattern: &str, replacement: &str) -> Self {
        Self {
            match_pattern: match_pattern.to_string(),
            replacement: replacement.to_string(),
        }
    }
}

/// Ordered, precompiled replacement list
#[derive(Debug, Default)]
pub struct ReplacementEngine {
    rules: Vec<(Regex, String)>,
}

impl ReplacementEngine {
    /// Compile `replacements` in order
    ///
    /// Entries with an empty pattern are pruned. A pattern that fails to
    /// compile is logged and skipped.
    pub fn new(replacements: &[TextReplacement]) -> Self {
        let mut rules = Vec::with_capacity(replacements.len());

        for r in replacements {
            if r.match_pattern.is_empty() {
                continue;
            }

            match RegexBuilder::new(&r.match_pattern)
                .case_insensitive(true)
                .build()
            {
                Ok(re) => rules.push((re, r.replacement.clone())),
                Err(e) => warn!("Ignoring malformed replacement {:?}: {}", r.match_pattern, e),
            }
        }

        debug!("Compiled {} text replacements", rules.len());
        Self { rules }
    }

    /// Apply every replacement to `text`, in order
    pub fn apply(&self, text: &str) -> String {
        let mut result = text.to_string();
        for (re, replacement) in &self.rules {
            result = re.replace_all(&result, replacement.as_str()).into_owned();
        }
        result
    }

    /// Number of active replacements
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_replacement() {
        let engine = ReplacementEngine::new(&[TextReplacement::new("ul'dah", "uldaahr")]);
        assert_eq!(engine.apply("Welcome to Ul'dah"), "Welcome to uldaahr");
    }

    #[test]
    fn test_order_is_preserved() {
        let engine = ReplacementEngine::new(&[
            TextReplacement::new("cat", "dog"),
            TextReplacement::new("dog", "wolf"),
        ]);
        assert_eq!(engine.apply("cat"), "wolf");

        let reversed = ReplacementEngine::new(&[
            TextReplacement::new("dog", "wolf"),
            TextReplacement::new("cat", "dog"),
        ]);
        assert_eq!(reversed.apply("cat"), "dog");
    }

    #[test]
    fn test_empty_and_malformed_patterns_pruned() {
        let engine = ReplacementEngine::new(&[
            TextReplacement::new("", "never"),
            TextReplacement::new("(unclosed", "x"),
            TextReplacement::new("lb", "pounds"),
        ]);
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.apply("5 LB"), "5 pounds");
    }

    #[test]
    fn test_group_references() {
        let engine = ReplacementEngine::new(&[TextReplacement::new(r"(\d+)k", "$1 thousand")]);
        assert_eq!(engine.apply("10k gil"), "10 thousand gil");
    }
}
