//! Include/exclude triggers deciding whether a line is spoken
//!
//! A line is rejected when it matches any exclude trigger. When include
//! triggers exist, the line must also match at least one of them.
//! Triggers with empty text never match.

use log::warn;
use regex::Regex;

/// A user-defined matching rule
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Trigger {
    /// Literal substring, or regex when `is_regex` is set
    pub pattern: String,
    pub is_regex: bool,
}

impl Trigger {
    pub fn literal(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            is_regex: false,
        }
    }

    pub fn regex(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            is_regex: true,
        }
    }
}

/// Compiled form of a trigger
#[derive(Debug)]
enum Matcher {
    Literal(String),
    Pattern(Regex),
    /// Empty text or a pattern that failed to compile
    Never,
}

impl Matcher {
    fn compile(trigger: &Trigger) -> Self {
        if trigger.pattern.is_empty() {
            return Matcher::Never;
        }
        if !trigger.is_regex {
            return Matcher::Literal(trigger.pattern.clone());
        }
        match Regex::new(&trigger.pattern) {
            Ok(re) => Matcher::Pattern(re),
            Err(e) => {
                warn!(
                    "Trigger pattern {:?} is malformed and will never match: {}",
                    trigger.pattern, e
                );
                Matcher::Never
            }
        }
    }

    fn matches(&self, text: &str) -> bool {
        match self {
            Matcher::Literal(s) => text.contains(s.as_str()),
            Matcher::Pattern(re) => re.is_match(text),
            Matcher::Never => false,
        }
    }
}

/// Why a line was rejected by the trigger filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Matched an exclude trigger
    Excluded,
    /// Include triggers exist and none matched
    NotIncluded,
}

/// Evaluates exclude ("bad") and include ("good") triggers
#[derive(Debug, Default)]
pub struct TriggerFilter {
    exclude: Vec<Matcher>,
    include: Vec<Matcher>,
}

impl TriggerFilter {
    /// Compile both trigger sets
    ///
    /// Malformed patterns are logged once here and then treated as
    /// non-matching for the lifetime of the filter.
    pub fn new(exclude: &[Trigger], include: &[Trigger]) -> Self {
        Self {
            exclude: exclude.iter().map(Matcher::compile).collect(),
            include: include.iter().map(Matcher::compile).collect(),
        }
    }

    /// Does `text` match any exclude trigger?
    pub fn is_excluded(&self, text: &str) -> bool {
        self.exclude.iter().any(|m| m.matches(text))
    }

    /// Does `text` satisfy the include set?
    ///
    /// An empty include set admits everything. Include triggers that can
    /// never match still count toward the set being non-empty.
    pub fn is_included(&self, text: &str) -> bool {
        self.include.is_empty() || self.include.iter().any(|m| m.matches(text))
    }

    /// Apply the whole policy to `text`
    pub fn check(&self, text: &str) -> Result<(), Rejection> {
        if self.is_excluded(text) {
            return Err(Rejection::Excluded);
        }
        if !self.is_included(text) {
            return Err(Rejection::NotIncluded);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclude_literal() {
        let filter = TriggerFilter::new(&[Trigger::literal("test")], &[]);
        assert_eq!(filter.check("It's a 'test'..."), Err(Rejection::Excluded));
        assert_eq!(filter.check("nothing here"), Ok(()));
    }

    #[test]
    fn test_literal_is_case_sensitive_substring() {
        let filter = TriggerFilter::new(&[Trigger::literal("Gil")], &[]);
        assert!(filter.is_excluded("You obtain 10 Gil."));
        assert!(!filter.is_excluded("you obtain 10 gil."));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let filter = TriggerFilter::new(&[Trigger::literal("spam")], &[Trigger::literal("spam")]);
        assert_eq!(filter.check("spam spam"), Err(Rejection::Excluded));
    }

    #[test]
    fn test_include_required_when_present() {
        let filter = TriggerFilter::new(&[], &[Trigger::regex(r"^\[Party\]")]);
        assert_eq!(filter.check("[Party] pull now"), Ok(()));
        assert_eq!(filter.check("hello [Party]"), Err(Rejection::NotIncluded));
    }

    #[test]
    fn test_regex_is_search_not_full_match() {
        let filter = TriggerFilter::new(&[Trigger::regex(r"\d+ gil")], &[]);
        assert!(filter.is_excluded("You sold it for 300 gil today"));
    }

    #[test]
    fn test_empty_triggers_never_match() {
        let filter = TriggerFilter::new(&[Trigger::literal("")], &[]);
        assert_eq!(filter.check("anything"), Ok(()));

        // An empty include trigger still makes the include set non-empty
        let filter = TriggerFilter::new(&[], &[Trigger::literal("")]);
        assert_eq!(filter.check("anything"), Err(Rejection::NotIncluded));
    }

    #[test]
    fn test_malformed_pattern_does_not_match() {
        let filter = TriggerFilter::new(&[Trigger::regex("(unclosed")], &[]);
        assert_eq!(filter.check("(unclosed"), Ok(()));
    }
}
