// ABOUTME: Matcher abstraction used by routes, plus the regex-backed implementation
// ABOUTME: Extraction scans every occurrence and writes named groups, last occurrence wins

use regex::Regex;

use crate::vars::VariableBag;

/// Decides whether a route applies to a piece of text and pulls arguments out of it.
///
/// Kept as a trait so non-regex matchers can be routed without touching the
/// dispatcher.
pub trait Matcher: Send + Sync {
    /// The original pattern text; its length decides route precedence
    fn pattern(&self) -> &str;

    fn is_match(&self, target: &str) -> bool;

    /// Extract named arguments from a target this matcher accepted
    fn extract(&self, target: &str) -> VariableBag;
}

/// Matcher over a compiled regular expression with optional named groups
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    pattern: String,
    regex: Regex,
}

impl RegexMatcher {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: pattern.to_string(),
            regex: Regex::new(pattern)?,
        })
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }
}

impl Matcher for RegexMatcher {
    fn pattern(&self) -> &str {
        &self.pattern
    }

    fn is_match(&self, target: &str) -> bool {
        self.regex.is_match(target)
    }

    fn extract(&self, target: &str) -> VariableBag {
        let names: Vec<&str> = self.regex.capture_names().flatten().collect();
        let mut bag = VariableBag::new();
        if names.is_empty() {
            return bag;
        }

        for caps in self.regex.captures_iter(target) {
            for name in &names {
                // Groups that did not participate keep the earlier value
                if let Some(m) = caps.name(name) {
                    bag.insert(*name, m.as_str());
                }
            }
        }

        bag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_named_group() {
        let matcher = RegexMatcher::new("^!option (?P<search>.+)").unwrap();
        let bag = matcher.extract("!option networking.firewall.enable");

        let expected: VariableBag = [("search", "networking.firewall.enable")]
            .into_iter()
            .collect();
        assert_eq!(bag, expected);
    }

    #[test]
    fn test_extract_ignores_unnamed_groups() {
        let matcher = RegexMatcher::new("^!(ping|pong)").unwrap();
        assert!(matcher.extract("!ping").is_empty());
    }

    #[test]
    fn test_extract_last_occurrence_wins() {
        let matcher = RegexMatcher::new("(?P<word>[a-z]+)=(?P<num>[0-9]+)").unwrap();
        let bag = matcher.extract("a=1 b=2 c=3");

        assert_eq!(bag.get("word"), Some("c"));
        assert_eq!(bag.get("num"), Some("3"));
        assert_eq!(bag.len(), 2);
    }

    #[test]
    fn test_extract_optional_group_absent() {
        let matcher = RegexMatcher::new("(?ms)^,(?P<strict>:p)?(?P<expr>.+)").unwrap();

        let bag = matcher.extract(",1 + 1");
        assert_eq!(bag.get("expr"), Some("1 + 1"));
        assert_eq!(bag.get("strict"), None);

        let bag = matcher.extract(",:p { a = 1; }");
        assert_eq!(bag.get("strict"), Some(":p"));
        assert_eq!(bag.get("expr"), Some(" { a = 1; }"));
    }

    #[test]
    fn test_pattern_is_preserved() {
        let matcher = RegexMatcher::new("^!wiki (?P<search>.+)").unwrap();
        assert_eq!(matcher.pattern(), "^!wiki (?P<search>.+)");
        assert!(matcher.is_match("!wiki flakes"));
        assert!(!matcher.is_match("wiki flakes"));
    }
}
