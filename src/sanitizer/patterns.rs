//! Named regex pattern sets shared by the detectors

use regex::Regex;

/// A compiled detection pattern with its reported name.
struct NamedPattern {
    name: &'static str,
    regex: Regex,
}

/// An ordered set of detection patterns.
///
/// Patterns are built-in constants; a pattern that fails to compile is a
/// programming error caught by the unit tests of each detector.
pub(crate) struct PatternSet {
    patterns: Vec<NamedPattern>,
}

impl PatternSet {
    /// Compile `(name, pattern)` pairs in order.
    pub(crate) fn compile(defs: &[(&'static str, &str)]) -> Self {
        let patterns = defs
            .iter()
            .map(|(name, pattern)| NamedPattern {
                name,
                regex: Regex::new(pattern)
                    .unwrap_or_else(|e| panic!("built-in pattern '{}' is invalid: {}", name, e)),
            })
            .collect();
        Self { patterns }
    }

    /// Names of every pattern that matches `text`, in definition order.
    pub(crate) fn matches(&self, text: &str) -> Vec<String> {
        self.patterns
            .iter()
            .filter(|p| p.regex.is_match(text))
            .map(|p| p.name.to_string())
            .collect()
    }

    /// Names of all patterns in the set.
    #[cfg(test)]
    pub(crate) fn names(&self) -> Vec<&'static str> {
        self.patterns.iter().map(|p| p.name).collect()
    }
}

/// Merge `extra` into `matches`, keeping first-seen order and dropping duplicates.
pub(crate) fn merge_matches(matches: &mut Vec<String>, extra: Vec<String>) {
    for name in extra {
        if !matches.contains(&name) {
            matches.push(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_in_definition_order() {
        let set = PatternSet::compile(&[("digits", r"\d+"), ("letters", r"[a-z]+")]);
        assert_eq!(set.matches("abc 123"), vec!["digits", "letters"]);
        assert!(set.matches("!!!").is_empty());
        assert_eq!(set.names(), vec!["digits", "letters"]);
    }

    #[test]
    fn test_merge_matches_dedupes() {
        let mut matches = vec!["a".to_string()];
        merge_matches(&mut matches, vec!["b".to_string(), "a".to_string()]);
        assert_eq!(matches, vec!["a", "b"]);
    }
}
