//! Log injection sanitizer
//!
//! Prevents forged log entries and terminal manipulation. Carriage returns
//! become a single space (deleting them would glue tokens together), ANSI
//! escape sequences and control characters other than tab and newline are
//! removed, and the result is truncated to `max_length` characters.

use super::patterns::PatternSet;
use super::{require_text, Detection, Payload, SanitizeOptions, Sanitizer};
use crate::config::SanitizerConfig;
use crate::error::SanitizeError;
use crate::taint::{SanitizerKind, Taint};
use regex::Regex;
use std::sync::LazyLock;

static PATTERNS: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::compile(&[
        ("crlf_injection", r"\r\n"),
        ("cr_injection", r"\r([^\n]|$)"),
        ("ansi_escape", r"\x1b[\[\]@-Z\\-_]"),
        (
            "control_characters",
            r"[\x01-\x08\x0b\x0c\x0e-\x1a\x1c-\x1f\x7f]",
        ),
        ("null_byte", r"\x00"),
    ])
});

/// CSI, OSC and two-character escape sequences.
static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b(\[[0-?]*[ -/]*[@-~]|\][^\x07\x1b]*(\x07|\x1b\\)?|[@-Z\\-_])")
        .unwrap_or_else(|e| panic!("built-in pattern is invalid: {}", e))
});

/// Marker appended to truncated values.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Neutralize a single log value.
pub fn neutralize_log_value(input: &str, max_length: usize) -> String {
    let without_cr = input.replace("\r\n", " ").replace('\r', " ");
    let without_ansi = ANSI_ESCAPE.replace_all(&without_cr, "");
    let cleaned: String = without_ansi
        .chars()
        .filter(|c| !c.is_control() || *c == '\t' || *c == '\n')
        .collect();

    if cleaned.chars().count() > max_length {
        let mut truncated: String = cleaned.chars().take(max_length).collect();
        truncated.push_str(TRUNCATION_MARKER);
        truncated
    } else {
        cleaned
    }
}

/// Sanitizer for values written to logs.
#[derive(Debug, Clone)]
pub struct LogInjectionSanitizer {
    max_length: usize,
}

impl LogInjectionSanitizer {
    /// Create a sanitizer from configuration
    pub fn new(config: &SanitizerConfig) -> Self {
        Self {
            max_length: config.log_max_length,
        }
    }
}

impl Default for LogInjectionSanitizer {
    fn default() -> Self {
        Self::new(&SanitizerConfig::default())
    }
}

impl Sanitizer for LogInjectionSanitizer {
    fn kind(&self) -> SanitizerKind {
        SanitizerKind::LogInjection
    }

    fn sanitize(
        &self,
        value: &Payload,
        taint: &Taint,
        opts: &SanitizeOptions,
    ) -> Result<(Payload, Taint), SanitizeError> {
        let text = require_text(self.kind(), value)?;
        let sanitized = if opts.redact.unwrap_or(true) {
            neutralize_log_value(text, opts.max_length.unwrap_or(self.max_length))
        } else {
            text.to_string()
        };
        Ok((Payload::Text(sanitized), taint.mark_sanitized(self.kind())))
    }

    fn detect(&self, value: &Payload) -> Detection {
        let Some(text) = value.as_text() else {
            return Detection::Safe(1.0);
        };

        let mut matches = PATTERNS.matches(text);
        if text.chars().count() > self.max_length {
            matches.push("excessive_length".to_string());
        }
        Detection::from_matches(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitize(input: &str, opts: &SanitizeOptions) -> String {
        let (value, _) = LogInjectionSanitizer::default()
            .sanitize(&input.into(), &Taint::unknown(), opts)
            .unwrap();
        value.as_text().unwrap().to_string()
    }

    #[test]
    fn test_patterns_compile() {
        assert_eq!(PATTERNS.names().len(), 5);
    }

    #[test]
    fn test_crlf_replaced_with_space() {
        assert_eq!(
            sanitize("line1\r\nfake entry", &SanitizeOptions::default()),
            "line1 fake entry"
        );
        assert_eq!(sanitize("a\rb", &SanitizeOptions::default()), "a b");
    }

    #[test]
    fn test_keeps_tab_and_newline() {
        assert_eq!(sanitize("a\tb\nc", &SanitizeOptions::default()), "a\tb\nc");
    }

    #[test]
    fn test_strips_ansi_and_controls() {
        assert_eq!(
            sanitize("\x1b[31mred\x1b[0m", &SanitizeOptions::default()),
            "red"
        );
        assert_eq!(
            sanitize("\x1b]0;title\x07text", &SanitizeOptions::default()),
            "text"
        );
        assert_eq!(
            sanitize("a\x00b\x08c\x7fd\u{85}e", &SanitizeOptions::default()),
            "abcde"
        );
    }

    #[test]
    fn test_truncation() {
        let out = sanitize("abcdefghij", &SanitizeOptions::new().max_length(4));
        assert_eq!(out, "abcd...[truncated]");

        let out = sanitize("abcd", &SanitizeOptions::new().max_length(4));
        assert_eq!(out, "abcd");
    }

    #[test]
    fn test_default_truncation_length() {
        let long = "x".repeat(10_050);
        let out = sanitize(&long, &SanitizeOptions::default());
        assert_eq!(out.len(), 10_000 + TRUNCATION_MARKER.len());
    }

    #[test]
    fn test_redact_false_passes_through() {
        let (value, taint) = LogInjectionSanitizer::default()
            .sanitize(
                &"a\r\nb".into(),
                &Taint::unknown(),
                &SanitizeOptions::new().redact(false),
            )
            .unwrap();
        assert_eq!(value.as_text(), Some("a\r\nb"));
        assert!(taint.is_sanitized_for(SanitizerKind::LogInjection));
    }

    #[test]
    fn test_detect() {
        let sanitizer = LogInjectionSanitizer::default();
        assert!(sanitizer.detect(&"user logged in\tok\n".into()).is_safe());

        let cases = [
            ("a\r\nb", "crlf_injection"),
            ("a\rb", "cr_injection"),
            ("a\r", "cr_injection"),
            ("\x1b[2J", "ansi_escape"),
            ("a\x07b", "control_characters"),
            ("a\x00b", "null_byte"),
        ];
        for (input, expected) in cases {
            assert!(
                sanitizer.detect(&input.into()).patterns().contains(&expected.to_string()),
                "{:?} should match {}",
                input,
                expected
            );
        }

        let detection = sanitizer.detect(&"x".repeat(10_001).into());
        assert_eq!(detection.patterns(), &["excessive_length".to_string()]);
    }

    #[test]
    fn test_crlf_is_not_lone_cr() {
        let detection = LogInjectionSanitizer::default().detect(&"a\r\nb".into());
        assert!(!detection.patterns().contains(&"cr_injection".to_string()));
    }
}
