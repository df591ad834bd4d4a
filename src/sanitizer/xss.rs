//! Cross-site scripting sanitizer
//!
//! Encoded payloads are decoded first (percent-encoding, possibly nested, and
//! `\uXXXX` escapes) so the entity pass neutralizes them as well. Dangerous
//! URI schemes, event handler attributes and CSS expressions are rewritten to
//! inert markers before the five HTML-significant characters are encoded.

use super::patterns::{merge_matches, PatternSet};
use super::{require_text, Detection, Payload, SanitizeOptions, Sanitizer};
use crate::config::SanitizerConfig;
use crate::error::SanitizeError;
use crate::taint::{SanitizerKind, Taint};
use percent_encoding::percent_decode_str;
use regex::{Captures, Regex};
use std::sync::LazyLock;

static PATTERNS: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::compile(&[
        ("script_tag", r"(?i)<\s*script"),
        ("javascript_uri", r"(?i)javascript\s*:"),
        ("event_handler", r#"(?i)[\s/"'<]on[a-z]+\s*="#),
        ("iframe_tag", r"(?i)<\s*iframe"),
        ("data_uri_html", r"(?i)data\s*:\s*text/html"),
        ("css_expression", r"(?i)expression\s*\("),
        ("encoded_lt", r"(?i)%3c"),
        ("html_hex_encoded_lt", r"(?i)&#(x0*3c|0*60);?"),
        ("unicode_escape_lt", r"(?i)\\u003c"),
    ])
});

static UNICODE_ESCAPE: LazyLock<Regex> = LazyLock::new(|| regex_or_panic(r"\\u([0-9a-fA-F]{4})"));
static JAVASCRIPT_URI: LazyLock<Regex> = LazyLock::new(|| regex_or_panic(r"(?i)javascript\s*:"));
static EVENT_HANDLER: LazyLock<Regex> =
    LazyLock::new(|| regex_or_panic(r#"(?i)([\s/"'])on([a-z]+)\s*="#));
static CSS_EXPRESSION: LazyLock<Regex> = LazyLock::new(|| regex_or_panic(r"(?i)expression\s*\("));

fn regex_or_panic(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("built-in pattern is invalid: {}", e))
}

/// HTML-entity-encode `& < > " '`. The ampersand goes first so the
/// entities produced for the other characters are not encoded twice.
pub fn html_entity_encode(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Replace `\uXXXX` escapes with the character they denote.
fn decode_unicode_escapes(input: &str) -> String {
    UNICODE_ESCAPE
        .replace_all(input, |caps: &Captures| {
            u32::from_str_radix(&caps[1], 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Peel encoding layers until the text stops changing or `rounds` is reached.
fn decode_layers(input: &str, rounds: usize) -> String {
    let mut current = input.to_string();
    for _ in 0..rounds {
        // a layer that decodes to invalid UTF-8 stays percent-encoded
        let percent_decoded = match percent_decode_str(&current).decode_utf8() {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => current.clone(),
        };
        let decoded = decode_unicode_escapes(&percent_decoded);
        if decoded == current {
            break;
        }
        current = decoded;
    }
    current
}

/// Rewrite script-capable constructs to inert markers.
fn neutralize(input: &str) -> String {
    let text = JAVASCRIPT_URI.replace_all(input, "blocked:");
    let text = EVENT_HANDLER.replace_all(&text, "${1}data-blocked-on${2}=");
    CSS_EXPRESSION
        .replace_all(&text, "blocked-expression(")
        .into_owned()
}

/// Sanitizer for values rendered into HTML.
#[derive(Debug, Clone)]
pub struct XssSanitizer {
    decode_rounds: usize,
}

impl XssSanitizer {
    /// Create a sanitizer from configuration
    pub fn new(config: &SanitizerConfig) -> Self {
        Self {
            decode_rounds: config.xss_decode_rounds,
        }
    }

    /// Decode, neutralize and entity-encode a string.
    pub fn sanitize_str(&self, input: &str) -> String {
        let decoded = decode_layers(input, self.decode_rounds);
        html_entity_encode(&neutralize(&decoded))
    }
}

impl Default for XssSanitizer {
    fn default() -> Self {
        Self::new(&SanitizerConfig::default())
    }
}

impl Sanitizer for XssSanitizer {
    fn kind(&self) -> SanitizerKind {
        SanitizerKind::Xss
    }

    fn sanitize(
        &self,
        value: &Payload,
        taint: &Taint,
        _opts: &SanitizeOptions,
    ) -> Result<(Payload, Taint), SanitizeError> {
        let text = require_text(self.kind(), value)?;
        Ok((
            Payload::Text(self.sanitize_str(text)),
            taint.mark_sanitized(self.kind()),
        ))
    }

    fn detect(&self, value: &Payload) -> Detection {
        let Some(text) = value.as_text() else {
            return Detection::Safe(1.0);
        };

        let mut matches = PATTERNS.matches(text);
        let decoded = decode_layers(text, self.decode_rounds);
        if decoded != text {
            merge_matches(&mut matches, PATTERNS.matches(&decoded));
        }
        Detection::from_matches(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitize(input: &str) -> String {
        let (value, _) = XssSanitizer::default()
            .sanitize(&input.into(), &Taint::unknown(), &SanitizeOptions::default())
            .unwrap();
        value.as_text().unwrap().to_string()
    }

    #[test]
    fn test_patterns_compile() {
        assert_eq!(PATTERNS.names().len(), 9);
    }

    #[test]
    fn test_html_entity_encode() {
        assert_eq!(html_entity_encode("&<>\"'"), "&amp;&lt;&gt;&quot;&#39;");
        assert_eq!(html_entity_encode("plain"), "plain");
    }

    #[test]
    fn test_script_tag_encoded() {
        assert_eq!(
            sanitize("<script>alert(1)</script>"),
            "&lt;script&gt;alert(1)&lt;/script&gt;"
        );
    }

    #[test]
    fn test_percent_encoded_payload() {
        assert_eq!(sanitize("%3Cscript%3E"), "&lt;script&gt;");
    }

    #[test]
    fn test_double_encoded_payload() {
        assert_eq!(sanitize("%253Cscript%253E"), "&lt;script&gt;");
    }

    #[test]
    fn test_invalid_utf8_layer_left_encoded() {
        let output = sanitize("%3Cb%3E%FF");
        assert_eq!(output, "%3Cb%3E%FF");
        assert!(!output.contains('\u{FFFD}'));
    }

    #[test]
    fn test_unicode_escaped_payload() {
        assert_eq!(sanitize("\\u003cscript\\u003e"), "&lt;script&gt;");
    }

    #[test]
    fn test_javascript_uri_blocked() {
        assert_eq!(
            sanitize("<a href=\"javascript:alert(1)\">x</a>"),
            "&lt;a href=&quot;blocked:alert(1)&quot;&gt;x&lt;/a&gt;"
        );
        assert_eq!(sanitize("JavaScript :void(0)"), "blocked:void(0)");
    }

    #[test]
    fn test_event_handler_blocked() {
        assert_eq!(
            sanitize("<img src=x onerror=alert(1)>"),
            "&lt;img src=x data-blocked-onerror=alert(1)&gt;"
        );
    }

    #[test]
    fn test_css_expression_blocked() {
        assert_eq!(
            sanitize("width: expression(alert(1))"),
            "width: blocked-expression(alert(1))"
        );
    }

    #[test]
    fn test_sets_bit_and_keeps_existing() {
        let taint = Taint::unknown().mark_sanitized(SanitizerKind::Sqli);
        let (_, updated) = XssSanitizer::default()
            .sanitize(&"x".into(), &taint, &SanitizeOptions::default())
            .unwrap();
        assert_eq!(updated.sanitizations.bits(), 0x03);
    }

    #[test]
    fn test_detect() {
        let sanitizer = XssSanitizer::default();
        assert_eq!(sanitizer.detect(&"hello world".into()), Detection::Safe(1.0));

        let detection = sanitizer.detect(&"<script>x</script>".into());
        assert_eq!(detection.patterns(), &["script_tag".to_string()]);

        let detection = sanitizer.detect(&"<img src=x onerror=alert(1)>".into());
        assert!(detection.patterns().contains(&"event_handler".to_string()));

        let detection = sanitizer.detect(&"%3Ciframe src=x%3E".into());
        assert!(detection.patterns().contains(&"encoded_lt".to_string()));
        assert!(detection.patterns().contains(&"iframe_tag".to_string()));

        let detection = sanitizer.detect(&"&#x3c;b&#60;".into());
        assert!(detection.patterns().contains(&"html_hex_encoded_lt".to_string()));
    }

    #[test]
    fn test_detect_non_text_is_safe() {
        assert_eq!(
            XssSanitizer::default().detect(&Payload::Bytes(b"<script>".to_vec())),
            Detection::Safe(1.0)
        );
    }
}
