//! Shell command injection sanitizer
//!
//! Wraps the whole value in POSIX single quotes. Inside single quotes the
//! shell interprets nothing, so pipes, semicolons, `$()` and backticks become
//! literal characters. An embedded quote is written as `'\''` (close quote,
//! escaped quote, reopen quote).

use super::patterns::PatternSet;
use super::{require_text, Detection, Payload, SanitizeOptions, Sanitizer};
use crate::error::SanitizeError;
use crate::taint::{SanitizerKind, Taint};
use std::sync::LazyLock;

static PATTERNS: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::compile(&[
        ("command_chaining", r"[;|]|&&"),
        ("command_substitution_dollar", r"\$\("),
        ("command_substitution_backtick", r"`"),
        ("null_byte", r"\x00"),
        ("newline_injection", r"[\r\n]"),
        (
            "dangerous_command",
            r"(?i)\b(curl|wget|nc|ncat|netcat|telnet|mkfs|sudo|chmod|chown)\b|\brm\s+-[a-z]*[rf]|\bdd\s+if=",
        ),
        ("redirection", r"[<>]"),
    ])
});

/// Quote `input` as a single POSIX shell word.
pub fn shell_quote(input: &str) -> String {
    format!("'{}'", input.replace('\'', "'\\''"))
}

/// Sanitizer for values interpolated into shell command lines.
#[derive(Debug, Clone, Default)]
pub struct CommandInjectionSanitizer;

impl CommandInjectionSanitizer {
    /// Create a new command injection sanitizer
    pub fn new() -> Self {
        Self
    }
}

impl Sanitizer for CommandInjectionSanitizer {
    fn kind(&self) -> SanitizerKind {
        SanitizerKind::CommandInjection
    }

    fn sanitize(
        &self,
        value: &Payload,
        taint: &Taint,
        _opts: &SanitizeOptions,
    ) -> Result<(Payload, Taint), SanitizeError> {
        let text = require_text(self.kind(), value)?;
        if text.contains('\0') {
            tracing::warn!("Null byte in shell argument rejected");
            return Err(SanitizeError::NullByteInInput);
        }
        Ok((Payload::Text(shell_quote(text)), taint.mark_sanitized(self.kind())))
    }

    fn detect(&self, value: &Payload) -> Detection {
        match value.as_text() {
            Some(text) => Detection::from_matches(PATTERNS.matches(text)),
            None => Detection::Safe(1.0),
        }
    }
}
