//! SQL sanitizer
//!
//! Values bound as query parameters are already safe from injection; what
//! remains dangerous are LIKE wildcards inside a bound pattern and dynamic
//! identifiers (column / table names) which cannot be bound at all.

use super::patterns::PatternSet;
use super::{require_text, Detection, Payload, SanitizeOptions, Sanitizer};
use crate::error::SanitizeError;
use crate::taint::{SanitizerKind, Taint};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static PATTERNS: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::compile(&[
        ("sql_comment_dash", r"--"),
        ("sql_comment_block", r"/\*"),
        ("union_select", r"(?i)\bunion\b(\s+all)?\s+select\b"),
        (
            "stacked_query",
            r"(?i);\s*(select|insert|update|delete|drop|create|alter|truncate|exec)\b",
        ),
        ("tautology", r"(?i)\bor\s+\d+\s*=\s*\d+"),
        ("string_tautology", r"(?i)'\s*or\s*'[^']*'\s*=\s*'"),
        ("extended_stored_proc", r"(?i)\bxp_\w+"),
        ("time_based", r"(?i)\b(sleep|benchmark|pg_sleep)\s*\(|\bwaitfor\s+delay\b"),
        ("file_write", r"(?i)\binto\s+(out|dump)file\b"),
    ])
});

/// How the SQL sanitizer treats its input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlMode {
    /// Escape LIKE wildcards so the value matches literally
    #[default]
    LikePattern,
    /// Accept only identifiers from an allow-list
    Identifier,
}

/// Escape `%`, `_` and `\` with a leading backslash.
///
/// Escaping happens in a single pass, so the escape character itself is
/// escaped and the result is unambiguous: `%_\%` becomes `\%\_\\\%`.
pub fn escape_like_pattern(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Sanitizer for values used in SQL statements.
#[derive(Debug, Clone, Default)]
pub struct SqlSanitizer;

impl SqlSanitizer {
    /// Create a new SQL sanitizer
    pub fn new() -> Self {
        Self
    }

    fn check_identifier(&self, input: &str, opts: &SanitizeOptions) -> Result<(), SanitizeError> {
        let allowed = opts
            .allowed_identifiers
            .as_ref()
            .ok_or(SanitizeError::MissingOption("allowed_identifiers"))?;

        if allowed.iter().any(|identifier| identifier == input) {
            Ok(())
        } else {
            tracing::warn!(identifier = input, "SQL identifier rejected");
            Err(SanitizeError::IdentifierNotAllowed(input.to_string()))
        }
    }
}

impl Sanitizer for SqlSanitizer {
    fn kind(&self) -> SanitizerKind {
        SanitizerKind::Sqli
    }

    fn sanitize(
        &self,
        value: &Payload,
        taint: &Taint,
        opts: &SanitizeOptions,
    ) -> Result<(Payload, Taint), SanitizeError> {
        let text = require_text(self.kind(), value)?;
        let sanitized = match opts.sql_mode.unwrap_or_default() {
            SqlMode::LikePattern => escape_like_pattern(text),
            SqlMode::Identifier => {
                self.check_identifier(text, opts)?;
                text.to_string()
            }
        };
        Ok((Payload::Text(sanitized), taint.mark_sanitized(self.kind())))
    }

    fn detect(&self, value: &Payload) -> Detection {
        match value.as_text() {
            Some(text) => Detection::from_matches(PATTERNS.matches(text)),
            None => Detection::Safe(1.0),
        }
    }
}
