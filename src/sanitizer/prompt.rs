//! Prompt injection sanitizer
//!
//! Wraps untrusted text in delimiter tags carrying a per-call random nonce.
//! An attacker who closes the tag without knowing the nonce only produces
//! more text inside the tags. Input that trips `threshold` or more
//! injection patterns is rejected instead of wrapped.

use super::patterns::PatternSet;
use super::{require_text, Detection, Payload, SanitizeOptions, Sanitizer};
use crate::config::SanitizerConfig;
use crate::error::SanitizeError;
use crate::taint::{Confidence, SanitizerKind, Taint};
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::LazyLock;

static PATTERNS: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::compile(&[
        (
            "ignore_previous",
            r"(?i)\bignore\s+(all\s+)?(the\s+)?(previous|prior|above|earlier|preceding)\s+(instructions|prompts?|rules|directions|context)",
        ),
        (
            "disregard_above",
            r"(?i)\bdisregard\s+(all\s+)?(the\s+)?(above|previous|prior|earlier|your)\b",
        ),
        (
            "forget_instructions",
            r"(?i)\bforget\s+(all\s+)?(your\s+|the\s+|previous\s+|prior\s+)*(instructions|rules|training|guidelines)",
        ),
        ("role_override", r"(?i)\byou\s+are\s+now\b"),
        ("role_injection", r"(?im)^\s*(system|assistant|user)\s*:"),
        (
            "system_prompt_extraction",
            r"(?i)\b(reveal|show|print|repeat|output|display)\s+(me\s+)?(your|the)\s+(system\s+prompt|initial\s+prompt|hidden\s+prompt)",
        ),
        (
            "instruction_extraction",
            r"(?i)\bwhat\s+(are|were)\s+your\s+(original\s+|initial\s+)?(instructions|rules|guidelines)",
        ),
        ("jailbreak_dan", r"\bDAN\b|(?i:\bdo\s+anything\s+now\b)"),
        ("developer_mode", r"(?i)\b(developer|debug|god)\s+mode\b"),
        ("system_tag_injection", r"(?i)<\s*/?\s*system\s*>"),
        ("system_bracket_injection", r"(?i)\[\s*/?\s*(system|inst)\s*\]"),
        ("delimiter_escape", r"(?i)<\s*/\s*user_input[^>]*>"),
    ])
});

/// Generate a 16-hex-character delimiter nonce from the OS CSPRNG.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 8];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Wrap `input` in nonce-tagged delimiters.
pub fn wrap_with_nonce(input: &str, nonce: &str) -> String {
    format!("<user_input_{nonce}>{input}</user_input_{nonce}>")
}

/// Sanitizer for text sent to a language model.
#[derive(Debug, Clone)]
pub struct PromptInjectionSanitizer {
    threshold: usize,
}

impl PromptInjectionSanitizer {
    /// Create a sanitizer from configuration
    pub fn new(config: &SanitizerConfig) -> Self {
        Self {
            threshold: config.prompt_injection_threshold,
        }
    }
}

impl Default for PromptInjectionSanitizer {
    fn default() -> Self {
        Self::new(&SanitizerConfig::default())
    }
}

impl Sanitizer for PromptInjectionSanitizer {
    fn kind(&self) -> SanitizerKind {
        SanitizerKind::PromptInjection
    }

    fn sanitize(
        &self,
        value: &Payload,
        taint: &Taint,
        opts: &SanitizeOptions,
    ) -> Result<(Payload, Taint), SanitizeError> {
        let text = require_text(self.kind(), value)?;
        let threshold = opts.threshold.unwrap_or(self.threshold);

        let matches = PATTERNS.matches(text);
        if !matches.is_empty() && matches.len() >= threshold {
            tracing::warn!(
                sanitizer = self.name(),
                patterns = ?matches,
                threshold,
                "Prompt injection rejected"
            );
            return Err(SanitizeError::PromptInjectionDetected(matches));
        }

        let nonce = opts.nonce.clone().unwrap_or_else(generate_nonce);
        let mut updated = taint.mark_sanitized(self.kind());
        updated.confidence = updated.confidence.min(Confidence::Plausible);

        Ok((Payload::Text(wrap_with_nonce(text, &nonce)), updated))
    }

    fn detect(&self, value: &Payload) -> Detection {
        match value.as_text() {
            Some(text) => Detection::from_matches(PATTERNS.matches(text)),
            None => Detection::Safe(1.0),
        }
    }
}
