//! Sanitizer and detector pipeline
//!
//! Turns untrusted input into data safe for a specific sink. Every sanitizer
//! implements the same [`Sanitizer`] contract:
//!
//! - `sanitize` either fails closed or returns the transformed value plus a
//!   [`Taint`] with its own sanitization bit added (existing bits are kept)
//! - `detect` never mutates and never fails; inputs it does not apply to are
//!   `Safe(1.0)`, which is not the same as "sanitized"
//!
//! ## Architecture
//!
//! ```text
//! value + Taint → SanitizerRegistry ─┬→ [Xss]            ─┐
//!                                    ├→ [Sql]             │
//!                                    ├→ [CommandInjection]│
//!                                    ├→ [PathTraversal]   ├→ (value', Taint | bit)
//!                                    ├→ [PromptInjection] │
//!                                    ├→ [Ssrf]            │
//!                                    ├→ [LogInjection]    │
//!                                    └→ [Deserialization]─┘
//! ```

mod command;
mod deserialize;
mod etf;
mod log;
mod path;
mod patterns;
mod prompt;
mod registry;
mod sql;
mod ssrf;
mod xss;

pub use crate::taint::{sanitization_bit, SanitizerKind};
pub use command::CommandInjectionSanitizer;
pub use deserialize::{DeserializationSanitizer, DeserializeFormat};
pub use log::LogInjectionSanitizer;
pub use path::PathTraversalSanitizer;
pub use prompt::PromptInjectionSanitizer;
pub use registry::SanitizerRegistry;
pub use sql::{SqlMode, SqlSanitizer};
pub use ssrf::SsrfSanitizer;
pub use xss::XssSanitizer;

use crate::error::SanitizeError;
use crate::taint::Taint;
use std::collections::HashSet;
use std::path::PathBuf;

/// A value flowing through the sanitizer pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Text destined for a textual sink
    Text(String),
    /// Raw bytes (serialized documents, binary terms)
    Bytes(Vec<u8>),
    /// An already-decoded structured document
    Structured(serde_json::Value),
}

impl Payload {
    /// The text content, if this is a text payload
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    /// The raw bytes of a text or byte payload
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Payload::Text(text) => Some(text.as_bytes()),
            Payload::Bytes(bytes) => Some(bytes),
            Payload::Structured(_) => None,
        }
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Bytes(value)
    }
}

impl From<&[u8]> for Payload {
    fn from(value: &[u8]) -> Self {
        Payload::Bytes(value.to_vec())
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Structured(value)
    }
}

/// Outcome of scanning a value without changing it
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// Nothing matched; the score is in `0.0..=1.0`
    Safe(f64),
    /// Names of the patterns that matched
    Unsafe(Vec<String>),
}

impl Detection {
    /// Build a detection from the list of matched pattern names
    pub fn from_matches(matches: Vec<String>) -> Self {
        if matches.is_empty() {
            Detection::Safe(1.0)
        } else {
            Detection::Unsafe(matches)
        }
    }

    /// Whether no pattern matched
    pub fn is_safe(&self) -> bool {
        matches!(self, Detection::Safe(_))
    }

    /// Matched pattern names (empty when safe)
    pub fn patterns(&self) -> &[String] {
        match self {
            Detection::Safe(_) => &[],
            Detection::Unsafe(patterns) => patterns,
        }
    }
}

/// Per-call sanitizer options.
///
/// Unset fields fall back to the defaults the sanitizer was configured
/// with (see [`SanitizerConfig`](crate::config::SanitizerConfig)).
#[derive(Debug, Clone, Default)]
pub struct SanitizeOptions {
    /// SQL sanitizer mode (default: LIKE pattern escaping)
    pub sql_mode: Option<SqlMode>,
    /// Identifiers accepted in SQL identifier mode
    pub allowed_identifiers: Option<Vec<String>>,
    /// Root directory paths must stay inside
    pub allowed_root: Option<PathBuf>,
    /// Delimiter nonce for prompt wrapping (random when unset)
    pub nonce: Option<String>,
    /// Prompt injection rejection threshold
    pub threshold: Option<usize>,
    /// URL schemes allowed for outbound requests
    pub allowed_schemes: Option<Vec<String>>,
    /// Ports allowed for outbound requests
    pub allowed_ports: Option<Vec<u16>>,
    /// Allow loopback, private, link-local and metadata addresses
    pub allow_private: bool,
    /// Maximum log line length
    pub max_length: Option<usize>,
    /// Whether log sanitization transforms the value (default: true)
    pub redact: Option<bool>,
    /// Maximum nesting depth for deserialization
    pub max_depth: Option<usize>,
    /// Maximum element/key count for deserialization
    pub max_size: Option<usize>,
    /// Maximum raw input size for deserialization
    pub max_byte_size: Option<usize>,
    /// Deserialization input format (default: JSON)
    pub format: Option<DeserializeFormat>,
    /// Atoms a binary term may reference
    pub known_atoms: Option<HashSet<String>>,
}

impl SanitizeOptions {
    /// Create empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the SQL mode
    pub fn sql_mode(mut self, mode: SqlMode) -> Self {
        self.sql_mode = Some(mode);
        self
    }

    /// Set the SQL identifier allow-list
    pub fn allowed_identifiers<I, S>(mut self, identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_identifiers = Some(identifiers.into_iter().map(Into::into).collect());
        self
    }

    /// Set the filesystem root
    pub fn allowed_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.allowed_root = Some(root.into());
        self
    }

    /// Set the prompt delimiter nonce
    pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// Set the prompt injection threshold
    pub fn threshold(mut self, threshold: usize) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Set the allowed URL schemes
    pub fn allowed_schemes<I, S>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_schemes = Some(schemes.into_iter().map(Into::into).collect());
        self
    }

    /// Set the allowed ports
    pub fn allowed_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.allowed_ports = Some(ports.into_iter().collect());
        self
    }

    /// Allow private network destinations
    pub fn allow_private(mut self, allow: bool) -> Self {
        self.allow_private = allow;
        self
    }

    /// Set the maximum log line length
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Enable or disable log redaction
    pub fn redact(mut self, redact: bool) -> Self {
        self.redact = Some(redact);
        self
    }

    /// Set the maximum nesting depth
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Set the maximum element count
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Set the maximum raw byte size
    pub fn max_byte_size(mut self, max_byte_size: usize) -> Self {
        self.max_byte_size = Some(max_byte_size);
        self
    }

    /// Set the deserialization format
    pub fn format(mut self, format: DeserializeFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Set the atoms a binary term may reference
    pub fn known_atoms<I, S>(mut self, atoms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_atoms = Some(atoms.into_iter().map(Into::into).collect());
        self
    }
}

/// Uniform interface implemented by every concrete sanitizer.
pub trait Sanitizer: Send + Sync {
    /// The sanitizer type, which also determines its sanitization bit
    fn kind(&self) -> SanitizerKind;

    /// Neutralize `value` for this sanitizer's sink.
    ///
    /// On success the returned taint keeps every bit of `taint` and adds
    /// exactly [`SanitizerKind::bit`] of [`Sanitizer::kind`]. On failure no
    /// taint is returned.
    fn sanitize(
        &self,
        value: &Payload,
        taint: &Taint,
        opts: &SanitizeOptions,
    ) -> Result<(Payload, Taint), SanitizeError>;

    /// Scan `value` for attack patterns without changing it.
    fn detect(&self, value: &Payload) -> Detection;

    /// Canonical sanitizer name
    fn name(&self) -> &'static str {
        self.kind().as_str()
    }
}

/// Extract the text of a payload for a text-only sanitizer.
fn require_text(kind: SanitizerKind, value: &Payload) -> Result<&str, SanitizeError> {
    value.as_text().ok_or(SanitizeError::UnsupportedInput {
        sanitizer: kind.as_str(),
        expected: "text",
    })
}
