//! Deserialization sanitizer
//!
//! Decodes untrusted documents under explicit resource guards. The raw size
//! is checked before any parsing, nesting depth is checked by a scan that
//! never recurses, and the element count (values plus object keys) is
//! checked on the decoded document.

use super::etf::{self, TermLimits};
use super::{Detection, Payload, SanitizeOptions, Sanitizer};
use crate::config::SanitizerConfig;
use crate::error::SanitizeError;
use crate::taint::{SanitizerKind, Taint};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw inputs larger than this are flagged by `detect`.
pub const EXCESSIVE_SIZE: usize = 10 * 1024 * 1024;

/// Accepted document encodings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeserializeFormat {
    /// JSON text
    #[default]
    Json,
    /// External term format, restricted to known atoms
    BinaryTerm,
}

/// Guards applied to one decode.
#[derive(Debug, Clone, Copy)]
struct Limits {
    max_depth: usize,
    max_size: usize,
    max_byte_size: usize,
}

/// Whether the bracket nesting of a JSON text exceeds `limit`. Brackets
/// inside strings are ignored and the scan stops at the first excess.
fn json_depth_exceeds(input: &[u8], limit: usize) -> bool {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for &byte in input {
        if in_string {
            match (escaped, byte) {
                (true, _) => escaped = false,
                (false, b'\\') => escaped = true,
                (false, b'"') => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'[' | b'{' => {
                depth += 1;
                if depth > limit {
                    return true;
                }
            }
            b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    false
}

/// Whether a decoded value nests containers deeper than `limit`.
/// Scalars have depth 0.
fn depth_exceeds(value: &Value, limit: usize) -> bool {
    let mut stack = vec![(value, 0usize)];
    while let Some((value, depth)) = stack.pop() {
        let is_container = matches!(value, Value::Array(_) | Value::Object(_));
        if is_container && depth + 1 > limit {
            return true;
        }
        match value {
            Value::Array(items) => stack.extend(items.iter().map(|child| (child, depth + 1))),
            Value::Object(map) => stack.extend(map.values().map(|child| (child, depth + 1))),
            _ => {}
        }
    }
    false
}

/// Number of values plus object keys in a decoded value.
fn element_count(value: &Value) -> usize {
    let mut count = 0;
    let mut stack = vec![value];
    while let Some(value) = stack.pop() {
        count += 1;
        match value {
            Value::Array(items) => stack.extend(items),
            Value::Object(map) => {
                count += map.len();
                stack.extend(map.values());
            }
            _ => {}
        }
    }
    count
}

fn check_size(value: &Value, limit: usize) -> Result<(), SanitizeError> {
    let actual = element_count(value);
    if actual > limit {
        return Err(SanitizeError::MaxSizeExceeded { actual, limit });
    }
    Ok(())
}

fn check_byte_size(actual: usize, limit: usize) -> Result<(), SanitizeError> {
    if actual > limit {
        return Err(SanitizeError::TooLarge { actual, limit });
    }
    Ok(())
}

/// Sanitizer for untrusted serialized documents.
#[derive(Debug, Clone)]
pub struct DeserializationSanitizer {
    defaults: Limits,
}

impl DeserializationSanitizer {
    /// Create a sanitizer from configuration
    pub fn new(config: &SanitizerConfig) -> Self {
        Self {
            defaults: Limits {
                max_depth: config.json_max_depth,
                max_size: config.json_max_size,
                max_byte_size: config.json_max_byte_size,
            },
        }
    }

    fn limits(&self, opts: &SanitizeOptions) -> Limits {
        Limits {
            max_depth: opts.max_depth.unwrap_or(self.defaults.max_depth),
            max_size: opts.max_size.unwrap_or(self.defaults.max_size),
            max_byte_size: opts.max_byte_size.unwrap_or(self.defaults.max_byte_size),
        }
    }

    fn decode_json(&self, value: &Payload, limits: Limits) -> Result<Value, SanitizeError> {
        let bytes = match value {
            Payload::Structured(document) => {
                if depth_exceeds(document, limits.max_depth) {
                    return Err(SanitizeError::MaxDepthExceeded(limits.max_depth));
                }
                check_size(document, limits.max_size)?;
                return Ok(document.clone());
            }
            Payload::Text(text) => text.as_bytes(),
            Payload::Bytes(bytes) => bytes.as_slice(),
        };

        check_byte_size(bytes.len(), limits.max_byte_size)?;
        if json_depth_exceeds(bytes, limits.max_depth) {
            return Err(SanitizeError::MaxDepthExceeded(limits.max_depth));
        }
        let document: Value = serde_json::from_slice(bytes)
            .map_err(|e| SanitizeError::JsonDecodeError(e.to_string()))?;
        check_size(&document, limits.max_size)?;
        Ok(document)
    }

    fn decode_binary_term(
        &self,
        value: &Payload,
        limits: Limits,
        opts: &SanitizeOptions,
    ) -> Result<Value, SanitizeError> {
        let Payload::Bytes(bytes) = value else {
            return Err(SanitizeError::UnsupportedInput {
                sanitizer: self.name(),
                expected: "bytes",
            });
        };

        check_byte_size(bytes.len(), limits.max_byte_size)?;
        etf::decode_term(
            bytes,
            opts.known_atoms.as_ref(),
            TermLimits {
                max_depth: limits.max_depth,
                max_size: limits.max_size,
            },
        )
    }
}

impl Default for DeserializationSanitizer {
    fn default() -> Self {
        Self::new(&SanitizerConfig::default())
    }
}

impl Sanitizer for DeserializationSanitizer {
    fn kind(&self) -> SanitizerKind {
        SanitizerKind::Deserialization
    }

    fn sanitize(
        &self,
        value: &Payload,
        taint: &Taint,
        opts: &SanitizeOptions,
    ) -> Result<(Payload, Taint), SanitizeError> {
        let limits = self.limits(opts);
        let format = opts.format.unwrap_or_default();
        let document = match format {
            DeserializeFormat::Json => self.decode_json(value, limits),
            DeserializeFormat::BinaryTerm => self.decode_binary_term(value, limits, opts),
        }
        .inspect_err(|e| {
            tracing::warn!(sanitizer = self.name(), ?format, error = %e, "Document rejected");
        })?;

        Ok((
            Payload::Structured(document),
            taint.mark_sanitized(self.kind()),
        ))
    }

    fn detect(&self, value: &Payload) -> Detection {
        let Some(bytes) = value.as_bytes() else {
            return Detection::Safe(1.0);
        };

        let mut matches = Vec::new();
        if bytes.first() == Some(&etf::VERSION) {
            matches.push("binary_term_format".to_string());
        }
        if bytes.len() > EXCESSIVE_SIZE {
            matches.push("excessive_size".to_string());
        }
        Detection::from_matches(matches)
    }
}
