//! Sanitization bit table
//!
//! One bit per sanitizer type. The table is fixed and shared with every
//! other implementation of the runtime, so the bit values are part of the
//! wire contract.

use crate::error::SanitizeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of sanitizer types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizerKind {
    Xss,
    Sqli,
    CommandInjection,
    PathTraversal,
    PromptInjection,
    Ssrf,
    LogInjection,
    Deserialization,
}

impl SanitizerKind {
    /// All sanitizer kinds in bit order
    pub const ALL: [SanitizerKind; 8] = [
        SanitizerKind::Xss,
        SanitizerKind::Sqli,
        SanitizerKind::CommandInjection,
        SanitizerKind::PathTraversal,
        SanitizerKind::PromptInjection,
        SanitizerKind::Ssrf,
        SanitizerKind::LogInjection,
        SanitizerKind::Deserialization,
    ];

    /// The sanitization bit owned by this kind
    pub const fn bit(self) -> u8 {
        match self {
            Self::Xss => 0x01,
            Self::Sqli => 0x02,
            Self::CommandInjection => 0x04,
            Self::PathTraversal => 0x08,
            Self::PromptInjection => 0x10,
            Self::Ssrf => 0x20,
            Self::LogInjection => 0x40,
            Self::Deserialization => 0x80,
        }
    }

    /// Position of this kind in [`SanitizerKind::ALL`]
    pub const fn index(self) -> usize {
        self.bit().trailing_zeros() as usize
    }

    /// Canonical name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Xss => "xss",
            Self::Sqli => "sqli",
            Self::CommandInjection => "command_injection",
            Self::PathTraversal => "path_traversal",
            Self::PromptInjection => "prompt_injection",
            Self::Ssrf => "ssrf",
            Self::LogInjection => "log_injection",
            Self::Deserialization => "deserialization",
        }
    }
}

impl fmt::Display for SanitizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SanitizerKind {
    type Err = SanitizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SanitizeError::UnknownSanitizer(s.to_string()))
    }
}

/// Look up the bit for a sanitizer name.
///
/// Total over the 8 known names; anything else is `unknown_sanitizer`.
pub fn sanitization_bit(name: &str) -> Result<u8, SanitizeError> {
    name.parse::<SanitizerKind>().map(SanitizerKind::bit)
}

/// Bitmask of sanitizers applied to a value.
///
/// There is no way to clear a bit: the only mutators return a mask that is
/// a superset of `self`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sanitizations(u8);

impl Sanitizations {
    /// Mask with no bits set
    pub const NONE: Sanitizations = Sanitizations(0);

    /// Mask with every bit set
    pub const ALL: Sanitizations = Sanitizations(0xFF);

    /// Wrap raw bits
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw bits
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Mask with `kind`'s bit added
    #[must_use]
    pub const fn with(self, kind: SanitizerKind) -> Self {
        Self(self.0 | kind.bit())
    }

    /// Union of two masks
    #[must_use]
    pub const fn union(self, other: Sanitizations) -> Self {
        Self(self.0 | other.0)
    }

    /// Intersection of two masks, used when deriving a value from several inputs
    #[must_use]
    pub const fn intersection(self, other: Sanitizations) -> Self {
        Self(self.0 & other.0)
    }

    /// Whether `kind`'s bit is set
    pub const fn contains(self, kind: SanitizerKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Whether every bit of `other` is also set in `self`
    pub const fn is_superset_of(self, other: Sanitizations) -> bool {
        self.0 & other.0 == other.0
    }

    /// Kinds whose bit is set, in bit order
    pub fn kinds(self) -> impl Iterator<Item = SanitizerKind> {
        SanitizerKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_table() {
        assert_eq!(sanitization_bit("xss").unwrap(), 0x01);
        assert_eq!(sanitization_bit("sqli").unwrap(), 0x02);
        assert_eq!(sanitization_bit("command_injection").unwrap(), 0x04);
        assert_eq!(sanitization_bit("path_traversal").unwrap(), 0x08);
        assert_eq!(sanitization_bit("prompt_injection").unwrap(), 0x10);
        assert_eq!(sanitization_bit("ssrf").unwrap(), 0x20);
        assert_eq!(sanitization_bit("log_injection").unwrap(), 0x40);
        assert_eq!(sanitization_bit("deserialization").unwrap(), 0x80);
    }

    #[test]
    fn test_unknown_name() {
        assert_eq!(
            sanitization_bit("html"),
            Err(SanitizeError::UnknownSanitizer("html".to_string()))
        );
    }

    #[test]
    fn test_bits_are_distinct() {
        let combined = SanitizerKind::ALL
            .iter()
            .fold(0u8, |acc, kind| {
                assert_eq!(acc & kind.bit(), 0);
                acc | kind.bit()
            });
        assert_eq!(combined, 0xFF);
    }

    #[test]
    fn test_index_matches_position() {
        for (i, kind) in SanitizerKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn test_with_is_monotonic() {
        let mask = Sanitizations::NONE
            .with(SanitizerKind::Sqli)
            .with(SanitizerKind::Xss);
        let next = mask.with(SanitizerKind::Xss);
        assert_eq!(next, mask);
        assert!(next.is_superset_of(mask));
        assert_eq!(
            mask.kinds().collect::<Vec<_>>(),
            vec![SanitizerKind::Xss, SanitizerKind::Sqli]
        );
    }
}
