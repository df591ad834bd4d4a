//! Four-dimensional taint metadata
//!
//! Every untrusted value travelling through the runtime carries a [`Taint`]:
//!
//! - **level**: how far the value's origin is trusted
//! - **sensitivity**: how damaging disclosure would be
//! - **sanitizations**: which attack classes have been neutralized (bitmask)
//! - **confidence**: how well the content has been verified
//!
//! Two constructors exist on purpose: [`Taint::trusted`] for values the
//! runtime itself produced, and [`Taint::unknown`] for anything whose
//! provenance is unknown. There is no `Default`; each call site chooses.

mod bits;
mod value;

pub use bits::{sanitization_bit, SanitizerKind, Sanitizations};
pub use value::TaintedValue;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Trust level of a value's origin, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaintLevel {
    /// Produced by the runtime itself
    Trusted,
    /// Computed from other values
    Derived,
    /// External input of unknown intent
    Untrusted,
    /// Known to be adversarial
    Hostile,
}

/// Sensitivity of a value, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    Public,
    Internal,
    Confidential,
    Restricted,
}

/// How well the content of a value has been verified, ordered by certainty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Unverified,
    Plausible,
    Corroborated,
    Verified,
}

macro_rules! display_snake_case {
    ($ty:ty { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($name),)+
                }
            }
        }
    };
}

display_snake_case!(TaintLevel {
    Trusted => "trusted",
    Derived => "derived",
    Untrusted => "untrusted",
    Hostile => "hostile",
});

display_snake_case!(Sensitivity {
    Public => "public",
    Internal => "internal",
    Confidential => "confidential",
    Restricted => "restricted",
});

display_snake_case!(Confidence {
    Unverified => "unverified",
    Plausible => "plausible",
    Corroborated => "corroborated",
    Verified => "verified",
});

/// Taint metadata attached to a value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taint {
    /// Origin trust level
    pub level: TaintLevel,
    /// Disclosure sensitivity
    pub sensitivity: Sensitivity,
    /// Sanitizers already applied
    pub sanitizations: Sanitizations,
    /// Content verification level
    pub confidence: Confidence,
    /// Where the value entered the runtime (tool, channel, agent)
    pub source: Option<String>,
    /// Provenance chain, oldest first
    pub chain: Vec<String>,
}

impl Taint {
    /// Taint for a value the runtime itself produced and vouches for.
    pub fn trusted() -> Self {
        Self {
            level: TaintLevel::Trusted,
            sensitivity: Sensitivity::Internal,
            sanitizations: Sanitizations::NONE,
            confidence: Confidence::Verified,
            source: None,
            chain: Vec::new(),
        }
    }

    /// Conservative taint for a value of unknown provenance.
    pub fn unknown() -> Self {
        Self {
            level: TaintLevel::Untrusted,
            sensitivity: Sensitivity::Internal,
            sanitizations: Sanitizations::NONE,
            confidence: Confidence::Unverified,
            source: None,
            chain: Vec::new(),
        }
    }

    /// Conservative taint for input known to be attacker-controlled.
    pub fn hostile() -> Self {
        Self {
            level: TaintLevel::Hostile,
            ..Self::unknown()
        }
    }

    /// Record the source of the value and append it to the provenance chain.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        let source = source.into();
        self.chain.push(source.clone());
        self.source = Some(source);
        self
    }

    /// Set the sensitivity.
    #[must_use]
    pub fn with_sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    /// Set the confidence.
    #[must_use]
    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    /// Return a copy with `kind`'s sanitization bit added. Existing bits are kept.
    #[must_use]
    pub fn mark_sanitized(&self, kind: SanitizerKind) -> Self {
        Self {
            sanitizations: self.sanitizations.with(kind),
            ..self.clone()
        }
    }

    /// Whether `kind` has been applied to the value.
    pub fn is_sanitized_for(&self, kind: SanitizerKind) -> bool {
        self.sanitizations.contains(kind)
    }

    /// Whether the named sanitizer still needs to run.
    ///
    /// Unknown names always need sanitization.
    pub fn needs_sanitization(&self, name: &str) -> bool {
        match name.parse::<SanitizerKind>() {
            Ok(kind) => !self.is_sanitized_for(kind),
            Err(_) => true,
        }
    }

    /// Whether the value may be used without further checks.
    pub fn is_trusted(&self) -> bool {
        self.level == TaintLevel::Trusted
    }

    /// Taint of a value computed from several inputs.
    ///
    /// The result takes the most severe level and sensitivity, the least
    /// confidence, and only the sanitizations every input shares. Deriving
    /// from trusted inputs alone yields `derived`. Without inputs the result
    /// is [`Taint::unknown`].
    pub fn propagate<'a>(inputs: impl IntoIterator<Item = &'a Taint>) -> Self {
        let mut inputs = inputs.into_iter();
        let Some(first) = inputs.next() else {
            return Self::unknown();
        };

        let mut result = first.clone();
        result.source = None;
        for taint in inputs {
            result.level = result.level.max(taint.level);
            result.sensitivity = result.sensitivity.max(taint.sensitivity);
            result.confidence = result.confidence.min(taint.confidence);
            result.sanitizations = result.sanitizations.intersection(taint.sanitizations);
            for link in &taint.chain {
                if !result.chain.contains(link) {
                    result.chain.push(link.clone());
                }
            }
        }

        if result.level == TaintLevel::Trusted {
            result.level = TaintLevel::Derived;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_is_conservative() {
        let taint = Taint::unknown();
        assert_eq!(taint.level, TaintLevel::Untrusted);
        assert_eq!(taint.sensitivity, Sensitivity::Internal);
        assert_eq!(taint.confidence, Confidence::Unverified);
        assert_eq!(taint.sanitizations, Sanitizations::NONE);
    }

    #[test]
    fn test_trusted_is_distinct_from_unknown() {
        let trusted = Taint::trusted();
        assert!(trusted.is_trusted());
        assert_ne!(trusted, Taint::unknown());
        assert_ne!(trusted.sensitivity, Sensitivity::Public);
    }

    #[test]
    fn test_orderings() {
        assert!(TaintLevel::Trusted < TaintLevel::Derived);
        assert!(TaintLevel::Untrusted < TaintLevel::Hostile);
        assert!(Sensitivity::Public < Sensitivity::Restricted);
        assert!(Confidence::Unverified < Confidence::Verified);
    }

    #[test]
    fn test_mark_sanitized_preserves_bits() {
        let taint = Taint::unknown()
            .mark_sanitized(SanitizerKind::Sqli)
            .mark_sanitized(SanitizerKind::Xss);
        assert!(taint.is_sanitized_for(SanitizerKind::Sqli));
        assert!(taint.is_sanitized_for(SanitizerKind::Xss));
        assert_eq!(taint.sanitizations.bits(), 0x03);
    }

    #[test]
    fn test_needs_sanitization() {
        let taint = Taint::unknown().mark_sanitized(SanitizerKind::Ssrf);
        assert!(!taint.needs_sanitization("ssrf"));
        assert!(taint.needs_sanitization("xss"));
        assert!(taint.needs_sanitization("not_a_sanitizer"));
    }

    #[test]
    fn test_with_source_extends_chain() {
        let taint = Taint::unknown().with_source("web_fetch").with_source("summarizer");
        assert_eq!(taint.source.as_deref(), Some("summarizer"));
        assert_eq!(taint.chain, vec!["web_fetch", "summarizer"]);
    }

    #[test]
    fn test_propagate_takes_worst_case() {
        let a = Taint::trusted()
            .mark_sanitized(SanitizerKind::Xss)
            .mark_sanitized(SanitizerKind::Sqli)
            .with_source("config");
        let b = Taint::unknown()
            .with_sensitivity(Sensitivity::Confidential)
            .mark_sanitized(SanitizerKind::Xss)
            .with_source("user");

        let derived = Taint::propagate([&a, &b]);
        assert_eq!(derived.level, TaintLevel::Untrusted);
        assert_eq!(derived.sensitivity, Sensitivity::Confidential);
        assert_eq!(derived.confidence, Confidence::Unverified);
        assert_eq!(derived.sanitizations.bits(), SanitizerKind::Xss.bit());
        assert_eq!(derived.chain, vec!["config", "user"]);
        assert_eq!(derived.source, None);
    }

    #[test]
    fn test_propagate_trusted_becomes_derived() {
        let derived = Taint::propagate([&Taint::trusted(), &Taint::trusted()]);
        assert_eq!(derived.level, TaintLevel::Derived);
    }

    #[test]
    fn test_propagate_empty_is_unknown() {
        assert_eq!(Taint::propagate(std::iter::empty::<&Taint>()), Taint::unknown());
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_value(Taint::hostile()).unwrap();
        assert_eq!(json["level"], "hostile");
        assert_eq!(json["sensitivity"], "internal");
        assert_eq!(json["sanitizations"], 0);
    }
}
