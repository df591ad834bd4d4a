//! Values paired with their taint

use super::{Taint, SanitizerKind};
use crate::error::SanitizeError;
use crate::sanitizer::{Payload, SanitizeOptions, SanitizerRegistry};

/// An immutable value together with its [`Taint`].
///
/// The raw value is only reachable through [`TaintedValue::unwrap_unaudited`]
/// (or a reference via [`TaintedValue::peek_unaudited`]) so every extraction
/// is visible at the call site.
#[derive(Debug, Clone, PartialEq)]
pub struct TaintedValue<T> {
    value: T,
    taint: Taint,
}

impl<T> TaintedValue<T> {
    /// Pair a value with an explicit taint
    pub fn new(value: T, taint: Taint) -> Self {
        Self { value, taint }
    }

    /// Wrap a value the runtime vouches for
    pub fn trusted(value: T) -> Self {
        Self::new(value, Taint::trusted())
    }

    /// Wrap a value of unknown provenance
    pub fn unknown(value: T) -> Self {
        Self::new(value, Taint::unknown())
    }

    /// The taint metadata
    pub fn taint(&self) -> &Taint {
        &self.taint
    }

    /// Extract the raw value without any check.
    pub fn unwrap_unaudited(self) -> T {
        self.value
    }

    /// Borrow the raw value without any check.
    pub fn peek_unaudited(&self) -> &T {
        &self.value
    }

    /// Split into raw value and taint.
    pub fn into_parts(self) -> (T, Taint) {
        (self.value, self.taint)
    }

    /// Transform the value. The taint carries over unchanged.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> TaintedValue<U> {
        TaintedValue {
            value: f(self.value),
            taint: self.taint,
        }
    }
}

impl<T: Into<Payload>> TaintedValue<T> {
    /// Run one sanitizer over the value.
    pub fn sanitize(
        self,
        registry: &SanitizerRegistry,
        kind: SanitizerKind,
        opts: &SanitizeOptions,
    ) -> Result<TaintedValue<Payload>, SanitizeError> {
        let (value, taint) =
            registry.sanitize_kind(kind, &self.value.into(), &self.taint, opts)?;
        Ok(TaintedValue::new(value, taint))
    }
}
