//! Arbor security core
//!
//! The security substrate of a multi-agent runtime:
//!
//! ```text
//!  untrusted input ──► Taint ──► SanitizerRegistry ──► sanitized value + Taint'
//!                                  (xss, sqli, command_injection, path_traversal,
//!                                   prompt_injection, ssrf, log_injection,
//!                                   deserialization)
//!
//!  Identity ──► SignedRequest ──► ReplayGuard / verify
//!
//!  Capability ──► delegate ──► authorize ──► AuditEvent
//!  TrustProfile ──► TrustTier ──► TrustPolicy (sandbox level, allowed actions)
//! ```
//!
//! Everything here is synchronous and operates on immutable values; updates
//! return new values. Persistence of capabilities, trust profiles and audit
//! events is left to the caller (see [`capability::CapabilityAuthority`]).
//!
//! ## Modules
//!
//! - [`taint`]: four-dimensional taint metadata and tainted values
//! - [`sanitizer`]: the sanitizer contract, registry and eight sanitizers
//! - [`identity`]: agent identities, signed requests and replay protection
//! - [`crypto`]: key helpers and sealed boxes
//! - [`capability`]: permission tokens, delegation, authorization and audit
//! - [`trust`]: behavioral trust scoring and tier bounds
//! - [`config`]: configuration management

pub mod capability;
pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod sanitizer;
pub mod taint;
pub mod trust;

pub use capability::{Capability, DelegateOptions};
pub use config::ArborConfig;
pub use error::{Error, Result};
pub use identity::{Identity, SignedRequest};
pub use sanitizer::{Payload, SanitizeOptions, SanitizerRegistry};
pub use taint::{Taint, TaintedValue};
pub use trust::{TrustPolicy, TrustProfile, TrustTier};
