//! Arbor security configuration management
//!
//! Every value has a documented default; a missing file, table or key means
//! "no override". Configuration is passed explicitly to the components that
//! need it rather than read from global state.

use crate::error::{Error, Result};
use crate::trust::{SandboxLevel, TrustAction, TrustTier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Main Arbor security configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArborConfig {
    /// Sanitizer defaults
    #[serde(default)]
    pub sanitizers: SanitizerConfig,

    /// Trust tier table overrides
    #[serde(default)]
    pub trust: TrustConfig,

    /// Signed request freshness limits
    #[serde(default)]
    pub signing: SigningConfig,

    /// Capability defaults
    #[serde(default)]
    pub capabilities: CapabilityConfig,
}

impl ArborConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Render configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to render config: {}", e)))
    }
}

/// Default limits and allow-lists used by the concrete sanitizers.
///
/// Per-call [`SanitizeOptions`](crate::sanitizer::SanitizeOptions) take
/// precedence over these values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerConfig {
    /// Matched high-risk prompt injection patterns that trigger rejection
    pub prompt_injection_threshold: usize,

    /// Maximum length of a sanitized log line (characters)
    pub log_max_length: usize,

    /// Maximum nesting depth of decoded JSON / binary terms
    pub json_max_depth: usize,

    /// Maximum number of elements and keys in a decoded document
    pub json_max_size: usize,

    /// Maximum raw input size in bytes before decoding
    pub json_max_byte_size: usize,

    /// URL schemes allowed for outbound requests
    pub ssrf_allowed_schemes: Vec<String>,

    /// Ports allowed for outbound requests
    pub ssrf_allowed_ports: Vec<u16>,

    /// Rounds of percent / unicode-escape decoding applied before XSS encoding
    pub xss_decode_rounds: usize,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            prompt_injection_threshold: 2,
            log_max_length: 10_000,
            json_max_depth: 32,
            json_max_size: 10_000,
            json_max_byte_size: 1_048_576,
            ssrf_allowed_schemes: vec!["http".to_string(), "https".to_string()],
            ssrf_allowed_ports: vec![80, 443, 8080, 8443],
            xss_decode_rounds: 3,
        }
    }
}

/// Override for a single trust tier.
///
/// Each field replaces only its counterpart in the tier's default entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierOverride {
    /// Sandbox level enforced at this tier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<SandboxLevel>,

    /// Actions allowed at this tier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_actions: Option<AllowedActions>,
}

/// The `all` keyword in an `allowed_actions` override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllKeyword {
    All,
}

/// `allowed_actions = "all"` or `allowed_actions = ["read", ...]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AllowedActions {
    All(AllKeyword),
    Only(Vec<TrustAction>),
}

/// Trust tier table overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Per-tier overrides; tiers not listed keep their defaults
    pub tiers: BTreeMap<TrustTier, TierOverride>,
}

/// Freshness limits applied when verifying signed requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Maximum accepted request age in seconds
    pub max_request_age_secs: i64,

    /// Maximum accepted clock skew into the future in seconds
    pub max_clock_skew_secs: i64,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            max_request_age_secs: 300,
            max_clock_skew_secs: 30,
        }
    }
}

/// Capability defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    /// Delegation depth given to newly granted capabilities
    pub default_delegation_depth: u8,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            default_delegation_depth: 3,
        }
    }
}
