//! Behavioral trust scoring and tiering
//!
//! An agent's [`TrustProfile`] accumulates outcome counters and derives a
//! 0-100 score. The score maps to a [`TrustTier`], and [`TrustBounds`] maps
//! each tier to a sandbox level and a set of allowed actions.
//! [`TrustPolicy`] is the authorization check callers run before an action.

mod bounds;
mod profile;

pub use bounds::{ActionSet, TierBounds, TrustBounds, TrustPolicy};
pub use profile::TrustProfile;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Autonomy level earned by an agent, ordered from least to most trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustTier {
    Untrusted,
    Probationary,
    Trusted,
    Veteran,
    Autonomous,
}

impl TrustTier {
    /// All tiers in ascending order
    pub const ALL: [TrustTier; 5] = [
        TrustTier::Untrusted,
        TrustTier::Probationary,
        TrustTier::Trusted,
        TrustTier::Veteran,
        TrustTier::Autonomous,
    ];

    /// Tier for a trust score
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=19 => TrustTier::Untrusted,
            20..=49 => TrustTier::Probationary,
            50..=74 => TrustTier::Trusted,
            75..=89 => TrustTier::Veteran,
            _ => TrustTier::Autonomous,
        }
    }

    /// Canonical name
    pub const fn as_str(self) -> &'static str {
        match self {
            TrustTier::Untrusted => "untrusted",
            TrustTier::Probationary => "probationary",
            TrustTier::Trusted => "trusted",
            TrustTier::Veteran => "veteran",
            TrustTier::Autonomous => "autonomous",
        }
    }
}

impl fmt::Display for TrustTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Isolation applied to an agent's actions, from most to least restrictive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxLevel {
    Strict,
    Standard,
    Permissive,
    None,
}

impl SandboxLevel {
    /// Canonical name
    pub const fn as_str(self) -> &'static str {
        match self {
            SandboxLevel::Strict => "strict",
            SandboxLevel::Standard => "standard",
            SandboxLevel::Permissive => "permissive",
            SandboxLevel::None => "none",
        }
    }
}

impl fmt::Display for SandboxLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action classes gated by trust tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustAction {
    Read,
    Search,
    Think,
    WriteSandbox,
    Write,
    ExecuteSafe,
    Execute,
    Network,
}

impl TrustAction {
    /// Every action class
    pub const ALL: [TrustAction; 8] = [
        TrustAction::Read,
        TrustAction::Search,
        TrustAction::Think,
        TrustAction::WriteSandbox,
        TrustAction::Write,
        TrustAction::ExecuteSafe,
        TrustAction::Execute,
        TrustAction::Network,
    ];

    /// Canonical name
    pub const fn as_str(self) -> &'static str {
        match self {
            TrustAction::Read => "read",
            TrustAction::Search => "search",
            TrustAction::Think => "think",
            TrustAction::WriteSandbox => "write_sandbox",
            TrustAction::Write => "write",
            TrustAction::ExecuteSafe => "execute_safe",
            TrustAction::Execute => "execute",
            TrustAction::Network => "network",
        }
    }
}

impl fmt::Display for TrustAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
