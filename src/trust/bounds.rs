//! Tier bounds and the tier authorization check

use super::{SandboxLevel, TrustAction, TrustProfile, TrustTier};
use crate::config::{AllowedActions, TierOverride, TrustConfig};
use crate::error::{AuthorizationDenied, Error, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Actions permitted at a tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionSet {
    /// Every action
    All,
    /// Only the listed actions
    Only(BTreeSet<TrustAction>),
}

impl ActionSet {
    /// Whether `action` is permitted
    pub fn allows(&self, action: TrustAction) -> bool {
        match self {
            ActionSet::All => true,
            ActionSet::Only(actions) => actions.contains(&action),
        }
    }

    fn only(actions: &[TrustAction]) -> Self {
        ActionSet::Only(actions.iter().copied().collect())
    }
}

/// Sandbox level and allowed actions for one tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierBounds {
    pub sandbox: SandboxLevel,
    pub allowed_actions: ActionSet,
}

impl From<&AllowedActions> for ActionSet {
    fn from(value: &AllowedActions) -> Self {
        match value {
            AllowedActions::All(_) => ActionSet::All,
            AllowedActions::Only(actions) => ActionSet::only(actions),
        }
    }
}

impl ActionSet {
    /// Whether every action permitted here is also permitted by `other`
    fn is_subset(&self, other: &ActionSet) -> bool {
        match (self, other) {
            (_, ActionSet::All) => true,
            (ActionSet::All, ActionSet::Only(_)) => false,
            (ActionSet::Only(mine), ActionSet::Only(theirs)) => mine.is_subset(theirs),
        }
    }
}

impl TierBounds {
    /// Apply the fields an override sets, keeping the rest
    fn merged(&self, entry: &TierOverride) -> Self {
        Self {
            sandbox: entry.sandbox.unwrap_or(self.sandbox),
            allowed_actions: entry
                .allowed_actions
                .as_ref()
                .map_or_else(|| self.allowed_actions.clone(), ActionSet::from),
        }
    }
}

/// Tier to sandbox/action table.
///
/// Ascending tiers never tighten the sandbox and never drop an action the
/// tier below permits. Configuration overrides are merged field by field
/// over the defaults and must keep that ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustBounds {
    tiers: BTreeMap<TrustTier, TierBounds>,
}

impl Default for TrustBounds {
    fn default() -> Self {
        use TrustAction::*;

        let table = [
            (TrustTier::Untrusted, SandboxLevel::Strict, ActionSet::only(&[Read, Search, Think])),
            (
                TrustTier::Probationary,
                SandboxLevel::Strict,
                ActionSet::only(&[Read, Search, Think, WriteSandbox]),
            ),
            (
                TrustTier::Trusted,
                SandboxLevel::Standard,
                ActionSet::only(&[Read, Search, Think, WriteSandbox, Write, ExecuteSafe]),
            ),
            (
                TrustTier::Veteran,
                SandboxLevel::Permissive,
                ActionSet::only(&[
                    Read,
                    Search,
                    Think,
                    WriteSandbox,
                    Write,
                    ExecuteSafe,
                    Execute,
                    Network,
                ]),
            ),
            (TrustTier::Autonomous, SandboxLevel::None, ActionSet::All),
        ];

        Self {
            tiers: table
                .into_iter()
                .map(|(tier, sandbox, allowed_actions)| {
                    (
                        tier,
                        TierBounds {
                            sandbox,
                            allowed_actions,
                        },
                    )
                })
                .collect(),
        }
    }
}

impl TrustBounds {
    /// Default table with the configured tier overrides applied
    pub fn from_config(config: &TrustConfig) -> Result<Self> {
        let mut bounds = Self::default();
        for (tier, entry) in &config.tiers {
            let merged = bounds.for_tier(*tier).merged(entry);
            bounds.tiers.insert(*tier, merged);
        }
        bounds.check_ordering()?;
        Ok(bounds)
    }

    fn check_ordering(&self) -> Result<()> {
        for pair in TrustTier::ALL.windows(2) {
            let (lower, upper) = (self.for_tier(pair[0]), self.for_tier(pair[1]));
            if upper.sandbox < lower.sandbox {
                return Err(Error::Config(format!(
                    "sandbox for {} ({}) is stricter than for {} ({})",
                    pair[1], upper.sandbox, pair[0], lower.sandbox
                )));
            }
            if !lower.allowed_actions.is_subset(&upper.allowed_actions) {
                return Err(Error::Config(format!(
                    "{} must allow every action {} allows",
                    pair[1], pair[0]
                )));
            }
        }
        Ok(())
    }

    /// Bounds for a tier
    pub fn for_tier(&self, tier: TrustTier) -> &TierBounds {
        // every tier is present: the table starts from the full default set
        &self.tiers[&tier]
    }

    /// Sandbox level enforced at a tier
    pub fn sandbox_for_tier(&self, tier: TrustTier) -> SandboxLevel {
        self.for_tier(tier).sandbox
    }

    /// Whether a tier permits an action
    pub fn action_allowed(&self, tier: TrustTier, action: TrustAction) -> bool {
        self.for_tier(tier).allowed_actions.allows(action)
    }

    /// Lowest tier whose allowed actions include `action`
    pub fn minimum_tier_for_action(&self, action: TrustAction) -> Option<TrustTier> {
        TrustTier::ALL
            .into_iter()
            .find(|tier| self.action_allowed(*tier, action))
    }

    /// Sandbox level of the lowest tier permitting `action`
    pub fn sandbox_required_for_action(&self, action: TrustAction) -> Option<SandboxLevel> {
        self.minimum_tier_for_action(action)
            .map(|tier| self.sandbox_for_tier(tier))
    }
}

/// Tier check run before an agent action executes.
#[derive(Debug, Clone, Default)]
pub struct TrustPolicy {
    bounds: TrustBounds,
}

impl TrustPolicy {
    /// Create a policy over the given bounds
    pub fn new(bounds: TrustBounds) -> Self {
        Self { bounds }
    }

    /// Create a policy from configuration
    pub fn from_config(config: &TrustConfig) -> Result<Self> {
        Ok(Self::new(TrustBounds::from_config(config)?))
    }

    /// The underlying bounds table
    pub fn bounds(&self) -> &TrustBounds {
        &self.bounds
    }

    /// Tier the profile is treated as. A frozen profile is held at the
    /// lowest tier regardless of its score.
    pub fn effective_tier(&self, profile: &TrustProfile) -> TrustTier {
        if profile.is_frozen() {
            TrustTier::Untrusted
        } else {
            profile.tier()
        }
    }

    /// Sandbox level for the profile's next action
    pub fn sandbox_for(&self, profile: &TrustProfile) -> SandboxLevel {
        self.bounds.sandbox_for_tier(self.effective_tier(profile))
    }

    /// Check that `profile` may perform `action`
    pub fn check_action(
        &self,
        profile: &TrustProfile,
        action: TrustAction,
    ) -> std::result::Result<(), AuthorizationDenied> {
        let tier = self.effective_tier(profile);
        if self.bounds.action_allowed(tier, action) {
            return Ok(());
        }

        let denial = if profile.is_frozen() {
            AuthorizationDenied::Frozen(
                profile
                    .frozen_reason()
                    .unwrap_or("circuit breaker tripped")
                    .to_string(),
            )
        } else {
            match self.bounds.minimum_tier_for_action(action) {
                Some(required) => AuthorizationDenied::InsufficientTier {
                    action: action.to_string(),
                    required: required.to_string(),
                    actual: tier.to_string(),
                },
                None => AuthorizationDenied::ActionNotAllowed(action.to_string()),
            }
        };

        tracing::debug!(agent_id = %profile.agent_id(), %action, %tier, "Action denied by trust tier");
        Err(denial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllKeyword;

    fn profile_at(successes: usize) -> TrustProfile {
        (0..successes).fold(TrustProfile::new("agent_ab"), |p, _| p.record_action_success())
    }

    #[test]
    fn test_default_sandbox_levels() {
        let bounds = TrustBounds::default();
        assert_eq!(bounds.sandbox_for_tier(TrustTier::Untrusted), SandboxLevel::Strict);
        assert_eq!(bounds.sandbox_for_tier(TrustTier::Probationary), SandboxLevel::Strict);
        assert_eq!(bounds.sandbox_for_tier(TrustTier::Trusted), SandboxLevel::Standard);
        assert_eq!(bounds.sandbox_for_tier(TrustTier::Veteran), SandboxLevel::Permissive);
        assert_eq!(bounds.sandbox_for_tier(TrustTier::Autonomous), SandboxLevel::None);
    }

    #[test]
    fn test_default_table_is_ordered() {
        let bounds = TrustBounds::default();
        for pair in TrustTier::ALL.windows(2) {
            let (lower, upper) = (bounds.for_tier(pair[0]), bounds.for_tier(pair[1]));
            assert!(lower.sandbox <= upper.sandbox, "{} vs {}", pair[0], pair[1]);
            assert!(lower.allowed_actions.is_subset(&upper.allowed_actions));
        }
        // the four levels appear in order across the five tiers
        let levels: Vec<_> = TrustTier::ALL.iter().map(|t| bounds.sandbox_for_tier(*t)).collect();
        let mut distinct = levels.clone();
        distinct.dedup();
        assert_eq!(
            distinct,
            vec![
                SandboxLevel::Strict,
                SandboxLevel::Standard,
                SandboxLevel::Permissive,
                SandboxLevel::None
            ]
        );
        assert!(bounds.check_ordering().is_ok());
    }

    #[test]
    fn test_minimum_tier_for_action() {
        let bounds = TrustBounds::default();
        assert_eq!(bounds.minimum_tier_for_action(TrustAction::Read), Some(TrustTier::Untrusted));
        assert_eq!(
            bounds.minimum_tier_for_action(TrustAction::WriteSandbox),
            Some(TrustTier::Probationary)
        );
        assert_eq!(bounds.minimum_tier_for_action(TrustAction::Write), Some(TrustTier::Trusted));
        assert_eq!(
            bounds.minimum_tier_for_action(TrustAction::ExecuteSafe),
            Some(TrustTier::Trusted)
        );
        assert_eq!(bounds.minimum_tier_for_action(TrustAction::Execute), Some(TrustTier::Veteran));
        assert_eq!(bounds.minimum_tier_for_action(TrustAction::Network), Some(TrustTier::Veteran));
        assert_eq!(
            bounds.sandbox_required_for_action(TrustAction::Write),
            Some(SandboxLevel::Standard)
        );
    }

    #[test]
    fn test_autonomous_allows_everything() {
        let bounds = TrustBounds::default();
        for action in TrustAction::ALL {
            assert!(bounds.action_allowed(TrustTier::Autonomous, action));
        }
    }

    fn override_for(
        tier: TrustTier,
        sandbox: Option<SandboxLevel>,
        actions: Option<&[TrustAction]>,
    ) -> TrustConfig {
        let mut config = TrustConfig::default();
        config.tiers.insert(
            tier,
            TierOverride {
                sandbox,
                allowed_actions: actions.map(|a| AllowedActions::Only(a.to_vec())),
            },
        );
        config
    }

    #[test]
    fn test_config_override() {
        use TrustAction::*;
        let config = override_for(
            TrustTier::Probationary,
            Some(SandboxLevel::Standard),
            Some(&[Read, Search, Think, WriteSandbox, Write]),
        );
        let bounds = TrustBounds::from_config(&config).unwrap();

        assert_eq!(bounds.sandbox_for_tier(TrustTier::Probationary), SandboxLevel::Standard);
        assert_eq!(bounds.minimum_tier_for_action(Write), Some(TrustTier::Probationary));
        assert_eq!(bounds.minimum_tier_for_action(ExecuteSafe), Some(TrustTier::Trusted));
    }

    #[test]
    fn test_unlisted_tiers_keep_defaults() {
        let config = override_for(
            TrustTier::Trusted,
            Some(SandboxLevel::Permissive),
            None,
        );
        let bounds = TrustBounds::from_config(&config).unwrap();
        let defaults = TrustBounds::default();

        for tier in TrustTier::ALL {
            if tier != TrustTier::Trusted {
                assert_eq!(bounds.for_tier(tier), defaults.for_tier(tier), "{}", tier);
            }
        }
    }

    #[test]
    fn test_sandbox_only_override_keeps_actions() {
        let config = override_for(TrustTier::Untrusted, Some(SandboxLevel::Strict), None);
        let policy = TrustPolicy::from_config(&config).unwrap();
        let defaults = TrustBounds::default();

        assert_eq!(
            policy.bounds().for_tier(TrustTier::Untrusted),
            defaults.for_tier(TrustTier::Untrusted)
        );
        assert!(!policy.bounds().action_allowed(TrustTier::Untrusted, TrustAction::Execute));
        assert_eq!(
            policy.check_action(&TrustProfile::new("agent_ab"), TrustAction::Execute),
            Err(AuthorizationDenied::InsufficientTier {
                action: "execute".to_string(),
                required: "veteran".to_string(),
                actual: "probationary".to_string(),
            })
        );
    }

    #[test]
    fn test_actions_only_override_keeps_sandbox() {
        use TrustAction::*;
        let config = override_for(
            TrustTier::Trusted,
            None,
            Some(&[Read, Search, Think, WriteSandbox, Write, ExecuteSafe, Network]),
        );
        let bounds = TrustBounds::from_config(&config).unwrap();
        assert_eq!(bounds.sandbox_for_tier(TrustTier::Trusted), SandboxLevel::Standard);
        assert_eq!(bounds.minimum_tier_for_action(Network), Some(TrustTier::Trusted));
    }

    #[test]
    fn test_all_must_be_explicit() {
        let mut config = TrustConfig::default();
        config.tiers.insert(
            TrustTier::Veteran,
            TierOverride {
                sandbox: None,
                allowed_actions: Some(AllowedActions::All(AllKeyword::All)),
            },
        );
        let bounds = TrustBounds::from_config(&config).unwrap();
        assert_eq!(bounds.for_tier(TrustTier::Veteran).allowed_actions, ActionSet::All);
        assert_eq!(bounds.sandbox_for_tier(TrustTier::Veteran), SandboxLevel::Permissive);
    }

    #[test]
    fn test_out_of_order_sandbox_rejected() {
        let config = override_for(TrustTier::Autonomous, Some(SandboxLevel::Strict), None);
        assert!(matches!(TrustBounds::from_config(&config), Err(Error::Config(_))));

        let config = override_for(TrustTier::Untrusted, Some(SandboxLevel::Standard), None);
        assert!(matches!(TrustPolicy::from_config(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_dropping_lower_tier_action_rejected() {
        use TrustAction::*;
        let config = override_for(TrustTier::Trusted, None, Some(&[Read, Write]));
        assert!(matches!(TrustBounds::from_config(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_overridden_table_stays_ordered() {
        let config = override_for(TrustTier::Probationary, Some(SandboxLevel::Standard), None);
        let bounds = TrustBounds::from_config(&config).unwrap();
        for pair in TrustTier::ALL.windows(2) {
            assert!(bounds.sandbox_for_tier(pair[0]) <= bounds.sandbox_for_tier(pair[1]));
        }
    }

    #[test]
    fn test_action_not_allowed_anywhere() {
        use TrustAction::*;
        let trusted = [Read, Search, Think, WriteSandbox, Write, ExecuteSafe];
        let mut config = TrustConfig::default();
        for tier in [TrustTier::Veteran, TrustTier::Autonomous] {
            config.tiers.insert(
                tier,
                TierOverride {
                    sandbox: None,
                    allowed_actions: Some(AllowedActions::Only(trusted.to_vec())),
                },
            );
        }
        let policy = TrustPolicy::from_config(&config).unwrap();
        assert_eq!(policy.bounds().minimum_tier_for_action(Network), None);
        assert_eq!(
            policy.check_action(&TrustProfile::new("agent_ab"), Network),
            Err(AuthorizationDenied::ActionNotAllowed("network".to_string()))
        );
    }

    #[test]
    fn test_check_action_by_tier() {
        let policy = TrustPolicy::default();
        let profile = TrustProfile::new("agent_ab");
        assert_eq!(profile.tier(), TrustTier::Probationary);

        assert!(policy.check_action(&profile, TrustAction::WriteSandbox).is_ok());
        assert_eq!(
            policy.check_action(&profile, TrustAction::Execute),
            Err(AuthorizationDenied::InsufficientTier {
                action: "execute".to_string(),
                required: "veteran".to_string(),
                actual: "probationary".to_string(),
            })
        );
    }

    #[test]
    fn test_frozen_profile_held_at_lowest_tier() {
        let policy = TrustPolicy::default();
        let profile = profile_at(10).record_test_result(true);
        assert_eq!(profile.tier(), TrustTier::Autonomous);
        assert!(policy.check_action(&profile, TrustAction::Execute).is_ok());

        let frozen = profile.freeze("exfiltration attempt");
        assert_eq!(policy.sandbox_for(&frozen), SandboxLevel::Strict);
        assert!(policy.check_action(&frozen, TrustAction::Read).is_ok());
        assert_eq!(
            policy.check_action(&frozen, TrustAction::Execute),
            Err(AuthorizationDenied::Frozen("exfiltration attempt".to_string()))
        );
    }
}
