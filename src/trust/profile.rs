//! Per-agent trust profile

use super::TrustTier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const SUCCESS_WEIGHT: f64 = 0.40;
const SECURITY_WEIGHT: f64 = 0.35;
const TEST_WEIGHT: f64 = 0.25;

/// Security score lost per recorded violation
const VIOLATION_PENALTY: f64 = 20.0;

/// Behavioral counters and the scores derived from them.
///
/// Scores and the tier are recomputed from the counters on every update and
/// on deserialization; they cannot be set directly. Updates return a new
/// profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredProfile")]
pub struct TrustProfile {
    agent_id: String,
    trust_score: u8,
    tier: TrustTier,
    frozen: bool,
    frozen_reason: Option<String>,
    frozen_at: Option<DateTime<Utc>>,
    success_rate_score: f64,
    security_score: f64,
    test_pass_score: f64,
    total_actions: u64,
    successful_actions: u64,
    security_violations: u64,
    total_tests: u64,
    tests_passed: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Persisted form of a profile: counters and breaker state only
#[derive(Deserialize)]
struct StoredProfile {
    agent_id: String,
    #[serde(default)]
    frozen: bool,
    #[serde(default)]
    frozen_reason: Option<String>,
    #[serde(default)]
    frozen_at: Option<DateTime<Utc>>,
    #[serde(default)]
    total_actions: u64,
    #[serde(default)]
    successful_actions: u64,
    #[serde(default)]
    security_violations: u64,
    #[serde(default)]
    total_tests: u64,
    #[serde(default)]
    tests_passed: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<StoredProfile> for TrustProfile {
    fn from(stored: StoredProfile) -> Self {
        let mut profile = Self {
            agent_id: stored.agent_id,
            trust_score: 0,
            tier: TrustTier::Untrusted,
            frozen: stored.frozen,
            frozen_reason: stored.frozen_reason,
            frozen_at: stored.frozen_at,
            success_rate_score: 0.0,
            security_score: 0.0,
            test_pass_score: 0.0,
            total_actions: stored.total_actions,
            // counters from storage are not trusted to be consistent
            successful_actions: stored.successful_actions.min(stored.total_actions),
            security_violations: stored.security_violations,
            total_tests: stored.total_tests,
            tests_passed: stored.tests_passed.min(stored.total_tests),
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        };
        profile.rescore();
        profile
    }
}

impl TrustProfile {
    /// Fresh profile: no history, clean security record.
    pub fn new(agent_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            trust_score: 0,
            tier: TrustTier::Untrusted,
            frozen: false,
            frozen_reason: None,
            frozen_at: None,
            success_rate_score: 0.0,
            security_score: 100.0,
            test_pass_score: 0.0,
            total_actions: 0,
            successful_actions: 0,
            security_violations: 0,
            total_tests: 0,
            tests_passed: 0,
            created_at: now,
            updated_at: now,
        }
        .recalculate()
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Weighted score, 0-100
    pub fn trust_score(&self) -> u8 {
        self.trust_score
    }

    pub fn tier(&self) -> TrustTier {
        self.tier
    }

    /// Whether the circuit breaker is tripped
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn frozen_reason(&self) -> Option<&str> {
        self.frozen_reason.as_deref()
    }

    pub fn frozen_at(&self) -> Option<DateTime<Utc>> {
        self.frozen_at
    }

    /// 0.0-100.0
    pub fn success_rate_score(&self) -> f64 {
        self.success_rate_score
    }

    /// 0.0-100.0
    pub fn security_score(&self) -> f64 {
        self.security_score
    }

    /// 0.0-100.0
    pub fn test_pass_score(&self) -> f64 {
        self.test_pass_score
    }

    pub fn total_actions(&self) -> u64 {
        self.total_actions
    }

    pub fn successful_actions(&self) -> u64 {
        self.successful_actions
    }

    pub fn security_violations(&self) -> u64 {
        self.security_violations
    }

    pub fn total_tests(&self) -> u64 {
        self.total_tests
    }

    pub fn tests_passed(&self) -> u64 {
        self.tests_passed
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Recompute component scores, the weighted score and the tier.
    #[must_use]
    pub fn recalculate(mut self) -> Self {
        self.rescore();
        self.updated_at = Utc::now();
        self
    }

    fn rescore(&mut self) {
        self.success_rate_score = ratio_score(self.successful_actions, self.total_actions);
        self.test_pass_score = ratio_score(self.tests_passed, self.total_tests);
        self.security_score =
            (100.0 - self.security_violations as f64 * VIOLATION_PENALTY).max(0.0);

        let weighted = self.success_rate_score * SUCCESS_WEIGHT
            + self.security_score * SECURITY_WEIGHT
            + self.test_pass_score * TEST_WEIGHT;
        self.trust_score = weighted.round().clamp(0.0, 100.0) as u8;
        self.tier = TrustTier::from_score(self.trust_score);
    }

    /// Record a successful action
    #[must_use]
    pub fn record_action_success(mut self) -> Self {
        self.total_actions += 1;
        self.successful_actions += 1;
        self.recalculate()
    }

    /// Record a failed action
    #[must_use]
    pub fn record_action_failure(mut self) -> Self {
        self.total_actions += 1;
        self.recalculate()
    }

    /// Record a security violation
    #[must_use]
    pub fn record_security_violation(mut self) -> Self {
        self.security_violations += 1;
        tracing::warn!(
            agent_id = %self.agent_id,
            violations = self.security_violations,
            "Security violation recorded"
        );
        self.recalculate()
    }

    /// Record the outcome of a test run
    #[must_use]
    pub fn record_test_result(mut self, passed: bool) -> Self {
        self.total_tests += 1;
        if passed {
            self.tests_passed += 1;
        }
        self.recalculate()
    }

    /// Trip the circuit breaker. The score is left untouched.
    #[must_use]
    pub fn freeze(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        tracing::info!(agent_id = %self.agent_id, reason = %reason, "Trust profile frozen");
        let now = Utc::now();
        self.frozen = true;
        self.frozen_reason = Some(reason);
        self.frozen_at = Some(now);
        self.updated_at = now;
        self
    }

    /// Reset the circuit breaker
    #[must_use]
    pub fn unfreeze(mut self) -> Self {
        tracing::info!(agent_id = %self.agent_id, "Trust profile unfrozen");
        self.frozen = false;
        self.frozen_reason = None;
        self.frozen_at = None;
        self.updated_at = Utc::now();
        self
    }
}

/// `part / total * 100`, or 0 without data.
fn ratio_score(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}
