//! Freshness and nonce-reuse checks for signed requests

use super::{SignedRequest, NONCE_SIZE};
use crate::config::SigningConfig;
use crate::error::{Error, Result, VerificationError};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;

/// Rejects stale, future-dated and replayed requests.
///
/// The guard is owned by the caller (one per verifier); it remembers nonces
/// only for as long as a request carrying them could still be fresh.
#[derive(Debug, Clone)]
pub struct ReplayGuard {
    max_age: TimeDelta,
    max_skew: TimeDelta,
    seen: HashMap<(String, [u8; NONCE_SIZE]), DateTime<Utc>>,
}

impl ReplayGuard {
    /// Guard with the given window. Negative or out-of-range limits are a
    /// configuration error.
    pub fn new(max_age_secs: i64, max_skew_secs: i64) -> Result<Self> {
        Ok(Self::with_window(
            window("max_request_age_secs", max_age_secs)?,
            window("max_clock_skew_secs", max_skew_secs)?,
        ))
    }

    pub fn from_config(config: &SigningConfig) -> Result<Self> {
        Self::new(config.max_request_age_secs, config.max_clock_skew_secs)
    }

    fn with_window(max_age: TimeDelta, max_skew: TimeDelta) -> Self {
        Self {
            max_age,
            max_skew,
            seen: HashMap::new(),
        }
    }

    /// Number of nonces currently remembered
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Check a request at time `now` and remember its nonce.
    ///
    /// Only checks freshness and uniqueness; the signature must be verified
    /// separately.
    pub fn check(
        &mut self,
        request: &SignedRequest,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), VerificationError> {
        self.prune(now);

        let age = now - request.timestamp();
        if age > self.max_age {
            return Err(VerificationError::StaleRequest {
                age_secs: age.num_seconds(),
                limit_secs: self.max_age.num_seconds(),
            });
        }
        if -age > self.max_skew {
            return Err(VerificationError::FutureRequest {
                ahead_secs: (-age).num_seconds(),
                limit_secs: self.max_skew.num_seconds(),
            });
        }

        let key = (request.agent_id().to_string(), *request.nonce());
        if self.seen.contains_key(&key) {
            tracing::warn!(agent_id = %request.agent_id(), "Replayed request nonce");
            return Err(VerificationError::ReplayedNonce);
        }
        self.seen.insert(key, request.timestamp());
        Ok(())
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let max_age = self.max_age;
        self.seen.retain(|_, timestamp| now - *timestamp <= max_age);
    }
}

fn window(name: &str, secs: i64) -> Result<TimeDelta> {
    if secs < 0 {
        return Err(Error::Config(format!("{} must not be negative, got {}", name, secs)));
    }
    TimeDelta::try_seconds(secs)
        .ok_or_else(|| Error::Config(format!("{} is out of range: {}", name, secs)))
}

impl Default for ReplayGuard {
    fn default() -> Self {
        let config = SigningConfig::default();
        Self::with_window(
            TimeDelta::seconds(config.max_request_age_secs),
            TimeDelta::seconds(config.max_clock_skew_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_at(timestamp: DateTime<Utc>, nonce: u8) -> SignedRequest {
        SignedRequest::new(b"x".to_vec(), "agent_ab", timestamp, &[nonce; 16], vec![1u8; 64])
            .unwrap()
    }

    #[test]
    fn test_fresh_request_accepted_once() {
        let mut guard = ReplayGuard::default();
        let now = Utc::now();
        let request = request_at(now, 1);

        assert!(guard.check(&request, now).is_ok());
        assert_eq!(guard.check(&request, now), Err(VerificationError::ReplayedNonce));
        assert!(guard.check(&request_at(now, 2), now).is_ok());
        assert_eq!(guard.len(), 2);
    }

    #[test]
    fn test_same_nonce_different_agent() {
        let mut guard = ReplayGuard::default();
        let now = Utc::now();
        let a = request_at(now, 1);
        let b = SignedRequest::new(b"x".to_vec(), "agent_cd", now, &[1u8; 16], vec![1u8; 64]).unwrap();
        assert!(guard.check(&a, now).is_ok());
        assert!(guard.check(&b, now).is_ok());
    }

    #[test]
    fn test_stale_request() {
        let mut guard = ReplayGuard::new(300, 30).unwrap();
        let now = Utc::now();
        let request = request_at(now - TimeDelta::seconds(301), 1);
        assert_eq!(
            guard.check(&request, now),
            Err(VerificationError::StaleRequest {
                age_secs: 301,
                limit_secs: 300
            })
        );
        assert!(guard.is_empty());
    }

    #[test]
    fn test_future_request() {
        let mut guard = ReplayGuard::new(300, 30).unwrap();
        let now = Utc::now();
        assert!(guard.check(&request_at(now + TimeDelta::seconds(10), 1), now).is_ok());
        assert_eq!(
            guard.check(&request_at(now + TimeDelta::seconds(31), 2), now),
            Err(VerificationError::FutureRequest {
                ahead_secs: 31,
                limit_secs: 30
            })
        );
    }

    #[test]
    fn test_nonces_expire_with_window() {
        let mut guard = ReplayGuard::new(60, 5).unwrap();
        let start = Utc::now();
        assert!(guard.check(&request_at(start, 1), start).is_ok());

        let later = start + TimeDelta::seconds(120);
        assert!(guard.check(&request_at(later, 2), later).is_ok());
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn test_from_config() {
        let config = SigningConfig {
            max_request_age_secs: 10,
            max_clock_skew_secs: 1,
        };
        let mut guard = ReplayGuard::from_config(&config).unwrap();
        let now = Utc::now();
        assert!(guard.check(&request_at(now - TimeDelta::seconds(11), 1), now).is_err());
    }

    #[test]
    fn test_invalid_window_is_config_error() {
        assert!(matches!(ReplayGuard::new(i64::MAX, 30), Err(Error::Config(_))));
        assert!(matches!(ReplayGuard::new(300, i64::MIN), Err(Error::Config(_))));
        assert!(matches!(ReplayGuard::new(-1, 30), Err(Error::Config(_))));

        let config = SigningConfig {
            max_request_age_secs: i64::MAX,
            max_clock_skew_secs: 30,
        };
        assert!(ReplayGuard::from_config(&config).is_err());
    }
}
