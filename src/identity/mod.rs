//! Cryptographic agent identities
//!
//! An [`Identity`] is an Ed25519 signing keypair (plus an optional X25519
//! encryption keypair) whose agent id is derived from the public key:
//! `agent_` followed by the lowercase hex SHA-256 of the key. The id is
//! re-derived and checked whenever an identity is constructed, so a value of
//! this type always carries a consistent `(agent_id, public_key)` pair.
//!
//! [`SignedRequest`] is the replay-protected envelope built on top of it and
//! [`ReplayGuard`] the caller-owned freshness/nonce check.

mod replay;
mod request;

pub use replay::ReplayGuard;
pub use request::{SignedRequest, NONCE_SIZE};

use crate::crypto::keys::{self, SecretBytes, KEY_SIZE};
use crate::error::{ValidationError, VerificationError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use zeroize::Zeroizing;

/// Prefix of every agent id
pub const AGENT_ID_PREFIX: &str = "agent_";

/// Hex characters of the agent id shown by [`Identity::display_name`]
const DISPLAY_ID_HEX: usize = 16;

/// Derive the agent id for an Ed25519 public key.
pub fn derive_agent_id(public_key: &[u8]) -> String {
    format!("{}{}", AGENT_ID_PREFIX, hex::encode(Sha256::digest(public_key)))
}

/// Lifecycle state of an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStatus {
    Active,
    Suspended,
    /// Terminal
    Revoked,
}

impl IdentityStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            IdentityStatus::Active => "active",
            IdentityStatus::Suspended => "suspended",
            IdentityStatus::Revoked => "revoked",
        }
    }
}

impl fmt::Display for IdentityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An agent identity.
///
/// Private keys never leave the value except through [`Identity::sign`] and
/// [`Identity::open`]; [`Identity::public_only`] strips them for storage or
/// transmission.
#[derive(Clone)]
pub struct Identity {
    agent_id: String,
    name: Option<String>,
    public_key: [u8; KEY_SIZE],
    private_key: Option<SecretBytes>,
    encryption_public_key: Option<[u8; KEY_SIZE]>,
    encryption_private_key: Option<SecretBytes>,
    created_at: DateTime<Utc>,
    key_version: u32,
    metadata: BTreeMap<String, Value>,
    status: IdentityStatus,
    status_changed_at: Option<DateTime<Utc>>,
    status_reason: Option<String>,
}

impl Identity {
    /// Start building an identity around an Ed25519 public key
    pub fn builder(public_key: impl Into<Vec<u8>>) -> IdentityBuilder {
        IdentityBuilder::new(public_key)
    }

    /// Generate a fresh identity with new signing and encryption keypairs.
    pub fn generate(name: Option<&str>) -> Result<Self, ValidationError> {
        let (private_key, public_key) = keys::generate_signing_keypair();
        let (encryption_private_key, encryption_public_key) = keys::generate_encryption_keypair();

        let mut builder = Self::builder(public_key.to_vec())
            .private_key(private_key.to_vec())
            .encryption_keys(encryption_public_key.to_vec(), encryption_private_key.to_vec());
        if let Some(name) = name {
            builder = builder.name(name);
        }

        let identity = builder.build()?;
        tracing::info!(agent_id = %identity.agent_id, "Generated agent identity");
        Ok(identity)
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn public_key(&self) -> &[u8; KEY_SIZE] {
        &self.public_key
    }

    pub fn encryption_public_key(&self) -> Option<&[u8; KEY_SIZE]> {
        self.encryption_public_key.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn key_version(&self) -> u32 {
        self.key_version
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    pub fn status(&self) -> IdentityStatus {
        self.status
    }

    pub fn status_changed_at(&self) -> Option<DateTime<Utc>> {
        self.status_changed_at
    }

    pub fn status_reason(&self) -> Option<&str> {
        self.status_reason.as_deref()
    }

    /// Whether this identity holds its signing key
    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.status == IdentityStatus::Active
    }

    /// Human-readable label: `"{name} (agent_0123456789abcdef..)"`, or just
    /// the truncated id when unnamed.
    pub fn display_name(&self) -> String {
        let end = (AGENT_ID_PREFIX.len() + DISPLAY_ID_HEX).min(self.agent_id.len());
        let short_id = format!("{}..", &self.agent_id[..end]);
        match &self.name {
            Some(name) => format!("{} ({})", name, short_id),
            None => short_id,
        }
    }

    /// Copy with both private keys removed. Status is preserved.
    pub fn public_only(&self) -> Self {
        Self {
            private_key: None,
            encryption_private_key: None,
            ..self.clone()
        }
    }

    /// Sign a payload as this identity.
    ///
    /// Returns `None` for a public-only identity.
    pub fn sign(&self, payload: impl Into<Vec<u8>>) -> Option<Result<SignedRequest, ValidationError>> {
        self.private_key
            .as_ref()
            .map(|key| SignedRequest::sign(payload, &self.agent_id, key.as_slice()))
    }

    /// Verify a signed request claimed to come from this identity.
    pub fn verify(&self, request: &SignedRequest) -> Result<(), VerificationError> {
        if !self.is_active() {
            return Err(VerificationError::InactiveIdentity(self.status.to_string()));
        }
        if request.agent_id() != self.agent_id {
            return Err(VerificationError::AgentMismatch {
                expected: self.agent_id.clone(),
                actual: request.agent_id().to_string(),
            });
        }
        request.verify(&self.public_key)
    }

    /// Open a sealed box addressed to this identity's encryption key.
    pub fn open(&self, sealed: &[u8]) -> crate::Result<Vec<u8>> {
        let secret = self
            .encryption_private_key
            .as_ref()
            .ok_or_else(|| crate::Error::Crypto("Identity has no encryption key".to_string()))?;
        crate::crypto::open(sealed, secret)
    }

    /// Suspend the identity. Suspension is reversible.
    pub fn suspend(&self, reason: impl Into<String>) -> Result<Self, ValidationError> {
        self.transition(IdentityStatus::Suspended, Some(reason.into()))
    }

    /// Revoke the identity permanently.
    pub fn revoke(&self, reason: impl Into<String>) -> Result<Self, ValidationError> {
        self.transition(IdentityStatus::Revoked, Some(reason.into()))
    }

    /// Return a suspended identity to active.
    pub fn reactivate(&self) -> Result<Self, ValidationError> {
        self.transition(IdentityStatus::Active, None)
    }

    fn transition(&self, to: IdentityStatus, reason: Option<String>) -> Result<Self, ValidationError> {
        if self.status == IdentityStatus::Revoked {
            return Err(ValidationError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }

        tracing::info!(
            agent_id = %self.agent_id,
            from = %self.status,
            to = %to,
            "Identity status changed"
        );
        Ok(Self {
            status: to,
            status_changed_at: Some(Utc::now()),
            status_reason: reason,
            ..self.clone()
        })
    }

    /// JSON encoding with base64 keys and RFC 3339 timestamps.
    /// Private keys are never included.
    pub fn to_json(&self) -> Value {
        let timestamp = |t: DateTime<Utc>| t.to_rfc3339_opts(SecondsFormat::Micros, true);
        json!({
            "agent_id": self.agent_id,
            "name": self.name,
            "public_key": STANDARD.encode(self.public_key),
            "encryption_public_key": self.encryption_public_key.map(|k| STANDARD.encode(k)),
            "created_at": timestamp(self.created_at),
            "key_version": self.key_version,
            "metadata": self.metadata,
            "status": self.status,
            "status_changed_at": self.status_changed_at.map(timestamp),
            "status_reason": self.status_reason,
        })
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("agent_id", &self.agent_id)
            .field("name", &self.name)
            .field("has_private_key", &self.private_key.is_some())
            .field("has_encryption_key", &self.encryption_public_key.is_some())
            .field("key_version", &self.key_version)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Identity`]. Raw key bytes are validated in
/// [`IdentityBuilder::build`].
pub struct IdentityBuilder {
    public_key: Vec<u8>,
    private_key: Option<Zeroizing<Vec<u8>>>,
    encryption_public_key: Option<Vec<u8>>,
    encryption_private_key: Option<Zeroizing<Vec<u8>>>,
    agent_id: Option<String>,
    name: Option<String>,
    created_at: Option<DateTime<Utc>>,
    key_version: u32,
    metadata: BTreeMap<String, Value>,
}

impl IdentityBuilder {
    fn new(public_key: impl Into<Vec<u8>>) -> Self {
        Self {
            public_key: public_key.into(),
            private_key: None,
            encryption_public_key: None,
            encryption_private_key: None,
            agent_id: None,
            name: None,
            created_at: None,
            key_version: 1,
            metadata: BTreeMap::new(),
        }
    }

    /// Ed25519 private seed
    pub fn private_key(mut self, private_key: impl Into<Vec<u8>>) -> Self {
        self.private_key = Some(Zeroizing::new(private_key.into()));
        self
    }

    /// X25519 keypair
    pub fn encryption_keys(
        mut self,
        public_key: impl Into<Vec<u8>>,
        private_key: impl Into<Vec<u8>>,
    ) -> Self {
        self.encryption_public_key = Some(public_key.into());
        self.encryption_private_key = Some(Zeroizing::new(private_key.into()));
        self
    }

    /// X25519 public key only
    pub fn encryption_public_key(mut self, public_key: impl Into<Vec<u8>>) -> Self {
        self.encryption_public_key = Some(public_key.into());
        self
    }

    /// Claimed agent id, checked against the public key
    pub fn agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn key_version(mut self, key_version: u32) -> Self {
        self.key_version = key_version;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Validate and build. Checks run in a fixed order and stop at the
    /// first failure.
    pub fn build(self) -> Result<Identity, ValidationError> {
        let public_key = keys::key_array(&self.public_key).ok_or(
            ValidationError::InvalidPublicKeySize {
                expected: KEY_SIZE,
                actual: self.public_key.len(),
            },
        )?;
        let private_key = self
            .private_key
            .as_deref()
            .map(|key| secret_array(key))
            .transpose()?;
        let encryption_public_key = self
            .encryption_public_key
            .as_deref()
            .map(|key| {
                keys::key_array(key).ok_or(ValidationError::InvalidPublicKeySize {
                    expected: KEY_SIZE,
                    actual: key.len(),
                })
            })
            .transpose()?;
        let encryption_private_key = self
            .encryption_private_key
            .as_deref()
            .map(|key| secret_array(key))
            .transpose()?;

        if let Some(secret) = &private_key {
            if keys::signing_public_key(&secret[..])? != public_key {
                return Err(ValidationError::KeyPairMismatch("signing"));
            }
        }
        if let (Some(public), Some(secret)) = (&encryption_public_key, &encryption_private_key) {
            if keys::encryption_public_key(&secret[..])? != *public {
                return Err(ValidationError::KeyPairMismatch("encryption"));
            }
        }

        let agent_id = derive_agent_id(&public_key);
        if let Some(claimed) = self.agent_id {
            if claimed != agent_id {
                return Err(ValidationError::AgentIdMismatch {
                    expected: agent_id,
                    actual: claimed,
                });
            }
        }

        if self.key_version < 1 {
            return Err(ValidationError::InvalidKeyVersion(self.key_version));
        }

        if matches!(&self.name, Some(name) if name.trim().is_empty()) {
            return Err(ValidationError::EmptyName);
        }

        Ok(Identity {
            agent_id,
            name: self.name,
            public_key,
            private_key,
            encryption_public_key,
            encryption_private_key,
            created_at: self.created_at.unwrap_or_else(Utc::now),
            key_version: self.key_version,
            metadata: self.metadata,
            status: IdentityStatus::Active,
            status_changed_at: None,
            status_reason: None,
        })
    }
}

fn secret_array(bytes: &[u8]) -> Result<SecretBytes, ValidationError> {
    keys::key_array(bytes)
        .map(Zeroizing::new)
        .ok_or(ValidationError::InvalidPrivateKeySize {
            expected: KEY_SIZE,
            actual: bytes.len(),
        })
}
