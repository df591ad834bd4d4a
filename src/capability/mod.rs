//! Capabilities: delegatable, expiring, resource-scoped permission tokens
//!
//! A [`Capability`] grants its principal access to a resource URI
//! (`arbor://{type}/{operation}/{path...}`) and everything below it. Holders
//! may derive narrower children through [`Capability::delegate`]; each hop
//! consumes one unit of delegation depth and can never outlive or widen the
//! parent.

mod audit;
mod authority;
mod authorize;

pub use audit::{AuditEvent, AuditEventType, Decision};
pub use authority::{AuditFilter, CapabilityAuthority, CapabilityFilter};
pub use authorize::{authorize, AuthorizationContext, OPERATIONS_CONSTRAINT};

use crate::config::CapabilityConfig;
use crate::crypto::keys;
use crate::error::{DelegationError, ValidationError, VerificationError};
use chrono::{DateTime, DurationRound, SecondsFormat, TimeDelta, Utc};
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::LazyLock;

/// Upper bound on `delegation_depth`
pub const MAX_DELEGATION_DEPTH: u8 = 10;

static RESOURCE_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^arbor://[a-z][a-z0-9_]*/[a-z][a-z0-9_]*(/\S*)?$")
        .unwrap_or_else(|e| panic!("built-in pattern is invalid: {}", e))
});

static PRINCIPAL_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^agent_[0-9a-f]+$").unwrap_or_else(|e| panic!("built-in pattern is invalid: {}", e))
});

/// Whether `uri` follows the resource URI grammar
pub fn is_valid_resource_uri(uri: &str) -> bool {
    RESOURCE_URI.is_match(uri)
}

/// Whether `id` is a well-formed agent id
pub fn is_valid_principal_id(id: &str) -> bool {
    PRINCIPAL_ID.is_match(id)
}

fn generate_id() -> String {
    format!("cap_{}", uuid::Uuid::new_v4().simple())
}

fn truncate_to_micros(time: DateTime<Utc>) -> DateTime<Utc> {
    time.duration_trunc(TimeDelta::microseconds(1)).unwrap_or(time)
}

fn rfc3339(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// A permission token. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Capability {
    id: String,
    resource_uri: String,
    principal_id: String,
    granted_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    parent_capability_id: Option<String>,
    delegation_depth: u8,
    constraints: Map<String, Value>,
    signature: Option<Vec<u8>>,
    metadata: Map<String, Value>,
}

/// Options for [`Capability::delegate`]
#[derive(Debug, Clone, Default)]
pub struct DelegateOptions {
    /// Requested expiry; the child never outlives the parent
    pub expires_at: Option<DateTime<Utc>>,
    /// Constraints layered over the parent's; a key given here replaces the
    /// parent's value for that key
    pub constraints: Map<String, Value>,
    /// Narrower resource within the parent's scope
    pub resource_uri: Option<String>,
}

impl DelegateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn constraint(mut self, key: impl Into<String>, value: Value) -> Self {
        self.constraints.insert(key.into(), value);
        self
    }

    pub fn resource_uri(mut self, resource_uri: impl Into<String>) -> Self {
        self.resource_uri = Some(resource_uri.into());
        self
    }
}

impl Capability {
    /// Start building a capability for `principal_id` over `resource_uri`
    pub fn builder(
        resource_uri: impl Into<String>,
        principal_id: impl Into<String>,
    ) -> CapabilityBuilder {
        CapabilityBuilder::new(resource_uri.into(), principal_id.into())
    }

    /// Build a capability with default settings
    pub fn new(
        resource_uri: impl Into<String>,
        principal_id: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Self::builder(resource_uri, principal_id).build()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn resource_uri(&self) -> &str {
        &self.resource_uri
    }

    pub fn principal_id(&self) -> &str {
        &self.principal_id
    }

    pub fn granted_at(&self) -> DateTime<Utc> {
        self.granted_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn parent_capability_id(&self) -> Option<&str> {
        self.parent_capability_id.as_deref()
    }

    pub fn delegation_depth(&self) -> u8 {
        self.delegation_depth
    }

    pub fn constraints(&self) -> &Map<String, Value> {
        &self.constraints
    }

    pub fn signature(&self) -> Option<&[u8]> {
        self.signature.as_deref()
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Whether the capability covers `uri`: the resource itself or anything
    /// beneath it.
    pub fn grants_access(&self, uri: &str) -> bool {
        match uri.strip_prefix(self.resource_uri.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    pub fn can_delegate(&self) -> bool {
        self.delegation_depth > 0
    }

    /// Derive a child capability for `new_principal`.
    ///
    /// The child has one less delegation depth, expires no later than the
    /// parent and may only narrow the resource. It is unsigned.
    pub fn delegate(
        &self,
        new_principal: impl Into<String>,
        opts: DelegateOptions,
    ) -> Result<Self, DelegationError> {
        if !self.can_delegate() {
            return Err(DelegationError::DepthExhausted);
        }

        let resource_uri = match opts.resource_uri {
            Some(uri) if !self.grants_access(&uri) => {
                return Err(DelegationError::ScopeEscalation {
                    granted: self.resource_uri.clone(),
                    requested: uri,
                });
            }
            Some(uri) => uri,
            None => self.resource_uri.clone(),
        };

        let expires_at = match (self.expires_at, opts.expires_at) {
            (Some(parent), Some(requested)) => Some(parent.min(requested)),
            (parent, requested) => parent.or(requested),
        };

        let mut constraints = self.constraints.clone();
        constraints.extend(opts.constraints);

        let mut builder = Self::builder(resource_uri, new_principal)
            .parent(self.id.clone())
            .delegation_depth(self.delegation_depth - 1)
            .constraints(constraints);
        builder.metadata = self.metadata.clone();
        if let Some(expires_at) = expires_at {
            builder = builder.expires_at(expires_at);
        }

        let child = builder.build()?;
        tracing::info!(
            parent = %self.id,
            capability = %child.id,
            principal = %child.principal_id,
            depth = child.delegation_depth,
            "Delegated capability"
        );
        Ok(child)
    }

    /// Canonical bytes covered by the capability signature.
    ///
    /// Each field is `u32 big-endian length || bytes`; absent optional fields
    /// encode as empty. Constraints are compact JSON with sorted keys.
    pub fn signing_payload(&self) -> Vec<u8> {
        let granted_at = rfc3339(self.granted_at);
        let expires_at = self.expires_at.map(rfc3339).unwrap_or_default();
        let depth = [self.delegation_depth];
        let constraints = Value::Object(self.constraints.clone()).to_string();
        let fields: [&[u8]; 8] = [
            self.id.as_bytes(),
            self.resource_uri.as_bytes(),
            self.principal_id.as_bytes(),
            granted_at.as_bytes(),
            expires_at.as_bytes(),
            self.parent_capability_id.as_deref().unwrap_or_default().as_bytes(),
            &depth,
            constraints.as_bytes(),
        ];

        let mut out = Vec::new();
        for field in fields {
            out.extend_from_slice(&(field.len() as u32).to_be_bytes());
            out.extend_from_slice(field);
        }
        out
    }

    /// Return a copy signed with the granter's Ed25519 private key.
    pub fn sign(&self, private_key: &[u8]) -> Result<Self, ValidationError> {
        let signature = keys::sign(private_key, &self.signing_payload())?;
        Ok(Self {
            signature: Some(signature.to_vec()),
            ..self.clone()
        })
    }

    /// Verify the signature against the granter's public key. An unsigned
    /// capability fails with `MalformedSignature`.
    pub fn verify_signature(&self, public_key: &[u8]) -> Result<(), VerificationError> {
        let signature = self
            .signature
            .as_deref()
            .ok_or(VerificationError::MalformedSignature)?;
        keys::verify(public_key, &self.signing_payload(), signature)
    }

    /// JSON encoding. The signature is not included.
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "resource_uri": self.resource_uri,
            "principal_id": self.principal_id,
            "granted_at": rfc3339(self.granted_at),
            "expires_at": self.expires_at.map(rfc3339),
            "parent_capability_id": self.parent_capability_id,
            "delegation_depth": self.delegation_depth,
            "constraints": self.constraints,
            "metadata": self.metadata,
        })
    }
}

/// Builder for [`Capability`]
#[derive(Debug, Clone)]
pub struct CapabilityBuilder {
    id: Option<String>,
    resource_uri: String,
    principal_id: String,
    granted_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    parent_capability_id: Option<String>,
    delegation_depth: u8,
    constraints: Map<String, Value>,
    metadata: Map<String, Value>,
}

impl CapabilityBuilder {
    fn new(resource_uri: String, principal_id: String) -> Self {
        Self {
            id: None,
            resource_uri,
            principal_id,
            granted_at: None,
            expires_at: None,
            parent_capability_id: None,
            delegation_depth: CapabilityConfig::default().default_delegation_depth,
            constraints: Map::new(),
            metadata: Map::new(),
        }
    }

    /// Apply configured defaults
    pub fn config(mut self, config: &CapabilityConfig) -> Self {
        self.delegation_depth = config.default_delegation_depth;
        self
    }

    /// Explicit id (a fresh `cap_` id is generated otherwise)
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn granted_at(mut self, granted_at: DateTime<Utc>) -> Self {
        self.granted_at = Some(granted_at);
        self
    }

    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Convenience for `expires_at(granted_at + ttl)`
    pub fn ttl(mut self, ttl: TimeDelta) -> Self {
        let granted_at = *self.granted_at.get_or_insert_with(Utc::now);
        self.expires_at = Some(granted_at + ttl);
        self
    }

    pub fn parent(mut self, parent_capability_id: impl Into<String>) -> Self {
        self.parent_capability_id = Some(parent_capability_id.into());
        self
    }

    pub fn delegation_depth(mut self, depth: u8) -> Self {
        self.delegation_depth = depth;
        self
    }

    pub fn constraint(mut self, key: impl Into<String>, value: Value) -> Self {
        self.constraints.insert(key.into(), value);
        self
    }

    pub fn constraints(mut self, constraints: Map<String, Value>) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Validate and build. Checks run in a fixed order and stop at the
    /// first failure.
    pub fn build(self) -> Result<Capability, ValidationError> {
        if !is_valid_resource_uri(&self.resource_uri) {
            return Err(ValidationError::InvalidResourceUri(self.resource_uri));
        }
        if !is_valid_principal_id(&self.principal_id) {
            return Err(ValidationError::InvalidPrincipalId(self.principal_id));
        }

        let granted_at = truncate_to_micros(self.granted_at.unwrap_or_else(Utc::now));
        let expires_at = self.expires_at.map(truncate_to_micros);
        if expires_at.is_some_and(|expires_at| expires_at <= granted_at) {
            return Err(ValidationError::ExpiresBeforeGranted);
        }

        if self.delegation_depth > MAX_DELEGATION_DEPTH {
            return Err(ValidationError::InvalidDelegationDepth(self.delegation_depth));
        }

        Ok(Capability {
            id: self.id.unwrap_or_else(generate_id),
            resource_uri: self.resource_uri,
            principal_id: self.principal_id,
            granted_at,
            expires_at,
            parent_capability_id: self.parent_capability_id,
            delegation_depth: self.delegation_depth,
            constraints: self.constraints,
            signature: None,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    fn capability(uri: &str) -> Capability {
        Capability::new(uri, "agent_abc").unwrap()
    }

    #[test]
    fn test_new_defaults() {
        let cap = capability("arbor://fs/read/x");
        assert!(cap.id().starts_with("cap_"));
        assert_eq!(cap.delegation_depth(), 3);
        assert!(cap.expires_at().is_none());
        assert!(cap.parent_capability_id().is_none());
        assert!(cap.signature().is_none());
    }

    #[test]
    fn test_resource_uri_grammar() {
        assert!(is_valid_resource_uri("arbor://fs/read"));
        assert!(is_valid_resource_uri("arbor://fs/read/home/user/file.txt"));
        assert!(is_valid_resource_uri("arbor://shell/execute_safe/"));
        assert!(!is_valid_resource_uri("arbor://FS/read/x"));
        assert!(!is_valid_resource_uri("arbor://fs"));
        assert!(!is_valid_resource_uri("https://fs/read/x"));
        assert!(!is_valid_resource_uri("arbor://fs/read/a b"));

        assert_eq!(
            Capability::new("fs/read", "agent_abc").unwrap_err(),
            ValidationError::InvalidResourceUri("fs/read".to_string())
        );
    }

    #[test]
    fn test_principal_grammar() {
        assert!(is_valid_principal_id("agent_abc123"));
        assert!(!is_valid_principal_id("agent_"));
        assert!(!is_valid_principal_id("agent_XYZ"));
        assert!(!is_valid_principal_id("user_abc"));
        assert_eq!(
            Capability::new("arbor://fs/read/x", "bob").unwrap_err(),
            ValidationError::InvalidPrincipalId("bob".to_string())
        );
    }

    #[test]
    fn test_expires_before_granted() {
        let granted_at = Utc::now();
        let err = Capability::builder("arbor://fs/read/x", "agent_abc")
            .granted_at(granted_at)
            .expires_at(granted_at - TimeDelta::seconds(1))
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::ExpiresBeforeGranted);
    }

    #[test]
    fn test_delegation_depth_bound() {
        assert!(Capability::builder("arbor://fs/read/x", "agent_abc")
            .delegation_depth(10)
            .build()
            .is_ok());
        assert_eq!(
            Capability::builder("arbor://fs/read/x", "agent_abc")
                .delegation_depth(11)
                .build()
                .unwrap_err(),
            ValidationError::InvalidDelegationDepth(11)
        );
    }

    #[test]
    fn test_grants_access() {
        let cap = capability("arbor://fs/read/home");
        assert!(cap.grants_access("arbor://fs/read/home"));
        assert!(cap.grants_access("arbor://fs/read/home/user/notes.md"));
        assert!(!cap.grants_access("arbor://fs/read/homer"));
        assert!(!cap.grants_access("arbor://fs/read"));
        assert!(!cap.grants_access("arbor://fs/write/home"));
    }

    #[test]
    fn test_delegate_decrements_depth() {
        let parent = Capability::builder("arbor://fs/read/x", "agent_abc")
            .delegation_depth(2)
            .build()
            .unwrap();
        let child = parent.delegate("agent_def", DelegateOptions::new()).unwrap();
        assert_eq!(child.delegation_depth(), 1);
        assert_eq!(child.parent_capability_id(), Some(parent.id()));
        assert_eq!(child.principal_id(), "agent_def");
        assert_ne!(child.id(), parent.id());

        let grandchild = child.delegate("agent_123", DelegateOptions::new()).unwrap();
        assert_eq!(grandchild.delegation_depth(), 0);
        assert_eq!(
            grandchild.delegate("agent_456", DelegateOptions::new()),
            Err(DelegationError::DepthExhausted)
        );
    }

    #[test]
    fn test_delegate_expiry_is_bounded() {
        let now = Utc::now();
        let parent = Capability::builder("arbor://fs/read/x", "agent_abc")
            .granted_at(now)
            .expires_at(now + TimeDelta::hours(1))
            .build()
            .unwrap();

        let later = parent
            .delegate("agent_def", DelegateOptions::new().expires_at(now + TimeDelta::hours(5)))
            .unwrap();
        assert_eq!(later.expires_at(), parent.expires_at());

        let sooner_at = now + TimeDelta::minutes(10);
        let sooner = parent
            .delegate("agent_def", DelegateOptions::new().expires_at(sooner_at))
            .unwrap();
        assert_eq!(sooner.expires_at(), Some(truncate_to_micros(sooner_at)));

        let inherited = parent.delegate("agent_def", DelegateOptions::new()).unwrap();
        assert_eq!(inherited.expires_at(), parent.expires_at());

        let open = capability("arbor://fs/read/x");
        let bounded = open
            .delegate("agent_def", DelegateOptions::new().expires_at(sooner_at))
            .unwrap();
        assert_eq!(bounded.expires_at(), Some(truncate_to_micros(sooner_at)));
    }

    #[test]
    fn test_delegate_merges_constraints() {
        let parent = Capability::builder("arbor://fs/read/x", "agent_abc")
            .constraint("max_bytes", json!(1024))
            .constraint("operations", json!(["read", "stat"]))
            .build()
            .unwrap();
        let child = parent
            .delegate(
                "agent_def",
                DelegateOptions::new().constraint("operations", json!(["read"])),
            )
            .unwrap();
        assert_eq!(child.constraints()["max_bytes"], json!(1024));
        assert_eq!(child.constraints()["operations"], json!(["read"]));
    }

    #[test]
    fn test_delegate_narrows_scope() {
        let parent = capability("arbor://fs/read/project");
        let child = parent
            .delegate(
                "agent_def",
                DelegateOptions::new().resource_uri("arbor://fs/read/project/src"),
            )
            .unwrap();
        assert_eq!(child.resource_uri(), "arbor://fs/read/project/src");

        let err = parent
            .delegate("agent_def", DelegateOptions::new().resource_uri("arbor://fs/write/project"))
            .unwrap_err();
        assert_eq!(
            err,
            DelegationError::ScopeEscalation {
                granted: "arbor://fs/read/project".to_string(),
                requested: "arbor://fs/write/project".to_string(),
            }
        );
    }

    #[test]
    fn test_delegate_validates_principal() {
        let parent = capability("arbor://fs/read/x");
        assert_eq!(
            parent.delegate("mallory", DelegateOptions::new()),
            Err(DelegationError::Invalid(ValidationError::InvalidPrincipalId(
                "mallory".to_string()
            )))
        );
    }

    #[test]
    fn test_is_expired() {
        let now = Utc::now();
        let cap = Capability::builder("arbor://fs/read/x", "agent_abc")
            .granted_at(now)
            .ttl(TimeDelta::seconds(60))
            .build()
            .unwrap();
        assert!(!cap.is_expired(now));
        assert!(cap.is_expired(now + TimeDelta::seconds(60)));
        assert!(!capability("arbor://fs/read/x").is_expired(now + TimeDelta::days(365)));
    }

    #[test]
    fn test_sign_and_verify() {
        let granter = Identity::generate(Some("root")).unwrap();
        let (private, _) = keys::generate_signing_keypair();
        let cap = capability("arbor://fs/read/x");

        let signed = cap.sign(private.as_slice()).unwrap();
        let public = keys::signing_public_key(private.as_slice()).unwrap();
        assert!(signed.verify_signature(&public).is_ok());
        assert_eq!(
            signed.verify_signature(granter.public_key()),
            Err(VerificationError::InvalidSignature)
        );
        assert_eq!(cap.verify_signature(&public), Err(VerificationError::MalformedSignature));
    }

    #[test]
    fn test_signature_covers_constraints() {
        let (private, public) = keys::generate_signing_keypair();
        let signed = Capability::builder("arbor://fs/read/x", "agent_abc")
            .constraint("operations", json!(["read"]))
            .build()
            .unwrap()
            .sign(private.as_slice())
            .unwrap();

        let mut tampered = signed.clone();
        tampered
            .constraints
            .insert("operations".to_string(), json!(["read", "delete"]));
        assert_eq!(
            tampered.verify_signature(&public),
            Err(VerificationError::InvalidSignature)
        );
    }

    #[test]
    fn test_to_json_omits_signature() {
        let (private, _) = keys::generate_signing_keypair();
        let cap = capability("arbor://fs/read/x").sign(private.as_slice()).unwrap();
        let json = cap.to_json();
        assert_eq!(json["resource_uri"], "arbor://fs/read/x");
        assert_eq!(json["delegation_depth"], 3);
        assert!(json["expires_at"].is_null());
        assert!(json.get("signature").is_none());
    }

    #[test]
    fn test_config_depth() {
        let config = CapabilityConfig {
            default_delegation_depth: 0,
        };
        let cap = Capability::builder("arbor://fs/read/x", "agent_abc")
            .config(&config)
            .build()
            .unwrap();
        assert!(!cap.can_delegate());
    }
}
