//! Contract for the external capability store
//!
//! Persistence of grants, revocations and the audit log lives outside this
//! crate. [`CapabilityAuthority`] is the interface the action-execution layer
//! calls; implementations decide their own storage and concurrency.

use super::{AuditEvent, AuditEventType, AuthorizationContext, Capability};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Selection of capabilities for [`CapabilityAuthority::list_capabilities`]
#[derive(Debug, Clone, Default)]
pub struct CapabilityFilter {
    pub principal_id: Option<String>,
    /// Only capabilities whose resource starts with this prefix
    pub resource_prefix: Option<String>,
    pub include_expired: bool,
}

impl CapabilityFilter {
    pub fn for_principal(principal_id: impl Into<String>) -> Self {
        Self {
            principal_id: Some(principal_id.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, capability: &Capability, now: DateTime<Utc>) -> bool {
        self.principal_id
            .as_deref()
            .map_or(true, |principal| capability.principal_id() == principal)
            && self
                .resource_prefix
                .as_deref()
                .map_or(true, |prefix| capability.resource_uri().starts_with(prefix))
            && (self.include_expired || !capability.is_expired(now))
    }
}

/// Selection of audit events for [`CapabilityAuthority::get_audit_trail`]
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub event_type: Option<AuditEventType>,
    pub principal_id: Option<String>,
    pub capability_id: Option<String>,
    /// Only events at or after this time
    pub since: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn matches(&self, event: &AuditEvent) -> bool {
        self.event_type.map_or(true, |t| event.event_type() == t)
            && self
                .principal_id
                .as_deref()
                .map_or(true, |principal| event.principal_id() == principal)
            && self
                .capability_id
                .as_deref()
                .map_or(true, |id| event.capability_id() == Some(id))
            && self.since.map_or(true, |since| event.timestamp() >= since)
    }
}

/// Grant, revoke, delegate and authorize capabilities against a store.
#[async_trait]
pub trait CapabilityAuthority: Send + Sync {
    /// Check a capability for an operation. Implementations must also refuse
    /// revoked capabilities.
    async fn authorize(
        &self,
        capability: &Capability,
        resource_uri: &str,
        operation: &str,
        context: &AuthorizationContext,
    ) -> Result<()>;

    /// Grant `principal_id` access to `resource_uri`
    async fn grant_capability(
        &self,
        principal_id: &str,
        resource_uri: &str,
        constraints: Map<String, Value>,
        granter_id: &str,
    ) -> Result<Capability>;

    /// Revoke a capability, and with `cascade` every capability delegated
    /// from it
    async fn revoke_capability(
        &self,
        capability_id: &str,
        reason: &str,
        revoker_id: &str,
        cascade: bool,
    ) -> Result<()>;

    /// Delegate `parent` to `delegate_to` with additional constraints
    async fn delegate_capability(
        &self,
        parent: &Capability,
        delegate_to: &str,
        constraints: Map<String, Value>,
        delegator_id: &str,
    ) -> Result<Capability>;

    async fn list_capabilities(&self, filter: &CapabilityFilter) -> Result<Vec<Capability>>;

    async fn get_audit_trail(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>>;
}
