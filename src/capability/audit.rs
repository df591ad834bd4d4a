//! Audit events for capability operations

use super::Capability;
use crate::error::AuthorizationDenied;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// Kind of security-relevant occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    CapabilityGranted,
    CapabilityRevoked,
    CapabilityDelegated,
    AuthorizationSuccess,
    AuthorizationDenied,
    PolicyViolation,
    SecurityAlert,
    CapabilityExpired,
}

impl AuditEventType {
    pub const fn as_str(self) -> &'static str {
        match self {
            AuditEventType::CapabilityGranted => "capability_granted",
            AuditEventType::CapabilityRevoked => "capability_revoked",
            AuditEventType::CapabilityDelegated => "capability_delegated",
            AuditEventType::AuthorizationSuccess => "authorization_success",
            AuditEventType::AuthorizationDenied => "authorization_denied",
            AuditEventType::PolicyViolation => "policy_violation",
            AuditEventType::SecurityAlert => "security_alert",
            AuditEventType::CapabilityExpired => "capability_expired",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization outcome recorded on an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
}

/// Immutable record of a security-relevant occurrence.
///
/// Built through the per-type constructors and the `with_*` methods; there
/// is no way to change an event once it has been handed on.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    id: String,
    event_type: AuditEventType,
    timestamp: DateTime<Utc>,
    capability_id: Option<String>,
    principal_id: String,
    actor_id: Option<String>,
    session_id: Option<String>,
    resource_uri: Option<String>,
    operation: Option<String>,
    decision: Option<Decision>,
    reason: Option<String>,
    context: Map<String, Value>,
    metadata: Map<String, Value>,
}

impl AuditEvent {
    /// Bare event of the given type about `principal_id`
    pub fn new(event_type: AuditEventType, principal_id: impl Into<String>) -> Self {
        Self {
            id: format!("evt_{}", uuid::Uuid::new_v4().simple()),
            event_type,
            timestamp: Utc::now(),
            capability_id: None,
            principal_id: principal_id.into(),
            actor_id: None,
            session_id: None,
            resource_uri: None,
            operation: None,
            decision: None,
            reason: None,
            context: Map::new(),
            metadata: Map::new(),
        }
    }

    fn about(event_type: AuditEventType, capability: &Capability) -> Self {
        let mut event = Self::new(event_type, capability.principal_id());
        event.capability_id = Some(capability.id().to_string());
        event.resource_uri = Some(capability.resource_uri().to_string());
        event
    }

    /// `granter_id` granted `capability`
    pub fn granted(capability: &Capability, granter_id: impl Into<String>) -> Self {
        Self::about(AuditEventType::CapabilityGranted, capability).with_actor(granter_id)
    }

    /// `revoker_id` revoked the capability
    pub fn revoked(
        capability: &Capability,
        revoker_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::about(AuditEventType::CapabilityRevoked, capability)
            .with_actor(revoker_id)
            .with_reason(reason)
    }

    /// `delegator_id` derived `child`
    pub fn delegated(child: &Capability, delegator_id: impl Into<String>) -> Self {
        let mut event =
            Self::about(AuditEventType::CapabilityDelegated, child).with_actor(delegator_id);
        if let Some(parent) = child.parent_capability_id() {
            event.context.insert("parent_capability_id".to_string(), json!(parent));
        }
        event.context.insert("delegation_depth".to_string(), json!(child.delegation_depth()));
        event
    }

    /// An authorization check passed
    pub fn authorized(
        capability: &Capability,
        resource_uri: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        let mut event = Self::about(AuditEventType::AuthorizationSuccess, capability);
        event.resource_uri = Some(resource_uri.into());
        event.operation = Some(operation.into());
        event.decision = Some(Decision::Allow);
        event
    }

    /// An authorization check was refused
    pub fn denied(
        principal_id: impl Into<String>,
        resource_uri: impl Into<String>,
        operation: impl Into<String>,
        denial: &AuthorizationDenied,
    ) -> Self {
        let mut event = Self::new(AuditEventType::AuthorizationDenied, principal_id);
        event.resource_uri = Some(resource_uri.into());
        event.operation = Some(operation.into());
        event.decision = Some(Decision::Deny);
        event.reason = Some(denial.to_string());
        event
    }

    pub fn policy_violation(principal_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(AuditEventType::PolicyViolation, principal_id).with_reason(reason)
    }

    pub fn security_alert(principal_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(AuditEventType::SecurityAlert, principal_id).with_reason(reason)
    }

    pub fn expired(capability: &Capability) -> Self {
        Self::about(AuditEventType::CapabilityExpired, capability)
    }

    pub fn with_capability(mut self, capability_id: impl Into<String>) -> Self {
        self.capability_id = Some(capability_id.into());
        self
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn event_type(&self) -> AuditEventType {
        self.event_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn capability_id(&self) -> Option<&str> {
        self.capability_id.as_deref()
    }

    pub fn principal_id(&self) -> &str {
        &self.principal_id
    }

    pub fn actor_id(&self) -> Option<&str> {
        self.actor_id.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn resource_uri(&self) -> Option<&str> {
        self.resource_uri.as_deref()
    }

    pub fn operation(&self) -> Option<&str> {
        self.operation.as_deref()
    }

    pub fn decision(&self) -> Option<Decision> {
        self.decision
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// JSON encoding of every field
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "event_type": self.event_type,
            "timestamp": self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            "capability_id": self.capability_id,
            "principal_id": self.principal_id,
            "actor_id": self.actor_id,
            "session_id": self.session_id,
            "resource_uri": self.resource_uri,
            "operation": self.operation,
            "decision": self.decision,
            "reason": self.reason,
            "context": self.context,
            "metadata": self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::DelegateOptions;

    fn capability() -> Capability {
        Capability::new("arbor://fs/read/x", "agent_abc").unwrap()
    }

    #[test]
    fn test_granted() {
        let cap = capability();
        let event = AuditEvent::granted(&cap, "agent_root");
        assert_eq!(event.event_type(), AuditEventType::CapabilityGranted);
        assert_eq!(event.capability_id(), Some(cap.id()));
        assert_eq!(event.principal_id(), "agent_abc");
        assert_eq!(event.actor_id(), Some("agent_root"));
        assert_eq!(event.resource_uri(), Some("arbor://fs/read/x"));
        assert!(event.id().starts_with("evt_"));
    }

    #[test]
    fn test_delegated_records_parent() {
        let parent = capability();
        let child = parent.delegate("agent_def", DelegateOptions::new()).unwrap();
        let event = AuditEvent::delegated(&child, "agent_abc");
        assert_eq!(event.principal_id(), "agent_def");
        assert_eq!(event.context()["parent_capability_id"], json!(parent.id()));
        assert_eq!(event.context()["delegation_depth"], json!(2));
    }

    #[test]
    fn test_denied() {
        let denial = AuthorizationDenied::ResourceNotGranted("arbor://fs/write/x".to_string());
        let event = AuditEvent::denied("agent_abc", "arbor://fs/write/x", "write", &denial)
            .with_session("sess-1");
        assert_eq!(event.decision(), Some(Decision::Deny));
        assert_eq!(event.reason(), Some("capability does not grant arbor://fs/write/x"));
        assert_eq!(event.session_id(), Some("sess-1"));
        assert!(event.capability_id().is_none());
    }

    #[test]
    fn test_to_json() {
        let cap = capability();
        let event = AuditEvent::authorized(&cap, "arbor://fs/read/x/a", "read")
            .with_metadata("source", json!("enforcer"));
        let json = event.to_json();
        assert_eq!(json["event_type"], "authorization_success");
        assert_eq!(json["decision"], "allow");
        assert_eq!(json["operation"], "read");
        assert_eq!(json["metadata"]["source"], "enforcer");
        assert!(json["actor_id"].is_null());
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(AuditEventType::SecurityAlert.to_string(), "security_alert");
        assert_eq!(
            serde_json::to_value(AuditEventType::CapabilityExpired).unwrap(),
            json!("capability_expired")
        );
        let event = AuditEvent::security_alert("agent_abc", "canary token leaked");
        assert_eq!(event.reason(), Some("canary token leaked"));
    }
}
