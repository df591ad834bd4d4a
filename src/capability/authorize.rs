//! Capability authorization check

use super::Capability;
use crate::error::AuthorizationDenied;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Constraint key listing the operations a capability permits
pub const OPERATIONS_CONSTRAINT: &str = "operations";

/// Who is asking, and when
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationContext {
    pub principal_id: String,
    pub now: DateTime<Utc>,
}

impl AuthorizationContext {
    /// Context for `principal_id` evaluated at the current time
    pub fn new(principal_id: impl Into<String>) -> Self {
        Self {
            principal_id: principal_id.into(),
            now: Utc::now(),
        }
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

/// Decide whether `capability` lets the context's principal perform
/// `operation` on `resource_uri`.
///
/// Checks run in order: expiry, principal, resource scope, then the
/// `operations` constraint when present. A malformed `operations` value
/// permits nothing.
pub fn authorize(
    capability: &Capability,
    resource_uri: &str,
    operation: &str,
    context: &AuthorizationContext,
) -> Result<(), AuthorizationDenied> {
    if capability.is_expired(context.now) {
        return Err(AuthorizationDenied::Expired(capability.id().to_string()));
    }

    if capability.principal_id() != context.principal_id {
        return Err(AuthorizationDenied::PrincipalMismatch {
            expected: capability.principal_id().to_string(),
            actual: context.principal_id.clone(),
        });
    }

    if !capability.grants_access(resource_uri) {
        return Err(AuthorizationDenied::ResourceNotGranted(resource_uri.to_string()));
    }

    if let Some(allowed) = capability.constraints().get(OPERATIONS_CONSTRAINT) {
        if !operation_listed(allowed, operation) {
            tracing::debug!(
                capability = %capability.id(),
                operation,
                "Operation not permitted by constraints"
            );
            return Err(AuthorizationDenied::OperationNotPermitted(operation.to_string()));
        }
    }

    Ok(())
}

fn operation_listed(allowed: &Value, operation: &str) -> bool {
    match allowed {
        Value::Array(items) => items.iter().any(|item| item.as_str() == Some(operation)),
        _ => false,
    }
}
