//! Core governance record types consumed by the resolution engine
//!
//! These mirror the persistence layer's already-committed rows. The engine
//! never mutates them; everything here is read-only input plus the computed
//! `EffectivePermissionEntry` output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tenant node in the organization tree
///
/// Tenants form a tree via `parent_id`; the ancestor chain is walked
/// root-first for permission inheritance. The tree is assumed acyclic and
/// is not re-validated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Tenant {
    pub fn new(name: impl Into<String>, parent_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            parent_id,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A role, optionally inheriting permissions up its `parent_role_id` chain
///
/// `tenant_id: None` marks a global/system role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub parent_role_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Role {
    pub fn new(name: impl Into<String>, tenant_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            parent_role_id: None,
            tenant_id,
            deleted_at: None,
        }
    }

    pub fn with_parent(mut self, parent_role_id: Uuid) -> Self {
        self.parent_role_id = Some(parent_role_id);
        self
    }
}

/// A permission with a globally unique composite key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    pub domain: String,
    pub resource: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
}

impl Permission {
    pub fn new(
        domain: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            domain: domain.into(),
            resource: resource.into(),
            action: action.into(),
            subtype: None,
        }
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    /// Renders the composite key: `domain:resource:action[:subtype]`
    pub fn key(&self) -> String {
        match &self.subtype {
            Some(subtype) => format!(
                "{}:{}:{}:{}",
                self.domain, self.resource, self.action, subtype
            ),
            None => format!("{}:{}:{}", self.domain, self.resource, self.action),
        }
    }
}

/// Join row: a role carries a permission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermission {
    pub role_id: Uuid,
    pub permission_id: Uuid,
}

/// Join row: a user holds a role within a tenant
///
/// Expired assignments are excluded from resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRole {
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub tenant_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl UserRole {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires) if expires <= now)
    }
}

/// A tenant-scoped group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Group {
    pub fn new(tenant_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.into(),
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Join row: group nesting, child inherits from parent
///
/// Forms a tree per tenant; the closure walk is cycle-tolerant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub parent_group_id: Uuid,
    pub child_group_id: Uuid,
}

/// Join row: a group carries a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRole {
    pub group_id: Uuid,
    pub role_id: Uuid,
}

/// Join row: a user belongs to a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGroup {
    pub user_id: Uuid,
    pub group_id: Uuid,
}

/// Kind of principal an override record targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalType {
    User,
    Group,
    Role,
}

impl PrincipalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Role => "role",
        }
    }
}

/// An explicit per-principal deny record
///
/// Deny-only: an override removes access already granted through RBAC and
/// has no power to grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOverride {
    pub principal_type: PrincipalType,
    pub principal_id: Uuid,
    pub tenant_id: Uuid,
    pub permission_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Policy effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolicyEffect {
    /// Allow the action
    Allow,
    /// Deny the action
    Deny,
}

/// An attribute-based policy evaluated through the expression engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbacPolicy {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,

    /// Expression text in the sandboxed language
    pub expression: String,

    pub effect: PolicyEffect,

    /// Higher priority is evaluated first
    #[serde(default)]
    pub priority: i32,

    /// When set, the policy only applies to checks of this permission
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_permission_id: Option<Uuid>,

    pub is_enabled: bool,
}

impl AbacPolicy {
    pub fn new(
        tenant_id: Uuid,
        name: impl Into<String>,
        expression: impl Into<String>,
        effect: PolicyEffect,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.into(),
            expression: expression.into(),
            effect,
            priority: 0,
            target_permission_id: None,
            is_enabled: true,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_target(mut self, permission_id: Uuid) -> Self {
        self.target_permission_id = Some(permission_id);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.is_enabled = false;
        self
    }
}

/// A resolved permission a user holds at a tenant, with provenance
///
/// Recomputed on every call; never persisted or cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePermissionEntry {
    /// Composite permission key this entry grants
    pub permission_key: String,

    /// Human-readable provenance, e.g. `role:Tenant Admin@Root`
    pub source: String,

    /// Role the grant came through
    pub role_name: String,

    /// Group the role was reached through, when group-derived
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,

    /// Tenant the grant was assigned at
    pub source_tenant_id: Uuid,
    pub source_tenant_name: String,

    /// True when the grant comes from an ancestor tenant
    pub is_inherited: bool,

    /// True when a deny override or the ABAC sweep revoked this entry
    pub is_denied: bool,

    /// Provenance of the deny, when denied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deny_source: Option<String>,
}

/// Outcome of a permission check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    /// Whether the action is allowed
    pub allowed: bool,

    /// Provenance of the decision; `None` for the default deny
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl AccessDecision {
    pub fn allow(source: impl Into<String>) -> Self {
        Self {
            allowed: true,
            source: Some(source.into()),
        }
    }

    pub fn deny(source: impl Into<String>) -> Self {
        Self {
            allowed: false,
            source: Some(source.into()),
        }
    }

    /// The default deny: no grant, no policy, no match
    pub fn default_deny() -> Self {
        Self {
            allowed: false,
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_key_rendering() {
        let permission = Permission::new("cmdb", "ci", "read");
        assert_eq!(permission.key(), "cmdb:ci:read");

        let with_subtype = Permission::new("cmdb", "ci", "read").with_subtype("sensitive");
        assert_eq!(with_subtype.key(), "cmdb:ci:read:sensitive");
    }

    #[test]
    fn test_user_role_expiry() {
        let now = Utc::now();
        let role_id = Uuid::new_v4();

        let open_ended = UserRole {
            user_id: Uuid::new_v4(),
            role_id,
            tenant_id: Uuid::new_v4(),
            expires_at: None,
        };
        assert!(!open_ended.is_expired(now));

        let expired = UserRole {
            expires_at: Some(now - chrono::Duration::hours(1)),
            ..open_ended.clone()
        };
        assert!(expired.is_expired(now));

        let live = UserRole {
            expires_at: Some(now + chrono::Duration::hours(1)),
            ..open_ended
        };
        assert!(!live.is_expired(now));
    }

    #[test]
    fn test_policy_effect_serde() {
        let allow: PolicyEffect = serde_json::from_str("\"ALLOW\"").unwrap();
        assert_eq!(allow, PolicyEffect::Allow);
        assert_eq!(serde_json::to_string(&PolicyEffect::Deny).unwrap(), "\"DENY\"");
    }

    #[test]
    fn test_access_decision_constructors() {
        let allow = AccessDecision::allow("role:Admin@Root");
        assert!(allow.allowed);
        assert_eq!(allow.source.as_deref(), Some("role:Admin@Root"));

        let default = AccessDecision::default_deny();
        assert!(!default.allowed);
        assert!(default.source.is_none());
    }
}
