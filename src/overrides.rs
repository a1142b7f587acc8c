//! Deny override application
//!
//! Explicit `PermissionOverride` records revoke access the RBAC stage has
//! already granted. An override matches when its principal is the user
//! directly, any group in the user's closure, or any role the user resolved
//! to — at any tenant along the ancestor chain. Overrides only flip
//! existing entries to denied; they can never add permissions.

use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::hierarchy::TenantRef;
use crate::roles::{EffectiveMap, ResolvedPrincipals};
use crate::store::AuthzStore;
use crate::types::{PermissionOverride, PrincipalType};

/// Apply deny overrides across the ancestor chain to the aggregated map
pub async fn apply_deny_overrides(
    store: &dyn AuthzStore,
    chain: &[TenantRef],
    user_id: Uuid,
    principals: &ResolvedPrincipals,
    map: &mut EffectiveMap,
) -> Result<()> {
    for tenant in chain {
        for record in store.overrides_for_tenant(tenant.id).await? {
            if !matches_principal(&record, user_id, principals) {
                continue;
            }

            // The override references a permission id; entries are keyed
            // by permission string.
            let Some(permission) = store.permission(record.permission_id).await? else {
                continue;
            };
            let key = permission.key();

            if let Some(entry) = map.get_mut(&key) {
                if !entry.is_denied {
                    entry.is_denied = true;
                    entry.deny_source = Some(deny_source(&record, &tenant.name));
                    debug!(%user_id, %key, tenant = %tenant.name, "deny override matched");
                }
            }
        }
    }

    Ok(())
}

fn matches_principal(
    record: &PermissionOverride,
    user_id: Uuid,
    principals: &ResolvedPrincipals,
) -> bool {
    match record.principal_type {
        PrincipalType::User => record.principal_id == user_id,
        PrincipalType::Group => principals.group_ids.contains(&record.principal_id),
        PrincipalType::Role => principals.role_ids.contains(&record.principal_id),
    }
}

fn deny_source(record: &PermissionOverride, tenant_name: &str) -> String {
    match &record.reason {
        Some(reason) => format!(
            "override:{}@{} ({})",
            record.principal_type.as_str(),
            tenant_name,
            reason
        ),
        None => format!("override:{}@{}", record.principal_type.as_str(), tenant_name),
    }
}
