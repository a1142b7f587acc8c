//! ABAC policy evaluation
//!
//! Enabled policies are gathered across the whole ancestor chain and
//! evaluated in descending priority order, first match wins. A policy whose
//! expression fails — structurally malformed or erroring at evaluation —
//! is logged and treated as "did not match": one bad policy must never
//! abort resolution for the rest of the system, in either direction.

use tracing::warn;

use crate::error::Result;
use crate::expr::{evaluate, ExprContext, FunctionRegistry};
use crate::hierarchy::TenantRef;
use crate::roles::EffectiveMap;
use crate::store::AuthzStore;
use crate::types::{AbacPolicy, AccessDecision, PolicyEffect};

/// Load enabled policies across the chain, descending priority
///
/// Ties break root-first along the chain, then by policy name, so
/// first-match-wins is deterministic.
pub async fn load_policies(
    store: &dyn AuthzStore,
    chain: &[TenantRef],
) -> Result<Vec<AbacPolicy>> {
    let mut ordered: Vec<(usize, AbacPolicy)> = Vec::new();
    for (chain_idx, tenant) in chain.iter().enumerate() {
        for policy in store.policies_for_tenant(tenant.id).await? {
            if policy.is_enabled {
                ordered.push((chain_idx, policy));
            }
        }
    }

    ordered.sort_by(|(a_idx, a), (b_idx, b)| {
        b.priority
            .cmp(&a.priority)
            .then(a_idx.cmp(b_idx))
            .then(a.name.cmp(&b.name))
    });

    Ok(ordered.into_iter().map(|(_, policy)| policy).collect())
}

/// Targeted policy check used inside `check_permission`
///
/// Only policies with no target or one resolving to the checked key are
/// considered; the first truthy expression decides. `None` means every
/// policy abstained and the RBAC result stands alone.
pub async fn targeted_check(
    store: &dyn AuthzStore,
    chain: &[TenantRef],
    permission_key: &str,
    ctx: &ExprContext,
    functions: &FunctionRegistry,
) -> Result<Option<AccessDecision>> {
    for policy in load_policies(store, chain).await? {
        if let Some(target_id) = policy.target_permission_id {
            let Some(target) = store.permission(target_id).await? else {
                continue;
            };
            if target.key() != permission_key {
                continue;
            }
        }

        if !policy_matches(&policy, ctx, functions) {
            continue;
        }

        let decision = match policy.effect {
            PolicyEffect::Deny => AccessDecision::deny(format!("abac-deny:{}", policy.name)),
            PolicyEffect::Allow => AccessDecision::allow(format!("abac-allow:{}", policy.name)),
        };
        return Ok(Some(decision));
    }

    Ok(None)
}

/// Bulk deny sweep used inside the effective-permission listing
///
/// Only DENY-effect policies run, against a minimal context (user scope
/// only). A truthy match marks the policy's target key denied in the map.
/// Untargeted DENY policies name no key to mark and are skipped here; they
/// still participate in targeted checks.
pub async fn deny_sweep(
    store: &dyn AuthzStore,
    chain: &[TenantRef],
    ctx: &ExprContext,
    functions: &FunctionRegistry,
    map: &mut EffectiveMap,
) -> Result<()> {
    for policy in load_policies(store, chain).await? {
        if policy.effect != PolicyEffect::Deny {
            continue;
        }
        let Some(target_id) = policy.target_permission_id else {
            continue;
        };
        let Some(target) = store.permission(target_id).await? else {
            continue;
        };

        let Some(entry) = map.get_mut(&target.key()) else {
            continue;
        };
        if entry.is_denied {
            continue;
        }

        if policy_matches(&policy, ctx, functions) {
            entry.is_denied = true;
            entry.deny_source = Some(format!("abac-deny:{}", policy.name));
        }
    }

    Ok(())
}

/// Evaluate one policy expression, downgrading any failure to "no match"
fn policy_matches(policy: &AbacPolicy, ctx: &ExprContext, functions: &FunctionRegistry) -> bool {
    match evaluate(&policy.expression, ctx, functions) {
        Ok(value) => value.is_truthy(),
        Err(err) => {
            warn!(
                policy = %policy.name,
                error = %err,
                "policy expression failed, treating as no match"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Value;
    use crate::hierarchy::ancestor_chain;
    use crate::store::InMemoryStore;
    use crate::types::{EffectivePermissionEntry, Permission, Tenant};
    use uuid::Uuid;

    fn user_ctx(id: &str) -> ExprContext {
        let user = Value::Map(
            [("id".to_string(), Value::Str(id.to_string()))].into(),
        );
        ExprContext::new().with_scope("user", user)
    }

    fn entry(key: &str, tenant: &Tenant) -> EffectivePermissionEntry {
        EffectivePermissionEntry {
            permission_key: key.to_string(),
            source: format!("role:Reader@{}", tenant.name),
            role_name: "Reader".into(),
            group_name: None,
            source_tenant_id: tenant.id,
            source_tenant_name: tenant.name.clone(),
            is_inherited: false,
            is_denied: false,
            deny_source: None,
        }
    }

    struct Fixture {
        store: InMemoryStore,
        tenant: Tenant,
        chain: Vec<TenantRef>,
        functions: FunctionRegistry,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let tenant = Tenant::new("T", None);
        store.add_tenant(tenant.clone()).await;
        let chain = ancestor_chain(&store, tenant.id).await.unwrap();
        Fixture {
            store,
            tenant,
            chain,
            functions: FunctionRegistry::with_builtins(),
        }
    }

    #[tokio::test]
    async fn test_priority_order_first_match_wins() {
        let f = fixture().await;
        f.store
            .add_policy(
                AbacPolicy::new(f.tenant.id, "low-allow", "true", PolicyEffect::Allow)
                    .with_priority(1),
            )
            .await;
        f.store
            .add_policy(
                AbacPolicy::new(f.tenant.id, "high-deny", "true", PolicyEffect::Deny)
                    .with_priority(10),
            )
            .await;

        let decision = targeted_check(&f.store, &f.chain, "cmdb:ci:read", &user_ctx("u"), &f.functions)
            .await
            .unwrap()
            .unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.source.as_deref(), Some("abac-deny:high-deny"));
    }

    #[tokio::test]
    async fn test_targeted_policy_only_applies_to_its_key() {
        let f = fixture().await;
        let permission = Permission::new("cmdb", "ci", "delete");
        f.store.add_permission(permission.clone()).await;
        f.store
            .add_policy(
                AbacPolicy::new(f.tenant.id, "deny-delete", "true", PolicyEffect::Deny)
                    .with_target(permission.id),
            )
            .await;

        let other = targeted_check(&f.store, &f.chain, "cmdb:ci:read", &user_ctx("u"), &f.functions)
            .await
            .unwrap();
        assert!(other.is_none());

        let matching =
            targeted_check(&f.store, &f.chain, "cmdb:ci:delete", &user_ctx("u"), &f.functions)
                .await
                .unwrap();
        assert!(matching.is_some());
    }

    #[tokio::test]
    async fn test_disabled_and_falsy_policies_abstain() {
        let f = fixture().await;
        f.store
            .add_policy(
                AbacPolicy::new(f.tenant.id, "disabled", "true", PolicyEffect::Deny).disabled(),
            )
            .await;
        f.store
            .add_policy(AbacPolicy::new(f.tenant.id, "falsy", "1 > 2", PolicyEffect::Deny))
            .await;

        let decision = targeted_check(&f.store, &f.chain, "x:y:z", &user_ctx("u"), &f.functions)
            .await
            .unwrap();
        assert!(decision.is_none());
    }

    #[tokio::test]
    async fn test_malformed_policy_is_skipped_not_fatal() {
        let f = fixture().await;
        f.store
            .add_policy(
                AbacPolicy::new(f.tenant.id, "broken", "$user.missing ==", PolicyEffect::Deny)
                    .with_priority(10),
            )
            .await;
        f.store
            .add_policy(
                AbacPolicy::new(f.tenant.id, "working", "true", PolicyEffect::Allow)
                    .with_priority(1),
            )
            .await;

        let decision = targeted_check(&f.store, &f.chain, "x:y:z", &user_ctx("u"), &f.functions)
            .await
            .unwrap()
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.source.as_deref(), Some("abac-allow:working"));
    }

    #[tokio::test]
    async fn test_evaluation_error_is_skipped_too() {
        let f = fixture().await;
        // Structurally fine, fails at evaluation against this context
        f.store
            .add_policy(AbacPolicy::new(
                f.tenant.id,
                "needs-resource",
                "$resource.owner == $user.id",
                PolicyEffect::Deny,
            ))
            .await;

        let decision = targeted_check(&f.store, &f.chain, "x:y:z", &user_ctx("u"), &f.functions)
            .await
            .unwrap();
        assert!(decision.is_none());
    }

    #[tokio::test]
    async fn test_deny_sweep_marks_targeted_key() {
        let f = fixture().await;
        let permission = Permission::new("cmdb", "ci", "delete");
        f.store.add_permission(permission.clone()).await;
        f.store
            .add_policy(
                AbacPolicy::new(f.tenant.id, "freeze", "true", PolicyEffect::Deny)
                    .with_target(permission.id),
            )
            .await;
        // Untargeted deny must not blanket-deny the listing
        f.store
            .add_policy(AbacPolicy::new(f.tenant.id, "untargeted", "true", PolicyEffect::Deny))
            .await;

        let mut map = EffectiveMap::new();
        map.insert("cmdb:ci:delete".into(), entry("cmdb:ci:delete", &f.tenant));
        map.insert("cmdb:ci:read".into(), entry("cmdb:ci:read", &f.tenant));

        deny_sweep(&f.store, &f.chain, &user_ctx("u"), &f.functions, &mut map)
            .await
            .unwrap();

        assert!(map["cmdb:ci:delete"].is_denied);
        assert_eq!(
            map["cmdb:ci:delete"].deny_source.as_deref(),
            Some("abac-deny:freeze")
        );
        assert!(!map["cmdb:ci:read"].is_denied);
    }

    #[tokio::test]
    async fn test_deny_sweep_ignores_allow_policies() {
        let f = fixture().await;
        let permission = Permission::new("cmdb", "ci", "read");
        f.store.add_permission(permission.clone()).await;
        f.store
            .add_policy(
                AbacPolicy::new(f.tenant.id, "allow", "true", PolicyEffect::Allow)
                    .with_target(permission.id),
            )
            .await;

        let mut map = EffectiveMap::new();
        map.insert("cmdb:ci:read".into(), entry("cmdb:ci:read", &f.tenant));

        deny_sweep(&f.store, &f.chain, &user_ctx("u"), &f.functions, &mut map)
            .await
            .unwrap();
        assert!(!map["cmdb:ci:read"].is_denied);
    }

    #[tokio::test]
    async fn test_existing_deny_is_not_overwritten() {
        let f = fixture().await;
        let permission = Permission::new("cmdb", "ci", "delete");
        f.store.add_permission(permission.clone()).await;
        f.store
            .add_policy(
                AbacPolicy::new(f.tenant.id, "freeze", "true", PolicyEffect::Deny)
                    .with_target(permission.id),
            )
            .await;

        let mut map = EffectiveMap::new();
        let mut denied = entry("cmdb:ci:delete", &f.tenant);
        denied.is_denied = true;
        denied.deny_source = Some("override:user@T".into());
        map.insert("cmdb:ci:delete".into(), denied);

        deny_sweep(&f.store, &f.chain, &user_ctx("u"), &f.functions, &mut map)
            .await
            .unwrap();
        assert_eq!(
            map["cmdb:ci:delete"].deny_source.as_deref(),
            Some("override:user@T")
        );
    }
}
