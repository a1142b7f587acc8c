//! Role and permission aggregation across the tenant ancestor chain
//!
//! For every tenant from the root down to the target, direct and
//! group-derived role assignments are expanded up their `parent_role_id`
//! chains and merged into one permission map keyed by permission string.
//! Grants assigned at the target tenant are direct; grants from ancestors
//! are inherited. A direct grant's provenance replaces an inherited one for
//! the same key — never the other way around.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::groups::user_group_closure;
use crate::hierarchy::TenantRef;
use crate::store::AuthzStore;
use crate::types::{EffectivePermissionEntry, Role};

/// Deny-annotatable permission map keyed by permission string
///
/// Ordered so effective-permission listings are deterministic.
pub type EffectiveMap = BTreeMap<String, EffectivePermissionEntry>;

/// Principals resolved while aggregating, needed by the deny-override and
/// ABAC stages
#[derive(Debug, Clone, Default)]
pub struct ResolvedPrincipals {
    /// Every group in the user's closure across the chain
    pub group_ids: HashSet<Uuid>,
    /// Every role the user holds, including parent roles reached by
    /// inheritance
    pub role_ids: HashSet<Uuid>,
    /// Names of the held roles, for the ABAC user scope
    pub role_names: BTreeSet<String>,
}

/// Aggregate the user's permissions across the ancestor chain
///
/// `chain` must be root-first (see [`crate::hierarchy::ancestor_chain`]);
/// the last element is the target tenant.
pub async fn aggregate_permissions(
    store: &dyn AuthzStore,
    user_id: Uuid,
    chain: &[TenantRef],
) -> Result<(EffectiveMap, ResolvedPrincipals)> {
    let mut map = EffectiveMap::new();
    let mut principals = ResolvedPrincipals::default();

    let Some(target) = chain.last() else {
        return Ok((map, principals));
    };
    let now = Utc::now();

    for tenant in chain {
        let is_inherited = tenant.id != target.id;

        // (a) direct, non-expired role assignments
        let mut sources: Vec<(Uuid, Option<String>)> = store
            .user_roles(user_id, tenant.id)
            .await?
            .into_iter()
            .filter(|ur| !ur.is_expired(now))
            .map(|ur| (ur.role_id, None))
            .collect();

        // (b) group-derived role assignments
        let closure = user_group_closure(store, user_id, tenant.id).await?;
        principals.group_ids.extend(closure.group_ids());
        sources.extend(
            closure
                .roles
                .into_iter()
                .map(|b| (b.role_id, Some(b.group_name))),
        );

        for (role_id, group_name) in sources {
            let role_chain = expand_role_chain(store, role_id).await?;
            let Some(assigned) = role_chain.first() else {
                continue;
            };
            let assigned_name = assigned.name.clone();

            for role in &role_chain {
                principals.role_ids.insert(role.id);
                principals.role_names.insert(role.name.clone());
            }

            for role in &role_chain {
                for permission in store.role_permissions(role.id).await? {
                    let entry = EffectivePermissionEntry {
                        permission_key: permission.key(),
                        source: provenance(&assigned_name, group_name.as_deref(), &tenant.name),
                        role_name: assigned_name.clone(),
                        group_name: group_name.clone(),
                        source_tenant_id: tenant.id,
                        source_tenant_name: tenant.name.clone(),
                        is_inherited,
                        is_denied: false,
                        deny_source: None,
                    };
                    merge_entry(&mut map, entry);
                }
            }
        }
    }

    debug!(%user_id, tenant = %target.name, entries = map.len(), "aggregated permission map");
    Ok((map, principals))
}

/// Walk a role's `parent_role_id` chain, assigned role first
///
/// Missing and soft-deleted roles truncate the chain; a revisit is a
/// data-integrity condition that terminates the walk.
async fn expand_role_chain(store: &dyn AuthzStore, role_id: Uuid) -> Result<Vec<Role>> {
    let mut chain = Vec::new();
    let mut visited = HashSet::new();
    let mut current = Some(role_id);

    while let Some(id) = current {
        if !visited.insert(id) {
            warn!(role_id = %id, "cycle detected in role parent chain, truncating");
            break;
        }
        let Some(role) = store.role(id).await? else {
            break;
        };
        if role.deleted_at.is_some() {
            break;
        }
        current = role.parent_role_id;
        chain.push(role);
    }

    Ok(chain)
}

/// Merge one entry into the map: first writer wins, except that a direct
/// grant's provenance replaces an inherited one for the same key.
fn merge_entry(map: &mut EffectiveMap, entry: EffectivePermissionEntry) {
    match map.get(&entry.permission_key) {
        None => {
            map.insert(entry.permission_key.clone(), entry);
        }
        Some(existing) if existing.is_inherited && !entry.is_inherited => {
            map.insert(entry.permission_key.clone(), entry);
        }
        Some(_) => {}
    }
}

fn provenance(role_name: &str, group_name: Option<&str>, tenant_name: &str) -> String {
    match group_name {
        Some(group) => format!("group:{}:role:{}@{}", group, role_name, tenant_name),
        None => format!("role:{}@{}", role_name, tenant_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::ancestor_chain;
    use crate::store::InMemoryStore;
    use crate::types::{Group, Permission, Tenant, UserRole};

    struct Fixture {
        store: InMemoryStore,
        root: Tenant,
        team: Tenant,
        user_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let root = Tenant::new("Root", None);
        let team = Tenant::new("Team", Some(root.id));
        store.add_tenant(root.clone()).await;
        store.add_tenant(team.clone()).await;
        Fixture {
            store,
            root,
            team,
            user_id: Uuid::new_v4(),
        }
    }

    async fn chain(f: &Fixture, tenant_id: Uuid) -> Vec<TenantRef> {
        ancestor_chain(&f.store, tenant_id).await.unwrap()
    }

    fn assignment(user_id: Uuid, role_id: Uuid, tenant_id: Uuid) -> UserRole {
        UserRole {
            user_id,
            role_id,
            tenant_id,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_direct_assignment_at_target() {
        let f = fixture().await;
        let role = Role::new("Reader", Some(f.team.id));
        let permission = Permission::new("cmdb", "ci", "read");

        f.store.add_role(role.clone()).await;
        f.store.add_permission(permission.clone()).await;
        f.store.grant_role_permission(role.id, permission.id).await;
        f.store
            .assign_user_role(assignment(f.user_id, role.id, f.team.id))
            .await;

        let chain = chain(&f, f.team.id).await;
        let (map, principals) = aggregate_permissions(&f.store, f.user_id, &chain)
            .await
            .unwrap();

        let entry = &map["cmdb:ci:read"];
        assert!(!entry.is_inherited);
        assert_eq!(entry.source, "role:Reader@Team");
        assert_eq!(entry.source_tenant_id, f.team.id);
        assert!(principals.role_ids.contains(&role.id));
        assert!(principals.role_names.contains("Reader"));
    }

    #[tokio::test]
    async fn test_ancestor_grant_is_inherited() {
        let f = fixture().await;
        let role = Role::new("Admin", Some(f.root.id));
        let permission = Permission::new("cmdb", "ci", "create");

        f.store.add_role(role.clone()).await;
        f.store.add_permission(permission.clone()).await;
        f.store.grant_role_permission(role.id, permission.id).await;
        f.store
            .assign_user_role(assignment(f.user_id, role.id, f.root.id))
            .await;

        let chain = chain(&f, f.team.id).await;
        let (map, _) = aggregate_permissions(&f.store, f.user_id, &chain)
            .await
            .unwrap();

        let entry = &map["cmdb:ci:create"];
        assert!(entry.is_inherited);
        assert_eq!(entry.source, "role:Admin@Root");
    }

    #[tokio::test]
    async fn test_direct_provenance_replaces_inherited() {
        let f = fixture().await;
        let permission = Permission::new("cmdb", "ci", "read");
        let root_role = Role::new("RootReader", Some(f.root.id));
        let team_role = Role::new("TeamReader", Some(f.team.id));

        f.store.add_permission(permission.clone()).await;
        f.store.add_role(root_role.clone()).await;
        f.store.add_role(team_role.clone()).await;
        f.store.grant_role_permission(root_role.id, permission.id).await;
        f.store.grant_role_permission(team_role.id, permission.id).await;
        f.store
            .assign_user_role(assignment(f.user_id, root_role.id, f.root.id))
            .await;
        f.store
            .assign_user_role(assignment(f.user_id, team_role.id, f.team.id))
            .await;

        let chain = chain(&f, f.team.id).await;
        let (map, _) = aggregate_permissions(&f.store, f.user_id, &chain)
            .await
            .unwrap();

        let entry = &map["cmdb:ci:read"];
        assert!(!entry.is_inherited);
        assert_eq!(entry.role_name, "TeamReader");
    }

    #[tokio::test]
    async fn test_expired_assignment_excluded() {
        let f = fixture().await;
        let role = Role::new("Reader", Some(f.team.id));
        let permission = Permission::new("cmdb", "ci", "read");

        f.store.add_role(role.clone()).await;
        f.store.add_permission(permission.clone()).await;
        f.store.grant_role_permission(role.id, permission.id).await;
        f.store
            .assign_user_role(UserRole {
                expires_at: Some(Utc::now() - chrono::Duration::minutes(1)),
                ..assignment(f.user_id, role.id, f.team.id)
            })
            .await;

        let chain = chain(&f, f.team.id).await;
        let (map, _) = aggregate_permissions(&f.store, f.user_id, &chain)
            .await
            .unwrap();
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn test_role_parent_chain_collects_inherited_permissions() {
        let f = fixture().await;
        let base = Role::new("Base", Some(f.team.id));
        let derived = Role::new("Derived", Some(f.team.id)).with_parent(base.id);
        let base_perm = Permission::new("cmdb", "ci", "read");
        let derived_perm = Permission::new("cmdb", "ci", "update");

        f.store.add_role(base.clone()).await;
        f.store.add_role(derived.clone()).await;
        f.store.add_permission(base_perm.clone()).await;
        f.store.add_permission(derived_perm.clone()).await;
        f.store.grant_role_permission(base.id, base_perm.id).await;
        f.store.grant_role_permission(derived.id, derived_perm.id).await;
        f.store
            .assign_user_role(assignment(f.user_id, derived.id, f.team.id))
            .await;

        let chain = chain(&f, f.team.id).await;
        let (map, principals) = aggregate_permissions(&f.store, f.user_id, &chain)
            .await
            .unwrap();

        assert!(map.contains_key("cmdb:ci:read"));
        assert!(map.contains_key("cmdb:ci:update"));
        // Both attributed to the assigned role
        assert_eq!(map["cmdb:ci:read"].role_name, "Derived");
        // Parent roles count as held for override matching
        assert!(principals.role_ids.contains(&base.id));
    }

    #[tokio::test]
    async fn test_role_parent_cycle_terminates() {
        let f = fixture().await;
        let a_id = Uuid::new_v4();
        let b_id = Uuid::new_v4();
        let a = Role {
            id: a_id,
            name: "A".into(),
            parent_role_id: Some(b_id),
            tenant_id: Some(f.team.id),
            deleted_at: None,
        };
        let b = Role {
            id: b_id,
            name: "B".into(),
            parent_role_id: Some(a_id),
            tenant_id: Some(f.team.id),
            deleted_at: None,
        };
        f.store.add_role(a).await;
        f.store.add_role(b).await;

        let roles = expand_role_chain(&f.store, a_id).await.unwrap();
        assert_eq!(roles.len(), 2);
    }

    #[tokio::test]
    async fn test_group_derived_grant_carries_group_provenance() {
        let f = fixture().await;
        let group = Group::new(f.team.id, "ops");
        let role = Role::new("Operator", Some(f.team.id));
        let permission = Permission::new("cmdb", "ci", "restart");

        f.store.add_group(group.clone()).await;
        f.store.add_role(role.clone()).await;
        f.store.add_permission(permission.clone()).await;
        f.store.grant_role_permission(role.id, permission.id).await;
        f.store.add_user_to_group(f.user_id, group.id).await;
        f.store.assign_group_role(group.id, role.id).await;

        let chain = chain(&f, f.team.id).await;
        let (map, principals) = aggregate_permissions(&f.store, f.user_id, &chain)
            .await
            .unwrap();

        let entry = &map["cmdb:ci:restart"];
        assert_eq!(entry.group_name.as_deref(), Some("ops"));
        assert_eq!(entry.source, "group:ops:role:Operator@Team");
        assert!(principals.group_ids.contains(&group.id));
    }
}
