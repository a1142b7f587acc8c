//! Tenant hierarchy resolution
//!
//! Permission inheritance flows from the root of the tenant tree down to
//! the target tenant, so the resolver produces the ancestor chain
//! root-first. A missing or soft-deleted ancestor truncates the chain
//! leniently rather than failing the whole resolution.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::store::AuthzStore;

/// A resolved tenant in the ancestor chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantRef {
    pub id: Uuid,
    pub name: String,
}

/// Build the root-to-target ancestor chain for a tenant
///
/// Walks `parent_id` upward until it hits the root, a missing tenant, or a
/// soft-deleted one. The tenant tree is assumed acyclic; a revisit is
/// logged as a data-integrity condition and terminates the walk.
pub async fn ancestor_chain(store: &dyn AuthzStore, tenant_id: Uuid) -> Result<Vec<TenantRef>> {
    let mut chain = Vec::new();
    let mut visited = std::collections::HashSet::new();
    let mut current = Some(tenant_id);

    while let Some(id) = current {
        if !visited.insert(id) {
            warn!(tenant_id = %id, "cycle detected in tenant hierarchy, truncating chain");
            break;
        }

        let Some(tenant) = store.tenant(id).await? else {
            debug!(tenant_id = %id, "ancestor missing, truncating chain");
            break;
        };
        if tenant.is_deleted() {
            debug!(tenant_id = %id, "ancestor soft-deleted, truncating chain");
            break;
        }

        current = tenant.parent_id;
        chain.push(TenantRef {
            id: tenant.id,
            name: tenant.name,
        });
    }

    // Walked target-first; callers need root-first.
    chain.reverse();
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::Tenant;

    async fn three_level_store() -> (InMemoryStore, Tenant, Tenant, Tenant) {
        let store = InMemoryStore::new();
        let root = Tenant::new("Root", None);
        let dept = Tenant::new("Dept", Some(root.id));
        let team = Tenant::new("Team", Some(dept.id));
        store.add_tenant(root.clone()).await;
        store.add_tenant(dept.clone()).await;
        store.add_tenant(team.clone()).await;
        (store, root, dept, team)
    }

    #[tokio::test]
    async fn test_chain_is_root_first() {
        let (store, root, dept, team) = three_level_store().await;

        let chain = ancestor_chain(&store, team.id).await.unwrap();
        let names: Vec<_> = chain.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Root", "Dept", "Team"]);
        assert_eq!(chain[0].id, root.id);
        assert_eq!(chain[1].id, dept.id);
    }

    #[tokio::test]
    async fn test_root_tenant_chain_is_itself() {
        let (store, root, _, _) = three_level_store().await;
        let chain = ancestor_chain(&store, root.id).await.unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].name, "Root");
    }

    #[tokio::test]
    async fn test_missing_parent_truncates_leniently() {
        let store = InMemoryStore::new();
        let orphan = Tenant::new("Orphan", Some(Uuid::new_v4()));
        store.add_tenant(orphan.clone()).await;

        let chain = ancestor_chain(&store, orphan.id).await.unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].name, "Orphan");
    }

    #[tokio::test]
    async fn test_deleted_ancestor_truncates() {
        let store = InMemoryStore::new();
        let mut root = Tenant::new("Root", None);
        root.deleted_at = Some(chrono::Utc::now());
        let child = Tenant::new("Child", Some(root.id));
        store.add_tenant(root).await;
        store.add_tenant(child.clone()).await;

        let chain = ancestor_chain(&store, child.id).await.unwrap();
        let names: Vec<_> = chain.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Child"]);
    }

    #[tokio::test]
    async fn test_unknown_tenant_yields_empty_chain() {
        let store = InMemoryStore::new();
        let chain = ancestor_chain(&store, Uuid::new_v4()).await.unwrap();
        assert!(chain.is_empty());
    }

    #[tokio::test]
    async fn test_parent_cycle_terminates() {
        let store = InMemoryStore::new();
        let a_id = Uuid::new_v4();
        let b_id = Uuid::new_v4();
        let a = Tenant {
            id: a_id,
            name: "A".into(),
            parent_id: Some(b_id),
            deleted_at: None,
        };
        let b = Tenant {
            id: b_id,
            name: "B".into(),
            parent_id: Some(a_id),
            deleted_at: None,
        };
        store.add_tenant(a).await;
        store.add_tenant(b).await;

        let chain = ancestor_chain(&store, a_id).await.unwrap();
        // Terminates with both visited once, root-first
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].name, "B");
        assert_eq!(chain[1].name, "A");
    }
}
