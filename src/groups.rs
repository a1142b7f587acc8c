//! Group membership closure resolution
//!
//! A user's groups within a tenant are the directly assigned ones plus
//! everything reachable upward through `GroupMembership` parent links. The
//! walk is an iterative work-list bounded by a visited set, so malformed
//! (cyclic) membership data terminates instead of looping. Group hierarchy
//! never crosses the tenant boundary.

use std::collections::HashSet;

use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::store::AuthzStore;
use crate::types::Group;

/// A role reachable through the group closure, tagged with its origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRoleBinding {
    pub role_id: Uuid,
    /// Name of the group the role is attached to
    pub group_name: String,
}

/// The transitive group closure for one (user, tenant) pair
#[derive(Debug, Clone, Default)]
pub struct GroupClosure {
    /// Every group the user belongs to, directly or through nesting
    pub groups: Vec<Group>,
    /// Every role reachable through any group in the closure
    pub roles: Vec<GroupRoleBinding>,
}

impl GroupClosure {
    pub fn group_ids(&self) -> HashSet<Uuid> {
        self.groups.iter().map(|g| g.id).collect()
    }
}

/// Compute the group closure for a user within one tenant
pub async fn user_group_closure(
    store: &dyn AuthzStore,
    user_id: Uuid,
    tenant_id: Uuid,
) -> Result<GroupClosure> {
    let direct = store.user_groups(user_id, tenant_id).await?;

    let mut visited: HashSet<Uuid> = HashSet::new();
    let mut work_list: Vec<Group> = Vec::new();
    for group in direct {
        if visited.insert(group.id) {
            work_list.push(group);
        }
    }

    let mut closure = GroupClosure::default();
    while let Some(group) = work_list.pop() {
        for parent in store.group_parents(group.id).await? {
            // Stay inside the tenant boundary; the visited set tolerates
            // cycles in the membership data.
            if parent.tenant_id == tenant_id && visited.insert(parent.id) {
                work_list.push(parent);
            }
        }

        for role_id in store.group_roles(group.id).await? {
            closure.roles.push(GroupRoleBinding {
                role_id,
                group_name: group.name.clone(),
            });
        }
        closure.groups.push(group);
    }

    debug!(
        %user_id, %tenant_id,
        groups = closure.groups.len(),
        roles = closure.roles.len(),
        "resolved group closure"
    );
    Ok(closure)
}
