//! Read-only storage boundary for governance records
//!
//! The engine consumes already-committed rows through this trait and never
//! mutates them. Any backend exposing equivalent filters can implement it;
//! an in-memory implementation ships for tests and embedding.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{
    AbacPolicy, Group, GroupMembership, GroupRole, Permission, PermissionOverride, Role,
    RolePermission, Tenant, UserGroup, UserRole,
};

/// Read-only query interface over governance records
#[async_trait]
pub trait AuthzStore: Send + Sync {
    /// Fetch a tenant by id, including soft-deleted rows
    async fn tenant(&self, id: Uuid) -> Result<Option<Tenant>>;

    /// Fetch a role by id, including soft-deleted rows
    async fn role(&self, id: Uuid) -> Result<Option<Role>>;

    /// Fetch a permission by id
    async fn permission(&self, id: Uuid) -> Result<Option<Permission>>;

    /// Permissions directly attached to a role (not its parents)
    async fn role_permissions(&self, role_id: Uuid) -> Result<Vec<Permission>>;

    /// Role assignments a user holds within one tenant, expired included
    async fn user_roles(&self, user_id: Uuid, tenant_id: Uuid) -> Result<Vec<UserRole>>;

    /// Non-deleted groups a user is directly assigned to within one tenant
    async fn user_groups(&self, user_id: Uuid, tenant_id: Uuid) -> Result<Vec<Group>>;

    /// Non-deleted parent groups of a group
    async fn group_parents(&self, group_id: Uuid) -> Result<Vec<Group>>;

    /// Role ids attached to a group
    async fn group_roles(&self, group_id: Uuid) -> Result<Vec<Uuid>>;

    /// Deny override records scoped to one tenant
    async fn overrides_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<PermissionOverride>>;

    /// ABAC policy records scoped to one tenant, disabled included
    async fn policies_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<AbacPolicy>>;
}

#[derive(Debug, Default)]
struct Records {
    tenants: HashMap<Uuid, Tenant>,
    roles: HashMap<Uuid, Role>,
    permissions: HashMap<Uuid, Permission>,
    role_permissions: Vec<RolePermission>,
    user_roles: Vec<UserRole>,
    groups: HashMap<Uuid, Group>,
    group_memberships: Vec<GroupMembership>,
    group_roles: Vec<GroupRole>,
    user_groups: Vec<UserGroup>,
    overrides: Vec<PermissionOverride>,
    policies: Vec<AbacPolicy>,
}

/// In-memory store for tests and in-process embedding
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: Arc<RwLock<Records>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_tenant(&self, tenant: Tenant) {
        self.records.write().await.tenants.insert(tenant.id, tenant);
    }

    pub async fn add_role(&self, role: Role) {
        self.records.write().await.roles.insert(role.id, role);
    }

    pub async fn add_permission(&self, permission: Permission) {
        self.records
            .write()
            .await
            .permissions
            .insert(permission.id, permission);
    }

    pub async fn grant_role_permission(&self, role_id: Uuid, permission_id: Uuid) {
        self.records.write().await.role_permissions.push(RolePermission {
            role_id,
            permission_id,
        });
    }

    pub async fn assign_user_role(&self, user_role: UserRole) {
        self.records.write().await.user_roles.push(user_role);
    }

    pub async fn add_group(&self, group: Group) {
        self.records.write().await.groups.insert(group.id, group);
    }

    /// Nest `child` under `parent`
    pub async fn add_group_membership(&self, parent_group_id: Uuid, child_group_id: Uuid) {
        self.records.write().await.group_memberships.push(GroupMembership {
            parent_group_id,
            child_group_id,
        });
    }

    pub async fn assign_group_role(&self, group_id: Uuid, role_id: Uuid) {
        self.records
            .write()
            .await
            .group_roles
            .push(GroupRole { group_id, role_id });
    }

    pub async fn add_user_to_group(&self, user_id: Uuid, group_id: Uuid) {
        self.records
            .write()
            .await
            .user_groups
            .push(UserGroup { user_id, group_id });
    }

    pub async fn add_override(&self, record: PermissionOverride) {
        self.records.write().await.overrides.push(record);
    }

    pub async fn add_policy(&self, policy: AbacPolicy) {
        self.records.write().await.policies.push(policy);
    }
}

#[async_trait]
impl AuthzStore for InMemoryStore {
    async fn tenant(&self, id: Uuid) -> Result<Option<Tenant>> {
        Ok(self.records.read().await.tenants.get(&id).cloned())
    }

    async fn role(&self, id: Uuid) -> Result<Option<Role>> {
        Ok(self.records.read().await.roles.get(&id).cloned())
    }

    async fn permission(&self, id: Uuid) -> Result<Option<Permission>> {
        Ok(self.records.read().await.permissions.get(&id).cloned())
    }

    async fn role_permissions(&self, role_id: Uuid) -> Result<Vec<Permission>> {
        let records = self.records.read().await;
        Ok(records
            .role_permissions
            .iter()
            .filter(|rp| rp.role_id == role_id)
            .filter_map(|rp| records.permissions.get(&rp.permission_id).cloned())
            .collect())
    }

    async fn user_roles(&self, user_id: Uuid, tenant_id: Uuid) -> Result<Vec<UserRole>> {
        let records = self.records.read().await;
        Ok(records
            .user_roles
            .iter()
            .filter(|ur| ur.user_id == user_id && ur.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn user_groups(&self, user_id: Uuid, tenant_id: Uuid) -> Result<Vec<Group>> {
        let records = self.records.read().await;
        Ok(records
            .user_groups
            .iter()
            .filter(|ug| ug.user_id == user_id)
            .filter_map(|ug| records.groups.get(&ug.group_id))
            .filter(|g| g.tenant_id == tenant_id && !g.is_deleted())
            .cloned()
            .collect())
    }

    async fn group_parents(&self, group_id: Uuid) -> Result<Vec<Group>> {
        let records = self.records.read().await;
        Ok(records
            .group_memberships
            .iter()
            .filter(|gm| gm.child_group_id == group_id)
            .filter_map(|gm| records.groups.get(&gm.parent_group_id))
            .filter(|g| !g.is_deleted())
            .cloned()
            .collect())
    }

    async fn group_roles(&self, group_id: Uuid) -> Result<Vec<Uuid>> {
        let records = self.records.read().await;
        Ok(records
            .group_roles
            .iter()
            .filter(|gr| gr.group_id == group_id)
            .map(|gr| gr.role_id)
            .collect())
    }

    async fn overrides_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<PermissionOverride>> {
        let records = self.records.read().await;
        Ok(records
            .overrides
            .iter()
            .filter(|o| o.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn policies_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<AbacPolicy>> {
        let records = self.records.read().await;
        Ok(records
            .policies
            .iter()
            .filter(|p| p.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}
