//! # Strata Authorization Engine
//!
//! Tenant-hierarchical authorization resolution: RBAC aggregated over a
//! tenant ancestor chain and nested groups, per-principal deny overrides,
//! and ABAC policies written in a small sandboxed expression language.
//!
//! ## Features
//!
//! - **Async-first design** using the Tokio runtime
//! - **Hierarchy-aware RBAC** — role grants inherit down the tenant chain,
//!   direct grants replace inherited ones
//! - **Deny overrides** per user, group, or role (deny-only, never grant)
//! - **ABAC policies** in a sandboxed expression language with a
//!   forbidden-name blacklist, depth cap, and evaluation budget
//! - **Full provenance** — every decision names the grant, override, or
//!   policy that produced it
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use strata_authz::{InMemoryStore, Permission, PermissionEngine, Role, Tenant, UserRole};
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> strata_authz::Result<()> {
//!     let store = InMemoryStore::new();
//!     let tenant = Tenant::new("Root", None);
//!     store.add_tenant(tenant.clone()).await;
//!
//!     let role = Role::new("Reader", Some(tenant.id));
//!     store.add_role(role.clone()).await;
//!     let permission = Permission::new("cmdb", "ci", "read");
//!     store.add_permission(permission.clone()).await;
//!     store.grant_role_permission(role.id, permission.id).await;
//!
//!     let user_id = Uuid::new_v4();
//!     store
//!         .assign_user_role(UserRole {
//!             user_id,
//!             role_id: role.id,
//!             tenant_id: tenant.id,
//!             expires_at: None,
//!         })
//!         .await;
//!
//!     let engine = PermissionEngine::new(Arc::new(store));
//!     let decision = engine
//!         .check_permission(user_id, "cmdb:ci:read", tenant.id, None, None)
//!         .await?;
//!     assert!(decision.allowed);
//!     Ok(())
//! }
//! ```

pub mod abac;
pub mod engine;
pub mod error;
pub mod expr;
pub mod groups;
pub mod hierarchy;
pub mod overrides;
pub mod roles;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use engine::PermissionEngine;
pub use error::{AuthzError, Result};
pub use expr::{ExprContext, ExprError, FunctionRegistry, Value};
pub use hierarchy::TenantRef;
pub use roles::EffectiveMap;
pub use store::{AuthzStore, InMemoryStore};
pub use types::{
    AbacPolicy, AccessDecision, EffectivePermissionEntry, Group, Permission, PermissionOverride,
    PolicyEffect, PrincipalType, Role, Tenant, UserRole,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
