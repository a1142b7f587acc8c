//! Permission engine: the resolution pipeline orchestrator
//!
//! A check runs the whole pipeline from scratch on every call: ancestor
//! chain, group closure, role aggregation, deny overrides, then ABAC.
//! Nothing is cached between calls, so a decision always reflects the
//! records as currently stored.
//!
//! Decision precedence, highest first: RBAC deny, ABAC deny, RBAC or ABAC
//! allow, default deny.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::debug;
use uuid::Uuid;

use crate::abac;
use crate::error::{AuthzError, Result};
use crate::expr::{ExprContext, FunctionRegistry, Value};
use crate::hierarchy::ancestor_chain;
use crate::overrides::apply_deny_overrides;
use crate::roles::{aggregate_permissions, EffectiveMap, ResolvedPrincipals};
use crate::store::AuthzStore;
use crate::types::{AccessDecision, EffectivePermissionEntry};

/// Stateless authorization resolver over an [`AuthzStore`]
pub struct PermissionEngine {
    store: Arc<dyn AuthzStore>,
    functions: FunctionRegistry,
}

impl PermissionEngine {
    /// Create an engine with the builtin expression functions
    pub fn new(store: Arc<dyn AuthzStore>) -> Self {
        Self {
            store,
            functions: FunctionRegistry::with_builtins(),
        }
    }

    /// Create an engine with a caller-supplied function registry
    pub fn with_functions(store: Arc<dyn AuthzStore>, functions: FunctionRegistry) -> Self {
        Self { store, functions }
    }

    /// Decide whether `user_id` may perform `permission_key` at `tenant_id`
    ///
    /// `resource` and `context` feed the `$resource` / `$context` scopes of
    /// targeted ABAC policies. "Not permitted" is an `Ok` decision with
    /// `allowed == false`; `Err` is reserved for malformed input and store
    /// failures.
    pub async fn check_permission(
        &self,
        user_id: Uuid,
        permission_key: &str,
        tenant_id: Uuid,
        resource: Option<&HashMap<String, JsonValue>>,
        context: Option<&HashMap<String, JsonValue>>,
    ) -> Result<AccessDecision> {
        if permission_key.trim().is_empty() {
            return Err(AuthzError::InvalidPermissionKey(permission_key.to_string()));
        }

        let chain = ancestor_chain(self.store.as_ref(), tenant_id).await?;
        let (mut map, principals) =
            aggregate_permissions(self.store.as_ref(), user_id, &chain).await?;
        apply_deny_overrides(self.store.as_ref(), &chain, user_id, &principals, &mut map).await?;

        let rbac = match_specific(&map, permission_key);
        if let Some(entry) = rbac {
            if entry.is_denied {
                debug!(%user_id, permission_key, "denied by rbac override");
                return Ok(AccessDecision {
                    allowed: false,
                    source: entry.deny_source.clone(),
                });
            }
        }

        let mut ctx = ExprContext::new().with_scope("user", user_scope(user_id, &principals));
        if let Some(attrs) = resource {
            ctx = ctx.with_json_scope("resource", attrs);
        }
        if let Some(attrs) = context {
            ctx = ctx.with_json_scope("context", attrs);
        }

        let abac_decision = abac::targeted_check(
            self.store.as_ref(),
            &chain,
            permission_key,
            &ctx,
            &self.functions,
        )
        .await?;

        match (rbac, abac_decision) {
            // ABAC deny beats any RBAC allow
            (_, Some(decision)) if !decision.allowed => {
                debug!(%user_id, permission_key, source = ?decision.source, "denied by policy");
                Ok(decision)
            }
            // RBAC allow stands; a concurring ABAC allow does not change it
            (Some(entry), _) => {
                debug!(%user_id, permission_key, source = %entry.source, "allowed by role grant");
                Ok(AccessDecision::allow(entry.source.clone()))
            }
            (None, Some(decision)) => {
                debug!(%user_id, permission_key, source = ?decision.source, "allowed by policy");
                Ok(decision)
            }
            (None, None) => {
                debug!(%user_id, permission_key, "no grant, no policy: default deny");
                Ok(AccessDecision::default_deny())
            }
        }
    }

    /// List every permission the user holds at the tenant, with provenance
    ///
    /// RBAC deny overrides and the ABAC deny sweep are already applied;
    /// entries are ordered by permission key.
    pub async fn get_effective_permissions(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Vec<EffectivePermissionEntry>> {
        let chain = ancestor_chain(self.store.as_ref(), tenant_id).await?;
        let (mut map, principals) =
            aggregate_permissions(self.store.as_ref(), user_id, &chain).await?;
        apply_deny_overrides(self.store.as_ref(), &chain, user_id, &principals, &mut map).await?;

        let ctx = ExprContext::new().with_scope("user", user_scope(user_id, &principals));
        abac::deny_sweep(self.store.as_ref(), &chain, &ctx, &self.functions, &mut map).await?;

        Ok(map.into_values().collect())
    }
}

/// Build the `$user` scope: id plus the resolved role names
fn user_scope(user_id: Uuid, principals: &ResolvedPrincipals) -> Value {
    let roles = principals
        .role_names
        .iter()
        .map(|name| Value::Str(name.clone()))
        .collect();
    Value::Map(
        [
            ("id".to_string(), Value::Str(user_id.to_string())),
            ("roles".to_string(), Value::List(roles)),
        ]
        .into(),
    )
}

/// Most-specific match for a permission key against the effective map
///
/// For a key of N segments, longer exact prefixes win over shorter ones,
/// and an exact prefix wins over the wildcard pattern of the same length.
/// Wildcard candidates keep the key's arity (`cmdb:ci:read` consults
/// `cmdb:ci:*` and `cmdb:*:*`, never the two-segment `cmdb:*`); a global
/// `*:*:*` entry is the final fallback.
fn match_specific<'a>(map: &'a EffectiveMap, key: &str) -> Option<&'a EffectivePermissionEntry> {
    let parts: Vec<&str> = key.split(':').collect();
    let n = parts.len();

    for i in (1..=n).rev() {
        let exact = parts[..i].join(":");
        if let Some(entry) = map.get(&exact) {
            return Some(entry);
        }
        if i < n {
            let mut pattern: Vec<&str> = parts[..i].to_vec();
            pattern.resize(n, "*");
            if let Some(entry) = map.get(&pattern.join(":")) {
                return Some(entry);
            }
        }
    }

    map.get("*:*:*")
}
