//! Group, role and grant resolution with coherent caching

use super::cache::{CacheConfig, CacheStats, LookupCache};
use crate::error::{RbacError, Result};
use crate::store::GrantStore;
use crate::types::{Context, GroupId, Permission, RoleGrant, RoleId, UserId};
use futures::FutureExt;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Roles carrying one permission, split by global flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRoles {
    pub permission: Permission,

    /// Non-global roles carrying the permission
    pub roles: BTreeSet<RoleId>,

    /// Global roles carrying the permission
    pub global_roles: BTreeSet<RoleId>,
}

impl PermissionRoles {
    /// Every role carrying the permission
    pub fn all_roles(&self) -> BTreeSet<RoleId> {
        self.roles.union(&self.global_roles).copied().collect()
    }
}

/// Cache key of a grant lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GrantKey {
    pub groups: BTreeSet<GroupId>,
    pub roles: BTreeSet<RoleId>,
    pub context: Context,
}

impl GrantKey {
    /// Whether adding or removing `grant` can change this lookup's answer
    fn affected_by(&self, grant: &RoleGrant) -> bool {
        self.context == grant.context
            && self.groups.contains(&grant.group_id)
            && self.roles.contains(&grant.role_id)
    }
}

/// Per-cache statistics of a [`GrantResolver`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    pub groups: CacheStats,
    pub roles: CacheStats,
    pub permissions: CacheStats,
    pub grants: CacheStats,
}

impl ResolverStats {
    /// Hits across all caches
    pub fn hits(&self) -> usize {
        self.groups.hits + self.roles.hits + self.permissions.hits + self.grants.hits
    }

    /// Misses across all caches
    pub fn misses(&self) -> usize {
        self.groups.misses + self.roles.misses + self.permissions.misses + self.grants.misses
    }
}

/// Resolves users to groups, groups to roles, and grant existence
///
/// Every lookup goes through a TTL cache with single-flight. Mutations made
/// through the facade call the matching `on_*` hook after the store write,
/// which drops every entry the write could have changed before returning.
pub struct GrantResolver {
    store: Arc<dyn GrantStore>,
    groups: LookupCache<UserId, Arc<BTreeSet<GroupId>>>,
    roles: LookupCache<BTreeSet<GroupId>, Arc<BTreeSet<RoleId>>>,
    permissions: LookupCache<String, Arc<PermissionRoles>>,
    grants: LookupCache<GrantKey, bool>,
}

impl GrantResolver {
    /// Create a new resolver over the given store
    pub fn new(store: Arc<dyn GrantStore>, config: CacheConfig) -> Self {
        Self {
            store,
            groups: LookupCache::new(config.clone()),
            roles: LookupCache::new(config.clone()),
            permissions: LookupCache::new(config.clone()),
            grants: LookupCache::new(config),
        }
    }

    /// The backing store
    pub fn store(&self) -> &Arc<dyn GrantStore> {
        &self.store
    }

    /// Group ids the user belongs to
    pub async fn groups_of(&self, user: UserId) -> Result<Arc<BTreeSet<GroupId>>> {
        let store = self.store.clone();
        self.groups
            .get_or_load(user, move || {
                async move { store.lookup_groups(user).await.map(Arc::new) }.boxed()
            })
            .await
    }

    /// Role ids granted to any of the groups, in any context
    pub async fn roles_of(&self, groups: &BTreeSet<GroupId>) -> Result<Arc<BTreeSet<RoleId>>> {
        if groups.is_empty() {
            return Ok(Arc::new(BTreeSet::new()));
        }

        let store = self.store.clone();
        let key = groups.clone();
        self.roles
            .get_or_load(groups.clone(), move || {
                async move { store.lookup_roles(&key).await.map(Arc::new) }.boxed()
            })
            .await
    }

    /// The permission and the roles carrying it
    ///
    /// # Errors
    ///
    /// `NotFound` if no permission has this name.
    pub async fn permission_roles(&self, name: &str) -> Result<Arc<PermissionRoles>> {
        let store = self.store.clone();
        let lookup_name = name.to_string();
        self.permissions
            .get_or_load(name.to_string(), move || {
                async move {
                    let permission = store
                        .find_permission(&lookup_name)
                        .await?
                        .ok_or_else(|| {
                            RbacError::NotFound(format!("permission '{}'", lookup_name))
                        })?;

                    let (global, scoped): (Vec<_>, Vec<_>) = store
                        .roles_with_permission(permission.id)
                        .await?
                        .into_iter()
                        .partition(|role| role.is_global);

                    Ok(Arc::new(PermissionRoles {
                        permission,
                        roles: scoped.into_iter().map(|role| role.id).collect(),
                        global_roles: global.into_iter().map(|role| role.id).collect(),
                    }))
                }
                .boxed()
            })
            .await
    }

    /// Whether some group holds some role on the context
    ///
    /// Empty group or role sets answer `false` without a lookup.
    pub async fn grant_exists(
        &self,
        groups: &BTreeSet<GroupId>,
        roles: &BTreeSet<RoleId>,
        context: &Context,
    ) -> Result<bool> {
        if groups.is_empty() || roles.is_empty() {
            return Ok(false);
        }

        let key = GrantKey {
            groups: groups.clone(),
            roles: roles.clone(),
            context: context.clone(),
        };
        let store = self.store.clone();
        let lookup = key.clone();
        self.grants
            .get_or_load(key, move || {
                async move {
                    store
                        .lookup_grant(&lookup.groups, &lookup.roles, &lookup.context)
                        .await
                }
                .boxed()
            })
            .await
    }

    /// Drop entries a created or deleted grant could affect
    pub fn on_grant_changed(&self, grant: &RoleGrant) {
        let roles = self
            .roles
            .invalidate_where(|groups| groups.contains(&grant.group_id));
        let grants = self.grants.invalidate_where(|key| key.affected_by(grant));
        debug!(
            "Invalidated {} role sets and {} grant lookups for group {} on {}",
            roles, grants, grant.group_id, grant.context
        );
    }

    /// Drop the cached group set of a user whose membership changed
    pub fn on_membership_changed(&self, user: UserId) {
        self.groups.invalidate_where(|cached| *cached == user);
        debug!("Invalidated group set of user {}", user);
    }

    /// Drop the cached role set of a permission attached to or detached from a role
    pub fn on_permission_changed(&self, name: &str) {
        self.permissions.invalidate_where(|cached| cached == name);
        debug!("Invalidated roles of permission '{}'", name);
    }

    /// Drop everything
    pub fn clear(&self) {
        self.groups.clear();
        self.roles.clear();
        self.permissions.clear();
        self.grants.clear();
    }

    /// Per-cache statistics
    pub fn cache_stats(&self) -> ResolverStats {
        ResolverStats {
            groups: self.groups.stats(),
            roles: self.roles.stats(),
            permissions: self.permissions.stats(),
            grants: self.grants.stats(),
        }
    }
}
