//! In-memory store implementation

use super::{GrantStore, RecordStore};
use crate::error::{RbacError, Result};
use crate::types::{
    Context, GrantEntry, GroupId, Permission, PermissionId, Record, Role, RoleGrant, RoleId, UserGroup,
    UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
    groups: HashMap<GroupId, UserGroup>,
    memberships: BTreeSet<(UserId, GroupId)>,
    roles: HashMap<RoleId, Role>,
    permissions: HashMap<PermissionId, Permission>,
    role_permissions: BTreeSet<(PermissionId, RoleId)>,
    grants: BTreeMap<RoleGrant, DateTime<Utc>>,
    records: HashMap<Context, Record>,
    links: HashMap<(Context, String), Vec<Context>>,
}

/// In-memory implementation of both store traits
///
/// Enforces the same uniqueness rules a relational backend would: unique
/// role and permission names, unique grant triples, unique memberships.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a group
    pub async fn put_group(&self, group: UserGroup) {
        let mut state = self.state.write().await;
        state.groups.insert(group.id, group);
    }

    /// Store a role; names must be unique
    pub async fn put_role(&self, role: Role) -> Result<()> {
        let mut state = self.state.write().await;
        if state
            .roles
            .values()
            .any(|r| r.name == role.name && r.id != role.id)
        {
            return Err(RbacError::InvalidInput(format!(
                "Duplicate role name: {}",
                role.name
            )));
        }
        state.roles.insert(role.id, role);
        Ok(())
    }

    /// Store a permission; names must be unique
    pub async fn put_permission(&self, permission: Permission) -> Result<()> {
        let mut state = self.state.write().await;
        if state
            .permissions
            .values()
            .any(|p| p.name == permission.name && p.id != permission.id)
        {
            return Err(RbacError::InvalidInput(format!(
                "Duplicate permission name: {}",
                permission.name
            )));
        }
        state.permissions.insert(permission.id, permission);
        Ok(())
    }

    /// Store an application record
    pub async fn put_record(&self, record: Record) {
        let mut state = self.state.write().await;
        state.records.insert(record.context(), record);
    }

    /// Link `from` to `to` through `relation`
    ///
    /// Calling it several times for the same `(from, relation)` builds a
    /// to-many relation.
    pub async fn link(&self, from: &Context, relation: &str, to: &Context) {
        let mut state = self.state.write().await;
        let targets = state
            .links
            .entry((from.clone(), relation.to_string()))
            .or_default();
        if !targets.contains(to) {
            targets.push(to.clone());
        }
    }

    /// Number of stored grants
    pub async fn grant_count(&self) -> usize {
        self.state.read().await.grants.len()
    }
}

#[async_trait]
impl GrantStore for InMemoryStore {
    async fn lookup_groups(&self, user: UserId) -> Result<BTreeSet<GroupId>> {
        let state = self.state.read().await;
        Ok(state
            .memberships
            .iter()
            .filter(|(u, _)| *u == user)
            .map(|(_, g)| *g)
            .collect())
    }

    async fn lookup_roles(&self, groups: &BTreeSet<GroupId>) -> Result<BTreeSet<RoleId>> {
        let state = self.state.read().await;
        Ok(state
            .grants
            .keys()
            .filter(|grant| groups.contains(&grant.group_id))
            .map(|grant| grant.role_id)
            .collect())
    }

    async fn lookup_grant(
        &self,
        groups: &BTreeSet<GroupId>,
        roles: &BTreeSet<RoleId>,
        context: &Context,
    ) -> Result<bool> {
        let state = self.state.read().await;
        for group in groups {
            for role in roles {
                let key = RoleGrant::new(*group, *role, context.clone());
                if state.grants.contains_key(&key) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    async fn find_role(&self, name: &str) -> Result<Option<Role>> {
        let state = self.state.read().await;
        Ok(state.roles.values().find(|r| r.name == name).cloned())
    }

    async fn find_permission(&self, name: &str) -> Result<Option<Permission>> {
        let state = self.state.read().await;
        Ok(state.permissions.values().find(|p| p.name == name).cloned())
    }

    async fn find_group(&self, id: GroupId) -> Result<Option<UserGroup>> {
        let state = self.state.read().await;
        Ok(state.groups.get(&id).cloned())
    }

    async fn roles_with_permission(&self, permission: PermissionId) -> Result<Vec<Role>> {
        let state = self.state.read().await;
        Ok(state
            .role_permissions
            .iter()
            .filter(|(p, _)| *p == permission)
            .filter_map(|(_, r)| state.roles.get(r).cloned())
            .collect())
    }

    async fn create_grant(&self, grant: &RoleGrant) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.grants.contains_key(grant) {
            return Ok(false);
        }
        state.grants.insert(grant.clone(), Utc::now());
        Ok(true)
    }

    async fn delete_grant(&self, grant: &RoleGrant) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(state.grants.remove(grant).is_some())
    }

    async fn attach_permission(&self, permission: PermissionId, role: RoleId) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(state.role_permissions.insert((permission, role)))
    }

    async fn detach_permission(&self, permission: PermissionId, role: RoleId) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(state.role_permissions.remove(&(permission, role)))
    }

    async fn add_member(&self, user: UserId, group: GroupId) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(found) = state.groups.get(&group) else {
            return Err(RbacError::NotFound(format!("group {}", group)));
        };

        if found.is_personal {
            let taken = state
                .memberships
                .iter()
                .any(|&(member, g)| g == group && member != user);
            if taken {
                return Err(RbacError::InvalidInput(format!(
                    "personal group {} already has a member",
                    group
                )));
            }
        }
        Ok(state.memberships.insert((user, group)))
    }

    async fn remove_member(&self, user: UserId, group: GroupId) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(state.memberships.remove(&(user, group)))
    }

    async fn list_grants(&self, group: GroupId) -> Result<Vec<GrantEntry>> {
        let state = self.state.read().await;
        Ok(state
            .grants
            .iter()
            .filter(|(grant, _)| grant.group_id == group)
            .map(|(grant, granted_at)| GrantEntry {
                grant: grant.clone(),
                granted_at: *granted_at,
            })
            .collect())
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn fetch(&self, context: &Context) -> Result<Option<Record>> {
        let state = self.state.read().await;
        Ok(state.records.get(context).cloned())
    }

    async fn related(&self, record: &Record, relation: &str) -> Result<Vec<Record>> {
        let state = self.state.read().await;
        let Some(targets) = state.links.get(&(record.context(), relation.to_string())) else {
            return Ok(Vec::new());
        };

        targets
            .iter()
            .map(|target| {
                state.records.get(target).cloned().ok_or_else(|| {
                    RbacError::Store(format!(
                        "dangling link {}.{} -> {}",
                        record.context(),
                        relation,
                        target
                    ))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_grant_uniqueness() {
        let store = InMemoryStore::new();
        let grant = RoleGrant::new(1, 2, Context::new("articles", 42));

        assert!(store.create_grant(&grant).await.unwrap());
        assert!(!store.create_grant(&grant).await.unwrap());
        assert_eq!(store.grant_count().await, 1);

        assert!(store.delete_grant(&grant).await.unwrap());
        assert!(!store.delete_grant(&grant).await.unwrap());
        assert_eq!(store.grant_count().await, 0);
    }

    #[tokio::test]
    async fn test_lookup_grant() {
        let store = InMemoryStore::new();
        let ctx = Context::new("articles", 42);
        store
            .create_grant(&RoleGrant::new(1, 2, ctx.clone()))
            .await
            .unwrap();

        let groups: BTreeSet<_> = [1, 5].into_iter().collect();
        let roles: BTreeSet<_> = [2].into_iter().collect();
        assert!(store.lookup_grant(&groups, &roles, &ctx).await.unwrap());

        let other = Context::new("articles", 43);
        assert!(!store.lookup_grant(&groups, &roles, &other).await.unwrap());
        assert_eq!(
            store.lookup_roles(&groups).await.unwrap(),
            roles
        );
    }

    #[tokio::test]
    async fn test_personal_group_single_member() {
        let store = InMemoryStore::new();
        store.put_group(UserGroup::new(1, "alice").personal()).await;
        store.put_group(UserGroup::new(2, "team")).await;

        assert!(store.add_member(7, 1).await.unwrap());
        assert!(!store.add_member(7, 1).await.unwrap());
        assert!(matches!(
            store.add_member(8, 1).await,
            Err(RbacError::InvalidInput(_))
        ));

        assert!(store.add_member(7, 2).await.unwrap());
        assert!(store.add_member(8, 2).await.unwrap());

        store.remove_member(7, 1).await.unwrap();
        assert!(store.add_member(8, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_role_name() {
        let store = InMemoryStore::new();
        store.put_role(Role::new(1, "editor")).await.unwrap();
        assert!(store.put_role(Role::new(2, "editor")).await.is_err());
    }

    #[tokio::test]
    async fn test_memberships() {
        let store = InMemoryStore::new();
        store.put_group(UserGroup::new(10, "staff")).await;

        assert!(store.add_member(1, 10).await.unwrap());
        assert!(!store.add_member(1, 10).await.unwrap());
        assert!(matches!(
            store.add_member(1, 99).await,
            Err(RbacError::NotFound(_))
        ));
        assert_eq!(
            store.lookup_groups(1).await.unwrap(),
            [10].into_iter().collect()
        );
    }

    #[tokio::test]
    async fn test_related_records() {
        let store = InMemoryStore::new();
        let article = Record::new("articles", 42);
        store.put_record(article.clone()).await;
        store.put_record(Record::new("sections", 7)).await;
        store.put_record(Record::new("sections", 8)).await;
        store
            .link(&article.context(), "sections", &Context::new("sections", 7))
            .await;
        store
            .link(&article.context(), "sections", &Context::new("sections", 8))
            .await;

        let sections = store.related(&article, "sections").await.unwrap();
        assert_eq!(sections.len(), 2);
        assert!(store.related(&article, "tags").await.unwrap().is_empty());

        store
            .link(&article.context(), "author", &Context::new("users", 1))
            .await;
        assert!(matches!(
            store.related(&article, "author").await,
            Err(RbacError::Store(_))
        ));
    }
}
