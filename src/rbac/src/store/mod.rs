//! Boundary to the external data layer
//!
//! The engine never persists anything itself. Users, groups, roles,
//! permissions and grants live behind [`GrantStore`]; the application's own
//! records and their relations live behind [`RecordStore`]. Every method is a
//! suspension point.

pub mod memory;

pub use memory::InMemoryStore;

use crate::error::Result;
use crate::types::{
    Context, GrantEntry, GroupId, Permission, PermissionId, Record, Role, RoleGrant, RoleId,
    UserGroup, UserId,
};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Access to users, groups, roles, permissions and grants
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Ids of every group the user is a member of
    async fn lookup_groups(&self, user: UserId) -> Result<BTreeSet<GroupId>>;

    /// Ids of every role granted to any of the groups, in any context
    async fn lookup_roles(&self, groups: &BTreeSet<GroupId>) -> Result<BTreeSet<RoleId>>;

    /// Whether some group in `groups` holds some role in `roles` on `context`
    async fn lookup_grant(
        &self,
        groups: &BTreeSet<GroupId>,
        roles: &BTreeSet<RoleId>,
        context: &Context,
    ) -> Result<bool>;

    /// Get a role by name
    async fn find_role(&self, name: &str) -> Result<Option<Role>>;

    /// Get a permission by name
    async fn find_permission(&self, name: &str) -> Result<Option<Permission>>;

    /// Get a group by id
    async fn find_group(&self, id: GroupId) -> Result<Option<UserGroup>>;

    /// Every role carrying the permission
    async fn roles_with_permission(&self, permission: PermissionId) -> Result<Vec<Role>>;

    /// Store a grant; returns `false` if the triple already exists
    async fn create_grant(&self, grant: &RoleGrant) -> Result<bool>;

    /// Delete a grant; returns `false` if it did not exist
    async fn delete_grant(&self, grant: &RoleGrant) -> Result<bool>;

    /// Attach a permission to a role; returns `false` if already attached
    async fn attach_permission(&self, permission: PermissionId, role: RoleId) -> Result<bool>;

    /// Detach a permission from a role; returns `false` if not attached
    async fn detach_permission(&self, permission: PermissionId, role: RoleId) -> Result<bool>;

    /// Add a user to a group; returns `false` if already a member
    async fn add_member(&self, user: UserId, group: GroupId) -> Result<bool>;

    /// Remove a user from a group; returns `false` if not a member
    async fn remove_member(&self, user: UserId, group: GroupId) -> Result<bool>;

    /// All grants held by a group
    async fn list_grants(&self, group: GroupId) -> Result<Vec<GrantEntry>>;
}

/// Access to application records and their relations
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load the record identified by `context`
    async fn fetch(&self, context: &Context) -> Result<Option<Record>>;

    /// Records reachable from `record` through the named relation
    ///
    /// Cardinality is enforced by the caller against the declared relation
    /// graph; the store only returns what it finds.
    async fn related(&self, record: &Record, relation: &str) -> Result<Vec<Record>>;
}
