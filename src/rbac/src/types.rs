//! Core RBAC types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Unique user identifier; users are opaque and their groups come from membership
pub type UserId = i64;

/// Unique user group identifier
pub type GroupId = i64;

/// Unique role identifier
pub type RoleId = i64;

/// Unique permission identifier
pub type PermissionId = i64;

/// Table name of the system-wide sentinel context
pub const GLOBAL_TABLE: &str = "global";

/// Primary key of the system-wide sentinel context
pub const GLOBAL_PK: &str = "0";

/// Identifies one record: `(table, primary key)`
///
/// The sentinel `Context::global()` (`global:0`) stands for system-wide scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Context {
    /// Table name (e.g., "articles")
    pub table: String,

    /// Primary key, stringified
    pub pk: String,
}

impl Context {
    /// Create a new context
    pub fn new(table: impl Into<String>, pk: impl ToString) -> Self {
        Self {
            table: table.into(),
            pk: pk.to_string(),
        }
    }

    /// The system-wide sentinel context
    pub fn global() -> Self {
        Self::new(GLOBAL_TABLE, GLOBAL_PK)
    }

    /// Whether this is the system-wide sentinel
    pub fn is_global(&self) -> bool {
        self.table == GLOBAL_TABLE && self.pk == GLOBAL_PK
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.pk)
    }
}

/// A data record as seen by the checkers
///
/// Only the accessors the checkers need are carried: table, primary key and
/// the optional ownership columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Table the record lives in
    pub table: String,

    /// Primary key, stringified
    pub pk: String,

    /// Owning user, if the table has an owner column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_user_id: Option<UserId>,

    /// Owning group, if the table has a group owner column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_group_id: Option<GroupId>,
}

impl Record {
    /// Create a record without ownership columns
    pub fn new(table: impl Into<String>, pk: impl ToString) -> Self {
        Self {
            table: table.into(),
            pk: pk.to_string(),
            owner_user_id: None,
            owner_group_id: None,
        }
    }

    /// The record standing for the global context
    pub fn global() -> Self {
        Self::new(GLOBAL_TABLE, GLOBAL_PK)
    }

    /// Set the owning user
    pub fn with_owner(mut self, user: UserId) -> Self {
        self.owner_user_id = Some(user);
        self
    }

    /// Set the owning group
    pub fn with_owner_group(mut self, group: GroupId) -> Self {
        self.owner_group_id = Some(group);
        self
    }

    /// The context identifying this record
    pub fn context(&self) -> Context {
        Context::new(self.table.clone(), self.pk.clone())
    }

    /// Whether this record is the global sentinel
    pub fn is_global(&self) -> bool {
        self.table == GLOBAL_TABLE && self.pk == GLOBAL_PK
    }
}

/// A group of users; grants are attached to groups, never to users directly
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserGroup {
    pub id: GroupId,
    pub name: String,

    /// Personal groups hold exactly one user
    #[serde(default)]
    pub is_personal: bool,
}

impl UserGroup {
    pub fn new(id: GroupId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_personal: false,
        }
    }

    /// Mark as a personal group
    pub fn personal(mut self) -> Self {
        self.is_personal = true;
        self
    }
}

/// Role definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Unique role identifier
    pub id: RoleId,

    /// Unique role name (e.g., "editor")
    pub name: String,

    /// Global roles are only reachable through the global context
    #[serde(default)]
    pub is_global: bool,

    /// Tables this role may be granted on; empty means unrestricted
    #[serde(default)]
    pub tables: BTreeSet<String>,
}

impl Role {
    /// Create an unrestricted, non-global role
    pub fn new(id: RoleId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_global: false,
            tables: BTreeSet::new(),
        }
    }

    /// Restrict the role to the given tables
    pub fn scoped_to<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables = tables.into_iter().map(Into::into).collect();
        self
    }

    /// Mark the role as global
    pub fn global(mut self) -> Self {
        self.is_global = true;
        self
    }

    /// Whether the role may be granted on `table`
    pub fn allows_table(&self, table: &str) -> bool {
        self.tables.is_empty() || self.tables.contains(table)
    }
}

/// Permission definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Unique permission identifier
    pub id: PermissionId,

    /// Unique permission name (e.g., "write")
    pub name: String,

    /// Global permissions are only satisfiable through the `Global` checker
    #[serde(default)]
    pub is_global: bool,
}

impl Permission {
    pub fn new(id: PermissionId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_global: false,
        }
    }

    pub fn global(mut self) -> Self {
        self.is_global = true;
        self
    }
}

/// The atomic unit of access: a group holds a role on a context
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleGrant {
    pub group_id: GroupId,
    pub role_id: RoleId,
    pub context: Context,
}

impl RoleGrant {
    pub fn new(group_id: GroupId, role_id: RoleId, context: Context) -> Self {
        Self {
            group_id,
            role_id,
            context,
        }
    }
}

/// A stored grant, as returned by listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantEntry {
    pub grant: RoleGrant,
    pub granted_at: DateTime<Utc>,
}
