//! Primitive permission checkers
//!
//! A closed set of strategies, each a read-only predicate over the checked
//! user's groups and roles and one record:
//!
//! | Checker | Holds when |
//! |---|---|
//! | [`Checker::Path`] | the action is granted at ANY terminal of ANY path |
//! | [`Checker::Ownership`] | the record (or a path terminal) is owned by the user |
//! | [`Checker::GroupOwnership`] | the record (or a path terminal) is owned by one of the user's groups |
//! | [`Checker::Propagated`] | the action is granted at EVERY link of the ancestor chain |
//! | [`Checker::Ancestor`] | the action is granted at ANY link of the ancestor chain |
//! | [`Checker::Global`] | the action is granted at the global context |
//!
//! "No grant" is `Ok(false)`; malformed paths and store failures are errors.

mod ownership;
mod path;
mod propagation;

use crate::error::Result;
use crate::graph::{PropagationSchema, Traverser};
use crate::resolver::GrantResolver;
use crate::types::{Context, GroupId, Record, RoleId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Everything a checker may consult
#[derive(Clone)]
pub struct CheckEnv {
    pub resolver: Arc<GrantResolver>,
    pub traverser: Traverser,
    pub schema: Arc<PropagationSchema>,
}

/// The subject and object of one evaluation
#[derive(Debug, Clone)]
pub struct CheckRequest {
    pub user_id: UserId,

    /// Groups the user belongs to
    pub groups: Arc<BTreeSet<GroupId>>,

    /// Roles held by those groups in any context
    pub roles: Arc<BTreeSet<RoleId>>,

    /// The record being accessed
    pub record: Record,
}

impl CheckRequest {
    /// Resolve the user's groups and roles through the resolver
    pub async fn for_user(resolver: &GrantResolver, user_id: UserId, record: Record) -> Result<Self> {
        let groups = resolver.groups_of(user_id).await?;
        let roles = resolver.roles_of(&groups).await?;
        Ok(Self {
            user_id,
            groups,
            roles,
            record,
        })
    }
}

/// A primitive permission check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Checker {
    /// Action granted at a terminal of one of the relation paths
    ///
    /// The empty path denotes the record itself; no paths at all behaves
    /// like a single empty path.
    Path {
        action: String,
        #[serde(default)]
        paths: Vec<String>,
    },

    /// Record owned by the checked user, optionally through a relation path
    #[serde(rename = "owner")]
    Ownership {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        via: Option<String>,
    },

    /// Record owned by one of the user's groups, optionally through a path
    #[serde(rename = "group_owner")]
    GroupOwnership {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        via: Option<String>,
    },

    /// Action granted at the record and every ancestor
    Propagated(String),

    /// Action granted at the record or some ancestor
    Ancestor(String),

    /// Action granted at the global context
    Global(String),
}

impl Checker {
    /// Grant of `action` on the record itself
    pub fn direct(action: impl Into<String>) -> Self {
        Self::path(action, [""])
    }

    /// Grant of `action` at the terminals of the paths
    pub fn path<I, S>(action: impl Into<String>, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Path {
            action: action.into(),
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn owner() -> Self {
        Self::Ownership { via: None }
    }

    pub fn owner_via(path: impl Into<String>) -> Self {
        Self::Ownership {
            via: Some(path.into()),
        }
    }

    pub fn group_owner() -> Self {
        Self::GroupOwnership { via: None }
    }

    pub fn group_owner_via(path: impl Into<String>) -> Self {
        Self::GroupOwnership {
            via: Some(path.into()),
        }
    }

    pub fn propagated(action: impl Into<String>) -> Self {
        Self::Propagated(action.into())
    }

    pub fn ancestor(action: impl Into<String>) -> Self {
        Self::Ancestor(action.into())
    }

    pub fn global(action: impl Into<String>) -> Self {
        Self::Global(action.into())
    }

    /// Relation paths this checker traverses from the record
    pub fn paths(&self) -> Vec<&str> {
        match self {
            Self::Path { paths, .. } => paths.iter().map(String::as_str).collect(),
            Self::Ownership { via: Some(path) } | Self::GroupOwnership { via: Some(path) } => {
                vec![path.as_str()]
            }
            _ => Vec::new(),
        }
    }

    /// Evaluate the checker
    ///
    /// Every non-global checker answers `false` for the global record.
    pub async fn check(&self, env: &CheckEnv, request: &CheckRequest) -> Result<bool> {
        if let Self::Global(action) = self {
            return holds_globally(env, request, action).await;
        }

        if request.record.is_global() {
            return Ok(false);
        }

        match self {
            Self::Path { action, paths } => path::check(env, request, action, paths).await,
            Self::Ownership { via } => ownership::check_user(env, request, via.as_deref()).await,
            Self::GroupOwnership { via } => {
                ownership::check_group(env, request, via.as_deref()).await
            }
            Self::Propagated(action) => propagation::check_every(env, request, action).await,
            Self::Ancestor(action) => propagation::check_any(env, request, action).await,
            Self::Global(_) => Ok(false),
        }
    }
}

impl fmt::Display for Checker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path { action, paths } => write!(f, "path({}, [{}])", action, paths.join(", ")),
            Self::Ownership { via: None } => write!(f, "owner"),
            Self::Ownership { via: Some(path) } => write!(f, "owner({})", path),
            Self::GroupOwnership { via: None } => write!(f, "group_owner"),
            Self::GroupOwnership { via: Some(path) } => write!(f, "group_owner({})", path),
            Self::Propagated(action) => write!(f, "propagated({})", action),
            Self::Ancestor(action) => write!(f, "ancestor({})", action),
            Self::Global(action) => write!(f, "global({})", action),
        }
    }
}

/// Whether the user holds a non-global role carrying `action` on `context`
///
/// Global permissions never hold outside the global context.
pub(crate) async fn holds_at(
    env: &CheckEnv,
    request: &CheckRequest,
    action: &str,
    context: &Context,
) -> Result<bool> {
    if context.is_global() {
        return Ok(false);
    }

    let carriers = env.resolver.permission_roles(action).await?;
    if carriers.permission.is_global {
        return Ok(false);
    }

    let roles: BTreeSet<RoleId> = carriers
        .roles
        .intersection(&request.roles)
        .copied()
        .collect();
    env.resolver
        .grant_exists(&request.groups, &roles, context)
        .await
}

/// Whether the user holds any role carrying `action` on the global context
async fn holds_globally(env: &CheckEnv, request: &CheckRequest, action: &str) -> Result<bool> {
    let carriers = env.resolver.permission_roles(action).await?;
    let roles: BTreeSet<RoleId> = carriers
        .all_roles()
        .intersection(&request.roles)
        .copied()
        .collect();
    env.resolver
        .grant_exists(&request.groups, &roles, &Context::global())
        .await
}
