//! Authorization facade
//!
//! Orchestrates group/role resolution, graph traversal and expression
//! evaluation, and owns cache invalidation on every mutation.

pub mod config;
pub mod metrics;

pub use config::{ActionBinding, EngineConfig, Model, ModelConfig, ANY_TABLE};
pub use metrics::{EngineMetrics, MetricsCollector};

use crate::checkers::{CheckEnv, CheckRequest, Checker};
use crate::error::{RbacError, Result};
use crate::expression::Expr;
use crate::graph::Traverser;
use crate::resolver::{GrantResolver, ResolverStats};
use crate::store::{GrantStore, RecordStore};
use crate::types::{Context, GrantEntry, GroupId, Permission, Record, Role, RoleGrant, UserId};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Main authorization facade
///
/// # Architecture
///
/// ```text
/// can(user, action, context)
///   → RecordStore::fetch → action expression → Expr::evaluate
///                                                  ↓
///                         Checkers → Traverser / GrantResolver [cache + single-flight]
///                                                  ↓
///                                              GrantStore
/// grant / revoke / assign / unassign / join / leave
///   → GrantStore mutation → targeted GrantResolver invalidation (also on failure)
/// ```
pub struct Authorizer {
    /// Grant storage backend
    grants: Arc<dyn GrantStore>,

    /// Application records
    records: Arc<dyn RecordStore>,

    /// Resolver, traverser and propagation schema shared by the checkers
    env: CheckEnv,

    /// (table, action) → expression
    actions: DashMap<(String, String), Arc<Expr>>,

    /// Metrics collector
    metrics: Option<Arc<MetricsCollector>>,

    /// Engine configuration
    config: EngineConfig,
}

impl Authorizer {
    /// Create an authorizer over a grant store and a record store
    ///
    /// # Errors
    ///
    /// `Traversal` if a model action references an undeclared relation path.
    pub fn new(
        config: EngineConfig,
        model: Model,
        grants: Arc<dyn GrantStore>,
        records: Arc<dyn RecordStore>,
    ) -> Result<Self> {
        let resolver = Arc::new(GrantResolver::new(grants.clone(), config.cache.clone()));
        let traverser = Traverser::new(Arc::new(model.graph), records.clone());

        let metrics = if config.enable_metrics {
            Some(Arc::new(MetricsCollector::new()))
        } else {
            None
        };

        let authorizer = Self {
            grants,
            records,
            env: CheckEnv {
                resolver,
                traverser,
                schema: Arc::new(model.schema),
            },
            actions: DashMap::new(),
            metrics,
            config,
        };

        for binding in model.actions {
            authorizer.register(binding.table, binding.action, binding.expr)?;
        }

        info!(
            "Authorizer initialized with cache={}, mode={:?}, metrics={}, actions={}",
            authorizer.config.cache.enabled,
            authorizer.config.mode,
            authorizer.config.enable_metrics,
            authorizer.actions.len()
        );

        Ok(authorizer)
    }

    /// Create an authorizer over one store serving both grants and records
    pub fn with_store<S>(config: EngineConfig, model: Model, store: Arc<S>) -> Result<Self>
    where
        S: GrantStore + RecordStore + 'static,
    {
        let grants: Arc<dyn GrantStore> = store.clone();
        let records: Arc<dyn RecordStore> = store;
        Self::new(config, model, grants, records)
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register the expression `can` evaluates for `action` on `table`
    ///
    /// `table` may be [`ANY_TABLE`]. A later registration replaces an
    /// earlier one.
    ///
    /// # Errors
    ///
    /// `Traversal` if the expression follows a path that is not declared from
    /// `table`.
    pub fn register(
        &self,
        table: impl Into<String>,
        action: impl Into<String>,
        expr: impl Into<Expr>,
    ) -> Result<()> {
        let table = table.into();
        let action = action.into();
        let expr = expr.into();

        if table != ANY_TABLE {
            for checker in expr.checkers() {
                for path in checker.paths() {
                    self.env.traverser.validate_path(&table, path)?;
                }
            }
        }

        debug!("Registered '{}' on '{}': {}", action, table, expr);
        self.actions.insert((table, action), Arc::new(expr));
        Ok(())
    }

    /// Attach a permission to each of the roles
    ///
    /// Every name is resolved before anything is attached.
    ///
    /// # Errors
    ///
    /// `NotFound` if the permission or one of the roles is unknown.
    pub async fn assign(&self, permission: &str, roles: &[&str]) -> Result<()> {
        let found = self.find_permission(permission).await?;

        let mut targets = Vec::with_capacity(roles.len());
        for name in roles {
            targets.push(self.find_role(name).await?);
        }

        // A failure partway leaves earlier roles attached; invalidate either way
        let attached: Result<()> = async {
            for role in &targets {
                if self.grants.attach_permission(found.id, role.id).await? {
                    info!("Assigned permission '{}' to role '{}'", permission, role.name);
                }
            }
            Ok(())
        }
        .await;

        self.env.resolver.on_permission_changed(permission);
        attached
    }

    /// Detach a permission from a role; no-op if not attached
    ///
    /// # Errors
    ///
    /// `NotFound` if the permission or the role is unknown.
    pub async fn unassign(&self, permission: &str, role: &str) -> Result<()> {
        let found = self.find_permission(permission).await?;
        let role = self.find_role(role).await?;

        let detached = self.grants.detach_permission(found.id, role.id).await;
        self.env.resolver.on_permission_changed(permission);

        if detached? {
            info!("Unassigned permission '{}' from role '{}'", permission, role.name);
        } else {
            debug!("Permission '{}' was not assigned to role '{}'", permission, role.name);
        }
        Ok(())
    }

    /// Grant a role to a group on a context; idempotent
    ///
    /// # Errors
    ///
    /// - `NotFound` if the group or the role is unknown
    /// - `PermissionGrant` if the role's table scope excludes the context's
    ///   table, or a global role is granted outside the global context
    pub async fn grant(&self, group: GroupId, role: &str, context: &Context) -> Result<()> {
        self.find_group(group).await?;
        let role = self.find_role(role).await?;

        if !role.allows_table(&context.table) {
            return Err(RbacError::PermissionGrant(format!(
                "role '{}' cannot be granted on table '{}' (allowed: {})",
                role.name,
                context.table,
                role.tables.iter().cloned().collect::<Vec<_>>().join(", ")
            )));
        }

        if role.is_global && !context.is_global() {
            return Err(RbacError::PermissionGrant(format!(
                "global role '{}' can only be granted on the global context, not {}",
                role.name, context
            )));
        }

        let grant = RoleGrant::new(group, role.id, context.clone());
        let created = self.grants.create_grant(&grant).await;
        self.env.resolver.on_grant_changed(&grant);

        if created? {
            info!("Granted role '{}' to group {} on {}", role.name, group, context);
            if let Some(metrics) = &self.metrics {
                metrics.record_grant(true).await;
            }
        } else {
            debug!("Role '{}' already granted to group {} on {}", role.name, group, context);
        }
        Ok(())
    }

    /// Revoke a role from a group on a context; no-op if not granted
    pub async fn revoke(&self, group: GroupId, role: &str, context: &Context) -> Result<()> {
        let Some(role) = self.grants.find_role(role).await? else {
            debug!("Revoke of unknown role '{}' from group {} ignored", role, group);
            return Ok(());
        };

        let grant = RoleGrant::new(group, role.id, context.clone());
        let removed = self.grants.delete_grant(&grant).await;
        self.env.resolver.on_grant_changed(&grant);

        if removed? {
            info!("Revoked role '{}' from group {} on {}", role.name, group, context);
            if let Some(metrics) = &self.metrics {
                metrics.record_grant(false).await;
            }
        } else {
            debug!("Role '{}' was not granted to group {} on {}", role.name, group, context);
        }
        Ok(())
    }

    /// Add a user to a group
    pub async fn join(&self, user: UserId, group: GroupId) -> Result<()> {
        self.find_group(group).await?;
        let added = self.grants.add_member(user, group).await;
        self.env.resolver.on_membership_changed(user);

        if added? {
            info!("User {} joined group {}", user, group);
        }
        Ok(())
    }

    /// Remove a user from a group; no-op if not a member
    pub async fn leave(&self, user: UserId, group: GroupId) -> Result<()> {
        let removed = self.grants.remove_member(user, group).await;
        self.env.resolver.on_membership_changed(user);

        if removed? {
            info!("User {} left group {}", user, group);
        }
        Ok(())
    }

    /// Whether the user may perform `action` on the record identified by `context`
    ///
    /// An absent grant is `Ok(false)`; errors are reserved for malformed
    /// input and store failures.
    ///
    /// # Errors
    ///
    /// `NotFound` if no record exists for `context`.
    pub async fn can(&self, user: UserId, action: &str, context: &Context) -> Result<bool> {
        let record = if context.is_global() {
            Record::global()
        } else {
            match self.records.fetch(context).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    self.record_error().await;
                    return Err(RbacError::NotFound(format!("record {}", context)));
                }
                Err(e) => {
                    self.record_error().await;
                    return Err(e);
                }
            }
        };

        self.can_record(user, action, record).await
    }

    /// Same as [`can`](Self::can) for a record the caller already holds
    pub async fn can_record(&self, user: UserId, action: &str, record: Record) -> Result<bool> {
        let start = Instant::now();
        let expr = self.expression_for(&record, action);
        let context = record.context();

        let result = async {
            let request = CheckRequest::for_user(&self.env.resolver, user, record).await?;
            expr.evaluate(&self.env, &request, self.config.mode).await
        }
        .await;

        match &result {
            Ok(allowed) => {
                debug!(
                    "Decision: {} user={} action={} context={}",
                    if *allowed { "ALLOW" } else { "DENY" },
                    user,
                    action,
                    context
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_decision(*allowed, start.elapsed()).await;
                }
            }
            Err(e) => {
                warn!(
                    "Check failed: user={} action={} context={}: {}",
                    user, action, context, e
                );
                self.record_error().await;
            }
        }

        result
    }

    /// Whether any of the user's groups holds the role, in any context
    pub async fn has_role(&self, user: UserId, role: &str) -> Result<bool> {
        let Some(role) = self.grants.find_role(role).await? else {
            return Ok(false);
        };

        let groups = self.env.resolver.groups_of(user).await?;
        let roles = self.env.resolver.roles_of(&groups).await?;
        Ok(roles.contains(&role.id))
    }

    /// Whether the group holds the role, in any context
    pub async fn group_has_role(&self, group: GroupId, role: &str) -> Result<bool> {
        let Some(role) = self.grants.find_role(role).await? else {
            return Ok(false);
        };

        let roles = self.env.resolver.roles_of(&BTreeSet::from([group])).await?;
        Ok(roles.contains(&role.id))
    }

    /// Whether the group holds a role carrying the permission, in any context
    ///
    /// An unknown permission is `Ok(false)`.
    pub async fn group_has_permission(&self, group: GroupId, permission: &str) -> Result<bool> {
        let carriers = match self.env.resolver.permission_roles(permission).await {
            Ok(carriers) => carriers,
            Err(RbacError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        let roles = self.env.resolver.roles_of(&BTreeSet::from([group])).await?;
        Ok(carriers.all_roles().iter().any(|id| roles.contains(id)))
    }

    /// Grants held by a group
    pub async fn grants_of(&self, group: GroupId) -> Result<Vec<GrantEntry>> {
        self.grants.list_grants(group).await
    }

    /// Drop every cached lookup
    pub fn invalidate_cache(&self) {
        self.env.resolver.clear();
        info!("Resolver cache invalidated");
    }

    /// Resolver cache statistics
    pub fn cache_stats(&self) -> ResolverStats {
        self.env.resolver.cache_stats()
    }

    /// Metrics snapshot, if metrics are enabled
    pub async fn metrics(&self) -> Option<EngineMetrics> {
        let metrics = self.metrics.as_ref()?;
        let mut snapshot = metrics.get_metrics().await;

        let stats = self.cache_stats();
        snapshot.cache_hits = stats.hits() as u64;
        snapshot.cache_misses = stats.misses() as u64;
        Some(snapshot)
    }

    /// Metrics in Prometheus text format, if metrics are enabled
    pub async fn export_prometheus(&self) -> Option<String> {
        self.metrics().await.map(|snapshot| snapshot.to_prometheus())
    }

    /// Expression registered for the record's table, then for any table,
    /// then the direct-grant default
    fn expression_for(&self, record: &Record, action: &str) -> Arc<Expr> {
        let registered = self
            .actions
            .get(&(record.table.clone(), action.to_string()))
            .or_else(|| self.actions.get(&(ANY_TABLE.to_string(), action.to_string())))
            .map(|entry| entry.value().clone());

        registered.unwrap_or_else(|| {
            let checker = if record.is_global() {
                Checker::global(action)
            } else {
                Checker::direct(action)
            };
            Arc::new(Expr::Leaf(checker))
        })
    }

    async fn find_role(&self, name: &str) -> Result<Role> {
        self.grants
            .find_role(name)
            .await?
            .ok_or_else(|| RbacError::NotFound(format!("role '{}'", name)))
    }

    async fn find_permission(&self, name: &str) -> Result<Permission> {
        self.grants
            .find_permission(name)
            .await?
            .ok_or_else(|| RbacError::NotFound(format!("permission '{}'", name)))
    }

    async fn find_group(&self, id: GroupId) -> Result<()> {
        match self.grants.find_group(id).await? {
            Some(_) => Ok(()),
            None => Err(RbacError::NotFound(format!("group {}", id))),
        }
    }

    async fn record_error(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.record_error().await;
        }
    }
}
