//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use cretoai_rbac::{
    Authorizer, Context, EngineConfig, GrantEntry, GrantStore, GroupId, InMemoryStore, Model,
    ModelConfig, Permission, PermissionId, Record, RecordStore, Result, Role, RoleGrant, RoleId,
    UserGroup, UserId,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const ALICE: UserId = 1;
pub const BOB: UserId = 2;
pub const G1: GroupId = 1;
pub const G2: GroupId = 2;

/// journals → articles → sections, sections propagate to articles then journals
pub const MODEL: &str = r#"{
    "relations": {
        "journals": { "articles": { "target": "articles", "cardinality": "many" } },
        "articles": {
            "journal": { "target": "journals", "cardinality": "one" },
            "sections": { "target": "sections", "cardinality": "many" }
        },
        "sections": { "article": { "target": "articles", "cardinality": "one" } }
    },
    "propagation": { "sections": ["articles", "journals"] }
}"#;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn model() -> Model {
    ModelConfig::from_json(MODEL).unwrap().build().unwrap()
}

/// Groups, roles, permissions and the journal 1 / article 42 / sections 7, 8 tree
pub async fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new();

    store.put_group(UserGroup::new(G1, "editors")).await;
    store.put_group(UserGroup::new(G2, "reviewers")).await;
    store.add_member(ALICE, G1).await.unwrap();
    store.add_member(BOB, G2).await.unwrap();

    store.put_role(Role::new(1, "editor")).await.unwrap();
    store
        .put_role(Role::new(2, "article_editor").scoped_to(["articles"]))
        .await
        .unwrap();
    store.put_role(Role::new(3, "admin").global()).await.unwrap();
    store.put_permission(Permission::new(1, "write")).await.unwrap();
    store.put_permission(Permission::new(2, "read")).await.unwrap();
    store
        .put_permission(Permission::new(3, "administer").global())
        .await
        .unwrap();

    let journal = Record::new("journals", 1);
    store.put_record(journal.clone()).await;
    for pk in [42, 43] {
        let article = Record::new("articles", pk);
        store.put_record(article.clone()).await;
        store.link(&journal.context(), "articles", &article.context()).await;
        store.link(&article.context(), "journal", &journal.context()).await;
    }
    for (pk, article) in [(7, 42), (8, 42), (9, 43)] {
        let section = Record::new("sections", pk);
        let article = Context::new("articles", article);
        store.put_record(section.clone()).await;
        store.link(&article, "sections", &section.context()).await;
        store.link(&section.context(), "article", &article).await;
    }

    store
}

/// Authorizer over a seeded store with "write" on editor and article_editor
pub async fn authorizer(config: EngineConfig) -> (Authorizer, InMemoryStore) {
    let store = seeded_store().await;
    let authz = Authorizer::with_store(config, model(), Arc::new(store.clone())).unwrap();
    authz.assign("write", &["editor", "article_editor"]).await.unwrap();
    authz.assign("administer", &["admin"]).await.unwrap();
    (authz, store)
}

/// Store wrapper counting backing lookups, with an optional delay on each
pub struct CountingStore {
    inner: InMemoryStore,
    delay: Duration,
    slow_tables: HashMap<String, Duration>,
    pub group_lookups: AtomicUsize,
    pub role_lookups: AtomicUsize,
    pub grant_lookups: AtomicUsize,
    pub permission_lookups: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: InMemoryStore, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            slow_tables: HashMap::new(),
            group_lookups: AtomicUsize::new(0),
            role_lookups: AtomicUsize::new(0),
            grant_lookups: AtomicUsize::new(0),
            permission_lookups: AtomicUsize::new(0),
        }
    }

    /// Grant lookups on `table` stall for `delay` instead
    pub fn with_slow_table(mut self, table: &str, delay: Duration) -> Self {
        self.slow_tables.insert(table.to_string(), delay);
        self
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        Self::sleep(self.delay).await;
    }

    async fn sleep(delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl GrantStore for CountingStore {
    async fn lookup_groups(&self, user: UserId) -> Result<BTreeSet<GroupId>> {
        self.group_lookups.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.inner.lookup_groups(user).await
    }

    async fn lookup_roles(&self, groups: &BTreeSet<GroupId>) -> Result<BTreeSet<RoleId>> {
        self.role_lookups.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.inner.lookup_roles(groups).await
    }

    async fn lookup_grant(
        &self,
        groups: &BTreeSet<GroupId>,
        roles: &BTreeSet<RoleId>,
        context: &Context,
    ) -> Result<bool> {
        self.grant_lookups.fetch_add(1, Ordering::SeqCst);
        // Read first, then stall: the answer may be stale by the time it returns
        let answer = self.inner.lookup_grant(groups, roles, context).await;
        let delay = self
            .slow_tables
            .get(&context.table)
            .copied()
            .unwrap_or(self.delay);
        Self::sleep(delay).await;
        answer
    }

    async fn find_role(&self, name: &str) -> Result<Option<Role>> {
        self.inner.find_role(name).await
    }

    async fn find_permission(&self, name: &str) -> Result<Option<Permission>> {
        self.permission_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.find_permission(name).await
    }

    async fn find_group(&self, id: GroupId) -> Result<Option<UserGroup>> {
        self.inner.find_group(id).await
    }

    async fn roles_with_permission(&self, permission: PermissionId) -> Result<Vec<Role>> {
        self.inner.roles_with_permission(permission).await
    }

    async fn create_grant(&self, grant: &RoleGrant) -> Result<bool> {
        self.inner.create_grant(grant).await
    }

    async fn delete_grant(&self, grant: &RoleGrant) -> Result<bool> {
        self.inner.delete_grant(grant).await
    }

    async fn attach_permission(&self, permission: PermissionId, role: RoleId) -> Result<bool> {
        self.inner.attach_permission(permission, role).await
    }

    async fn detach_permission(&self, permission: PermissionId, role: RoleId) -> Result<bool> {
        self.inner.detach_permission(permission, role).await
    }

    async fn add_member(&self, user: UserId, group: GroupId) -> Result<bool> {
        self.inner.add_member(user, group).await
    }

    async fn remove_member(&self, user: UserId, group: GroupId) -> Result<bool> {
        self.inner.remove_member(user, group).await
    }

    async fn list_grants(&self, group: GroupId) -> Result<Vec<GrantEntry>> {
        self.inner.list_grants(group).await
    }
}

#[async_trait]
impl RecordStore for CountingStore {
    async fn fetch(&self, context: &Context) -> Result<Option<Record>> {
        self.inner.fetch(context).await
    }

    async fn related(&self, record: &Record, relation: &str) -> Result<Vec<Record>> {
        self.inner.related(record, relation).await
    }
}

/// Authorizer over a seeded counting store
pub async fn counting_authorizer(
    config: EngineConfig,
    delay: Duration,
) -> (Arc<Authorizer>, Arc<CountingStore>) {
    let store = CountingStore::new(seeded_store().await, delay);
    authorizer_over(config, store).await
}

/// Authorizer over the given counting store
pub async fn authorizer_over(
    config: EngineConfig,
    store: CountingStore,
) -> (Arc<Authorizer>, Arc<CountingStore>) {
    let store = Arc::new(store);
    let authz = Authorizer::with_store(config, model(), store.clone()).unwrap();
    authz.assign("write", &["editor", "article_editor"]).await.unwrap();
    (Arc::new(authz), store)
}
