//! Shared fixtures for access control integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use rolegate_audit::{AuditConfig, AuditRecorder, AuditStore, CallerContext, InMemoryAuditStore};
use rolegate_authz::{
    AccessControlService, CacheBackend, CacheConfig, CachedAccess, DataStore, InMemoryCacheBackend,
    InMemoryDataStore, NewPermission, NewRole, Permission, PermissionCache, PermissionId,
    PermissionResolver, RbacError, Result, Role, RoleGrant, RoleId, User, UserId,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

static TRACING: Once = Once::new();

/// Route tracing output through the test harness (`RUST_LOG` to filter)
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// FAULT INJECTION
// ============================================================================

/// Data store whose writes can be made to fail
pub struct FlakyStore {
    pub inner: Arc<InMemoryDataStore>,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<InMemoryDataStore>) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(RbacError::Storage("write rejected".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DataStore for FlakyStore {
    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        self.inner.get_user(id).await
    }

    async fn get_active_roles_with_permissions(&self, user_id: UserId) -> Result<Vec<RoleGrant>> {
        self.inner.get_active_roles_with_permissions(user_id).await
    }

    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        self.inner.get_role_by_name(name).await
    }

    async fn get_permission_by_name(&self, name: &str) -> Result<Option<Permission>> {
        self.inner.get_permission_by_name(name).await
    }

    async fn create_role(&self, role: &NewRole, created_by: Option<UserId>) -> Result<Role> {
        self.check()?;
        self.inner.create_role(role, created_by).await
    }

    async fn create_permission(
        &self,
        permission: &NewPermission,
        created_by: Option<UserId>,
    ) -> Result<Permission> {
        self.check()?;
        self.inner.create_permission(permission, created_by).await
    }

    async fn set_role_active(&self, role_id: RoleId, active: bool) -> Result<Role> {
        self.check()?;
        self.inner.set_role_active(role_id, active).await
    }

    async fn set_permission_active(&self, permission_id: PermissionId, active: bool) -> Result<Permission> {
        self.check()?;
        self.inner.set_permission_active(permission_id, active).await
    }

    async fn link_user_role(&self, user_id: UserId, role_id: RoleId) -> Result<bool> {
        self.check()?;
        self.inner.link_user_role(user_id, role_id).await
    }

    async fn unlink_user_role(&self, user_id: UserId, role_id: RoleId) -> Result<bool> {
        self.check()?;
        self.inner.unlink_user_role(user_id, role_id).await
    }

    async fn link_role_permission(&self, role_id: RoleId, permission_id: PermissionId) -> Result<bool> {
        self.check()?;
        self.inner.link_role_permission(role_id, permission_id).await
    }

    async fn unlink_role_permission(&self, role_id: RoleId, permission_id: PermissionId) -> Result<bool> {
        self.check()?;
        self.inner.unlink_role_permission(role_id, permission_id).await
    }

    async fn users_with_role(&self, role_id: RoleId) -> Result<Vec<UserId>> {
        self.inner.users_with_role(role_id).await
    }

    async fn roles_with_permission(&self, permission_id: PermissionId) -> Result<Vec<RoleId>> {
        self.inner.roles_with_permission(permission_id).await
    }
}

/// Cache backend whose deletes fail a set number of times
pub struct FlakyBackend {
    pub inner: InMemoryCacheBackend,
    delete_failures: AtomicUsize,
    pub delete_attempts: AtomicUsize,
}

impl FlakyBackend {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: InMemoryCacheBackend::new(capacity),
            delete_failures: AtomicUsize::new(0),
            delete_attempts: AtomicUsize::new(0),
        }
    }

    /// Fail the next `n` deletes
    pub fn fail_deletes(&self, n: usize) {
        self.delete_failures.store(n, Ordering::SeqCst);
    }

    pub fn delete_attempts(&self) -> usize {
        self.delete_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheBackend for FlakyBackend {
    async fn get(&self, key: &str) -> Result<Option<CachedAccess>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: CachedAccess, ttl: Duration) -> Result<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.delete_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.delete_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.delete_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RbacError::Storage("cache unavailable".into()));
        }
        self.inner.delete(key).await
    }
}

// ============================================================================
// FIXTURE
// ============================================================================

pub struct Fixture {
    pub store: Arc<InMemoryDataStore>,
    pub cache: Arc<PermissionCache>,
    pub audit: Arc<InMemoryAuditStore>,
    pub service: AccessControlService,
    pub admin: CallerContext,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_config(CacheConfig::default()).await
    }

    pub async fn with_config(config: CacheConfig) -> Self {
        init_tracing();

        let store = Arc::new(InMemoryDataStore::new());
        let cache = Arc::new(PermissionCache::in_memory(store.clone(), config));
        let audit = Arc::new(InMemoryAuditStore::new());
        let recorder = Arc::new(AuditRecorder::new(audit.clone(), AuditConfig::default()));
        let service = AccessControlService::new(store.clone(), cache.clone(), recorder);

        let admin = User::new("admin");
        store.upsert_user(admin.clone()).await;

        Self {
            store,
            cache,
            audit,
            service,
            admin: CallerContext::actor(admin.id),
        }
    }

    pub async fn user(&self, username: &str) -> User {
        let user = User::new(username);
        self.store.upsert_user(user.clone()).await;
        user
    }

    /// `editor` grants doc.edit and doc.view; `viewer` grants doc.view
    pub async fn seed_doc_roles(&self) {
        for (name, action) in [("doc.edit", "edit"), ("doc.view", "view")] {
            self.service
                .create_permission(&self.admin, NewPermission::new(name, "doc", action))
                .await
                .unwrap();
        }
        self.service
            .create_role(
                &self.admin,
                NewRole::new("editor").with_permissions(["doc.edit", "doc.view"]),
            )
            .await
            .unwrap();
        self.service
            .create_role(&self.admin, NewRole::new("viewer").with_permissions(["doc.view"]))
            .await
            .unwrap();
    }

    pub async fn audit_actions(&self) -> Vec<String> {
        self.audit
            .events()
            .await
            .into_iter()
            .map(|e| e.action)
            .collect()
    }
}

/// Cache wired to a fault-injecting backend
pub fn flaky_cache(
    store: Arc<dyn DataStore>,
    config: CacheConfig,
) -> (Arc<PermissionCache>, Arc<FlakyBackend>) {
    let backend = Arc::new(FlakyBackend::new(config.capacity));
    let cache = Arc::new(PermissionCache::new(
        PermissionResolver::new(store),
        backend.clone(),
        config,
    ));
    (cache, backend)
}

/// Audit store that rejects every append
pub struct RejectingAuditStore;

#[async_trait]
impl AuditStore for RejectingAuditStore {
    async fn append(
        &self,
        _event: rolegate_audit::AuditEvent,
    ) -> rolegate_audit::Result<rolegate_audit::AuditEventId> {
        Err(rolegate_audit::AuditError::Storage("audit store offline".into()))
    }

    async fn query(
        &self,
        _query: &rolegate_audit::AuditQuery,
    ) -> rolegate_audit::Result<Vec<rolegate_audit::AuditEvent>> {
        Ok(vec![])
    }
}
