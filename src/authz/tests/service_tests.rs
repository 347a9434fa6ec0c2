//! Access control service tests
//!
//! Mutation ordering (store, invalidate, audit), idempotency, cascade
//! invalidation and failure isolation.

mod common;

use common::{flaky_cache, init_tracing, FlakyStore, Fixture, RejectingAuditStore};
use rolegate_audit::{AuditConfig, AuditRecorder, CallerContext, InMemoryAuditStore};
use rolegate_authz::{
    actions, AccessControlService, AuthorizationError, CacheConfig, Change, DataStore,
    InMemoryDataStore, NewPermission, NewRole, PermissionCache, PermissionSet, RbacError,
    Requirement, RoleChangeInvalidation, User,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// SCENARIOS
// ============================================================================

#[tokio::test]
async fn test_editor_viewer_revoke_scenario() {
    let fx = Fixture::new().await;
    fx.seed_doc_roles().await;
    let user = fx.user("pat").await;

    fx.service.assign_role(&fx.admin, user.id, "editor").await.unwrap();
    fx.service.assign_role(&fx.admin, user.id, "viewer").await.unwrap();

    assert_eq!(
        fx.service.user_permissions(user.id).await.unwrap(),
        ["doc.edit", "doc.view"].into_iter().collect::<PermissionSet>()
    );

    let change = fx.service.revoke_role(&fx.admin, user.id, "editor").await.unwrap();
    assert_eq!(change, Change::Applied);

    assert_eq!(
        fx.service.user_permissions(user.id).await.unwrap(),
        ["doc.view"].into_iter().collect::<PermissionSet>()
    );
    assert!(!fx.service.has_role(user.id, "editor").await.unwrap());
    assert!(fx.service.has_role(user.id, "viewer").await.unwrap());
}

#[tokio::test]
async fn test_mutations_are_audited_with_actor() {
    let fx = Fixture::new().await;
    fx.seed_doc_roles().await;
    let user = fx.user("quinn").await;

    fx.service.assign_role(&fx.admin, user.id, "viewer").await.unwrap();
    fx.service.revoke_role(&fx.admin, user.id, "viewer").await.unwrap();

    assert_eq!(
        fx.audit_actions().await,
        vec![
            actions::PERMISSION_CREATED,
            actions::PERMISSION_CREATED,
            actions::ROLE_CREATED,
            actions::ROLE_CREATED,
            actions::ROLE_ASSIGNED,
            actions::ROLE_REVOKED,
        ]
    );

    let events = fx.audit.events().await;
    let assigned = &events[4];
    assert_eq!(assigned.actor_id, fx.admin.actor_id);
    assert_eq!(assigned.resource_type.as_deref(), Some("User"));
    assert_eq!(assigned.resource_id, Some(user.id.to_string()));

    let new_values = assigned.new_values.clone().unwrap();
    assert_eq!(new_values["role"], json!("viewer"));
    assert_eq!(new_values["username"], json!("quinn"));

    let revoked = &events[5];
    assert!(revoked.new_values.is_none());
    assert_eq!(revoked.old_values.as_ref().unwrap()["role"], json!("viewer"));
}

// ============================================================================
// IDEMPOTENCY AND VALIDATION
// ============================================================================

#[tokio::test]
async fn test_assign_and_revoke_are_idempotent() {
    let fx = Fixture::new().await;
    fx.seed_doc_roles().await;
    let user = fx.user("rene").await;

    assert_eq!(
        fx.service.assign_role(&fx.admin, user.id, "viewer").await.unwrap(),
        Change::Applied
    );
    let invalidations = fx.cache.stats().invalidations;
    let events = fx.audit.len().await;

    assert_eq!(
        fx.service.assign_role(&fx.admin, user.id, "viewer").await.unwrap(),
        Change::Unchanged
    );
    assert_eq!(
        fx.service.revoke_role(&fx.admin, user.id, "editor").await.unwrap(),
        Change::Unchanged
    );

    assert_eq!(fx.cache.stats().invalidations, invalidations);
    assert_eq!(fx.audit.len().await, events);
}

#[tokio::test]
async fn test_assign_unknown_or_inactive_role_is_not_found() {
    let fx = Fixture::new().await;
    fx.seed_doc_roles().await;
    let user = fx.user("sam").await;

    let err = fx
        .service
        .assign_role(&fx.admin, user.id, "ghost")
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    fx.service.set_role_active(&fx.admin, "viewer", false).await.unwrap();
    let err = fx
        .service
        .assign_role(&fx.admin, user.id, "viewer")
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = fx
        .service
        .assign_role(&fx.admin, uuid::Uuid::new_v4(), "editor")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_duplicates_are_validation_errors() {
    let fx = Fixture::new().await;
    fx.seed_doc_roles().await;
    let events = fx.audit.len().await;

    let dup_role = fx
        .service
        .create_role(&fx.admin, NewRole::new("editor"))
        .await
        .unwrap_err();
    assert!(matches!(dup_role, RbacError::Validation(_)));

    let dup_name = fx
        .service
        .create_permission(&fx.admin, NewPermission::new("doc.view", "doc", "read"))
        .await
        .unwrap_err();
    assert!(matches!(dup_name, RbacError::Validation(_)));

    let dup_pair = fx
        .service
        .create_permission(&fx.admin, NewPermission::new("doc.look", "doc", "view"))
        .await
        .unwrap_err();
    assert!(matches!(dup_pair, RbacError::Validation(_)));

    assert_eq!(fx.audit.len().await, events, "Rejected creates are not audited");
}

#[tokio::test]
async fn test_create_role_links_only_active_permissions() {
    let fx = Fixture::new().await;
    fx.seed_doc_roles().await;
    fx.service
        .set_permission_active(&fx.admin, "doc.edit", false)
        .await
        .unwrap();

    let user = fx.user("tess").await;
    fx.service
        .create_role(
            &fx.admin,
            NewRole::new("author").with_permissions(["doc.edit", "doc.view", "doc.unknown"]),
        )
        .await
        .unwrap();
    fx.service.assign_role(&fx.admin, user.id, "author").await.unwrap();

    // Reactivating doc.edit does not link it retroactively
    fx.service
        .set_permission_active(&fx.admin, "doc.edit", true)
        .await
        .unwrap();

    assert_eq!(
        fx.service.user_permissions(user.id).await.unwrap(),
        ["doc.view"].into_iter().collect::<PermissionSet>()
    );
}

// ============================================================================
// CASCADE INVALIDATION
// ============================================================================

#[tokio::test]
async fn test_role_content_changes_cascade_to_holders() {
    let fx = Fixture::new().await;
    fx.seed_doc_roles().await;
    let a = fx.user("uma").await;
    let b = fx.user("vic").await;
    for user in [&a, &b] {
        fx.service.assign_role(&fx.admin, user.id, "viewer").await.unwrap();
        assert!(!fx.service.has_permission(user.id, "doc.edit").await.unwrap());
    }

    fx.service
        .grant_permission(&fx.admin, "viewer", "doc.edit")
        .await
        .unwrap();
    assert!(fx.service.has_permission(a.id, "doc.edit").await.unwrap());
    assert!(fx.service.has_permission(b.id, "doc.edit").await.unwrap());

    fx.service
        .revoke_permission(&fx.admin, "viewer", "doc.edit")
        .await
        .unwrap();
    assert!(!fx.service.has_permission(a.id, "doc.edit").await.unwrap());

    fx.service
        .set_permission_active(&fx.admin, "doc.view", false)
        .await
        .unwrap();
    assert!(!fx.service.has_permission(b.id, "doc.view").await.unwrap());

    fx.service.set_role_active(&fx.admin, "viewer", false).await.unwrap();
    assert!(!fx.service.has_role(a.id, "viewer").await.unwrap());
}

#[tokio::test]
async fn test_ttl_only_policy_relies_on_expiry() {
    let config = CacheConfig {
        ttl: Duration::from_millis(300),
        role_change_invalidation: RoleChangeInvalidation::TtlOnly,
        ..Default::default()
    };
    let fx = Fixture::with_config(config).await;
    fx.seed_doc_roles().await;
    let user = fx.user("wes").await;
    fx.service.assign_role(&fx.admin, user.id, "viewer").await.unwrap();
    assert!(fx.service.has_role(user.id, "viewer").await.unwrap());

    fx.service.set_role_active(&fx.admin, "viewer", false).await.unwrap();

    // Stale within the TTL window, correct after it
    assert!(fx.service.has_role(user.id, "viewer").await.unwrap());
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!fx.service.has_role(user.id, "viewer").await.unwrap());
}

#[tokio::test]
async fn test_unchanged_activity_is_noop() {
    let fx = Fixture::new().await;
    fx.seed_doc_roles().await;
    let events = fx.audit.len().await;

    assert_eq!(
        fx.service.set_role_active(&fx.admin, "viewer", true).await.unwrap(),
        Change::Unchanged
    );
    assert_eq!(
        fx.service
            .grant_permission(&fx.admin, "viewer", "doc.view")
            .await
            .unwrap(),
        Change::Unchanged
    );
    assert_eq!(fx.audit.len().await, events);
}

// ============================================================================
// FAILURE ISOLATION
// ============================================================================

#[tokio::test]
async fn test_store_failure_skips_invalidation_and_audit() {
    init_tracing();

    let inner = Arc::new(InMemoryDataStore::new());
    let store = Arc::new(FlakyStore::new(inner.clone()));
    let cache = Arc::new(PermissionCache::in_memory(store.clone(), CacheConfig::default()));
    let audit = Arc::new(InMemoryAuditStore::new());
    let recorder = Arc::new(AuditRecorder::new(audit.clone(), AuditConfig::default()));
    let service = AccessControlService::new(store.clone(), cache.clone(), recorder);
    let admin = CallerContext::anonymous();

    service
        .create_permission(&admin, NewPermission::new("doc.view", "doc", "view"))
        .await
        .unwrap();
    service
        .create_role(&admin, NewRole::new("viewer").with_permissions(["doc.view"]))
        .await
        .unwrap();
    let user = User::new("xena");
    inner.upsert_user(user.clone()).await;
    let events = audit.len().await;

    store.fail_writes(true);
    let err = service.assign_role(&admin, user.id, "viewer").await.unwrap_err();

    assert!(matches!(err, RbacError::Storage(_)));
    assert_eq!(cache.stats().invalidations, 0);
    assert_eq!(cache.generation(user.id), 0);
    assert_eq!(audit.len().await, events);
    assert!(!service.has_role(user.id, "viewer").await.unwrap());
}

#[tokio::test]
async fn test_audit_failure_does_not_fail_mutation() {
    init_tracing();

    let store = Arc::new(InMemoryDataStore::new());
    let cache = Arc::new(PermissionCache::in_memory(store.clone(), CacheConfig::default()));
    let recorder = Arc::new(AuditRecorder::new(
        Arc::new(RejectingAuditStore),
        AuditConfig::default(),
    ));
    let service = AccessControlService::new(store.clone(), cache.clone(), recorder);
    let admin = CallerContext::anonymous();

    service
        .create_permission(&admin, NewPermission::new("doc.view", "doc", "view"))
        .await
        .unwrap();
    service
        .create_role(&admin, NewRole::new("viewer").with_permissions(["doc.view"]))
        .await
        .unwrap();

    let user = User::new("yara");
    store.upsert_user(user.clone()).await;
    assert!(!service.has_permission(user.id, "doc.view").await.unwrap());

    let change = service.assign_role(&admin, user.id, "viewer").await.unwrap();
    assert_eq!(change, Change::Applied);
    assert_eq!(cache.stats().invalidations, 1, "Invalidation precedes audit");
    assert!(service.has_permission(user.id, "doc.view").await.unwrap());
}

#[tokio::test]
async fn test_invalidation_failure_does_not_fail_mutation_or_leave_stale_access() {
    init_tracing();

    let store = Arc::new(InMemoryDataStore::new());
    let config = CacheConfig {
        invalidation_retries: 2,
        retry_backoff: Duration::from_millis(1),
        ..Default::default()
    };
    let (cache, backend) = flaky_cache(store.clone(), config);
    let audit = Arc::new(InMemoryAuditStore::new());
    let recorder = Arc::new(AuditRecorder::new(audit.clone(), AuditConfig::default()));
    let service = AccessControlService::new(store.clone(), cache.clone(), recorder);
    let admin = CallerContext::anonymous();

    service
        .create_permission(&admin, NewPermission::new("doc.edit", "doc", "edit"))
        .await
        .unwrap();
    service
        .create_role(&admin, NewRole::new("editor").with_permissions(["doc.edit"]))
        .await
        .unwrap();
    let user = User::new("zed");
    store.upsert_user(user.clone()).await;
    service.assign_role(&admin, user.id, "editor").await.unwrap();
    assert!(service.has_permission(user.id, "doc.edit").await.unwrap());

    backend.fail_deletes(100);
    let change = service.revoke_role(&admin, user.id, "editor").await.unwrap();

    assert_eq!(change, Change::Applied);
    assert_eq!(backend.delete_attempts(), 1 + 3, "One earlier delete plus three attempts");
    assert_eq!(cache.stats().invalidation_failures, 1);
    assert!(!service.has_permission(user.id, "doc.edit").await.unwrap());

    let recorded: Vec<String> = audit.events().await.into_iter().map(|e| e.action).collect();
    assert_eq!(recorded.last().map(String::as_str), Some(actions::ROLE_REVOKED));
}

// ============================================================================
// MUTATION REQUIREMENT
// ============================================================================

#[tokio::test]
async fn test_mutation_requirement_checked_before_store_io() {
    init_tracing();

    let inner = Arc::new(InMemoryDataStore::new());
    let store = Arc::new(FlakyStore::new(inner.clone()));
    let cache = Arc::new(PermissionCache::in_memory(store.clone(), CacheConfig::default()));
    let audit = Arc::new(InMemoryAuditStore::new());
    let recorder = Arc::new(AuditRecorder::new(audit.clone(), AuditConfig::default()));
    let service = AccessControlService::new(store.clone(), cache, recorder)
        .with_mutation_requirement(Requirement::permission("rbac.manage"));

    let root = User::superuser("root");
    let nobody = User::new("nobody");
    inner.upsert_user(root.clone()).await;
    inner.upsert_user(nobody.clone()).await;

    let err = service
        .create_role(&CallerContext::anonymous(), NewRole::new("ops"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RbacError::Authorization(AuthorizationError::Unauthenticated)
    ));

    // Writes would fail too; Forbidden proves the store was never reached
    store.fail_writes(true);
    let err = service
        .create_role(&CallerContext::actor(nobody.id), NewRole::new("ops"))
        .await
        .unwrap_err();
    assert!(matches!(err, RbacError::Authorization(AuthorizationError::Forbidden)));
    store.fail_writes(false);

    let role = service
        .create_role(&CallerContext::actor(root.id), NewRole::new("ops"))
        .await
        .unwrap();
    assert_eq!(role.created_by, Some(root.id));
    assert!(inner.get_role_by_name("ops").await.unwrap().is_some());
    assert_eq!(audit.len().await, 1);
}
