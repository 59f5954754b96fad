//! Service-level tests of the session and permission lifecycle over the
//! in-memory stores.

use warden_api::app::services::{build_in_memory_services, AppServices};
use warden_api::config::AppConfig;
use warden_core::AuthError;

fn services() -> AppServices {
    build_in_memory_services(&AppConfig::for_tests("test-access", "test-refresh"))
}

/// Create an org with one registered user; returns the user id.
async fn seed_user(
    services: &AppServices,
    slug: &str,
    email: &str,
    password: &str,
) -> (warden_core::TenantId, warden_core::UserId) {
    let org = services
        .auth
        .create_organization(slug, "Test Org")
        .await
        .unwrap();
    let user = services
        .auth
        .register(slug, email, password, "Jane", "Doe")
        .await
        .unwrap();
    (org.id, user.id)
}

#[tokio::test]
async fn end_to_end_session_lifecycle() {
    let services = services();
    let (tenant_id, user_id) = seed_user(&services, "acme-corp", "jane@acme.test", "s3cret-pass").await;

    // Login yields a pair; the access token carries the tenant context.
    let pair = services
        .auth
        .login("acme-corp", "jane@acme.test", "s3cret-pass")
        .await
        .unwrap();
    let claims = services.signer.verify_access(&pair.access_token).unwrap();
    assert_eq!(claims.sub, user_id);
    assert_eq!(claims.org, tenant_id);
    assert_eq!(pair.expires_in, 900);

    // Authenticate accepts the fresh token (empty permission set so far).
    let (claims, perms) = services.auth.authenticate(&pair.access_token).await.unwrap();
    assert_eq!(claims.sub, user_id);
    assert!(perms.is_empty());

    // Rotation yields a fresh pair and consumes the old refresh token.
    let rotated = services.auth.refresh(&pair.refresh_token).await.unwrap();
    assert_ne!(rotated.refresh_token, pair.refresh_token);
    services.signer.verify_access(&rotated.access_token).unwrap();

    // The rotated token works again.
    let rotated2 = services.auth.refresh(&rotated.refresh_token).await.unwrap();

    // Logout ends the session: the access token is blacklisted and the
    // refresh token is dead.
    services
        .auth
        .logout(Some(&rotated2.access_token), Some(&rotated2.refresh_token))
        .await
        .unwrap();

    let key = format!("blacklist:{}", rotated2.access_token);
    assert!(services.cache.get(&key).await.unwrap().is_some());

    // The blacklisted access token no longer authenticates, despite being
    // cryptographically valid.
    let err = services.auth.authenticate(&rotated2.access_token).await.unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));

    let err = services.auth.refresh(&rotated2.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));
}

#[tokio::test]
async fn replayed_refresh_token_kills_the_whole_family() {
    let services = services();
    seed_user(&services, "acme-corp", "jane@acme.test", "s3cret-pass").await;

    let pair = services
        .auth
        .login("acme-corp", "jane@acme.test", "s3cret-pass")
        .await
        .unwrap();

    let rotated = services.auth.refresh(&pair.refresh_token).await.unwrap();

    // Replaying the consumed token is rejected...
    let err = services.auth.refresh(&pair.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));

    // ...and drags the legitimately rotated token down with it.
    let err = services.auth.refresh(&rotated.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));

    // A fresh login starts a new family, unaffected by the dead one.
    let fresh = services
        .auth
        .login("acme-corp", "jane@acme.test", "s3cret-pass")
        .await
        .unwrap();
    services.auth.refresh(&fresh.refresh_token).await.unwrap();
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let services = services();
    seed_user(&services, "acme-corp", "jane@acme.test", "s3cret-pass").await;

    // Unknown user and wrong password produce the identical error.
    let unknown = services
        .auth
        .login("acme-corp", "nobody@acme.test", "whatever-pass")
        .await
        .unwrap_err();
    let wrong = services
        .auth
        .login("acme-corp", "jane@acme.test", "wrong-pass")
        .await
        .unwrap_err();

    assert_eq!(format!("{unknown}"), format!("{wrong}"));
    assert!(matches!(unknown, AuthError::Unauthorized(_)));

    // Unknown organization is its own, earlier failure.
    let err = services
        .auth
        .login("no-such-org", "jane@acme.test", "s3cret-pass")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotFound(_)));
}

#[tokio::test]
async fn malformed_refresh_token_is_rejected() {
    let services = services();

    let err = services.auth.refresh("not-a-jwt").await.unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));

    // Signed with the wrong key: also rejected before any store access.
    let other = warden_auth::TokenSigner::new(b"other", b"other", 900, 604_800);
    let forged = other
        .sign_refresh(
            warden_core::UserId::new(),
            warden_core::TenantId::new(),
            warden_core::TokenFamilyId::new(),
        )
        .unwrap();
    let err = services.auth.refresh(&forged).await.unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));
}

#[tokio::test]
async fn expired_refresh_token_is_rejected() {
    let mut config = AppConfig::for_tests("test-access", "test-refresh");
    // Far enough in the past to defeat the decode leeway.
    config.refresh_ttl_secs = -300;
    let services = build_in_memory_services(&config);
    seed_user(&services, "acme-corp", "jane@acme.test", "s3cret-pass").await;

    let pair = services
        .auth
        .login("acme-corp", "jane@acme.test", "s3cret-pass")
        .await
        .unwrap();

    let err = services.auth.refresh(&pair.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));
}

#[tokio::test]
async fn deactivated_user_cannot_login_or_refresh() {
    let services = services();
    let (tenant_id, user_id) = seed_user(&services, "acme-corp", "jane@acme.test", "s3cret-pass").await;

    let pair = services
        .auth
        .login("acme-corp", "jane@acme.test", "s3cret-pass")
        .await
        .unwrap();

    services.rbac.deactivate_user(tenant_id, user_id).await.unwrap();

    // Login is now the generic credential failure; the email is not
    // confirmed as existing.
    let err = services
        .auth
        .login("acme-corp", "jane@acme.test", "s3cret-pass")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));

    // The outstanding session dies at its next rotation.
    let err = services.auth.refresh(&pair.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));
}

#[tokio::test]
async fn force_logout_ends_every_session() {
    let services = services();
    let (_, user_id) = seed_user(&services, "acme-corp", "jane@acme.test", "s3cret-pass").await;

    // Two independent sessions (two families), e.g. two devices.
    let a = services
        .auth
        .login("acme-corp", "jane@acme.test", "s3cret-pass")
        .await
        .unwrap();
    let b = services
        .auth
        .login("acme-corp", "jane@acme.test", "s3cret-pass")
        .await
        .unwrap();
    assert_ne!(a.refresh_token, b.refresh_token);

    let revoked = services.auth.force_logout(user_id).await.unwrap();
    assert_eq!(revoked, 2);

    assert!(services.auth.refresh(&a.refresh_token).await.is_err());
    assert!(services.auth.refresh(&b.refresh_token).await.is_err());
}

#[tokio::test]
async fn role_grants_flow_into_resolved_permissions() {
    let services = services();
    let (tenant_id, user_id) = seed_user(&services, "acme-corp", "jane@acme.test", "s3cret-pass").await;

    let read = services
        .rbac
        .create_permission("USER_READ", "USER")
        .await
        .unwrap();
    let update = services
        .rbac
        .create_permission("USER_UPDATE", "USER")
        .await
        .unwrap();

    let role = services.rbac.create_role(tenant_id, "admin").await.unwrap();
    services
        .rbac
        .set_role_permissions(tenant_id, role.id, &[read.id, update.id])
        .await
        .unwrap();

    // Before assignment: empty set, deny by default.
    let perms = services.rbac.user_permissions(tenant_id, user_id).await.unwrap();
    assert!(perms.is_empty());

    services
        .rbac
        .set_user_roles(tenant_id, user_id, &[role.id])
        .await
        .unwrap();

    // Assignment invalidated the cached empty set; the grant is visible
    // immediately, not after a cache TTL.
    let perms = services.rbac.user_permissions(tenant_id, user_id).await.unwrap();
    assert!(perms.contains(&warden_auth::Permission::new("USER_READ")));
    assert!(perms.contains(&warden_auth::Permission::new("USER_UPDATE")));

    // Revocation is just as immediate.
    services
        .rbac
        .set_user_roles(tenant_id, user_id, &[])
        .await
        .unwrap();
    let perms = services.rbac.user_permissions(tenant_id, user_id).await.unwrap();
    assert!(perms.is_empty());
}

#[tokio::test]
async fn roles_are_tenant_isolated() {
    let services = services();
    let (tenant_a, user_a) = seed_user(&services, "acme-corp", "jane@acme.test", "s3cret-pass").await;
    let (tenant_b, _) = seed_user(&services, "globex", "hank@globex.test", "s3cret-pass").await;

    let role_b = services.rbac.create_role(tenant_b, "admin").await.unwrap();

    // Tenant A cannot see or mutate tenant B's role.
    let err = services
        .rbac
        .rename_role(tenant_a, role_b.id, "stolen")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotFound(_)));

    // Nor assign it to its own users.
    let err = services
        .rbac
        .set_user_roles(tenant_a, user_a, &[role_b.id])
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Validation(_)));
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let services = services();
    seed_user(&services, "acme-corp", "jane@acme.test", "s3cret-pass").await;

    let err = services
        .auth
        .register("acme-corp", "jane@acme.test", "another-pass", "J", "D")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Conflict(_)));

    // The same email in a different organization is fine.
    services
        .auth
        .create_organization("globex", "Globex")
        .await
        .unwrap();
    services
        .auth
        .register("globex", "jane@acme.test", "another-pass", "J", "D")
        .await
        .unwrap();
}

#[tokio::test]
async fn registration_validation() {
    let services = services();
    services
        .auth
        .create_organization("acme-corp", "Acme")
        .await
        .unwrap();

    let err = services
        .auth
        .register("acme-corp", "not-an-email", "s3cret-pass", "J", "D")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Validation(_)));

    let err = services
        .auth
        .register("acme-corp", "jane@acme.test", "short", "J", "D")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Validation(_)));

    let err = services
        .auth
        .register("no-such-org", "jane@acme.test", "s3cret-pass", "J", "D")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotFound(_)));
}

#[tokio::test]
async fn logout_revokes_refresh_token_without_a_usable_access_token() {
    let services = services();
    seed_user(&services, "acme-corp", "jane@acme.test", "s3cret-pass").await;

    // Garbage access token: nothing to blacklist, but the refresh token
    // still dies.
    let pair = services
        .auth
        .login("acme-corp", "jane@acme.test", "s3cret-pass")
        .await
        .unwrap();
    services
        .auth
        .logout(Some("not-a-jwt"), Some(&pair.refresh_token))
        .await
        .unwrap();
    let err = services.auth.refresh(&pair.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));

    // No access token at all: same outcome.
    let pair = services
        .auth
        .login("acme-corp", "jane@acme.test", "s3cret-pass")
        .await
        .unwrap();
    services
        .auth
        .logout(None, Some(&pair.refresh_token))
        .await
        .unwrap();
    let err = services.auth.refresh(&pair.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));

    // Access token alone: blacklisted, refresh token untouched.
    let pair = services
        .auth
        .login("acme-corp", "jane@acme.test", "s3cret-pass")
        .await
        .unwrap();
    services
        .auth
        .logout(Some(&pair.access_token), None)
        .await
        .unwrap();
    let err = services.auth.authenticate(&pair.access_token).await.unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));
    services.auth.refresh(&pair.refresh_token).await.unwrap();
}

/// Cache whose every operation fails, standing in for an unreachable backend.
struct UnreachableCache;

#[async_trait::async_trait]
impl warden_infra::Cache for UnreachableCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, warden_infra::CacheError> {
        Err(warden_infra::CacheError::Backend("connection refused".into()))
    }

    async fn set(
        &self,
        _key: &str,
        _value: &str,
        _ttl: std::time::Duration,
    ) -> Result<(), warden_infra::CacheError> {
        Err(warden_infra::CacheError::Backend("connection refused".into()))
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<u64, warden_infra::CacheError> {
        Err(warden_infra::CacheError::Backend("connection refused".into()))
    }
}

#[tokio::test]
async fn cache_outage_degrades_to_store_reads() {
    use std::sync::Arc;
    use warden_infra::InMemoryStore;

    let store = Arc::new(InMemoryStore::new());
    let services = warden_api::app::services::build_services_with(
        &AppConfig::for_tests("test-access", "test-refresh"),
        store.clone(),
        store.clone(),
        store,
        Arc::new(UnreachableCache),
    );

    let (tenant_id, user_id) = seed_user(&services, "acme-corp", "jane@acme.test", "s3cret-pass").await;
    let perm = services
        .rbac
        .create_permission("USER_READ", "USER")
        .await
        .unwrap();
    let role = services.rbac.create_role(tenant_id, "admin").await.unwrap();
    services
        .rbac
        .set_role_permissions(tenant_id, role.id, &[perm.id])
        .await
        .unwrap();
    services
        .rbac
        .set_user_roles(tenant_id, user_id, &[role.id])
        .await
        .unwrap();

    // Resolution falls through to the relational store.
    let perms = services.rbac.user_permissions(tenant_id, user_id).await.unwrap();
    assert!(perms.contains(&warden_auth::Permission::new("USER_READ")));

    // Login and authentication survive the outage: the blacklist read
    // degrades to a miss.
    let pair = services
        .auth
        .login("acme-corp", "jane@acme.test", "s3cret-pass")
        .await
        .unwrap();
    let (claims, perms) = services.auth.authenticate(&pair.access_token).await.unwrap();
    assert_eq!(claims.sub, user_id);
    assert!(perms.contains(&warden_auth::Permission::new("USER_READ")));

    // Logout cannot blacklist, but still kills the refresh token.
    services
        .auth
        .logout(Some(&pair.access_token), Some(&pair.refresh_token))
        .await
        .unwrap();
    let err = services.auth.refresh(&pair.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));
}

#[tokio::test]
async fn renaming_a_role_flushes_cached_permissions() {
    let services = services();
    let (tenant_id, user_id) = seed_user(&services, "acme-corp", "jane@acme.test", "s3cret-pass").await;

    let perm = services
        .rbac
        .create_permission("USER_READ", "USER")
        .await
        .unwrap();
    let role = services.rbac.create_role(tenant_id, "admin").await.unwrap();
    services
        .rbac
        .set_role_permissions(tenant_id, role.id, &[perm.id])
        .await
        .unwrap();
    services
        .rbac
        .set_user_roles(tenant_id, user_id, &[role.id])
        .await
        .unwrap();

    // Prime the cache.
    services.rbac.user_permissions(tenant_id, user_id).await.unwrap();
    let key = format!("perms:{user_id}:{tenant_id}");
    assert!(services.cache.get(&key).await.unwrap().is_some());

    // Editing the role drops the cached set like deleting it does.
    services
        .rbac
        .rename_role(tenant_id, role.id, "administrator")
        .await
        .unwrap();
    assert!(services.cache.get(&key).await.unwrap().is_none());
}
