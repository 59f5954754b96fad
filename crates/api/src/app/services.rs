//! Service wiring and the application services themselves.
//!
//! `AuthService` owns the credential and token lifecycle, `PermissionService`
//! owns cache-first permission resolution, `RbacService` owns role and
//! permission administration. All three work against the store traits, so the
//! same code runs over in-memory tables in tests and Postgres in production.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use warden_auth::{AccessClaims, PasswordHasher, PermissionSet, RoleScope, TokenError, TokenSigner};
use warden_core::{
    AuthError, AuthResult, PermissionId, RoleId, TenantId, TokenFamilyId, UserId,
};
use warden_infra::{
    Cache, DirectoryStore, InMemoryCache, InMemoryStore, NewUser, PermissionRecord,
    RbacStore, RefreshTokenRecord, RefreshTokenStore, RoleRecord, StoreError, UserRecord,
};

use crate::config::AppConfig;

fn blacklist_key(token: &str) -> String {
    format!("blacklist:{token}")
}

/// Everything the routers need, behind `Arc`s.
#[derive(Clone)]
pub struct AppServices {
    pub auth: Arc<AuthService>,
    pub permissions: Arc<PermissionService>,
    pub rbac: Arc<RbacService>,
    pub signer: Arc<TokenSigner>,
    pub cache: Arc<dyn Cache>,
}

/// Build services over in-memory stores (dev/test).
pub fn build_in_memory_services(config: &AppConfig) -> AppServices {
    let store = Arc::new(InMemoryStore::new());
    let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());

    build_services_with(
        config,
        store.clone(),
        store.clone(),
        store,
        cache,
    )
}

/// Build services over Postgres + Redis.
#[cfg(feature = "redis")]
pub async fn build_persistent_services(config: &AppConfig) -> AppServices {
    use warden_infra::{PostgresStore, RedisCache};

    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

    let pool = sqlx::PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to Postgres");
    let store = Arc::new(PostgresStore::new(pool));

    let cache: Arc<dyn Cache> = Arc::new(
        RedisCache::connect(&redis_url)
            .await
            .expect("Failed to connect to Redis"),
    );

    build_services_with(
        config,
        store.clone(),
        store.clone(),
        store,
        cache,
    )
}

/// Build services over explicit store and cache implementations.
pub fn build_services_with(
    config: &AppConfig,
    directory: Arc<dyn DirectoryStore>,
    rbac_store: Arc<dyn RbacStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    cache: Arc<dyn Cache>,
) -> AppServices {
    let signer = Arc::new(TokenSigner::new(
        config.access_secret.as_bytes(),
        config.refresh_secret.as_bytes(),
        config.access_ttl_secs,
        config.refresh_ttl_secs,
    ));

    let permissions = Arc::new(PermissionService {
        rbac_store: rbac_store.clone(),
        cache: cache.clone(),
        ttl: config.permission_cache_ttl,
    });

    let auth = Arc::new(AuthService {
        directory: directory.clone(),
        refresh_tokens,
        cache: cache.clone(),
        signer: signer.clone(),
        hasher: PasswordHasher::default(),
        permissions: permissions.clone(),
    });

    let rbac = Arc::new(RbacService {
        rbac_store,
        directory,
        permissions: permissions.clone(),
    });

    AppServices {
        auth,
        permissions,
        rbac,
        signer,
        cache,
    }
}

fn store_err(err: StoreError) -> AuthError {
    match err {
        StoreError::Conflict(msg) => AuthError::conflict(msg),
        StoreError::Backend(msg) => AuthError::internal(msg),
    }
}

/// Access + refresh token pair as handed to a client.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access-token lifetime in seconds.
    pub expires_in: i64,
}

/// Credential verification and the token lifecycle.
pub struct AuthService {
    directory: Arc<dyn DirectoryStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    cache: Arc<dyn Cache>,
    signer: Arc<TokenSigner>,
    hasher: PasswordHasher,
    permissions: Arc<PermissionService>,
}

impl AuthService {
    /// Provision a new organization (the tenant boundary everything else
    /// hangs off).
    pub async fn create_organization(
        &self,
        slug: &str,
        name: &str,
    ) -> AuthResult<warden_infra::OrganizationRecord> {
        let slug = slug.trim();
        if slug.is_empty() || !slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(AuthError::validation(
                "slug must be non-empty and use only letters, digits, and dashes",
            ));
        }

        let org = warden_infra::OrganizationRecord {
            id: TenantId::new(),
            slug: slug.to_ascii_lowercase(),
            name: name.to_string(),
            active: true,
        };

        self.directory
            .insert_org(org.clone())
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => AuthError::conflict("organization slug already taken"),
                other => store_err(other),
            })?;

        tracing::info!(tenant_id = %org.id, slug = %org.slug, "organization created");
        Ok(org)
    }

    /// Register a new user within an organization.
    pub async fn register(
        &self,
        org_slug: &str,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> AuthResult<UserRecord> {
        if !email.contains('@') {
            return Err(AuthError::validation("email is not valid"));
        }
        if password.len() < 8 {
            return Err(AuthError::validation(
                "password must be at least 8 characters",
            ));
        }

        let org = self
            .directory
            .find_org_by_slug(org_slug)
            .await
            .map_err(store_err)?
            .filter(|o| o.active)
            .ok_or_else(|| AuthError::not_found("organization not found"))?;

        let password_hash = self
            .hasher
            .hash(password)
            .map_err(AuthError::internal)?;

        let user = self
            .directory
            .insert_user(NewUser {
                tenant_id: org.id,
                email: email.to_string(),
                password_hash,
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => {
                    AuthError::conflict("email already registered in this organization")
                }
                other => store_err(other),
            })?;

        tracing::info!(user_id = %user.id, tenant_id = %org.id, "user registered");
        Ok(user)
    }

    /// Verify credentials and start a new session (fresh token family).
    ///
    /// Unknown user, inactive user, and wrong password all return the same
    /// generic error; a dummy hash verification keeps the unknown-user path
    /// from being distinguishable by timing.
    pub async fn login(
        &self,
        org_slug: &str,
        email: &str,
        password: &str,
    ) -> AuthResult<TokenPair> {
        let org = self
            .directory
            .find_org_by_slug(org_slug)
            .await
            .map_err(store_err)?
            .filter(|o| o.active)
            .ok_or_else(|| AuthError::not_found("organization not found"))?;

        let user = self
            .directory
            .find_user_by_email(org.id, email)
            .await
            .map_err(store_err)?
            .filter(|u| u.active);

        let user = match user {
            Some(user) => user,
            None => {
                self.hasher.verify_dummy(password);
                return Err(AuthError::invalid_credentials());
            }
        };

        if !self.hasher.verify(password, &user.password_hash) {
            return Err(AuthError::invalid_credentials());
        }

        // Best effort; a failed timestamp update must not fail the login.
        if let Err(e) = self.directory.record_login(user.id, Utc::now()).await {
            tracing::warn!(user_id = %user.id, "failed to record login time: {e}");
        }

        tracing::info!(user_id = %user.id, tenant_id = %org.id, "login succeeded");
        self.issue_pair(user.id, &user.email, org.id, TokenFamilyId::new())
            .await
    }

    async fn issue_pair(
        &self,
        user_id: UserId,
        email: &str,
        tenant_id: TenantId,
        family_id: TokenFamilyId,
    ) -> AuthResult<TokenPair> {
        let access_token = self
            .signer
            .sign_access(user_id, email, tenant_id)
            .map_err(AuthError::internal)?;
        let refresh_token = self
            .signer
            .sign_refresh(user_id, tenant_id, family_id)
            .map_err(AuthError::internal)?;

        let now = Utc::now();
        self.refresh_tokens
            .insert(RefreshTokenRecord {
                token: refresh_token.clone(),
                user_id,
                tenant_id,
                family_id,
                expires_at: now + chrono::Duration::seconds(self.signer.refresh_ttl_secs()),
                revoked: false,
                created_at: now,
            })
            .await
            .map_err(store_err)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.signer.access_ttl_secs(),
        })
    }

    /// Verify an access token and resolve the permission set of the identity
    /// it names within the tenant it names.
    ///
    /// Order matters: signature/expiry first, then the blacklist, then
    /// permission resolution. A blacklist read failure is treated as a miss;
    /// the blacklist is advisory, the short access TTL is the hard bound.
    pub async fn authenticate(
        &self,
        access_token: &str,
    ) -> AuthResult<(AccessClaims, PermissionSet)> {
        let claims = self.signer.verify_access(access_token).map_err(|e| match e {
            TokenError::Expired => AuthError::unauthorized("access token expired"),
            TokenError::Invalid => AuthError::unauthorized("invalid access token"),
        })?;

        match self.cache.get(&blacklist_key(access_token)).await {
            Ok(Some(_)) => return Err(AuthError::unauthorized("token has been revoked")),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("blacklist lookup failed, treating as miss: {e}");
            }
        }

        let permissions = self.permissions.resolve(claims.sub, claims.org).await?;
        Ok((claims, permissions))
    }

    /// Rotate a refresh token: the presented token is consumed and a new pair
    /// is issued within the same family.
    ///
    /// Presenting an already-consumed token is treated as evidence of theft:
    /// the whole family is revoked before the caller gets an answer, so
    /// neither the attacker nor the victim can continue the session.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        self.signer
            .verify_refresh(refresh_token)
            .map_err(|_e| AuthError::unauthorized("invalid refresh token"))?;

        let record = self
            .refresh_tokens
            .find_by_token(refresh_token)
            .await
            .map_err(store_err)?
            .ok_or_else(|| AuthError::unauthorized("invalid refresh token"))?;

        // Replay detection runs before anything else can fail: presenting a
        // consumed token must revoke the family even if the token is also
        // past its stored expiry.
        if record.revoked {
            return self.handle_replay(&record).await;
        }

        // Stored expiry is checked independently of the signature's claim.
        if record.expires_at <= Utc::now() {
            return Err(AuthError::unauthorized("refresh token expired"));
        }

        let user = self
            .directory
            .find_user_by_id(record.user_id)
            .await
            .map_err(store_err)?
            .filter(|u| u.active);

        let Some(user) = user else {
            // Deactivated mid-session: kill the lineage too.
            self.revoke_family_logged(record.family_id).await?;
            return Err(AuthError::unauthorized("account is not active"));
        };

        let new_refresh = self
            .signer
            .sign_refresh(user.id, record.tenant_id, record.family_id)
            .map_err(AuthError::internal)?;

        let now = Utc::now();
        let won = self
            .refresh_tokens
            .rotate(
                refresh_token,
                RefreshTokenRecord {
                    token: new_refresh.clone(),
                    user_id: user.id,
                    tenant_id: record.tenant_id,
                    family_id: record.family_id,
                    expires_at: now + chrono::Duration::seconds(self.signer.refresh_ttl_secs()),
                    revoked: false,
                    created_at: now,
                },
            )
            .await
            .map_err(store_err)?;

        if !won {
            // A concurrent rotation consumed the token between our read and
            // the conditional revoke. Same signal as a replay.
            return self.handle_replay(&record).await;
        }

        let access_token = self
            .signer
            .sign_access(user.id, &user.email, record.tenant_id)
            .map_err(AuthError::internal)?;

        Ok(TokenPair {
            access_token,
            refresh_token: new_refresh,
            expires_in: self.signer.access_ttl_secs(),
        })
    }

    async fn handle_replay(&self, record: &RefreshTokenRecord) -> AuthResult<TokenPair> {
        // Revoke the family before answering; the caller never gets a token
        // out of a replayed credential, and neither does whoever holds the
        // legitimately rotated one.
        let revoked = self.revoke_family_logged(record.family_id).await?;
        tracing::warn!(
            user_id = %record.user_id,
            family_id = %record.family_id,
            revoked,
            "refresh token reuse detected; family revoked"
        );
        Err(AuthError::unauthorized("refresh token reuse detected"))
    }

    async fn revoke_family_logged(&self, family_id: TokenFamilyId) -> AuthResult<u64> {
        self.refresh_tokens
            .revoke_family(family_id)
            .await
            .map_err(store_err)
    }

    /// End one session. Best effort on both inputs: an absent or undecodable
    /// access token skips the blacklist step, an absent refresh token skips
    /// the revoke, and neither omission fails the call.
    pub async fn logout(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> AuthResult<()> {
        if let Some(access_token) = access_token {
            // Expired tokens still decode; there is just nothing left to
            // blacklist for them.
            match self.signer.decode_access_allow_expired(access_token) {
                Ok(claims) => {
                    let remaining = claims.remaining_secs(Utc::now().timestamp());
                    if remaining > 0 {
                        if let Err(e) = self
                            .cache
                            .set(
                                &blacklist_key(access_token),
                                "1",
                                Duration::from_secs(remaining),
                            )
                            .await
                        {
                            // Advisory: the token still dies at its natural
                            // expiry.
                            tracing::warn!(
                                user_id = %claims.sub,
                                "failed to blacklist access token: {e}"
                            );
                        }
                    }
                    tracing::info!(user_id = %claims.sub, "logout");
                }
                Err(_) => {
                    tracing::warn!("undecodable access token at logout, nothing to blacklist");
                }
            }
        }

        if let Some(refresh_token) = refresh_token {
            self.refresh_tokens
                .revoke(refresh_token)
                .await
                .map_err(store_err)?;
        }

        Ok(())
    }

    /// Terminate every session a user holds, across all families and devices.
    /// Returns the number of refresh tokens revoked.
    pub async fn force_logout(&self, user_id: UserId) -> AuthResult<u64> {
        let revoked = self
            .refresh_tokens
            .revoke_all_for_user(user_id)
            .await
            .map_err(store_err)?;

        self.permissions.invalidate_user(user_id).await;

        tracing::info!(user_id = %user_id, revoked, "force logout");
        Ok(revoked)
    }
}

/// Cache-first permission resolution.
pub struct PermissionService {
    rbac_store: Arc<dyn RbacStore>,
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl PermissionService {
    fn cache_key(user_id: UserId, tenant_id: TenantId) -> String {
        format!("perms:{user_id}:{tenant_id}")
    }

    fn user_prefix(user_id: UserId) -> String {
        format!("perms:{user_id}:")
    }

    /// Resolve the permission set a user holds within a tenant.
    ///
    /// Cache errors and undecodable entries degrade to a miss: the store is
    /// always able to answer, the cache only saves the walk.
    pub async fn resolve(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
    ) -> AuthResult<PermissionSet> {
        let key = Self::cache_key(user_id, tenant_id);

        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(actions) => return Ok(actions.into_iter().collect()),
                Err(e) => {
                    tracing::warn!(%key, "undecodable cached permission set, refetching: {e}");
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(%key, "permission cache read failed, treating as miss: {e}");
            }
        }

        let actions = self
            .rbac_store
            .permissions_for_user(user_id, tenant_id)
            .await
            .map_err(store_err)?;

        match serde_json::to_string(&actions) {
            Ok(serialized) => {
                if let Err(e) = self.cache.set(&key, &serialized, self.ttl).await {
                    tracing::warn!(%key, "permission cache write failed: {e}");
                }
            }
            Err(e) => {
                tracing::warn!(%key, "failed to serialize permission set: {e}");
            }
        }

        Ok(actions.into_iter().collect())
    }

    /// Drop every cached permission set for one user, across all tenants.
    pub async fn invalidate_user(&self, user_id: UserId) {
        if let Err(e) = self.cache.delete_prefix(&Self::user_prefix(user_id)).await {
            tracing::warn!(%user_id, "permission cache invalidation failed: {e}");
        }
    }

    /// Drop every cached permission set. Used after role-level mutations,
    /// where the affected membership is not known cheaply.
    pub async fn invalidate_all(&self) {
        if let Err(e) = self.cache.delete_prefix("perms:").await {
            tracing::warn!("permission cache invalidation failed: {e}");
        }
    }
}

/// Role and permission administration, tenant-scoped.
///
/// Every mutation that can change an effective permission set ends with a
/// cache invalidation, so grants and revocations take effect within one
/// request rather than one cache TTL.
pub struct RbacService {
    rbac_store: Arc<dyn RbacStore>,
    directory: Arc<dyn DirectoryStore>,
    permissions: Arc<PermissionService>,
}

impl RbacService {
    pub async fn create_role(&self, tenant_id: TenantId, name: &str) -> AuthResult<RoleRecord> {
        if name.trim().is_empty() {
            return Err(AuthError::validation("role name must not be empty"));
        }

        let role = RoleRecord {
            id: RoleId::new(),
            name: name.to_string(),
            scope: RoleScope::Tenant(tenant_id),
            active: true,
            system: false,
        };

        self.rbac_store
            .insert_role(role.clone())
            .await
            .map_err(store_err)?;

        Ok(role)
    }

    pub async fn rename_role(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        name: &str,
    ) -> AuthResult<()> {
        if name.trim().is_empty() {
            return Err(AuthError::validation("role name must not be empty"));
        }

        let role = self.mutable_role(tenant_id, role_id).await?;
        self.rbac_store
            .rename_role(role.id, name)
            .await
            .map_err(store_err)?;

        self.permissions.invalidate_all().await;
        Ok(())
    }

    pub async fn delete_role(&self, tenant_id: TenantId, role_id: RoleId) -> AuthResult<()> {
        let role = self.mutable_role(tenant_id, role_id).await?;
        self.rbac_store
            .delete_role(role.id)
            .await
            .map_err(store_err)?;

        // Members of the deleted role are not known here; flush broadly.
        self.permissions.invalidate_all().await;
        Ok(())
    }

    pub async fn create_permission(
        &self,
        action: &str,
        resource: &str,
    ) -> AuthResult<PermissionRecord> {
        if action.trim().is_empty() {
            return Err(AuthError::validation("permission action must not be empty"));
        }

        let permission = PermissionRecord {
            id: PermissionId::new(),
            action: action.to_string(),
            resource: resource.to_string(),
            active: true,
        };

        self.rbac_store
            .insert_permission(permission.clone())
            .await
            .map_err(store_err)?;

        Ok(permission)
    }

    pub async fn set_role_permissions(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> AuthResult<()> {
        let role = self.mutable_role(tenant_id, role_id).await?;
        self.rbac_store
            .set_role_permissions(role.id, permission_ids)
            .await
            .map_err(store_err)?;

        self.permissions.invalidate_all().await;
        Ok(())
    }

    pub async fn set_user_roles(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_ids: &[RoleId],
    ) -> AuthResult<()> {
        let user = self
            .directory
            .find_user_by_id(user_id)
            .await
            .map_err(store_err)?
            .filter(|u| u.tenant_id == tenant_id)
            .ok_or_else(|| AuthError::not_found("user not found"))?;

        for role_id in role_ids {
            let role = self
                .rbac_store
                .find_role(*role_id)
                .await
                .map_err(store_err)?
                .ok_or_else(|| AuthError::not_found("role not found"))?;

            if !role.scope.visible_to(tenant_id) {
                return Err(AuthError::validation(
                    "role belongs to a different organization",
                ));
            }
        }

        self.rbac_store
            .set_user_roles(user.id, tenant_id, role_ids)
            .await
            .map_err(store_err)?;

        self.permissions.invalidate_user(user.id).await;
        Ok(())
    }

    /// Soft-deactivate a user. The row survives for audit and email
    /// uniqueness; refresh rotation rejects deactivated accounts, so the
    /// session dies at the next rotation even before tokens expire.
    pub async fn deactivate_user(&self, tenant_id: TenantId, user_id: UserId) -> AuthResult<()> {
        self.ensure_member(tenant_id, user_id).await?;

        self.directory
            .deactivate_user(user_id)
            .await
            .map_err(store_err)?;

        self.permissions.invalidate_user(user_id).await;
        tracing::info!(%user_id, "user deactivated");
        Ok(())
    }

    /// Check that a user exists and belongs to the tenant.
    pub async fn ensure_member(&self, tenant_id: TenantId, user_id: UserId) -> AuthResult<()> {
        self.directory
            .find_user_by_id(user_id)
            .await
            .map_err(store_err)?
            .filter(|u| u.tenant_id == tenant_id)
            .ok_or_else(|| AuthError::not_found("user not found"))?;
        Ok(())
    }

    /// Flattened permission actions for a user, cache-first.
    pub async fn user_permissions(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> AuthResult<PermissionSet> {
        self.ensure_member(tenant_id, user_id).await?;
        self.permissions.resolve(user_id, tenant_id).await
    }

    /// Load a role and check the tenant may mutate it. System roles are
    /// immutable, global roles belong to no tenant.
    async fn mutable_role(&self, tenant_id: TenantId, role_id: RoleId) -> AuthResult<RoleRecord> {
        let role = self
            .rbac_store
            .find_role(role_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| AuthError::not_found("role not found"))?;

        if role.system {
            return Err(AuthError::forbidden("system roles cannot be modified"));
        }
        match role.scope {
            RoleScope::Global => {
                return Err(AuthError::forbidden(
                    "global roles cannot be modified by an organization",
                ));
            }
            // Another tenant's role reads as absent, not as forbidden.
            RoleScope::Tenant(owner) if owner != tenant_id => {
                return Err(AuthError::not_found("role not found"));
            }
            RoleScope::Tenant(_) => {}
        }

        Ok(role)
    }
}
