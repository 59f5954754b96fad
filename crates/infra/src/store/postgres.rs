//! Postgres-backed store.
//!
//! ## Error mapping
//!
//! SQLx errors are mapped to `StoreError` as follows: unique violations
//! (PostgreSQL code `23505`) become `Conflict`; everything else — foreign-key
//! violations, pool closure, network failures — becomes `Backend` and is
//! surfaced generically at the service boundary.
//!
//! ## Atomicity
//!
//! Rotation (`rotate`), family revocation (`revoke_family`), and junction
//! reassignment (`set_role_permissions`, `set_user_roles`) each run inside a
//! single transaction. The rotation's revoke is conditional
//! (`revoked = FALSE`), so of two concurrent rotations with the same token
//! exactly one commits the insert and the other observes `Ok(false)`.
//!
//! ## Expected schema
//!
//! - `organizations (id uuid PK, slug text UNIQUE, name text, active bool)`
//! - `users (id uuid PK, tenant_id uuid, email text, password_hash text,
//!   first_name text, last_name text, active bool, last_login_at timestamptz,
//!   UNIQUE (tenant_id, email))`
//! - `roles (id uuid PK, name text, tenant_id uuid NULL, active bool,
//!   system bool, UNIQUE NULLS NOT DISTINCT (tenant_id, name))` - NULL tenant
//!   means global; `NULLS NOT DISTINCT` makes global role names unique too,
//!   matching the in-memory store's conflict behavior
//! - `permissions (id uuid PK, action text UNIQUE, resource text, active bool)`
//! - `role_permissions (role_id uuid, permission_id uuid, PK (role_id, permission_id))`
//! - `user_roles (user_id uuid, role_id uuid, tenant_id uuid,
//!   PK (user_id, role_id, tenant_id))`
//! - `refresh_tokens (token text PK, user_id uuid, tenant_id uuid,
//!   family_id uuid, expires_at timestamptz, revoked bool, created_at timestamptz)`

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use warden_auth::RoleScope;
use warden_core::{PermissionId, RoleId, TenantId, TokenFamilyId, UserId};

use super::{
    DirectoryStore, NewUser, OrganizationRecord, PermissionRecord, RbacStore,
    RefreshTokenRecord, RefreshTokenStore, RoleRecord, StoreError, UserRecord,
};

/// Postgres store over a shared connection pool.
///
/// `Send + Sync`; clones share the pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

#[async_trait]
impl DirectoryStore for PostgresStore {
    #[instrument(skip(self), fields(org_id = %org.id), err)]
    async fn insert_org(&self, org: OrganizationRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO organizations (id, slug, name, active)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(org.id.as_uuid())
        .bind(&org.slug)
        .bind(&org.name)
        .bind(org.active)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_org", e))?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn find_org_by_slug(&self, slug: &str) -> Result<Option<OrganizationRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT id, slug, name, active FROM organizations WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_org_by_slug", e))?;

        row.map(|r| {
            OrganizationRow::from_row(&r)
                .map(Into::into)
                .map_err(|e| StoreError::Backend(format!("failed to read organization row: {e}")))
        })
        .transpose()
    }

    #[instrument(skip(self, email), fields(tenant_id = %tenant_id), err)]
    async fn find_user_by_email(
        &self,
        tenant_id: TenantId,
        email: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, email, password_hash, first_name, last_name, active, last_login_at
            FROM users
            WHERE tenant_id = $1 AND email = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(email)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user_by_email", e))?;

        row.map(|r| {
            UserRow::from_row(&r)
                .map(Into::into)
                .map_err(|e| StoreError::Backend(format!("failed to read user row: {e}")))
        })
        .transpose()
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn find_user_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, email, password_hash, first_name, last_name, active, last_login_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user_by_id", e))?;

        row.map(|r| {
            UserRow::from_row(&r)
                .map(Into::into)
                .map_err(|e| StoreError::Backend(format!("failed to read user row: {e}")))
        })
        .transpose()
    }

    #[instrument(skip(self, user), fields(tenant_id = %user.tenant_id), err)]
    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let id = UserId::new();

        sqlx::query(
            r#"
            INSERT INTO users (id, tenant_id, email, password_hash, first_name, last_name, active)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE)
            "#,
        )
        .bind(id.as_uuid())
        .bind(user.tenant_id.as_uuid())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;

        Ok(UserRecord {
            id,
            tenant_id: user.tenant_id,
            email: user.email,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            active: true,
            last_login_at: None,
        })
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login_at = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("record_login", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn deactivate_user(&self, id: UserId) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET active = FALSE WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("deactivate_user", e))?;

        Ok(())
    }
}

#[async_trait]
impl RbacStore for PostgresStore {
    #[instrument(skip(self, role), fields(role_id = %role.id), err)]
    async fn insert_role(&self, role: RoleRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO roles (id, name, tenant_id, active, system)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(&role.name)
        .bind(role.scope.tenant_id().map(|t| *t.as_uuid()))
        .bind(role.active)
        .bind(role.system)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_role", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn find_role(&self, id: RoleId) -> Result<Option<RoleRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, tenant_id, active, system FROM roles WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_role", e))?;

        row.map(|r| {
            RoleRow::from_row(&r)
                .map(Into::into)
                .map_err(|e| StoreError::Backend(format!("failed to read role row: {e}")))
        })
        .transpose()
    }

    #[instrument(skip(self, name), fields(role_id = %id), err)]
    async fn rename_role(&self, id: RoleId, name: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE roles SET name = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(name)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("rename_role", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn delete_role(&self, id: RoleId) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_role_permissions", e))?;

        sqlx::query("DELETE FROM user_roles WHERE role_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_user_roles", e))?;

        sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self, permission), fields(permission_id = %permission.id), err)]
    async fn insert_permission(&self, permission: PermissionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO permissions (id, action, resource, active)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(permission.id.as_uuid())
        .bind(&permission.action)
        .bind(&permission.resource)
        .bind(permission.active)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_permission", e))?;

        Ok(())
    }

    #[instrument(skip(self, permission_ids), fields(role_id = %role_id, count = permission_ids.len()), err)]
    async fn set_role_permissions(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> Result<(), StoreError> {
        // Delete-all + insert-new in one transaction; no intermediate empty
        // state is ever visible to a concurrent reader.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("clear_role_permissions", e))?;

        for permission_id in permission_ids {
            sqlx::query(
                "INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2)",
            )
            .bind(role_id.as_uuid())
            .bind(permission_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_role_permission", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self, role_ids), fields(user_id = %user_id, tenant_id = %tenant_id, count = role_ids.len()), err)]
    async fn set_user_roles(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
        role_ids: &[RoleId],
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND tenant_id = $2")
            .bind(user_id.as_uuid())
            .bind(tenant_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("clear_user_roles", e))?;

        for role_id in role_ids {
            sqlx::query(
                "INSERT INTO user_roles (user_id, role_id, tenant_id) VALUES ($1, $2, $3)",
            )
            .bind(user_id.as_uuid())
            .bind(role_id.as_uuid())
            .bind(tenant_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_user_role", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), fields(user_id = %user_id, tenant_id = %tenant_id), err)]
    async fn permissions_for_user(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
    ) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT p.action
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id AND r.active = TRUE
            JOIN role_permissions rp ON rp.role_id = r.id
            JOIN permissions p ON p.id = rp.permission_id AND p.active = TRUE
            WHERE ur.user_id = $1
              AND ur.tenant_id = $2
              AND (r.tenant_id IS NULL OR r.tenant_id = $2)
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("permissions_for_user", e))?;

        rows.iter()
            .map(|r| {
                r.try_get::<String, _>("action")
                    .map_err(|e| StoreError::Backend(format!("failed to read action: {e}")))
            })
            .collect()
    }
}

#[async_trait]
impl RefreshTokenStore for PostgresStore {
    #[instrument(skip(self, record), fields(user_id = %record.user_id, family_id = %record.family_id), err)]
    async fn insert(&self, record: RefreshTokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token, user_id, tenant_id, family_id, expires_at, revoked, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&record.token)
        .bind(record.user_id.as_uuid())
        .bind(record.tenant_id.as_uuid())
        .bind(record.family_id.as_uuid())
        .bind(record.expires_at)
        .bind(record.revoked)
        .bind(record.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_refresh_token", e))?;

        Ok(())
    }

    #[instrument(skip_all, err)]
    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT token, user_id, tenant_id, family_id, expires_at, revoked, created_at
            FROM refresh_tokens
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_refresh_token", e))?;

        row.map(|r| {
            RefreshTokenRow::from_row(&r)
                .map(Into::into)
                .map_err(|e| StoreError::Backend(format!("failed to read refresh token row: {e}")))
        })
        .transpose()
    }

    #[instrument(skip_all, fields(family_id = %new_record.family_id), err)]
    async fn rotate(
        &self,
        old_token: &str,
        new_record: RefreshTokenRecord,
    ) -> Result<bool, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let revoked = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE WHERE token = $1 AND revoked = FALSE",
        )
        .bind(old_token)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("revoke_old_token", e))?;

        if revoked.rows_affected() == 0 {
            // Lost the rotation race (or the token was replayed). Nothing to
            // insert; the caller decides how to respond.
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token, user_id, tenant_id, family_id, expires_at, revoked, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&new_record.token)
        .bind(new_record.user_id.as_uuid())
        .bind(new_record.tenant_id.as_uuid())
        .bind(new_record.family_id.as_uuid())
        .bind(new_record.expires_at)
        .bind(new_record.revoked)
        .bind(new_record.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_rotated_token", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(true)
    }

    #[instrument(skip_all, err)]
    async fn revoke(&self, token: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE token = $1")
            .bind(token)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("revoke_refresh_token", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(family_id = %family_id), err)]
    async fn revoke_family(&self, family_id: TokenFamilyId) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE family_id = $1")
            .bind(family_id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("revoke_family", e))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn revoke_all_for_user(&self, user_id: UserId) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1 AND revoked = FALSE",
        )
        .bind(user_id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("revoke_all_for_user", e))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(family_id = %family_id), err)]
    async fn active_count_in_family(&self, family_id: TokenFamilyId) -> Result<u64, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS active FROM refresh_tokens WHERE family_id = $1 AND revoked = FALSE",
        )
        .bind(family_id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("active_count_in_family", e))?;

        let count: i64 = row
            .try_get("active")
            .map_err(|e| StoreError::Backend(format!("failed to read count: {e}")))?;

        Ok(count as u64)
    }
}

// SQLx row types

#[derive(Debug)]
struct OrganizationRow {
    id: uuid::Uuid,
    slug: String,
    name: String,
    active: bool,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for OrganizationRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            slug: row.try_get("slug")?,
            name: row.try_get("name")?,
            active: row.try_get("active")?,
        })
    }
}

impl From<OrganizationRow> for OrganizationRecord {
    fn from(row: OrganizationRow) -> Self {
        Self {
            id: TenantId::from_uuid(row.id),
            slug: row.slug,
            name: row.name,
            active: row.active,
        }
    }
}

#[derive(Debug)]
struct UserRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    active: bool,
    last_login_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for UserRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            active: row.try_get("active")?,
            last_login_at: row.try_get("last_login_at")?,
        })
    }
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            email: row.email,
            password_hash: row.password_hash,
            first_name: row.first_name,
            last_name: row.last_name,
            active: row.active,
            last_login_at: row.last_login_at,
        }
    }
}

#[derive(Debug)]
struct RoleRow {
    id: uuid::Uuid,
    name: String,
    tenant_id: Option<uuid::Uuid>,
    active: bool,
    system: bool,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for RoleRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            tenant_id: row.try_get("tenant_id")?,
            active: row.try_get("active")?,
            system: row.try_get("system")?,
        })
    }
}

impl From<RoleRow> for RoleRecord {
    fn from(row: RoleRow) -> Self {
        Self {
            id: RoleId::from_uuid(row.id),
            name: row.name,
            scope: RoleScope::from_optional_tenant(row.tenant_id.map(TenantId::from_uuid)),
            active: row.active,
            system: row.system,
        }
    }
}

#[derive(Debug)]
struct RefreshTokenRow {
    token: String,
    user_id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    family_id: uuid::Uuid,
    expires_at: DateTime<Utc>,
    revoked: bool,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for RefreshTokenRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            token: row.try_get("token")?,
            user_id: row.try_get("user_id")?,
            tenant_id: row.try_get("tenant_id")?,
            family_id: row.try_get("family_id")?,
            expires_at: row.try_get("expires_at")?,
            revoked: row.try_get("revoked")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<RefreshTokenRow> for RefreshTokenRecord {
    fn from(row: RefreshTokenRow) -> Self {
        Self {
            token: row.token,
            user_id: UserId::from_uuid(row.user_id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            family_id: TokenFamilyId::from_uuid(row.family_id),
            expires_at: row.expires_at,
            revoked: row.revoked,
            created_at: row.created_at,
        }
    }
}
