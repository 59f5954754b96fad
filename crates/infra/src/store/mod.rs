//! Relational store: entity records and the async traits the core consumes.
//!
//! The store is the single source of truth. Implementations must provide
//! transactional atomicity for refresh-token rotation, family-wide
//! revocation, and role/permission reassignment.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use warden_auth::RoleScope;
use warden_core::{PermissionId, RoleId, TenantId, TokenFamilyId, UserId};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;

/// Tenant: the isolation boundary for user and role data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationRecord {
    pub id: TenantId,
    /// Unique, human-readable handle used at login.
    pub slug: String,
    pub name: String,
    pub active: bool,
}

/// A user account, scoped to exactly one organization.
///
/// Unique on (tenant_id, email). Never physically deleted; `active = false`
/// is the terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Insertion payload for registration.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub tenant_id: TenantId,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
}

/// A named permission bundle.
///
/// `system` roles are immutable and undeletable; `scope` distinguishes
/// global (shared, tenant-uneditable) from tenant-owned roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRecord {
    pub id: RoleId,
    pub name: String,
    pub scope: RoleScope,
    pub active: bool,
    pub system: bool,
}

/// A global atomic capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRecord {
    pub id: PermissionId,
    /// Unique action string, e.g. "USER_READ".
    pub action: String,
    pub resource: String,
    pub active: bool,
}

/// One outstanding session-renewal credential.
///
/// Rows are marked revoked, never deleted, so replayed token values remain
/// observable as tripwires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    /// The signed token string itself; exact-match lookup key.
    pub token: String,
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub family_id: TokenFamilyId,
    /// Stored expiry, checked independently of the signature's own claim.
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique-constraint style violation (duplicate email in tenant,
    /// duplicate role name in scope, duplicate permission action).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Anything else the backend failed with. Mapped to a generic internal
    /// error at the service boundary.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Organization and user lookups/mutations.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn insert_org(&self, org: OrganizationRecord) -> Result<(), StoreError>;

    async fn find_org_by_slug(&self, slug: &str) -> Result<Option<OrganizationRecord>, StoreError>;

    async fn find_user_by_email(
        &self,
        tenant_id: TenantId,
        email: &str,
    ) -> Result<Option<UserRecord>, StoreError>;

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError>;

    /// Fails with `Conflict` when the email already exists within the tenant.
    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, StoreError>;

    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Soft-deactivation; the row stays for audit and uniqueness.
    async fn deactivate_user(&self, id: UserId) -> Result<(), StoreError>;
}

/// Roles, permissions, and the junctions between them.
#[async_trait]
pub trait RbacStore: Send + Sync {
    async fn insert_role(&self, role: RoleRecord) -> Result<(), StoreError>;

    async fn find_role(&self, id: RoleId) -> Result<Option<RoleRecord>, StoreError>;

    async fn rename_role(&self, id: RoleId, name: &str) -> Result<(), StoreError>;

    async fn delete_role(&self, id: RoleId) -> Result<(), StoreError>;

    async fn insert_permission(&self, permission: PermissionRecord) -> Result<(), StoreError>;

    /// Replace a role's permission assignments in a single transaction; a
    /// concurrent reader never observes the intermediate empty state.
    async fn set_role_permissions(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> Result<(), StoreError>;

    /// Replace a user's role assignments within one tenant, transactionally.
    async fn set_user_roles(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
        role_ids: &[RoleId],
    ) -> Result<(), StoreError>;

    /// Flatten UserRole → Role → RolePermission → Permission into the set of
    /// active permission actions the user holds within the tenant. Inactive
    /// roles and permissions are filtered out; global roles count.
    async fn permissions_for_user(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
    ) -> Result<Vec<String>, StoreError>;
}

/// Refresh-token lifecycle. Tokens transition `active -> revoked` and never
/// back.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert(&self, record: RefreshTokenRecord) -> Result<(), StoreError>;

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Atomically revoke `old_token` and insert `new_record`, in one
    /// transactional unit. The revoke is conditional on the old row still
    /// being active: `Ok(true)` means this call won the rotation; `Ok(false)`
    /// means the row was already revoked (a concurrent rotation won, or the
    /// token was replayed) and nothing was inserted.
    async fn rotate(
        &self,
        old_token: &str,
        new_record: RefreshTokenRecord,
    ) -> Result<bool, StoreError>;

    /// Revoke one token (logout); not a family-wide event.
    async fn revoke(&self, token: &str) -> Result<(), StoreError>;

    /// Revoke every row in a family atomically. Returns rows affected.
    async fn revoke_family(&self, family_id: TokenFamilyId) -> Result<u64, StoreError>;

    /// Revoke every non-revoked row belonging to a user. Returns rows affected.
    async fn revoke_all_for_user(&self, user_id: UserId) -> Result<u64, StoreError>;

    /// Count of non-revoked rows in a family (invariant checks).
    async fn active_count_in_family(&self, family_id: TokenFamilyId) -> Result<u64, StoreError>;
}
