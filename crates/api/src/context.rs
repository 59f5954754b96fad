use warden_auth::PermissionSet;
use warden_core::{TenantId, UserId};

/// Tenant context for a request.
///
/// This is immutable and must be present for all protected routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Principal context for a request: the authenticated identity plus its
/// permission set as resolved for the active tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user_id: UserId,
    email: String,
    permissions: PermissionSet,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, email: String, permissions: PermissionSet) -> Self {
        Self {
            user_id,
            email,
            permissions,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }
}

/// The raw bearer token the request authenticated with.
///
/// Logout needs the exact string back to size and key its blacklist entry.
#[derive(Debug, Clone)]
pub struct AccessTokenContext(pub String);
