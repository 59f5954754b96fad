//! Request/response DTOs shared by the route handlers.

use serde::{Deserialize, Serialize};

use warden_core::{PermissionId, RoleId, TenantId, UserId};
use warden_infra::{OrganizationRecord, PermissionRecord, RoleRecord, UserRecord};

use crate::app::services::TokenPair;

#[derive(Debug, Deserialize)]
pub struct CreateOrganizationRequest {
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct OrganizationResponse {
    pub id: TenantId,
    pub slug: String,
    pub name: String,
}

impl From<OrganizationRecord> for OrganizationResponse {
    fn from(org: OrganizationRecord) -> Self {
        Self {
            id: org.id,
            slug: org.slug,
            name: org.name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub organization: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub organization_id: TenantId,
}

impl From<UserRecord> for UserResponse {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            organization_id: user.tenant_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub organization: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

impl From<TokenPair> for TokenPairResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer",
            expires_in: pair.expires_in,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameRoleRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub id: RoleId,
    pub name: String,
    pub system: bool,
}

impl From<RoleRecord> for RoleResponse {
    fn from(role: RoleRecord) -> Self {
        Self {
            id: role.id,
            name: role.name,
            system: role.system,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePermissionRequest {
    pub action: String,
    pub resource: String,
}

#[derive(Debug, Serialize)]
pub struct PermissionResponse {
    pub id: PermissionId,
    pub action: String,
    pub resource: String,
}

impl From<PermissionRecord> for PermissionResponse {
    fn from(permission: PermissionRecord) -> Self {
        Self {
            id: permission.id,
            action: permission.action,
            resource: permission.resource,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SetRolePermissionsRequest {
    pub permission_ids: Vec<PermissionId>,
}

#[derive(Debug, Deserialize)]
pub struct SetUserRolesRequest {
    pub role_ids: Vec<RoleId>,
}
