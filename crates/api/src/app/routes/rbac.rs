//! Role/permission administration routes.
//!
//! Every handler checks a permission before touching the store; the
//! middleware has already resolved the caller's permission set for the
//! token's tenant.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use uuid::Uuid;

use warden_auth::Permission;
use warden_core::{RoleId, UserId};

use crate::app::dto::{
    CreatePermissionRequest, CreateRoleRequest, PermissionResponse, RenameRoleRequest,
    RoleResponse, SetRolePermissionsRequest, SetUserRolesRequest,
};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/roles", post(create_role))
        .route("/roles/:id", patch(rename_role))
        .route("/roles/:id", delete(delete_role))
        .route("/roles/:id/permissions", put(set_role_permissions))
        .route("/permissions", post(create_permission))
        .route("/users/:id/roles", put(set_user_roles))
        .route("/users/:id/permissions", get(user_permissions))
        .route("/users/:id/force-logout", post(force_logout))
        .route("/users/:id/deactivate", post(deactivate_user))
}

async fn create_role(
    Extension(services): Extension<AppServices>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CreateRoleRequest>,
) -> axum::response::Response {
    if let Err(e) = authz::require(&tenant, &principal, &[Permission::new("ROLE_CREATE")]) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.rbac.create_role(tenant.tenant_id(), &body.name).await {
        Ok(role) => (StatusCode::CREATED, Json(RoleResponse::from(role))).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

async fn rename_role(
    Extension(services): Extension<AppServices>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<Uuid>,
    Json(body): Json<RenameRoleRequest>,
) -> axum::response::Response {
    if let Err(e) = authz::require(&tenant, &principal, &[Permission::new("ROLE_UPDATE")]) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services
        .rbac
        .rename_role(tenant.tenant_id(), RoleId::from_uuid(id), &body.name)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

async fn delete_role(
    Extension(services): Extension<AppServices>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<Uuid>,
) -> axum::response::Response {
    if let Err(e) = authz::require(&tenant, &principal, &[Permission::new("ROLE_DELETE")]) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services
        .rbac
        .delete_role(tenant.tenant_id(), RoleId::from_uuid(id))
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

async fn set_role_permissions(
    Extension(services): Extension<AppServices>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<Uuid>,
    Json(body): Json<SetRolePermissionsRequest>,
) -> axum::response::Response {
    if let Err(e) = authz::require(&tenant, &principal, &[Permission::new("ROLE_UPDATE")]) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services
        .rbac
        .set_role_permissions(tenant.tenant_id(), RoleId::from_uuid(id), &body.permission_ids)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

async fn create_permission(
    Extension(services): Extension<AppServices>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CreatePermissionRequest>,
) -> axum::response::Response {
    if let Err(e) = authz::require(&tenant, &principal, &[Permission::new("PERMISSION_CREATE")]) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services
        .rbac
        .create_permission(&body.action, &body.resource)
        .await
    {
        Ok(permission) => {
            (StatusCode::CREATED, Json(PermissionResponse::from(permission))).into_response()
        }
        Err(e) => errors::auth_error_to_response(e),
    }
}

async fn set_user_roles(
    Extension(services): Extension<AppServices>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<Uuid>,
    Json(body): Json<SetUserRolesRequest>,
) -> axum::response::Response {
    if let Err(e) = authz::require(&tenant, &principal, &[Permission::new("USER_UPDATE")]) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services
        .rbac
        .set_user_roles(tenant.tenant_id(), UserId::from_uuid(id), &body.role_ids)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

async fn user_permissions(
    Extension(services): Extension<AppServices>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<Uuid>,
) -> axum::response::Response {
    if let Err(e) = authz::require(&tenant, &principal, &[Permission::new("USER_READ")]) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services
        .rbac
        .user_permissions(tenant.tenant_id(), UserId::from_uuid(id))
        .await
    {
        Ok(permissions) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "user_id": id,
                "permissions": permissions,
            })),
        )
            .into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// Terminate every session a user holds. Requires an admin permission; users
/// end their own sessions through `/auth/logout`.
async fn force_logout(
    Extension(services): Extension<AppServices>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<Uuid>,
) -> axum::response::Response {
    if let Err(e) = authz::require(&tenant, &principal, &[Permission::new("USER_UPDATE")]) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let user_id = UserId::from_uuid(id);

    // Tenant check first: an admin of one org cannot end sessions in another.
    if let Err(e) = services.rbac.ensure_member(tenant.tenant_id(), user_id).await {
        return errors::auth_error_to_response(e);
    }

    match services.auth.force_logout(user_id).await {
        Ok(revoked) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "user_id": id,
                "sessions_revoked": revoked,
            })),
        )
            .into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// Soft-deactivate a user and end their sessions.
async fn deactivate_user(
    Extension(services): Extension<AppServices>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<Uuid>,
) -> axum::response::Response {
    if let Err(e) = authz::require(&tenant, &principal, &[Permission::new("USER_UPDATE")]) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let user_id = UserId::from_uuid(id);

    if let Err(e) = services.rbac.deactivate_user(tenant.tenant_id(), user_id).await {
        return errors::auth_error_to_response(e);
    }

    match services.auth.force_logout(user_id).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}
