use axum::{http::StatusCode, response::IntoResponse, Json};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    axum::extract::Extension(tenant): axum::extract::Extension<crate::context::TenantContext>,
    axum::extract::Extension(principal): axum::extract::Extension<crate::context::PrincipalContext>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "tenant_id": tenant.tenant_id().to_string(),
        "user_id": principal.user_id().to_string(),
        "email": principal.email(),
        "permissions": principal.permissions().iter().collect::<Vec<_>>(),
    }))
}
