use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use warden_core::AuthError;

use crate::app::services::AuthService;
use crate::context::{AccessTokenContext, PrincipalContext, TenantContext};

#[derive(Clone)]
pub struct AuthState {
    pub auth: Arc<AuthService>,
}

/// Authenticate a request and attach tenant + principal contexts.
///
/// Identity and tenant come only from the verified claims; nothing
/// caller-controlled reaches the contexts.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer(req.headers())?.to_string();

    let (claims, permissions) = state.auth.authenticate(&token).await.map_err(|e| match e {
        AuthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    })?;

    req.extensions_mut().insert(TenantContext::new(claims.org));
    req.extensions_mut().insert(PrincipalContext::new(
        claims.sub,
        claims.email.clone(),
        permissions,
    ));
    req.extensions_mut().insert(AccessTokenContext(token));

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}
