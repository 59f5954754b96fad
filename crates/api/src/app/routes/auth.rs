//! Session lifecycle routes: signup, login, rotation, logout.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::app::dto::{
    CreateOrganizationRequest, LoginRequest, LogoutRequest, OrganizationResponse,
    RefreshRequest, RegisterRequest, TokenPairResponse, UserResponse,
};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::AccessTokenContext;

pub async fn create_organization(
    Extension(services): Extension<AppServices>,
    Json(body): Json<CreateOrganizationRequest>,
) -> axum::response::Response {
    match services.auth.create_organization(&body.slug, &body.name).await {
        Ok(org) => (StatusCode::CREATED, Json(OrganizationResponse::from(org))).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

pub async fn register(
    Extension(services): Extension<AppServices>,
    Json(body): Json<RegisterRequest>,
) -> axum::response::Response {
    let result = services
        .auth
        .register(
            &body.organization,
            &body.email,
            &body.password,
            &body.first_name,
            &body.last_name,
        )
        .await;

    match result {
        Ok(user) => (StatusCode::CREATED, Json(UserResponse::from(user))).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

pub async fn login(
    Extension(services): Extension<AppServices>,
    Json(body): Json<LoginRequest>,
) -> axum::response::Response {
    match services
        .auth
        .login(&body.organization, &body.email, &body.password)
        .await
    {
        Ok(pair) => (StatusCode::OK, Json(TokenPairResponse::from(pair))).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

pub async fn refresh(
    Extension(services): Extension<AppServices>,
    Json(body): Json<RefreshRequest>,
) -> axum::response::Response {
    match services.auth.refresh(&body.refresh_token).await {
        Ok(pair) => (StatusCode::OK, Json(TokenPairResponse::from(pair))).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

pub async fn logout(
    Extension(services): Extension<AppServices>,
    Extension(access_token): Extension<AccessTokenContext>,
    Json(body): Json<LogoutRequest>,
) -> axum::response::Response {
    match services
        .auth
        .logout(Some(&access_token.0), body.refresh_token.as_deref())
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}
