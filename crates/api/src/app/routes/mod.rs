use axum::{
    routing::{get, post},
    Router,
};

pub mod auth;
pub mod rbac;
pub mod system;

/// Router for unauthenticated endpoints (signup and session entry points).
pub fn public_router() -> Router {
    Router::new()
        .route("/orgs", post(auth::create_organization))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
}

/// Router for authenticated (tenant-scoped) endpoints.
pub fn protected_router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/auth/logout", post(auth::logout))
        .nest("/rbac", rbac::router())
}
