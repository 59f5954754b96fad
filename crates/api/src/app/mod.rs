//! HTTP API application wiring (Axum router + service wiring).
//!
//! Layout:
//! - `services.rs`: service construction and the services themselves
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::config::AppConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: AppConfig) -> Router {
    let app_services = if config.use_persistent_stores {
        #[cfg(feature = "redis")]
        {
            services::build_persistent_services(&config).await
        }
        #[cfg(not(feature = "redis"))]
        {
            tracing::warn!(
                "USE_PERSISTENT_STORES=true but redis feature not enabled, falling back to in-memory"
            );
            services::build_in_memory_services(&config)
        }
    } else {
        services::build_in_memory_services(&config)
    };

    build_app_with_services(app_services)
}

/// Build the router over already-constructed services. Tests use this to
/// seed state through the service layer before speaking HTTP.
pub fn build_app_with_services(app_services: services::AppServices) -> Router {
    let auth_state = middleware::AuthState {
        auth: app_services.auth.clone(),
    };

    let protected = routes::protected_router()
        .layer(Extension(app_services.clone()))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::public_router().layer(Extension(app_services)))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
