//! Environment-driven runtime configuration.

use std::time::Duration;

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HS256 secret for access tokens.
    pub access_secret: String,
    /// HS256 secret for refresh tokens. Distinct from `access_secret` so a
    /// leak of one cannot forge the other kind.
    pub refresh_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub permission_cache_ttl: Duration,
    pub bind_addr: String,
    /// Switch to Postgres + Redis (requires the `redis` feature).
    pub use_persistent_stores: bool,
}

impl AppConfig {
    /// Read configuration from the environment, with development defaults.
    pub fn from_env() -> Self {
        let access_secret = std::env::var("JWT_ACCESS_SECRET").unwrap_or_else(|_| {
            tracing::warn!("JWT_ACCESS_SECRET not set; using insecure dev default");
            "dev-access-secret".to_string()
        });
        let refresh_secret = std::env::var("JWT_REFRESH_SECRET").unwrap_or_else(|_| {
            tracing::warn!("JWT_REFRESH_SECRET not set; using insecure dev default");
            "dev-refresh-secret".to_string()
        });

        Self {
            access_secret,
            refresh_secret,
            access_ttl_secs: env_i64("ACCESS_TOKEN_TTL_SECS", 900),
            refresh_ttl_secs: env_i64("REFRESH_TOKEN_TTL_SECS", 604_800),
            permission_cache_ttl: Duration::from_secs(
                env_i64("PERMISSION_CACHE_TTL_SECS", 300).max(1) as u64,
            ),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            use_persistent_stores: std::env::var("USE_PERSISTENT_STORES")
                .unwrap_or_else(|_| "false".to_string())
                .parse::<bool>()
                .unwrap_or(false),
        }
    }

    /// Configuration for tests: fixed secrets, in-memory stores.
    pub fn for_tests(access_secret: &str, refresh_secret: &str) -> Self {
        Self {
            access_secret: access_secret.to_string(),
            refresh_secret: refresh_secret.to_string(),
            access_ttl_secs: 900,
            refresh_ttl_secs: 604_800,
            permission_cache_ttl: Duration::from_secs(300),
            bind_addr: "127.0.0.1:0".to_string(),
            use_persistent_stores: false,
        }
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}
