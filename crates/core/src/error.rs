//! Error model for the access-control core.

use thiserror::Error;
use uuid::Uuid;

/// Result type used across the access-control services.
pub type AuthResult<T> = Result<T, AuthError>;

/// Operational error raised by the core.
///
/// Every variant except `Internal` is expected, recoverable at the HTTP
/// boundary, and safe to convey to the caller. `Internal` wraps unexpected
/// storage/cache failures: the caller sees only a correlation id while the
/// full detail is logged where the error was mapped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Missing/invalid/expired credentials or tokens.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (insufficient permission, or an attempt
    /// to modify a system/global role).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Unknown organization, user, role, or permission.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate email within a tenant, duplicate role name in scope.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A value failed validation (malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unexpected infrastructure failure, surfaced generically.
    #[error("internal error (correlation id {correlation_id})")]
    Internal { correlation_id: Uuid },
}

impl AuthError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// The single generic credential failure. Identical wording for unknown
    /// user, inactive user, and wrong password, so callers cannot probe which
    /// field was wrong.
    pub fn invalid_credentials() -> Self {
        Self::Unauthorized("invalid credentials".to_string())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Wrap an unexpected failure. Logs the detail internally and returns a
    /// variant carrying only a correlation id.
    pub fn internal(detail: impl core::fmt::Display) -> Self {
        let correlation_id = Uuid::now_v7();
        tracing::error!(%correlation_id, %detail, "internal error");
        Self::Internal { correlation_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_credentials_message_is_generic() {
        assert_eq!(
            AuthError::invalid_credentials().to_string(),
            "unauthorized: invalid credentials"
        );
    }

    #[test]
    fn internal_error_hides_detail() {
        let err = AuthError::internal("connection refused to db-primary:5432");
        assert!(!err.to_string().contains("db-primary"));
    }
}
