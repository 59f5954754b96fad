use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_core::{TenantId, TokenFamilyId, UserId};

/// Claims carried by a short-lived access token.
///
/// Stateless by design: everything the authorization gate needs about *who*
/// and *which tenant* is inside the signed payload. Never persisted
/// server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject / user identifier.
    pub sub: UserId,

    /// Email of the subject (display/audit only, never used for lookup).
    pub email: String,

    /// Tenant context for the token.
    pub org: TenantId,

    /// Issued-at, seconds since epoch.
    pub iat: i64,

    /// Expiry, seconds since epoch.
    pub exp: i64,
}

/// Claims carried by a long-lived refresh token.
///
/// The matching server-side row has its own expiry and revoked flag; both the
/// signature expiry here and the stored expiry must hold for a rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: UserId,

    pub org: TenantId,

    /// Lineage shared by every token rotated from one original login.
    pub family: TokenFamilyId,

    /// Per-token nonce. Rotations within the same second would otherwise
    /// produce byte-identical tokens, and the token string is the storage key.
    pub jti: Uuid,

    pub iat: i64,

    pub exp: i64,
}

impl AccessClaims {
    /// Remaining lifetime in whole seconds at `now_epoch`, clamped at zero.
    pub fn remaining_secs(&self, now_epoch: i64) -> u64 {
        self.exp.saturating_sub(now_epoch).max(0) as u64
    }
}
