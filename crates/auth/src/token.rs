//! Compact signed token issuance and verification.
//!
//! Access and refresh tokens are HS256 JWTs signed with **distinct** secrets,
//! so a leaked refresh secret cannot forge access tokens and vice versa.
//! Expiry claims are validated on decode; storage-side checks (revocation,
//! stored expiry) are layered on top by the services.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use warden_core::{TenantId, TokenFamilyId, UserId};

use crate::claims::{AccessClaims, RefreshClaims};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("invalid token")]
    Invalid,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        }
    }
}

/// Signs and verifies access/refresh tokens.
#[derive(Clone)]
pub struct TokenSigner {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenSigner {
    pub fn new(
        access_secret: &[u8],
        refresh_secret: &[u8],
        access_ttl_secs: i64,
        refresh_ttl_secs: i64,
    ) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret),
            access_decoding: DecodingKey::from_secret(access_secret),
            refresh_encoding: EncodingKey::from_secret(refresh_secret),
            refresh_decoding: DecodingKey::from_secret(refresh_secret),
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl_secs
    }

    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl_secs
    }

    pub fn sign_access(
        &self,
        sub: UserId,
        email: &str,
        org: TenantId,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub,
            email: email.to_string(),
            org,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.access_ttl_secs)).timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding)
            .map_err(TokenError::from)
    }

    pub fn sign_refresh(
        &self,
        sub: UserId,
        org: TenantId,
        family: TokenFamilyId,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = RefreshClaims {
            sub,
            org,
            family,
            jti: uuid::Uuid::now_v7(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.refresh_ttl_secs)).timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding)
            .map_err(TokenError::from)
    }

    /// Verify signature and expiry of an access token.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = jsonwebtoken::decode::<AccessClaims>(token, &self.access_decoding, &validation)?;
        Ok(data.claims)
    }

    /// Verify signature and expiry of a refresh token. Does not consult
    /// storage; revocation and stored expiry are the services' concern.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let validation = Validation::new(Algorithm::HS256);
        let data =
            jsonwebtoken::decode::<RefreshClaims>(token, &self.refresh_decoding, &validation)?;
        Ok(data.claims)
    }

    /// Decode an access token's claims without enforcing expiry.
    ///
    /// Logout needs the expiry claim of a possibly-still-valid token to size
    /// the blacklist entry; signature is still required.
    pub fn decode_access_allow_expired(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        let data = jsonwebtoken::decode::<AccessClaims>(token, &self.access_decoding, &validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new(b"access-secret", b"refresh-secret", 900, 604_800)
    }

    #[test]
    fn access_token_round_trip() {
        let signer = signer();
        let sub = UserId::new();
        let org = TenantId::new();

        let token = signer.sign_access(sub, "alice@example.com", org).unwrap();
        let claims = signer.verify_access(&token).unwrap();

        assert_eq!(claims.sub, sub);
        assert_eq!(claims.org, org);
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn refresh_token_round_trip_keeps_family() {
        let signer = signer();
        let family = TokenFamilyId::new();

        let token = signer.sign_refresh(UserId::new(), TenantId::new(), family).unwrap();
        let claims = signer.verify_refresh(&token).unwrap();

        assert_eq!(claims.family, family);
    }

    #[test]
    fn refresh_tokens_minted_back_to_back_differ() {
        let signer = signer();
        let sub = UserId::new();
        let org = TenantId::new();
        let family = TokenFamilyId::new();

        let a = signer.sign_refresh(sub, org, family).unwrap();
        let b = signer.sign_refresh(sub, org, family).unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn secrets_are_not_interchangeable() {
        let signer = signer();
        let access = signer
            .sign_access(UserId::new(), "a@b.test", TenantId::new())
            .unwrap();

        // An access token must not verify as a refresh token.
        assert_eq!(signer.verify_refresh(&access), Err(TokenError::Invalid));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let signer = signer();
        let other = TokenSigner::new(b"other", b"other", 900, 604_800);

        let token = signer
            .sign_access(UserId::new(), "a@b.test", TenantId::new())
            .unwrap();

        assert_eq!(other.verify_access(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn expired_access_token_still_decodes_for_logout() {
        // Far enough in the past to defeat the default decode leeway.
        let signer = TokenSigner::new(b"access-secret", b"refresh-secret", -300, 604_800);
        let token = signer
            .sign_access(UserId::new(), "a@b.test", TenantId::new())
            .unwrap();

        assert_eq!(signer.verify_access(&token), Err(TokenError::Expired));
        let claims = signer.decode_access_allow_expired(&token).unwrap();
        assert!(claims.exp < Utc::now().timestamp());
    }
}
