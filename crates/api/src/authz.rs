//! API-side authorization guard.
//!
//! Enforces the permission check at the handler boundary, before any store
//! access, while keeping the policy check itself (`warden_auth::authorize`)
//! free of HTTP and storage concerns.

use warden_auth::{authorize, AuthzError, Permission, Principal};

use crate::context::{PrincipalContext, TenantContext};

/// Check that the request's principal holds at least one of `required`
/// within the active tenant. Deny by default.
pub fn require(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    required: &[Permission],
) -> Result<(), AuthzError> {
    let principal = Principal {
        user_id: principal.user_id(),
        active_tenant_id: tenant.tenant_id(),
        // The middleware resolved permissions for the token's own tenant, so
        // active and resolved coincide here; the distinction matters for
        // callers that build principals by hand.
        resolved_tenant_id: tenant.tenant_id(),
        permissions: principal.permissions().clone(),
    };

    authorize(&principal, required)
}
