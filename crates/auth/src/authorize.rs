use thiserror::Error;

use warden_core::{TenantId, UserId};

use crate::permissions::{Permission, PermissionSet};

/// A fully resolved principal for authorization decisions.
///
/// Construction is decoupled from storage and transport: the API layer builds
/// this from verified token claims plus the resolved permission set, never
/// from anything the caller controls directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub active_tenant_id: TenantId,
    /// Tenant the permission set was resolved for.
    pub resolved_tenant_id: TenantId,
    pub permissions: PermissionSet,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Authorize a principal within its active tenant context.
///
/// - No IO
/// - No panics
/// - Deny by default: an empty permission set (or an empty `required` list)
///   never authorizes anything
///
/// `required` is a logical OR: any one granted permission suffices.
pub fn authorize(principal: &Principal, required: &[Permission]) -> Result<(), AuthzError> {
    if principal.active_tenant_id != principal.resolved_tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    if principal.permissions.grants_any(required) {
        Ok(())
    } else {
        let wanted = required
            .iter()
            .map(Permission::as_str)
            .collect::<Vec<_>>()
            .join("|");
        Err(AuthzError::Forbidden(wanted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(permissions: PermissionSet) -> Principal {
        let tenant = TenantId::new();
        Principal {
            user_id: UserId::new(),
            active_tenant_id: tenant,
            resolved_tenant_id: tenant,
            permissions,
        }
    }

    #[test]
    fn any_required_permission_suffices() {
        let p = principal(["USER_READ".to_string()].into_iter().collect());

        assert!(authorize(&p, &[Permission::new("USER_READ")]).is_ok());
        assert!(
            authorize(&p, &[Permission::new("USER_DELETE"), Permission::new("USER_READ")]).is_ok()
        );
    }

    #[test]
    fn empty_permission_set_denies_everything() {
        let p = principal(PermissionSet::new());

        let err = authorize(&p, &[Permission::new("USER_READ")]).unwrap_err();
        assert!(matches!(err, AuthzError::Forbidden(_)));
    }

    #[test]
    fn empty_required_list_denies() {
        let p = principal(["USER_READ".to_string()].into_iter().collect());
        assert!(authorize(&p, &[]).is_err());
    }

    #[test]
    fn cross_tenant_principal_is_rejected() {
        let mut p = principal(["USER_READ".to_string()].into_iter().collect());
        p.resolved_tenant_id = TenantId::new();

        assert_eq!(
            authorize(&p, &[Permission::new("USER_READ")]),
            Err(AuthzError::TenantMismatch)
        );
    }
}
