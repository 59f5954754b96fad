use serde::{Deserialize, Serialize};

use warden_core::TenantId;

/// Which tenants a role is visible to.
///
/// `Global` roles (null organization in storage) are visible to every tenant
/// but editable by none of them; the edit guard is a branch on this enum, not
/// a null check.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "tenant_id")]
pub enum RoleScope {
    Global,
    Tenant(TenantId),
}

impl RoleScope {
    pub fn from_optional_tenant(tenant_id: Option<TenantId>) -> Self {
        match tenant_id {
            Some(id) => Self::Tenant(id),
            None => Self::Global,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        match self {
            Self::Global => None,
            Self::Tenant(id) => Some(*id),
        }
    }

    /// A role is usable within `tenant` when it is global or scoped to it.
    pub fn visible_to(&self, tenant: TenantId) -> bool {
        match self {
            Self::Global => true,
            Self::Tenant(id) => *id == tenant,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_roles_are_visible_everywhere() {
        let a = TenantId::new();
        let b = TenantId::new();

        assert!(RoleScope::Global.visible_to(a));
        assert!(RoleScope::Tenant(a).visible_to(a));
        assert!(!RoleScope::Tenant(a).visible_to(b));
    }

    #[test]
    fn optional_tenant_round_trip() {
        let id = TenantId::new();
        assert_eq!(RoleScope::from_optional_tenant(Some(id)).tenant_id(), Some(id));
        assert_eq!(RoleScope::from_optional_tenant(None).tenant_id(), None);
    }
}
