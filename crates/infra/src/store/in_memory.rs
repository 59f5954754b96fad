//! In-memory store for tests and local development.
//!
//! Mirrors the Postgres implementation's semantics, including conditional
//! rotation, behind a single `RwLock` so multi-row mutations are atomic with
//! respect to readers.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use warden_core::{PermissionId, RoleId, TenantId, TokenFamilyId, UserId};

use super::{
    DirectoryStore, NewUser, OrganizationRecord, PermissionRecord, RbacStore,
    RefreshTokenRecord, RefreshTokenStore, RoleRecord, StoreError, UserRecord,
};

#[derive(Debug, Default)]
struct Tables {
    organizations: HashMap<TenantId, OrganizationRecord>,
    users: HashMap<UserId, UserRecord>,
    roles: HashMap<RoleId, RoleRecord>,
    permissions: HashMap<PermissionId, PermissionRecord>,
    /// role -> permission junction.
    role_permissions: HashMap<RoleId, Vec<PermissionId>>,
    /// (user, tenant) -> role junction.
    user_roles: HashMap<(UserId, TenantId), Vec<RoleId>>,
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
}

/// All three store traits over `RwLock<HashMap>` tables.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DirectoryStore for InMemoryStore {
    async fn insert_org(&self, org: OrganizationRecord) -> Result<(), StoreError> {
        let mut tables = self.write();
        if tables.organizations.values().any(|o| o.slug == org.slug) {
            return Err(StoreError::Conflict(format!(
                "organization slug already exists: {}",
                org.slug
            )));
        }
        tables.organizations.insert(org.id, org);
        Ok(())
    }

    async fn find_org_by_slug(&self, slug: &str) -> Result<Option<OrganizationRecord>, StoreError> {
        Ok(self
            .read()
            .organizations
            .values()
            .find(|o| o.slug == slug)
            .cloned())
    }

    async fn find_user_by_email(
        &self,
        tenant_id: TenantId,
        email: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        Ok(self
            .read()
            .users
            .values()
            .find(|u| u.tenant_id == tenant_id && u.email == email)
            .cloned())
    }

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.read().users.get(&id).cloned())
    }

    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let mut tables = self.write();
        if tables
            .users
            .values()
            .any(|u| u.tenant_id == user.tenant_id && u.email == user.email)
        {
            return Err(StoreError::Conflict(format!(
                "email already registered in organization: {}",
                user.email
            )));
        }

        let record = UserRecord {
            id: UserId::new(),
            tenant_id: user.tenant_id,
            email: user.email,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            active: true,
            last_login_at: None,
        };
        tables.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(user) = self.write().users.get_mut(&id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }

    async fn deactivate_user(&self, id: UserId) -> Result<(), StoreError> {
        if let Some(user) = self.write().users.get_mut(&id) {
            user.active = false;
        }
        Ok(())
    }
}

#[async_trait]
impl RbacStore for InMemoryStore {
    async fn insert_role(&self, role: RoleRecord) -> Result<(), StoreError> {
        let mut tables = self.write();
        if tables
            .roles
            .values()
            .any(|r| r.scope == role.scope && r.name == role.name)
        {
            return Err(StoreError::Conflict(format!(
                "role name already exists in scope: {}",
                role.name
            )));
        }
        tables.roles.insert(role.id, role);
        Ok(())
    }

    async fn find_role(&self, id: RoleId) -> Result<Option<RoleRecord>, StoreError> {
        Ok(self.read().roles.get(&id).cloned())
    }

    async fn rename_role(&self, id: RoleId, name: &str) -> Result<(), StoreError> {
        if let Some(role) = self.write().roles.get_mut(&id) {
            role.name = name.to_owned();
        }
        Ok(())
    }

    async fn delete_role(&self, id: RoleId) -> Result<(), StoreError> {
        let mut tables = self.write();
        tables.roles.remove(&id);
        tables.role_permissions.remove(&id);
        for roles in tables.user_roles.values_mut() {
            roles.retain(|r| *r != id);
        }
        Ok(())
    }

    async fn insert_permission(&self, permission: PermissionRecord) -> Result<(), StoreError> {
        let mut tables = self.write();
        if tables
            .permissions
            .values()
            .any(|p| p.action == permission.action)
        {
            return Err(StoreError::Conflict(format!(
                "permission action already exists: {}",
                permission.action
            )));
        }
        tables.permissions.insert(permission.id, permission);
        Ok(())
    }

    async fn set_role_permissions(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> Result<(), StoreError> {
        self.write()
            .role_permissions
            .insert(role_id, permission_ids.to_vec());
        Ok(())
    }

    async fn set_user_roles(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
        role_ids: &[RoleId],
    ) -> Result<(), StoreError> {
        self.write()
            .user_roles
            .insert((user_id, tenant_id), role_ids.to_vec());
        Ok(())
    }

    async fn permissions_for_user(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
    ) -> Result<Vec<String>, StoreError> {
        let tables = self.read();

        let role_ids = match tables.user_roles.get(&(user_id, tenant_id)) {
            Some(ids) => ids,
            None => return Ok(Vec::new()),
        };

        let mut actions = Vec::new();
        for role_id in role_ids {
            let role = match tables.roles.get(role_id) {
                Some(r) if r.active && r.scope.visible_to(tenant_id) => r,
                _ => continue,
            };
            let Some(permission_ids) = tables.role_permissions.get(&role.id) else {
                continue;
            };
            for permission_id in permission_ids {
                if let Some(p) = tables.permissions.get(permission_id) {
                    if p.active && !actions.contains(&p.action) {
                        actions.push(p.action.clone());
                    }
                }
            }
        }

        Ok(actions)
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryStore {
    async fn insert(&self, record: RefreshTokenRecord) -> Result<(), StoreError> {
        self.write()
            .refresh_tokens
            .insert(record.token.clone(), record);
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(self.read().refresh_tokens.get(token).cloned())
    }

    async fn rotate(
        &self,
        old_token: &str,
        new_record: RefreshTokenRecord,
    ) -> Result<bool, StoreError> {
        let mut tables = self.write();

        // Conditional revoke under the write lock: exactly one of two
        // concurrent rotations of the same token sees revoked == false here.
        match tables.refresh_tokens.get_mut(old_token) {
            Some(old) if !old.revoked => old.revoked = true,
            _ => return Ok(false),
        }

        tables
            .refresh_tokens
            .insert(new_record.token.clone(), new_record);
        Ok(true)
    }

    async fn revoke(&self, token: &str) -> Result<(), StoreError> {
        if let Some(record) = self.write().refresh_tokens.get_mut(token) {
            record.revoked = true;
        }
        Ok(())
    }

    async fn revoke_family(&self, family_id: TokenFamilyId) -> Result<u64, StoreError> {
        let mut affected = 0;
        for record in self.write().refresh_tokens.values_mut() {
            if record.family_id == family_id {
                record.revoked = true;
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn revoke_all_for_user(&self, user_id: UserId) -> Result<u64, StoreError> {
        let mut affected = 0;
        for record in self.write().refresh_tokens.values_mut() {
            if record.user_id == user_id && !record.revoked {
                record.revoked = true;
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn active_count_in_family(&self, family_id: TokenFamilyId) -> Result<u64, StoreError> {
        Ok(self
            .read()
            .refresh_tokens
            .values()
            .filter(|r| r.family_id == family_id && !r.revoked)
            .count() as u64)
    }
}
