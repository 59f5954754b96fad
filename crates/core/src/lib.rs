//! `warden-core` — shared identity/access-control primitives.
//!
//! This crate contains **pure** building blocks (ids, error model); no
//! storage, transport, or crypto concerns.

pub mod error;
pub mod id;

pub use error::{AuthError, AuthResult};
pub use id::{PermissionId, RoleId, TenantId, TokenFamilyId, UserId};
