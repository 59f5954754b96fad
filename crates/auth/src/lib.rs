//! `warden-auth` — pure authentication/authorization primitives.
//!
//! This crate is intentionally decoupled from HTTP and storage: claims models,
//! token signing/verification, password hashing, and the policy check itself.

pub mod authorize;
pub mod claims;
pub mod password;
pub mod permissions;
pub mod roles;
pub mod token;

pub use authorize::{authorize, AuthzError, Principal};
pub use claims::{AccessClaims, RefreshClaims};
pub use password::PasswordHasher;
pub use permissions::{Permission, PermissionSet};
pub use roles::RoleScope;
pub use token::{TokenError, TokenSigner};
