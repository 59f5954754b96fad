//! Infrastructure layer: relational store and key-value cache adapters.

pub mod cache;
pub mod store;

pub use cache::{Cache, CacheError, InMemoryCache};
#[cfg(feature = "redis")]
pub use cache::RedisCache;
pub use store::{
    DirectoryStore, InMemoryStore, NewUser, OrganizationRecord, PermissionRecord,
    RbacStore, RefreshTokenRecord, RefreshTokenStore, RoleRecord, StoreError, UserRecord,
};
pub use store::postgres::PostgresStore;
