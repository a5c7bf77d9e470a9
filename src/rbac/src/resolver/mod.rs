//! Role/group resolution and caching
//!
//! - [`GrantResolver`]: user → groups, groups → roles, grant existence
//! - [`LookupCache`]: TTL cache fronted by a [`Singleflight`]

pub mod cache;
pub mod grants;
pub mod singleflight;

pub use cache::{CacheConfig, CacheStats, LookupCache, TtlCache};
pub use grants::{GrantKey, GrantResolver, PermissionRoles, ResolverStats};
pub use singleflight::Singleflight;
