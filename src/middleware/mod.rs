pub mod auth;
pub mod permission;
pub mod rate_limit;
pub mod response_cache;

pub use auth::{authenticate_middleware, require_auth, AuthState, AuthUser};
pub use permission::{require_permission, PermissionScope};
pub use rate_limit::rate_limit_middleware;
pub use response_cache::response_cache_middleware;
