pub mod access_log;
pub mod admission;
pub mod auth;

pub use access_log::access_log;
pub use admission::admission_middleware;
pub use auth::auth_middleware;
