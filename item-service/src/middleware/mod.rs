pub mod auth;

pub use auth::{auth_middleware, superuser_middleware, CurrentUser};
