pub mod auth;
pub mod items;
pub mod users;

pub use auth::{LoginRequest, TokenResponse};
pub use items::{ItemCreateRequest, ItemUpdateRequest, ItemsResponse};
pub use users::UserCreateRequest;
