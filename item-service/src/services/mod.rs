pub mod database;
pub mod items;
pub mod jwt;

pub use database::Database;
pub use jwt::{AccessTokenClaims, JwtService};
