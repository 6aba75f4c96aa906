pub mod admin_items;
pub mod app;
pub mod auth;
pub mod items;
pub mod users;
