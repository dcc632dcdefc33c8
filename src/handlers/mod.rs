pub mod auth;
pub mod resources;
pub mod roles;
