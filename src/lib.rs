pub mod app;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod permissions;
pub mod rate_limit;
pub mod services;
