//! Shared building blocks for the Courier workspace: configuration, error
//! taxonomy, domain types, and connection construction for Postgres and Redis.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod redis_pool;
pub mod types;
