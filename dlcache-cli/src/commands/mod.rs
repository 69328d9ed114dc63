//! CLI command implementations.

pub mod cache;
pub mod common;
pub mod config;
pub mod digest;
pub mod fetch;
pub mod verify;
