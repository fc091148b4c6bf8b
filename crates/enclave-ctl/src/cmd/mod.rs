//! CLI command modules.

pub mod http;
pub mod manager;
pub mod sessions;
