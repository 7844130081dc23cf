//! CLI command implementations.

pub mod connection_info;
pub mod create;
pub mod delete;
pub mod list;
pub mod watch;
