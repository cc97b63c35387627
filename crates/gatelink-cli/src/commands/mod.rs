//! CLI command implementations.

pub mod call;
pub mod config;
pub mod device;
pub mod watch;
