//! Core types shared by the Gatelink crates.

mod auth;
mod client;

pub use auth::*;
pub use client::*;
