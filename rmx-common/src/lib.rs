//! # RMX Common Library
//!
//! Shared code for the raw-material cross-reference pipeline:
//! - Error type shared by every crate
//! - TOML configuration and root folder resolution
//! - Database bootstrap (schema creation)
//! - Stable hashing for record keys

pub mod config;
pub mod db;
pub mod error;
pub mod hash;

pub use error::{Error, Result};
