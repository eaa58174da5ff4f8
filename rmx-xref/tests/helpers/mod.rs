//! Test Helper Utilities
//!
//! Shared utilities for testing rmx-xref

#![allow(dead_code)]

pub mod db_utils;
pub mod providers;

// Re-export commonly used items
pub use db_utils::{create_file_store, create_memory_store, test_settings};
pub use providers::{broker_of, FailingProvider, MapProvider, WritingProvider};
