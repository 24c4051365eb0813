//! navtest - device configuration test runner
//!
//! Loads declarative test plans, runs each step's script through a registry
//! discovered from a scripts directory, and verifies the device afterwards
//! through a query channel. Platform access shares one lazily refreshed
//! token per endpoint.

pub mod auth;
pub mod cli;
pub mod commands;
pub mod common;
pub mod device;
pub mod navigator;
pub mod scripts;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
