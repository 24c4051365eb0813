//! Device query channels
//!
//! A channel sends a verification command to the device and returns its
//! textual output verbatim. A channel failure means the answer is unknown;
//! it is reported as [`Error::DeviceQueryFailed`](crate::Error::DeviceQueryFailed)
//! and never as a verification mismatch.

mod api;
mod command;

use async_trait::async_trait;

use crate::common::Result;

pub use api::ApiChannel;
pub use command::CommandChannel;

/// Runs verification commands against a device
#[async_trait]
pub trait DeviceQueryChannel: Send + Sync {
    /// Run `command` and return its raw output
    async fn query(&self, command: &str) -> Result<String>;
}
