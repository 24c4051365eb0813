//! Management platform REST API
//!
//! Token issuance, custom script execution and custom script upload. The
//! test plan engine never calls these directly: scripts, the upload command
//! and the API device channel do, all through one shared token cache.

mod client;
pub mod inventory;
#[cfg(test)]
pub(crate) mod stub;
pub mod types;

pub use client::{base_url, check_upload_file, http_client, NavigatorClient, PlatformAuthenticator};
pub use inventory::{parse_inventory, Inventory, InventoryIssue, ScriptUpload};
pub use types::{ExecuteRequest, NetworkElement};
