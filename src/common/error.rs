//! Error types for navtest
//!
//! Configuration defects (bad plans, broken script manifests) and runtime
//! conditions (failed scripts, device queries) share one error type so that
//! every layer can propagate with `?`.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for navtest
#[derive(Error, Debug)]
pub enum Error {
    // === Authentication Errors ===
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    // === Platform API Errors ===
    #[error("Request to {url} failed: {reason}")]
    ApiRequest { url: String, reason: String },

    #[error("Unexpected status {status} from {url}: {body}")]
    ApiStatus {
        url: String,
        status: u16,
        body: String,
    },

    // === Script Errors ===
    #[error("Script '{0}' not found. Use 'navtest scripts' to list discovered scripts")]
    ScriptNotFound(String),

    #[error("Failed to load script '{script}': {reason}")]
    ScriptLoad { script: String, reason: String },

    #[error("Script '{script}' failed: {reason}")]
    ScriptExecutionFailed { script: String, reason: String },

    #[error("Script '{script}' timed out after {secs} seconds")]
    ScriptTimeout { script: String, secs: u64 },

    // === Device Errors ===
    #[error("Device query '{command}' failed: {reason}")]
    DeviceQueryFailed { command: String, reason: String },

    #[error("Device query '{command}' timed out after {secs} seconds")]
    DeviceQueryTimeout { command: String, secs: u64 },

    #[error("Expected output '{expected}' not found in device output")]
    VerificationMismatch { expected: String },

    // === Test Plan Errors ===
    #[error("Invalid test plan{}: {reason}", .step.map(|i| format!(" (step {i})")).unwrap_or_default())]
    PlanValidation { step: Option<usize>, reason: String },

    #[error("Test failed: {0}")]
    TestFailed(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a script load error
    pub fn script_load(script: &str, reason: impl Into<String>) -> Self {
        Self::ScriptLoad {
            script: script.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a script execution error
    pub fn script_failed(script: &str, reason: impl Into<String>) -> Self {
        Self::ScriptExecutionFailed {
            script: script.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a device query error
    pub fn query_failed(command: &str, reason: impl Into<String>) -> Self {
        Self::DeviceQueryFailed {
            command: command.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a plan validation error for a specific step
    pub fn invalid_step(step: usize, reason: impl Into<String>) -> Self {
        Self::PlanValidation {
            step: Some(step),
            reason: reason.into(),
        }
    }

    /// Create a plan validation error for the whole document
    pub fn invalid_plan(reason: impl Into<String>) -> Self {
        Self::PlanValidation {
            step: None,
            reason: reason.into(),
        }
    }

    /// Create a file read error
    pub fn file_read(path: &std::path::Path, error: impl std::fmt::Display) -> Self {
        Self::FileRead {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_validation_message_names_step() {
        let err = Error::invalid_step(2, "missing expected_output");
        assert_eq!(
            err.to_string(),
            "Invalid test plan (step 2): missing expected_output"
        );

        let err = Error::invalid_plan("empty document");
        assert_eq!(err.to_string(), "Invalid test plan: empty document");
    }
}
