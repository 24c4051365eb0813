//! Test scripts and their discovery
//!
//! A script is a unit of device automation with a single entry point,
//! `run_test`, that takes named parameters and reports success. Scripts are
//! usually external programs described by manifest files in the scripts
//! directory (see [`process`]), but anything implementing [`Script`] can be
//! registered.

pub mod process;
mod registry;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::common::Result;

pub use process::{PlatformAccess, ProcessScript};
pub use registry::{normalize_name, Discovery, ScriptHandle, ScriptRegistry, MANIFEST_EXTENSIONS};

/// Fixed name of the entry point every script must expose
pub const ENTRY_POINT: &str = "run_test";

/// Named parameters passed to a script
pub type Params = serde_json::Map<String, Value>;

/// The plugin interface every script implements
#[async_trait]
pub trait Script: Send + Sync {
    /// Invoke the entry point
    ///
    /// `Ok(false)` means the script ran and reported failure (falsy or absent
    /// result); `Err` means it raised.
    async fn run_test(&self, params: &Params) -> Result<bool>;

    /// Script-specific time limit, overriding the configured default
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

/// In-process script backed by a closure
pub struct FnScript<F> {
    func: F,
}

impl<F> FnScript<F>
where
    F: Fn(&Params) -> Result<bool> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> Script for FnScript<F>
where
    F: Fn(&Params) -> Result<bool> + Send + Sync,
{
    async fn run_test(&self, params: &Params) -> Result<bool> {
        (self.func)(params)
    }
}

/// Truthiness of a script's JSON return value
///
/// `false`, `null`, zero, and empty strings/arrays/objects are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
            assert!(!is_truthy(&falsy), "{falsy} should be falsy");
        }
        for truthy in [json!(true), json!(1), json!(-2.5), json!("ok"), json!([0]), json!({"a": 1})] {
            assert!(is_truthy(&truthy), "{truthy} should be truthy");
        }
    }

    #[tokio::test]
    async fn test_fn_script_receives_params() {
        let script = FnScript::new(|params: &Params| Ok(params.get("seconds") == Some(&json!(30))));
        let mut params = Params::new();
        params.insert("seconds".to_string(), json!(30));
        assert!(script.run_test(&params).await.unwrap());
        assert!(!script.run_test(&Params::new()).await.unwrap());
    }
}
