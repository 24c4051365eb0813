//! Request and response shapes of the platform REST API

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Body of a successful `POST /tron/api/v2/tokens`
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    /// Absolute expiry as seconds since the Unix epoch, when the platform sends one
    #[serde(default, alias = "expiresAt", alias = "expirationTime")]
    pub expires_at: Option<u64>,
}

impl TokenResponse {
    pub fn expiry(&self) -> Option<SystemTime> {
        self.expires_at
            .map(|secs| SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
    }
}

/// Connection attributes identifying a network element
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkElement {
    pub ne_name: String,
    pub ne_type: String,
    pub type_group: String,
}

/// Body of `POST /configmgmt/api/v1/customScripts/execute`
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteRequest {
    /// "run" or "saveAndRun"
    pub operation: String,
    pub scripts: Vec<ScriptRun>,
    pub included: Vec<IncludedResource>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRun {
    pub script_name: String,
    pub inputs: Vec<ScriptInput>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptInput {
    pub cmd_file: String,
    pub script_attributes: serde_json::Map<String, serde_json::Value>,
    pub protocol_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IncludedResource {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub attributes: NetworkElement,
}

/// Script the platform uses to push a command file through a device CLI session
pub const CLI_CUT_THROUGH: &str = "cliCutThrough";

impl ExecuteRequest {
    /// Run `script_name` with one command file against a single network element
    pub fn run(script_name: &str, cmd_file: &str, ne: &NetworkElement) -> Self {
        Self {
            operation: "run".to_string(),
            scripts: vec![ScriptRun {
                script_name: script_name.to_string(),
                inputs: vec![ScriptInput {
                    cmd_file: cmd_file.to_string(),
                    script_attributes: serde_json::Map::new(),
                    protocol_type: "cli".to_string(),
                }],
            }],
            included: vec![IncludedResource {
                id: ne.ne_name.clone(),
                kind: "connectionAttributes".to_string(),
                attributes: ne.clone(),
            }],
        }
    }

    /// Send a command file through `cliCutThrough`
    pub fn cli_cut_through(cmd_file: &str, ne: &NetworkElement) -> Self {
        Self::run(CLI_CUT_THROUGH, cmd_file, ne)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_execute_request_shape() {
        let ne = NetworkElement {
            ne_name: "PE-6x".to_string(),
            ne_type: "3928".to_string(),
            type_group: "PN6x".to_string(),
        };
        let request = ExecuteRequest::cli_cut_through("ShutOffInactivityTimer", &ne);

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "operation": "run",
                "scripts": [{
                    "scriptName": "cliCutThrough",
                    "inputs": [{
                        "cmdFile": "ShutOffInactivityTimer",
                        "scriptAttributes": {},
                        "protocolType": "cli"
                    }]
                }],
                "included": [{
                    "id": "PE-6x",
                    "type": "connectionAttributes",
                    "attributes": {
                        "neName": "PE-6x",
                        "neType": "3928",
                        "typeGroup": "PN6x"
                    }
                }]
            })
        );
    }

    #[test]
    fn test_token_response_expiry() {
        let response: TokenResponse = serde_json::from_str(r#"{"token": "abc"}"#).unwrap();
        assert_eq!(response.expiry(), None);

        let response: TokenResponse =
            serde_json::from_str(r#"{"token": "abc", "expiresAt": 1700000000}"#).unwrap();
        assert_eq!(
            response.expiry(),
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
        );
    }
}
