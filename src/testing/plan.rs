//! Test plan documents
//!
//! A plan is either a bare list of steps:
//!
//! ```yaml
//! - script: setTimeout
//!   params: { seconds: 30 }
//!   verify_command: show timer
//!   expected_output: "30"
//! ```
//!
//! or a document with a name and description around the same list under
//! `steps`. JSON and YAML are both accepted. Every step is validated when
//! the plan is loaded so that a malformed plan never starts executing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::common::{Error, Result};
use crate::scripts::Params;

/// Source format of a plan document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanFormat {
    Json,
    /// YAML, which also accepts JSON
    Yaml,
}

impl PlanFormat {
    /// `.json` files are JSON, anything else is read as YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => PlanFormat::Json,
            _ => PlanFormat::Yaml,
        }
    }
}

/// Check to run against the device after a script succeeds
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    /// Command sent through the device query channel
    pub command: String,
    /// Text that must appear (case-sensitive) in the command output
    pub expected_output: String,
}

/// One step of a test plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestStep {
    pub script: String,
    pub params: Params,
    pub verification: Option<Verification>,
    pub description: Option<String>,
}

/// An ordered, validated list of steps
#[derive(Debug, Clone, Default, Serialize)]
pub struct TestPlan {
    pub name: Option<String>,
    pub description: Option<String>,
    steps: Vec<TestStep>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStep {
    script: String,
    #[serde(default)]
    params: Option<Params>,
    #[serde(default)]
    verify_command: Option<String>,
    #[serde(default)]
    expected_output: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDocument {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    steps: Value,
}

impl RawStep {
    fn validate(self, index: usize) -> Result<TestStep> {
        let script = self.script.trim();
        if script.is_empty() {
            return Err(Error::invalid_step(index, "script name is empty"));
        }

        let verification = match (self.verify_command, self.expected_output) {
            (Some(command), Some(expected_output)) => {
                if command.trim().is_empty() {
                    return Err(Error::invalid_step(index, "verify_command is empty"));
                }
                Some(Verification {
                    command,
                    expected_output,
                })
            }
            (Some(_), None) => {
                return Err(Error::invalid_step(
                    index,
                    format!("script '{}' has verify_command but no expected_output", script),
                ))
            }
            (None, Some(_)) => {
                return Err(Error::invalid_step(
                    index,
                    format!("script '{}' has expected_output but no verify_command", script),
                ))
            }
            (None, None) => None,
        };

        Ok(TestStep {
            script: script.to_string(),
            params: self.params.unwrap_or_default(),
            verification,
            description: self.description,
        })
    }
}

impl TestPlan {
    /// Build a plan from already validated steps
    pub fn new(steps: Vec<TestStep>) -> Self {
        Self {
            name: None,
            description: None,
            steps,
        }
    }

    /// Parse and validate a plan document
    pub fn parse(source: &str, format: PlanFormat) -> Result<Self> {
        let document: Value = match format {
            PlanFormat::Json => serde_json::from_str(source)
                .map_err(|e| Error::invalid_plan(format!("malformed JSON: {}", e)))?,
            PlanFormat::Yaml => {
                let yaml: serde_yaml::Value = serde_yaml::from_str(source)
                    .map_err(|e| Error::invalid_plan(format!("malformed YAML: {}", e)))?;
                serde_json::to_value(yaml)
                    .map_err(|e| Error::invalid_plan(format!("unsupported YAML: {}", e)))?
            }
        };

        let (name, description, steps) = match document {
            Value::Array(steps) => (None, None, steps),
            Value::Object(_) => {
                let doc: RawDocument = serde_json::from_value(document)
                    .map_err(|e| Error::invalid_plan(e.to_string()))?;
                match doc.steps {
                    Value::Array(steps) => (doc.name, doc.description, steps),
                    _ => return Err(Error::invalid_plan("'steps' must be a list")),
                }
            }
            _ => {
                return Err(Error::invalid_plan(
                    "expected a list of steps or a document with 'steps'",
                ))
            }
        };

        let steps = steps
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                serde_json::from_value::<RawStep>(value)
                    .map_err(|e| Error::invalid_step(index, e.to_string()))?
                    .validate(index)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name,
            description,
            steps,
        })
    }

    pub fn steps(&self) -> &[TestStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Read, parse and validate a plan file
pub fn load_plan(path: &Path) -> Result<TestPlan> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
    let mut plan = TestPlan::parse(&content, PlanFormat::from_path(path))?;
    if plan.name.is_none() {
        plan.name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned());
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step_error(err: Error) -> (Option<usize>, String) {
        match err {
            Error::PlanValidation { step, reason } => (step, reason),
            other => panic!("expected plan validation error, got {other}"),
        }
    }

    #[test]
    fn test_parse_json_list() {
        let plan = TestPlan::parse(
            r#"[
                {"script": "setTimeout", "params": {"seconds": 30},
                 "verify_command": "show timer", "expected_output": "30"},
                {"script": "saveConfig"}
            ]"#,
            PlanFormat::Json,
        )
        .unwrap();

        assert_eq!(plan.len(), 2);
        let first = &plan.steps()[0];
        assert_eq!(first.script, "setTimeout");
        assert_eq!(first.params.get("seconds"), Some(&json!(30)));
        assert_eq!(
            first.verification,
            Some(Verification {
                command: "show timer".to_string(),
                expected_output: "30".to_string(),
            })
        );
        assert!(plan.steps()[1].params.is_empty());
        assert!(plan.steps()[1].verification.is_none());
    }

    #[test]
    fn test_parse_yaml_document() {
        let plan = TestPlan::parse(
            r#"
name: inactivity timer
description: Turn the timer off and check it
steps:
  - script: ShutOffInactivityTimer
    description: disable timer
    params:
      ne: PE-6x
    verify_command: show cli settings
    expected_output: Timer Disabled
"#,
            PlanFormat::Yaml,
        )
        .unwrap();

        assert_eq!(plan.name.as_deref(), Some("inactivity timer"));
        assert_eq!(plan.steps()[0].description.as_deref(), Some("disable timer"));
        assert_eq!(plan.steps()[0].params.get("ne"), Some(&json!("PE-6x")));
    }

    #[test]
    fn test_verify_without_expected_is_rejected() {
        let err = TestPlan::parse(
            r#"[{"script": "a"}, {"script": "b", "verify_command": "show timer"}]"#,
            PlanFormat::Json,
        )
        .unwrap_err();
        let (step, reason) = step_error(err);
        assert_eq!(step, Some(1));
        assert!(reason.contains("expected_output"));
    }

    #[test]
    fn test_expected_without_verify_is_rejected() {
        let err = TestPlan::parse(
            r#"[{"script": "a", "expected_output": "30"}]"#,
            PlanFormat::Json,
        )
        .unwrap_err();
        assert_eq!(step_error(err).0, Some(0));
    }

    #[test]
    fn test_empty_script_name_is_rejected() {
        let err = TestPlan::parse("- script: ok\n- script: '  '\n", PlanFormat::Yaml).unwrap_err();
        let (step, reason) = step_error(err);
        assert_eq!(step, Some(1));
        assert!(reason.contains("script name"));
    }

    #[test]
    fn test_unknown_and_missing_fields_name_the_step() {
        let err = TestPlan::parse(
            r#"[{"script": "a"}, {"script": "b"}, {"script": "c", "verify": "typo"}]"#,
            PlanFormat::Json,
        )
        .unwrap_err();
        assert_eq!(step_error(err).0, Some(2));

        let err = TestPlan::parse(r#"[{"params": {}}]"#, PlanFormat::Json).unwrap_err();
        let (step, reason) = step_error(err);
        assert_eq!(step, Some(0));
        assert!(reason.contains("script"));
    }

    #[test]
    fn test_params_must_be_a_mapping() {
        let err = TestPlan::parse(r#"[{"script": "a", "params": [1, 2]}]"#, PlanFormat::Json)
            .unwrap_err();
        assert_eq!(step_error(err).0, Some(0));
    }

    #[test]
    fn test_document_level_errors() {
        let (step, _) = step_error(TestPlan::parse("42", PlanFormat::Json).unwrap_err());
        assert_eq!(step, None);
        let (step, _) = step_error(TestPlan::parse("{not json", PlanFormat::Json).unwrap_err());
        assert_eq!(step, None);
        let (step, _) =
            step_error(TestPlan::parse("steps: nope\n", PlanFormat::Yaml).unwrap_err());
        assert_eq!(step, None);
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(PlanFormat::from_path(Path::new("test_plan.json")), PlanFormat::Json);
        assert_eq!(PlanFormat::from_path(Path::new("plan.yaml")), PlanFormat::Yaml);
        assert_eq!(PlanFormat::from_path(Path::new("plan")), PlanFormat::Yaml);
    }

    #[test]
    fn test_load_plan_names_plan_after_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_plan.json");
        std::fs::write(&path, r#"[{"script": "setTimeout"}]"#).unwrap();

        let plan = load_plan(&path).unwrap();
        assert_eq!(plan.name.as_deref(), Some("test_plan"));
        assert!(matches!(
            load_plan(&dir.path().join("missing.json")),
            Err(Error::FileRead { .. })
        ));
    }
}
