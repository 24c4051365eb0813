//! Scripts implemented as external programs
//!
//! Each script is declared by a manifest file (`.toml`, `.yaml` or `.yml`)
//! whose `run_test` table names the program to run:
//!
//! ```toml
//! description = "Set the CLI inactivity timer"
//!
//! [run_test]
//! command = "python3"
//! args = ["set_timeout.py"]
//! timeout_secs = 120
//! ```
//!
//! The program runs without a shell, in the manifest's directory. Its named
//! parameters arrive as a JSON object on stdin and as `NAVTEST_PARAM_<NAME>`
//! environment variables. The last non-empty line of stdout is its JSON
//! return value; a non-zero exit status means the script raised.
//!
//! Scripts that call the platform API themselves set `platform_token = true`
//! and receive `NAVTEST_PLATFORM_URL` and a bearer token in `NAVTEST_TOKEN`,
//! taken from the same token cache every other consumer uses.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{is_truthy, Params, Script, ENTRY_POINT};
use crate::auth::TokenCache;
use crate::common::{Error, Result};

/// Prefix of the per-parameter environment variables
pub const PARAM_ENV_PREFIX: &str = "NAVTEST_PARAM_";
pub const TOKEN_ENV: &str = "NAVTEST_TOKEN";
pub const PLATFORM_URL_ENV: &str = "NAVTEST_PLATFORM_URL";

/// Platform endpoint and its shared token cache, lent to scripts
#[derive(Clone)]
pub struct PlatformAccess {
    pub base_url: String,
    pub tokens: Arc<TokenCache>,
}

impl fmt::Debug for PlatformAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformAccess")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Parsed manifest file
#[derive(Debug, Deserialize)]
pub struct ScriptManifest {
    /// Human-readable summary shown by `navtest scripts`
    pub description: Option<String>,
    /// The entry point; missing means the script cannot be registered
    pub run_test: Option<EntryPoint>,
}

/// How to invoke a script's entry point
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntryPoint {
    /// Program to run; bare names are looked up on PATH, paths are
    /// relative to the manifest's directory
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub timeout_secs: Option<u64>,
    /// Hand the script a platform token
    #[serde(default)]
    pub platform_token: bool,
}

impl ScriptManifest {
    /// Parse a manifest, choosing the format from the file extension
    pub fn parse(path: &Path, content: &str) -> std::result::Result<Self, String> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(content).map_err(|e| e.to_string()),
            _ => serde_yaml::from_str(content).map_err(|e| e.to_string()),
        }
    }
}

/// A manifest-backed script ready to run
#[derive(Debug, Clone)]
pub struct ProcessScript {
    name: String,
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: PathBuf,
    timeout: Option<Duration>,
    description: Option<String>,
    platform_token: bool,
    platform: Option<PlatformAccess>,
}

impl ProcessScript {
    /// Load and validate a manifest
    ///
    /// Fails if the manifest cannot be read or parsed, has no `run_test`
    /// entry point, or names a program that cannot be found.
    pub fn load(name: &str, manifest_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(manifest_path)
            .map_err(|e| Error::script_load(name, format!("cannot read manifest: {}", e)))?;
        let manifest = ScriptManifest::parse(manifest_path, &content)
            .map_err(|e| Error::script_load(name, format!("invalid manifest: {}", e)))?;

        let entry = manifest.run_test.ok_or_else(|| {
            Error::script_load(
                name,
                format!("manifest does not define a '{}' entry point", ENTRY_POINT),
            )
        })?;

        let working_dir = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let program = resolve_program(&entry.command, &working_dir)
            .ok_or_else(|| Error::script_load(name, format!("program '{}' not found", entry.command)))?;

        Ok(Self {
            name: name.to_string(),
            program,
            args: entry.args,
            env: entry.env,
            working_dir,
            // 0 disables the limit, as in [timeouts]
            timeout: entry
                .timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            description: manifest.description,
            platform_token: entry.platform_token,
            platform: None,
        })
    }

    /// Lend the script the platform endpoint and token cache
    pub fn with_platform(mut self, platform: Option<PlatformAccess>) -> Self {
        self.platform = platform;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    async fn platform_env(&self) -> Result<Vec<(&'static str, String)>> {
        if !self.platform_token {
            return Ok(Vec::new());
        }
        let platform = self.platform.as_ref().ok_or_else(|| {
            Error::script_failed(&self.name, "needs a platform token but no platform host is configured")
        })?;
        let token = platform.tokens.get_valid_credential().await?;
        Ok(vec![
            (PLATFORM_URL_ENV, platform.base_url.clone()),
            (TOKEN_ENV, token),
        ])
    }
}

fn resolve_program(command: &str, base: &Path) -> Option<PathBuf> {
    let candidate = Path::new(command);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        let path = crate::common::paths::resolve_relative(base, candidate);
        path.is_file().then_some(path)
    } else {
        which::which(command).ok()
    }
}

/// Environment variable name for a parameter
pub fn param_env_name(param: &str) -> String {
    let sanitized: String = param
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("{}{}", PARAM_ENV_PREFIX, sanitized)
}

fn param_env_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Interpret a script's stdout as its return value
///
/// Empty output is an absent (falsy) result; a final line that is not JSON
/// is an error.
pub fn parse_return_value(name: &str, stdout: &str) -> Result<bool> {
    let Some(last) = stdout.lines().map(str::trim).rev().find(|l| !l.is_empty()) else {
        return Ok(false);
    };
    let value: Value = serde_json::from_str(last).map_err(|_| {
        Error::script_failed(name, format!("last output line is not a JSON result: {}", last))
    })?;
    Ok(is_truthy(&value))
}

fn tail(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

#[async_trait]
impl Script for ProcessScript {
    async fn run_test(&self, params: &Params) -> Result<bool> {
        let platform_env = self.platform_env().await?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.working_dir)
            .envs(&self.env)
            .envs(platform_env)
            .envs(params.iter().map(|(k, v)| (param_env_name(k), param_env_value(v))))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(script = %self.name, program = %self.program.display(), "Spawning script");
        let mut child = cmd
            .spawn()
            .map_err(|e| Error::script_failed(&self.name, format!("failed to start: {}", e)))?;

        let input = serde_json::to_vec(params)?;
        let stdin = child.stdin.take();
        // stdout and stderr drain while the parameters are written, so a
        // script that prints before reading cannot stall on a full pipe
        let write_params = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&input).await?;
                stdin.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let (written, output) = tokio::join!(write_params, child.wait_with_output());

        // A script that never reads its stdin closes the pipe early
        if let Err(e) = written {
            tracing::debug!(script = %self.name, "stdin not consumed: {}", e);
        }
        let output =
            output.map_err(|e| Error::script_failed(&self.name, format!("failed to wait: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            tracing::debug!(script = %self.name, stderr = %stderr.trim_end(), "Script stderr");
        }

        if !output.status.success() {
            return Err(Error::script_failed(
                &self.name,
                format!("exited with {}: {}", output.status, tail(&stderr, 5)),
            ));
        }

        parse_return_value(&self.name, &stdout)
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_param_env_name() {
        assert_eq!(param_env_name("seconds"), "NAVTEST_PARAM_SECONDS");
        assert_eq!(param_env_name("ne-name.1"), "NAVTEST_PARAM_NE_NAME_1");
    }

    #[test]
    fn test_parse_return_value() {
        assert!(parse_return_value("s", "configuring...\ntrue\n\n").unwrap());
        assert!(!parse_return_value("s", "false").unwrap());
        assert!(!parse_return_value("s", "").unwrap());
        assert!(!parse_return_value("s", "  \n").unwrap());
        assert!(parse_return_value("s", r#"{"changed": 1}"#).unwrap());
        assert!(matches!(
            parse_return_value("s", "done"),
            Err(Error::ScriptExecutionFailed { .. })
        ));
    }

    #[test]
    fn test_load_rejects_missing_entry_point() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("no_entry.toml");
        std::fs::write(&path, "description = \"nothing to run\"\n").unwrap();

        let err = ProcessScript::load("no_entry", &path).unwrap_err();
        assert!(
            matches!(&err, Error::ScriptLoad { script, reason } if script == "no_entry" && reason.contains("run_test")),
            "unexpected error: {err}"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_manifest_timeout() {
        let dir = tempdir().unwrap();
        let write = |file: &str, secs: u64| {
            let path = dir.path().join(file);
            std::fs::write(
                &path,
                format!("[run_test]\ncommand = \"sh\"\ntimeout_secs = {secs}\n"),
            )
            .unwrap();
            path
        };

        let limited = ProcessScript::load("limited", &write("limited.toml", 120)).unwrap();
        assert_eq!(limited.timeout(), Some(Duration::from_secs(120)));

        let unlimited = ProcessScript::load("unlimited", &write("unlimited.toml", 0)).unwrap();
        assert_eq!(unlimited.timeout(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_zero_timeout_does_not_cut_script_short() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("quick.toml");
        std::fs::write(
            &path,
            "[run_test]\ncommand = \"sh\"\nargs = [\"-c\", \"sleep 0.2; echo true\"]\ntimeout_secs = 0\n",
        )
        .unwrap();

        let mut registry = crate::scripts::ScriptRegistry::new();
        let script = ProcessScript::load("quick", &path).unwrap();
        registry
            .register(crate::scripts::ScriptHandle::new("quick", Arc::new(script)))
            .unwrap();
        let plan = crate::testing::TestPlan::parse("- script: quick\n", crate::testing::PlanFormat::Yaml)
            .unwrap();

        let report = crate::testing::ExecutionEngine::new(
            registry,
            Arc::new(crate::device::CommandChannel::new()),
        )
        .with_script_timeout(None)
        .run(&plan)
        .await;
        assert!(report.passed(), "{report:?}");
    }

    #[test]
    fn test_load_rejects_unknown_program() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ghost.yaml");
        std::fs::write(&path, "run_test:\n  command: ./does-not-exist\n").unwrap();

        assert!(matches!(
            ProcessScript::load("ghost", &path),
            Err(Error::ScriptLoad { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_passes_params_and_reads_result() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("echo_seconds.toml");
        std::fs::write(
            &path,
            r#"
[run_test]
command = "sh"
args = ["-c", "cat > params.json; test \"$NAVTEST_PARAM_SECONDS\" = 30 && echo true || echo false"]
"#,
        )
        .unwrap();

        let script = ProcessScript::load("echo_seconds", &path).unwrap();
        let mut params = Params::new();
        params.insert("seconds".to_string(), json!(30));

        assert!(script.run_test(&params).await.unwrap());
        let written = std::fs::read_to_string(dir.path().join("params.json")).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&written).unwrap(), json!({"seconds": 30}));

        params.insert("seconds".to_string(), json!(60));
        assert!(!script.run_test(&params).await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_chatty_script_gets_large_params() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chatty.toml");
        // Fills the stdout pipe before it reads a byte of its parameters
        std::fs::write(
            &path,
            r#"
[run_test]
command = "sh"
args = ["-c", "head -c 200000 /dev/zero | tr '\\000' x; echo; wc -c > params.len; echo true"]
"#,
        )
        .unwrap();

        let script = ProcessScript::load("chatty", &path).unwrap();
        let mut params = Params::new();
        params.insert("blob".to_string(), json!("y".repeat(256 * 1024)));
        let expected = serde_json::to_vec(&params).unwrap().len();

        let passed = tokio::time::timeout(Duration::from_secs(30), script.run_test(&params))
            .await
            .expect("script stalled on its pipes")
            .unwrap();
        assert!(passed);
        let len = std::fs::read_to_string(dir.path().join("params.len")).unwrap();
        assert_eq!(len.trim().parse::<usize>().unwrap(), expected);
    }

    struct FixedAuthenticator;

    #[async_trait]
    impl crate::auth::Authenticator for FixedAuthenticator {
        async fn issue_token(&self, _ttl: Duration) -> Result<crate::auth::IssuedToken> {
            Ok(crate::auth::IssuedToken {
                token: "tok-1".to_string(),
                expires_at: None,
            })
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_platform_token_is_lent_on_request() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("api_call.toml");
        std::fs::write(
            &path,
            r#"
[run_test]
command = "sh"
args = ["-c", "test \"$NAVTEST_TOKEN\" = tok-1 && test \"$NAVTEST_PLATFORM_URL\" = https://nav && echo true"]
platform_token = true
"#,
        )
        .unwrap();

        let script = ProcessScript::load("api_call", &path).unwrap();
        assert!(matches!(
            script.run_test(&Params::new()).await,
            Err(Error::ScriptExecutionFailed { .. })
        ));

        let tokens = Arc::new(TokenCache::new(
            Arc::new(FixedAuthenticator),
            Duration::from_secs(60),
        ));
        let script = script.with_platform(Some(PlatformAccess {
            base_url: "https://nav".to_string(),
            tokens,
        }));
        assert!(script.run_test(&Params::new()).await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("boom.toml");
        std::fs::write(
            &path,
            "[run_test]\ncommand = \"sh\"\nargs = [\"-c\", \"echo device unreachable >&2; exit 3\"]\n",
        )
        .unwrap();

        let script = ProcessScript::load("boom", &path).unwrap();
        let err = script.run_test(&Params::new()).await.unwrap_err();
        assert!(
            matches!(&err, Error::ScriptExecutionFailed { reason, .. } if reason.contains("device unreachable")),
            "unexpected error: {err}"
        );
    }
}
