//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Environment variable that overrides the configured platform password
pub const PASSWORD_ENV: &str = "NAVTEST_PASSWORD";

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Management platform connection settings
    #[serde(default)]
    pub navigator: NavigatorConfig,

    /// Script discovery settings
    #[serde(default)]
    pub scripts: ScriptsConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Run policy settings
    #[serde(default)]
    pub run: RunConfig,

    /// Device query channel settings
    #[serde(default)]
    pub device: DeviceConfig,
}

/// Management platform connection settings
#[derive(Debug, Deserialize, Clone)]
pub struct NavigatorConfig {
    /// Host (or host:port) of the management platform
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default = "default_password")]
    pub password: String,

    /// Requested lifetime of issued tokens
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    /// Platforms commonly ship self-signed certificates
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            host: None,
            username: default_username(),
            password: default_password(),
            token_ttl_secs: default_token_ttl(),
            accept_invalid_certs: default_true(),
        }
    }
}

impl NavigatorConfig {
    /// Host to talk to, or a configuration error naming the missing key
    pub fn require_host(&self) -> Result<&str> {
        self.host.as_deref().ok_or_else(|| {
            super::Error::Config(
                "No platform host configured. Set [navigator] host or pass --host".to_string(),
            )
        })
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_password() -> String {
    "adminpw".to_string()
}

fn default_token_ttl() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

/// Script discovery settings
#[derive(Debug, Deserialize)]
pub struct ScriptsConfig {
    /// Directory scanned for script manifests
    #[serde(default = "default_scripts_dir")]
    pub directory: PathBuf,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            directory: default_scripts_dir(),
        }
    }
}

fn default_scripts_dir() -> PathBuf {
    PathBuf::from("uploaded_scripts")
}

/// Timeout settings in seconds; zero disables a timeout
#[derive(Debug, Deserialize)]
pub struct Timeouts {
    /// Default timeout for a script's entry point
    #[serde(default = "default_script")]
    pub script_secs: u64,

    /// Timeout for a single device verification query
    #[serde(default = "default_query")]
    pub query_secs: u64,

    /// Timeout for platform HTTP requests
    #[serde(default = "default_http")]
    pub http_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            script_secs: default_script(),
            query_secs: default_query(),
            http_secs: default_http(),
        }
    }
}

impl Timeouts {
    pub fn script(&self) -> Option<Duration> {
        non_zero_secs(self.script_secs)
    }

    pub fn query(&self) -> Option<Duration> {
        non_zero_secs(self.query_secs)
    }

    pub fn http(&self) -> Option<Duration> {
        non_zero_secs(self.http_secs)
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn default_script() -> u64 {
    300
}
fn default_query() -> u64 {
    60
}
fn default_http() -> u64 {
    30
}

/// What the engine does after a step fails
#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunPolicy {
    /// Stop at the first failed step; later steps never execute
    #[default]
    AbortOnFirstFailure,
    /// Record the failure and keep going to build a full report
    ContinueAndCollect,
}

/// Run settings
#[derive(Debug, Deserialize, Default)]
pub struct RunConfig {
    #[serde(default)]
    pub policy: RunPolicy,
}

/// Which channel verification commands go through
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Run the command as a local program (no shell)
    #[default]
    Command,
    /// Send the command to the device through the platform API
    Api,
}

/// Device query channel settings
#[derive(Debug, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub channel: ChannelKind,

    /// Network element name used by the api channel
    #[serde(default)]
    pub ne_name: Option<String>,

    #[serde(default)]
    pub ne_type: Option<String>,

    #[serde(default)]
    pub type_group: Option<String>,

    /// Directory the command channel runs verification commands from
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            channel: ChannelKind::Command,
            ne_name: None,
            ne_type: None,
            type_group: None,
            working_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default().with_env_overrides()),
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| super::Error::file_read(path, e))?;
        Self::parse(&content).map(Self::with_env_overrides)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            self.navigator.password = password;
        }
        self
    }
}
