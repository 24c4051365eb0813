//! Local command channel
//!
//! The verification command is split into words and run directly, never
//! through a shell, so plan authors cannot smuggle in pipes or expansions.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::DeviceQueryChannel;
use crate::common::{Error, Result};

/// Runs verification commands as local programs
#[derive(Debug, Clone, Default)]
pub struct CommandChannel {
    working_dir: Option<PathBuf>,
}

impl CommandChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run commands from `dir` instead of the current directory
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl DeviceQueryChannel for CommandChannel {
    async fn query(&self, command: &str) -> Result<String> {
        let words = shell_words::split(command)
            .map_err(|e| Error::query_failed(command, format!("cannot parse command: {}", e)))?;
        let (program, args) = words
            .split_first()
            .ok_or_else(|| Error::query_failed(command, "empty command"))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| Error::query_failed(command, format!("failed to start: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::query_failed(
                command,
                format!("exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::debug!(command, bytes = stdout.len(), "Device query output received");
        Ok(stdout)
    }
}
