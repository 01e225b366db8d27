//! Reasoning backend that asks the `claude` CLI for a fraud verdict.
//!
//! The user prompt (transaction summary plus findings) is written to the
//! child's stdin rather than passed as an argument, so large finding sets do
//! not run into argv limits. The CLI is asked for its JSON envelope, which is
//! unwrapped here; the verdict inside it is validated by the synthesizer.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::BackendError;
use crate::synthesizer::ReasoningBackend;

const DEFAULT_BINARY: &str = "claude";

/// Result envelope printed by `claude -p --output-format json`.
#[derive(Debug, Deserialize)]
struct CliEnvelope {
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    duration_ms: Option<u64>,
    #[serde(default)]
    total_cost_usd: Option<f64>,
}

/// Shells out to the `claude` CLI, one process per synthesis call.
#[derive(Debug, Clone)]
pub struct ClaudeCliBackend {
    binary: PathBuf,
    model: String,
    timeout: Duration,
}

impl ClaudeCliBackend {
    pub fn new(model: String, timeout: Duration) -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_BINARY),
            model,
            timeout,
        }
    }

    /// Use a different executable, e.g. a wrapper script or absolute path.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn args<'a>(&'a self, system_prompt: &'a str) -> [&'a str; 7] {
        [
            "-p",
            "--system-prompt",
            system_prompt,
            "--model",
            &self.model,
            "--output-format",
            "json",
        ]
    }

    /// Run the CLI once and return the verdict text from its envelope.
    /// The child is killed if the timeout elapses.
    pub async fn request_verdict(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, BackendError> {
        debug!(model = %self.model, binary = %self.binary.display(), "Invoking claude CLI");

        let run = async {
            let mut child = Command::new(&self.binary)
                .args(self.args(system_prompt))
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| BackendError::Cli(format!("Failed to spawn {}: {e}", self.binary.display())))?;

            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(user_prompt.as_bytes())
                    .await
                    .map_err(|e| BackendError::Cli(format!("Failed to write prompt: {e}")))?;
            }

            child
                .wait_with_output()
                .await
                .map_err(|e| BackendError::Cli(format!("Failed to read claude output: {e}")))
        };

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| BackendError::Timeout(self.timeout.as_millis() as u64))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, stderr = %stderr, "Claude CLI failed");
            return Err(BackendError::Cli(format!(
                "claude exited {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        unwrap_envelope(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl ReasoningBackend for ClaudeCliBackend {
    fn name(&self) -> &str {
        "claude_cli"
    }

    async fn assess(&self, system_prompt: &str, user_prompt: &str) -> Result<String, BackendError> {
        self.request_verdict(system_prompt, user_prompt).await
    }
}

/// Pull the model's answer out of the CLI's JSON envelope.
fn unwrap_envelope(stdout: &str) -> Result<String, BackendError> {
    let envelope: CliEnvelope = serde_json::from_str(stdout.trim()).map_err(|e| {
        BackendError::Malformed(format!(
            "claude output is not a JSON envelope ({e}, length={})",
            stdout.len()
        ))
    })?;

    if envelope.is_error {
        return Err(BackendError::Cli(format!(
            "claude reported {}: {}",
            envelope.subtype.as_deref().unwrap_or("an error"),
            envelope.result.as_deref().unwrap_or("no detail")
        )));
    }

    debug!(
        duration_ms = envelope.duration_ms,
        cost_usd = envelope.total_cost_usd,
        "Claude CLI answered"
    );

    match envelope.result {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(BackendError::Malformed(
            "claude envelope carried no result".to_string(),
        )),
    }
}

/// True when `binary --version` runs successfully.
pub async fn check_cli_available(binary: &str) -> bool {
    match Command::new(binary).arg("--version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}
