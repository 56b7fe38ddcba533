//! Hands policy-wrapped prompts to a local command-line AI tool.

use anyhow::Result;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tracing::debug;

use crate::config::RelayConfig;

/// Executes a wrapped prompt and returns the raw (unsanitized) output.
#[async_trait]
pub trait PromptRunner: Send + Sync {
    async fn run(&self, wrapped_prompt: &str) -> Result<String>;
}

/// Runs `command [args...] <prompt>` and captures stdout.
#[derive(Debug, Clone)]
pub struct CliRunner {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CliRunner {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            config.command.clone(),
            config.args.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl PromptRunner for CliRunner {
    async fn run(&self, wrapped_prompt: &str) -> Result<String> {
        debug!(
            "Relaying prompt to {} (timeout: {}s, {} chars)",
            self.command,
            self.timeout.as_secs(),
            wrapped_prompt.chars().count()
        );

        // The prompt is passed as a single argv entry, never through a shell.
        let child = tokio::process::Command::new(&self.command)
            .args(&self.args)
            .arg(wrapped_prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to start {}: {}", self.command, e))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "{} timed out after {}s",
                    self.command,
                    self.timeout.as_secs()
                )
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout);

        if output.status.success() {
            return Ok(stdout.trim_end().to_string());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut message = format!(
            "{} exited with code {}",
            self.command,
            output.status.code().unwrap_or(-1)
        );
        if !stdout.trim().is_empty() {
            message.push_str("\n\n");
            message.push_str(stdout.trim_end());
        }
        if !stderr.trim().is_empty() {
            message.push_str("\n\nSTDERR:\n");
            message.push_str(stderr.trim_end());
        }
        anyhow::bail!(message)
    }
}
