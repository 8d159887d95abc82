//! Model abstraction for prompt completion.
//!
//! The [`Model`] trait decouples inference from the actual language model
//! backend. [`CommandModel`] shells out to a configured command; tests use
//! scripted models that return predetermined completions.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::types::Message;
use crate::io::process::run_command_with_timeout;

/// A blocking text-completion backend.
pub trait Model {
    /// Complete an ordered sequence of role-tagged messages.
    fn complete(&self, prompt: &[Message]) -> Result<String>;
}

/// Model backed by an external command.
///
/// The prompt is written to stdin as a JSON array of `{role, content}`
/// objects; stdout is the completion.
#[derive(Debug, Clone)]
pub struct CommandModel {
    pub command: Vec<String>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl Model for CommandModel {
    #[instrument(skip_all, fields(program = %self.command.first().map(String::as_str).unwrap_or(""), messages = prompt.len()))]
    fn complete(&self, prompt: &[Message]) -> Result<String> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("model command is empty"))?;
        let input = serde_json::to_vec(prompt).context("serialize prompt")?;

        info!("requesting completion");
        let mut cmd = Command::new(program);
        cmd.args(args);
        let output =
            run_command_with_timeout(cmd, Some(&input), self.timeout, self.output_limit_bytes)
                .with_context(|| format!("run model command {program}"))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "model timed out");
            return Err(anyhow!("model command timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "model command failed");
            return Err(anyhow!(
                "model command failed with status {:?}: {}",
                output.status.code(),
                output.failure_detail()
            ));
        }

        let completion = output.stdout_text();
        debug!(bytes = completion.len(), "completion received");
        Ok(completion)
    }
}
