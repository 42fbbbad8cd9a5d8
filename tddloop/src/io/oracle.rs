//! Oracle abstraction for code generation.
//!
//! The [`Oracle`] trait decouples the loop from the actual generation backend.
//! [`CommandOracle`] pipes the prompt into an external LLM CLI and reads the
//! response from its stdout. Tests use scripted oracles that return
//! predetermined responses without spawning processes.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_command_with_timeout;

/// External code-generation service.
///
/// An `Err` means the channel to the oracle is broken (spawn failure, timeout,
/// non-zero exit). A malformed but delivered response is `Ok`.
pub trait Oracle {
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Oracle that runs a command with the prompt on stdin (e.g. `ollama run <model>`).
#[derive(Debug, Clone)]
pub struct CommandOracle {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandOracle {
    pub fn new(command: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Result<Self> {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            bail!("oracle command must be a non-empty array");
        }
        Ok(Self {
            command,
            timeout,
            output_limit_bytes,
        })
    }

    fn program(&self) -> &str {
        &self.command[0]
    }
}

impl Oracle for CommandOracle {
    #[instrument(skip_all, fields(program = %self.program(), prompt_bytes = prompt.len()))]
    fn generate(&self, prompt: &str) -> Result<String> {
        info!("requesting completion");
        let mut cmd = Command::new(self.program());
        cmd.args(&self.command[1..]);

        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .with_context(|| format!("run oracle {}", self.program()))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "oracle timed out");
            return Err(anyhow!("oracle timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(exit_code = ?output.status.code(), "oracle failed");
            return Err(anyhow!(
                "oracle exited with status {:?}: {}",
                output.status.code(),
                stderr.trim()
            ));
        }
        if output.stdout_truncated > 0 {
            warn!(
                truncated = output.stdout_truncated,
                "oracle response truncated"
            );
        }

        let response = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(response_bytes = response.len(), "oracle responded");
        Ok(response)
    }
}
