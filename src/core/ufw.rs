//! [`RuleSource`] backed by the `ufw` command line tool
//!
//! Every call spawns one elevated `ufw` process. Listing uses
//! `ufw status numbered`; mutations use the argument vectors from
//! [`Mutation::to_ufw_args`].

use crate::core::error::{Error, Result};
use crate::core::parse::parse_status;
use crate::core::source::{Listing, Mutation, RuleSource};
use std::time::Duration;
use tracing::{error, info, warn};

/// Environment override for the ufw binary, used by tests to point at a mock.
pub const UFW_COMMAND_ENV: &str = "UFWM_UFW_COMMAND";

/// Upper bound for a single ufw invocation (covers polkit prompts).
const COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Runs the real ufw binary
#[derive(Debug, Clone)]
pub struct Ufw {
    program: String,
}

impl Ufw {
    /// Creates a source for `program`, unless `UFWM_UFW_COMMAND` overrides it.
    pub fn new(program: impl Into<String>) -> Self {
        let program = std::env::var(UFW_COMMAND_ENV).unwrap_or_else(|_| program.into());
        Self { program }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Runs ufw with `args` and returns stdout.
    async fn run(&self, args: &[String]) -> Result<String> {
        let mut cmd = crate::elevation::create_elevated_ufw_command(&self.program, args)?;

        let output = match tokio::time::timeout(COMMAND_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                error!("Failed to spawn {}: {e}", self.program);
                return Err(Error::ToolUnavailable(format!("{}: {e}", self.program)));
            }
            Ok(Err(e)) => return Err(Error::Io(e)),
            Err(_) => {
                warn!("ufw {} timed out", args.join(" "));
                return Err(Error::Tool {
                    exit_code: None,
                    message: format!("timed out after {}s", COMMAND_TIMEOUT.as_secs()),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        // ufw writes some errors to stdout
        let message = if stderr.trim().is_empty() {
            stdout.as_str()
        } else {
            stderr.as_ref()
        };
        error!("ufw {} failed: {}", args.join(" "), message.trim());

        // sudo/run0 report a missing target binary themselves
        if output.status.code() == Some(127) || message.contains("command not found") {
            return Err(Error::ToolUnavailable(message.trim().to_string()));
        }
        Err(Error::from_tool_failure(output.status.code(), message))
    }
}

impl RuleSource for Ufw {
    async fn list(&self) -> Result<Listing> {
        let args = ["status".to_string(), "numbered".to_string()];
        let stdout = self.run(&args).await?;
        parse_status(&stdout)
    }

    async fn apply(&self, mutation: &Mutation) -> Result<()> {
        info!("Applying: ufw {}", mutation.describe());
        let stdout = self.run(&mutation.to_ufw_args()).await?;
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            info!("ufw: {}", line.trim());
        }
        Ok(())
    }
}
