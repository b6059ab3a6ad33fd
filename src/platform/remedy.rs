// LogMedic - platform/remedy.rs
//
// OS-level remediation behind healer fix actions.
//
// The healer only knows the semantic action (free a port, install an
// extension); `RemediationExecutor` performs it. `CommandExecutor` runs a
// configurable command template for each action. Templates are split on
// whitespace and placeholders are substituted per argument, so no shell is
// involved and substituted values cannot inject extra arguments.
//
// No timeout is applied: a hung command blocks the resolve call that issued it.

use crate::util::constants;
use crate::util::error::RemediationError;
use std::process::Command;

/// Performs the OS operation behind a fix action.
pub trait RemediationExecutor: Send + Sync {
    /// Terminate whatever process is bound to TCP `port`.
    fn kill_port(&self, port: u16) -> Result<(), RemediationError>;

    /// Install the PHP extension package for `extension`.
    fn install_extension(&self, extension: &str) -> Result<(), RemediationError>;
}

/// Runs command templates. `{port}` and `{ext}` are the placeholders.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    kill_port_template: String,
    install_extension_template: String,
}

impl CommandExecutor {
    pub fn new(
        kill_port_template: impl Into<String>,
        install_extension_template: impl Into<String>,
    ) -> Self {
        Self {
            kill_port_template: kill_port_template.into(),
            install_extension_template: install_extension_template.into(),
        }
    }

    fn run(&self, template: &str, placeholder: &str, value: &str) -> Result<(), RemediationError> {
        let argv: Vec<String> = template
            .split_whitespace()
            .map(|arg| arg.replace(placeholder, value))
            .collect();
        let Some((program, args)) = argv.split_first() else {
            return Err(RemediationError::EmptyCommand {
                template: template.to_string(),
            });
        };
        let command = argv.join(" ");

        tracing::info!(command = %command, "Remediation: running command");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| RemediationError::Spawn {
                command: command.clone(),
                source: e,
            })?;

        if output.status.success() {
            tracing::info!(command = %command, "Remediation: command succeeded");
            return Ok(());
        }

        let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.len() > constants::MAX_REMEDIATION_STDERR_BYTES {
            let mut cut = constants::MAX_REMEDIATION_STDERR_BYTES;
            while !stderr.is_char_boundary(cut) {
                cut -= 1;
            }
            stderr.truncate(cut);
        }
        tracing::warn!(
            command = %command,
            exit_code = ?output.status.code(),
            "Remediation: command failed"
        );
        Err(RemediationError::CommandFailed {
            command,
            status: output.status.code(),
            stderr,
        })
    }
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new(
            constants::DEFAULT_KILL_PORT_COMMAND,
            constants::DEFAULT_INSTALL_EXTENSION_COMMAND,
        )
    }
}

impl RemediationExecutor for CommandExecutor {
    fn kill_port(&self, port: u16) -> Result<(), RemediationError> {
        self.run(&self.kill_port_template, "{port}", &port.to_string())
    }

    fn install_extension(&self, extension: &str) -> Result<(), RemediationError> {
        self.run(&self.install_extension_template, "{ext}", extension)
    }
}
