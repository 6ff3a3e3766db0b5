//! Privileged command execution
//!
//! The undetectable sink needs to flip platform settings that only root can
//! touch. Output is never interpreted beyond success/failure, apart from the
//! uid probe.

use std::process::Command;

use super::SinkError;

/// Output of a privileged command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured standard output
    pub stdout: String,
    /// Exit status, -1 if the process was killed by a signal
    pub status: i32,
}

impl CommandOutput {
    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs commands with elevated privilege
pub trait PrivilegedExecutor: Send + Sync {
    /// Run a shell command and capture its output
    fn run(&self, command: &str) -> Result<CommandOutput, SinkError>;

    /// Run a command and turn a non-zero exit into an error
    fn run_checked(&self, command: &str) -> Result<CommandOutput, SinkError> {
        let output = self.run(command)?;
        if output.success() {
            Ok(output)
        } else {
            Err(SinkError::CommandFailed {
                command: command.to_string(),
                status: output.status,
            })
        }
    }

    /// Whether commands actually run as root
    fn is_privileged(&self) -> bool {
        match self.run("id") {
            Ok(output) => output.success() && output.stdout.contains("uid=0"),
            Err(e) => {
                log::debug!("Privilege probe failed: {}", e);
                false
            }
        }
    }
}

/// Executor that shells out through `su -c`
pub struct SuExecutor {
    su_path: String,
}

impl SuExecutor {
    /// Create an executor using `su` from the PATH
    pub fn new() -> Self {
        Self {
            su_path: "su".to_string(),
        }
    }

    /// Use a specific `su` binary
    pub fn with_su_path(mut self, path: impl Into<String>) -> Self {
        self.su_path = path.into();
        self
    }
}

impl Default for SuExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl PrivilegedExecutor for SuExecutor {
    fn run(&self, command: &str) -> Result<CommandOutput, SinkError> {
        log::debug!("Running privileged command: {}", command);

        let output = Command::new(&self.su_path).arg("-c").arg(command).output()?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            status: output.status.code().unwrap_or(-1),
        })
    }
}
