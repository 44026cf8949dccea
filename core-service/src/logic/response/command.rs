//! Command Runner - Firewall tool invocations with a hard timeout
//!
//! A timed-out child is killed; the caller sees `EnforcementError::Timeout`.

use std::process::Stdio;
use std::time::Duration;
use tokio::runtime::Runtime;

use super::types::EnforcementError;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Best diagnostic text for a failed run
    pub fn detail(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

pub struct CommandRunner {
    runtime: Runtime,
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self { runtime, timeout })
    }

    /// Run to completion or timeout; non-zero exit is still `Ok`
    pub fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, EnforcementError> {
        let command = format!("{} {}", program, args.join(" "));
        log::debug!("Running: {}", command);

        self.runtime.block_on(async {
            let mut cmd = tokio::process::Command::new(program);
            cmd.args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            match tokio::time::timeout(self.timeout, cmd.output()).await {
                Err(_) => Err(EnforcementError::Timeout {
                    command,
                    timeout_secs: self.timeout.as_secs(),
                }),
                Ok(Err(source)) => Err(EnforcementError::Spawn { command, source }),
                Ok(Ok(output)) => Ok(CommandOutput {
                    exit_code: output.status.code().unwrap_or(-1),
                    success: output.status.success(),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                }),
            }
        })
    }

    /// Run and turn a non-zero exit into `EnforcementError::Failed`
    pub fn run_checked(&self, program: &str, args: &[String]) -> Result<CommandOutput, EnforcementError> {
        let output = self.run(program, args)?;
        if output.success {
            Ok(output)
        } else {
            Err(EnforcementError::Failed {
                command: program.to_string(),
                exit_code: output.exit_code,
                detail: output.detail(),
            })
        }
    }
}
