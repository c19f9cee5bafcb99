//! Execution seam for everything that touches the host through a CLI.
//!
//! The lifecycle code never spawns processes itself; it builds
//! [`HostCommand`]s and hands them to a [`Host`]. [`SystemHost`] runs them
//! with `tokio::process`, tests substitute a recording implementation.

use std::fmt;
use std::process::Stdio;

use crate::error::NodeboxError;

/// A program plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl HostCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[allow(async_fn_in_trait)] // trait is internal-only
pub trait Host {
    /// Run a command to completion and return its stdout.
    /// A non-zero exit is an error carrying the command's exit code.
    async fn output(&self, cmd: &HostCommand) -> Result<String, NodeboxError>;

    /// Run a command only for its exit status. `Ok(false)` on non-zero exit
    /// or when the program is not installed.
    async fn probe(&self, cmd: &HostCommand) -> Result<bool, NodeboxError>;

    async fn run(&self, cmd: &HostCommand) -> Result<(), NodeboxError> {
        self.output(cmd).await.map(drop)
    }
}

/// Runs commands on the local machine.
pub struct SystemHost;

impl Host for SystemHost {
    async fn output(&self, cmd: &HostCommand) -> Result<String, NodeboxError> {
        tracing::info!(command = %cmd, "running");

        let output = tokio::process::Command::new(&cmd.program)
            .args(&cmd.args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| NodeboxError::CommandSpawn {
                command: cmd.to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        for line in stdout.lines() {
            tracing::debug!(program = %cmd.program, "{line}");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::warn!(command = %cmd, status = %output.status, "command failed");
            return Err(NodeboxError::CommandFailed {
                command: cmd.to_string(),
                code: output.status.code(),
                stderr,
            });
        }

        Ok(stdout)
    }

    async fn probe(&self, cmd: &HostCommand) -> Result<bool, NodeboxError> {
        tracing::debug!(command = %cmd, "probing");

        let status = tokio::process::Command::new(&cmd.program)
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(s) => Ok(s.success()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(NodeboxError::CommandSpawn {
                command: cmd.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records every command and answers from substring-matched rules.
    ///
    /// Unmatched commands succeed with empty output; unmatched probes
    /// succeed.
    #[derive(Default)]
    pub struct RecordingHost {
        calls: Mutex<Vec<String>>,
        outputs: Vec<(String, String)>,
        probes: Vec<(String, bool)>,
        failures: Vec<(String, i32)>,
    }

    impl RecordingHost {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_output(mut self, pattern: &str, stdout: &str) -> Self {
            self.outputs.push((pattern.into(), stdout.into()));
            self
        }

        pub fn with_probe(mut self, pattern: &str, result: bool) -> Self {
            self.probes.push((pattern.into(), result));
            self
        }

        pub fn with_failure(mut self, pattern: &str, code: i32) -> Self {
            self.failures.push((pattern.into(), code));
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        /// Number of recorded calls containing `pattern`.
        pub fn count(&self, pattern: &str) -> usize {
            self.calls().iter().filter(|c| c.contains(pattern)).count()
        }

        /// Index of the first recorded call containing `pattern`.
        pub fn position(&self, pattern: &str) -> Option<usize> {
            self.calls().iter().position(|c| c.contains(pattern))
        }
    }

    impl Host for RecordingHost {
        async fn output(&self, cmd: &HostCommand) -> Result<String, NodeboxError> {
            let line = cmd.to_string();
            self.calls.lock().unwrap().push(line.clone());

            if let Some((_, code)) = self.failures.iter().find(|(p, _)| line.contains(p.as_str())) {
                return Err(NodeboxError::CommandFailed {
                    command: line,
                    code: Some(*code),
                    stderr: "mock failure".into(),
                });
            }
            Ok(self
                .outputs
                .iter()
                .find(|(p, _)| line.contains(p.as_str()))
                .map(|(_, out)| out.clone())
                .unwrap_or_default())
        }

        async fn probe(&self, cmd: &HostCommand) -> Result<bool, NodeboxError> {
            let line = cmd.to_string();
            self.calls.lock().unwrap().push(line.clone());
            Ok(self
                .probes
                .iter()
                .find(|(p, _)| line.contains(p.as_str()))
                .map(|(_, r)| *r)
                .unwrap_or(true))
        }
    }
}
