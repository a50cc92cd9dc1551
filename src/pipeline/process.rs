//! External command execution with streamed output.
//!
//! Builds, signing and verification all shell out to platform tooling. They go
//! through the [`CommandRunner`] trait so the pipeline can be exercised without
//! a real SDK installed.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::error::{Error, Result};

/// Receives output lines as they are produced.
pub type LineSink<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// A line sink that discards everything.
pub fn discard_output(_line: &str) {}

/// A fully described external command.
///
/// Environment variables are passed to the child but never rendered by
/// [`Display`](fmt::Display), which is what ends up in logs and errors. Secrets
/// therefore travel through `env`, never through `args`.
#[derive(Clone, Default)]
pub struct CommandSpec {
    /// Executable path or name
    pub program: PathBuf,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory
    pub cwd: Option<PathBuf>,
    /// Extra environment variables for the child
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    /// Creates a command for the given program.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Adds an environment variable for the child process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Program file name, for matching in logs and tests.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program_name())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("cwd", &self.cwd)
            .field(
                "env",
                &self.env.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Outcome of a finished command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    /// Captured stdout lines
    pub stdout: Vec<String>,
    /// Captured stderr lines
    pub stderr: Vec<String>,
}

impl CommandOutput {
    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Converts a non-zero exit into [`Error::CommandExit`].
    pub fn check(self, spec: &CommandSpec) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::CommandExit {
                command: spec.to_string(),
                code: self.code,
            })
        }
    }
}

/// Capability to run external commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `spec` to completion, forwarding every output line to `sink`.
    ///
    /// A non-zero exit is reported in [`CommandOutput::code`], not as an error;
    /// errors are reserved for spawn failures and cancellation.
    async fn run(&self, spec: &CommandSpec, sink: LineSink<'_>) -> Result<CommandOutput>;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct TokioCommandRunner {
    cancel: CancellationToken,
}

impl TokioCommandRunner {
    /// Creates a runner whose children are killed when `cancel` fires.
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, spec: &CommandSpec, sink: LineSink<'_>) -> Result<CommandOutput> {
        log::debug!("Running: {}", spec);

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|error| Error::CommandFailed {
            command: spec.to_string(),
            error,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Both streams must drain before the exit status is meaningful
        let streams = async {
            tokio::join!(
                async {
                    let mut captured = Vec::new();
                    if let Some(stdout) = stdout {
                        let mut lines = BufReader::new(stdout).lines();
                        while let Ok(Some(line)) = lines.next_line().await {
                            sink(&line);
                            captured.push(line);
                        }
                    }
                    captured
                },
                async {
                    let mut captured = Vec::new();
                    if let Some(stderr) = stderr {
                        let mut lines = BufReader::new(stderr).lines();
                        while let Ok(Some(line)) = lines.next_line().await {
                            sink(&line);
                            captured.push(line);
                        }
                    }
                    captured
                }
            )
        };

        let (stdout, stderr) = tokio::select! {
            captured = streams => captured,
            _ = self.cancel.cancelled() => {
                log::warn!("Cancelled, terminating {}", spec.program_name());
                if let Err(e) = child.kill().await {
                    log::warn!("Failed to kill {}: {}", spec.program_name(), e);
                }
                return Err(Error::Cancelled);
            }
        };

        let status = tokio::select! {
            status = child.wait() => status.map_err(|error| Error::CommandFailed {
                command: spec.to_string(),
                error,
            })?,
            _ = self.cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(Error::Cancelled);
            }
        };

        Ok(CommandOutput {
            code: status.code(),
            stdout,
            stderr,
        })
    }
}
