//! External process invocation.
//!
//! Every external tool (build tool, chain CLI) is launched through the
//! `ProcessRunner` trait so workflows can be exercised with a fake runner.
//! The production `TokioProcessRunner` either inherits the parent's standard
//! streams (live build output) or streams both pipes line by line into the
//! log while capturing them for later inspection.

use crate::error::ProcessError;
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, Command};

/// What happens to the child's stdout/stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Child writes straight to the operator's terminal.
    Inherit,
    /// Child output is logged line by line and returned in the outcome.
    Capture,
}

/// A single external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Variables layered over the inherited environment.
    pub env: BTreeMap<String, String>,
    pub current_dir: Option<PathBuf>,
    pub output: OutputMode,
    pub timeout: Option<Duration>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>) -> Self {
        ProcessSpec {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            current_dir: None,
            output: OutputMode::Inherit,
            timeout: None,
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn output(mut self, mode: OutputMode) -> Self {
        self.output = mode;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Program followed by its arguments, space separated.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl fmt::Display for ProcessSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Exit status plus whatever output was captured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// `None` when the child was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs one external command to completion.
pub trait ProcessRunner: Send + Sync {
    fn run<'a>(&'a self, spec: &'a ProcessSpec) -> BoxFuture<'a, Result<ProcessOutcome, ProcessError>>;
}

/// Production runner backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        TokioProcessRunner
    }
}

impl ProcessRunner for TokioProcessRunner {
    fn run<'a>(&'a self, spec: &'a ProcessSpec) -> BoxFuture<'a, Result<ProcessOutcome, ProcessError>> {
        Box::pin(async move {
            let command_line = spec.command_line();
            log::debug!("[Process] [SPAWN] {}", command_line);

            let mut command = Command::new(&spec.program);
            command.args(&spec.args);
            command.envs(&spec.env);
            if let Some(ref dir) = spec.current_dir {
                command.current_dir(dir);
            }
            command.kill_on_drop(true);
            command.stdin(Stdio::inherit());
            match spec.output {
                OutputMode::Inherit => {
                    command.stdout(Stdio::inherit());
                    command.stderr(Stdio::inherit());
                }
                OutputMode::Capture => {
                    command.stdout(Stdio::piped());
                    command.stderr(Stdio::piped());
                }
            }

            let mut child = command.spawn().map_err(|e| ProcessError::Spawn {
                command: command_line.clone(),
                reason: e.to_string(),
            })?;

            let result = match spec.timeout {
                Some(limit) => {
                    let waited = tokio::time::timeout(limit, drive_child(&mut child)).await;
                    match waited {
                        Ok(result) => result,
                        Err(_) => {
                            log::error!(
                                "[Process] [TIMEOUT] '{}' exceeded {}s, killing",
                                command_line,
                                limit.as_secs()
                            );
                            if let Err(e) = child.kill().await {
                                log::warn!("[Process] Failed to kill timed out child: {}", e);
                            }
                            return Err(ProcessError::TimedOut {
                                command: command_line,
                                after: limit,
                            });
                        }
                    }
                }
                None => drive_child(&mut child).await,
            };

            let (status, stdout, stderr) = result.map_err(|e| ProcessError::Wait {
                command: command_line.clone(),
                reason: e.to_string(),
            })?;
            log::debug!("[Process] [EXIT] '{}' exited with {}", command_line, status);

            Ok(ProcessOutcome {
                exit_code: status.code(),
                stdout,
                stderr,
            })
        })
    }
}

/// Stream any piped output into the log, then wait for exit.
async fn drive_child(child: &mut Child) -> std::io::Result<(ExitStatus, String, String)> {
    let mut stdout_buf = String::new();
    let mut stderr_buf = String::new();

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    if stdout.is_some() || stderr.is_some() {
        let mut stdout_lines = stdout.map(|s| BufReader::new(s).lines());
        let mut stderr_lines = stderr.map(|s| BufReader::new(s).lines());
        let mut stdout_closed = stdout_lines.is_none();
        let mut stderr_closed = stderr_lines.is_none();

        while !(stdout_closed && stderr_closed) {
            tokio::select! {
                line = next_line(&mut stdout_lines), if !stdout_closed => {
                    match line? {
                        Some(line) => {
                            log::info!("[Process] | {}", line);
                            stdout_buf.push_str(&line);
                            stdout_buf.push('\n');
                        }
                        None => stdout_closed = true,
                    }
                }
                line = next_line(&mut stderr_lines), if !stderr_closed => {
                    match line? {
                        Some(line) => {
                            log::info!("[Process] [STDERR] | {}", line);
                            stderr_buf.push_str(&line);
                            stderr_buf.push('\n');
                        }
                        None => stderr_closed = true,
                    }
                }
            }
        }
    }

    let status = child.wait().await?;
    Ok((status, stdout_buf, stderr_buf))
}

async fn next_line<R>(lines: &mut Option<Lines<R>>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    match lines {
        Some(lines) => lines.next_line().await,
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_builder_and_command_line() {
        let spec = ProcessSpec::new("anchor")
            .arg("build")
            .args(["--verifiable"])
            .env("ANCHOR_PROVIDER_URL", "http://localhost:8899")
            .timeout(Duration::from_secs(5));
        assert_eq!(spec.command_line(), "anchor build --verifiable");
        assert_eq!(spec.output, OutputMode::Inherit);
        assert_eq!(
            spec.env.get("ANCHOR_PROVIDER_URL").map(String::as_str),
            Some("http://localhost:8899")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_capture_output_and_exit_code() {
        let runner = TokioProcessRunner::new();
        let spec = ProcessSpec::new("sh")
            .args(["-c", "echo Program Id: abc; echo oops >&2; exit 3"])
            .output(OutputMode::Capture);
        let outcome = runner.run(&spec).await.expect("sh should run");
        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.success());
        assert_eq!(outcome.stdout, "Program Id: abc\n");
        assert_eq!(outcome.stderr, "oops\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_overlay_reaches_child() {
        let runner = TokioProcessRunner::new();
        let spec = ProcessSpec::new("sh")
            .args(["-c", "printf %s \"$DEPLOYER_TEST_VAR\""])
            .env("DEPLOYER_TEST_VAR", "overlay")
            .output(OutputMode::Capture);
        let outcome = runner.run(&spec).await.unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.stdout, "overlay\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_child() {
        let runner = TokioProcessRunner::new();
        let spec = ProcessSpec::new("sleep")
            .arg("5")
            .timeout(Duration::from_millis(100));
        let result = runner.run(&spec).await;
        assert!(matches!(result, Err(ProcessError::TimedOut { .. })));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let runner = TokioProcessRunner::new();
        let spec = ProcessSpec::new("definitely-not-a-real-binary-8c1f");
        let result = runner.run(&spec).await;
        assert!(matches!(result, Err(ProcessError::Spawn { .. })));
    }
}
