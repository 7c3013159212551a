//! Supervised child processes
//!
//! A child is polled at a bounded interval against a hard deadline and
//! force-killed when the deadline passes. Children are spawned with
//! `kill_on_drop`, so dropping the supervising future also kills them.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::defaults;
use crate::error::SandboxError;

/// Grace period for collecting output after the child has exited
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// What to run and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

/// Captured result of a supervised run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub timed_out: bool,
    /// Exit code, or -1 when killed or terminated by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Runs one command to completion or deadline
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    async fn run(
        &self,
        command: &ProcessCommand,
        timeout: Duration,
    ) -> Result<ProcessOutput, SandboxError>;
}

/// [`ProcessSupervisor`] backed by `tokio::process`
#[derive(Debug, Clone)]
pub struct TokioProcessSupervisor {
    poll_interval: Duration,
}

impl Default for TokioProcessSupervisor {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(defaults::POLL_INTERVAL_MS),
        }
    }
}

impl TokioProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }
}

/// Read a pipe to the end on a background task
fn drain<R>(pipe: Option<R>) -> tokio::task::JoinHandle<Vec<u8>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

async fn collect(handle: tokio::task::JoinHandle<Vec<u8>>) -> String {
    match tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, handle).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        _ => String::new(),
    }
}

#[async_trait]
impl ProcessSupervisor for TokioProcessSupervisor {
    async fn run(
        &self,
        command: &ProcessCommand,
        timeout: Duration,
    ) -> Result<ProcessOutput, SandboxError> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&command.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SandboxError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + timeout;
        let mut timed_out = false;
        let exit_code = loop {
            if let Some(status) = child.try_wait()? {
                break status.code().unwrap_or(-1);
            }
            let now = Instant::now();
            if now >= deadline {
                log::warn!(
                    "Process '{}' exceeded {:?}, killing it",
                    command.program,
                    timeout
                );
                timed_out = true;
                if let Err(e) = child.kill().await {
                    log::error!("Failed to kill '{}': {}", command.program, e);
                }
                break -1;
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        };

        Ok(ProcessOutput {
            timed_out,
            exit_code,
            stdout: collect(stdout).await,
            stderr: collect(stderr).await,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ProcessCommand {
        ProcessCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            cwd: std::env::temp_dir(),
        }
    }

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let output = TokioProcessSupervisor::new()
            .run(&sh("echo hello; echo oops >&2; exit 3"), Duration::from_secs(10))
            .await
            .unwrap();
        assert!(!output.timed_out);
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_kills_on_deadline() {
        let started = Instant::now();
        let output = TokioProcessSupervisor::new()
            .run(&sh("exec sleep 30"), Duration::from_millis(200))
            .await
            .unwrap();
        assert!(output.timed_out);
        assert_eq!(output.exit_code, -1);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let command = ProcessCommand {
            program: "definitely-not-a-real-interpreter".to_string(),
            args: vec![],
            cwd: std::env::temp_dir(),
        };
        let result = TokioProcessSupervisor::new()
            .run(&command, Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(SandboxError::Spawn { .. })));
    }
}
