//! Shell port
//!
//! Commands run through `sh -c` with captured output, optional timeout,
//! and bounded buffers. A failed command is not an `Err`: the non-zero
//! exit code and stderr travel in [`ExecResult`] so callers can classify
//! the failure.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use weft_core::Result;

/// Options for [`Shell::exec`]
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub timeout: Option<Duration>,
    /// Cap on captured stdout/stderr bytes; excess is truncated
    pub max_buffer: Option<usize>,
}

impl ExecOptions {
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Captured outcome of a command
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// stdout and stderr concatenated, for classifiers that want both
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Narrow shell capability consumed by the core
#[async_trait]
pub trait Shell: Send + Sync {
    async fn exec(&self, command: &str, options: &ExecOptions) -> Result<ExecResult>;
}

/// Shell running real processes rooted at a base directory
#[derive(Debug, Clone)]
pub struct SystemShell {
    base: PathBuf,
}

impl SystemShell {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

#[async_trait]
impl Shell for SystemShell {
    async fn exec(&self, command: &str, options: &ExecOptions) -> Result<ExecResult> {
        tracing::debug!("exec: {}", command);

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(options.cwd.as_ref().unwrap_or(&self.base))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &options.env {
            cmd.env(key, value);
        }

        let child = cmd.spawn()?;

        let output = match options.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output?,
                Err(_) => {
                    // kill_on_drop reaps the process with the dropped future
                    tracing::warn!("Command timed out after {:?}: {}", limit, command);
                    return Ok(ExecResult {
                        stdout: String::new(),
                        stderr: format!("Command timed out after {}ms", limit.as_millis()),
                        exit_code: -1,
                        timed_out: true,
                    });
                }
            },
            None => child.wait_with_output().await?,
        };

        let cap = options.max_buffer.unwrap_or(usize::MAX);
        Ok(ExecResult {
            stdout: truncate_lossy(&output.stdout, cap),
            stderr: truncate_lossy(&output.stderr, cap),
            exit_code: output.status.code().unwrap_or(-1),
            timed_out: false,
        })
    }
}

fn truncate_lossy(bytes: &[u8], cap: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= cap {
        return text.into_owned();
    }
    let mut cut = cap;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...[truncated]", &text[..cut])
}
