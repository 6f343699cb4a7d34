//! Opt-in shell execution for `!` messages.
//!
//! Commands run through `sh -c` with the bridge's own privileges under a
//! wall-clock timeout. Output capture is bounded.

use std::process::Stdio;
use std::time::Duration;

use chatlink_types::ShellConfig;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{info, warn};

use crate::format;

/// Result of running one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellOutcome {
    Completed { exit_code: i32, output: String },
    TimedOut(Duration),
    SpawnFailed(String),
}

impl ShellOutcome {
    /// Chat text for this outcome.
    pub fn render(&self) -> String {
        match self {
            ShellOutcome::Completed { exit_code, output } => {
                let body = if !output.is_empty() {
                    output.clone()
                } else if *exit_code != 0 {
                    format!("(exit code: {exit_code})")
                } else {
                    "(no output)".to_string()
                };
                format::fenced(&body)
            }
            ShellOutcome::TimedOut(limit) => {
                format!("Command timed out after {}s", limit.as_secs())
            }
            ShellOutcome::SpawnFailed(e) => format!("Failed to run command: {e}"),
        }
    }
}

pub struct ShellGate {
    config: ShellConfig,
}

impl ShellGate {
    pub fn new(config: ShellConfig) -> Self {
        Self { config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub async fn run(&self, command: &str) -> ShellOutcome {
        info!(command, "running shell command");
        let mut child = match Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "failed to spawn shell");
                return ShellOutcome::SpawnFailed(e.to_string());
            }
        };

        let cap = self.config.max_output_bytes;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = self.config.timeout();

        let run = async {
            let (out, err) = tokio::join!(read_capped(stdout, cap), read_capped(stderr, cap));
            let status = child.wait().await;
            (status, out, err)
        };

        match tokio::time::timeout(limit, run).await {
            Ok((Ok(status), out, err)) => {
                let exit_code = status.code().unwrap_or(-1);
                ShellOutcome::Completed {
                    exit_code,
                    output: combine(&out, &err, cap),
                }
            }
            Ok((Err(e), _, _)) => ShellOutcome::SpawnFailed(e.to_string()),
            Err(_) => {
                warn!(command, timeout_secs = limit.as_secs(), "shell command timed out");
                if let Err(e) = child.start_kill() {
                    warn!(error = %e, "failed to kill timed-out command");
                }
                ShellOutcome::TimedOut(limit)
            }
        }
    }
}

/// Read to EOF, keeping at most `cap` bytes.
async fn read_capped<R: AsyncRead + Unpin>(reader: Option<R>, cap: usize) -> Vec<u8> {
    let Some(mut reader) = reader else {
        return Vec::new();
    };
    let mut kept = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = cap.saturating_sub(kept.len());
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
        }
    }
    kept
}

fn combine(stdout: &[u8], stderr: &[u8], cap: usize) -> String {
    let out = String::from_utf8_lossy(stdout);
    let err = String::from_utf8_lossy(stderr);
    let mut combined = [out.trim_end(), err.trim_end()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if combined.len() > cap {
        let mut end = cap;
        while !combined.is_char_boundary(end) {
            end -= 1;
        }
        combined.truncate(end);
    }
    combined.trim().to_string()
}
