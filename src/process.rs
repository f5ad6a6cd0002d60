// ABOUTME: Runs external commands (nix, nixfmt, handler scripts) with a deadline
// ABOUTME: Children are killed when the deadline passes or the calling task is dropped

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Captured result of a finished command
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Spawn `cmd`, optionally feed it `stdin`, and collect its output.
///
/// Fails if the program can't be spawned or doesn't exit within `timeout`.
/// A non-zero exit is not an error here; callers inspect `status`.
pub async fn run(mut cmd: Command, stdin: Option<&str>, timeout: Duration) -> Result<CommandOutput> {
    let program = cmd
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();

    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn {}", program))?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input.as_bytes())
            .await
            .with_context(|| format!("Failed to write stdin of {}", program))?;
    }

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| anyhow::anyhow!("{} timed out after {}s", program, timeout.as_secs()))?
        .with_context(|| format!("Failed to wait for {}", program))?;

    tracing::debug!(
        program = %program,
        status = %output.status,
        stdout_len = output.stdout.len(),
        stderr_len = output.stderr.len(),
        "Command finished"
    );

    Ok(CommandOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn test_captures_stdout_and_status() {
        let out = run(sh("echo hello; echo oops >&2"), None, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "hello\n");
        assert_eq!(out.stderr, "oops\n");
    }

    #[tokio::test]
    async fn test_feeds_stdin() {
        let out = run(sh("cat"), Some("piped"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout, "piped");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        let out = run(sh("exit 3"), None, Duration::from_secs(5)).await.unwrap();
        assert!(!out.success());
        assert_eq!(out.status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_timeout() {
        let err = run(sh("sleep 5"), None, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let cmd = Command::new("/nonexistent/nixbot-test-binary");
        let err = run(cmd, None, Duration::from_secs(1)).await.unwrap_err();
        assert!(err.to_string().contains("Failed to spawn"));
    }
}
