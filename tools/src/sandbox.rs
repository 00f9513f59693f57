//! Command sandbox: validates, bounds and supervises one shell subprocess.
//!
//! Validation happens before anything is spawned. The child gets its own
//! process group, a null stdin and a scrubbed environment; on timeout the
//! whole group is killed and any late output is discarded.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tether_types::ToolResult;
use tokio::process::Command;

use crate::context::ToolContext;
use crate::process::{ChildGuard, apply_sanitized_env, read_bounded, set_new_session};
use crate::{ToolError, paths};

pub const MIN_TIMEOUT_MS: u64 = 1_000;
pub const MAX_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

const TOOL: &str = "run_command";

/// Clamp a requested timeout into `[MIN_TIMEOUT_MS, MAX_TIMEOUT_MS]`.
#[must_use]
pub fn clamp_timeout_ms(ms: u64) -> u64 {
    ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS)
}

/// A validated-on-run command request. The timeout is always in range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    command: String,
    cwd: Option<PathBuf>,
    timeout_ms: u64,
}

impl CommandSpec {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            cwd: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = clamp_timeout_ms(timeout_ms);
        self
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    #[must_use]
    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }
}

/// Human-readable record of a finished command.
///
/// `STDOUT:` and `STDERR:` sections appear only when the stream produced output.
#[must_use]
pub fn format_transcript(spec: &CommandSpec, exit_code: i32, stdout: &str, stderr: &str) -> String {
    let mut out = format!("$ {}\n", spec.command);
    if let Some(cwd) = &spec.cwd {
        let _ = writeln!(out, "Working directory: {}", cwd.display());
    }
    let _ = write!(out, "Exit code: {exit_code}");
    for (label, text) in [("STDOUT", stdout), ("STDERR", stderr)] {
        if text.is_empty() {
            continue;
        }
        let _ = write!(out, "\n{label}:");
        for line in text.lines() {
            out.push('\n');
            out.push_str(line);
        }
    }
    out
}

/// Run `spec` through the configured shell.
///
/// Exit code 0 is a success carrying the transcript; any other exit code is
/// [`ToolError::CommandFailed`], which keeps the transcript.
pub async fn run(spec: &CommandSpec, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
    if spec.command.trim().is_empty() {
        return Err(ToolError::MissingCommand);
    }
    ctx.command_blacklist.validate(&spec.command)?;

    let cwd = match &spec.cwd {
        Some(dir) => {
            let resolved = paths::resolve(&ctx.working_dir, dir)?;
            if !resolved.is_dir() {
                return Err(ToolError::BadArgs {
                    message: format!("Working directory does not exist: {}", resolved.display()),
                });
            }
            resolved
        }
        None => ctx.working_dir.clone(),
    };

    let mut std_cmd = std::process::Command::new(&ctx.shell.binary);
    std_cmd
        .args(&ctx.shell.args)
        .arg(&spec.command)
        .current_dir(&cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    apply_sanitized_env(&mut std_cmd, &ctx.env_sanitizer);
    let mut command = Command::from(std_cmd);
    set_new_session(&mut command);

    tracing::debug!(shell = %ctx.shell, timeout_ms = spec.timeout_ms, "Spawning command");
    let child = command
        .spawn()
        .map_err(|e| ToolError::execution(TOOL, format!("failed to spawn {}: {e}", ctx.shell)))?;
    let mut guard = ChildGuard::new(child);

    let stdout = guard
        .child_mut()
        .stdout
        .take()
        .ok_or_else(|| ToolError::execution(TOOL, "Failed to capture stdout"))?;
    let stderr = guard
        .child_mut()
        .stderr
        .take()
        .ok_or_else(|| ToolError::execution(TOOL, "Failed to capture stderr"))?;

    let max_collect = ctx.settings.run.max_output_bytes;
    let mut stdout_task = tokio::spawn(read_bounded(stdout, max_collect));
    let mut stderr_task = tokio::spawn(read_bounded(stderr, max_collect));

    // The deadline covers the shell and both pipes: a background job that
    // keeps stdout open holds the call just like a running shell would.
    let timeout = Duration::from_millis(spec.timeout_ms);
    let finished = tokio::time::timeout(timeout, async {
        let status = guard.child_mut().wait().await;
        let stdout = (&mut stdout_task).await.unwrap_or_default();
        let stderr = (&mut stderr_task).await.unwrap_or_default();
        (status, stdout, stderr)
    })
    .await;
    let Ok((status, (stdout, stdout_cut), (stderr, stderr_cut))) = finished else {
        // Dropping the armed guard kills the process group.
        drop(guard);
        stdout_task.abort();
        stderr_task.abort();
        tracing::warn!(timeout_ms = spec.timeout_ms, "Command timed out; killed");
        return Err(ToolError::Timeout {
            timeout_ms: spec.timeout_ms,
        });
    };
    guard.disarm();
    let status = status.map_err(|e| ToolError::execution(TOOL, e.to_string()))?;

    let stdout = mark_truncated(stdout, stdout_cut);
    let stderr = mark_truncated(stderr, stderr_cut);

    let exit_code = status.code().unwrap_or(-1);
    let transcript = format_transcript(spec, exit_code, &stdout, &stderr);
    if exit_code == 0 {
        Ok(ToolResult::ok(transcript))
    } else {
        Err(ToolError::CommandFailed {
            code: exit_code,
            transcript,
        })
    }
}

fn mark_truncated(mut text: String, truncated: bool) -> String {
    if truncated {
        text.push_str("\n... [output truncated]");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_clamped_never_rejected() {
        assert_eq!(CommandSpec::new("x").with_timeout_ms(200).timeout_ms(), 1_000);
        assert_eq!(CommandSpec::new("x").with_timeout_ms(999_999).timeout_ms(), 120_000);
        assert_eq!(CommandSpec::new("x").with_timeout_ms(5_000).timeout_ms(), 5_000);
        assert_eq!(CommandSpec::new("x").timeout_ms(), DEFAULT_TIMEOUT_MS);
        assert_eq!(clamp_timeout_ms(0), MIN_TIMEOUT_MS);
    }

    #[test]
    fn transcript_omits_empty_sections() {
        let spec = CommandSpec::new("true");
        assert_eq!(format_transcript(&spec, 0, "", ""), "$ true\nExit code: 0");
    }

    #[test]
    fn transcript_includes_cwd_and_both_streams() {
        let spec = CommandSpec::new("make").with_cwd("/w/app");
        let transcript = format_transcript(&spec, 2, "a\nb\n", "oops\n");
        assert_eq!(
            transcript,
            "$ make\nWorking directory: /w/app\nExit code: 2\nSTDOUT:\na\nb\nSTDERR:\noops"
        );
    }

    #[test]
    fn transcript_keeps_lines_verbatim() {
        let spec = CommandSpec::new("printf");
        let transcript = format_transcript(&spec, 0, "  indented\t$HOME <tag>\n", "");
        assert!(transcript.ends_with("STDOUT:\n  indented\t$HOME <tag>"));
    }
}
