//! `list_files` and `search`: thin wrappers over an external line-oriented
//! search utility (ripgrep by default).
//!
//! Exit status 0 and 1 both mean the utility ran (1 is "nothing matched");
//! anything else is a hard error carrying the utility's stderr. Both paths
//! run under `[tools.search] default_timeout_ms` and kill the utility when it
//! runs out.

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{Value, json};
use tether_types::ToolResult;

use crate::context::ToolContext;
use crate::process::apply_sanitized_env;
use crate::{ToolError, ToolExecutor, ToolFut, ToolMode, parse_args, paths};

pub const LIST_FILES_TOOL_NAME: &str = "list_files";
pub const SEARCH_TOOL_NAME: &str = "search";

const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Deserialize)]
struct ListFilesArgs {
    pattern: String,
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    pattern: String,
    path: Option<PathBuf>,
    glob: Option<String>,
    #[serde(default)]
    case_insensitive: bool,
}

/// What to say when the utility found nothing.
#[derive(Clone, Copy)]
struct Interpretation {
    tool: &'static str,
    empty_message: &'static str,
    sort: bool,
}

/// Base command: configured binary, scrubbed env, cwd at the working dir.
fn base_command(ctx: &ToolContext) -> Command {
    let mut cmd = Command::new(&ctx.settings.search.binary);
    cmd.current_dir(&ctx.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    apply_sanitized_env(&mut cmd, &ctx.env_sanitizer);
    cmd
}

/// Search root argument, relative when it lies inside the working dir.
fn root_arg(ctx: &ToolContext, raw: Option<&PathBuf>) -> Result<Option<String>, ToolError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let resolved = paths::resolve(&ctx.working_dir, raw)?;
    if !resolved.exists() {
        return Err(ToolError::FileNotFound { path: resolved });
    }
    if resolved == ctx.working_dir {
        return Ok(None);
    }
    Ok(Some(paths::display(&ctx.working_dir, &resolved)))
}

fn list_files_command(args: &Value, ctx: &ToolContext) -> Result<Command, ToolError> {
    let typed: ListFilesArgs = parse_args(args)?;
    let mut cmd = base_command(ctx);
    cmd.args(["--files", "--color", "never", "--glob", &typed.pattern]);
    if let Some(root) = root_arg(ctx, typed.path.as_ref())? {
        cmd.arg(root);
    }
    Ok(cmd)
}

fn search_command(args: &Value, ctx: &ToolContext) -> Result<Command, ToolError> {
    let typed: SearchArgs = parse_args(args)?;
    let mut cmd = base_command(ctx);
    cmd.args(["--line-number", "--no-heading", "--color", "never"]);
    if typed.case_insensitive {
        cmd.arg("--ignore-case");
    }
    if let Some(glob) = &typed.glob {
        cmd.args(["--glob", glob]);
    }
    cmd.args(["-e", &typed.pattern]);
    if let Some(root) = root_arg(ctx, typed.path.as_ref())? {
        cmd.arg(root);
    }
    Ok(cmd)
}

fn interpret(
    how: Interpretation,
    output: io::Result<Output>,
    ctx: &ToolContext,
) -> Result<ToolResult, ToolError> {
    let binary = &ctx.settings.search.binary;
    let output = output.map_err(|e| {
        let detail = if e.kind() == io::ErrorKind::TimedOut {
            format!(
                "{binary} timed out after {}ms",
                ctx.settings.search.default_timeout_ms
            )
        } else {
            format!("failed to run {binary}: {e}")
        };
        ToolError::execution(how.tool, detail)
    })?;
    match output.status.code() {
        Some(0 | 1) => {}
        code => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}"));
            return Err(ToolError::execution(
                how.tool,
                format!("{binary} exited with {code}: {}", stderr.trim()),
            ));
        }
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut lines: Vec<&str> = stdout.lines().filter(|l| !l.is_empty()).collect();
    if lines.is_empty() {
        return Ok(ToolResult::ok(how.empty_message));
    }
    if how.sort {
        lines.sort_unstable();
    }

    let max = ctx.settings.search.max_results;
    let total = lines.len();
    let mut message = lines[..total.min(max)].join("\n");
    if total > max {
        message.push_str(&format!("\n... ({} more results truncated)", total - max));
    }
    Ok(ToolResult::ok(message))
}

fn timeout_of(ctx: &ToolContext) -> Duration {
    Duration::from_millis(ctx.settings.search.default_timeout_ms)
}

fn timed_out() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "search deadline exceeded")
}

/// Blocking run with a deadline. Pipes drain on their own threads so a
/// chatty utility never stalls on a full pipe while we poll for exit.
fn run_sync(mut cmd: Command, timeout: Duration) -> io::Result<Output> {
    let deadline = Instant::now() + timeout;
    let mut child = cmd.spawn()?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_reader = thread::spawn(move || drain(stdout));
    let stderr_reader = thread::spawn(move || drain(stderr));

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() < deadline => thread::sleep(SYNC_POLL_INTERVAL),
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(timed_out());
            }
            Err(e) => {
                let _ = child.kill();
                return Err(e);
            }
        }
    };
    Ok(Output {
        status,
        stdout: stdout_reader.join().unwrap_or_default(),
        stderr: stderr_reader.join().unwrap_or_default(),
    })
}

fn drain<R: Read>(reader: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        let _ = reader.read_to_end(&mut buf);
    }
    buf
}

async fn run_async(cmd: Command, timeout: Duration) -> io::Result<Output> {
    let mut cmd = tokio::process::Command::from(cmd);
    cmd.kill_on_drop(true);
    // Dropping the output future on expiry kills the child.
    tokio::time::timeout(timeout, cmd.output())
        .await
        .unwrap_or_else(|_| Err(timed_out()))
}

/// Files under a directory whose path matches a glob.
pub struct ListFilesTool;

const LIST_FILES: Interpretation = Interpretation {
    tool: LIST_FILES_TOOL_NAME,
    empty_message: "No files match pattern",
    sort: true,
};

impl ToolExecutor for ListFilesTool {
    fn name(&self) -> &'static str {
        LIST_FILES_TOOL_NAME
    }

    fn description(&self) -> &str {
        "List files whose path matches a glob (e.g. '**/*.rs'). Respects .gitignore. \
         Use search to look inside files."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "pattern": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Glob matched against file paths, e.g. 'src/**/*.rs'."
                },
                "path": {
                    "type": "string",
                    "description": "Directory to list. Defaults to the working directory."
                }
            },
            "required": ["pattern"]
        })
    }

    fn mode(&self) -> ToolMode {
        ToolMode::Both
    }

    fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let cmd = list_files_command(&args, ctx)?;
        interpret(LIST_FILES, run_sync(cmd, timeout_of(ctx)), ctx)
    }

    fn execute_async<'a>(&'a self, args: Value, ctx: &'a ToolContext) -> Option<ToolFut<'a>> {
        Some(Box::pin(async move {
            let cmd = list_files_command(&args, ctx)?;
            interpret(LIST_FILES, run_async(cmd, timeout_of(ctx)).await, ctx)
        }))
    }
}

/// Regex search over file contents.
pub struct SearchTool;

const SEARCH: Interpretation = Interpretation {
    tool: SEARCH_TOOL_NAME,
    empty_message: "No matches",
    sort: false,
};

impl ToolExecutor for SearchTool {
    fn name(&self) -> &'static str {
        SEARCH_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search file contents with a regular expression. Results are 'path:line:text'. \
         Only 'pattern' is required."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "pattern": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Regular expression to search for."
                },
                "path": {
                    "type": "string",
                    "description": "File or directory to search. Defaults to the working directory."
                },
                "glob": {
                    "type": "string",
                    "description": "Only search files matching this glob, e.g. '*.rs'."
                },
                "case_insensitive": {
                    "type": "boolean",
                    "default": false
                }
            },
            "required": ["pattern"]
        })
    }

    fn mode(&self) -> ToolMode {
        ToolMode::Both
    }

    fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let cmd = search_command(&args, ctx)?;
        interpret(SEARCH, run_sync(cmd, timeout_of(ctx)), ctx)
    }

    fn execute_async<'a>(&'a self, args: Value, ctx: &'a ToolContext) -> Option<ToolFut<'a>> {
        Some(Box::pin(async move {
            let cmd = search_command(&args, ctx)?;
            interpret(SEARCH, run_async(cmd, timeout_of(ctx)).await, ctx)
        }))
    }
}
