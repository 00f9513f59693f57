//! Built-in tool executors.

use std::fmt::Write as _;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Value, json};
use tether_types::{
    SkillRecord, SymbolInfo, ToolResult, apply_line_replacement, join_lines, split_lines,
};

use crate::code_intel::{wait_for_attach, wait_for_diagnostics};
use crate::context::ToolContext;
use crate::review::{DiffSession, ReviewOutcome, ReviewRequest};
use crate::sandbox::{self, CommandSpec};
use crate::search::{ListFilesTool, SearchTool};
use crate::{ToolError, ToolExecutor, ToolFut, ToolMode, ToolRegistry, parse_args, paths};

pub const READ_FILE_TOOL_NAME: &str = "read_file";
pub const CREATE_FILE_TOOL_NAME: &str = "create_file";
pub const EDIT_FILE_TOOL_NAME: &str = "edit_file";
pub const RUN_COMMAND_TOOL_NAME: &str = "run_command";
pub const DOCUMENT_SYMBOLS_TOOL_NAME: &str = "document_symbols";
pub const WORKSPACE_SYMBOLS_TOOL_NAME: &str = "workspace_symbols";
pub const DIAGNOSTICS_TOOL_NAME: &str = "diagnostics";
pub const SKILL_TOOL_NAME: &str = "skill";

/// Bytes sniffed for NUL to tell binary files apart.
const BINARY_SNIFF_BYTES: usize = 8192;

/// Register every built-in tool. `skills` feeds the `skill` tool.
pub fn register_builtins(registry: &mut ToolRegistry, skills: Vec<SkillRecord>) {
    registry.register(Box::new(ReadFileTool));
    registry.register(Box::new(ListFilesTool));
    registry.register(Box::new(SearchTool));
    registry.register(Box::new(CreateFileTool));
    registry.register(Box::new(EditFileTool));
    registry.register(Box::new(RunCommandTool));
    registry.register(Box::new(DocumentSymbolsTool));
    registry.register(Box::new(WorkspaceSymbolsTool));
    registry.register(Box::new(DiagnosticsTool));
    registry.register(Box::new(SkillTool::new(skills)));
}

// ---------------------------------------------------------------------------
// read_file
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ReadFileArgs {
    path: PathBuf,
    start_line: Option<usize>,
    end_line: Option<usize>,
}

pub struct ReadFileTool;

impl ToolExecutor for ReadFileTool {
    fn name(&self) -> &'static str {
        READ_FILE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Read file contents with line numbers, optionally by line range"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "path": { "type": "string", "description": "Absolute or relative file path to read" },
                "start_line": { "type": "integer", "minimum": 1, "description": "First line to read (1-indexed). Omit to start from the beginning." },
                "end_line": { "type": "integer", "minimum": 1, "description": "Last line to read, inclusive (1-indexed). Omit to read to end of file." }
            },
            "required": ["path"]
        })
    }

    fn mode(&self) -> ToolMode {
        ToolMode::Sync
    }

    fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let typed: ReadFileArgs = parse_args(&args)?;
        if let (Some(start), Some(end)) = (typed.start_line, typed.end_line)
            && start > end
        {
            return Err(ToolError::BadArgs {
                message: "start_line must be <= end_line".to_string(),
            });
        }

        let path = paths::resolve(&ctx.working_dir, &typed.path)?;
        let meta =
            std::fs::metadata(&path).map_err(|e| not_found_or(&path, READ_FILE_TOOL_NAME, &e))?;
        if meta.is_dir() {
            return Err(ToolError::execution(READ_FILE_TOOL_NAME, "path is a directory"));
        }
        if sniff_binary(&path)
            .map_err(|e| ToolError::execution(READ_FILE_TOOL_NAME, e.to_string()))?
        {
            return Err(ToolError::execution(
                READ_FILE_TOOL_NAME,
                "binary file; refusing to print it",
            ));
        }

        let limit = ctx.settings.read_file.max_file_read_bytes;
        let start = typed.start_line.unwrap_or(1);
        let content = match typed.end_line {
            None if start == 1 => {
                if meta.len() > limit {
                    return Err(ToolError::execution(
                        READ_FILE_TOOL_NAME,
                        format!(
                            "file is {} bytes, over the {limit} byte limit; read it by line range",
                            meta.len()
                        ),
                    ));
                }
                let bytes = std::fs::read(&path)
                    .map_err(|e| ToolError::execution(READ_FILE_TOOL_NAME, e.to_string()))?;
                String::from_utf8_lossy(&bytes).into_owned()
            }
            end => read_text_range(&path, start, end.unwrap_or(usize::MAX), limit)?,
        };

        if content.is_empty() {
            if start > 1 {
                return Err(ToolError::BadArgs {
                    message: format!("start_line {start} is past the end of the file"),
                });
            }
            return Ok(ToolResult::ok("(empty file)"));
        }
        Ok(ToolResult::ok(format_with_line_numbers(&content, start)))
    }
}

fn not_found_or(path: &Path, tool: &str, err: &std::io::Error) -> ToolError {
    if err.kind() == ErrorKind::NotFound {
        ToolError::FileNotFound {
            path: path.to_path_buf(),
        }
    } else {
        ToolError::execution(tool, err.to_string())
    }
}

fn sniff_binary(path: &Path) -> std::io::Result<bool> {
    let mut file = std::fs::File::open(path)?;
    let mut buf = [0u8; BINARY_SNIFF_BYTES];
    let n = file.read(&mut buf)?;
    Ok(buf[..n].contains(&0))
}

/// Lines `start..=end` of `path`, scanning at most `max_scan_bytes`.
fn read_text_range(
    path: &Path,
    start: usize,
    end: usize,
    max_scan_bytes: u64,
) -> Result<String, ToolError> {
    let io_err = |e: std::io::Error| ToolError::execution(READ_FILE_TOOL_NAME, e.to_string());
    let file = std::fs::File::open(path).map_err(io_err)?;
    let mut reader = BufReader::new(file);
    let mut output = String::new();
    let mut line_num = 1usize;
    let mut scanned = 0u64;
    let mut line = Vec::new();

    loop {
        line.clear();
        let bytes = reader.read_until(b'\n', &mut line).map_err(io_err)?;
        if bytes == 0 {
            break;
        }
        scanned += bytes as u64;
        if scanned > max_scan_bytes {
            return Err(ToolError::execution(
                READ_FILE_TOOL_NAME,
                "scan limit exceeded; narrow the range",
            ));
        }
        if line_num >= start {
            output.push_str(&String::from_utf8_lossy(&line));
        }
        if line_num >= end {
            break;
        }
        line_num += 1;
    }
    Ok(output)
}

fn format_with_line_numbers(content: &str, start_line: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let width = (start_line + lines.len() - 1).to_string().len();
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let _ = writeln!(out, "{:>width$}| {line}", start_line + i);
    }
    out.pop();
    out
}

// ---------------------------------------------------------------------------
// create_file / edit_file
// ---------------------------------------------------------------------------

/// Turn a finished review into the tool's result.
fn review_result(headline: String, outcome: ReviewOutcome) -> Result<ToolResult, ToolError> {
    match outcome {
        ReviewOutcome::Accepted { diagnostics, stats } => {
            let mut message = format!("{headline} ({stats})");
            if !diagnostics.is_empty() {
                message.push_str("\n\nErrors after this change:");
                for diag in &diagnostics {
                    let _ = write!(message, "\n{diag}");
                }
            }
            Ok(ToolResult::ok(message).with_diagnostics(diagnostics))
        }
        ReviewOutcome::Rejected { reason } => Err(ToolError::Rejected { reason }),
    }
}

async fn review(ctx: &ToolContext, request: ReviewRequest) -> Result<ReviewOutcome, ToolError> {
    let session = DiffSession::open(&ctx.review, request)?;
    Ok(session.run(ctx.code_intel(), ctx.diagnostics_timeout()).await)
}

#[derive(Debug, Deserialize)]
struct CreateFileArgs {
    path: PathBuf,
    content: String,
}

/// Create a new file after the user approves it.
pub struct CreateFileTool;

impl ToolExecutor for CreateFileTool {
    fn name(&self) -> &'static str {
        CREATE_FILE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Create a new file with the given content. The user reviews the file before it is \
         written. Fails if the file already exists; use edit_file to change existing files."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "path": { "type": "string", "description": "Path of the file to create" },
                "content": { "type": "string", "description": "Full file content" }
            },
            "required": ["path", "content"]
        })
    }

    fn mode(&self) -> ToolMode {
        ToolMode::AsyncOnly
    }

    fn is_side_effecting(&self) -> bool {
        true
    }

    fn requires_approval(&self) -> bool {
        true
    }

    fn execute_async<'a>(&'a self, args: Value, ctx: &'a ToolContext) -> Option<ToolFut<'a>> {
        Some(Box::pin(async move {
            let typed: CreateFileArgs = parse_args(&args)?;
            let path = paths::resolve(&ctx.working_dir, &typed.path)?;
            if std::fs::symlink_metadata(&path).is_ok() {
                return Err(ToolError::FileExists { path });
            }

            let shown = paths::display(&ctx.working_dir, &path);
            let request = ReviewRequest::new(path, String::new(), typed.content, true);
            let outcome = review(ctx, request).await?;
            review_result(format!("Created {shown}"), outcome)
        }))
    }
}

#[derive(Debug, Deserialize)]
struct EditFileArgs {
    path: PathBuf,
    start_line: usize,
    end_line: usize,
    new_lines: Vec<String>,
}

/// Replace a line range of an existing file after the user approves it.
pub struct EditFileTool;

impl ToolExecutor for EditFileTool {
    fn name(&self) -> &'static str {
        EDIT_FILE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Replace lines start_line..=end_line (1-indexed) of an existing file with new_lines. \
         To insert without removing, set end_line to start_line - 1. An empty new_lines \
         deletes the range. The user reviews the change before it is written."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "path": { "type": "string", "description": "File to edit" },
                "start_line": { "type": "integer", "minimum": 1, "description": "First line to replace (1-indexed)" },
                "end_line": { "type": "integer", "minimum": 0, "description": "Last line to replace, inclusive. Less than start_line inserts before start_line." },
                "new_lines": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Replacement lines, without trailing newlines"
                }
            },
            "required": ["path", "start_line", "end_line", "new_lines"]
        })
    }

    fn mode(&self) -> ToolMode {
        ToolMode::AsyncOnly
    }

    fn is_side_effecting(&self) -> bool {
        true
    }

    fn requires_approval(&self) -> bool {
        true
    }

    fn execute_async<'a>(&'a self, args: Value, ctx: &'a ToolContext) -> Option<ToolFut<'a>> {
        Some(Box::pin(async move {
            let typed: EditFileArgs = parse_args(&args)?;
            let path = paths::resolve(&ctx.working_dir, &typed.path)?;
            if path.is_dir() {
                return Err(ToolError::execution(EDIT_FILE_TOOL_NAME, "path is a directory"));
            }
            let original = std::fs::read_to_string(&path)
                .map_err(|e| not_found_or(&path, EDIT_FILE_TOOL_NAME, &e))?;

            let lines = split_lines(&original);
            let patched =
                apply_line_replacement(&lines, typed.start_line, typed.end_line, &typed.new_lines)?;
            let proposed = render_like(&patched, &original);

            let shown = paths::display(&ctx.working_dir, &path);
            if proposed == original {
                return Ok(ToolResult::ok(format!("No changes to {shown}")));
            }
            let request = ReviewRequest::new(path, original, proposed, false);
            let outcome = review(ctx, request).await?;
            review_result(format!("Applied edit to {shown}"), outcome)
        }))
    }
}

/// Join `lines` keeping the original's line ending style and final newline.
fn render_like(lines: &[String], original: &str) -> String {
    let mut text = join_lines(lines);
    if !original.is_empty() && !original.ends_with('\n') {
        text.pop();
    }
    if original.contains("\r\n") {
        text = text.replace('\n', "\r\n");
    }
    text
}

// ---------------------------------------------------------------------------
// run_command
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RunCommandArgs {
    #[serde(default)]
    command: Option<String>,
    cwd: Option<PathBuf>,
    timeout_ms: Option<u64>,
}

pub struct RunCommandTool;

impl ToolExecutor for RunCommandTool {
    fn name(&self) -> &'static str {
        RUN_COMMAND_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Run a shell command and return a transcript with the exit code, stdout and stderr. \
         Destructive system commands are blocked. The timeout is clamped to 1000..=120000 ms."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "command": { "type": "string", "description": "Command line passed to the shell" },
                "cwd": { "type": "string", "description": "Working directory. Defaults to the workspace root." },
                "timeout_ms": { "type": "integer", "minimum": 0, "description": "Timeout in milliseconds (default 30000)" }
            }
        })
    }

    fn mode(&self) -> ToolMode {
        ToolMode::AsyncOnly
    }

    fn is_side_effecting(&self) -> bool {
        true
    }

    fn execute_async<'a>(&'a self, args: Value, ctx: &'a ToolContext) -> Option<ToolFut<'a>> {
        Some(Box::pin(async move {
            let typed: RunCommandArgs = parse_args(&args)?;
            let command = typed.command.ok_or(ToolError::MissingCommand)?;
            let timeout_ms = typed
                .timeout_ms
                .unwrap_or(ctx.settings.run.default_timeout_ms);
            let mut spec = CommandSpec::new(command).with_timeout_ms(timeout_ms);
            if let Some(cwd) = typed.cwd {
                spec = spec.with_cwd(cwd);
            }
            sandbox::run(&spec, ctx).await
        }))
    }
}

// ---------------------------------------------------------------------------
// Code intelligence
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PathArgs {
    path: PathBuf,
}

fn path_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "path": { "type": "string", "description": description }
        },
        "required": ["path"]
    })
}

pub struct DocumentSymbolsTool;

impl ToolExecutor for DocumentSymbolsTool {
    fn name(&self) -> &'static str {
        DOCUMENT_SYMBOLS_TOOL_NAME
    }

    fn description(&self) -> &str {
        "List the symbols (functions, types, fields, ...) defined in a file, with line numbers"
    }

    fn schema(&self) -> Value {
        path_schema("File to list symbols for")
    }

    fn mode(&self) -> ToolMode {
        ToolMode::AsyncOnly
    }

    fn execute_async<'a>(&'a self, args: Value, ctx: &'a ToolContext) -> Option<ToolFut<'a>> {
        Some(Box::pin(async move {
            let typed: PathArgs = parse_args(&args)?;
            let path = paths::resolve(&ctx.working_dir, &typed.path)?;
            let not_attached = || ToolError::NotAttached { path: path.clone() };
            let intel = ctx.code_intel().ok_or_else(not_attached)?;
            if !wait_for_attach(intel, &path, ctx.attach_timeout()).await {
                return Err(not_attached());
            }

            let symbols = intel
                .document_symbols(&path)
                .await
                .map_err(|e| ToolError::execution(DOCUMENT_SYMBOLS_TOOL_NAME, format!("{e:#}")))?;
            let shown = paths::display(&ctx.working_dir, &path);
            if symbols.is_empty() {
                return Ok(ToolResult::ok(format!("No symbols found in {shown}")));
            }
            let lines: Vec<String> = symbols.iter().map(SymbolInfo::display_line).collect();
            Ok(ToolResult::ok(lines.join("\n")))
        }))
    }
}

#[derive(Debug, Deserialize)]
struct WorkspaceSymbolsArgs {
    query: String,
}

pub struct WorkspaceSymbolsTool;

impl ToolExecutor for WorkspaceSymbolsTool {
    fn name(&self) -> &'static str {
        WORKSPACE_SYMBOLS_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Find symbols by name across the workspace using the running language servers"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "query": { "type": "string", "description": "Symbol name or fragment to look for" }
            },
            "required": ["query"]
        })
    }

    fn mode(&self) -> ToolMode {
        ToolMode::AsyncOnly
    }

    fn execute_async<'a>(&'a self, args: Value, ctx: &'a ToolContext) -> Option<ToolFut<'a>> {
        Some(Box::pin(async move {
            let typed: WorkspaceSymbolsArgs = parse_args(&args)?;
            let intel = ctx.code_intel().ok_or_else(|| {
                ToolError::execution(
                    WORKSPACE_SYMBOLS_TOOL_NAME,
                    "no code intelligence provider is configured",
                )
            })?;
            let mut symbols = intel
                .workspace_symbols(&typed.query)
                .await
                .map_err(|e| ToolError::execution(WORKSPACE_SYMBOLS_TOOL_NAME, format!("{e:#}")))?;
            if symbols.is_empty() {
                return Ok(ToolResult::ok(format!("No symbols match '{}'", typed.query)));
            }
            for symbol in &mut symbols {
                if let Some(file) = symbol.file.take() {
                    symbol.file = Some(PathBuf::from(paths::display(&ctx.working_dir, &file)));
                }
            }
            let lines: Vec<String> = symbols.iter().map(SymbolInfo::display_line).collect();
            Ok(ToolResult::ok(lines.join("\n")))
        }))
    }
}

pub struct DiagnosticsTool;

impl ToolExecutor for DiagnosticsTool {
    fn name(&self) -> &'static str {
        DIAGNOSTICS_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Report compiler or linter errors for a file"
    }

    fn schema(&self) -> Value {
        path_schema("File to check")
    }

    fn mode(&self) -> ToolMode {
        ToolMode::AsyncOnly
    }

    fn execute_async<'a>(&'a self, args: Value, ctx: &'a ToolContext) -> Option<ToolFut<'a>> {
        Some(Box::pin(async move {
            let typed: PathArgs = parse_args(&args)?;
            let path = paths::resolve(&ctx.working_dir, &typed.path)?;
            let text = std::fs::read_to_string(&path)
                .map_err(|e| not_found_or(&path, DIAGNOSTICS_TOOL_NAME, &e))?;
            let not_attached = || ToolError::NotAttached { path: path.clone() };
            let intel = ctx.code_intel().ok_or_else(not_attached)?;
            if !wait_for_attach(intel, &path, ctx.attach_timeout()).await {
                return Err(not_attached());
            }

            // Make sure the server has seen the file before asking about it.
            intel.file_changed(&path, &text).await;
            let diagnostics =
                wait_for_diagnostics(intel, &path, ctx.diagnostics_timeout()).await;

            let shown = paths::display(&ctx.working_dir, &path);
            let message = if diagnostics.is_empty() {
                format!("No errors reported for {shown}")
            } else {
                let mut message = format!("{} error(s) in {shown}:", diagnostics.len());
                for diag in &diagnostics {
                    let _ = write!(message, "\n{diag}");
                }
                message
            };
            Ok(ToolResult::ok(message).with_diagnostics(diagnostics))
        }))
    }
}

// ---------------------------------------------------------------------------
// skill
// ---------------------------------------------------------------------------

pub const SKILL_FILE_NAME: &str = "SKILL.md";

#[derive(Debug, Deserialize)]
struct SkillArgs {
    name: String,
}

/// Serves the instructions of configured skills.
pub struct SkillTool {
    skills: Vec<SkillRecord>,
    description: String,
}

impl SkillTool {
    #[must_use]
    pub fn new(mut skills: Vec<SkillRecord>) -> Self {
        skills.sort_by(|a, b| a.name.cmp(&b.name));
        let mut description =
            "Load the full instructions of a skill by name before doing the task it covers."
                .to_string();
        if skills.is_empty() {
            description.push_str(" No skills are configured.");
        } else {
            description.push_str("\n\nAvailable skills:");
            for skill in &skills {
                let _ = write!(description, "\n- {}: {}", skill.name, skill.description);
            }
        }
        Self {
            skills,
            description,
        }
    }

    fn available(&self) -> String {
        if self.skills.is_empty() {
            return "none".to_string();
        }
        self.skills
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl ToolExecutor for SkillTool {
    fn name(&self) -> &'static str {
        SKILL_TOOL_NAME
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "name": { "type": "string", "description": "Name of the skill to load" }
            },
            "required": ["name"]
        })
    }

    fn mode(&self) -> ToolMode {
        ToolMode::Sync
    }

    fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let typed: SkillArgs = parse_args(&args)?;
        let Some(skill) = self.skills.iter().find(|s| s.name.as_str() == typed.name) else {
            return Err(ToolError::execution(
                SKILL_TOOL_NAME,
                format!(
                    "Unknown skill '{}'. Available skills: {}",
                    typed.name,
                    self.available()
                ),
            ));
        };
        let file = skill.path.join(SKILL_FILE_NAME);
        let text = std::fs::read_to_string(&file).map_err(|e| {
            ToolError::execution(
                SKILL_TOOL_NAME,
                format!("failed to read {}: {e}", file.display()),
            )
        })?;
        Ok(ToolResult::ok(text))
    }
}
