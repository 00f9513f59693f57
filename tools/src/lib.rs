//! Tool Executor Framework - core types, helpers, and built-in tool implementations.

pub mod builtins;
pub mod code_intel;
pub mod command_blacklist;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod paths;
pub mod poll;
pub mod process;
pub mod review;
pub mod sandbox;
pub mod search;
pub mod shell;

pub use code_intel::CodeIntel;
pub use command_blacklist::CommandBlacklist;
pub use config::{ReviewTimeouts, RunConfig, SearchToolConfig, ShellConfig, ToolSettings};
pub use context::ToolContext;
pub use dispatcher::Dispatcher;
pub use review::{ReviewError, ReviewInput, ReviewOutcome, ReviewRequest, ReviewSurface};
pub use sandbox::CommandSpec;
pub use shell::DetectedShell;

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use serde_json::Value;
use tether_types::{PatchError, ToolDefinition, ToolResult};

/// Tool execution future type alias.
pub type ToolFut<'a> = Pin<Box<dyn Future<Output = Result<ToolResult, ToolError>> + Send + 'a>>;

/// Which executors a tool provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolMode {
    /// Only [`ToolExecutor::execute`]; async calls defer to it.
    Sync,
    /// Only [`ToolExecutor::execute_async`]; sync calls fail fast.
    AsyncOnly,
    Both,
}

impl ToolMode {
    #[must_use]
    pub fn has_sync(self) -> bool {
        matches!(self, Self::Sync | Self::Both)
    }
}

/// Error types for tool execution.
///
/// Never escapes the dispatcher: [`ToolError::into_result`] turns every
/// variant into a failed [`ToolResult`].
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Bad tool args: {message}")]
    BadArgs { message: String },
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },
    #[error("Tool '{tool}' is async-only; call it through execute_async")]
    AsyncOnly { tool: String },
    #[error("Missing command")]
    MissingCommand,
    #[error("Command blocked: {reason} (pattern: {pattern})")]
    CommandBlocked { pattern: String, reason: String },
    #[error("Command timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("Exit code {code}")]
    CommandFailed { code: i32, transcript: String },
    #[error("File already exists: {}", path.display())]
    FileExists { path: PathBuf },
    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },
    #[error("Invalid line range: {0}")]
    Patch(#[from] PatchError),
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error("{reason}")]
    Rejected { reason: String },
    #[error("No code intelligence client attached for {}", path.display())]
    NotAttached { path: PathBuf },
    #[error("Tool execution failed: {tool}: {message}")]
    ExecutionFailed { tool: String, message: String },
    #[error("Tool panicked: {message}")]
    Panicked { message: String },
}

impl ToolError {
    /// Convert into the failure envelope, keeping any context the error carries.
    #[must_use]
    pub fn into_result(self) -> ToolResult {
        match self {
            Self::CommandFailed { code, transcript } => {
                ToolResult::failure_with_message(format!("Exit code {code}"), transcript)
            }
            other => ToolResult::failure(other.to_string()),
        }
    }

    pub(crate) fn execution(tool: &str, message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            tool: tool.to_string(),
            message: message.into(),
        }
    }
}

/// A named, schema-described operation the model can invoke.
///
/// A tool overrides [`execute`](Self::execute), [`execute_async`](Self::execute_async)
/// or both, and declares which through [`mode`](Self::mode).
pub trait ToolExecutor: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &str;
    fn schema(&self) -> Value;
    fn mode(&self) -> ToolMode;
    fn is_side_effecting(&self) -> bool {
        false
    }
    /// Whether a human must approve the call before anything is written.
    fn requires_approval(&self) -> bool {
        false
    }
    fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        Err(ToolError::AsyncOnly {
            tool: self.name().to_string(),
        })
    }
    /// `None` means the tool has no async executor.
    fn execute_async<'a>(&'a self, _args: Value, _ctx: &'a ToolContext) -> Option<ToolFut<'a>> {
        None
    }
}

pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(args: &Value) -> Result<T, ToolError> {
    serde_json::from_value(args.clone()).map_err(|e| ToolError::BadArgs {
        message: e.to_string(),
    })
}

/// Tool registry keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    executors: HashMap<String, Box<dyn ToolExecutor>>,
}

impl ToolRegistry {
    /// Register a tool. A second registration under the same name replaces the first.
    pub fn register(&mut self, executor: Box<dyn ToolExecutor>) {
        let name = executor.name().to_string();
        if self.executors.insert(name.clone(), executor).is_some() {
            tracing::debug!(tool = %name, "Replaced previously registered tool");
        }
    }

    pub fn lookup(&self, name: &str) -> Result<&dyn ToolExecutor, ToolError> {
        self.executors
            .get(name)
            .map(AsRef::as_ref)
            .ok_or_else(|| ToolError::UnknownTool {
                name: name.to_string(),
            })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .executors
            .values()
            .map(|exec| ToolDefinition::new(exec.name(), exec.description(), exec.schema()))
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}

/// Sanitizes environment variables before executing commands.
#[derive(Debug, Clone)]
pub struct EnvSanitizer {
    denylist: globset::GlobSet,
}

impl EnvSanitizer {
    pub fn new(patterns: &[String]) -> Result<Self, ToolError> {
        let mut builder = globset::GlobSetBuilder::new();
        for pat in patterns {
            let mut glob = globset::GlobBuilder::new(pat);
            // Secret patterns match regardless of case (API_KEY, api_key).
            glob.case_insensitive(true);
            let glob = glob.build().map_err(|e| ToolError::BadArgs {
                message: format!("Invalid env denylist pattern '{pat}': {e}"),
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| ToolError::BadArgs {
            message: format!("Invalid env denylist: {e}"),
        })?;
        Ok(Self { denylist: set })
    }

    /// Sanitizer built from [`tether_types::ENV_SECRET_DENYLIST`].
    pub fn with_defaults() -> Result<Self, ToolError> {
        let patterns: Vec<String> = tether_types::ENV_SECRET_DENYLIST
            .iter()
            .map(ToString::to_string)
            .collect();
        Self::new(&patterns)
    }

    #[must_use]
    pub fn is_denied(&self, key: &str) -> bool {
        self.denylist.is_match(key)
    }
}

/// Validate arguments against a JSON schema.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), ToolError> {
    let validator = jsonschema::validator_for(schema).map_err(|e| ToolError::BadArgs {
        message: format!("Invalid tool schema: {e}"),
    })?;
    if let Err(err) = validator.validate(args) {
        return Err(ToolError::BadArgs {
            message: err.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Named(&'static str, &'static str);

    impl ToolExecutor for Named {
        fn name(&self) -> &'static str {
            self.0
        }
        fn description(&self) -> &str {
            self.1
        }
        fn schema(&self) -> Value {
            json!({ "type": "object" })
        }
        fn mode(&self) -> ToolMode {
            ToolMode::Sync
        }
        fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::ok(self.1))
        }
    }

    #[test]
    fn register_overwrites_same_name() {
        let mut registry = ToolRegistry::default();
        registry.register(Box::new(Named("echo", "first")));
        registry.register(Box::new(Named("echo", "second")));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("echo").unwrap().description(), "second");
    }

    #[test]
    fn definitions_sorted_by_name() {
        let mut registry = ToolRegistry::default();
        registry.register(Box::new(Named("zeta", "z")));
        registry.register(Box::new(Named("alpha", "a")));
        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, ["alpha", "zeta"]);
    }

    #[test]
    fn lookup_unknown_tool() {
        let registry = ToolRegistry::default();
        let err = registry.lookup("nope").err().unwrap();
        assert_eq!(err.to_string(), "Unknown tool: nope");
    }

    #[test]
    fn command_failure_keeps_transcript() {
        let result = ToolError::CommandFailed {
            code: 2,
            transcript: "$ false\nExit code: 2".to_string(),
        }
        .into_result();
        assert!(!result.is_success());
        assert_eq!(result.error(), Some("Exit code 2"));
        assert_eq!(result.message(), Some("$ false\nExit code: 2"));
    }

    #[test]
    fn contract_error_strings() {
        assert_eq!(ToolError::MissingCommand.to_string(), "Missing command");
        assert_eq!(
            ToolError::Timeout { timeout_ms: 1000 }.to_string(),
            "Command timed out after 1000ms"
        );
        assert_eq!(
            ToolError::FileExists {
                path: PathBuf::from("/w/a.txt")
            }
            .to_string(),
            "File already exists: /w/a.txt"
        );
    }

    #[test]
    fn validate_args_reports_schema_violations() {
        let schema = json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"]
        });
        assert!(validate_args(&schema, &json!({ "path": "a" })).is_ok());
        let err = validate_args(&schema, &json!({})).unwrap_err();
        assert!(matches!(err, ToolError::BadArgs { .. }));
    }

    #[test]
    fn env_sanitizer_matches_secrets_case_insensitively() {
        let sanitizer = EnvSanitizer::with_defaults().unwrap();
        for denied in ["api_key", "GITHUB_TOKEN", "LD_PRELOAD"] {
            assert!(sanitizer.is_denied(denied), "{denied}");
        }
        for allowed in ["PATH", "HOME", "TERM"] {
            assert!(!sanitizer.is_denied(allowed), "{allowed}");
        }
    }
}
