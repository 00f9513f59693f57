//! Core domain types for Tether.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod patch;
mod skill;
mod symbol;

pub use patch::{PatchError, apply_line_replacement, join_lines, split_lines};
pub use skill::{InvalidSkillName, SKILL_NAME_MAX_LEN, SkillName, SkillRecord};
pub use symbol::{SymbolInfo, SymbolKind};

use serde::{Deserialize, Serialize};

// ============================================================================
// Environment
// ============================================================================

/// Glob patterns for environment variables that never reach a child process.
///
/// Matched case-insensitively against variable names. Shared by the command
/// runner and the language-server launcher.
pub const ENV_SECRET_DENYLIST: &[&str] = &[
    "*_KEY",
    "*_SECRET",
    "*_TOKEN",
    "*_PASSWORD",
    "*_CREDENTIAL*",
    "AWS_*",
    "ANTHROPIC_*",
    "OPENAI_*",
    "GITHUB_TOKEN",
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "DYLD_*",
];

// ============================================================================
// Tool Calling Types
// ============================================================================

/// Definition of a tool advertised to the model.
///
/// This follows the standard function calling schema: a name, a description
/// and a JSON Schema describing the accepted parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The name of the tool (function name).
    pub name: String,
    /// A description of what the tool does.
    pub description: String,
    /// JSON Schema describing the tool's parameters.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A static-analysis finding reported back with a tool result.
///
/// Line and column are 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl Diagnostic {
    pub fn new(line: u32, column: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

/// The uniform outcome envelope of every tool call.
///
/// Fields are private so a successful result can never carry an error.
/// A failed result may still carry a `message` with context, such as the
/// transcript of a command that exited non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolResult {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostics: Option<Vec<Diagnostic>>,
}

impl ToolResult {
    /// Successful result with a human-readable payload.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
            diagnostics: None,
        }
    }

    /// Failed result with only a reason.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            diagnostics: None,
        }
    }

    /// Failed result that still carries context for the caller.
    pub fn failure_with_message(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            error: Some(error.into()),
            diagnostics: None,
        }
    }

    /// Attach diagnostics. An empty list is kept as `Some(vec![])` so callers
    /// can tell "checked, nothing found" from "not checked".
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn diagnostics(&self) -> Option<&[Diagnostic]> {
        self.diagnostics.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_result_never_carries_error() {
        let result = ToolResult::ok("done");
        assert!(result.is_success());
        assert_eq!(result.message(), Some("done"));
        assert!(result.error().is_none());
        assert!(result.diagnostics().is_none());
    }

    #[test]
    fn failure_can_keep_context() {
        let result = ToolResult::failure_with_message("Exit code 2", "$ false\nExit code: 2");
        assert!(!result.is_success());
        assert_eq!(result.error(), Some("Exit code 2"));
        assert!(result.message().unwrap().contains("Exit code: 2"));
    }

    #[test]
    fn serialization_omits_absent_fields() {
        let json = serde_json::to_value(ToolResult::failure("Unknown tool: nope")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"success": false, "error": "Unknown tool: nope"})
        );
    }

    #[test]
    fn empty_diagnostics_are_serialized() {
        let json =
            serde_json::to_value(ToolResult::ok("written").with_diagnostics(vec![])).unwrap();
        assert_eq!(json["diagnostics"], serde_json::json!([]));
    }

    #[test]
    fn diagnostic_display_is_one_indexed_text() {
        let diag = Diagnostic::new(3, 7, "expected `;`");
        assert_eq!(diag.to_string(), "3:7: expected `;`");
    }

    #[test]
    fn tool_definition_serializes_parameters() {
        let def = ToolDefinition::new(
            "read_file",
            "Read a file",
            serde_json::json!({"type": "object"}),
        );
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["name"], "read_file");
        assert_eq!(json["parameters"]["type"], "object");
    }
}
