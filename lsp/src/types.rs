//! Public types consumed by the tool layer.
//!
//! The tool layer constructs an [`LspConfig`], and reads [`ServerDiagnostic`]s
//! back out of the manager after files change.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tether_types::Diagnostic;

use crate::server::RunningServer;

/// Configuration for the LSP client subsystem.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LspConfig {
    /// Whether the LSP client is enabled. Default: false.
    #[serde(default)]
    pub enabled: bool,
    /// Per-language server configurations, keyed by name (e.g. "rust").
    #[serde(default)]
    pub servers: HashMap<String, ServerConfig>,
}

/// Configuration for a single language server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Executable command (e.g. "rust-analyzer").
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// LSP language identifier (e.g. "rust", "python").
    pub language_id: String,
    /// File extensions this server handles (e.g. `["rs"]`).
    #[serde(default)]
    pub file_extensions: Vec<String>,
    /// Files that mark a project root (e.g. `["Cargo.toml"]`). See
    /// [`ServerConfig::resolve_root`].
    #[serde(default)]
    pub root_markers: Vec<String>,
}

impl ServerConfig {
    /// Root directory to launch this server in for a file under `file_dir`.
    ///
    /// The nearest ancestor holding a root marker wins, but the search never
    /// leaves `workspace_root`; without a match the workspace root is used.
    #[must_use]
    pub fn resolve_root(&self, file_dir: &Path, workspace_root: &Path) -> PathBuf {
        file_dir
            .ancestors()
            .take_while(|dir| dir.starts_with(workspace_root))
            .find(|dir| self.root_markers.iter().any(|m| dir.join(m).exists()))
            .unwrap_or(workspace_root)
            .to_path_buf()
    }

    #[must_use]
    pub fn handles_extension(&self, ext: &str) -> bool {
        self.file_extensions.iter().any(|e| e == ext)
    }
}

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticSeverity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl DiagnosticSeverity {
    /// Convert from LSP numeric severity (1=Error, 2=Warning, 3=Info, 4=Hint).
    #[must_use]
    pub fn from_lsp(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Error),
            2 => Some(Self::Warning),
            3 => Some(Self::Information),
            4 => Some(Self::Hint),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "info",
            Self::Hint => "hint",
        }
    }
}

/// A diagnostic exactly as a language server published it.
///
/// Positions are 0-indexed, as on the wire. [`ServerDiagnostic::to_tool_diagnostic`]
/// is the single place they become 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDiagnostic {
    severity: DiagnosticSeverity,
    message: String,
    line: u32,
    col: u32,
    source: String,
}

impl ServerDiagnostic {
    #[must_use]
    pub fn new(
        severity: DiagnosticSeverity,
        message: String,
        line: u32,
        col: u32,
        source: String,
    ) -> Self {
        Self {
            severity,
            message,
            line,
            col,
            source,
        }
    }

    #[must_use]
    pub fn severity(&self) -> DiagnosticSeverity {
        self.severity
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 0-indexed line number.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// 0-indexed column.
    #[must_use]
    pub fn col(&self) -> u32 {
        self.col
    }

    /// Source of the diagnostic (e.g. "rustc", "clippy").
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// 1-indexed record for tool results. The source is folded into the message.
    #[must_use]
    pub fn to_tool_diagnostic(&self) -> Diagnostic {
        Diagnostic::new(
            self.line + 1,
            self.col + 1,
            format!("[{}] {}", self.source, self.message),
        )
    }
}

/// Events flowing from server tasks to the manager.
pub(crate) enum LspEvent {
    /// A server finished its initialize handshake and can take requests.
    ServerReady {
        server: String,
        handle: Box<RunningServer>,
    },
    ServerStopped {
        server: String,
        reason: ServerStopReason,
    },
    Diagnostics {
        path: PathBuf,
        items: Vec<ServerDiagnostic>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerStopReason {
    Exited,
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_from_lsp() {
        assert_eq!(DiagnosticSeverity::from_lsp(1), Some(DiagnosticSeverity::Error));
        assert_eq!(DiagnosticSeverity::from_lsp(4), Some(DiagnosticSeverity::Hint));
        assert_eq!(DiagnosticSeverity::from_lsp(0), None);
        assert_eq!(DiagnosticSeverity::from_lsp(9), None);
        assert!(DiagnosticSeverity::Error.is_error());
        assert!(!DiagnosticSeverity::Warning.is_error());
    }

    #[test]
    fn tool_diagnostic_is_one_indexed() {
        let diag = ServerDiagnostic::new(
            DiagnosticSeverity::Error,
            "expected `;`".to_string(),
            10,
            5,
            "rustc".to_string(),
        );
        let tool = diag.to_tool_diagnostic();
        assert_eq!(tool.line, 11);
        assert_eq!(tool.column, 6);
        assert_eq!(tool.message, "[rustc] expected `;`");
    }

    #[test]
    fn config_defaults() {
        let config: LspConfig = serde_json::from_str("{}").unwrap();
        assert!(!config.enabled);
        assert!(config.servers.is_empty());
    }

    #[test]
    fn config_with_server() {
        let config: LspConfig = serde_json::from_value(serde_json::json!({
            "enabled": true,
            "servers": {
                "rust": {
                    "command": "rust-analyzer",
                    "language_id": "rust",
                    "file_extensions": ["rs"],
                    "root_markers": ["Cargo.toml"]
                }
            }
        }))
        .unwrap();
        let rust = &config.servers["rust"];
        assert_eq!(rust.command, "rust-analyzer");
        assert_eq!(rust.file_extensions, vec!["rs"]);
        assert!(rust.args.is_empty());
    }

    #[test]
    fn resolve_root_finds_nearest_marker_within_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().join("repo");
        let nested = workspace.join("crates/inner/src");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(workspace.join("crates/inner/Cargo.toml"), "").unwrap();
        // A marker above the workspace must never be chosen.
        std::fs::write(dir.path().join("Cargo.toml"), "").unwrap();

        let config = ServerConfig {
            command: "rust-analyzer".to_string(),
            args: vec![],
            language_id: "rust".to_string(),
            file_extensions: vec!["rs".to_string()],
            root_markers: vec!["Cargo.toml".to_string()],
        };
        assert_eq!(
            config.resolve_root(&nested, &workspace),
            workspace.join("crates/inner")
        );
        assert!(config.handles_extension("rs"));
        assert!(!config.handles_extension("py"));

        let bare = ServerConfig {
            root_markers: vec![],
            ..config
        };
        assert_eq!(bare.resolve_root(&nested, &workspace), workspace);
    }
}
