//! Configuration types used by tool executors.
//!
//! The `[tools.*]` tables of `config.toml` deserialize straight into these;
//! `tether-config` owns file loading.

use serde::Deserialize;

use crate::sandbox::DEFAULT_TIMEOUT_MS;

/// Shell configuration for command execution.
///
/// ```toml
/// [tools.shell]
/// binary = "zsh"
/// args = ["-c"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShellConfig {
    /// Override shell binary (e.g., "bash", "/usr/local/bin/fish").
    pub binary: Option<String>,
    /// Override shell args (e.g., `["-c"]`).
    pub args: Option<Vec<String>>,
}

/// A user-supplied blacklist entry.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockedPattern {
    pub pattern: String,
    pub reason: String,
}

/// `[tools.run]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Timeout applied when a call does not pass `timeout_ms`. Clamped like any request.
    pub default_timeout_ms: u64,
    /// Appended to the built-in command blacklist.
    pub extra_blocked_patterns: Vec<BlockedPattern>,
    /// Per-stream capture limit.
    pub max_output_bytes: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            extra_blocked_patterns: Vec::new(),
            max_output_bytes: 256 * 1024,
        }
    }
}

/// `[tools.search]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchToolConfig {
    /// Line-oriented search utility; also used for file listing.
    pub binary: String,
    pub max_results: usize,
    /// The utility is killed once this runs out.
    pub default_timeout_ms: u64,
}

impl Default for SearchToolConfig {
    fn default() -> Self {
        Self {
            binary: "rg".to_string(),
            max_results: 200,
            default_timeout_ms: 20_000,
        }
    }
}

/// `[tools.read_file]`
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ReadFileLimits {
    pub max_file_read_bytes: u64,
}

impl Default for ReadFileLimits {
    fn default() -> Self {
        Self {
            max_file_read_bytes: 1024 * 1024,
        }
    }
}

/// `[tools.review]`
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ReviewTimeouts {
    /// Budget for diagnostics to appear after an accepted write.
    pub diagnostics_timeout_ms: u64,
    /// Budget for a code-intelligence client to attach before a symbol query.
    pub attach_timeout_ms: u64,
}

impl Default for ReviewTimeouts {
    fn default() -> Self {
        Self {
            diagnostics_timeout_ms: 2000,
            attach_timeout_ms: 5000,
        }
    }
}

/// `[tools.environment]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Glob patterns of variables stripped from child processes.
    pub denylist: Vec<String>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            denylist: tether_types::ENV_SECRET_DENYLIST
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Aggregated `[tools]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub shell: ShellConfig,
    pub run: RunConfig,
    pub search: SearchToolConfig,
    pub read_file: ReadFileLimits,
    pub review: ReviewTimeouts,
    pub environment: EnvironmentConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_tables() {
        let settings: ToolSettings = serde_json::from_value(serde_json::json!({
            "run": { "default_timeout_ms": 5000 },
            "search": { "max_results": 10 }
        }))
        .unwrap();
        assert_eq!(settings.run.default_timeout_ms, 5000);
        assert_eq!(settings.run.max_output_bytes, 256 * 1024);
        assert_eq!(settings.search.binary, "rg");
        assert_eq!(settings.search.max_results, 10);
        assert_eq!(settings.search.default_timeout_ms, 20_000);
        assert_eq!(settings.review.diagnostics_timeout_ms, 2000);
        assert_eq!(settings.review.attach_timeout_ms, 5000);
        assert!(settings.environment.denylist.contains(&"*_TOKEN".to_string()));
        assert!(settings.shell.binary.is_none());
    }
}
