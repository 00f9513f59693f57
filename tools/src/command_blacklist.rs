//! Command blacklist for blocking catastrophically dangerous commands.
//!
//! Every pattern is matched case-insensitively against the raw command text
//! before anything is spawned. A match is terminal for the call.

use regex::RegexSet;

use crate::ToolError;

/// Default command blacklist patterns.
///
/// Each tuple: `(regex_pattern, human_readable_reason)`
pub const DEFAULT_PATTERNS: &[(&str, &str)] = &[
    // rm -r / with any flag ordering, `--`, and trailing globs
    (
        r"(?i)\brm\s+(?:(?:--recursive|-[^\s-]*r[^\s-]*)(?:\s+(?:--[\w-]+|-\S+))*|(?:--[\w-]+|-\S+)\s+(?:--recursive|-[^\s-]*r[^\s-]*)(?:\s+(?:--[\w-]+|-\S+))*)\s+(?:--\s+)?(?:/+|/\*|/\.{1,2}/*\*?)(?:\s|$|[&|;])",
        "Attempting to delete root filesystem",
    ),
    (
        r"(?i)\brm\s+(?:(?:--recursive|-[^\s-]*r[^\s-]*)(?:\s+(?:--[\w-]+|-\S+))*)\s+(?:--\s+)?(?:~|\$HOME|\$\{HOME\})(?:\s|$|[&|;/])",
        "Attempting to delete home directory",
    ),
    (r"(?i)\bmkfs(?:\.\w+)?\b", "Formatting a filesystem"),
    (r"(?i)\b(?:s?fdisk|parted)\b", "Editing a partition table"),
    (
        r"(?i)\b(?:shutdown|reboot|halt|poweroff)\b",
        "Shutting down or rebooting the host",
    ),
    (r":\(\)\s*\{", "Fork bomb detected"),
    (
        r"(?i)\bdd\s+.*\bof=/dev/(?:sd|hd|nvme|vd|xvd|mmcblk|disk|loop)\w*",
        "Attempting to overwrite disk device",
    ),
    (
        r"(?i)>\s*/dev/(?:sd|hd|nvme|vd|xvd|mmcblk|disk)\w*",
        "Redirecting output onto a disk device",
    ),
    (
        r"(?i)>\s*/(?:(?:etc|bin|sbin|usr|boot|lib|lib64|sys|proc)(?:/\S*)?)?(?:\s|$|[&|;])",
        "Redirecting output into the root filesystem",
    ),
    (
        r"(?i)\bchmod\s+-R\s+\d+\s+/(?:\s|$|[&|;])",
        "Recursive permission change on root filesystem",
    ),
];

/// Command blacklist validator.
///
/// Uses a `RegexSet` for efficient multi-pattern matching in a single pass.
#[derive(Debug, Clone)]
pub struct CommandBlacklist {
    regex_set: RegexSet,
    /// `(pattern, reason)` parallel to the regex set.
    entries: Vec<(String, String)>,
}

impl CommandBlacklist {
    /// Create a new blacklist from pattern-reason pairs.
    pub fn new<P, R>(patterns: &[(P, R)]) -> Result<Self, ToolError>
    where
        P: AsRef<str>,
        R: AsRef<str>,
    {
        let entries: Vec<(String, String)> = patterns
            .iter()
            .map(|(p, r)| (p.as_ref().to_string(), r.as_ref().to_string()))
            .collect();
        let regex_set = RegexSet::new(entries.iter().map(|(p, _)| p.as_str())).map_err(|e| {
            ToolError::BadArgs {
                message: format!("Failed to compile blacklist patterns: {e}"),
            }
        })?;
        Ok(Self { regex_set, entries })
    }

    /// Create a blacklist with default patterns.
    pub fn with_defaults() -> Result<Self, ToolError> {
        Self::new(DEFAULT_PATTERNS)
    }

    /// Defaults followed by `extra` patterns. Extra patterns without an
    /// inline flag group are made case-insensitive.
    pub fn with_extra(extra: &[(String, String)]) -> Result<Self, ToolError> {
        let mut all: Vec<(String, String)> = DEFAULT_PATTERNS
            .iter()
            .map(|(p, r)| ((*p).to_string(), (*r).to_string()))
            .collect();
        for (pattern, reason) in extra {
            let pattern = if pattern.starts_with("(?") {
                pattern.clone()
            } else {
                format!("(?i){pattern}")
            };
            all.push((pattern, reason.clone()));
        }
        Self::new(&all)
    }

    /// Validate a command against the blacklist.
    ///
    /// The first matching pattern (in declaration order) is reported.
    pub fn validate(&self, command: &str) -> Result<(), ToolError> {
        if let Some(idx) = self.regex_set.matches(command).iter().next() {
            let (pattern, reason) = &self.entries[idx];
            tracing::warn!(
                command = %truncate_command(command, 100),
                reason = %reason,
                "Blocked command"
            );
            return Err(ToolError::CommandBlocked {
                pattern: pattern.clone(),
                reason: reason.clone(),
            });
        }
        Ok(())
    }
}

/// Truncate command for log lines.
fn truncate_command(cmd: &str, max_len: usize) -> String {
    if cmd.len() <= max_len {
        cmd.to_string()
    } else {
        let mut end = max_len;
        while end > 0 && !cmd.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &cmd[..end])
    }
}
