//! `~/.tether/config.toml` loading.
//!
//! A missing file means defaults. Everything else that goes wrong is a
//! [`ConfigError`] carrying the path, so the caller can report it once and
//! decide whether to continue.

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tether_lsp::LspConfig;
use tether_tools::ToolSettings;
use tether_types::{InvalidSkillName, SkillName, SkillRecord};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid skill in {}: {source}", path.display())]
    InvalidSkill {
        path: PathBuf,
        source: InvalidSkillName,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::InvalidSkill { path, .. } => path,
        }
    }
}

/// On-disk shape. Skill names are validated after parsing so a bad name gets
/// its own error instead of a generic parse failure.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    tools: ToolSettings,
    #[serde(default)]
    lsp: LspConfig,
    #[serde(default)]
    skills: Vec<RawSkill>,
}

#[derive(Debug, Deserialize)]
struct RawSkill {
    name: String,
    #[serde(default)]
    description: String,
    path: String,
}

#[derive(Debug, Clone, Default)]
pub struct TetherConfig {
    pub tools: ToolSettings,
    pub lsp: LspConfig,
    pub skills: Vec<SkillRecord>,
}

impl TetherConfig {
    /// Load from the default location. No home directory or no file yields
    /// the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file; using defaults");
            return Ok(Self::default());
        }
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(source) => {
                tracing::warn!("Failed to read config at {}: {source}", path.display());
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_toml(&content, path)
    }

    /// Parse `content` as if read from `path`. Relative skill paths resolve
    /// against the directory holding `path`.
    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content).map_err(|source| {
            tracing::warn!("Failed to parse config at {}: {source}", path.display());
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let skills = raw
            .skills
            .into_iter()
            .map(|skill| {
                let name = SkillName::new(skill.name).map_err(|source| ConfigError::InvalidSkill {
                    path: path.to_path_buf(),
                    source,
                })?;
                let dir = PathBuf::from(expand_env_vars(&skill.path));
                Ok(SkillRecord {
                    name,
                    description: skill.description,
                    path: if dir.is_absolute() { dir } else { base.join(dir) },
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            tools: raw.tools,
            lsp: raw.lsp,
            skills,
        })
    }
}

/// `${VAR}` references replaced by the variable's value (empty when unset).
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &rest[start + 2..start + 2 + len];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &rest[start + 2 + len + 1..];
    }
    out.push_str(rest);
    out
}

/// `~/.tether`, where the config file and logs live.
#[must_use]
pub fn tether_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".tether"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    tether_dir().map(|dir| dir.join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<TetherConfig, ConfigError> {
        TetherConfig::from_toml(toml_str, Path::new("/home/dev/.tether/config.toml"))
    }

    #[test]
    fn empty_config_is_all_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.tools.run.default_timeout_ms, 30_000);
        assert_eq!(config.tools.search.binary, "rg");
        assert_eq!(config.tools.review.attach_timeout_ms, 5_000);
        assert!(!config.lsp.enabled);
        assert!(config.skills.is_empty());
    }

    #[test]
    fn parses_every_section() {
        let config = parse(
            r#"
[tools.shell]
binary = "/bin/zsh"
args = ["-c"]

[tools.run]
default_timeout_ms = 5000
extra_blocked_patterns = [{ pattern = "git\\s+push\\s+--force", reason = "Force push" }]

[tools.search]
max_results = 50

[tools.review]
diagnostics_timeout_ms = 500

[lsp]
enabled = true

[lsp.servers.rust]
command = "rust-analyzer"
language_id = "rust"
file_extensions = ["rs"]
root_markers = ["Cargo.toml"]

[[skills]]
name = "release-notes"
description = "Draft release notes"
path = "skills/release-notes"

[[skills]]
name = "pdf"
path = "/opt/skills/pdf"
"#,
        )
        .unwrap();

        assert_eq!(config.tools.shell.binary.as_deref(), Some("/bin/zsh"));
        assert_eq!(config.tools.run.default_timeout_ms, 5_000);
        assert_eq!(config.tools.run.extra_blocked_patterns[0].reason, "Force push");
        assert_eq!(config.tools.search.max_results, 50);
        assert_eq!(config.tools.search.binary, "rg");
        assert_eq!(config.tools.review.diagnostics_timeout_ms, 500);
        assert_eq!(config.tools.review.attach_timeout_ms, 5_000);
        assert!(config.lsp.enabled);
        assert_eq!(config.lsp.servers["rust"].file_extensions, ["rs"]);

        assert_eq!(config.skills.len(), 2);
        assert_eq!(
            config.skills[0].path,
            PathBuf::from("/home/dev/.tether/skills/release-notes")
        );
        assert_eq!(config.skills[1].path, PathBuf::from("/opt/skills/pdf"));
        assert_eq!(config.skills[1].description, "");
    }

    #[test]
    fn invalid_skill_name_is_its_own_error() {
        let err = parse(
            r#"
[[skills]]
name = "Not_Valid"
path = "x"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSkill { .. }));
        assert!(err.to_string().contains("Not_Valid"));
    }

    #[test]
    fn parse_error_carries_path() {
        let err = parse("[tools.run]\ndefault_timeout_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert_eq!(err.path(), Path::new("/home/dev/.tether/config.toml"));
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = TetherConfig::load_from(&dir.path().join("config.toml")).unwrap();
        assert!(config.skills.is_empty());
    }

    #[test]
    fn load_from_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[tools.search]\nbinary = \"/usr/local/bin/rg\"\n").unwrap();
        let config = TetherConfig::load_from(&path).unwrap();
        assert_eq!(config.tools.search.binary, "/usr/local/bin/rg");
    }

    #[test]
    fn expand_env_vars_replaces_references() {
        assert_eq!(expand_env_vars("plain"), "plain");
        assert_eq!(expand_env_vars("${}x"), "x");
        assert_eq!(expand_env_vars("a${UNCLOSED"), "a${UNCLOSED");
        assert_eq!(
            expand_env_vars("${TETHER_SURELY_UNSET_VAR}/skills"),
            "/skills"
        );
        let path = env::var("PATH").unwrap_or_default();
        assert_eq!(expand_env_vars("${PATH}!"), format!("{path}!"));
    }
}
