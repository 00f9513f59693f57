//! Shell detection for `run_command`.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::ShellConfig;

/// Shells that accept POSIX `sh -c` syntax.
const POSIX_SHELLS: &[&str] = &["sh", "bash", "zsh", "dash", "ksh", "mksh", "ash"];

/// Detected shell for command execution.
#[derive(Debug, Clone)]
pub struct DetectedShell {
    /// Path or name of the shell binary.
    pub binary: PathBuf,
    /// Arguments to pass before the command (e.g. `["-c"]`).
    pub args: Vec<String>,
    /// Human-readable name for logging.
    pub name: String,
}

impl fmt::Display for DetectedShell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Detect the shell to run commands through.
///
/// Priority: config override, then `$SHELL` when it is POSIX-compatible,
/// then `bash` on `PATH`, then `/bin/sh`.
#[must_use]
pub fn detect_shell(config: Option<&ShellConfig>) -> DetectedShell {
    if let Some(cfg) = config
        && let Some(binary) = &cfg.binary
    {
        return DetectedShell {
            binary: PathBuf::from(binary),
            args: cfg.args.clone().unwrap_or_else(|| vec!["-c".to_string()]),
            name: "configured".into(),
        };
    }

    if let Ok(shell) = std::env::var("SHELL")
        && let Some(detected) = posix_shell_at(Path::new(&shell))
    {
        return detected;
    }

    if let Ok(path) = which::which("bash") {
        return DetectedShell {
            binary: path,
            args: vec!["-c".to_string()],
            name: "bash".into(),
        };
    }

    DetectedShell {
        binary: PathBuf::from("/bin/sh"),
        args: vec!["-c".to_string()],
        name: "sh".into(),
    }
}

fn posix_shell_at(path: &Path) -> Option<DetectedShell> {
    let name = path.file_name()?.to_str()?;
    if !POSIX_SHELLS.contains(&name) || !path.exists() {
        return None;
    }
    Some(DetectedShell {
        binary: path.to_path_buf(),
        args: vec!["-c".to_string()],
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_override_wins() {
        let config = ShellConfig {
            binary: Some("zsh".to_string()),
            args: Some(vec!["-lc".to_string()]),
        };
        let shell = detect_shell(Some(&config));
        assert_eq!(shell.binary, PathBuf::from("zsh"));
        assert_eq!(shell.args, vec!["-lc"]);
        assert_eq!(shell.name, "configured");
    }

    #[test]
    fn config_override_defaults_to_dash_c() {
        let config = ShellConfig {
            binary: Some("/bin/dash".to_string()),
            args: None,
        };
        assert_eq!(detect_shell(Some(&config)).args, vec!["-c"]);
    }

    #[test]
    fn non_posix_shells_are_skipped() {
        assert!(posix_shell_at(Path::new("/usr/bin/fish")).is_none());
        assert!(posix_shell_at(Path::new("/nonexistent/bash")).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn bin_sh_is_accepted() {
        let shell = posix_shell_at(Path::new("/bin/sh")).unwrap();
        assert_eq!(shell.name, "sh");
    }

    #[test]
    fn detect_shell_without_config_returns_something() {
        let shell = detect_shell(None);
        assert!(!shell.binary.as_os_str().is_empty());
        assert_eq!(shell.args, vec!["-c"]);
    }
}
