//! Path resolution for tool arguments.

use std::path::{Component, Path, PathBuf};

use crate::ToolError;

/// Resolve a caller-supplied path against the working directory.
///
/// Absolute paths are kept; relative ones are joined onto `working_dir`.
/// `.` and `..` are folded lexically, so the target need not exist yet.
pub fn resolve(working_dir: &Path, raw: &Path) -> Result<PathBuf, ToolError> {
    if raw.as_os_str().is_empty() {
        return Err(ToolError::BadArgs {
            message: "path must not be empty".to_string(),
        });
    }
    let joined = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        working_dir.join(raw)
    };
    Ok(normalize(&joined))
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Path as shown in tool messages: relative to `working_dir` when inside it.
#[must_use]
pub fn display(working_dir: &Path, path: &Path) -> String {
    path.strip_prefix(working_dir)
        .ok()
        .filter(|rel| !rel.as_os_str().is_empty())
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_join_working_dir() {
        let resolved = resolve(Path::new("/w"), Path::new("src/./lib.rs")).unwrap();
        assert_eq!(resolved, PathBuf::from("/w/src/lib.rs"));
    }

    #[test]
    fn absolute_paths_are_kept() {
        let resolved = resolve(Path::new("/w"), Path::new("/etc/../tmp/x")).unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/x"));
    }

    #[test]
    fn empty_path_is_rejected() {
        assert!(matches!(
            resolve(Path::new("/w"), Path::new("")),
            Err(ToolError::BadArgs { .. })
        ));
    }

    #[test]
    fn display_is_relative_inside_working_dir() {
        assert_eq!(display(Path::new("/w"), Path::new("/w/src/a.rs")), "src/a.rs");
        assert_eq!(display(Path::new("/w"), Path::new("/x/a.rs")), "/x/a.rs");
        assert_eq!(display(Path::new("/w"), Path::new("/w")), "/w");
    }
}
