//! Unified diff rendering and stats for review prompts.

use similar::{ChangeTag, TextDiff};

/// Lines of unchanged context around each hunk.
const CONTEXT_RADIUS: usize = 3;

/// Render a unified diff of `old` → `new` labelled with `path`.
///
/// Returns an empty string when the texts are identical. A missing original
/// (file creation) is labelled `/dev/null`.
#[must_use]
pub fn format_unified_diff(path: &str, old: &str, new: &str, existed: bool) -> String {
    if old == new {
        return String::new();
    }
    let diff = TextDiff::from_lines(old, new);
    let old_label = if existed {
        format!("a/{path}")
    } else {
        "/dev/null".to_string()
    };
    let new_label = format!("b/{path}");
    diff.unified_diff()
        .context_radius(CONTEXT_RADIUS)
        .missing_newline_hint(false)
        .header(&old_label, &new_label)
        .to_string()
}

/// Added and removed line counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiffStats {
    pub additions: u32,
    pub deletions: u32,
}

impl std::fmt::Display for DiffStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "+{} -{}", self.additions, self.deletions)
    }
}

#[must_use]
pub fn compute_diff_stats(old: &str, new: &str) -> DiffStats {
    let diff = TextDiff::from_lines(old, new);
    let mut stats = DiffStats::default();
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => stats.additions += 1,
            ChangeTag::Delete => stats.deletions += 1,
            ChangeTag::Equal => {}
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::{DiffStats, compute_diff_stats, format_unified_diff};

    #[test]
    fn identical_text_renders_nothing() {
        assert_eq!(format_unified_diff("a.txt", "x\n", "x\n", true), "");
    }

    #[test]
    fn renders_hunk_with_headers() {
        let out = format_unified_diff("src/lib.rs", "a\nb\nc\n", "a\nB\nc\n", true);
        assert!(out.starts_with("--- a/src/lib.rs\n+++ b/src/lib.rs\n"));
        assert!(out.contains("\n-b\n"));
        assert!(out.contains("\n+B\n"));
        assert!(out.contains("@@ -1,3 +1,3 @@"));
    }

    #[test]
    fn new_file_uses_dev_null() {
        let out = format_unified_diff("new.txt", "", "hello\n", false);
        assert!(out.starts_with("--- /dev/null\n+++ b/new.txt\n"));
        assert!(out.contains("+hello"));
    }

    #[test]
    fn stats_count_lines() {
        let stats = compute_diff_stats("a\nb\nc\n", "a\nx\ny\nc\n");
        assert_eq!(
            stats,
            DiffStats {
                additions: 2,
                deletions: 1
            }
        );
        assert_eq!(stats.to_string(), "+2 -1");
    }
}
