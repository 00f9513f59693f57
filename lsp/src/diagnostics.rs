//! Diagnostics store: latest published diagnostics per file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::types::ServerDiagnostic;

#[derive(Default)]
pub(crate) struct DiagnosticsStore {
    data: HashMap<PathBuf, Vec<ServerDiagnostic>>,
}

impl DiagnosticsStore {
    /// Servers republish the full set for a file; an empty set clears it.
    pub fn update(&mut self, path: PathBuf, items: Vec<ServerDiagnostic>) {
        if items.is_empty() {
            self.data.remove(&path);
        } else {
            self.data.insert(path, items);
        }
    }

    pub fn for_file(&self, path: &Path) -> &[ServerDiagnostic] {
        self.data.get(path).map_or(&[], Vec::as_slice)
    }

    pub fn errors_for_file(&self, path: &Path) -> Vec<ServerDiagnostic> {
        self.for_file(path)
            .iter()
            .filter(|d| d.severity().is_error())
            .cloned()
            .collect()
    }

    pub fn file_count(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DiagnosticSeverity;

    fn diag(severity: DiagnosticSeverity, msg: &str, line: u32) -> ServerDiagnostic {
        ServerDiagnostic::new(severity, msg.to_string(), line, 0, "test".to_string())
    }

    #[test]
    fn update_replaces_previous_set() {
        let mut store = DiagnosticsStore::default();
        let path = PathBuf::from("/w/main.rs");
        store.update(
            path.clone(),
            vec![
                diag(DiagnosticSeverity::Error, "e1", 1),
                diag(DiagnosticSeverity::Error, "e2", 2),
            ],
        );
        store.update(path.clone(), vec![diag(DiagnosticSeverity::Error, "e1", 1)]);
        assert_eq!(store.for_file(&path).len(), 1);
    }

    #[test]
    fn empty_update_clears_file() {
        let mut store = DiagnosticsStore::default();
        let path = PathBuf::from("/w/main.rs");
        store.update(path.clone(), vec![diag(DiagnosticSeverity::Error, "e", 1)]);
        assert_eq!(store.file_count(), 1);
        store.update(path.clone(), vec![]);
        assert_eq!(store.file_count(), 0);
        assert!(store.for_file(&path).is_empty());
    }

    #[test]
    fn errors_for_file_filters_severity() {
        let mut store = DiagnosticsStore::default();
        let path = PathBuf::from("/w/lib.rs");
        store.update(
            path.clone(),
            vec![
                diag(DiagnosticSeverity::Error, "err", 1),
                diag(DiagnosticSeverity::Warning, "warn", 2),
                diag(DiagnosticSeverity::Hint, "hint", 3),
            ],
        );
        let errors = store.errors_for_file(&path);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message(), "err");
        assert!(store.errors_for_file(Path::new("/w/other.rs")).is_empty());
    }
}
