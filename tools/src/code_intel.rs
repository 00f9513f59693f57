//! Code-intelligence seam consumed by the symbol tools and the review session.
//!
//! The tool layer only reads from a provider; [`tether_lsp::LspManager`] is the
//! production implementation.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use tether_lsp::{LspManager, ServerDiagnostic};
use tether_types::{Diagnostic, SymbolInfo};
use tokio::sync::Mutex;

use crate::poll::{PollSchedule, poll_until};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait CodeIntel: Send + Sync {
    /// Whether a client serving `path` is ready. May start one in the background.
    fn is_attached<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, bool>;
    fn document_symbols<'a>(&'a self, path: &'a Path)
    -> BoxFuture<'a, anyhow::Result<Vec<SymbolInfo>>>;
    fn workspace_symbols<'a>(&'a self, query: &'a str)
    -> BoxFuture<'a, anyhow::Result<Vec<SymbolInfo>>>;
    /// Tell the provider that `path` now holds `text`.
    fn file_changed<'a>(&'a self, path: &'a Path, text: &'a str) -> BoxFuture<'a, ()>;
    /// Current error-severity diagnostics for `path`, 1-indexed.
    fn error_diagnostics<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Vec<Diagnostic>>;
}

impl CodeIntel for Mutex<LspManager> {
    fn is_attached<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, bool> {
        Box::pin(async move { self.lock().await.is_attached(path) })
    }

    fn document_symbols<'a>(
        &'a self,
        path: &'a Path,
    ) -> BoxFuture<'a, anyhow::Result<Vec<SymbolInfo>>> {
        Box::pin(async move { self.lock().await.document_symbols(path).await })
    }

    fn workspace_symbols<'a>(
        &'a self,
        query: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Vec<SymbolInfo>>> {
        Box::pin(async move { self.lock().await.workspace_symbols(query).await })
    }

    fn file_changed<'a>(&'a self, path: &'a Path, text: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move { self.lock().await.on_file_changed(path, text).await })
    }

    fn error_diagnostics<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Vec<Diagnostic>> {
        Box::pin(async move {
            self.lock()
                .await
                .errors_for_file(path)
                .iter()
                .map(ServerDiagnostic::to_tool_diagnostic)
                .collect()
        })
    }
}

/// Poll every 50 ms until a client for `path` attaches or `timeout` passes.
pub async fn wait_for_attach(intel: &dyn CodeIntel, path: &Path, timeout: Duration) -> bool {
    poll_until(PollSchedule::attach(timeout), || intel.is_attached(path)).await
}

/// After a 200 ms grace delay, poll every 100 ms for error diagnostics.
///
/// An empty result means either a clean file or analysis that had not
/// finished within `timeout`.
pub async fn wait_for_diagnostics(
    intel: &dyn CodeIntel,
    path: &Path,
    timeout: Duration,
) -> Vec<Diagnostic> {
    poll_until(PollSchedule::diagnostics(timeout), || {
        intel.error_diagnostics(path)
    })
    .await
}
