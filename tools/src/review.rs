//! Diff review: gate a proposed file change behind a human accept or reject.
//!
//! A [`DiffSession`] moves `Open → Accepted | Rejected → Closed` and resolves
//! to exactly one [`ReviewOutcome`]. Only one session may be open at a time;
//! the [`ReviewSlot`] on the tool context enforces that.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tether_types::{Diagnostic, split_lines};
use tether_utils::{
    DiffStats, atomic_write, atomic_write_new, compute_diff_stats, format_unified_diff,
};
use tokio::sync::oneshot;

use crate::code_intel::{CodeIntel, wait_for_diagnostics};

pub const REJECTED_BY_USER: &str = "Rejected by user";

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("A diff review is already open for {}", path.display())]
    AlreadyOpen { path: PathBuf },
    #[error("Review surface unavailable: {0}")]
    Surface(String),
}

/// The human's answer. A dropped sender counts as [`ReviewInput::Dismissed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewInput {
    Accept,
    Reject,
    /// The surface went away without an explicit choice.
    Dismissed,
}

/// Presentation side of a review: two read-only views plus an input channel.
///
/// Teardown hooks are called in declaration order by the session; surfaces
/// without a given concept can leave the default no-op.
pub trait ReviewSurface: Send + Sync {
    /// Show original (left) and proposed (right) views, focusing the proposed one.
    fn present(
        &self,
        request: &ReviewRequest,
    ) -> Result<oneshot::Receiver<ReviewInput>, ReviewError>;
    fn detach_dismiss_observer(&self) {}
    fn diff_off(&self) {}
    fn close_proposed(&self) {}
    /// Accept only: show the real file where the original view was.
    fn reopen_file(&self, _path: &Path) {}
    fn discard_scratch(&self) {}
    /// Hand control back to whoever asked for the review. Runs one scheduler
    /// turn after teardown.
    fn return_to_caller(&self) {}
}

/// A proposed change to one file.
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    path: PathBuf,
    original_lines: Vec<String>,
    proposed_lines: Vec<String>,
    original_text: String,
    proposed_text: String,
    is_new_file: bool,
    diff: String,
}

impl ReviewRequest {
    /// `original_text` is empty for a file that does not exist yet.
    #[must_use]
    pub fn new(
        path: PathBuf,
        original_text: String,
        proposed_text: String,
        is_new_file: bool,
    ) -> Self {
        let diff = format_unified_diff(
            &path.to_string_lossy(),
            &original_text,
            &proposed_text,
            !is_new_file,
        );
        Self {
            original_lines: split_lines(&original_text),
            proposed_lines: split_lines(&proposed_text),
            path,
            original_text,
            proposed_text,
            is_new_file,
            diff,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn original_lines(&self) -> &[String] {
        &self.original_lines
    }

    #[must_use]
    pub fn proposed_lines(&self) -> &[String] {
        &self.proposed_lines
    }

    #[must_use]
    pub fn is_new_file(&self) -> bool {
        self.is_new_file
    }

    /// Unified diff of the change, empty when nothing changes.
    #[must_use]
    pub fn diff(&self) -> &str {
        &self.diff
    }

    #[must_use]
    pub fn stats(&self) -> DiffStats {
        compute_diff_stats(&self.original_text, &self.proposed_text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    /// The file was written. `diagnostics` holds errors found within the poll
    /// budget and may be empty because analysis had not finished.
    Accepted {
        diagnostics: Vec<Diagnostic>,
        stats: DiffStats,
    },
    Rejected { reason: String },
}

/// The single-active-session slot and the surface sessions present on.
pub struct ReviewSlot {
    surface: Arc<dyn ReviewSurface>,
    active: Mutex<Option<PathBuf>>,
}

impl ReviewSlot {
    #[must_use]
    pub fn new(surface: Arc<dyn ReviewSurface>) -> Self {
        Self {
            surface,
            active: Mutex::new(None),
        }
    }

    /// Path under review, if a session is open.
    #[must_use]
    pub fn active(&self) -> Option<PathBuf> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn claim(&self, path: &Path) -> Result<SlotGuard<'_>, ReviewError> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(open) = active.as_ref() {
            return Err(ReviewError::AlreadyOpen { path: open.clone() });
        }
        *active = Some(path.to_path_buf());
        Ok(SlotGuard { slot: self })
    }
}

/// Frees the slot when the session is dropped, whichever way it ends.
struct SlotGuard<'a> {
    slot: &'a ReviewSlot,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        *self.slot.active.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Open,
    Accepted,
    Rejected,
    Closed,
}

/// One review, from presentation to a single outcome.
pub struct DiffSession<'a> {
    _slot: SlotGuard<'a>,
    surface: &'a dyn ReviewSurface,
    request: ReviewRequest,
    state: SessionState,
}

impl<'a> DiffSession<'a> {
    /// Claim the slot. Fails with [`ReviewError::AlreadyOpen`] while another
    /// session is unresolved.
    pub fn open(slot: &'a ReviewSlot, request: ReviewRequest) -> Result<Self, ReviewError> {
        let guard = slot.claim(request.path())?;
        tracing::info!(path = %request.path().display(), "Opening diff review");
        Ok(Self {
            _slot: guard,
            surface: slot.surface.as_ref(),
            request,
            state: SessionState::Open,
        })
    }

    /// Present the change and wait for the decision.
    ///
    /// On accept the file is written, views are torn down, `intel` (if any)
    /// is told about the new content and diagnostics are polled for up to
    /// `diagnostics_timeout`. Teardown always finishes before this returns.
    pub async fn run(
        mut self,
        intel: Option<&dyn CodeIntel>,
        diagnostics_timeout: Duration,
    ) -> ReviewOutcome {
        let input = match self.surface.present(&self.request) {
            Ok(rx) => rx.await.unwrap_or(ReviewInput::Dismissed),
            Err(e) => {
                tracing::warn!("Review surface failed: {e}");
                return self.reject(e.to_string()).await;
            }
        };

        match input {
            ReviewInput::Accept => {}
            ReviewInput::Reject | ReviewInput::Dismissed => {
                tracing::info!(path = %self.request.path().display(), ?input, "Review rejected");
                return self.reject(REJECTED_BY_USER.to_string()).await;
            }
        }

        if let Err(e) = self.write() {
            tracing::warn!(path = %self.request.path().display(), "Write failed: {e}");
            return self.reject(format!("Write failed: {e}")).await;
        }

        self.advance(SessionState::Accepted);
        self.teardown().await;
        tracing::info!(path = %self.request.path().display(), "Review accepted");

        let diagnostics = match intel {
            Some(intel) => {
                let path = self.request.path();
                intel.file_changed(path, &self.request.proposed_text).await;
                wait_for_diagnostics(intel, path, diagnostics_timeout).await
            }
            None => Vec::new(),
        };
        ReviewOutcome::Accepted {
            diagnostics,
            stats: self.request.stats(),
        }
    }

    async fn reject(mut self, reason: String) -> ReviewOutcome {
        self.advance(SessionState::Rejected);
        self.teardown().await;
        ReviewOutcome::Rejected { reason }
    }

    fn write(&self) -> io::Result<()> {
        let path = self.request.path();
        let bytes = self.request.proposed_text.as_bytes();
        if self.request.is_new_file() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            atomic_write_new(path, bytes)
        } else {
            atomic_write(path, bytes)
        }
    }

    /// Shared teardown. The real file is reopened before the scratch views
    /// backing the review are discarded.
    async fn teardown(&mut self) {
        let accepted = self.state == SessionState::Accepted;
        self.surface.detach_dismiss_observer();
        self.surface.diff_off();
        self.surface.close_proposed();
        if accepted {
            self.surface.reopen_file(self.request.path());
        }
        self.surface.discard_scratch();
        self.advance(SessionState::Closed);

        tokio::task::yield_now().await;
        self.surface.return_to_caller();
    }

    fn advance(&mut self, next: SessionState) {
        let allowed = matches!(
            (self.state, next),
            (SessionState::Open, SessionState::Accepted | SessionState::Rejected)
                | (SessionState::Accepted | SessionState::Rejected, SessionState::Closed)
        );
        debug_assert!(allowed, "invalid review transition {:?} -> {next:?}", self.state);
        tracing::debug!(from = ?self.state, to = ?next, "Review state");
        self.state = next;
    }
}
