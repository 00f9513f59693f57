//! The explicit context every tool call runs against.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::code_intel::CodeIntel;
use crate::command_blacklist::CommandBlacklist;
use crate::config::ToolSettings;
use crate::review::{ReviewSlot, ReviewSurface};
use crate::shell::{DetectedShell, detect_shell};
use crate::{EnvSanitizer, ToolError};

/// Built once per process and shared by reference with every executor.
pub struct ToolContext {
    /// Relative tool paths resolve against this directory.
    pub working_dir: PathBuf,
    pub settings: ToolSettings,
    pub shell: DetectedShell,
    pub env_sanitizer: EnvSanitizer,
    pub command_blacklist: CommandBlacklist,
    /// Single-active diff review slot.
    pub review: ReviewSlot,
    code_intel: Option<Arc<dyn CodeIntel>>,
}

impl ToolContext {
    /// Derive shell, env sanitizer and blacklist from `settings`.
    pub fn new(
        working_dir: PathBuf,
        settings: ToolSettings,
        surface: Arc<dyn ReviewSurface>,
    ) -> Result<Self, ToolError> {
        let env_sanitizer = EnvSanitizer::new(&settings.environment.denylist)?;
        let extra: Vec<(String, String)> = settings
            .run
            .extra_blocked_patterns
            .iter()
            .map(|p| (p.pattern.clone(), p.reason.clone()))
            .collect();
        let command_blacklist = CommandBlacklist::with_extra(&extra)?;
        let shell = detect_shell(Some(&settings.shell));
        tracing::debug!(shell = %shell, working_dir = %working_dir.display(), "Tool context ready");
        Ok(Self {
            working_dir,
            settings,
            shell,
            env_sanitizer,
            command_blacklist,
            review: ReviewSlot::new(surface),
            code_intel: None,
        })
    }

    #[must_use]
    pub fn with_code_intel(mut self, intel: Arc<dyn CodeIntel>) -> Self {
        self.code_intel = Some(intel);
        self
    }

    #[must_use]
    pub fn code_intel(&self) -> Option<&dyn CodeIntel> {
        self.code_intel.as_deref()
    }

    #[must_use]
    pub fn diagnostics_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.review.diagnostics_timeout_ms)
    }

    #[must_use]
    pub fn attach_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.review.attach_timeout_ms)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;

    use tokio::sync::oneshot;

    use super::*;
    use crate::review::{ReviewError, ReviewInput, ReviewRequest};

    /// Answers every review with a fixed input.
    pub(crate) struct FixedAnswer(pub ReviewInput);

    impl ReviewSurface for FixedAnswer {
        fn present(
            &self,
            _request: &ReviewRequest,
        ) -> Result<oneshot::Receiver<ReviewInput>, ReviewError> {
            let (tx, rx) = oneshot::channel();
            let _ = tx.send(self.0);
            Ok(rx)
        }
    }

    pub(crate) fn context_with(working_dir: &Path, answer: ReviewInput) -> ToolContext {
        ToolContext::new(
            working_dir.to_path_buf(),
            ToolSettings::default(),
            Arc::new(FixedAnswer(answer)),
        )
        .unwrap()
    }

    pub(crate) fn context(working_dir: &Path) -> ToolContext {
        context_with(working_dir, ReviewInput::Accept)
    }
}
