//! Shared subprocess management utilities.

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

use crate::EnvSanitizer;

/// RAII guard that kills a child process (and its process group on Unix) on drop.
///
/// Wrap a spawned child immediately after `spawn()` so it is killed if the
/// owning future is cancelled or times out. Call `disarm()` once the process
/// has exited and its output streams are closed. The process group id is
/// recorded at construction, so the group is still killed after the shell
/// itself has been reaped.
pub struct ChildGuard {
    child: Child,
    pgid: Option<i32>,
    armed: bool,
}

impl ChildGuard {
    #[must_use]
    pub fn new(child: Child) -> Self {
        let pgid = child.id().and_then(|pid| i32::try_from(pid).ok());
        Self {
            child,
            pgid,
            armed: true,
        }
    }

    pub fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        #[cfg(unix)]
        {
            if let Some(pgid) = self.pgid {
                // SAFETY: killpg only sends a signal; the id is our own child's group.
                let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
                if rc == -1 {
                    let _ = self.child.start_kill();
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }
        let _ = self.child.try_wait();
    }
}

/// Put the child process in its own session (Unix only) so the entire process
/// group can be killed via `killpg` in `ChildGuard::drop`.
#[cfg(unix)]
pub fn set_new_session(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    // SAFETY: setsid and prctl are async-signal-safe.
    unsafe {
        cmd.as_std_mut().pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            #[cfg(target_os = "linux")]
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
pub fn set_new_session(_cmd: &mut Command) {}

/// Remove every inherited variable the sanitizer denies.
pub fn apply_sanitized_env(cmd: &mut std::process::Command, sanitizer: &EnvSanitizer) {
    for (key, _) in std::env::vars_os() {
        if let Some(name) = key.to_str()
            && sanitizer.is_denied(name)
        {
            cmd.env_remove(&key);
        }
    }
}

/// Read a stream to EOF, keeping at most `max_collect` bytes.
///
/// The stream is drained past the limit so the child never blocks on a full pipe.
/// Returns the collected text and whether anything was dropped.
pub async fn read_bounded<R: AsyncRead + Unpin>(
    mut reader: R,
    max_collect: usize,
) -> (String, bool) {
    let mut buf = [0u8; 4096];
    let mut collected: Vec<u8> = Vec::new();
    let mut truncated = false;
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let remaining = max_collect.saturating_sub(collected.len());
        let take = remaining.min(n);
        collected.extend_from_slice(&buf[..take]);
        if take < n {
            truncated = true;
        }
    }
    (String::from_utf8_lossy(&collected).into_owned(), truncated)
}
