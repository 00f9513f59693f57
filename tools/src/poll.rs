//! Bounded polling for externally observed readiness.
//!
//! [`poll_until`] always resolves: once the budget is spent it hands back
//! whatever the last check produced, ready or not.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// A check result that can say whether the wait is over.
pub trait Readiness {
    fn is_ready(&self) -> bool;
}

impl Readiness for bool {
    fn is_ready(&self) -> bool {
        *self
    }
}

impl<T> Readiness for Vec<T> {
    fn is_ready(&self) -> bool {
        !self.is_empty()
    }
}

impl<T> Readiness for Option<T> {
    fn is_ready(&self) -> bool {
        self.is_some()
    }
}

/// When to check and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Sleep before the first check.
    pub initial_delay: Duration,
    pub interval: Duration,
    /// Total budget, measured from the call and including `initial_delay`.
    pub timeout: Duration,
}

impl PollSchedule {
    /// Waiting for a code-intelligence client to attach.
    #[must_use]
    pub fn attach(timeout: Duration) -> Self {
        Self {
            initial_delay: Duration::ZERO,
            interval: Duration::from_millis(50),
            timeout,
        }
    }

    /// Waiting for diagnostics after a write; the grace delay lets analysis start.
    #[must_use]
    pub fn diagnostics(timeout: Duration) -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            interval: Duration::from_millis(100),
            timeout,
        }
    }
}

/// Run `check` on `schedule` until it reports ready or the budget runs out.
///
/// Checks are awaited on the caller's task and the sleeps between them yield,
/// so other tasks interleave. The check always runs at least once.
pub async fn poll_until<T, F, Fut>(schedule: PollSchedule, mut check: F) -> T
where
    T: Readiness,
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
{
    let deadline = Instant::now() + schedule.timeout;
    if !schedule.initial_delay.is_zero() {
        tokio::time::sleep_until(deadline.min(Instant::now() + schedule.initial_delay)).await;
    }
    loop {
        let value = check().await;
        if value.is_ready() {
            return value;
        }
        let now = Instant::now();
        if now >= deadline {
            return value;
        }
        tokio::time::sleep_until(deadline.min(now + schedule.interval)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast(timeout_ms: u64) -> PollSchedule {
        PollSchedule {
            initial_delay: Duration::ZERO,
            interval: Duration::from_millis(5),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[tokio::test]
    async fn resolves_as_soon_as_ready() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let value: Vec<u32> = poll_until(fast(1_000), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { if n >= 2 { vec![7] } else { vec![] } }
        })
        .await;
        assert_eq!(value, vec![7]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn times_out_with_last_value() {
        let started = Instant::now();
        let value: Vec<u32> = poll_until(fast(40), || async { Vec::new() }).await;
        assert!(value.is_empty());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(40));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn zero_budget_still_checks_once() {
        let calls = AtomicUsize::new(0);
        let ready = poll_until(fast(0), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { false }
        })
        .await;
        assert!(!ready);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn initial_delay_precedes_first_check() {
        let schedule = PollSchedule {
            initial_delay: Duration::from_millis(30),
            interval: Duration::from_millis(5),
            timeout: Duration::from_millis(500),
        };
        let started = Instant::now();
        let first_check = poll_until(schedule, || async { Some(Instant::now()) })
            .await
            .unwrap();
        assert!(first_check.duration_since(started) >= Duration::from_millis(30));
    }

    #[test]
    fn named_schedules() {
        let attach = PollSchedule::attach(Duration::from_secs(5));
        assert_eq!(attach.interval, Duration::from_millis(50));
        assert!(attach.initial_delay.is_zero());
        let diags = PollSchedule::diagnostics(Duration::from_millis(2_000));
        assert_eq!(diags.initial_delay, Duration::from_millis(200));
        assert_eq!(diags.interval, Duration::from_millis(100));
        assert_eq!(diags.timeout, Duration::from_millis(2_000));
    }
}
