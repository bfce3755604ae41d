//! ---
//! fdy_section: "01-core-functionality"
//! fdy_subsection: "module"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Lifecycle orchestration core."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
//! Bounded polling on tokio time.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Verdict of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Ready,
    Pending,
    /// Stop waiting without reaching the deadline.
    Abandon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ready,
    TimedOut,
    Abandoned,
}

/// Probe immediately, then every `interval` until the probe is ready, asks
/// to abandon, or `timeout` has elapsed.
///
/// The last sleep is clamped to the deadline and the probe runs once more
/// at the deadline, so a wait never overshoots `timeout`.
pub async fn poll_until<F, Fut>(mut probe: F, interval: Duration, timeout: Duration) -> PollOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Probe>,
{
    let deadline = Instant::now() + timeout;
    loop {
        match probe().await {
            Probe::Ready => return PollOutcome::Ready,
            Probe::Abandon => return PollOutcome::Abandoned,
            Probe::Pending => {}
        }
        let now = Instant::now();
        if now >= deadline {
            return PollOutcome::TimedOut;
        }
        sleep(interval.min(deadline - now)).await;
    }
}

/// Re-evaluate `predicate` every `interval` until it holds or `timeout`
/// elapses. Returns whether it held.
pub async fn await_condition<F, Fut>(mut predicate: F, interval: Duration, timeout: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let outcome = poll_until(
        || {
            let check = predicate();
            async move {
                if check.await {
                    Probe::Ready
                } else {
                    Probe::Pending
                }
            }
        },
        interval,
        timeout,
    )
    .await;
    outcome == PollOutcome::Ready
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_success_does_not_sleep() {
        let started = Instant::now();
        assert!(await_condition(|| async { true }, Duration::from_secs(1), Duration::from_secs(30)).await);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn never_true_probes_once_per_interval_plus_deadline() {
        let calls = counter();
        let started = Instant::now();
        let seen = calls.clone();
        let held = await_condition(
            move || {
                seen.fetch_add(1, Ordering::SeqCst);
                async { false }
            },
            Duration::from_secs(1),
            Duration::from_secs(30),
        )
        .await;
        assert!(!held);
        assert_eq!(started.elapsed(), Duration::from_secs(30));
        // t = 0, 1, ..., 30
        assert_eq!(calls.load(Ordering::SeqCst), 31);
    }

    #[tokio::test(start_paused = true)]
    async fn final_sleep_is_clamped_to_deadline() {
        let calls = counter();
        let started = Instant::now();
        let seen = calls.clone();
        let outcome = poll_until(
            move || {
                seen.fetch_add(1, Ordering::SeqCst);
                async { Probe::Pending }
            },
            Duration::from_secs(4),
            Duration::from_secs(10),
        )
        .await;
        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        // t = 0, 4, 8, 10
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_later_probe() {
        let calls = counter();
        let started = Instant::now();
        let seen = calls.clone();
        let held = await_condition(
            move || {
                let n = seen.fetch_add(1, Ordering::SeqCst);
                async move { n >= 3 }
            },
            Duration::from_secs(1),
            Duration::from_secs(30),
        )
        .await;
        assert!(held);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn abandon_stops_immediately() {
        let started = Instant::now();
        let outcome = poll_until(
            || async { Probe::Abandon },
            Duration::from_secs(1),
            Duration::from_secs(30),
        )
        .await;
        assert_eq!(outcome, PollOutcome::Abandoned);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_probes_exactly_once() {
        let calls = counter();
        let seen = calls.clone();
        let held = await_condition(
            move || {
                seen.fetch_add(1, Ordering::SeqCst);
                async { false }
            },
            Duration::from_secs(1),
            Duration::ZERO,
        )
        .await;
        assert!(!held);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
