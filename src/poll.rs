//! Fixed-interval polling bound to a cancellation token.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

pub const DEPLOY_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const CONNECTION_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Clonable handle that stops every poll loop holding a copy of it.
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once [`CancelToken::cancel`] has been called on any clone.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives in `self`, so the channel cannot close underneath us.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Finished(T),
    Cancelled,
}

/// Calls `fetch` immediately and then every `interval` until `is_terminal`
/// accepts a value or `token` is cancelled.
///
/// A failed fetch is logged and retried on the next tick unless `is_fatal`
/// accepts the error, in which case it is returned.
pub async fn poll_until<T, E, F, Fut, P, X>(
    interval: Duration,
    token: &CancelToken,
    mut fetch: F,
    is_terminal: P,
    is_fatal: X,
) -> Result<PollOutcome<T>, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&T) -> bool,
    X: Fn(&E) -> bool,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut attempts: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                log::debug!(attempts; "poll cancelled");
                return Ok(PollOutcome::Cancelled);
            }
            _ = ticker.tick() => {}
        }

        attempts += 1;
        let value = tokio::select! {
            biased;
            _ = token.cancelled() => {
                log::debug!(attempts; "poll cancelled during fetch");
                return Ok(PollOutcome::Cancelled);
            }
            value = fetch() => value,
        };

        let value = match value {
            Ok(value) => value,
            Err(err) if is_fatal(&err) => {
                log::warn!(attempts, error:% = err; "poll stopped on a fatal error");
                return Err(err);
            }
            Err(err) => {
                log::warn!(attempts, error:% = err; "poll fetch failed, retrying");
                continue;
            }
        };

        if is_terminal(&value) {
            log::debug!(attempts; "poll reached a terminal value");
            return Ok(PollOutcome::Finished(value));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    #[serde(default)]
    pub job_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub outputs: Option<serde_json::Value>,
}

impl DeploymentStatus {
    pub fn is_terminal(&self) -> bool {
        is_terminal_state(&self.status)
    }

    pub fn succeeded(&self) -> bool {
        self.status.eq_ignore_ascii_case("completed")
    }
}

pub fn is_terminal_state(status: &str) -> bool {
    status.eq_ignore_ascii_case("completed") || status.eq_ignore_ascii_case("failed")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
}

impl ConnectionStatus {
    pub fn is_settled(&self) -> bool {
        self.connected
            || self
                .status
                .as_deref()
                .is_some_and(|status| status.eq_ignore_ascii_case("failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn status(state: &str) -> DeploymentStatus {
        DeploymentStatus {
            job_id: Some("job-1".into()),
            status: state.into(),
            progress: None,
            message: None,
            outputs: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_terminal_state() {
        let calls = Arc::new(AtomicUsize::new(0));
        let token = CancelToken::new();
        let states = ["pending", "running", "completed"];

        let counter = calls.clone();
        let outcome = poll_until(
            DEPLOY_POLL_INTERVAL,
            &token,
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, std::convert::Infallible>(status(states[n.min(2)])) }
            },
            DeploymentStatus::is_terminal,
            |_: &std::convert::Infallible| true,
        )
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Finished(status("completed")));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_loop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let token = CancelToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });

        let counter = calls.clone();
        let outcome = poll_until(
            DEPLOY_POLL_INTERVAL,
            &token,
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, std::convert::Infallible>(status("running")) }
            },
            DeploymentStatus::is_terminal,
            |_: &std::convert::Infallible| true,
        )
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Cancelled);
        assert!(token.is_cancelled());
        // ticks at 0s, 2s and 4s
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn already_cancelled_never_fetches() {
        let token = CancelToken::new();
        token.cancel();

        let outcome = poll_until(
            CONNECTION_POLL_INTERVAL,
            &token,
            || async { Err::<DeploymentStatus, _>("should not run") },
            DeploymentStatus::is_terminal,
            |_: &&str| true,
        )
        .await
        .unwrap();
        assert_eq!(outcome, PollOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_keep_polling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let token = CancelToken::new();

        let counter = calls.clone();
        let outcome = poll_until(
            DEPLOY_POLL_INTERVAL,
            &token,
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    match n {
                        0 | 1 => Err("backend unavailable"),
                        _ => Ok(status("completed")),
                    }
                }
            },
            DeploymentStatus::is_terminal,
            |_: &&str| false,
        )
        .await;

        assert_eq!(outcome, Ok(PollOutcome::Finished(status("completed"))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_end_the_loop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let token = CancelToken::new();

        let counter = calls.clone();
        let result = poll_until(
            DEPLOY_POLL_INTERVAL,
            &token,
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    match n {
                        0 => Err("timeout"),
                        _ => Err::<DeploymentStatus, _>("session expired"),
                    }
                }
            },
            DeploymentStatus::is_terminal,
            |err: &&str| *err == "session expired",
        )
        .await;

        assert_eq!(result, Err("session expired"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn terminal_states() {
        assert!(status("completed").is_terminal());
        assert!(status("FAILED").is_terminal());
        assert!(!status("running").is_terminal());
        assert!(!status("failed").succeeded());
    }
}
