/// Generic repeated-polling primitive.
///
/// Every asynchronous backend stage (analysis completion, entity three-view
/// generation, asset-batch generation) goes through this one loop rather than
/// re-rolling its own.
use remote_api::ApiError;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Sleep between fetches. Never applied before the first fetch.
    pub interval: Duration,
    /// Total fetch budget; exhausting it is the only timeout path.
    pub max_attempts: u32,
}

impl PollConfig {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), 60)
    }
}

/// Best-effort cancellation handle shared between the poller and its owner.
/// Cancelling stops further fetches; an already-issued request is not aborted.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Terminal result of a poll that did not time out.
#[derive(Debug, PartialEq)]
pub enum PollOutcome<S> {
    /// The done-predicate accepted this status.
    Completed(S),
    /// The cancel token fired before a terminal status was seen.
    Cancelled,
}

#[derive(Debug, Error)]
pub enum PollError<S> {
    #[error("polling timed out after {attempts} attempts")]
    Timeout {
        attempts: u32,
        /// Most recent successfully fetched status, for diagnostics.
        last_seen: Option<S>,
    },
}

/// Repeatedly invoke `fetch` until `is_done` accepts a status, the attempt
/// budget runs out, or `cancel` fires.
///
/// `on_update` is called once per successful fetch, in fetch order, including
/// the terminal one. A fetch error is swallowed as "still processing": it
/// consumes an attempt but does not terminate the loop.
pub async fn poll<S, F, Fut, D, U>(
    mut fetch: F,
    is_done: D,
    mut on_update: U,
    config: PollConfig,
    cancel: &CancelToken,
) -> Result<PollOutcome<S>, PollError<S>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S, ApiError>>,
    D: Fn(&S) -> bool,
    U: FnMut(&S),
{
    let mut last_seen = None;
    for attempt in 1..=config.max_attempts {
        if cancel.is_cancelled() {
            return Ok(PollOutcome::Cancelled);
        }
        match fetch().await {
            Ok(status) => {
                on_update(&status);
                if is_done(&status) {
                    return Ok(PollOutcome::Completed(status));
                }
                last_seen = Some(status);
            }
            Err(err) => {
                let max_attempts = config.max_attempts;
                log::debug!(
                    "poll attempt {attempt}/{max_attempts} failed, treating as still processing: {err}"
                );
            }
        }
        if attempt < config.max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
                _ = tokio::time::sleep(config.interval) => {}
            }
        }
    }
    Err(PollError::Timeout {
        attempts: config.max_attempts,
        last_seen,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn fast(max_attempts: u32) -> PollConfig {
        PollConfig::new(Duration::from_millis(10), max_attempts)
    }

    #[tokio::test(start_paused = true)]
    async fn completes_on_terminal_status_with_exact_update_count() {
        let sequence = Mutex::new(vec![1u32, 2, 3].into_iter());
        let updates = Mutex::new(Vec::new());
        let cancel = CancelToken::new();

        let outcome = poll(
            || {
                let next = sequence.lock().unwrap().next().unwrap();
                async move { Ok(next) }
            },
            |s| *s == 3,
            |s| updates.lock().unwrap().push(*s),
            fast(10),
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Completed(3));
        assert_eq!(*updates.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_exact_attempt_budget() {
        let updates = Mutex::new(0u32);
        let cancel = CancelToken::new();

        let result = poll(
            || async { Ok(0u32) },
            |_| false,
            |_| *updates.lock().unwrap() += 1,
            fast(4),
            &cancel,
        )
        .await;

        match result {
            Err(PollError::Timeout {
                attempts,
                last_seen,
            }) => {
                assert_eq!(attempts, 4);
                assert_eq!(last_seen, Some(0));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(*updates.lock().unwrap(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_errors_are_swallowed_until_budget_exhausted() {
        let calls = Mutex::new(0u32);
        let updates = Mutex::new(Vec::new());
        let cancel = CancelToken::new();

        let outcome = poll(
            || {
                let n = {
                    let mut c = calls.lock().unwrap();
                    *c += 1;
                    *c
                };
                async move {
                    if n < 3 {
                        Err(ApiError::Unavailable("connection reset".into()))
                    } else {
                        Ok(n)
                    }
                }
            },
            |s| *s == 3,
            |s| updates.lock().unwrap().push(*s),
            fast(10),
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Completed(3));
        // Errored fetches produce no status to report.
        assert_eq!(*updates.lock().unwrap(), vec![3]);
        assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn errors_alone_still_time_out() {
        let cancel = CancelToken::new();
        let result: Result<PollOutcome<u32>, _> = poll(
            || async { Err(ApiError::Unavailable("down".into())) },
            |_| true,
            |_| {},
            fast(3),
            &cancel,
        )
        .await;
        assert!(matches!(
            result,
            Err(PollError::Timeout {
                attempts: 3,
                last_seen: None
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn pre_cancelled_token_skips_all_fetches() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome: PollOutcome<u32> = poll(
            || async { panic!("fetch must not run") },
            |_| true,
            |_| {},
            fast(10),
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(outcome, PollOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_mid_poll_resolves_cancelled_not_timeout() {
        let cancel = CancelToken::new();
        let updates = Mutex::new(0u32);

        let outcome = poll(
            || {
                // Cancel while "work" is still pending remotely.
                let n = {
                    let mut c = updates.lock().unwrap();
                    *c += 1;
                    *c
                };
                let cancel = cancel.clone();
                async move {
                    if n == 2 {
                        cancel.cancel();
                    }
                    Ok(n)
                }
            },
            |_| false,
            |_| {},
            fast(100),
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Cancelled);
        assert_eq!(*updates.lock().unwrap(), 2);
    }
}
