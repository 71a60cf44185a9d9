//! Bounded retry-with-delay for observing remote state.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 30,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollError {
    #[error("gave up after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        last_error: Option<String>,
    },
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

/// Calls `fetch` until `done` accepts its output, the policy runs out, or `cancel` fires.
///
/// Fetch errors are logged and count as a spent attempt. A fetch still running at the
/// deadline is abandoned. A timeout too large to represent means no deadline.
pub async fn poll_until<T, E, F, Fut, P>(
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut fetch: F,
    mut done: P,
) -> Result<T, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: FnMut(&T) -> bool,
{
    let deadline = Instant::now().checked_add(policy.timeout);
    let mut attempts = 0;
    let mut last_error = None;

    while attempts < policy.max_attempts.max(1) {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled { attempts });
        }

        attempts += 1;
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(PollError::Cancelled { attempts }),
            outcome = fetch_before(deadline, fetch()) => outcome,
        };

        match outcome {
            Some(Ok(value)) if done(&value) => return Ok(value),
            Some(Ok(_)) => {
                debug!(attempt = attempts, "Poll condition not yet met");
                last_error = None;
            }
            Some(Err(err)) => {
                debug!(attempt = attempts, error = %err, "Poll attempt failed");
                last_error = Some(err.to_string());
            }
            None => {
                debug!(attempt = attempts, "Poll deadline passed during fetch");
                last_error = Some("deadline passed while fetching".to_string());
                break;
            }
        }

        if attempts >= policy.max_attempts || !sleep_fits(deadline, policy.interval) {
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(PollError::Cancelled { attempts }),
            _ = sleep(policy.interval) => {}
        }
    }

    Err(PollError::Exhausted { attempts, last_error })
}

async fn fetch_before<Fut: Future>(deadline: Option<Instant>, fetch: Fut) -> Option<Fut::Output> {
    match deadline {
        Some(deadline) => timeout_at(deadline, fetch).await.ok(),
        None => Some(fetch.await),
    }
}

fn sleep_fits(deadline: Option<Instant>, interval: Duration) -> bool {
    match deadline {
        None => true,
        Some(deadline) => Instant::now()
            .checked_add(interval)
            .is_some_and(|wake| wake <= deadline),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(max_attempts: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(1),
            max_attempts,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn stops_once_predicate_holds() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = poll_until(
            &quick(10),
            &CancellationToken::new(),
            move || async move { Ok::<_, String>(calls.fetch_add(1, Ordering::SeqCst) + 1) },
            |n| *n == 3,
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_keeps_last_error() {
        let result: Result<u32, _> = poll_until(
            &quick(4),
            &CancellationToken::new(),
            || async { Err::<u32, _>("connection refused") },
            |_| true,
        )
        .await;

        assert_eq!(
            result,
            Err(PollError::Exhausted {
                attempts: 4,
                last_error: Some("connection refused".to_string()),
            })
        );
    }

    #[tokio::test]
    async fn deadline_bounds_a_generous_attempt_budget() {
        let policy = PollPolicy {
            interval: Duration::from_millis(20),
            max_attempts: u32::MAX,
            timeout: Duration::from_millis(100),
        };
        let result = poll_until(
            &policy,
            &CancellationToken::new(),
            || async { Ok::<_, String>(()) },
            |_| false,
        )
        .await;

        match result {
            Err(PollError::Exhausted { attempts, .. }) => assert!(attempts <= 6, "attempts {attempts}"),
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unrepresentable_timeout_does_not_panic() {
        let policy = PollPolicy {
            interval: Duration::from_millis(1),
            max_attempts: 3,
            timeout: Duration::from_secs(u64::MAX),
        };
        let result = poll_until(
            &policy,
            &CancellationToken::new(),
            || async { Ok::<_, String>(()) },
            |_| false,
        )
        .await;

        assert_eq!(
            result,
            Err(PollError::Exhausted {
                attempts: 3,
                last_error: None,
            })
        );
    }

    #[tokio::test]
    async fn unrepresentable_interval_ends_after_one_attempt() {
        let policy = PollPolicy {
            interval: Duration::MAX,
            max_attempts: 5,
            timeout: Duration::from_secs(1),
        };
        let result = poll_until(
            &policy,
            &CancellationToken::new(),
            || async { Ok::<_, String>(()) },
            |_| false,
        )
        .await;

        assert_eq!(
            result,
            Err(PollError::Exhausted {
                attempts: 1,
                last_error: None,
            })
        );
    }

    #[tokio::test]
    async fn slow_fetch_is_cut_off_at_the_deadline() {
        let policy = PollPolicy {
            interval: Duration::from_millis(1),
            max_attempts: 10,
            timeout: Duration::from_millis(50),
        };
        let started = std::time::Instant::now();
        let result = poll_until(
            &policy,
            &CancellationToken::new(),
            || async {
                sleep(Duration::from_secs(30)).await;
                Ok::<_, String>(())
            },
            |_| true,
        )
        .await;

        assert!(started.elapsed() < Duration::from_secs(5));
        match result {
            Err(PollError::Exhausted { attempts, last_error }) => {
                assert_eq!(attempts, 1);
                assert!(last_error.is_some_and(|message| message.contains("deadline")));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_token_stops_polling() {
        let token = CancellationToken::new();
        token.cancel();
        let result = poll_until(&quick(10), &token, || async { Ok::<_, String>(()) }, |_| false).await;
        assert_eq!(result, Err(PollError::Cancelled { attempts: 0 }));
    }
}
