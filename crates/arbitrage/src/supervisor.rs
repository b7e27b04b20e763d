//! Retry/backoff supervision of the polling loop.
//!
//! The state machine is split in two: [`RetryPolicy`] is a pure transition
//! function, and [`Supervisor`] drives it with real sleeps raced against a
//! shutdown signal.
//!
//! ```text
//! Attempt(n) --success------------------> Idle
//! Attempt(n) --failure, n < max---------> sleep base * 2^n -> Attempt(n+1)
//! Attempt(n) --failure, n == max--------> Idle (exhausted)
//! Idle       --sleep poll_interval------> Attempt(0)
//! ```

use std::future::Future;
use std::time::Duration;

use cex_spread_core::SupervisorConfig;
use tokio::sync::watch;
use tracing::{error, info, warn};

// =============================================================================
// State Machine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Running attempt `n` of the current iteration, zero-based.
    Attempt(u32),
    /// Waiting for the next poll.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    Succeeded,
    Failed,
}

/// Result of applying one event to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: SupervisorState,
    pub sleep: Option<Duration>,
    /// Set when the last permitted attempt just failed.
    pub exhausted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub poll_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SupervisorConfig::default())
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_backoff: config.base_backoff(),
            poll_interval: config.poll_interval(),
        }
    }

    /// Delay after failed attempt `attempt`: `base_backoff * 2^attempt`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    #[must_use]
    pub fn after_attempt(&self, attempt: u32, outcome: IterationOutcome) -> Transition {
        match outcome {
            IterationOutcome::Succeeded => Transition {
                next: SupervisorState::Idle,
                sleep: None,
                exhausted: false,
            },
            IterationOutcome::Failed if attempt < self.max_retries => Transition {
                next: SupervisorState::Attempt(attempt + 1),
                sleep: Some(self.backoff(attempt)),
                exhausted: false,
            },
            IterationOutcome::Failed => Transition {
                next: SupervisorState::Idle,
                sleep: None,
                exhausted: true,
            },
        }
    }

    #[must_use]
    pub fn after_idle(&self) -> Transition {
        Transition {
            next: SupervisorState::Attempt(0),
            sleep: Some(self.poll_interval),
            exhausted: false,
        }
    }
}

// =============================================================================
// Driver
// =============================================================================

/// What one retry cycle did.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CycleOutcome {
    pub attempts: u32,
    pub backoffs: Vec<Duration>,
    pub succeeded: bool,
    pub exhausted: bool,
    pub interrupted: bool,
}

#[derive(Debug, Clone)]
pub struct Supervisor {
    policy: RetryPolicy,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    #[must_use]
    pub fn new(policy: RetryPolicy, shutdown: watch::Receiver<bool>) -> Self {
        Self { policy, shutdown }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Runs attempts of one iteration until it succeeds or retries run out.
    pub async fn run_cycle<F, Fut>(&mut self, iteration: &mut F) -> CycleOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let mut outcome = CycleOutcome::default();
        let mut state = SupervisorState::Attempt(0);

        while let SupervisorState::Attempt(n) = state {
            if self.is_shutdown() {
                outcome.interrupted = true;
                return outcome;
            }

            outcome.attempts += 1;
            let result = iteration().await;
            let event = match &result {
                Ok(()) => IterationOutcome::Succeeded,
                Err(e) => {
                    warn!(attempt = n + 1, "iteration failed: {:#}", e);
                    IterationOutcome::Failed
                }
            };

            let transition = self.policy.after_attempt(n, event);
            if event == IterationOutcome::Succeeded {
                outcome.succeeded = true;
            }
            if transition.exhausted {
                error!(
                    attempts = outcome.attempts,
                    "iteration failed after all retries, waiting for next poll"
                );
                outcome.exhausted = true;
            }
            if let Some(delay) = transition.sleep {
                outcome.backoffs.push(delay);
                info!(delay_ms = delay.as_millis() as u64, "retrying iteration");
                if !self.sleep_or_shutdown(delay).await {
                    outcome.interrupted = true;
                    return outcome;
                }
            }
            state = transition.next;
        }

        outcome
    }

    /// Polls forever until shutdown is signalled.
    pub async fn run<F, Fut>(&mut self, mut iteration: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        info!(
            max_retries = self.policy.max_retries,
            poll_interval_ms = self.policy.poll_interval.as_millis() as u64,
            "supervisor started"
        );

        loop {
            let cycle = self.run_cycle(&mut iteration).await;
            if cycle.interrupted {
                break;
            }
            let idle = self.policy.after_idle();
            if let Some(delay) = idle.sleep {
                if !self.sleep_or_shutdown(delay).await {
                    break;
                }
            }
        }

        info!("supervisor stopped");
    }

    /// Sleeps for `delay`; returns false if shutdown arrived first.
    ///
    /// A dropped sender is treated as shutdown.
    async fn sleep_or_shutdown(&mut self, delay: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + delay;
        loop {
            if self.is_shutdown() {
                return false;
            }
            tokio::select! {
                () = tokio::time::sleep_until(deadline) => return true,
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_backoff: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let p = policy();
        assert_eq!(p.backoff(0), Duration::from_secs(1));
        assert_eq!(p.backoff(1), Duration::from_secs(2));
        assert_eq!(p.backoff(2), Duration::from_secs(4));
    }

    #[test]
    fn test_transitions() {
        let p = policy();
        assert_eq!(
            p.after_attempt(0, IterationOutcome::Succeeded).next,
            SupervisorState::Idle
        );

        let t = p.after_attempt(1, IterationOutcome::Failed);
        assert_eq!(t.next, SupervisorState::Attempt(2));
        assert_eq!(t.sleep, Some(Duration::from_secs(2)));
        assert!(!t.exhausted);

        let t = p.after_attempt(3, IterationOutcome::Failed);
        assert_eq!(t.next, SupervisorState::Idle);
        assert_eq!(t.sleep, None);
        assert!(t.exhausted);

        let t = p.after_idle();
        assert_eq!(t.next, SupervisorState::Attempt(0));
        assert_eq!(t.sleep, Some(Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_after_three_backoffs() {
        let (_tx, rx) = watch::channel(false);
        let mut supervisor = Supervisor::new(policy(), rx);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let mut iteration = move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(anyhow!("exchange unreachable"))
            }
        };

        let started = tokio::time::Instant::now();
        let outcome = supervisor.run_cycle(&mut iteration).await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(outcome.attempts, 4);
        assert_eq!(
            outcome.backoffs,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
        assert!(outcome.exhausted);
        assert!(!outcome.succeeded);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(7) && elapsed < Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_retry() {
        let (_tx, rx) = watch::channel(false);
        let mut supervisor = Supervisor::new(policy(), rx);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let mut iteration = move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(anyhow!("timeout"));
                }
                Ok::<(), anyhow::Error>(())
            }
        };

        let outcome = supervisor.run_cycle(&mut iteration).await;
        assert_eq!(outcome.attempts, 2);
        assert!(outcome.succeeded);
        assert!(!outcome.exhausted);
        assert_eq!(outcome.backoffs, vec![Duration::from_secs(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_backoff() {
        let (tx, rx) = watch::channel(false);
        let mut supervisor = Supervisor::new(policy(), rx);

        let mut iteration = || async { Err::<(), _>(anyhow!("down")) };
        let handle = tokio::spawn(async move { supervisor.run_cycle(&mut iteration).await });

        tokio::time::sleep(Duration::from_millis(500)).await;
        tx.send(true).unwrap();

        let outcome = handle.await.unwrap();
        assert!(outcome.interrupted);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let mut supervisor = Supervisor::new(policy(), rx);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let handle = tokio::spawn(async move {
            supervisor
                .run(move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok::<(), anyhow::Error>(())
                    }
                })
                .await;
        });

        tokio::time::sleep(Duration::from_millis(3500)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        // polls at t = 0, 1, 2, 3
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_resumes_polling_after_exhaustion() {
        let (tx, rx) = watch::channel(false);
        let mut supervisor = Supervisor::new(policy(), rx);
        let started = tokio::time::Instant::now();
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));

        let log = Arc::clone(&calls);
        let handle = tokio::spawn(async move {
            supervisor
                .run(move || {
                    let log = Arc::clone(&log);
                    async move {
                        if let Ok(mut log) = log.lock() {
                            log.push(started.elapsed().as_secs());
                        }
                        Err::<(), _>(anyhow!("exchange unreachable"))
                    }
                })
                .await;
        });

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        // attempts at 0, 1, 3, 7 exhaust the cycle; after one poll interval
        // the next cycle starts over with a 1s backoff
        assert_eq!(*calls.lock().unwrap(), vec![0, 1, 3, 7, 8, 9]);
    }
}
