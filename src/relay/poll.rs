//! Bounded run polling.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::RelayError;
use crate::llm::{Run, RunApi};

/// How often and how long to poll a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay before the first status check.
    pub initial_interval: Duration,
    /// Upper bound for a single delay.
    pub max_interval: Duration,
    /// Growth factor applied after each check (>= 1.0).
    pub multiplier: f64,
    /// Give up once this much time has passed since the run was created.
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(5),
            multiplier: 1.5,
            max_wait: Duration::from_secs(300),
        }
    }
}

impl PollPolicy {
    /// Delay that follows `current`.
    pub fn next_interval(&self, current: Duration) -> Duration {
        let grown = current.as_secs_f64() * self.multiplier.max(1.0);
        Duration::try_from_secs_f64(grown)
            .unwrap_or(self.max_interval)
            .min(self.max_interval)
    }
}

/// Poll `run` until it reaches a terminal status.
///
/// Returns the settled run, or `RelayError::RunTimedOut` when the policy's
/// maximum wait elapses first. Errors from the status call abort the wait.
pub async fn wait_for_run(
    api: &dyn RunApi,
    thread_id: &str,
    mut run: Run,
    policy: &PollPolicy,
) -> Result<Run, RelayError> {
    let started = Instant::now();
    let mut interval = policy.initial_interval;
    let mut checks: u32 = 0;

    loop {
        if run.status.is_terminal() {
            tracing::debug!(
                run_id = %run.id,
                status = %run.status,
                checks,
                elapsed = ?started.elapsed(),
                "Run settled"
            );
            return Ok(run);
        }

        let elapsed = started.elapsed();
        if elapsed >= policy.max_wait {
            return Err(RelayError::RunTimedOut {
                thread_id: thread_id.to_string(),
                run_id: run.id,
                waited: elapsed,
            });
        }

        tokio::time::sleep(interval.min(policy.max_wait - elapsed)).await;
        interval = policy.next_interval(interval);

        run = api.get_run(thread_id, &run.id).await?;
        checks += 1;
        tracing::trace!(run_id = %run.id, status = %run.status, "Polled run");
    }
}
