use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use probate_core::config::ExecutorConfig;
use probate_core::protocol::ExecutorSignal;
use probate_core::types::{StepFailure, StepTicket, WorkflowStep};

use crate::runner::StepRunner;
use crate::service::CoordinatorHandle;

/// Result of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Another poll is still executing a step.
    Busy,
    /// Nothing to do.
    Idle,
    /// A step was executed and reported.
    Executed(WorkflowStep),
}

/// Clears the single-flight latch however the poll ends.
struct Latch<'a>(&'a AtomicBool);

impl Drop for Latch<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Executor-side loop: asks the coordinator what to do, runs it, reports back.
///
/// Polls on an adaptive interval (halved after a step ran, grown while idle,
/// clamped to the configured bounds) and immediately on a CHECK_STATUS push.
/// At most one step executes at a time.
pub struct Poller {
    handle: CoordinatorHandle,
    runner: StepRunner,
    config: ExecutorConfig,
    cancel: CancellationToken,
    executing: AtomicBool,
    last_executed: Mutex<Option<StepTicket>>,
}

impl Poller {
    pub fn new(
        handle: CoordinatorHandle,
        runner: StepRunner,
        config: ExecutorConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            handle,
            runner,
            config,
            cancel,
            executing: AtomicBool::new(false),
            last_executed: Mutex::new(None),
        }
    }

    /// Run the poll loop. Blocks until cancelled.
    pub async fn run(&self, mut signals: mpsc::Receiver<ExecutorSignal>) {
        let mut interval = clamp_interval(
            Duration::from_millis(self.config.poll_initial_ms),
            &self.config,
        );
        info!(
            min_ms = self.config.poll_min_ms,
            max_ms = self.config.poll_max_ms,
            timeout_secs = self.runner.timeout().as_secs(),
            "Poller started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                Some(signal) = signals.recv() => {
                    debug!(?signal, "Executor signal received");
                }
                _ = self.cancel.cancelled() => {
                    info!("Poller shutting down");
                    break;
                }
            }

            let outcome = self.check_and_execute().await;
            interval = next_interval(
                interval,
                matches!(outcome, PollOutcome::Executed(_)),
                &self.config,
            );
        }
    }

    /// One poll: fetch status and, if a new step is waiting, execute it.
    pub async fn check_and_execute(&self) -> PollOutcome {
        if self
            .executing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return PollOutcome::Busy;
        }
        let _latch = Latch(&self.executing);

        let status = match self.handle.status().await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Status request failed");
                return PollOutcome::Idle;
            }
        };
        if status.settling {
            return PollOutcome::Idle;
        }
        let Some(ticket) = status.ticket() else {
            return PollOutcome::Idle;
        };
        if !self.claim(ticket) {
            return PollOutcome::Idle;
        }

        let step = ticket.step;
        let report = match self.runner.run(step, &status.metadata).await {
            Ok(output) => {
                info!(step = %step, "Step completed");
                self.handle.step_complete(Some(ticket), output).await
            }
            Err(e) => {
                let failure = StepFailure::from(&e);
                warn!(step = %step, kind = ?failure.kind, error = %failure.error, "Step failed");
                self.handle.step_failed(Some(ticket), failure).await
            }
        };

        match report {
            Ok(true) => {}
            Ok(false) => debug!(step = %step, "Report ignored by coordinator (stale)"),
            Err(e) => warn!(step = %step, error = %e, "Failed to report step result"),
        }
        PollOutcome::Executed(step)
    }

    /// Record `ticket` as executed; false if it already was.
    fn claim(&self, ticket: StepTicket) -> bool {
        let mut last = self
            .last_executed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *last == Some(ticket) {
            return false;
        }
        *last = Some(ticket);
        true
    }
}

fn clamp_interval(interval: Duration, config: &ExecutorConfig) -> Duration {
    interval.clamp(
        Duration::from_millis(config.poll_min_ms),
        Duration::from_millis(config.poll_max_ms),
    )
}

/// Shrink the interval after activity, grow it while idle.
fn next_interval(current: Duration, active: bool, config: &ExecutorConfig) -> Duration {
    let next = if active {
        current / 2
    } else {
        // Out-of-range growth saturates at the ceiling.
        Duration::try_from_secs_f64(current.as_secs_f64() * config.poll_growth)
            .unwrap_or(Duration::from_millis(config.poll_max_ms))
    };
    clamp_interval(next, config)
}
