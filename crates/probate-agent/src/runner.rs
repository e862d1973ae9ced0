use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use probate_core::error::{ProbateError, Result};
use probate_core::traits::StepExecutor;
use probate_core::types::{Metadata, StepOutput, WorkflowStep};

/// Runs executor steps under a uniform timeout.
///
/// Every dispatch goes through `run`, so a step that hangs on the page turns
/// into a `StepTimeout` failure instead of blocking the poller. Retries are
/// the coordinator's business.
#[derive(Clone)]
pub struct StepRunner {
    executor: Arc<dyn StepExecutor>,
    timeout: Duration,
}

impl StepRunner {
    pub fn new(executor: Arc<dyn StepExecutor>, timeout: Duration) -> Self {
        Self { executor, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute one step, racing it against the timeout.
    pub async fn run(&self, step: WorkflowStep, metadata: &Metadata) -> Result<StepOutput> {
        let start = Instant::now();
        debug!(step = %step, index = metadata.current_index, "Executing step");

        let result = match tokio::time::timeout(self.timeout, self.executor.execute(step, metadata)).await {
            Ok(result) => result,
            Err(_) => Err(ProbateError::StepTimeout {
                step,
                timeout_secs: self.timeout.as_secs(),
            }),
        };

        debug!(
            step = %step,
            elapsed_ms = start.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Step settled"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probate_core::types::FailureKind;
    use probate_test_utils::{Scripted, ScriptedExecutor};

    #[tokio::test]
    async fn passes_through_results() {
        let executor = Arc::new(ScriptedExecutor::with_rows(2));
        let runner = StepRunner::new(executor, Duration::from_secs(30));

        let out = runner
            .run(WorkflowStep::OpenFileLinks, &Metadata::default())
            .await
            .unwrap();
        assert_eq!(out, StepOutput::Opened { index: 0 });

        let meta = Metadata {
            current_index: 2,
            ..Metadata::default()
        };
        let err = runner.run(WorkflowStep::OpenFileLinks, &meta).await.unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::EndOfData);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_step_times_out() {
        let executor = Arc::new(ScriptedExecutor::with_rows(1));
        executor.push(WorkflowStep::CloseFile, Scripted::Hang);
        let runner = StepRunner::new(executor.clone(), Duration::from_secs(30));

        let err = runner
            .run(WorkflowStep::CloseFile, &Metadata::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProbateError::StepTimeout {
                step: WorkflowStep::CloseFile,
                timeout_secs: 30
            }
        ));
        assert_eq!(err.failure_kind(), FailureKind::Transient);
        assert_eq!(executor.calls(), vec![WorkflowStep::CloseFile]);
    }
}
