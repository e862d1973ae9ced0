//! End-to-end runs of coordinator, service and poller against a scripted
//! executor.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use probate_agent::{Coordinator, CoordinatorService, Poller, StepGraph, StepRunner};
use probate_core::event::EventBus;
use probate_core::types::{
    FileSearchRow, Metadata, RunOutcome, WorkflowEvent, WorkflowStep,
};
use probate_test_utils::{sample_rows, test_config, Scripted, ScriptedExecutor};

struct Finished {
    outcome: RunOutcome,
    rows: Vec<FileSearchRow>,
    error: Option<String>,
}

async fn run_pipeline(executor: Arc<ScriptedExecutor>, metadata: Metadata) -> Finished {
    let config = test_config();
    let bus = Arc::new(EventBus::default());
    let mut events = bus.subscribe();

    let coordinator = Coordinator::new(config.workflow.clone(), StepGraph::probate(), bus);
    let (signal_tx, signal_rx) = mpsc::channel(1);
    let (service, handle) = CoordinatorService::new(coordinator, signal_tx);
    tokio::spawn(service.run());

    let cancel = CancellationToken::new();
    let runner = StepRunner::new(executor, config.executor.step_timeout());
    let poller = Poller::new(handle.clone(), runner, config.executor.clone(), cancel.clone());
    let poller_task = tokio::spawn(async move { poller.run(signal_rx).await });

    assert!(handle.start(metadata).await.unwrap());

    let finished = loop {
        match events.recv().await {
            Ok(WorkflowEvent::RunFinished {
                outcome,
                rows,
                error,
                ..
            }) => break Finished { outcome, rows, error },
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
        }
    };

    cancel.cancel();
    poller_task.await.unwrap();
    finished
}

#[tokio::test(start_paused = true)]
async fn walks_every_row_until_end_of_data() {
    let executor = Arc::new(ScriptedExecutor::with_rows(3));
    let finished = run_pipeline(executor.clone(), Metadata::with_county("24")).await;

    assert_eq!(finished.outcome, RunOutcome::EndOfData);
    assert_eq!(finished.rows, sample_rows(3));
    assert!(finished.error.is_none());
    assert_eq!(executor.open_indices(), vec![0, 1, 2, 3]);

    let calls = executor.calls();
    assert_eq!(
        &calls[..4],
        &[
            WorkflowStep::StartScrape,
            WorkflowStep::FileSearchHome,
            WorkflowStep::FileSearchResults,
            WorkflowStep::OpenFileLinks,
        ]
    );
    let petitions = calls
        .iter()
        .filter(|s| **s == WorkflowStep::ClickProbatePetition)
        .count();
    assert_eq!(petitions, 3);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_transparently() {
    let executor = Arc::new(ScriptedExecutor::with_rows(1));
    executor.push(WorkflowStep::FileSearchHome, Scripted::Transient("form not ready".into()));
    executor.push(WorkflowStep::CloseFile, Scripted::Transient("Close button not found".into()));

    let finished = run_pipeline(executor.clone(), Metadata::default()).await;

    assert_eq!(finished.outcome, RunOutcome::EndOfData);
    assert_eq!(finished.rows.len(), 1);
    let homes = executor
        .calls()
        .iter()
        .filter(|s| **s == WorkflowStep::FileSearchHome)
        .count();
    assert_eq!(homes, 2);
}

#[tokio::test(start_paused = true)]
async fn opens_that_never_register_stall_the_loop() {
    let executor = Arc::new(ScriptedExecutor::with_rows(5));
    for _ in 0..3 {
        executor.push(WorkflowStep::OpenFileLinks, Scripted::Done);
    }

    let finished = run_pipeline(executor.clone(), Metadata::default()).await;

    assert_eq!(finished.outcome, RunOutcome::Stalled);
    assert_eq!(finished.rows.len(), 5);
    assert_eq!(executor.open_indices(), vec![0, 0, 0]);
}

#[tokio::test(start_paused = true)]
async fn uncleared_captcha_exhausts_retries() {
    let executor = Arc::new(ScriptedExecutor::with_rows(1));
    let message = "Complete the captcha and select \"File Search\"";
    for _ in 0..4 {
        executor.push(WorkflowStep::StartScrape, Scripted::Precondition(message.into()));
    }

    let finished = run_pipeline(executor.clone(), Metadata::default()).await;

    assert_eq!(finished.outcome, RunOutcome::Failed);
    assert_eq!(finished.error.as_deref(), Some(message));
    assert!(finished.rows.is_empty());
    assert_eq!(executor.calls(), vec![WorkflowStep::StartScrape; 4]);
}

#[tokio::test(start_paused = true)]
async fn result_set_shrinking_mid_loop_ends_at_first_missing_row() {
    let executor = Arc::new(ScriptedExecutor::with_rows(5));
    executor.push(WorkflowStep::FileSearchResults, Scripted::Rows(sample_rows(2)));
    executor.push(WorkflowStep::OpenFileLinks, Scripted::Opened(0));
    executor.push(WorkflowStep::OpenFileLinks, Scripted::Opened(1));
    executor.push(WorkflowStep::OpenFileLinks, Scripted::OutOfRange);

    let finished = run_pipeline(executor.clone(), Metadata::default()).await;

    assert_eq!(finished.outcome, RunOutcome::EndOfData);
    assert_eq!(finished.rows, sample_rows(2));
    assert!(finished.error.is_none());
    assert_eq!(executor.open_indices(), vec![0, 1, 2]);
}
