//! Terminal status observer.

use tokio::sync::broadcast;
use tracing::debug;

use probate_core::types::{FailureKind, FileSearchRow, RunOutcome, WorkflowEvent};

/// What a finished run left behind.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub rows: Vec<FileSearchRow>,
    pub error: Option<String>,
}

/// One status line for `event`, if it is worth showing.
pub fn render(event: &WorkflowEvent) -> Option<String> {
    let line = match event {
        WorkflowEvent::RunStarted { run_id, metadata } => {
            let run = run_id.simple().to_string();
            format!(
                "[run {}] started (court {})",
                &run[..8],
                metadata.county_id.as_deref().unwrap_or("default")
            )
        }
        WorkflowEvent::StepDispatched { ticket } => {
            format!("[step] {} (#{})", ticket.step, ticket.seq)
        }
        WorkflowEvent::StepRetrying {
            kind: FailureKind::Precondition,
            error,
            attempt,
            max_retries,
            ..
        } => format!("[ACTION NEEDED {attempt}/{max_retries}] {error}"),
        WorkflowEvent::StepRetrying {
            step,
            attempt,
            max_retries,
            error,
            ..
        } => format!("[retry {attempt}/{max_retries}] {step}: {error}"),
        WorkflowEvent::LoopClosed {
            index,
            stalled_count,
        } => {
            if *stalled_count > 0 {
                format!("[file] cursor {index} (no progress x{stalled_count})")
            } else {
                format!("[file] cursor {index}")
            }
        }
        WorkflowEvent::RunFinished {
            outcome,
            rows,
            error: Some(error),
            ..
        } => format!("[done: {outcome}, {} rows] {error}", rows.len()),
        WorkflowEvent::RunFinished { outcome, rows, .. } => {
            format!("[done: {outcome}, {} rows]", rows.len())
        }
        WorkflowEvent::StatusChanged(_) => return None,
    };
    Some(line)
}

/// Print events to stderr until a run finishes.
///
/// Returns `None` if the bus closes first.
pub async fn observe(mut rx: broadcast::Receiver<WorkflowEvent>) -> Option<RunReport> {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                debug!(skipped = n, "Status observer lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        };
        if let Some(line) = render(&event) {
            eprintln!("{line}");
        }
        if let WorkflowEvent::RunFinished {
            outcome,
            rows,
            error,
            ..
        } = event
        {
            return Some(RunReport {
                outcome,
                rows,
                error,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probate_core::event::EventBus;
    use probate_core::types::{Metadata, StepTicket, WorkflowStatus, WorkflowStep};
    use uuid::Uuid;

    #[test]
    fn renders_key_events() {
        let ticket = StepTicket {
            run_id: Uuid::new_v4(),
            step: WorkflowStep::CloseFile,
            seq: 7,
        };
        assert_eq!(
            render(&WorkflowEvent::StepDispatched { ticket }).unwrap(),
            "[step] CLOSE_FILE (#7)"
        );
        assert_eq!(
            render(&WorkflowEvent::StepRetrying {
                step: WorkflowStep::StartScrape,
                attempt: 1,
                max_retries: 3,
                kind: FailureKind::Precondition,
                error: "Complete the captcha".into(),
            })
            .unwrap(),
            "[ACTION NEEDED 1/3] Complete the captcha"
        );
        assert_eq!(
            render(&WorkflowEvent::LoopClosed {
                index: 4,
                stalled_count: 2
            })
            .unwrap(),
            "[file] cursor 4 (no progress x2)"
        );
        assert!(render(&WorkflowEvent::StatusChanged(WorkflowStatus::default())).is_none());
    }

    #[tokio::test]
    async fn observe_returns_finished_run() {
        let bus = EventBus::default();
        let rx = bus.subscribe();
        let run_id = Uuid::new_v4();
        bus.publish(WorkflowEvent::RunStarted {
            run_id,
            metadata: Metadata::with_county("24"),
        });
        bus.publish(WorkflowEvent::RunFinished {
            run_id,
            outcome: RunOutcome::EndOfData,
            rows: vec![FileSearchRow::default()],
            error: None,
        });

        let report = observe(rx).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::EndOfData);
        assert_eq!(report.rows.len(), 1);
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn observe_ends_when_bus_closes() {
        let bus = EventBus::default();
        let rx = bus.subscribe();
        drop(bus);
        assert!(observe(rx).await.is_none());
    }
}
