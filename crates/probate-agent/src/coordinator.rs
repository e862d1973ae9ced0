use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use probate_core::config::WorkflowConfig;
use probate_core::event::EventBus;
use probate_core::types::{
    FailureKind, FileSearchRow, Metadata, RunOutcome, StepOutput, StepTicket, WorkflowEvent,
    WorkflowStatus, WorkflowStep,
};

use crate::graph::{StepGraph, Transition};

/// What the caller should do after a coordinator transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Nothing changed: already active, inactive, or a stale report.
    Ignored,
    /// A step is ready. Wake the executor, after `delay` if one is given.
    Dispatch {
        ticket: StepTicket,
        delay: Option<Duration>,
    },
    /// The run ended.
    Finished(RunOutcome),
}

/// The single mutable record of one run. Replaced wholesale on start and on
/// every terminal transition.
#[derive(Debug, Clone, Default)]
struct WorkflowState {
    is_active: bool,
    current_step: Option<WorkflowStep>,
    metadata: Metadata,
    retry_count: u32,
    stalled_count: u32,
    run_id: Option<Uuid>,
    dispatch_seq: u64,
    rows: Vec<FileSearchRow>,
    files_processed: usize,
    hold_until: Option<Instant>,
}

impl WorkflowState {
    fn running(entry: WorkflowStep, mut metadata: Metadata) -> Self {
        metadata.current_index = 0;
        metadata.last_successful_index = Some(0);
        metadata.opened_index = None;
        Self {
            is_active: true,
            current_step: Some(entry),
            metadata,
            run_id: Some(Uuid::new_v4()),
            dispatch_seq: 1,
            ..Self::default()
        }
    }

    fn ticket(&self) -> Option<StepTicket> {
        Some(StepTicket {
            run_id: self.run_id?,
            step: self.current_step?,
            seq: self.dispatch_seq,
        })
    }
}

/// Workflow coordinator: owns the workflow state and decides what runs next.
///
/// Never touches the page. Every mutation goes through one of the report
/// methods, which enforce:
/// - `current_step` is `None` exactly when the run is inactive,
/// - `retry_count` never exceeds `max_retries`,
/// - the cursor never moves backwards while active.
pub struct Coordinator {
    config: WorkflowConfig,
    graph: StepGraph,
    event_bus: Arc<EventBus>,
    state: WorkflowState,
    last_error: Option<String>,
    last_outcome: Option<RunOutcome>,
}

impl Coordinator {
    pub fn new(config: WorkflowConfig, graph: StepGraph, event_bus: Arc<EventBus>) -> Self {
        Self {
            config,
            graph,
            event_bus,
            state: WorkflowState::default(),
            last_error: None,
            last_outcome: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active
    }

    /// Read-only snapshot of the current state.
    pub fn status(&self) -> WorkflowStatus {
        let s = &self.state;
        WorkflowStatus {
            is_active: s.is_active,
            current_step: s.current_step,
            metadata: s.metadata.clone(),
            retry_count: s.retry_count,
            stalled_count: s.stalled_count,
            run_id: s.run_id,
            dispatch_seq: s.dispatch_seq,
            rows_found: s.rows.len(),
            files_processed: s.files_processed,
            settling: s.hold_until.is_some_and(|t| Instant::now() < t),
            last_error: self.last_error.clone(),
            last_outcome: self.last_outcome,
        }
    }

    /// Begin a run at the graph's entry step. A no-op while a run is active.
    pub fn start(&mut self, metadata: Metadata) -> Directive {
        if self.state.is_active {
            warn!(run_id = ?self.state.run_id, "Start ignored: a run is already active");
            return Directive::Ignored;
        }

        self.state = WorkflowState::running(self.graph.entry(), metadata);
        self.last_error = None;
        self.last_outcome = None;

        let Some(ticket) = self.state.ticket() else {
            return Directive::Ignored;
        };
        info!(run_id = %ticket.run_id, county = ?self.state.metadata.county_id, "Workflow started");
        self.event_bus.publish(WorkflowEvent::RunStarted {
            run_id: ticket.run_id,
            metadata: self.state.metadata.clone(),
        });
        self.event_bus.publish(WorkflowEvent::StepDispatched { ticket });
        self.publish_status();

        Directive::Dispatch {
            ticket,
            delay: None,
        }
    }

    /// Return to idle from any state.
    pub fn stop(&mut self) -> Directive {
        if !self.state.is_active {
            self.state = WorkflowState::default();
            return Directive::Ignored;
        }
        info!(run_id = ?self.state.run_id, step = ?self.state.current_step, "Workflow stopped");
        self.finish(RunOutcome::Stopped, None)
    }

    /// Apply a successful step report.
    pub fn report_step_complete(
        &mut self,
        ticket: Option<StepTicket>,
        output: StepOutput,
    ) -> Directive {
        let Some(step) = self.accepts(ticket, "STEP_COMPLETE") else {
            return Directive::Ignored;
        };

        self.state.retry_count = 0;
        self.last_error = None;
        self.record_output(step, output);

        match self.graph.transition(step) {
            Transition::Advance(next) => {
                debug!(from = %step, to = %next, "Step complete");
                self.dispatch(next, None)
            }
            Transition::CloseLoop(head) => self.close_loop(head),
            Transition::Finish => {
                info!(step = %step, "Step catalog exhausted");
                self.finish(RunOutcome::Completed, None)
            }
        }
    }

    /// Apply a failed step report: retry, end the loop, or fail the run.
    pub fn report_step_failed(
        &mut self,
        ticket: Option<StepTicket>,
        kind: FailureKind,
        error: String,
    ) -> Directive {
        let Some(step) = self.accepts(ticket, "STEP_FAILED") else {
            return Directive::Ignored;
        };

        if kind == FailureKind::EndOfData && self.graph.in_loop(step) {
            info!(
                step = %step,
                index = self.state.metadata.current_index,
                reason = %error,
                "End of result set"
            );
            return self.finish(RunOutcome::EndOfData, None);
        }

        let max_retries = self.config.max_retries;
        if self.state.retry_count >= max_retries {
            warn!(step = %step, max_retries, error = %error, "Retries exhausted; workflow failed");
            return self.finish(RunOutcome::Failed, Some(error));
        }

        self.state.retry_count += 1;
        let attempt = self.state.retry_count;
        if kind == FailureKind::Precondition {
            warn!(step = %step, error = %error, "Step needs user action");
        } else {
            warn!(step = %step, attempt, max_retries, error = %error, "Retrying step");
        }
        self.last_error = Some(error.clone());
        self.event_bus.publish(WorkflowEvent::StepRetrying {
            step,
            attempt,
            max_retries,
            kind,
            error,
        });
        self.dispatch(step, None)
    }

    /// Check that a report belongs to the dispatch currently awaiting
    /// execution, and return its step.
    fn accepts(&self, ticket: Option<StepTicket>, kind: &str) -> Option<WorkflowStep> {
        if !self.state.is_active {
            debug!(report = kind, "Ignoring report: no active run");
            return None;
        }
        let current = self.state.ticket()?;
        match ticket {
            Some(t) if t != current => {
                debug!(
                    report = kind,
                    reported_step = %t.step,
                    reported_seq = t.seq,
                    current_step = %current.step,
                    current_seq = current.seq,
                    "Ignoring stale report"
                );
                None
            }
            _ => Some(current.step),
        }
    }

    fn record_output(&mut self, step: WorkflowStep, output: StepOutput) {
        match output {
            StepOutput::Rows { rows } if step == WorkflowStep::FileSearchResults => {
                info!(rows = rows.len(), "Search results recorded");
                self.state.rows = rows;
            }
            StepOutput::Opened { index } => {
                self.state.metadata.opened_index = Some(index);
            }
            StepOutput::Rows { rows } => {
                debug!(step = %step, rows = rows.len(), "Discarding rows from non-results step");
            }
            StepOutput::Done => {}
        }
    }

    /// Bookkeeping at the end of one open/click/close iteration.
    fn close_loop(&mut self, head: WorkflowStep) -> Directive {
        let meta = &mut self.state.metadata;
        if let Some(opened) = meta.opened_index.take() {
            meta.current_index = meta.current_index.max(opened + 1);
            self.state.files_processed += 1;
        }

        if meta.last_successful_index == Some(meta.current_index) {
            self.state.stalled_count += 1;
        } else {
            self.state.stalled_count = 0;
            meta.last_successful_index = Some(meta.current_index);
        }

        let index = meta.current_index;
        let stalled_count = self.state.stalled_count;
        debug!(index, stalled_count, "Loop iteration closed");
        self.event_bus.publish(WorkflowEvent::LoopClosed {
            index,
            stalled_count,
        });

        if index >= self.config.max_index {
            info!(index, max_index = self.config.max_index, "Index bound reached");
            return self.finish(RunOutcome::IndexBound, None);
        }
        if stalled_count >= self.config.stall_threshold {
            warn!(index, stalled_count, "No progress across loop iterations; stopping");
            return self.finish(RunOutcome::Stalled, None);
        }

        self.dispatch(head, Some(self.config.close_settle()))
    }

    fn dispatch(&mut self, step: WorkflowStep, delay: Option<Duration>) -> Directive {
        self.state.current_step = Some(step);
        self.state.dispatch_seq += 1;
        self.state.hold_until = delay.map(|d| Instant::now() + d);

        let Some(ticket) = self.state.ticket() else {
            return Directive::Ignored;
        };
        self.event_bus.publish(WorkflowEvent::StepDispatched { ticket });
        self.publish_status();
        Directive::Dispatch { ticket, delay }
    }

    fn finish(&mut self, outcome: RunOutcome, error: Option<String>) -> Directive {
        let state = std::mem::take(&mut self.state);
        if let Some(run_id) = state.run_id {
            info!(
                run_id = %run_id,
                outcome = %outcome,
                rows = state.rows.len(),
                files = state.files_processed,
                "Workflow finished"
            );
            self.event_bus.publish(WorkflowEvent::RunFinished {
                run_id,
                outcome,
                rows: state.rows,
                error: error.clone(),
            });
        }

        // Only a failed run carries an error past its end.
        self.last_outcome = Some(outcome);
        self.last_error = error;
        self.publish_status();
        Directive::Finished(outcome)
    }

    fn publish_status(&self) {
        self.event_bus
            .publish(WorkflowEvent::StatusChanged(self.status()));
    }
}
