//! Serialized access to the coordinator.
//!
//! All requests flow through one mpsc lane into the task that owns the
//! `Coordinator`, so no two mutations ever interleave. Callers hold a
//! cloneable `CoordinatorHandle` and await a oneshot reply.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use probate_core::error::{ProbateError, Result};
use probate_core::protocol::{ExecutorSignal, Request, Response};
use probate_core::types::{
    Metadata, StepFailure, StepOutput, StepTicket, WorkflowStatus,
};

use crate::coordinator::{Coordinator, Directive};

/// A request queued for the coordinator.
struct Envelope {
    request: Request,
    respond: oneshot::Sender<Response>,
}

/// Cloneable client for the coordinator task.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Envelope>,
}

impl CoordinatorHandle {
    /// Enqueue a request and wait for the reply.
    pub async fn send(&self, request: Request) -> Result<Response> {
        let name = request.name();
        let (respond, rx) = oneshot::channel();
        self.tx
            .send(Envelope { request, respond })
            .await
            .map_err(|_| ProbateError::CoordinatorClosed(format!("{name}: lane closed")))?;
        rx.await
            .map_err(|_| ProbateError::CoordinatorClosed(format!("{name}: no reply")))
    }

    /// START_WORKFLOW. Returns false if a run was already active.
    pub async fn start(&self, metadata: Metadata) -> Result<bool> {
        self.ack(Request::StartWorkflow { metadata }).await
    }

    /// STOP_WORKFLOW.
    pub async fn stop(&self) -> Result<()> {
        self.ack(Request::StopWorkflow).await.map(|_| ())
    }

    /// GET_STATUS.
    pub async fn status(&self) -> Result<WorkflowStatus> {
        match self.send(Request::GetStatus).await? {
            Response::Status { status } => Ok(status),
            other => Err(ProbateError::CoordinatorClosed(format!(
                "GET_STATUS: unexpected reply {other:?}"
            ))),
        }
    }

    /// STEP_COMPLETE. Returns false if the report was stale.
    pub async fn step_complete(&self, ticket: Option<StepTicket>, result: StepOutput) -> Result<bool> {
        self.ack(Request::StepComplete { ticket, result }).await
    }

    /// STEP_FAILED. Returns false if the report was stale.
    pub async fn step_failed(&self, ticket: Option<StepTicket>, failure: StepFailure) -> Result<bool> {
        self.ack(Request::step_failed(ticket, failure)).await
    }

    async fn ack(&self, request: Request) -> Result<bool> {
        match self.send(request).await? {
            Response::Ack { applied } => Ok(applied),
            Response::Status { .. } => Ok(true),
        }
    }
}

/// The task owning the coordinator.
pub struct CoordinatorService {
    coordinator: Coordinator,
    rx: mpsc::Receiver<Envelope>,
    signals: mpsc::Sender<ExecutorSignal>,
}

impl CoordinatorService {
    /// Wrap `coordinator`; `signals` receives CHECK_STATUS pushes for the
    /// executor side.
    pub fn new(
        coordinator: Coordinator,
        signals: mpsc::Sender<ExecutorSignal>,
    ) -> (Self, CoordinatorHandle) {
        let (tx, rx) = mpsc::channel(64);
        let service = Self {
            coordinator,
            rx,
            signals,
        };
        (service, CoordinatorHandle { tx })
    }

    /// Serve requests until every handle is dropped.
    pub async fn run(mut self) {
        while let Some(Envelope { request, respond }) = self.rx.recv().await {
            let response = self.handle(request);
            if respond.send(response).is_err() {
                debug!("Requester went away before the reply");
            }
        }
        debug!("Coordinator lane closed");
    }

    fn handle(&mut self, request: Request) -> Response {
        let directive = match request {
            Request::GetStatus => {
                return Response::Status {
                    status: self.coordinator.status(),
                }
            }
            Request::StartWorkflow { metadata } => self.coordinator.start(metadata),
            Request::StopWorkflow => self.coordinator.stop(),
            Request::StepComplete { ticket, result } => {
                self.coordinator.report_step_complete(ticket, result)
            }
            Request::StepFailed {
                ticket,
                kind,
                error,
            } => self.coordinator.report_step_failed(ticket, kind, error),
        };
        self.follow(directive);
        Response::Ack {
            applied: directive != Directive::Ignored,
        }
    }

    /// Tell the executor side to poll once the directive allows it.
    fn follow(&self, directive: Directive) {
        match directive {
            Directive::Ignored => {}
            Directive::Dispatch {
                delay: Some(delay), ..
            } => {
                let signals = self.signals.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    nudge(&signals);
                });
            }
            Directive::Dispatch { delay: None, .. } | Directive::Finished(_) => {
                nudge(&self.signals);
            }
        }
    }
}

/// Best-effort CHECK_STATUS push.
fn nudge(signals: &mpsc::Sender<ExecutorSignal>) {
    match signals.try_send(ExecutorSignal::CheckStatus) {
        Ok(()) => {}
        // One pending signal is as good as many.
        Err(mpsc::error::TrySendError::Full(_)) => {}
        Err(mpsc::error::TrySendError::Closed(_)) => {
            warn!("Executor signal channel closed; relying on polling");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use probate_core::config::WorkflowConfig;
    use probate_core::event::EventBus;
    use probate_core::types::{FailureKind, WorkflowStep};

    use super::*;
    use crate::graph::StepGraph;

    fn spawn_service() -> (CoordinatorHandle, mpsc::Receiver<ExecutorSignal>) {
        let coordinator = Coordinator::new(
            WorkflowConfig::default(),
            StepGraph::probate(),
            Arc::new(EventBus::default()),
        );
        let (signal_tx, signal_rx) = mpsc::channel(1);
        let (service, handle) = CoordinatorService::new(coordinator, signal_tx);
        tokio::spawn(service.run());
        (handle, signal_rx)
    }

    #[tokio::test]
    async fn status_before_start_is_idle() {
        let (handle, _signals) = spawn_service();
        let status = handle.status().await.unwrap();
        assert!(!status.is_active);
        assert!(status.current_step.is_none());
    }

    #[tokio::test]
    async fn start_pushes_check_status() {
        let (handle, mut signals) = spawn_service();
        assert!(handle.start(Metadata::with_county("24")).await.unwrap());
        assert_eq!(signals.recv().await, Some(ExecutorSignal::CheckStatus));

        let status = handle.status().await.unwrap();
        assert_eq!(status.current_step, Some(WorkflowStep::StartScrape));
        assert!(!handle.start(Metadata::default()).await.unwrap());
    }

    #[tokio::test]
    async fn reports_are_acknowledged() {
        let (handle, _signals) = spawn_service();
        handle.start(Metadata::default()).await.unwrap();
        let ticket = handle.status().await.unwrap().ticket();

        assert!(handle.step_complete(ticket, StepOutput::Done).await.unwrap());
        // Same ticket again is stale.
        assert!(!handle.step_complete(ticket, StepOutput::Done).await.unwrap());

        let ticket = handle.status().await.unwrap().ticket();
        let failure = StepFailure {
            kind: FailureKind::Transient,
            error: "Close button not found".into(),
        };
        assert!(handle.step_failed(ticket, failure).await.unwrap());
        assert_eq!(handle.status().await.unwrap().retry_count, 1);
    }

    #[tokio::test]
    async fn stop_is_always_acknowledged() {
        let (handle, _signals) = spawn_service();
        handle.stop().await.unwrap();
        handle.start(Metadata::default()).await.unwrap();
        handle.stop().await.unwrap();
        let status = handle.status().await.unwrap();
        assert!(!status.is_active);
        assert!(status.current_step.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn loop_closure_delays_the_push() {
        let (handle, mut signals) = spawn_service();
        handle.start(Metadata::default()).await.unwrap();
        for output in [
            StepOutput::Done,
            StepOutput::Done,
            StepOutput::Rows { rows: vec![] },
            StepOutput::Opened { index: 0 },
            StepOutput::Done,
        ] {
            handle.step_complete(None, output).await.unwrap();
        }
        while signals.try_recv().is_ok() {}

        handle.step_complete(None, StepOutput::Done).await.unwrap();
        let status = handle.status().await.unwrap();
        assert!(status.settling);
        assert_eq!(status.current_step, Some(WorkflowStep::OpenFileLinks));
        assert!(signals.try_recv().is_err());

        let signal = tokio::time::timeout(Duration::from_secs(3), signals.recv())
            .await
            .expect("delayed push");
        assert_eq!(signal, Some(ExecutorSignal::CheckStatus));
        assert!(!handle.status().await.unwrap().settling);
    }

    #[tokio::test]
    async fn send_fails_once_service_is_gone() {
        let coordinator = Coordinator::new(
            WorkflowConfig::default(),
            StepGraph::probate(),
            Arc::new(EventBus::default()),
        );
        let (signal_tx, _signal_rx) = mpsc::channel(1);
        let (service, handle) = CoordinatorService::new(coordinator, signal_tx);
        drop(service);

        let err = handle.status().await.unwrap_err();
        assert!(matches!(err, ProbateError::CoordinatorClosed(_)));
    }
}
