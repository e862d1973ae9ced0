use serde::{Deserialize, Serialize};

use crate::types::{FailureKind, Metadata, StepFailure, StepOutput, StepTicket, WorkflowStatus};

/// A message addressed to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    StartWorkflow {
        #[serde(default)]
        metadata: Metadata,
    },
    StopWorkflow,
    GetStatus,
    StepComplete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ticket: Option<StepTicket>,
        result: StepOutput,
    },
    StepFailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ticket: Option<StepTicket>,
        #[serde(default = "transient")]
        kind: FailureKind,
        error: String,
    },
}

fn transient() -> FailureKind {
    FailureKind::Transient
}

impl Request {
    /// A failure report for `failure`.
    pub fn step_failed(ticket: Option<StepTicket>, failure: StepFailure) -> Self {
        Self::StepFailed {
            ticket,
            kind: failure.kind,
            error: failure.error,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::StartWorkflow { .. } => "START_WORKFLOW",
            Self::StopWorkflow => "STOP_WORKFLOW",
            Self::GetStatus => "GET_STATUS",
            Self::StepComplete { .. } => "STEP_COMPLETE",
            Self::StepFailed { .. } => "STEP_FAILED",
        }
    }
}

/// The coordinator's reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Response {
    /// `applied` is false when the request was a no-op (already active,
    /// stale report).
    Ack { applied: bool },
    Status { status: WorkflowStatus },
}

/// Best-effort push from the coordinator to the executor side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutorSignal {
    /// Poll sooner; state changed.
    CheckStatus,
}
