use thiserror::Error;

use crate::types::{FailureKind, WorkflowStep};

#[derive(Debug, Error)]
pub enum ProbateError {
    // Step errors
    #[error("Step {step} failed: {message}")]
    StepFailed { step: WorkflowStep, message: String },

    #[error("Step timeout after {timeout_secs}s: {step}")]
    StepTimeout { step: WorkflowStep, timeout_secs: u64 },

    #[error("{0}")]
    Precondition(String),

    #[error("Index out of range: {index} (available rows: {available})")]
    IndexOutOfRange { index: usize, available: usize },

    // Browser errors
    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Page script error: {0}")]
    Script(String),

    // Coordinator errors
    #[error("Coordinator unavailable: {0}")]
    CoordinatorClosed(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProbateError {
    /// Shorthand for a transient failure of `step`.
    pub fn step(step: WorkflowStep, message: impl Into<String>) -> Self {
        Self::StepFailed {
            step,
            message: message.into(),
        }
    }

    /// How the coordinator should treat this error when it ends a step.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Precondition(_) => FailureKind::Precondition,
            Self::IndexOutOfRange { .. } => FailureKind::EndOfData,
            _ => FailureKind::Transient,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProbateError>;
