use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;

use probate_core::error::{ProbateError, Result};
use probate_core::traits::StepExecutor;
use probate_core::types::{FileSearchRow, Metadata, StepOutput, WorkflowStep};

use crate::sample_rows;

/// A queued override for one execution of a step.
#[derive(Debug, Clone)]
pub enum Scripted {
    Done,
    Rows(Vec<FileSearchRow>),
    Opened(usize),
    Transient(String),
    Precondition(String),
    /// Report the cursor past the end of the result set.
    OutOfRange,
    /// Never finish.
    Hang,
    /// Wait, then behave as the inner entry.
    Delay(Duration, Box<Scripted>),
}

/// Executor simulating a healthy portal with a fixed number of result rows.
///
/// `FILE_SEARCH_RESULTS` returns the rows, `OPEN_FILE_LINKS` opens the row at
/// `currentIndex` (or reports end of data), every other step succeeds.
/// Entries queued with [`push`](Self::push) take priority, one per call.
pub struct ScriptedExecutor {
    rows: Vec<FileSearchRow>,
    queued: Mutex<HashMap<WorkflowStep, VecDeque<Scripted>>>,
    calls: Mutex<Vec<(WorkflowStep, usize)>>,
}

impl ScriptedExecutor {
    pub fn new(rows: Vec<FileSearchRow>) -> Self {
        Self {
            rows,
            queued: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A portal with `n` sample rows.
    pub fn with_rows(n: usize) -> Self {
        Self::new(sample_rows(n))
    }

    pub fn push(&self, step: WorkflowStep, entry: Scripted) {
        self.queued
            .lock()
            .unwrap()
            .entry(step)
            .or_default()
            .push_back(entry);
    }

    /// Steps executed so far, in order.
    pub fn calls(&self) -> Vec<WorkflowStep> {
        self.calls.lock().unwrap().iter().map(|(s, _)| *s).collect()
    }

    /// `currentIndex` seen by each `OPEN_FILE_LINKS` execution.
    pub fn open_indices(&self) -> Vec<usize> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == WorkflowStep::OpenFileLinks)
            .map(|(_, i)| *i)
            .collect()
    }

    fn default_output(&self, step: WorkflowStep, index: usize) -> Result<StepOutput> {
        match step {
            WorkflowStep::FileSearchResults => Ok(StepOutput::Rows {
                rows: self.rows.clone(),
            }),
            WorkflowStep::OpenFileLinks if index >= self.rows.len() => {
                Err(ProbateError::IndexOutOfRange {
                    index,
                    available: self.rows.len(),
                })
            }
            WorkflowStep::OpenFileLinks => Ok(StepOutput::Opened { index }),
            _ => Ok(StepOutput::Done),
        }
    }
}

impl StepExecutor for ScriptedExecutor {
    fn execute<'a>(
        &'a self,
        step: WorkflowStep,
        metadata: &'a Metadata,
    ) -> BoxFuture<'a, Result<StepOutput>> {
        let index = metadata.current_index;
        self.calls.lock().unwrap().push((step, index));
        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&step)
            .and_then(|q| q.pop_front());

        Box::pin(async move {
            let Some(mut entry) = queued else {
                return self.default_output(step, index);
            };
            while let Scripted::Delay(delay, inner) = entry {
                tokio::time::sleep(delay).await;
                entry = *inner;
            }
            match entry {
                Scripted::Done => Ok(StepOutput::Done),
                Scripted::Rows(rows) => Ok(StepOutput::Rows { rows }),
                Scripted::Opened(index) => Ok(StepOutput::Opened { index }),
                Scripted::Transient(message) => Err(ProbateError::step(step, message)),
                Scripted::Precondition(message) => Err(ProbateError::Precondition(message)),
                Scripted::OutOfRange => Err(ProbateError::IndexOutOfRange {
                    index,
                    available: self.rows.len(),
                }),
                Scripted::Hang => futures::future::pending().await,
                Scripted::Delay(..) => unreachable!("delays unwrapped above"),
            }
        })
    }
}
