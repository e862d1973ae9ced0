use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProbateError;

/// One named stage of the retrieval pipeline, in catalog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStep {
    StartScrape,
    FileSearchHome,
    FileSearchResults,
    OpenFileLinks,
    ClickProbatePetition,
    CloseFile,
}

impl WorkflowStep {
    /// The fixed catalog, in execution order.
    pub const ALL: [WorkflowStep; 6] = [
        WorkflowStep::StartScrape,
        WorkflowStep::FileSearchHome,
        WorkflowStep::FileSearchResults,
        WorkflowStep::OpenFileLinks,
        WorkflowStep::ClickProbatePetition,
        WorkflowStep::CloseFile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartScrape => "START_SCRAPE",
            Self::FileSearchHome => "FILE_SEARCH_HOME",
            Self::FileSearchResults => "FILE_SEARCH_RESULTS",
            Self::OpenFileLinks => "OPEN_FILE_LINKS",
            Self::ClickProbatePetition => "CLICK_PROBATE_PETITION",
            Self::CloseFile => "CLOSE_FILE",
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStep {
    type Err = ProbateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|step| step.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProbateError::Config(format!("unknown workflow step: {s}")))
    }
}

/// Carry-state threaded through the steps of one run.
///
/// Well-known keys are typed fields; anything else a caller passes at start
/// (search parameters, for example) lands in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Progress cursor into the result set.
    #[serde(default)]
    pub current_index: usize,
    /// Cursor value recorded at the previous loop closure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_successful_index: Option<usize>,
    /// Row opened during the current loop iteration, if the open registered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opened_index: Option<usize>,
    /// Court selector id on the search form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Metadata {
    pub fn with_county(county_id: impl Into<String>) -> Self {
        Self {
            county_id: Some(county_id.into()),
            ..Self::default()
        }
    }

    /// Set a free-form string parameter.
    pub fn set(mut self, key: &str, value: impl Into<String>) -> Self {
        self.extra
            .insert(key.to_string(), serde_json::Value::String(value.into()));
        self
    }

    /// Read a free-form string parameter.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }
}

/// One row of the file search results table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSearchRow {
    pub file_number: String,
    pub file_date: String,
    pub file_name: String,
    pub proceeding: String,
    pub date_of_death: String,
}

impl FileSearchRow {
    /// Build a row from table cell texts; missing cells become empty strings.
    pub fn from_cells(cells: &[String]) -> Self {
        let cell = |i: usize| cells.get(i).map(|c| c.trim().to_string()).unwrap_or_default();
        Self {
            file_number: cell(0),
            file_date: cell(1),
            file_name: cell(2),
            proceeding: cell(3),
            date_of_death: cell(4),
        }
    }
}

/// Value a step hands back on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutput {
    /// The step finished; nothing to record.
    Done,
    /// Rows scraped from the results table (possibly empty).
    Rows { rows: Vec<FileSearchRow> },
    /// The results row at `index` was opened.
    Opened { index: usize },
}

/// Identifies one dispatch of one step in one run.
///
/// Reports carrying a ticket that no longer matches the coordinator's current
/// dispatch are stale and get dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTicket {
    pub run_id: Uuid,
    pub step: WorkflowStep,
    pub seq: u64,
}

/// Failure taxonomy as seen by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Element not found yet, navigation not settled, timeout. Retried.
    Transient,
    /// Wrong page or human gate not cleared. Needs the user.
    Precondition,
    /// The cursor ran past the last row. Ends the loop normally.
    EndOfData,
}

/// A step failure as reported across the executor boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
    pub kind: FailureKind,
    pub error: String,
}

impl StepFailure {
    pub fn transient(error: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            error: error.into(),
        }
    }
}

impl From<&ProbateError> for StepFailure {
    fn from(e: &ProbateError) -> Self {
        Self {
            kind: e.failure_kind(),
            error: e.to_string(),
        }
    }
}

impl From<ProbateError> for StepFailure {
    fn from(e: ProbateError) -> Self {
        Self::from(&e)
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// The step catalog was exhausted.
    Completed,
    /// The executor reported the cursor past the last row.
    EndOfData,
    /// The cursor reached the configured maximum.
    IndexBound,
    /// Too many loop closures without cursor progress.
    Stalled,
    /// Retries exhausted.
    Failed,
    /// Explicit stop command.
    Stopped,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::EndOfData => "end of data",
            Self::IndexBound => "index bound reached",
            Self::Stalled => "stalled",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Read-only snapshot of the coordinator's workflow state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatus {
    pub is_active: bool,
    pub current_step: Option<WorkflowStep>,
    pub metadata: Metadata,
    pub retry_count: u32,
    pub stalled_count: u32,
    pub run_id: Option<Uuid>,
    pub dispatch_seq: u64,
    pub rows_found: usize,
    pub files_processed: usize,
    /// The post-close settle delay is still running; do not execute yet.
    pub settling: bool,
    pub last_error: Option<String>,
    pub last_outcome: Option<RunOutcome>,
}

impl WorkflowStatus {
    /// Ticket for the step currently awaiting execution, if any.
    pub fn ticket(&self) -> Option<StepTicket> {
        if !self.is_active {
            return None;
        }
        Some(StepTicket {
            run_id: self.run_id?,
            step: self.current_step?,
            seq: self.dispatch_seq,
        })
    }
}

/// Events published by the coordinator on the event bus.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// A run started.
    RunStarted { run_id: Uuid, metadata: Metadata },
    /// A step is ready for the executor.
    StepDispatched { ticket: StepTicket },
    /// A step failed and will be attempted again.
    StepRetrying {
        step: WorkflowStep,
        attempt: u32,
        max_retries: u32,
        kind: FailureKind,
        error: String,
    },
    /// One iteration of the open/click/close ring finished.
    LoopClosed {
        index: usize,
        stalled_count: u32,
    },
    /// A run ended; carries everything the results step collected.
    RunFinished {
        run_id: Uuid,
        outcome: RunOutcome,
        rows: Vec<FileSearchRow>,
        error: Option<String>,
    },
    /// The status snapshot changed.
    StatusChanged(WorkflowStatus),
}
