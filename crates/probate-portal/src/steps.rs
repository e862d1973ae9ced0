//! One handler per workflow step.
//!
//! Handlers are written against `PortalPage` so they run the same way on a
//! live tab and on the simulated site in tests. They never decide what runs
//! next; they act on the page and report.

use tracing::{debug, info, warn};

use probate_core::config::PortalConfig;
use probate_core::error::{ProbateError, Result};
use probate_core::traits::PortalPage;
use probate_core::types::{FileSearchRow, Metadata, StepOutput, WorkflowStep};

use crate::search::SearchCriteria;
use crate::selectors::*;

/// Path part of `url` when it lies on the portal, without query or fragment.
fn portal_path<'a>(url: &'a str, base_url: &str) -> Option<&'a str> {
    let rest = url.strip_prefix(base_url.trim_end_matches('/'))?;
    if !(rest.is_empty() || rest.starts_with('/')) {
        return None;
    }
    let end = rest.find(['?', '#']).unwrap_or(rest.len());
    Some(&rest[..end])
}

/// START_SCRAPE: the tab must be on the portal and past the CAPTCHA gate.
pub async fn start_scrape<P: PortalPage>(page: &P, config: &PortalConfig) -> Result<StepOutput> {
    let url = page.current_url().await?;
    let Some(path) = portal_path(&url, &config.base_url) else {
        return Err(ProbateError::Precondition(format!(
            "Open {} in the browser tab (currently on {url})",
            config.base_url
        )));
    };
    if path == HOME_PATH {
        return Err(ProbateError::Precondition(
            "Complete the captcha and select \"File Search\"".to_string(),
        ));
    }
    info!(path, "Portal reachable");
    Ok(StepOutput::Done)
}

/// FILE_SEARCH_HOME: fill the search form and submit it.
pub async fn file_search_home<P: PortalPage>(
    page: &P,
    config: &PortalConfig,
    metadata: &Metadata,
) -> Result<StepOutput> {
    const STEP: WorkflowStep = WorkflowStep::FileSearchHome;
    let criteria = SearchCriteria::resolve(metadata, config)?;

    if !page.exists(COURT_SELECT).await? {
        return Err(ProbateError::step(STEP, "File search form not found"));
    }
    let fields = [
        (COURT_SELECT, criteria.court_id.as_str()),
        (PROCEEDING_SELECT, criteria.proceeding.as_str()),
        (FILED_FROM, criteria.filed_from.as_str()),
        (FILED_TO, criteria.filed_to.as_str()),
    ];
    for (selector, value) in fields {
        if !page.set_value(selector, value).await? {
            warn!(selector, "Search field missing; left at site default");
        }
    }

    if !page.click(SEARCH_SUBMIT).await? {
        return Err(ProbateError::step(STEP, "Search submit button not found"));
    }
    page.wait_for_settle().await?;
    info!(
        court = %criteria.court_id,
        from = %criteria.filed_from,
        to = %criteria.filed_to,
        "Search submitted"
    );
    Ok(StepOutput::Done)
}

/// FILE_SEARCH_RESULTS: read the results table. No table means no rows.
pub async fn file_search_results<P: PortalPage>(page: &P) -> Result<StepOutput> {
    let rows = match page.table_rows(RESULTS_TABLE).await? {
        Some(cells) => cells
            .iter()
            .map(|row| FileSearchRow::from_cells(row))
            .collect::<Vec<_>>(),
        None => {
            warn!("No results table found");
            Vec::new()
        }
    };
    page.wait_for_settle().await?;
    info!(rows = rows.len(), "Results scraped");
    Ok(StepOutput::Rows { rows })
}

/// OPEN_FILE_LINKS: open the results row at the cursor.
pub async fn open_file_links<P: PortalPage>(page: &P, metadata: &Metadata) -> Result<StepOutput> {
    const STEP: WorkflowStep = WorkflowStep::OpenFileLinks;
    let index = metadata.current_index;

    if !page.exists(RESULTS_TABLE).await? {
        return Err(ProbateError::step(STEP, "Results table not found"));
    }
    let available = page.count(RESULT_BUTTONS).await?;
    if index >= available {
        return Err(ProbateError::IndexOutOfRange { index, available });
    }
    if !page.click_nth(RESULT_BUTTONS, index).await? {
        return Err(ProbateError::step(STEP, format!("File link {index} vanished before click")));
    }
    page.wait_for_settle().await?;
    debug!(index, available, "File opened");
    Ok(StepOutput::Opened { index })
}

/// CLICK_PROBATE_PETITION: reach the file history page, then open the
/// petition document.
pub async fn click_probate_petition<P: PortalPage>(
    page: &P,
    config: &PortalConfig,
) -> Result<StepOutput> {
    const STEP: WorkflowStep = WorkflowStep::ClickProbatePetition;

    let url = page.current_url().await?;
    let on_history = portal_path(&url, &config.base_url)
        .is_some_and(|path| path.starts_with(HISTORY_PATH));
    if !on_history {
        if !page.click(HISTORY_LINKS).await? {
            return Err(ProbateError::step(STEP, "No FileHistory links found"));
        }
        page.wait_for_settle().await?;
    }

    page.wait_for_settle().await?;
    if !page.click_button_matching(PETITION_TEXT, PETITION_HINT).await? {
        return Err(ProbateError::step(STEP, "Probate petition button not found"));
    }
    page.wait_for_settle().await?;
    Ok(StepOutput::Done)
}

/// CLOSE_FILE: close the file history and confirm the results view is back.
pub async fn close_file<P: PortalPage>(page: &P) -> Result<StepOutput> {
    const STEP: WorkflowStep = WorkflowStep::CloseFile;

    if !page.click(HISTORY_CLOSE).await? {
        return Err(ProbateError::step(STEP, "Close button not found"));
    }
    page.wait_for_settle().await?;
    if !page.exists(RESULTS_TABLE).await? {
        return Err(ProbateError::step(STEP, "Results table did not reappear"));
    }
    Ok(StepOutput::Done)
}
