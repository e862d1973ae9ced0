//! Page paths and DOM selectors of the file search portal.

pub const HOME_PATH: &str = "/Home/HomePage";
pub const HISTORY_PATH: &str = "/File/FileHistory";

// Search form
pub const COURT_SELECT: &str = "#CourtSelect";
pub const PROCEEDING_SELECT: &str = "#SelectedProceeding";
pub const FILED_FROM: &str = "#txtFilingDateFrom";
pub const FILED_TO: &str = "#txtFilingDateTo";
pub const SEARCH_SUBMIT: &str = "#FileSearchSubmit2";

// Results
pub const RESULTS_TABLE: &str = "#NameResultsTable";
pub const RESULT_BUTTONS: &str = "button.ButtonAsLink[type=\"submit\"]";
pub const HISTORY_LINKS: &str = "a[href*=\"/File/FileHistory\"]";

// File history
pub const PETITION_TEXT: &str = "PROBATE PETITION";
pub const PETITION_HINT: &str = "probate";
pub const HISTORY_CLOSE: &str = "#FileHistoryClose";
