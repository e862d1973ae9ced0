use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use futures::future::BoxFuture;

use probate_core::error::Result;
use probate_core::traits::PortalPage;

use crate::sample_cells;

const SEARCH_FIELDS: [&str; 4] = [
    "#CourtSelect",
    "#SelectedProceeding",
    "#txtFilingDateFrom",
    "#txtFilingDateTo",
];
const SUBMIT: &str = "#FileSearchSubmit2";
const RESULTS_TABLE: &str = "#NameResultsTable";
const RESULT_BUTTONS: &str = "button.ButtonAsLink[type=\"submit\"]";
const HISTORY_LINKS: &str = "a[href*=\"/File/FileHistory\"]";
const HISTORY_CLOSE: &str = "#FileHistoryClose";

/// Page the simulated site is showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    /// Landing page behind the CAPTCHA.
    Gate,
    /// File search form.
    Search,
    /// Results table.
    Results,
    /// File history of one result row.
    History { row: usize },
    /// Some page outside the portal.
    Offsite,
}

#[derive(Debug)]
struct State {
    screen: Screen,
    fields: HashMap<String, String>,
    rows: Vec<Vec<String>>,
    petitions: Vec<usize>,
    settles: usize,
    petition_button: bool,
    close_works: bool,
    history_links: bool,
}

/// In-memory model of the Surrogate's Court file search site.
///
/// Only the elements the step handlers touch exist; selectors outside that
/// set match nothing.
#[derive(Debug)]
pub struct FakePortal {
    base_url: String,
    state: Mutex<State>,
}

impl FakePortal {
    /// A site on the search form (CAPTCHA already cleared) whose search
    /// yields `rows` sample rows.
    pub fn new(rows: usize) -> Self {
        Self {
            base_url: "https://websurrogates.nycourts.gov/".to_string(),
            state: Mutex::new(State {
                screen: Screen::Search,
                fields: HashMap::new(),
                rows: (0..rows).map(sample_cells).collect(),
                petitions: Vec::new(),
                settles: 0,
                petition_button: true,
                close_works: true,
                history_links: false,
            }),
        }
    }

    pub fn on(self, screen: Screen) -> Self {
        self.state().screen = screen;
        self
    }

    pub fn with_table(self, rows: Vec<Vec<String>>) -> Self {
        self.state().rows = rows;
        self
    }

    /// File history pages lack the petition button.
    pub fn without_petition_button(self) -> Self {
        self.state().petition_button = false;
        self
    }

    /// The history close button is present but does nothing.
    pub fn with_stuck_close(self) -> Self {
        self.state().close_works = false;
        self
    }

    /// Results rows also carry plain FileHistory links.
    pub fn with_history_links(self) -> Self {
        self.state().history_links = true;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn screen(&self) -> Screen {
        self.state().screen.clone()
    }

    pub fn field(&self, selector: &str) -> Option<String> {
        self.state().fields.get(selector).cloned()
    }

    /// Rows whose petition was opened, in order.
    pub fn petitions(&self) -> Vec<usize> {
        self.state().petitions.clone()
    }

    pub fn settles(&self) -> usize {
        self.state().settles
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn url_for(&self, screen: &Screen) -> String {
        match screen {
            Screen::Gate => format!("{}Home/HomePage", self.base_url),
            Screen::Search => format!("{}File/FileSearch", self.base_url),
            Screen::Results => format!("{}File/FileSearchResults", self.base_url),
            Screen::History { row } => {
                format!("{}File/FileHistory?row={row}", self.base_url)
            }
            Screen::Offsite => "https://example.com/".to_string(),
        }
    }
}

impl State {
    fn exists(&self, selector: &str) -> bool {
        match self.screen {
            Screen::Search => SEARCH_FIELDS.contains(&selector) || selector == SUBMIT,
            Screen::Results => {
                selector == RESULTS_TABLE
                    || (!self.rows.is_empty()
                        && (selector == RESULT_BUTTONS
                            || (self.history_links && selector == HISTORY_LINKS)))
            }
            Screen::History { .. } => selector == HISTORY_CLOSE,
            Screen::Gate | Screen::Offsite => false,
        }
    }

    fn click(&mut self, selector: &str) -> bool {
        if !self.exists(selector) {
            return false;
        }
        let next = match (&self.screen, selector) {
            (Screen::Search, SUBMIT) => Some(Screen::Results),
            (Screen::Results, RESULT_BUTTONS) | (Screen::Results, HISTORY_LINKS) => {
                Some(Screen::History { row: 0 })
            }
            (Screen::History { .. }, HISTORY_CLOSE) if self.close_works => Some(Screen::Results),
            _ => None,
        };
        if let Some(screen) = next {
            self.screen = screen;
        }
        true
    }
}

impl PortalPage for FakePortal {
    fn current_url(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let screen = self.screen();
            Ok(self.url_for(&screen))
        })
    }

    fn wait_for_settle(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.state().settles += 1;
            Ok(())
        })
    }

    fn exists<'a>(&'a self, selector: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.state().exists(selector)) })
    }

    fn set_value<'a>(&'a self, selector: &'a str, value: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let mut state = self.state();
            if state.screen != Screen::Search || !SEARCH_FIELDS.contains(&selector) {
                return Ok(false);
            }
            state.fields.insert(selector.to_string(), value.to_string());
            Ok(true)
        })
    }

    fn click<'a>(&'a self, selector: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.state().click(selector)) })
    }

    fn count<'a>(&'a self, selector: &'a str) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let state = self.state();
            let n = match (&state.screen, selector) {
                (Screen::Results, RESULT_BUTTONS) => state.rows.len(),
                (Screen::Results, HISTORY_LINKS) if state.history_links => state.rows.len(),
                _ => usize::from(state.exists(selector)),
            };
            Ok(n)
        })
    }

    fn click_nth<'a>(&'a self, selector: &'a str, index: usize) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let mut state = self.state();
            let is_row_target = selector == RESULT_BUTTONS
                || (state.history_links && selector == HISTORY_LINKS);
            if state.screen != Screen::Results || !is_row_target || index >= state.rows.len() {
                return Ok(false);
            }
            state.screen = Screen::History { row: index };
            Ok(true)
        })
    }

    fn table_rows<'a>(
        &'a self,
        selector: &'a str,
    ) -> BoxFuture<'a, Result<Option<Vec<Vec<String>>>>> {
        Box::pin(async move {
            let state = self.state();
            if state.screen == Screen::Results && selector == RESULTS_TABLE {
                Ok(Some(state.rows.clone()))
            } else {
                Ok(None)
            }
        })
    }

    fn click_button_matching<'a>(
        &'a self,
        text: &'a str,
        hint: &'a str,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let mut state = self.state();
            let Screen::History { row } = state.screen else {
                return Ok(false);
            };
            let label = "PROBATE PETITION";
            let matches = label.contains(text) || label.to_lowercase().contains(&hint.to_lowercase());
            if !state.petition_button || !matches {
                return Ok(false);
            }
            state.petitions.push(row);
            Ok(true)
        })
    }
}
