use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ProbateError, Result};

/// Date format used by the portal's filing date inputs.
pub const PORTAL_DATE_FORMAT: &str = "%m/%d/%Y";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
}

/// Coordinator policy: retries, loop bounds, stall detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Consecutive failures of one step before the run fails.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// The loop ends once the cursor reaches this index.
    #[serde(default = "default_max_index")]
    pub max_index: usize,
    /// Consecutive no-progress loop closures before the loop ends.
    #[serde(default = "default_stall_threshold")]
    pub stall_threshold: u32,
    /// Delay after a completed CLOSE_FILE before the next iteration starts.
    #[serde(default = "default_close_settle_ms")]
    pub close_settle_ms: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            max_index: default_max_index(),
            stall_threshold: default_stall_threshold(),
            close_settle_ms: default_close_settle_ms(),
        }
    }
}

impl WorkflowConfig {
    pub fn close_settle(&self) -> Duration {
        Duration::from_millis(self.close_settle_ms)
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_max_index() -> usize { 100 }
fn default_stall_threshold() -> u32 { 3 }
fn default_close_settle_ms() -> u64 { 2_000 }

/// Executor side: per-step timeout and the adaptive poll interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
    #[serde(default = "default_poll_min_ms")]
    pub poll_min_ms: u64,
    #[serde(default = "default_poll_max_ms")]
    pub poll_max_ms: u64,
    #[serde(default = "default_poll_initial_ms")]
    pub poll_initial_ms: u64,
    /// Interval multiplier applied after an idle poll.
    #[serde(default = "default_poll_growth")]
    pub poll_growth: f64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: default_step_timeout_secs(),
            poll_min_ms: default_poll_min_ms(),
            poll_max_ms: default_poll_max_ms(),
            poll_initial_ms: default_poll_initial_ms(),
            poll_growth: default_poll_growth(),
        }
    }
}

impl ExecutorConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

fn default_step_timeout_secs() -> u64 { 30 }
fn default_poll_min_ms() -> u64 { 1_000 }
fn default_poll_max_ms() -> u64 { 5_000 }
fn default_poll_initial_ms() -> u64 { 1_000 }
fn default_poll_growth() -> f64 { 1.5 }

/// Target site and default search criteria.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Extra wait after the document reports `complete`.
    #[serde(default = "default_page_settle_ms")]
    pub page_settle_ms: u64,
    /// Interval between `document.readyState` checks.
    #[serde(default = "default_ready_poll_ms")]
    pub ready_poll_ms: u64,
    /// Court selector id used when the run metadata names none.
    #[serde(default = "default_county_id")]
    pub county_id: String,
    #[serde(default = "default_proceeding")]
    pub proceeding: String,
    #[serde(default = "default_filed_from")]
    pub filed_from: String,
    #[serde(default = "default_filed_to")]
    pub filed_to: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            page_settle_ms: default_page_settle_ms(),
            ready_poll_ms: default_ready_poll_ms(),
            county_id: default_county_id(),
            proceeding: default_proceeding(),
            filed_from: default_filed_from(),
            filed_to: default_filed_to(),
        }
    }
}

fn default_base_url() -> String { "https://websurrogates.nycourts.gov/".to_string() }
fn default_page_settle_ms() -> u64 { 1_000 }
fn default_ready_poll_ms() -> u64 { 100 }
fn default_county_id() -> String { "24".to_string() }
fn default_proceeding() -> String { "PROBATE PETITION".to_string() }
fn default_filed_from() -> String { "05/01/2025".to_string() }
fn default_filed_to() -> String { "05/29/2025".to_string() }

/// How to reach the browser that hosts the portal tab.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// DevTools endpoint of an already running Chrome (for example
    /// `http://127.0.0.1:9222`). When unset a browser is launched.
    #[serde(default)]
    pub cdp_url: Option<String>,
    /// Launch without a window. The CAPTCHA gate needs a human, so this is
    /// only useful with an already authorised profile.
    #[serde(default)]
    pub headless: bool,
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ProbateError::ConfigNotFound(path.display().to_string()))?;
        Self::parse(&content)
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse TOML text, expanding `${ENV_VAR}` references first.
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: Self =
            toml::from_str(&expanded).map_err(|e| ProbateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let wf = &self.workflow;
        if wf.max_index == 0 {
            return Err(ProbateError::Config("workflow.max_index must be at least 1".into()));
        }
        if wf.max_retries == 0 {
            return Err(ProbateError::Config("workflow.max_retries must be at least 1".into()));
        }
        if wf.stall_threshold == 0 {
            return Err(ProbateError::Config(
                "workflow.stall_threshold must be at least 1".into(),
            ));
        }

        let ex = &self.executor;
        if ex.step_timeout_secs == 0 {
            return Err(ProbateError::Config(
                "executor.step_timeout_secs must be at least 1".into(),
            ));
        }
        if ex.poll_min_ms == 0 || ex.poll_min_ms > ex.poll_max_ms {
            return Err(ProbateError::Config(format!(
                "executor poll bounds are invalid: min {}ms, max {}ms",
                ex.poll_min_ms, ex.poll_max_ms
            )));
        }
        if !ex.poll_growth.is_finite() || ex.poll_growth < 1.0 {
            return Err(ProbateError::Config(format!(
                "executor.poll_growth must be a finite number >= 1.0, got {}",
                ex.poll_growth
            )));
        }

        let from = parse_portal_date(&self.portal.filed_from)?;
        let to = parse_portal_date(&self.portal.filed_to)?;
        if from > to {
            return Err(ProbateError::Config(format!(
                "portal.filed_from ({}) is after portal.filed_to ({})",
                self.portal.filed_from, self.portal.filed_to
            )));
        }
        Ok(())
    }
}

/// Parse a `MM/DD/YYYY` date as used by the portal's search form.
pub fn parse_portal_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), PORTAL_DATE_FORMAT)
        .map_err(|e| ProbateError::Config(format!("invalid date '{s}' (expected MM/DD/YYYY): {e}")))
}

fn expand_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var pattern");
    re.replace_all(input, |caps: &regex::Captures<'_>| {
        // Keep original if env var not set
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("PROBATE_TEST_CDP", "http://127.0.0.1:9333");
        let result = expand_env_vars("cdp_url = \"${PROBATE_TEST_CDP}\"");
        assert_eq!(result, "cdp_url = \"http://127.0.0.1:9333\"");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("${PROBATE_NONEXISTENT_VAR_XYZ}");
        assert_eq!(result, "${PROBATE_NONEXISTENT_VAR_XYZ}");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.workflow.max_retries, 3);
        assert_eq!(config.workflow.max_index, 100);
        assert_eq!(config.workflow.stall_threshold, 3);
        assert_eq!(config.workflow.close_settle(), Duration::from_secs(2));
        assert_eq!(config.executor.step_timeout(), Duration::from_secs(30));
        assert_eq!(config.executor.poll_min_ms, 1_000);
        assert_eq!(config.executor.poll_max_ms, 5_000);
        assert_eq!(config.portal.county_id, "24");
        assert!(config.browser.cdp_url.is_none());
    }

    #[test]
    fn test_rejects_inverted_poll_bounds() {
        let err = AppConfig::parse("[executor]\npoll_min_ms = 6000\npoll_max_ms = 5000\n")
            .unwrap_err();
        assert!(err.to_string().contains("poll bounds"));
    }

    #[test]
    fn test_rejects_non_finite_poll_growth() {
        for value in ["nan", "inf", "-inf", "0.5"] {
            let err = AppConfig::parse(&format!("[executor]\npoll_growth = {value}\n"))
                .unwrap_err();
            assert!(err.to_string().contains("poll_growth"), "{value}: {err}");
        }
        assert!(AppConfig::parse("[executor]\npoll_growth = 1.0\n").is_ok());
    }

    #[test]
    fn test_rejects_bad_dates() {
        assert!(AppConfig::parse("[portal]\nfiled_from = \"2025-05-01\"\n").is_err());
        assert!(AppConfig::parse(
            "[portal]\nfiled_from = \"06/01/2025\"\nfiled_to = \"05/01/2025\"\n"
        )
        .is_err());
    }

    #[test]
    fn test_zero_stall_threshold_rejected() {
        assert!(AppConfig::parse("[workflow]\nstall_threshold = 0\n").is_err());
        assert!(AppConfig::parse("[workflow]\nmax_index = 0\n").is_err());
    }
}
