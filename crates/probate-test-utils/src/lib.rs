//! Shared test fixtures for the probate crates.
//!
//! - [`ScriptedExecutor`]: a `StepExecutor` that behaves like a healthy portal
//!   with a fixed result set unless a step has queued overrides.
//! - [`FakePortal`]: an in-memory model of the file search site implementing
//!   `PortalPage`, for driving the real step handlers.

mod executor;
mod portal;

pub use executor::{Scripted, ScriptedExecutor};
pub use portal::{FakePortal, Screen};

use probate_core::config::AppConfig;
use probate_core::types::FileSearchRow;

/// Cell texts for the `i`th sample results row.
pub fn sample_cells(i: usize) -> Vec<String> {
    vec![
        format!("2025-{:04}", i + 1),
        "05/02/2025".to_string(),
        format!("ESTATE OF SAMPLE {}", i + 1),
        "PROBATE PETITION".to_string(),
        "04/11/2025".to_string(),
    ]
}

/// `n` sample result rows.
pub fn sample_rows(n: usize) -> Vec<FileSearchRow> {
    (0..n).map(|i| FileSearchRow::from_cells(&sample_cells(i))).collect()
}

/// Default config with every delay shrunk so tests run fast.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.workflow.close_settle_ms = 10;
    config.executor.step_timeout_secs = 5;
    config.executor.poll_min_ms = 10;
    config.executor.poll_initial_ms = 10;
    config.executor.poll_max_ms = 50;
    config.portal.page_settle_ms = 0;
    config.portal.ready_poll_ms = 1;
    config
}
