use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{Metadata, StepOutput, WorkflowStep};

/// Step executor: performs one named step against the live page.
///
/// Implementations must handle every `WorkflowStep`. They never decide what
/// runs next; that belongs to the coordinator.
pub trait StepExecutor: Send + Sync + 'static {
    /// Execute `step` with the run's current metadata.
    fn execute<'a>(
        &'a self,
        step: WorkflowStep,
        metadata: &'a Metadata,
    ) -> BoxFuture<'a, Result<StepOutput>>;
}

/// Page primitives the portal step handlers are written against.
///
/// Selectors are CSS selectors. Methods returning `bool` report whether the
/// target element existed.
pub trait PortalPage: Send + Sync + 'static {
    /// URL of the active document.
    fn current_url(&self) -> BoxFuture<'_, Result<String>>;

    /// Wait until the document has finished loading, then let dynamic
    /// content settle.
    fn wait_for_settle(&self) -> BoxFuture<'_, Result<()>>;

    /// Whether an element matches `selector`.
    fn exists<'a>(&'a self, selector: &'a str) -> BoxFuture<'a, Result<bool>>;

    /// Set a form control's value and fire a bubbling `change` event.
    fn set_value<'a>(&'a self, selector: &'a str, value: &'a str) -> BoxFuture<'a, Result<bool>>;

    /// Click the first element matching `selector`.
    fn click<'a>(&'a self, selector: &'a str) -> BoxFuture<'a, Result<bool>>;

    /// Number of elements matching `selector`.
    fn count<'a>(&'a self, selector: &'a str) -> BoxFuture<'a, Result<usize>>;

    /// Click the `index`th element matching `selector`.
    fn click_nth<'a>(&'a self, selector: &'a str, index: usize) -> BoxFuture<'a, Result<bool>>;

    /// Cell texts of each body row of the table at `selector`, or `None` if
    /// there is no such table.
    fn table_rows<'a>(&'a self, selector: &'a str) -> BoxFuture<'a, Result<Option<Vec<Vec<String>>>>>;

    /// Click the first button whose text contains `text`, or whose id or
    /// class contains `hint` (case-insensitive).
    fn click_button_matching<'a>(
        &'a self,
        text: &'a str,
        hint: &'a str,
    ) -> BoxFuture<'a, Result<bool>>;
}
