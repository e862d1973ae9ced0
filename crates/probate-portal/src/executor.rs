use std::sync::Arc;

use futures::future::BoxFuture;

use probate_core::config::PortalConfig;
use probate_core::error::Result;
use probate_core::traits::{PortalPage, StepExecutor};
use probate_core::types::{Metadata, StepOutput, WorkflowStep};

use crate::steps;

/// `StepExecutor` for the Surrogate's Court portal.
pub struct PortalExecutor<P> {
    page: Arc<P>,
    config: PortalConfig,
}

impl<P: PortalPage> PortalExecutor<P> {
    pub fn new(page: Arc<P>, config: PortalConfig) -> Self {
        Self { page, config }
    }
}

impl<P: PortalPage> StepExecutor for PortalExecutor<P> {
    fn execute<'a>(
        &'a self,
        step: WorkflowStep,
        metadata: &'a Metadata,
    ) -> BoxFuture<'a, Result<StepOutput>> {
        let page = self.page.as_ref();
        let config = &self.config;
        Box::pin(async move {
            match step {
                WorkflowStep::StartScrape => steps::start_scrape(page, config).await,
                WorkflowStep::FileSearchHome => {
                    steps::file_search_home(page, config, metadata).await
                }
                WorkflowStep::FileSearchResults => steps::file_search_results(page).await,
                WorkflowStep::OpenFileLinks => steps::open_file_links(page, metadata).await,
                WorkflowStep::ClickProbatePetition => {
                    steps::click_probate_petition(page, config).await
                }
                WorkflowStep::CloseFile => steps::close_file(page).await,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probate_core::types::FailureKind;
    use probate_test_utils::{sample_rows, FakePortal, Screen};

    /// Drive one full pass over a two-row result set the way the
    /// coordinator would sequence it.
    #[tokio::test]
    async fn full_pass_over_simulated_portal() {
        let page = Arc::new(FakePortal::new(2));
        let executor = PortalExecutor::new(page.clone(), PortalConfig::default());
        let mut meta = Metadata::with_county("24");

        executor.execute(WorkflowStep::StartScrape, &meta).await.unwrap();
        executor.execute(WorkflowStep::FileSearchHome, &meta).await.unwrap();
        let rows = executor
            .execute(WorkflowStep::FileSearchResults, &meta)
            .await
            .unwrap();
        assert_eq!(rows, StepOutput::Rows { rows: sample_rows(2) });

        for index in 0..2 {
            meta.current_index = index;
            let opened = executor.execute(WorkflowStep::OpenFileLinks, &meta).await.unwrap();
            assert_eq!(opened, StepOutput::Opened { index });
            executor
                .execute(WorkflowStep::ClickProbatePetition, &meta)
                .await
                .unwrap();
            executor.execute(WorkflowStep::CloseFile, &meta).await.unwrap();
            assert_eq!(page.screen(), Screen::Results);
        }
        assert_eq!(page.petitions(), vec![0, 1]);

        meta.current_index = 2;
        let err = executor
            .execute(WorkflowStep::OpenFileLinks, &meta)
            .await
            .unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::EndOfData);
    }
}
