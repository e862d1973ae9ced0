use tokio::sync::broadcast;
use tracing::debug;

use crate::types::WorkflowEvent;

/// Fan-out of coordinator events to observers.
///
/// Publishing never blocks and never fails; a slow subscriber lags and skips
/// events rather than holding up the coordinator.
pub struct EventBus {
    tx: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: WorkflowEvent) {
        if self.tx.send(event).is_err() {
            debug!("No event subscribers; event dropped");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RunOutcome, WorkflowStatus};
    use uuid::Uuid;

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.publish(WorkflowEvent::StatusChanged(WorkflowStatus::default()));
    }

    #[tokio::test]
    async fn every_subscriber_sees_events_in_order() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(WorkflowEvent::LoopClosed {
            index: 1,
            stalled_count: 0,
        });
        bus.publish(WorkflowEvent::RunFinished {
            run_id: Uuid::new_v4(),
            outcome: RunOutcome::Stopped,
            rows: vec![],
            error: None,
        });

        for rx in [&mut a, &mut b] {
            assert!(matches!(
                rx.recv().await.unwrap(),
                WorkflowEvent::LoopClosed { index: 1, .. }
            ));
            assert!(matches!(
                rx.recv().await.unwrap(),
                WorkflowEvent::RunFinished {
                    outcome: RunOutcome::Stopped,
                    ..
                }
            ));
        }
    }
}
