use serde::Serialize;

use crate::run::{RunFailure, RunStatus};
use crate::types::{GraphId, RunId};

/// Workflow event broadcast to all subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A run started stepping.
    RunStarted { run_id: RunId, graph_id: GraphId },
    /// A node finished executing.
    StepCompleted {
        run_id: RunId,
        step: usize,
        node: String,
        tool: String,
    },
    /// A run reached a node with no satisfied outgoing edge.
    RunCompleted {
        run_id: RunId,
        steps: usize,
        status: RunStatus,
    },
    /// A run failed.
    RunFailed {
        run_id: RunId,
        node: Option<String>,
        failure: RunFailure,
    },
}

impl WorkflowEvent {
    pub fn run_id(&self) -> &RunId {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::StepCompleted { run_id, .. }
            | Self::RunCompleted { run_id, .. }
            | Self::RunFailed { run_id, .. } => run_id,
        }
    }
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: WorkflowEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<WorkflowEvent> {
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

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.publish(WorkflowEvent::RunStarted {
            run_id: RunId::new(),
            graph_id: GraphId::new(),
        });
    }

    #[test]
    fn test_subscriber_receives_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let run_id = RunId::new();
        bus.publish(WorkflowEvent::StepCompleted {
            run_id: run_id.clone(),
            step: 1,
            node: "a".into(),
            tool: "noop".into(),
        });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.run_id(), &run_id);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "step_completed");
        assert_eq!(json["node"], "a");
    }
}
