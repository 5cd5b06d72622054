use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use strand_core::config::EngineConfig;
use strand_core::error::{Result, StrandError};
use strand_core::event::EventBus;
use strand_core::graph::{Graph, GraphDefinition};
use strand_core::run::Run;
use strand_core::traits::{RunStore, ToolResolver};
use strand_core::types::{GraphId, RunId, State};

use crate::graph::{build_graph, GraphExecutor};

/// Front door for creating graphs and running them.
///
/// Runs execute on tokio's blocking pool, one thread per run, so tools can
/// be plain synchronous code. Each run owns its state; concurrent runs only
/// share the store and the tool registry.
#[derive(Clone)]
pub struct WorkflowService {
    store: Arc<dyn RunStore>,
    executor: Arc<GraphExecutor>,
}

impl WorkflowService {
    pub fn new(
        store: Arc<dyn RunStore>,
        tools: Arc<dyn ToolResolver>,
        config: &EngineConfig,
        events: Option<Arc<EventBus>>,
    ) -> Self {
        let mut executor = GraphExecutor::new(store.clone(), tools, config);
        if let Some(bus) = events {
            executor = executor.with_event_bus(bus);
        }
        Self {
            store,
            executor: Arc::new(executor),
        }
    }

    /// Validate and store a graph definition.
    pub fn create_graph(&self, def: GraphDefinition) -> Result<GraphId> {
        let graph = build_graph(def)?;
        info!(
            graph_id = %graph.id,
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "Graph created"
        );
        self.store.create_graph(graph)
    }

    pub fn get_graph(&self, id: &GraphId) -> Result<Arc<Graph>> {
        self.store
            .get_graph(id)?
            .ok_or_else(|| StrandError::UnknownGraph(id.to_string()))
    }

    /// Current snapshot of a run.
    pub fn get_run(&self, id: &RunId) -> Result<Run> {
        self.store
            .get_run(id)?
            .ok_or_else(|| StrandError::UnknownRun(id.to_string()))
    }

    /// Run a graph to completion on the calling thread.
    pub fn run_graph_blocking(&self, graph_id: &GraphId, initial_state: State) -> Result<Run> {
        let graph = self.get_graph(graph_id)?;
        self.executor.execute(&graph, initial_state)
    }

    /// Run a graph to completion and return the final run.
    pub async fn run_graph(&self, graph_id: &GraphId, initial_state: State) -> Result<Run> {
        let (_, handle) = self.start_run(graph_id, initial_state)?;
        handle
            .await
            .map_err(|e| StrandError::Worker(e.to_string()))?
    }

    /// Create a run and start driving it in the background.
    ///
    /// The run is already stored when this returns, so its id can be polled
    /// with [`get_run`](Self::get_run) right away.
    pub fn start_run(
        &self,
        graph_id: &GraphId,
        initial_state: State,
    ) -> Result<(RunId, JoinHandle<Result<Run>>)> {
        let graph = self.get_graph(graph_id)?;
        let run = self.executor.prepare(&graph, initial_state)?;
        let run_id = run.id.clone();

        let executor = self.executor.clone();
        let handle = tokio::task::spawn_blocking(move || executor.drive(&graph, run));
        Ok((run_id, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strand_core::graph::{Edge, Node};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use strand_core::run::{FailureKind, RunStatus};
    use strand_store::MemoryStore;
    use strand_tools::ToolRegistry;

    fn service() -> WorkflowService {
        WorkflowService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ToolRegistry::with_builtins()),
            &EngineConfig::default(),
            None,
        )
    }

    /// Memory store whose `fail_on`-th run update returns an error.
    struct FlakyStore {
        inner: MemoryStore,
        updates: AtomicUsize,
        fail_on: usize,
    }

    impl RunStore for FlakyStore {
        fn create_graph(&self, graph: Graph) -> Result<GraphId> {
            self.inner.create_graph(graph)
        }

        fn get_graph(&self, id: &GraphId) -> Result<Option<Arc<Graph>>> {
            self.inner.get_graph(id)
        }

        fn create_run(&self, run: &Run) -> Result<RunId> {
            self.inner.create_run(run)
        }

        fn get_run(&self, id: &RunId) -> Result<Option<Run>> {
            self.inner.get_run(id)
        }

        fn update_run(&self, run: &Run) -> Result<()> {
            if self.updates.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                return Err(StrandError::Database("disk full".into()));
            }
            self.inner.update_run(run)
        }
    }

    fn counter_def() -> GraphDefinition {
        GraphDefinition {
            nodes: vec![Node::new("count", "increment").with_param("key", json!("n"))],
            edges: vec![Edge::when("count", "count", "n < 4")],
            start_node: "count".into(),
        }
    }

    #[test]
    fn test_create_graph_rejects_invalid() {
        let svc = service();
        let mut def = counter_def();
        def.start_node = "nowhere".into();
        let err = svc.create_graph(def).unwrap_err();
        assert!(matches!(err, StrandError::Validation(_)));
    }

    #[test]
    fn test_unknown_ids() {
        let svc = service();
        let err = svc.get_graph(&GraphId::from_string("nope")).unwrap_err();
        assert!(matches!(err, StrandError::UnknownGraph(_)));
        let err = svc.get_run(&RunId::from_string("nope")).unwrap_err();
        assert!(matches!(err, StrandError::UnknownRun(_)));
        let err = svc
            .run_graph_blocking(&GraphId::from_string("nope"), State::new())
            .unwrap_err();
        assert!(matches!(err, StrandError::UnknownGraph(_)));
    }

    #[test]
    fn test_run_graph_blocking() {
        let svc = service();
        let graph_id = svc.create_graph(counter_def()).unwrap();
        let run = svc.run_graph_blocking(&graph_id, State::new()).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.state.get_i64("n"), Some(4));
        assert_eq!(svc.get_run(&run.id).unwrap(), run);
    }

    #[tokio::test]
    async fn test_run_graph_async() {
        let svc = service();
        let graph_id = svc.create_graph(counter_def()).unwrap();
        let run = svc.run_graph(&graph_id, State::new()).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.steps(), 4);
    }

    #[tokio::test]
    async fn test_start_run_is_pollable() {
        let svc = service();
        let graph_id = svc.create_graph(counter_def()).unwrap();
        let (run_id, handle) = svc.start_run(&graph_id, State::new()).unwrap();

        // Visible before the worker finishes.
        let early = svc.get_run(&run_id).unwrap();
        assert_eq!(early.id, run_id);

        let finished = handle.await.unwrap().unwrap();
        assert_eq!(finished.status, RunStatus::Completed);
        assert_eq!(svc.get_run(&run_id).unwrap().status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_store_failure_marks_background_run_failed() {
        let svc = WorkflowService::new(
            Arc::new(FlakyStore {
                inner: MemoryStore::new(),
                updates: AtomicUsize::new(0),
                fail_on: 3,
            }),
            Arc::new(ToolRegistry::with_builtins()),
            &EngineConfig::default(),
            None,
        );
        let graph_id = svc.create_graph(counter_def()).unwrap();
        let (run_id, handle) = svc.start_run(&graph_id, State::new()).unwrap();
        drop(handle);

        let mut run = svc.get_run(&run_id).unwrap();
        for _ in 0..200 {
            if run.status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            run = svc.get_run(&run_id).unwrap();
        }

        assert_eq!(run.status, RunStatus::Failed);
        let failure = run.error.unwrap();
        assert_eq!(failure.kind, FailureKind::Internal);
        assert!(failure.message.contains("disk full"));
    }

    #[tokio::test]
    async fn test_store_failure_is_returned_to_caller() {
        let svc = WorkflowService::new(
            Arc::new(FlakyStore {
                inner: MemoryStore::new(),
                updates: AtomicUsize::new(0),
                fail_on: 2,
            }),
            Arc::new(ToolRegistry::with_builtins()),
            &EngineConfig::default(),
            None,
        );
        let graph_id = svc.create_graph(counter_def()).unwrap();
        let err = svc.run_graph(&graph_id, State::new()).await.unwrap_err();
        assert!(matches!(err, StrandError::Database(_)));
    }
}
