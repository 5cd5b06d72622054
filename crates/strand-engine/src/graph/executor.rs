use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use strand_core::config::EngineConfig;
use strand_core::error::{Result, StrandError, ValidationError};
use strand_core::event::{EventBus, WorkflowEvent};
use strand_core::graph::{Edge, Graph};
use strand_core::run::{FailureKind, Run, RunFailure, RunStatus};
use strand_core::traits::{RunStore, ToolResolver};
use strand_core::types::{RunId, State};

use super::condition::Condition;
use crate::invoker::ToolInvoker;

/// Executes runs of a validated graph.
///
/// Starting from the graph's start node, the executor applies each node's
/// tool to the run state, evaluates the node's outgoing edges in declared
/// order, and follows the first one whose condition holds. The run is
/// written back to the store after every step, so readers always see the
/// latest committed step.
///
/// Step failures (unknown tool, tool error, bad condition, step limit) end
/// the run as `failed` and are recorded on it. Only store errors are
/// returned to the caller.
pub struct GraphExecutor {
    store: Arc<dyn RunStore>,
    invoker: ToolInvoker,
    max_steps: usize,
    events: Option<Arc<EventBus>>,
}

/// What happened after one node executed.
enum Step {
    Next(String),
    Done,
}

impl GraphExecutor {
    pub fn new(store: Arc<dyn RunStore>, tools: Arc<dyn ToolResolver>, config: &EngineConfig) -> Self {
        Self {
            store,
            invoker: ToolInvoker::new(tools),
            max_steps: config.max_steps,
            events: None,
        }
    }

    /// Publish run progress on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Create and persist a pending run for `graph`.
    pub fn prepare(&self, graph: &Graph, initial_state: State) -> Result<Run> {
        let run = Run::pending(graph.id.clone(), graph.start_node.clone(), initial_state);
        self.store.create_run(&run)?;
        debug!(run_id = %run.id, graph_id = %graph.id, "Run created");
        Ok(run)
    }

    /// Prepare a run and drive it to completion.
    pub fn execute(&self, graph: &Graph, initial_state: State) -> Result<Run> {
        let run = self.prepare(graph, initial_state)?;
        self.drive(graph, run)
    }

    /// Drive a pending run until it completes or fails.
    ///
    /// If a store write fails partway through, the run is marked `failed`
    /// on a best-effort basis before the error is returned.
    pub fn drive(&self, graph: &Graph, run: Run) -> Result<Run> {
        let run_id = run.id.clone();
        self.drive_steps(graph, run).inspect_err(|e| self.abandon(&run_id, e))
    }

    fn drive_steps(&self, graph: &Graph, mut run: Run) -> Result<Run> {
        let start = Instant::now();

        run.mark_running();
        self.store.update_run(&run)?;
        info!(run_id = %run.id, graph_id = %graph.id, "Run started");
        self.emit(WorkflowEvent::RunStarted {
            run_id: run.id.clone(),
            graph_id: graph.id.clone(),
        });

        match compile_conditions(graph) {
            Ok(conditions) => self.step_loop(graph, &conditions, &mut run)?,
            Err(e) => self.fail(&mut run, &e),
        }

        self.store.update_run(&run)?;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match run.status {
            RunStatus::Completed => {
                info!(run_id = %run.id, steps = run.steps(), elapsed_ms, "Run completed");
                self.emit(WorkflowEvent::RunCompleted {
                    run_id: run.id.clone(),
                    steps: run.steps(),
                    status: run.status,
                });
            }
            _ => {
                if let Some(ref failure) = run.error {
                    self.emit(WorkflowEvent::RunFailed {
                        run_id: run.id.clone(),
                        node: run.current_node.clone(),
                        failure: failure.clone(),
                    });
                }
            }
        }

        Ok(run)
    }

    fn step_loop(&self, graph: &Graph, conditions: &[Option<Condition>], run: &mut Run) -> Result<()> {
        loop {
            let Some(node_name) = run.current_node.clone() else {
                run.complete();
                return Ok(());
            };

            if run.steps() >= self.max_steps {
                warn!(
                    run_id = %run.id,
                    node = %node_name,
                    limit = self.max_steps,
                    "Step limit reached, terminating run"
                );
                self.fail(run, &StrandError::StepLimitExceeded { limit: self.max_steps });
                return Ok(());
            }

            match self.step(graph, conditions, &node_name, run) {
                Ok(Step::Next(next)) => {
                    run.current_node = Some(next);
                    self.store.update_run(run)?;
                }
                Ok(Step::Done) => {
                    debug!(run_id = %run.id, node = %node_name, "No edge taken, run complete");
                    run.complete();
                    return Ok(());
                }
                Err(e) => {
                    self.fail(run, &e);
                    return Ok(());
                }
            }
        }
    }

    /// Execute one node and choose where to go next.
    fn step(
        &self,
        graph: &Graph,
        conditions: &[Option<Condition>],
        node_name: &str,
        run: &mut Run,
    ) -> Result<Step> {
        let node = graph
            .node(node_name)
            .ok_or_else(|| StrandError::UnknownNode(node_name.to_string()))?;

        let node_start = Instant::now();
        // The live state is kept intact if the tool fails.
        let next_state = self.invoker.invoke(node, run.state.clone())?;
        run.record_step(&node.name, &node.tool, next_state);

        debug!(
            run_id = %run.id,
            node = %node.name,
            tool = %node.tool,
            step = run.steps(),
            elapsed_ms = node_start.elapsed().as_millis() as u64,
            "Node execution complete"
        );
        self.emit(WorkflowEvent::StepCompleted {
            run_id: run.id.clone(),
            step: run.steps(),
            node: node.name.clone(),
            tool: node.tool.clone(),
        });

        Ok(match select_edge(graph, conditions, node_name, &run.state)? {
            Some(edge) => Step::Next(edge.to.clone()),
            None => Step::Done,
        })
    }

    fn fail(&self, run: &mut Run, err: &StrandError) {
        error!(
            run_id = %run.id,
            node = run.current_node.as_deref().unwrap_or("-"),
            error = %err,
            "Run failed"
        );
        run.fail(RunFailure::from(err));
    }

    /// Record an aborted drive on the stored run, if the store lets us.
    fn abandon(&self, run_id: &RunId, err: &StrandError) {
        error!(run_id = %run_id, error = %err, "Run aborted");
        let stored = match self.store.get_run(run_id) {
            Ok(Some(run)) => run,
            Ok(None) => return,
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Could not reload aborted run");
                return;
            }
        };
        if stored.status.is_terminal() {
            return;
        }
        let mut run = stored;
        run.fail(RunFailure::new(FailureKind::Internal, err.to_string()));
        if let Err(e) = self.store.update_run(&run) {
            warn!(run_id = %run_id, error = %e, "Could not mark aborted run as failed");
        }
    }

    fn emit(&self, event: WorkflowEvent) {
        if let Some(ref bus) = self.events {
            bus.publish(event);
        }
    }
}

/// Parse the condition of every edge, in `graph.edges` order.
///
/// Conditions were already checked when the graph was created; this only
/// fails for a graph that bypassed validation.
pub fn compile_conditions(graph: &Graph) -> Result<Vec<Option<Condition>>> {
    graph
        .edges
        .iter()
        .map(|edge| {
            edge.condition
                .as_ref()
                .map(|spec| {
                    Condition::from_spec(spec).map_err(|reason| {
                        StrandError::Validation(ValidationError::InvalidCondition {
                            from: edge.from.clone(),
                            to: edge.to.clone(),
                            reason,
                        })
                    })
                })
                .transpose()
        })
        .collect()
}

/// First outgoing edge of `node` whose condition holds for `state`.
///
/// `conditions` comes from [`compile_conditions`] for the same graph.
/// Edges are tried in declared order; an edge without a condition always
/// matches. A condition that cannot be evaluated stops the search with an
/// error rather than being skipped.
pub fn select_edge<'a>(
    graph: &'a Graph,
    conditions: &[Option<Condition>],
    node: &str,
    state: &State,
) -> Result<Option<&'a Edge>> {
    let outgoing = graph
        .edges
        .iter()
        .zip(conditions)
        .filter(|(edge, _)| edge.from == node);

    for (edge, condition) in outgoing {
        let matches = match condition {
            None => true,
            Some(cond) => cond.evaluate(state).map_err(|source| StrandError::Condition {
                node: node.to_string(),
                source,
            })?,
        };

        if matches {
            return Ok(Some(edge));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_graph;
    use serde_json::json;
    use strand_core::graph::{CompareOp, GraphDefinition, Node};
    use strand_core::run::FailureKind;
    use strand_store::MemoryStore;
    use strand_tools::ToolRegistry;

    fn executor_with(max_steps: usize) -> (GraphExecutor, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let mut registry = ToolRegistry::with_builtins();
        registry.register_fn("fail", "Always fails", |_state, _config| {
            Err(StrandError::ToolValidation("nope".into()))
        });
        let executor = GraphExecutor::new(
            store.clone(),
            Arc::new(registry),
            &EngineConfig { max_steps },
        );
        (executor, store)
    }

    fn counter_graph(limit: i64) -> Graph {
        build_graph(GraphDefinition {
            nodes: vec![Node::new("count", "increment").with_param("key", json!("n"))],
            edges: vec![Edge::compare("count", "count", "n", CompareOp::Lt, json!(limit))],
            start_node: "count".into(),
        })
        .unwrap()
    }

    #[test]
    fn test_loop_until_condition_fails() {
        let (executor, store) = executor_with(100);
        let graph = counter_graph(3);

        let run = executor.execute(&graph, State::new()).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.state.get_i64("n"), Some(3));
        assert_eq!(run.steps(), 3);
        assert!(run.current_node.is_none());

        let stored = store.get_run(&run.id).unwrap().unwrap();
        assert_eq!(stored, run);
    }

    #[test]
    fn test_step_limit() {
        let (executor, _store) = executor_with(5);
        let graph = counter_graph(1_000);

        let run = executor.execute(&graph, State::new()).unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.steps(), 5);
        assert_eq!(run.error.unwrap().kind, FailureKind::StepLimitExceeded);
        assert_eq!(run.current_node.as_deref(), Some("count"));
    }

    #[test]
    fn test_first_matching_edge_wins() {
        let graph = build_graph(GraphDefinition {
            nodes: vec![
                Node::new("start", "set_values").with_param("values", json!({"x": 5})),
                Node::new("small", "set_values").with_param("values", json!({"picked": "small"})),
                Node::new("big", "set_values").with_param("values", json!({"picked": "big"})),
            ],
            edges: vec![
                Edge::when("start", "big", "x > 1"),
                Edge::when("start", "small", "x > 0"),
            ],
            start_node: "start".into(),
        })
        .unwrap();

        let conditions = compile_conditions(&graph).unwrap();
        let mut state = State::new();
        state.set("x", json!(5));
        let edge = {
            let node = String::from("start");
            select_edge(&graph, &conditions, &node, &state).unwrap().unwrap()
        };
        assert_eq!(edge.to, "big");

        let (executor, _store) = executor_with(100);
        let run = executor.execute(&graph, State::new()).unwrap();
        assert_eq!(run.state.get_str("picked"), Some("big"));
    }

    #[test]
    fn test_tool_failure_keeps_prior_state() {
        let (executor, _store) = executor_with(100);
        let graph = build_graph(GraphDefinition {
            nodes: vec![
                Node::new("a", "set_values").with_param("values", json!({"ok": true})),
                Node::new("b", "fail"),
            ],
            edges: vec![Edge::always("a", "b")],
            start_node: "a".into(),
        })
        .unwrap();

        let run = executor.execute(&graph, State::new()).unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.current_node.as_deref(), Some("b"));
        assert_eq!(run.steps(), 1);
        assert_eq!(run.state.get("ok"), Some(&json!(true)));
        assert_eq!(run.error.unwrap().kind, FailureKind::ToolExecution);
    }

    #[test]
    fn test_condition_error_fails_run() {
        let (executor, _store) = executor_with(100);
        let graph = build_graph(GraphDefinition {
            nodes: vec![Node::new("a", "set_values"), Node::new("b", "set_values")],
            edges: vec![Edge::when("a", "b", "missing > 1")],
            start_node: "a".into(),
        })
        .unwrap();

        let run = executor.execute(&graph, State::new()).unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.current_node.as_deref(), Some("a"));
        assert_eq!(run.steps(), 1);
        assert_eq!(run.error.unwrap().kind, FailureKind::Condition);
    }

    #[test]
    fn test_unvalidated_condition_fails_run() {
        let (executor, _store) = executor_with(100);
        let mut graph = counter_graph(3);
        graph.edges = vec![Edge::when("count", "count", "n <")];

        let run = executor.execute(&graph, State::new()).unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.steps(), 0);
        assert_eq!(run.error.unwrap().kind, FailureKind::Internal);
    }

    #[test]
    fn test_events_published() {
        let (executor, _store) = executor_with(100);
        let bus = Arc::new(EventBus::new(64));
        let mut rx = bus.subscribe();
        let executor = executor.with_event_bus(bus);

        let run = executor.execute(&counter_graph(2), State::new()).unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.run_id(), &run.id);
            kinds.push(serde_json::to_value(&event).unwrap()["event"].clone());
        }
        assert_eq!(
            kinds,
            vec![
                json!("run_started"),
                json!("step_completed"),
                json!("step_completed"),
                json!("run_completed"),
            ]
        );
    }
}
