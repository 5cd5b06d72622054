use std::sync::Arc;

use crate::error::Result;
use crate::graph::Graph;
use crate::run::Run;
use crate::types::{GraphId, RunId, State, ToolConfig};

/// A named, side-effecting step applied to the run state.
///
/// Tools run synchronously on the run's own worker thread. The returned
/// state replaces the input state wholesale.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (referenced by graph nodes).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Apply the tool to `state` using the node's `config`.
    fn invoke(&self, state: State, config: &ToolConfig) -> Result<State>;
}

/// Lookup capability the engine uses to find tools by name.
pub trait ToolResolver: Send + Sync + 'static {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Tool>>;
}

/// Persistence backend for graphs and runs.
///
/// Every write replaces the whole record; readers never observe a partially
/// updated run.
pub trait RunStore: Send + Sync + 'static {
    /// Store a validated graph.
    fn create_graph(&self, graph: Graph) -> Result<GraphId>;

    /// Load a graph by id.
    fn get_graph(&self, id: &GraphId) -> Result<Option<Arc<Graph>>>;

    /// Insert a new run record.
    fn create_run(&self, run: &Run) -> Result<RunId>;

    /// Load a run by id.
    fn get_run(&self, id: &RunId) -> Result<Option<Run>>;

    /// Replace an existing run record. Fails if the stored run is terminal.
    fn update_run(&self, run: &Run) -> Result<()>;
}
