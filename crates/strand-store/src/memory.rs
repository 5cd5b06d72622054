use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use strand_core::error::{Result, StrandError};
use strand_core::graph::Graph;
use strand_core::run::Run;
use strand_core::traits::RunStore;
use strand_core::types::{GraphId, RunId};

/// Process-local store. Contents are lost on exit.
///
/// Runs are stored by value and handed out as clones, so a reader holds a
/// consistent snapshot even while the run keeps stepping.
#[derive(Default)]
pub struct MemoryStore {
    graphs: RwLock<HashMap<GraphId, Arc<Graph>>>,
    runs: RwLock<HashMap<RunId, Run>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph_count(&self) -> usize {
        self.graphs.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn run_count(&self) -> usize {
        self.runs.read().map(|r| r.len()).unwrap_or(0)
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StrandError {
    StrandError::Database(format!("store lock poisoned: {}", e))
}

impl RunStore for MemoryStore {
    fn create_graph(&self, graph: Graph) -> Result<GraphId> {
        let mut graphs = self.graphs.write().map_err(poisoned)?;
        if graphs.contains_key(&graph.id) {
            return Err(StrandError::Conflict(format!("graph {}", graph.id)));
        }
        let id = graph.id.clone();
        graphs.insert(id.clone(), Arc::new(graph));
        debug!(graph_id = %id, "Graph stored");
        Ok(id)
    }

    fn get_graph(&self, id: &GraphId) -> Result<Option<Arc<Graph>>> {
        let graphs = self.graphs.read().map_err(poisoned)?;
        Ok(graphs.get(id).cloned())
    }

    fn create_run(&self, run: &Run) -> Result<RunId> {
        let mut runs = self.runs.write().map_err(poisoned)?;
        if runs.contains_key(&run.id) {
            return Err(StrandError::Conflict(format!("run {}", run.id)));
        }
        runs.insert(run.id.clone(), run.clone());
        Ok(run.id.clone())
    }

    fn get_run(&self, id: &RunId) -> Result<Option<Run>> {
        let runs = self.runs.read().map_err(poisoned)?;
        Ok(runs.get(id).cloned())
    }

    fn update_run(&self, run: &Run) -> Result<()> {
        let mut runs = self.runs.write().map_err(poisoned)?;
        match runs.get_mut(&run.id) {
            None => Err(StrandError::UnknownRun(run.id.to_string())),
            Some(stored) if stored.status.is_terminal() => {
                Err(StrandError::RunFinalized(run.id.to_string()))
            }
            Some(stored) => {
                *stored = run.clone();
                Ok(())
            }
        }
    }
}
