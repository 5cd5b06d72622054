use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use strand_core::error::{Result, StrandError};
use strand_core::graph::Graph;
use strand_core::run::Run;
use strand_core::traits::RunStore;
use strand_core::types::{GraphId, RunId};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS graphs (
        id TEXT PRIMARY KEY,
        graph_json TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS runs (
        id TEXT PRIMARY KEY,
        graph_id TEXT NOT NULL REFERENCES graphs(id),
        status TEXT NOT NULL,
        run_json TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_runs_graph ON runs(graph_id, created_at);";

/// SQLite-backed store.
///
/// Graphs and runs are stored as JSON documents next to a few indexed
/// columns. Each run update is a single `UPDATE`, so readers see either the
/// previous step or the new one. Parsed graphs are cached since they never
/// change once written.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    graph_cache: RwLock<HashMap<GraphId, Arc<Graph>>>,
}

fn db_err(e: impl std::fmt::Display) -> StrandError {
    StrandError::Database(e.to_string())
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StrandError::Database(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err)?;

        // WAL lets pollers read while a run is writing
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;

        debug!(path = %path.display(), "SQLite store opened");
        Self::with_connection(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
            graph_cache: RwLock::new(HashMap::new()),
        })
    }

    fn cached_graph(&self, id: &GraphId) -> Option<Arc<Graph>> {
        self.graph_cache.read().ok()?.get(id).cloned()
    }

    fn cache_graph(&self, graph: Arc<Graph>) {
        if let Ok(mut cache) = self.graph_cache.write() {
            cache.insert(graph.id.clone(), graph);
        }
    }
}

impl RunStore for SqliteStore {
    fn create_graph(&self, graph: Graph) -> Result<GraphId> {
        let json = serde_json::to_string(&graph)?;
        {
            let conn = self.conn.lock().map_err(db_err)?;
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO graphs (id, graph_json, created_at) VALUES (?1, ?2, ?3)",
                    params![graph.id.as_str(), json, graph.created_at.to_rfc3339()],
                )
                .map_err(db_err)?;
            if inserted == 0 {
                return Err(StrandError::Conflict(format!("graph {}", graph.id)));
            }
        }

        let id = graph.id.clone();
        debug!(graph_id = %id, "Graph stored");
        self.cache_graph(Arc::new(graph));
        Ok(id)
    }

    fn get_graph(&self, id: &GraphId) -> Result<Option<Arc<Graph>>> {
        if let Some(graph) = self.cached_graph(id) {
            return Ok(Some(graph));
        }

        let json: Option<String> = {
            let conn = self.conn.lock().map_err(db_err)?;
            conn.query_row(
                "SELECT graph_json FROM graphs WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?
        };

        match json {
            None => Ok(None),
            Some(json) => {
                let graph = Arc::new(serde_json::from_str::<Graph>(&json)?);
                self.cache_graph(graph.clone());
                Ok(Some(graph))
            }
        }
    }

    fn create_run(&self, run: &Run) -> Result<RunId> {
        let json = serde_json::to_string(run)?;
        let conn = self.conn.lock().map_err(db_err)?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO runs (id, graph_id, status, run_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    run.id.as_str(),
                    run.graph_id.as_str(),
                    run.status.as_str(),
                    json,
                    run.created_at.to_rfc3339(),
                    run.updated_at.to_rfc3339(),
                ],
            )
            .map_err(db_err)?;
        if inserted == 0 {
            return Err(StrandError::Conflict(format!("run {}", run.id)));
        }
        Ok(run.id.clone())
    }

    fn get_run(&self, id: &RunId) -> Result<Option<Run>> {
        let json: Option<String> = {
            let conn = self.conn.lock().map_err(db_err)?;
            conn.query_row(
                "SELECT run_json FROM runs WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?
        };

        json.map(|j| serde_json::from_str(&j).map_err(StrandError::from))
            .transpose()
    }

    fn update_run(&self, run: &Run) -> Result<()> {
        let json = serde_json::to_string(run)?;
        let conn = self.conn.lock().map_err(db_err)?;
        let updated = conn
            .execute(
                "UPDATE runs SET status = ?2, run_json = ?3, updated_at = ?4
                 WHERE id = ?1 AND status NOT IN ('completed', 'failed')",
                params![
                    run.id.as_str(),
                    run.status.as_str(),
                    json,
                    run.updated_at.to_rfc3339(),
                ],
            )
            .map_err(db_err)?;

        if updated == 1 {
            return Ok(());
        }

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM runs WHERE id = ?1)",
                params![run.id.as_str()],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        if exists {
            Err(StrandError::RunFinalized(run.id.to_string()))
        } else {
            Err(StrandError::UnknownRun(run.id.to_string()))
        }
    }
}
