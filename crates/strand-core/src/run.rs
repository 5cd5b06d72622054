use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StrandError;
use crate::types::{GraphId, RunId, State};

/// Lifecycle of a run: `pending -> running -> {completed | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Completed and failed runs are immutable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLogEntry {
    pub node: String,
    pub tool: String,
    /// Frozen copy of the state right after this step.
    #[serde(rename = "state", alias = "state_snapshot")]
    pub state_snapshot: State,
}

/// Why a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The node references a tool the registry does not know.
    UnknownTool,
    /// The tool returned an error or panicked.
    ToolExecution,
    /// An edge condition could not be evaluated.
    Condition,
    /// The step ceiling was hit; the graph probably loops forever.
    StepLimitExceeded,
    /// Anything else that stopped the run (e.g. a node missing from the graph).
    Internal,
}

/// Failure recorded on a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl RunFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&StrandError> for RunFailure {
    fn from(err: &StrandError) -> Self {
        let kind = match err {
            StrandError::UnknownTool(_) => FailureKind::UnknownTool,
            StrandError::ToolExecution { .. } | StrandError::ToolValidation(_) => {
                FailureKind::ToolExecution
            }
            StrandError::Condition { .. } => FailureKind::Condition,
            StrandError::StepLimitExceeded { .. } => FailureKind::StepLimitExceeded,
            _ => FailureKind::Internal,
        };
        Self::new(kind, err.to_string())
    }
}

/// One execution instance of a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    #[serde(rename = "run_id")]
    pub id: RunId,
    pub graph_id: GraphId,
    pub status: RunStatus,
    pub current_node: Option<String>,
    pub state: State,
    pub log: Vec<StepLogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    /// Create a pending run positioned at `start_node`.
    pub fn pending(graph_id: GraphId, start_node: impl Into<String>, initial_state: State) -> Self {
        let now = Utc::now();
        Self {
            id: RunId::new(),
            graph_id,
            status: RunStatus::Pending,
            current_node: Some(start_node.into()),
            state: initial_state,
            log: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Number of node executions performed so far.
    pub fn steps(&self) -> usize {
        self.log.len()
    }

    /// Append a step and adopt its state as the live state.
    pub fn record_step(&mut self, node: &str, tool: &str, state: State) {
        self.log.push(StepLogEntry {
            node: node.to_string(),
            tool: tool.to_string(),
            state_snapshot: state.clone(),
        });
        self.state = state;
        self.touch();
    }

    pub fn mark_running(&mut self) {
        self.status = RunStatus::Running;
        self.touch();
    }

    /// Natural termination: no outgoing edge was satisfied.
    pub fn complete(&mut self) {
        self.status = RunStatus::Completed;
        self.current_node = None;
        self.touch();
    }

    /// Record a failure. `current_node` is left where it was.
    pub fn fail(&mut self, failure: RunFailure) {
        self.status = RunStatus::Failed;
        self.error = Some(failure);
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lifecycle() {
        let mut run = Run::pending(GraphId::new(), "start", State::new());
        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(run.current_node.as_deref(), Some("start"));
        assert!(!run.status.is_terminal());

        run.mark_running();
        assert_eq!(run.status, RunStatus::Running);

        run.complete();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.current_node.is_none());
        assert!(run.status.is_terminal());
    }

    #[test]
    fn test_record_step_snapshots_state() {
        let mut run = Run::pending(GraphId::new(), "a", State::new());
        let mut state = State::new();
        state.set("n", json!(1));
        run.record_step("a", "increment", state);

        run.state.set("n", json!(2));
        assert_eq!(run.steps(), 1);
        assert_eq!(run.log[0].state_snapshot.get("n"), Some(&json!(1)));
    }

    #[test]
    fn test_failure_kind_from_error() {
        let err = StrandError::UnknownTool("nope".into());
        let failure = RunFailure::from(&err);
        assert_eq!(failure.kind, FailureKind::UnknownTool);
        assert!(failure.message.contains("nope"));

        let err = StrandError::StepLimitExceeded { limit: 10 };
        assert_eq!(RunFailure::from(&err).kind, FailureKind::StepLimitExceeded);
    }

    #[test]
    fn test_serialized_shape() {
        let mut run = Run::pending(GraphId::from_string("g"), "a", State::new());
        run.record_step("a", "noop", State::new());
        run.fail(RunFailure::new(FailureKind::Condition, "boom"));

        let value = serde_json::to_value(&run).unwrap();
        assert_eq!(value["graph_id"], json!("g"));
        assert_eq!(value["status"], json!("failed"));
        assert_eq!(value["current_node"], json!("a"));
        assert_eq!(value["log"][0]["node"], json!("a"));
        assert_eq!(value["log"][0]["state"], json!({}));
        assert_eq!(value["error"]["kind"], json!("condition"));
        assert!(value.get("run_id").is_some());

        let parsed: Run = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, run);
    }
}
