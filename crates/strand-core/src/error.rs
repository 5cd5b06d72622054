use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrandError {
    // Graph definition errors
    #[error("Invalid graph: {0}")]
    Validation(#[from] ValidationError),

    // Lookup errors
    #[error("Graph not found: {0}")]
    UnknownGraph(String),

    #[error("Run not found: {0}")]
    UnknownRun(String),

    #[error("Node '{0}' not found in graph")]
    UnknownNode(String),

    // Step errors (recorded on the run, never returned to the caller)
    #[error("Tool '{0}' is not registered")]
    UnknownTool(String),

    #[error("Tool execution failed: {tool} at node '{node}': {message}")]
    ToolExecution {
        node: String,
        tool: String,
        message: String,
    },

    #[error("Condition on edge from '{node}' failed: {source}")]
    Condition {
        node: String,
        #[source]
        source: ConditionError,
    },

    #[error("Max steps exceeded ({limit}), possible infinite loop")]
    StepLimitExceeded { limit: usize },

    // Tool input errors, raised by tools themselves
    #[error("Tool input validation failed: {0}")]
    ToolValidation(String),

    // Store errors
    #[error("Run {0} already finished and cannot be modified")]
    RunFinalized(String),

    #[error("Record already exists: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Run worker failed: {0}")]
    Worker(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Structural problems with a graph definition. The first failing check wins.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("start_node '{0}' must be one of the node names")]
    MissingStartNode(String),

    #[error("Unknown source node: {from} (edge {from} -> {to})")]
    UnknownSource { from: String, to: String },

    #[error("Unknown target node: {to} (edge {from} -> {to})")]
    UnknownTarget { from: String, to: String },

    #[error("Graph must contain at least one node")]
    EmptyGraph,

    #[error("Duplicate node name: {0}")]
    DuplicateNode(String),

    #[error("Invalid condition on edge {from} -> {to}: {reason}")]
    InvalidCondition {
        from: String,
        to: String,
        #[source]
        reason: ConditionError,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("syntax error at offset {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("state key '{0}' is not set")]
    MissingKey(String),

    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: String,
        left: &'static str,
        right: &'static str,
    },

    #[error("{context} expects a boolean, found {found}")]
    NotBoolean {
        context: &'static str,
        found: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, StrandError>;
