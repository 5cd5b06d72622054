pub mod config;
pub mod error;
pub mod event;
pub mod graph;
pub mod run;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{ConditionError, Result, StrandError, ValidationError};
pub use event::{EventBus, WorkflowEvent};
pub use graph::{ConditionSpec, CompareOp, Edge, Graph, GraphDefinition, Node};
pub use run::{FailureKind, Run, RunFailure, RunStatus, StepLogEntry};
pub use types::*;
