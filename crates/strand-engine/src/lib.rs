pub mod graph;
pub mod invoker;
pub mod run_log;
pub mod service;

pub use graph::{build_graph, validate, Condition, GraphExecutor};
pub use invoker::ToolInvoker;
pub use run_log::RunLogger;
pub use service::WorkflowService;
