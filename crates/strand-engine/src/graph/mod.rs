//! Graph execution engine: validated workflows over a shared state map.
//!
//! A workflow is a directed graph of `Node`s connected by `Edge`s. Each node
//! applies one registered tool to the run state. Edges carry optional
//! conditions over that state; cycles are allowed and bounded by the
//! engine's step limit.
//!
//! The `GraphExecutor` walks the graph from the start node, executing each
//! node and following the first outgoing edge whose condition holds. A run
//! completes when no edge is taken.

pub mod condition;
pub mod executor;
pub mod validate;

pub use condition::{Condition, Expr};
pub use executor::{compile_conditions, select_edge, GraphExecutor};
pub use validate::{build_graph, validate};
