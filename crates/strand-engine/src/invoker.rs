use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::debug;

use strand_core::error::{Result, StrandError};
use strand_core::graph::Node;
use strand_core::traits::ToolResolver;
use strand_core::types::State;

/// Resolves a node's tool and applies it to the state.
///
/// Tool errors and panics both come back as `ToolExecution`. Nothing is
/// retried: tools may have side effects.
#[derive(Clone)]
pub struct ToolInvoker {
    tools: Arc<dyn ToolResolver>,
}

impl ToolInvoker {
    pub fn new(tools: Arc<dyn ToolResolver>) -> Self {
        Self { tools }
    }

    /// Run `node`'s tool on `state` and return the next state.
    pub fn invoke(&self, node: &Node, state: State) -> Result<State> {
        let tool = self
            .tools
            .resolve(&node.tool)
            .ok_or_else(|| StrandError::UnknownTool(node.tool.clone()))?;

        debug!(node = %node.name, tool = %node.tool, "Invoking tool");

        match panic::catch_unwind(AssertUnwindSafe(|| tool.invoke(state, &node.config))) {
            Ok(Ok(next)) => Ok(next),
            Ok(Err(e)) => Err(StrandError::ToolExecution {
                node: node.name.clone(),
                tool: node.tool.clone(),
                message: e.to_string(),
            }),
            Err(payload) => Err(StrandError::ToolExecution {
                node: node.name.clone(),
                tool: node.tool.clone(),
                message: format!("tool panicked: {}", panic_message(payload.as_ref())),
            }),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
