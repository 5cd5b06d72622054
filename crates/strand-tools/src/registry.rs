use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use strand_core::error::Result;
use strand_core::traits::{Tool, ToolResolver};
use strand_core::types::{State, ToolConfig};

type ToolFn = dyn Fn(State, &ToolConfig) -> Result<State> + Send + Sync + 'static;

/// A tool backed by a closure.
pub struct FnTool {
    name: String,
    description: String,
    func: Box<ToolFn>,
}

impl FnTool {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, func: F) -> Self
    where
        F: Fn(State, &ToolConfig) -> Result<State> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            func: Box::new(func),
        }
    }
}

impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn invoke(&self, state: State, config: &ToolConfig) -> Result<State> {
        (self.func)(state, config)
    }
}

/// Registry of available tools.
///
/// Built once at startup, then shared read-only with the engine through
/// [`ToolResolver`].
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: impl Tool) {
        let name = tool.name().to_string();
        debug!(tool = %name, "Registering tool");
        self.tools.insert(name, Arc::new(tool));
    }

    /// Register a closure as a tool.
    pub fn register_fn<F>(&mut self, name: &str, description: &str, func: F)
    where
        F: Fn(State, &ToolConfig) -> Result<State> + Send + Sync + 'static,
    {
        self.register(FnTool::new(name, description, func));
    }

    /// Unregister a tool by name.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List all registered tool names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// `(name, description)` pairs, sorted by name.
    pub fn descriptions(&self) -> Vec<(&str, &str)> {
        let mut out: Vec<(&str, &str)> = self
            .tools
            .values()
            .map(|t| (t.name(), t.description()))
            .collect();
        out.sort_unstable_by_key(|(name, _)| *name);
        out
    }

    /// Create a registry with all built-in tools registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        // ── Text summarization ──────────────────────────────────
        registry.register(crate::builtin::text::SplitTextTool);
        registry.register(crate::builtin::text::SummarizeChunksTool);
        registry.register(crate::builtin::text::MergeSummariesTool);
        registry.register(crate::builtin::text::RefineSummaryTool);

        // ── State manipulation ──────────────────────────────────
        registry.register(crate::builtin::state::SetValuesTool);
        registry.register(crate::builtin::state::IncrementTool);

        registry
    }
}

impl ToolResolver for ToolRegistry {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.get(name)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
