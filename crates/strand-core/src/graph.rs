//! Workflow graph model.
//!
//! A `GraphDefinition` is what clients submit: a list of nodes, an ordered
//! list of edges and a start node. Once validated it becomes an immutable
//! `Graph` with nodes indexed by name.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{GraphId, ToolConfig};

/// A node in the workflow graph, bound to exactly one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique name within the graph.
    pub name: String,
    /// Name of the registered tool this node invokes.
    pub tool: String,
    /// Opaque parameters passed to the tool.
    #[serde(default)]
    pub config: ToolConfig,
}

impl Node {
    /// Create a node with an empty config.
    pub fn new(name: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tool: tool.into(),
            config: ToolConfig::new(),
        }
    }

    /// Set a single config parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Replace the whole config.
    pub fn with_config(mut self, config: ToolConfig) -> Self {
        self.config = config;
        self
    }
}

/// Comparison operator of a structured condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guard on an edge, as written by the workflow author.
///
/// Either a boolean expression string (`summary_length > 400 and not done`)
/// or the structured `{key, op, value}` form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionSpec {
    Expr(String),
    Compare {
        key: String,
        op: CompareOp,
        value: Value,
    },
}

/// A directed transition between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node name.
    #[serde(alias = "source")]
    pub from: String,
    /// Target node name.
    #[serde(alias = "target")]
    pub to: String,
    /// Optional guard evaluated against the post-tool state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionSpec>,
}

impl Edge {
    /// Create an unconditional edge.
    pub fn always(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: None,
        }
    }

    /// Create an edge guarded by an expression.
    pub fn when(from: impl Into<String>, to: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: Some(ConditionSpec::Expr(expr.into())),
        }
    }

    /// Create an edge guarded by a structured comparison.
    pub fn compare(
        from: impl Into<String>,
        to: impl Into<String>,
        key: impl Into<String>,
        op: CompareOp,
        value: Value,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: Some(ConditionSpec::Compare {
                key: key.into(),
                op,
                value,
            }),
        }
    }
}

/// A graph as submitted by a client, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    pub start_node: String,
}

/// A validated, immutable workflow graph.
///
/// Built by `strand_engine::graph::build_graph`; shared read-only between
/// concurrent runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    pub id: GraphId,
    pub nodes: HashMap<String, Node>,
    /// Edges in declaration order. Order is the selection priority.
    pub edges: Vec<Edge>,
    pub start_node: String,
    pub created_at: DateTime<Utc>,
}

impl Graph {
    /// Look up a node by name.
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Convert back to the client-facing shape. Nodes are sorted by name.
    pub fn to_definition(&self) -> GraphDefinition {
        let mut nodes: Vec<Node> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        GraphDefinition {
            nodes,
            edges: self.edges.clone(),
            start_node: self.start_node.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_edge_builders() {
        let e = Edge::always("a", "b");
        assert_eq!(e.from, "a");
        assert_eq!(e.to, "b");
        assert!(e.condition.is_none());

        let e = Edge::when("a", "c", "x > 1");
        assert_eq!(e.condition, Some(ConditionSpec::Expr("x > 1".into())));

        let e = Edge::compare("a", "d", "x", CompareOp::Le, json!(3));
        assert!(matches!(
            e.condition,
            Some(ConditionSpec::Compare { op: CompareOp::Le, .. })
        ));
    }

    #[test]
    fn test_definition_wire_shape() {
        let raw = json!({
            "nodes": [
                {"name": "split", "tool": "split_text", "config": {"chunk_size": 250}},
                {"name": "refine", "tool": "refine_summary"}
            ],
            "edges": [
                {"from": "split", "to": "refine"},
                {"source": "refine", "target": "refine",
                 "condition": {"key": "summary_length", "op": ">", "value": 400}},
                {"from": "refine", "to": "split", "condition": "done == false"}
            ],
            "start_node": "split"
        });
        let def: GraphDefinition = serde_json::from_value(raw).unwrap();

        assert_eq!(def.nodes.len(), 2);
        assert_eq!(def.nodes[0].config.get("chunk_size"), Some(&json!(250)));
        assert!(def.nodes[1].config.is_empty());
        assert_eq!(def.edges[1].from, "refine");
        assert_eq!(
            def.edges[1].condition,
            Some(ConditionSpec::Compare {
                key: "summary_length".into(),
                op: CompareOp::Gt,
                value: json!(400),
            })
        );
        assert_eq!(
            def.edges[2].condition,
            Some(ConditionSpec::Expr("done == false".into()))
        );
    }

    #[test]
    fn test_unconditional_edge_omits_condition() {
        let json = serde_json::to_value(Edge::always("a", "b")).unwrap();
        assert_eq!(json, json!({"from": "a", "to": "b"}));
    }

    #[test]
    fn test_to_definition_keeps_edge_order() {
        let graph = Graph {
            id: GraphId::new(),
            nodes: HashMap::from([
                ("a".to_string(), Node::new("a", "noop")),
                ("b".to_string(), Node::new("b", "noop")),
            ]),
            edges: vec![
                Edge::when("a", "b", "x > 1"),
                Edge::always("b", "a"),
                Edge::always("a", "a"),
            ],
            start_node: "a".into(),
            created_at: Utc::now(),
        };

        let def = graph.to_definition();
        assert_eq!(def.nodes[0].name, "a");
        let targets: Vec<&str> = def.edges.iter().map(|e| e.to.as_str()).collect();
        assert_eq!(targets, vec!["b", "a", "a"]);
    }
}
