use std::collections::{HashMap, HashSet};

use chrono::Utc;

use strand_core::error::ValidationError;
use strand_core::graph::{Graph, GraphDefinition, Node};
use strand_core::types::GraphId;

use super::condition::Condition;

/// Check a graph definition. The first failing check wins, in this order:
/// start node exists, edge endpoints exist, at least one node, unique node
/// names, parseable edge conditions.
pub fn validate(def: &GraphDefinition) -> Result<(), ValidationError> {
    let names: HashSet<&str> = def.nodes.iter().map(|n| n.name.as_str()).collect();

    if !names.contains(def.start_node.as_str()) {
        return Err(ValidationError::MissingStartNode(def.start_node.clone()));
    }

    for edge in &def.edges {
        if !names.contains(edge.from.as_str()) {
            return Err(ValidationError::UnknownSource {
                from: edge.from.clone(),
                to: edge.to.clone(),
            });
        }
        if !names.contains(edge.to.as_str()) {
            return Err(ValidationError::UnknownTarget {
                from: edge.from.clone(),
                to: edge.to.clone(),
            });
        }
    }

    if def.nodes.is_empty() {
        return Err(ValidationError::EmptyGraph);
    }

    if names.len() != def.nodes.len() {
        let mut seen = HashSet::new();
        if let Some(dup) = def.nodes.iter().find(|n| !seen.insert(n.name.as_str())) {
            return Err(ValidationError::DuplicateNode(dup.name.clone()));
        }
    }

    for edge in &def.edges {
        if let Some(ref spec) = edge.condition {
            Condition::from_spec(spec).map_err(|reason| ValidationError::InvalidCondition {
                from: edge.from.clone(),
                to: edge.to.clone(),
                reason,
            })?;
        }
    }

    Ok(())
}

/// Validate a definition and turn it into an immutable [`Graph`] with a
/// fresh id.
pub fn build_graph(def: GraphDefinition) -> Result<Graph, ValidationError> {
    validate(&def)?;

    let nodes: HashMap<String, Node> = def
        .nodes
        .into_iter()
        .map(|n| (n.name.clone(), n))
        .collect();

    Ok(Graph {
        id: GraphId::new(),
        nodes,
        edges: def.edges,
        start_node: def.start_node,
        created_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_core::graph::Edge;

    fn def(nodes: &[&str], edges: Vec<Edge>, start: &str) -> GraphDefinition {
        GraphDefinition {
            nodes: nodes.iter().map(|n| Node::new(*n, "noop")).collect(),
            edges,
            start_node: start.to_string(),
        }
    }

    #[test]
    fn test_valid_graph_builds() {
        let graph = build_graph(def(
            &["a", "b"],
            vec![Edge::always("a", "b"), Edge::when("b", "b", "n < 3")],
            "a",
        ))
        .unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 2);
        assert_eq!(graph.start_node, "a");
    }

    #[test]
    fn test_missing_start_node() {
        let err = validate(&def(&["a"], vec![], "zzz")).unwrap_err();
        assert!(matches!(err, ValidationError::MissingStartNode(ref s) if s == "zzz"));
    }

    #[test]
    fn test_unknown_edge_endpoints() {
        let err = validate(&def(&["a"], vec![Edge::always("x", "a")], "a")).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownSource { ref from, .. } if from == "x"));

        let err = validate(&def(&["a"], vec![Edge::always("a", "y")], "a")).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownTarget { ref to, .. } if to == "y"));
    }

    #[test]
    fn test_empty_graph_fails_on_start_node_first() {
        let err = validate(&def(&[], vec![], "a")).unwrap_err();
        assert!(matches!(err, ValidationError::MissingStartNode(_)));
    }

    #[test]
    fn test_duplicate_node_names() {
        let err = validate(&def(&["a", "b", "a"], vec![], "a")).unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateNode(ref n) if n == "a"));
    }

    #[test]
    fn test_first_failure_wins() {
        // Both the start node and an edge are broken; start node is reported.
        let err = validate(&def(&["a"], vec![Edge::always("a", "nope")], "missing")).unwrap_err();
        assert!(matches!(err, ValidationError::MissingStartNode(_)));

        // Edge endpoint is checked before duplicates.
        let err = validate(&def(&["a", "a"], vec![Edge::always("a", "nope")], "a")).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownTarget { .. }));
    }

    #[test]
    fn test_invalid_condition_rejected() {
        let err = validate(&def(&["a"], vec![Edge::when("a", "a", "n >")], "a")).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidCondition { .. }));
    }
}
