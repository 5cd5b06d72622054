use serde_json::json;

use strand_core::graph::{CompareOp, Edge, GraphDefinition, Node};

/// Text used by `strand run` when no input is given.
pub const SAMPLE_TEXT: &str = "Workflow engines model a job as a graph of small steps. \
Each step reads a shared state, does one thing well, and writes its results back so that \
later steps can build on them. Edges between steps decide what runs next, and a condition \
on an edge lets the same graph branch or loop without any step knowing about the others. \
Because every step is recorded together with the state it produced, a finished run doubles \
as an audit trail: it is easy to see which step changed what, and to replay the run by hand \
when something looks wrong. Long documents are a natural fit. One step splits the text into \
chunks, the next condenses each chunk on its own, a third stitches the pieces back together, \
and a final step trims the result until it fits the length the reader asked for. If the \
trimmed summary is still too long, the last step simply runs again on its own output.";

/// The split, summarize, merge, refine pipeline registered at startup.
///
/// `refine` loops on itself while `summary_length` is above 400 characters.
pub fn summarization_graph() -> GraphDefinition {
    GraphDefinition {
        nodes: vec![
            Node::new("split", "split_text").with_param("chunk_size", json!(250)),
            Node::new("summarize", "summarize_chunks").with_param("summary_words", json!(40)),
            Node::new("merge", "merge_summaries"),
            Node::new("refine", "refine_summary").with_param("target_length", json!(400)),
        ],
        edges: vec![
            Edge::always("split", "summarize"),
            Edge::always("summarize", "merge"),
            Edge::always("merge", "refine"),
            Edge::compare("refine", "refine", "summary_length", CompareOp::Gt, json!(400)),
        ],
        start_node: "split".into(),
    }
}
