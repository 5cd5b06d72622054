//! Text summarization tools used by the sample workflow.
//!
//! All lengths are measured in characters, not bytes.

use serde_json::Value;

use strand_core::error::{Result, StrandError};
use strand_core::traits::Tool;
use strand_core::types::{State, ToolConfig};

use super::config_usize;

fn read_str<'a>(state: &'a State, key: &str) -> Result<&'a str> {
    match state.get(key) {
        None | Some(Value::Null) => Ok(""),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(StrandError::ToolValidation(format!(
            "'{}' must be a string",
            key
        ))),
    }
}

fn read_str_list(state: &State, key: &str) -> Result<Vec<String>> {
    match state.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    StrandError::ToolValidation(format!("'{}' must be a list of strings", key))
                })
            })
            .collect(),
        Some(_) => Err(StrandError::ToolValidation(format!(
            "'{}' must be a list of strings",
            key
        ))),
    }
}

fn string_list(items: Vec<String>) -> Value {
    Value::Array(items.into_iter().map(Value::String).collect())
}

/// Split `text` into word-aligned chunks of at most `chunk_size` characters.
/// A single word longer than the limit becomes its own chunk.
pub fn split_into_chunks(text: &str, chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        let candidate_len = if current.is_empty() {
            word_len
        } else {
            current_len + 1 + word_len
        };

        if candidate_len > chunk_size && !current.is_empty() {
            chunks.push(current.join(" "));
            current = vec![word];
            current_len = word_len;
        } else {
            current.push(word);
            current_len = candidate_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }
    chunks
}

/// Cut `summary` to at most `target` characters, backing up to the last
/// space when there is one.
pub fn truncate_at_word(summary: &str, target: usize) -> String {
    let shorter: String = summary.chars().take(target).collect();
    match shorter.rfind(' ') {
        Some(idx) if idx > 0 => shorter[..idx].to_string(),
        _ => shorter,
    }
}

pub struct SplitTextTool;

impl Tool for SplitTextTool {
    fn name(&self) -> &str {
        "split_text"
    }

    fn description(&self) -> &str {
        "Split state.text into word-aligned chunks (config: chunk_size, default 200). \
         Writes state.chunks."
    }

    fn invoke(&self, mut state: State, config: &ToolConfig) -> Result<State> {
        let chunk_size = config_usize(config, "chunk_size", 200)?;
        let chunks = split_into_chunks(read_str(&state, "text")?, chunk_size);
        state.set("chunks", string_list(chunks));
        Ok(state)
    }
}

pub struct SummarizeChunksTool;

impl Tool for SummarizeChunksTool {
    fn name(&self) -> &str {
        "summarize_chunks"
    }

    fn description(&self) -> &str {
        "Keep the first summary_words words (default 30) of every chunk. \
         Writes state.summaries."
    }

    fn invoke(&self, mut state: State, config: &ToolConfig) -> Result<State> {
        let summary_words = config_usize(config, "summary_words", 30)?;
        let summaries: Vec<String> = read_str_list(&state, "chunks")?
            .iter()
            .map(|chunk| {
                chunk
                    .split_whitespace()
                    .take(summary_words)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();
        state.set("summaries", string_list(summaries));
        Ok(state)
    }
}

pub struct MergeSummariesTool;

impl Tool for MergeSummariesTool {
    fn name(&self) -> &str {
        "merge_summaries"
    }

    fn description(&self) -> &str {
        "Join state.summaries into state.merged_summary and record state.summary_length."
    }

    fn invoke(&self, mut state: State, _config: &ToolConfig) -> Result<State> {
        let merged = read_str_list(&state, "summaries")?.join(" ");
        let length = merged.chars().count();
        state.set_str("merged_summary", merged);
        state.set("summary_length", Value::from(length));
        Ok(state)
    }
}

pub struct RefineSummaryTool;

impl Tool for RefineSummaryTool {
    fn name(&self) -> &str {
        "refine_summary"
    }

    fn description(&self) -> &str {
        "Shorten state.merged_summary to at most target_length characters (default 400). \
         Writes state.final_summary and state.summary_length."
    }

    fn invoke(&self, mut state: State, config: &ToolConfig) -> Result<State> {
        let target = config_usize(config, "target_length", 400)?;
        let summary = read_str(&state, "merged_summary")?.to_string();

        if summary.chars().count() <= target {
            let length = summary.chars().count();
            state.set_str("final_summary", summary);
            state.set("summary_length", Value::from(length));
            return Ok(state);
        }

        let shorter = truncate_at_word(&summary, target);
        let length = shorter.chars().count();
        state.set_str("merged_summary", shorter.clone());
        state.set_str("final_summary", shorter);
        state.set("summary_length", Value::from(length));
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> ToolConfig {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_split_respects_chunk_size() {
        let chunks = split_into_chunks("aa bb cc dd ee", 5);
        assert_eq!(chunks, vec!["aa bb", "cc dd", "ee"]);
    }

    #[test]
    fn test_split_keeps_oversized_word() {
        let chunks = split_into_chunks("tiny enormousword x", 4);
        assert_eq!(chunks, vec!["tiny", "enormousword", "x"]);
    }

    #[test]
    fn test_split_empty_text() {
        assert!(split_into_chunks("   ", 10).is_empty());
    }

    #[test]
    fn test_split_tool_reads_config() {
        let mut state = State::new();
        state.set_str("text", "one two three four");
        let state = SplitTextTool
            .invoke(state, &config(json!({"chunk_size": "9"})))
            .unwrap();
        assert_eq!(state.get("chunks"), Some(&json!(["one two", "three", "four"])));
    }

    #[test]
    fn test_split_tool_missing_text_gives_no_chunks() {
        let state = SplitTextTool.invoke(State::new(), &ToolConfig::new()).unwrap();
        assert_eq!(state.get("chunks"), Some(&json!([])));
    }

    #[test]
    fn test_split_tool_rejects_non_string_text() {
        let mut state = State::new();
        state.set("text", json!(12));
        let err = SplitTextTool.invoke(state, &ToolConfig::new()).unwrap_err();
        assert!(matches!(err, StrandError::ToolValidation(_)));
    }

    #[test]
    fn test_summarize_takes_leading_words() {
        let mut state = State::new();
        state.set("chunks", json!(["a b c d", "e f"]));
        let state = SummarizeChunksTool
            .invoke(state, &config(json!({"summary_words": 2})))
            .unwrap();
        assert_eq!(state.get("summaries"), Some(&json!(["a b", "e f"])));
    }

    #[test]
    fn test_merge_records_length() {
        let mut state = State::new();
        state.set("summaries", json!(["héllo", "world"]));
        let state = MergeSummariesTool.invoke(state, &ToolConfig::new()).unwrap();
        assert_eq!(state.get_str("merged_summary"), Some("héllo world"));
        assert_eq!(state.get_i64("summary_length"), Some(11));
    }

    #[test]
    fn test_refine_short_summary_unchanged() {
        let mut state = State::new();
        state.set_str("merged_summary", "short");
        let state = RefineSummaryTool.invoke(state, &ToolConfig::new()).unwrap();
        assert_eq!(state.get_str("final_summary"), Some("short"));
        assert_eq!(state.get_i64("summary_length"), Some(5));
    }

    #[test]
    fn test_refine_truncates_at_word_boundary() {
        let mut state = State::new();
        state.set_str("merged_summary", "alpha beta gamma delta");
        let state = RefineSummaryTool
            .invoke(state, &config(json!({"target_length": 13})))
            .unwrap();
        assert_eq!(state.get_str("merged_summary"), Some("alpha beta"));
        assert_eq!(state.get_str("final_summary"), Some("alpha beta"));
        assert_eq!(state.get_i64("summary_length"), Some(10));
    }

    #[test]
    fn test_truncate_without_space() {
        assert_eq!(truncate_at_word("abcdefgh", 3), "abc");
    }
}
