use serde_json::Value;

use strand_core::error::{Result, StrandError};
use strand_core::traits::Tool;
use strand_core::types::{State, ToolConfig};

/// Merge `config.values` into the state.
pub struct SetValuesTool;

impl Tool for SetValuesTool {
    fn name(&self) -> &str {
        "set_values"
    }

    fn description(&self) -> &str {
        "Merge the object in config.values into the state, overwriting existing keys."
    }

    fn invoke(&self, mut state: State, config: &ToolConfig) -> Result<State> {
        match config.get("values") {
            None => {}
            Some(Value::Object(values)) => state.merge(values),
            Some(_) => {
                return Err(StrandError::ToolValidation(
                    "'values' must be an object".into(),
                ))
            }
        }
        Ok(state)
    }
}

/// Add `config.by` (default 1) to the integer at `config.key`.
pub struct IncrementTool;

impl Tool for IncrementTool {
    fn name(&self) -> &str {
        "increment"
    }

    fn description(&self) -> &str {
        "Add config.by (default 1) to the integer stored under config.key. \
         A missing key counts as 0."
    }

    fn invoke(&self, mut state: State, config: &ToolConfig) -> Result<State> {
        let key = config
            .get("key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StrandError::ToolValidation("'key' must be a string".into()))?;
        let by = match config.get("by") {
            None => 1,
            Some(v) => v
                .as_i64()
                .ok_or_else(|| StrandError::ToolValidation("'by' must be an integer".into()))?,
        };

        let current = match state.get(key) {
            None | Some(Value::Null) => 0,
            Some(v) => v.as_i64().ok_or_else(|| {
                StrandError::ToolValidation(format!("state key '{}' is not an integer", key))
            })?,
        };

        let next = current
            .checked_add(by)
            .ok_or_else(|| StrandError::ToolValidation(format!("incrementing '{}' overflows", key)))?;
        state.set(key, Value::from(next));
        Ok(state)
    }
}
