pub mod state;
pub mod text;

use serde_json::Value;

use strand_core::error::{Result, StrandError};
use strand_core::types::ToolConfig;

/// Read a non-negative integer parameter, accepting numeric strings and
/// whole-number floats such as `250.0`.
pub(crate) fn config_usize(config: &ToolConfig, key: &str, default: usize) -> Result<usize> {
    let invalid = || StrandError::ToolValidation(format!("'{}' must be a non-negative integer", key));
    match config.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(v) => Ok(v as usize),
            None => n
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= usize::MAX as f64)
                .map(|f| f as usize)
                .ok_or_else(invalid),
        },
        Some(Value::String(s)) => s.trim().parse::<usize>().map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}
