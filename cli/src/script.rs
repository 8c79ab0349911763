//! Pointer scripts: one JSON object per line, replayed against a joined engine.
//!
//! ```text
//! {"x": 200, "y": 150, "waitMs": 100}
//! {"leave": true, "waitMs": 500}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

#[cfg(test)]
#[path = "script_test.rs"]
mod script_test;

use std::time::Duration;

use cobrowse::geometry::Point;
use serde::Deserialize;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("pointer script line {line}: {message}")]
pub struct ScriptError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerAction {
    Move(Point),
    Leave,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptStep {
    /// Delay before the action fires.
    pub wait: Duration,
    pub action: PointerAction,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawStep {
    x: Option<f64>,
    y: Option<f64>,
    #[serde(default)]
    wait_ms: u64,
    #[serde(default)]
    leave: bool,
}

pub fn parse_script(text: &str) -> Result<Vec<ScriptStep>, ScriptError> {
    let mut steps = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fail = |message: String| ScriptError { line: index + 1, message };
        let raw: RawStep = serde_json::from_str(trimmed).map_err(|e| fail(e.to_string()))?;
        let action = match (raw.leave, raw.x, raw.y) {
            (true, None, None) => PointerAction::Leave,
            (true, _, _) => return Err(fail("`leave` cannot be combined with coordinates".to_owned())),
            (false, Some(x), Some(y)) => PointerAction::Move(Point::new(x, y)),
            (false, _, _) => return Err(fail("expected both `x` and `y`, or `leave`".to_owned())),
        };
        steps.push(ScriptStep { wait: Duration::from_millis(raw.wait_ms), action });
    }
    Ok(steps)
}
