//! Stdio command/result framing (spec.md §6).
//!
//! One JSON object per line in each direction. Parsing a [`Command`] line
//! and serializing a [`CommandResult`] line are the only pieces of the
//! framing this crate owns - the surrounding stdio loop, buffering, and
//! process lifecycle belong to `main`.

use serde::{Deserialize, Serialize};

fn default_scope() -> String {
    String::new()
}

/// One incoming line on stdin.
#[derive(Debug, Clone, Deserialize)]
pub struct Command {
    pub source: String,
    pub locator: Option<String>,
    pub platform: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
}

/// The verdict an evaluator hands back for one command (spec.md §7).
#[derive(Debug, Clone)]
pub enum Verdict {
    Evaluation(String),
    Exception(String),
}

/// One outgoing line on stdout. Exactly one of `evaluation`/`exception`/
/// `out`/`err` is ever populated per spec.md §6.
#[derive(Debug, Clone, Serialize, Default)]
pub struct CommandResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
}

impl CommandResult {
    pub fn from_verdict(verdict: Verdict, id: Option<serde_json::Value>) -> Self {
        match verdict {
            Verdict::Evaluation(rendering) => CommandResult {
                evaluation: Some(rendering),
                id,
                ..Default::default()
            },
            Verdict::Exception(rendering) => CommandResult {
                exception: Some(rendering),
                id,
                ..Default::default()
            },
        }
    }

    pub fn err(message: impl Into<String>, id: Option<serde_json::Value>) -> Self {
        CommandResult {
            err: Some(message.into()),
            id,
            ..Default::default()
        }
    }

    pub fn out(message: impl Into<String>, id: Option<serde_json::Value>) -> Self {
        CommandResult {
            out: Some(message.into()),
            id,
            ..Default::default()
        }
    }

    /// Render as one NDJSON line, newline included.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Parse one stdin line into a [`Command`]. Blank lines are not valid input
/// (the caller should skip them before calling this).
pub fn parse_command(line: &str) -> Result<Command, crate::error::ReplError> {
    Ok(serde_json::from_str(line)?)
}
