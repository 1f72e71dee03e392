//! Error kinds per spec.md §7.
//!
//! `EvaluatorReport` is deliberately absent here: a successful-or-exception
//! verdict from the evaluator is not a failure of the core, so it is
//! represented by [`crate::protocol::Verdict`], not by this enum.

use thiserror::Error;

/// A source position, used to pinpoint [`ReplError::Parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePos {
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for SourcePos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Error)]
pub enum ReplError {
    #[error("parse error in {locator}: {message} at {pos}")]
    Parse {
        locator: String,
        message: String,
        pos: SourcePos,
    },

    #[error("failed to read {locator}: {source}")]
    Read {
        locator: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to resolve {specifier} from {parent}: {reason}")]
    Resolve {
        specifier: String,
        parent: String,
        reason: String,
    },

    #[error("watch failure on {locator}: {reason}")]
    Watch { locator: String, reason: String },

    #[error("evaluator transport failure talking to {platform}: {reason}")]
    EvaluatorTransport { platform: String, reason: String },

    #[error("malformed command line: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReplError>;
