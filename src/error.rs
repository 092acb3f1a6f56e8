//! Typed error taxonomy for the engine core.
//!
//! Parser and per-file I/O failures are logged and degrade the file to empty
//! symbols; resolver failures become unresolved entries. Only the editor and
//! the persistence layer surface typed errors to callers, so that tooling can
//! match on kinds and render a concrete suggestion.

use thiserror::Error;

/// Machine-readable error codes carried on `EditResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EditErrorCode {
    NoMatch,
    AmbiguousMatch,
    HashMismatch,
    IndexRangeOutOfBounds,
    OverlapConflict,
    TargetTooLong,
    FuzzyBudgetExceeded,
    FileNotFound,
}

impl EditErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditErrorCode::NoMatch => "NO_MATCH",
            EditErrorCode::AmbiguousMatch => "AMBIGUOUS_MATCH",
            EditErrorCode::HashMismatch => "HASH_MISMATCH",
            EditErrorCode::IndexRangeOutOfBounds => "INDEX_RANGE_OUT_OF_BOUNDS",
            EditErrorCode::OverlapConflict => "OVERLAP_CONFLICT",
            EditErrorCode::TargetTooLong => "TARGET_TOO_LONG",
            EditErrorCode::FuzzyBudgetExceeded => "FUZZY_BUDGET_EXCEEDED",
            EditErrorCode::FileNotFound => "FILE_NOT_FOUND",
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no match found for target after {attempts} attempt(s)")]
    MatchNotFound { attempts: usize },

    #[error("ambiguous match: {count} candidates on lines {lines:?}")]
    AmbiguousMatch { count: usize, lines: Vec<usize> },

    #[error("content hash mismatch: expected {expected}, found {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("index range {start}..{end} out of bounds for content of length {len}")]
    IndexRangeOutOfBounds {
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("edits overlap at byte {offset}")]
    OverlapConflict { offset: usize },

    #[error("module resolution timed out for {specifier}")]
    ResolveTimeout { specifier: String },

    #[error("fuzzy matching budget exceeded ({ops} operations)")]
    FuzzyBudgetExceeded { ops: usize },

    #[error("target of {len} chars exceeds the levenshtein limit of {max}")]
    TargetTooLongForLevenshtein { len: usize, max: usize },

    #[error("file not found: {path}")]
    FileNotFound { path: String },

    #[error("parse failure in {path}: {reason}")]
    ParseFailure { path: String, reason: String },

    #[error("database failure: {0}")]
    DatabaseFailure(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Map an editor-facing failure onto its wire code, if it has one.
    pub fn edit_code(&self) -> Option<EditErrorCode> {
        match self {
            EngineError::MatchNotFound { .. } => Some(EditErrorCode::NoMatch),
            EngineError::AmbiguousMatch { .. } => Some(EditErrorCode::AmbiguousMatch),
            EngineError::HashMismatch { .. } => Some(EditErrorCode::HashMismatch),
            EngineError::IndexRangeOutOfBounds { .. } => {
                Some(EditErrorCode::IndexRangeOutOfBounds)
            }
            EngineError::OverlapConflict { .. } => Some(EditErrorCode::OverlapConflict),
            EngineError::TargetTooLongForLevenshtein { .. } => Some(EditErrorCode::TargetTooLong),
            EngineError::FuzzyBudgetExceeded { .. } => Some(EditErrorCode::FuzzyBudgetExceeded),
            EngineError::FileNotFound { .. } => Some(EditErrorCode::FileNotFound),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_codes_round_trip_to_wire_strings() {
        assert_eq!(EditErrorCode::NoMatch.as_str(), "NO_MATCH");
        assert_eq!(EditErrorCode::AmbiguousMatch.as_str(), "AMBIGUOUS_MATCH");
        assert_eq!(EditErrorCode::HashMismatch.as_str(), "HASH_MISMATCH");
    }

    #[test]
    fn engine_errors_map_to_codes() {
        let err = EngineError::AmbiguousMatch {
            count: 2,
            lines: vec![1, 2],
        };
        assert_eq!(err.edit_code(), Some(EditErrorCode::AmbiguousMatch));
        let err = EngineError::ParseFailure {
            path: "a.ts".into(),
            reason: "bad".into(),
        };
        assert_eq!(err.edit_code(), None);
    }
}
