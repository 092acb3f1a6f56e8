//! Edit request/response types and hash guards.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::EditErrorCode;

/// 1-based inclusive line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn contains(&self, line: usize) -> bool {
        line >= self.start && line <= self.end
    }
}

/// Closed-open byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRange {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FuzzyMode {
    Whitespace,
    Levenshtein,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertMode {
    Before,
    After,
    At,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Xxhash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedHash {
    pub algorithm: HashAlgorithm,
    pub value: String,
}

impl ExpectedHash {
    /// Hash the given content with this guard's algorithm.
    pub fn compute(&self, content: &str) -> String {
        hash_content(self.algorithm, content)
    }

    pub fn matches(&self, content: &str) -> bool {
        self.compute(content).eq_ignore_ascii_case(&self.value)
    }
}

pub fn hash_content(algorithm: HashAlgorithm, content: &str) -> String {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(content.as_bytes());
            format!("{:x}", hasher.finalize())
        }
        HashAlgorithm::Xxhash => {
            format!("{:016x}", xxhash_rust::xxh3::xxh3_64(content.as_bytes()))
        }
    }
}

/// One anchor-based edit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Edit {
    pub target_string: String,
    pub replacement_string: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_range: Option<LineRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_range: Option<IndexRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuzzy_mode: Option<FuzzyMode>,
    /// Highest normalization level the matcher may climb to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalization: Option<crate::editor::normalize::NormalizationLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_hash: Option<ExpectedHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_mode: Option<InsertMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor_search_range: Option<LineRange>,
}

impl Edit {
    pub fn replace(target: &str, replacement: &str) -> Self {
        Self {
            target_string: target.to_string(),
            replacement_string: replacement.to_string(),
            ..Default::default()
        }
    }
}

/// A batch of applied edits plus their inverses. Inverse edits are always
/// index-range based over post-edit offsets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditOperation {
    pub id: String,
    pub timestamp_ms: i64,
    pub description: String,
    pub file_path: String,
    pub edits: Vec<Edit>,
    pub inverse_edits: Vec<Edit>,
}

/// Concrete next action recommended to the caller on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSuggestion {
    pub action: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_range: Option<LineRange>,
}

/// One line of a structured diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredDiffLine {
    pub op: DiffOp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_line: Option<usize>,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffOp {
    Equal,
    Add,
    Remove,
}

/// Result surfaced for every edit request; failures are never silenced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_diff: Option<Vec<StructuredDiffLine>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_lines: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_lines: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<EditErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<ToolSuggestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<EditOperation>,
    /// Extra failure detail (conflicting lines, attempt log).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl EditResult {
    pub fn failure(code: EditErrorCode, message: String, suggestion: ToolSuggestion) -> Self {
        Self {
            success: false,
            message: Some(message),
            diff: None,
            structured_diff: None,
            added_lines: None,
            removed_lines: None,
            original_content: None,
            new_content: None,
            error_code: Some(code),
            suggestion: Some(suggestion),
            operation: None,
            details: None,
        }
    }
}
