//! Engine configuration and resource budgets.
//!
//! All budgets are adjustable; the search engine marks results degraded when
//! one triggers early termination. Loaded from `<root>/.mcp/config.json` when
//! present, otherwise defaults apply. Environment and CLI overrides happen at
//! the boundary; nothing in the core reads globals.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Directories never scanned or indexed, regardless of user patterns.
pub const BAKED_IGNORES: &[&str] = &[
    ".git",
    "node_modules",
    ".mcp",
    "dist",
    "coverage",
    ".DS_Store",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub search: SearchConfig,
    pub editor: EditorConfig,
    pub budgets: Budgets,
    /// Extra gitignore-style patterns excluded from scanning.
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchConfig {
    /// Literal line matches reported per file.
    pub matches_per_file: usize,
    /// Preview truncation length in characters.
    pub snippet_length: usize,
    /// Group secondary matches under the best match of the same file.
    pub group_by_file: bool,
    /// Largest file fed to the trigram indexer.
    pub max_file_bytes: usize,
    /// Trigram cap per file; files beyond it keep a truncated term set.
    pub max_terms_per_file: usize,
    /// Posting lists longer than this are dropped as non-selective.
    pub max_doc_freq: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorConfig {
    /// Tab width used by the indentation normalization level.
    pub tab_width: usize,
    /// Targets at or above this length are refused by the levenshtein path.
    pub levenshtein_max_target: usize,
    /// Backups retained per path; oldest deleted beyond this.
    pub backup_retention: usize,
    /// Files at or above this size require hash confirmation before deletion.
    pub destructive_size_threshold: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Budgets {
    pub max_candidates: usize,
    pub max_files_read: usize,
    pub max_bytes_read: usize,
    pub max_parse_time_ms: u64,
    pub max_diff_bytes: usize,
    pub max_match_attempts: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            editor: EditorConfig::default(),
            budgets: Budgets::default(),
            ignore_patterns: Vec::new(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            matches_per_file: 5,
            snippet_length: 160,
            group_by_file: true,
            max_file_bytes: 1024 * 1024,
            max_terms_per_file: 20_000,
            max_doc_freq: 5_000,
        }
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            tab_width: 4,
            levenshtein_max_target: 256,
            backup_retention: 10,
            destructive_size_threshold: 10 * 1024,
        }
    }
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            max_candidates: 200,
            max_files_read: 500,
            max_bytes_read: 16 * 1024 * 1024,
            max_parse_time_ms: 10_000,
            max_diff_bytes: 4 * 1024 * 1024,
            max_match_attempts: 100_000,
        }
    }
}

impl Config {
    /// Load `<root>/.mcp/config.json`, falling back to defaults when absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(".mcp").join("config.json");
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config at {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn defaults_when_missing() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.editor.levenshtein_max_target, 256);
        assert_eq!(config.budgets.max_candidates, 200);
    }

    #[test]
    fn loads_partial_overrides() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".mcp")).unwrap();
        fs::write(
            dir.path().join(".mcp/config.json"),
            r#"{"search": {"matchesPerFile": 9}}"#,
        )
        .unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.search.matches_per_file, 9);
        assert_eq!(config.search.snippet_length, 160);
    }
}
