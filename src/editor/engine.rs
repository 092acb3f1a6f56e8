//! Batch edit application.
//!
//! Edits resolve to absolute byte ranges, are checked for overlap, and are
//! spliced into a single rewrite. Each application records an invertible
//! operation whose inverse edits are index ranges over the post-edit
//! content. Failures always come back as structured results.

use anyhow::{bail, Context, Result};
use log::{debug, info};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::{Budgets, EditorConfig};
use crate::editor::backup::{destructive_allowed, BackupStore};
use crate::editor::diff::{self, DiffAlgorithm};
use crate::editor::edit::{
    Edit, EditOperation, EditResult, IndexRange, InsertMode, LineRange, ToolSuggestion,
};
use crate::editor::matcher::{self, MatchFailure};
use crate::error::{EditErrorCode, EngineError};
use crate::util::{now_ms, to_abs_path, to_rel_path};

/// Journal length cap under `.mcp/operations.json`.
const JOURNAL_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiffMode {
    #[default]
    Default,
    /// Patience diff; groups moved blocks more readably.
    Semantic,
}

impl DiffMode {
    fn algorithm(self) -> DiffAlgorithm {
        match self {
            DiffMode::Default => DiffAlgorithm::Myers,
            DiffMode::Semantic => DiffAlgorithm::Patience,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    pub dry_run: bool,
    pub description: String,
    pub diff_mode: DiffMode,
}

type InvalidateHook = Box<dyn Fn(&Path)>;

pub struct EditorEngine {
    root: PathBuf,
    config: EditorConfig,
    budgets: Budgets,
    backups: BackupStore,
    /// File-granular exclusive locks held during application.
    locks: RefCell<HashSet<String>>,
    on_write: Option<InvalidateHook>,
}

impl EditorEngine {
    pub fn new(root: &Path, config: EditorConfig, budgets: Budgets) -> Self {
        let backups = BackupStore::new(root, config.backup_retention);
        Self {
            root: root.to_path_buf(),
            config,
            budgets,
            backups,
            locks: RefCell::new(HashSet::new()),
            on_write: None,
        }
    }

    /// Install an invalidation hook called after each successful write.
    pub fn with_invalidation<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Path) + 'static,
    {
        self.on_write = Some(Box::new(hook));
        self
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    /// Apply a batch of edits to one file, atomically.
    pub fn apply_edits(&self, path: &Path, edits: &[Edit], opts: &ApplyOptions) -> Result<EditResult> {
        let rel = to_rel_path(&self.root, path);
        let abs = to_abs_path(&self.root, &rel);
        let _lock = self.lock(&rel)?;

        let original = match fs::read_to_string(&abs) {
            Ok(content) => content,
            Err(_) => {
                return Ok(EditResult::failure(
                    EditErrorCode::FileNotFound,
                    format!("cannot read {rel}"),
                    ToolSuggestion {
                        action: "check_path".to_string(),
                        detail: "verify the file exists relative to the repository root"
                            .to_string(),
                        line_range: None,
                    },
                ));
            }
        };

        match self.apply_to_content(&rel, &original, edits, opts)? {
            ApplyOutcome::Failed(result) => Ok(result),
            ApplyOutcome::Applied {
                new_content,
                operation,
                mut result,
            } => {
                if !opts.dry_run {
                    self.backups.backup(&rel, &original)?;
                    fs::write(&abs, &new_content)
                        .with_context(|| format!("failed to write {rel}"))?;
                    self.journal_push(&operation)?;
                    if let Some(hook) = &self.on_write {
                        hook(&abs);
                    }
                    info!("applied {} edit(s) to {rel}", edits.len());
                }
                result.operation = Some(operation);
                Ok(result)
            }
        }
    }

    /// Undo the most recent journaled operation, or a specific one by id.
    pub fn undo(&self, operation_id: Option<&str>) -> Result<EditResult> {
        let mut journal = self.journal_load()?;
        let index = match operation_id {
            Some(id) => journal.iter().position(|op| op.id == id),
            None => journal.len().checked_sub(1),
        };
        let Some(index) = index else {
            return Ok(EditResult::failure(
                EditErrorCode::NoMatch,
                "no recorded operation to undo".to_string(),
                ToolSuggestion {
                    action: "list_operations".to_string(),
                    detail: "the operation journal is empty or the id is unknown".to_string(),
                    line_range: None,
                },
            ));
        };
        let operation = journal[index].clone();
        let abs = to_abs_path(&self.root, &operation.file_path);
        let _lock = self.lock(&operation.file_path)?;

        let current = match fs::read_to_string(&abs) {
            Ok(content) => content,
            Err(_) => {
                return Ok(EditResult::failure(
                    EditErrorCode::FileNotFound,
                    format!("cannot read {}", operation.file_path),
                    ToolSuggestion {
                        action: "check_path".to_string(),
                        detail: "the edited file no longer exists".to_string(),
                        line_range: None,
                    },
                ));
            }
        };

        let opts = ApplyOptions {
            dry_run: false,
            description: format!("undo {}", operation.id),
            diff_mode: DiffMode::Default,
        };
        match self.apply_to_content(&operation.file_path, &current, &operation.inverse_edits, &opts)? {
            ApplyOutcome::Failed(result) => Ok(result),
            ApplyOutcome::Applied {
                new_content,
                operation: inverse_op,
                mut result,
            } => {
                self.backups.backup(&operation.file_path, &current)?;
                fs::write(&abs, &new_content)
                    .with_context(|| format!("failed to write {}", operation.file_path))?;
                journal.remove(index);
                self.journal_save(&journal)?;
                if let Some(hook) = &self.on_write {
                    hook(&abs);
                }
                info!("undid operation {} on {}", operation.id, operation.file_path);
                result.operation = Some(inverse_op);
                Ok(result)
            }
        }
    }

    /// Delete a file, honoring the destructive-operation gate.
    pub fn delete_file(
        &self,
        path: &Path,
        confirmation_hash: Option<&str>,
        strict: bool,
    ) -> Result<EditResult> {
        let rel = to_rel_path(&self.root, path);
        let abs = to_abs_path(&self.root, &rel);
        let _lock = self.lock(&rel)?;

        let content = match fs::read_to_string(&abs) {
            Ok(content) => content,
            Err(_) => {
                return Ok(EditResult::failure(
                    EditErrorCode::FileNotFound,
                    format!("cannot read {rel}"),
                    ToolSuggestion {
                        action: "check_path".to_string(),
                        detail: "nothing to delete".to_string(),
                        line_range: None,
                    },
                ));
            }
        };

        if !destructive_allowed(
            &content,
            self.config.destructive_size_threshold,
            confirmation_hash,
            strict,
        ) {
            return Ok(EditResult::failure(
                EditErrorCode::HashMismatch,
                format!(
                    "refusing to delete {rel}: confirmation hash missing or stale"
                ),
                ToolSuggestion {
                    action: "reread_file".to_string(),
                    detail: "re-read the file and pass a confirmation hash of its current content"
                        .to_string(),
                    line_range: None,
                },
            ));
        }

        self.backups.backup(&rel, &content)?;
        fs::remove_file(&abs).with_context(|| format!("failed to delete {rel}"))?;
        if let Some(hook) = &self.on_write {
            hook(&abs);
        }
        info!("deleted {rel}");
        Ok(EditResult {
            success: true,
            message: Some(format!("deleted {rel}")),
            diff: None,
            structured_diff: None,
            added_lines: None,
            removed_lines: None,
            original_content: Some(content),
            new_content: None,
            error_code: None,
            suggestion: None,
            operation: None,
            details: None,
        })
    }

    // ==================== Core application ====================

    fn apply_to_content(
        &self,
        rel: &str,
        original: &str,
        edits: &[Edit],
        opts: &ApplyOptions,
    ) -> Result<ApplyOutcome> {
        if edits.is_empty() {
            bail!("no edits given");
        }

        // Resolve every edit before touching anything.
        let mut resolved: Vec<(usize, usize, String, String)> = Vec::new();
        for edit in edits {
            let found = match matcher::resolve(
                original,
                edit,
                &self.config,
                self.budgets.max_match_attempts,
            ) {
                Ok(found) => found,
                Err(failure) => return Ok(ApplyOutcome::Failed(failure_result(failure))),
            };
            let (start, end, removed) = match edit.insert_mode {
                Some(InsertMode::Before) => (found.start, found.start, String::new()),
                Some(InsertMode::After) => (found.end, found.end, String::new()),
                Some(InsertMode::At) | None => (
                    found.start,
                    found.end,
                    original[found.start..found.end].to_string(),
                ),
            };
            resolved.push((start, end, removed, edit.replacement_string.clone()));
        }

        resolved.sort_by_key(|(start, end, _, _)| (*start, *end));
        for pair in resolved.windows(2) {
            if pair[1].0 < pair[0].1 {
                return Ok(ApplyOutcome::Failed(failure_result(MatchFailure::Engine(
                    EngineError::OverlapConflict { offset: pair[1].0 },
                ))));
            }
        }

        // Splice and record inverses over post-edit offsets.
        let mut new_content = String::with_capacity(original.len());
        let mut inverse_edits = Vec::with_capacity(resolved.len());
        let mut cursor = 0usize;
        let mut delta = 0isize;
        for (start, end, removed, replacement) in &resolved {
            new_content.push_str(&original[cursor..*start]);
            new_content.push_str(replacement);
            cursor = *end;

            let new_start = (*start as isize + delta) as usize;
            inverse_edits.push(Edit {
                target_string: replacement.clone(),
                replacement_string: removed.clone(),
                index_range: Some(IndexRange {
                    start: new_start,
                    end: new_start + replacement.len(),
                }),
                ..Default::default()
            });
            delta += replacement.len() as isize - (*end - *start) as isize;
        }
        new_content.push_str(&original[cursor..]);

        let operation = EditOperation {
            id: Uuid::new_v4().to_string(),
            timestamp_ms: now_ms(),
            description: opts.description.clone(),
            file_path: rel.to_string(),
            edits: edits.to_vec(),
            inverse_edits,
        };

        // Diffs stay within budget; oversized rewrites skip them.
        let (diff_text, structured, added, removed_count) =
            if original.len() + new_content.len() <= self.budgets.max_diff_bytes {
                let structured = diff::diff_lines(original, &new_content, opts.diff_mode.algorithm());
                let (added, removed) = diff::counts(&structured);
                (
                    Some(diff::render(&structured)),
                    Some(structured),
                    Some(added),
                    Some(removed),
                )
            } else {
                debug!("diff skipped for {rel}: beyond max_diff_bytes");
                (None, None, None, None)
            };

        let result = EditResult {
            success: true,
            message: None,
            diff: diff_text,
            structured_diff: structured,
            added_lines: added,
            removed_lines: removed_count,
            original_content: Some(original.to_string()),
            new_content: Some(new_content.clone()),
            error_code: None,
            suggestion: None,
            operation: None,
            details: None,
        };
        Ok(ApplyOutcome::Applied {
            new_content,
            operation,
            result,
        })
    }

    // ==================== Locking ====================

    fn lock(&self, rel: &str) -> Result<LockGuard<'_>> {
        let mut locks = self.locks.borrow_mut();
        if !locks.insert(rel.to_string()) {
            bail!("{rel} is locked by another edit in progress");
        }
        Ok(LockGuard {
            locks: &self.locks,
            rel: rel.to_string(),
        })
    }

    // ==================== Operation journal ====================

    fn journal_path(&self) -> PathBuf {
        self.root.join(".mcp").join("operations.json")
    }

    fn journal_load(&self) -> Result<Vec<EditOperation>> {
        let path = self.journal_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw).unwrap_or_default())
    }

    fn journal_save(&self, journal: &[EditOperation]) -> Result<()> {
        let path = self.journal_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(journal)?)?;
        Ok(())
    }

    fn journal_push(&self, operation: &EditOperation) -> Result<()> {
        let mut journal = self.journal_load()?;
        journal.push(operation.clone());
        if journal.len() > JOURNAL_LIMIT {
            let excess = journal.len() - JOURNAL_LIMIT;
            journal.drain(..excess);
        }
        self.journal_save(&journal)
    }
}

enum ApplyOutcome {
    Applied {
        new_content: String,
        operation: EditOperation,
        result: EditResult,
    },
    Failed(EditResult),
}

struct LockGuard<'a> {
    locks: &'a RefCell<HashSet<String>>,
    rel: String,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.locks.borrow_mut().remove(&self.rel);
    }
}

/// Map a match failure onto the structured result the caller sees.
fn failure_result(failure: MatchFailure) -> EditResult {
    match failure {
        MatchFailure::NotFound { attempts, guesses } => {
            let line_range = guesses.first().map(|g| LineRange {
                start: g.line.saturating_sub(3).max(1),
                end: g.line + 3,
            });
            let mut result = EditResult::failure(
                EditErrorCode::NoMatch,
                "no candidates survived normalization or filters".to_string(),
                ToolSuggestion {
                    action: "read_fragment".to_string(),
                    detail: "read the file around the suggested lines, loosen the normalization \
                             level, or switch fuzzy mode"
                        .to_string(),
                    line_range,
                },
            );
            result.details = Some(serde_json::json!({
                "attempts": attempts,
                "guesses": guesses,
            }));
            result
        }
        MatchFailure::Ambiguous {
            conflicting_lines,
            strongest_line,
            snippets,
        } => {
            let mut result = EditResult::failure(
                EditErrorCode::AmbiguousMatch,
                format!(
                    "{} candidate matches; narrow with lineRange or context",
                    conflicting_lines.len()
                ),
                ToolSuggestion {
                    action: "add_line_range".to_string(),
                    detail: format!(
                        "pass lineRange {{\"start\":{strongest_line},\"end\":{strongest_line}}} \
                         to pick the strongest candidate"
                    ),
                    line_range: Some(LineRange {
                        start: strongest_line,
                        end: strongest_line,
                    }),
                },
            );
            result.details = Some(serde_json::json!({
                "conflictingLines": conflicting_lines,
                "snippets": snippets,
            }));
            result
        }
        MatchFailure::Engine(err) => {
            let code = err.edit_code().unwrap_or(EditErrorCode::NoMatch);
            let suggestion = match code {
                EditErrorCode::HashMismatch => ToolSuggestion {
                    action: "reread_file".to_string(),
                    detail: "content drifted since it was last read; re-read before editing"
                        .to_string(),
                    line_range: None,
                },
                EditErrorCode::TargetTooLong => ToolSuggestion {
                    action: "shorten_target".to_string(),
                    detail: "split the edit or use a normalization level instead of levenshtein"
                        .to_string(),
                    line_range: None,
                },
                EditErrorCode::FuzzyBudgetExceeded => ToolSuggestion {
                    action: "narrow_search".to_string(),
                    detail: "restrict the edit with lineRange or anchorSearchRange".to_string(),
                    line_range: None,
                },
                _ => ToolSuggestion {
                    action: "reread_file".to_string(),
                    detail: "re-check the edit against current file content".to_string(),
                    line_range: None,
                },
            };
            EditResult::failure(code, err.to_string(), suggestion)
        }
    }
}
