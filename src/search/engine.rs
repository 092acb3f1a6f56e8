//! Search orchestration: candidate fusion, scoring, literal line matches,
//! and result post-processing. Budget breaches degrade the response instead
//! of failing it.

use anyhow::Result;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::config::Config;
use crate::search::candidates::CandidateCollector;
use crate::search::query::{QueryIntent, SearchQuery};
use crate::search::scorer::{tokenize, Bm25Stats, HybridScorer, SignalInputs};
use crate::search::trigram::TrigramIndex;
use crate::store::IndexStore;
use crate::util::{mtime_ms, now_ms, to_abs_path};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreDetails {
    #[serde(rename = "type")]
    pub kind: String,
    pub content_score: f64,
    pub filename_multiplier: f64,
    pub depth_multiplier: f64,
    pub field_weight: f64,
    pub filename_match_type: String,
    pub signals: Vec<String>,
    pub breakdown: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSearchResult {
    pub file_path: String,
    pub line_number: usize,
    pub preview: String,
    pub score: f64,
    pub score_details: ScoreDetails,
    /// Further line matches in the same file when grouping is enabled.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secondary_matches: Vec<LineMatch>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineMatch {
    pub line_number: usize,
    pub preview: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<FileSearchResult>,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub intent: Option<QueryIntent>,
    pub patterns: Vec<String>,
    pub word_boundary: bool,
    pub file_types: Option<Vec<String>>,
    pub limit: Option<usize>,
}

pub struct SearchEngine {
    root: PathBuf,
    store: Rc<IndexStore>,
    config: Config,
}

impl SearchEngine {
    pub fn new(root: &Path, store: Rc<IndexStore>, config: Config) -> Self {
        Self {
            root: root.to_path_buf(),
            store,
            config,
        }
    }

    pub fn search(
        &self,
        trigrams: &TrigramIndex,
        raw: &str,
        opts: &SearchOptions,
    ) -> Result<SearchResponse> {
        let mut query = SearchQuery::parse(raw)
            .with_patterns(opts.patterns.clone())
            .with_word_boundary(opts.word_boundary)
            .with_file_types(opts.file_types.clone());
        if let Some(intent) = opts.intent {
            query = query.with_intent(intent);
        }

        let mut degraded = false;
        let mut degraded_reason = None;

        let collector =
            CandidateCollector::new(self.store.clone(), self.config.budgets.max_candidates);
        let (candidates, truncated) = collector.collect(&query, trigrams)?;
        if truncated {
            degraded = true;
            degraded_reason = Some("max_candidates".to_string());
        }

        // Read candidate contents within budget.
        let mut contents: Vec<(String, String)> = Vec::new();
        let mut bytes_read = 0usize;
        for rel in &candidates {
            if contents.len() >= self.config.budgets.max_files_read {
                degraded = true;
                degraded_reason.get_or_insert_with(|| "max_files_read".to_string());
                break;
            }
            let abs = to_abs_path(&self.root, rel);
            let Ok(content) = std::fs::read_to_string(&abs) else {
                continue;
            };
            bytes_read += content.len();
            contents.push((rel.clone(), content));
            if bytes_read >= self.config.budgets.max_bytes_read {
                degraded = true;
                degraded_reason.get_or_insert_with(|| "max_bytes_read".to_string());
                break;
            }
        }

        let terms: Vec<String> = query
            .keywords
            .iter()
            .map(|k| k.folded().to_lowercase())
            .collect();
        let mut stats = Bm25Stats::default();
        let tokenized: Vec<(String, String, Vec<String>)> = contents
            .into_iter()
            .map(|(rel, content)| {
                let tokens = tokenize(&content);
                stats.add_document(&tokens, &terms);
                (rel, content, tokens)
            })
            .collect();

        let scorer = HybridScorer::new(&query);
        let in_degrees = self.store.import_in_degrees()?;
        let now = now_ms();
        let line_regex = query.keyword_regex();

        let mut results: Vec<FileSearchResult> = Vec::new();
        for (rel, content, tokens) in &tokenized {
            let symbols = self.store.get_symbols(rel)?.unwrap_or_default();
            let abs = to_abs_path(&self.root, rel);
            let age_ms = mtime_ms(&abs).map(|m| now - m);
            let scored = scorer.score(
                &query,
                &stats,
                &SignalInputs {
                    rel_path: rel,
                    content,
                    tokens,
                    symbols: &symbols,
                    age_ms,
                    in_degree: in_degrees.get(rel).copied().unwrap_or(0),
                    has_test_sibling: has_test_sibling(&self.root, rel),
                },
            );
            if scored.score <= 0.0 {
                continue;
            }

            let mut matches: Vec<LineMatch> = Vec::new();
            if let Some(re) = &line_regex {
                for (i, line) in content.lines().enumerate() {
                    if matches.len() >= self.config.search.matches_per_file {
                        break;
                    }
                    if re.is_match(line) {
                        matches.push(LineMatch {
                            line_number: i + 1,
                            preview: truncate_preview(line, self.config.search.snippet_length),
                        });
                    }
                }
            }
            let (line_number, preview) = match matches.first() {
                Some(first) => (first.line_number, first.preview.clone()),
                None => (
                    1,
                    truncate_preview(
                        content.lines().next().unwrap_or_default(),
                        self.config.search.snippet_length,
                    ),
                ),
            };

            let dominant_weight = scored
                .breakdown
                .iter()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(_, v)| *v)
                .unwrap_or(0.0);

            results.push(FileSearchResult {
                file_path: rel.clone(),
                line_number,
                preview,
                score: scored.score,
                score_details: ScoreDetails {
                    kind: intent_name(query.intent).to_string(),
                    content_score: scored.content_score,
                    filename_multiplier: scored.filename_multiplier,
                    depth_multiplier: scored.depth_multiplier,
                    field_weight: dominant_weight,
                    filename_match_type: scored.filename_match_type.to_string(),
                    signals: scored.signals.iter().map(|s| s.to_string()).collect(),
                    breakdown: scored
                        .breakdown
                        .iter()
                        .map(|(k, v)| (k.to_string(), *v))
                        .collect(),
                },
                secondary_matches: if self.config.search.group_by_file {
                    matches.into_iter().skip(1).collect()
                } else {
                    Vec::new()
                },
            });
        }

        // Post-processing: whitelist, dedupe, order, limit.
        if let Some(types) = &query.file_types {
            results.retain(|r| {
                types
                    .iter()
                    .any(|t| r.file_path.ends_with(&format!(".{}", t.trim_start_matches('.'))))
            });
        }
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.file_path.cmp(&b.file_path))
        });
        // After sorting, so the strongest of any duplicate pair survives.
        let mut seen: HashSet<String> = HashSet::new();
        results.retain(|r| {
            let key = if r.preview.is_empty() {
                format!("{}:{}", r.file_path, r.line_number)
            } else {
                r.preview.clone()
            };
            seen.insert(key)
        });
        if let Some(limit) = opts.limit {
            results.truncate(limit);
        }

        Ok(SearchResponse {
            results,
            degraded,
            degraded_reason,
        })
    }
}

fn intent_name(intent: QueryIntent) -> &'static str {
    match intent {
        QueryIntent::Symbol => "symbol",
        QueryIntent::Content => "content",
        QueryIntent::Filename => "filename",
        QueryIntent::Mixed => "mixed",
    }
}

fn truncate_preview(line: &str, max_len: usize) -> String {
    let trimmed = line.trim();
    if trimmed.chars().count() <= max_len {
        return trimmed.to_string();
    }
    let truncated: String = trimmed.chars().take(max_len).collect();
    format!("{truncated}\u{2026}")
}

/// A sibling `name.test.*`, `name.spec.*`, or `__tests__/name.test.*`.
fn has_test_sibling(root: &Path, rel: &str) -> bool {
    let abs = to_abs_path(root, rel);
    let Some(dir) = abs.parent() else {
        return false;
    };
    let Some(stem) = abs.file_stem().and_then(|s| s.to_str()) else {
        return false;
    };
    for ext in ["ts", "tsx", "js", "jsx"] {
        for pattern in [
            dir.join(format!("{stem}.test.{ext}")),
            dir.join(format!("{stem}.spec.{ext}")),
            dir.join("__tests__").join(format!("{stem}.test.{ext}")),
        ] {
            if pattern.is_file() {
                return true;
            }
        }
    }
    false
}
