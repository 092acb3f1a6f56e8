//! Anchor resolution for a single edit.
//!
//! The pipeline: an explicit index range short-circuits everything; a fuzzy
//! mode takes its dedicated path; otherwise the normalization ladder climbs
//! until a level yields candidates. Survivors then pass the line-range and
//! context filters. Zero survivors produce a diagnostic with per-level
//! attempt counts and best-guess lines; more than one is ambiguity.

use serde::Serialize;

use crate::config::EditorConfig;
use crate::editor::edit::{Edit, FuzzyMode};
use crate::editor::fuzzy;
use crate::editor::normalize::{self, NormalizationLevel};
use crate::error::EngineError;
use crate::lines::LineCounter;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchKind {
    IndexRange,
    Exact,
    Normalized(NormalizationLevel),
    WhitespaceFuzzy,
    Levenshtein { distance: usize, max_distance: usize },
}

impl MatchKind {
    fn base_confidence(&self) -> f64 {
        match self {
            MatchKind::IndexRange | MatchKind::Exact => 1.0,
            MatchKind::Normalized(level) => level.confidence(),
            MatchKind::WhitespaceFuzzy => 0.8,
            MatchKind::Levenshtein {
                distance,
                max_distance,
            } => {
                let dmax = (*max_distance).max(1) as f64;
                0.5 + 0.5 * (1.0 - *distance as f64 / dmax).max(0.0)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct FoundMatch {
    pub start: usize,
    pub end: usize,
    /// 1-based line of the match start.
    pub line: usize,
    pub kind: MatchKind,
    pub confidence: f64,
}

/// One rung of the ladder that was tried, with its candidate count.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptInfo {
    pub level: String,
    pub candidates: usize,
}

/// A best-guess line offered when nothing matched.
#[derive(Debug, Clone, Serialize)]
pub struct Guess {
    pub line: usize,
    pub text: String,
    pub confidence: f64,
}

#[derive(Debug)]
pub enum MatchFailure {
    NotFound {
        attempts: Vec<AttemptInfo>,
        guesses: Vec<Guess>,
    },
    Ambiguous {
        conflicting_lines: Vec<usize>,
        strongest_line: usize,
        snippets: Vec<Guess>,
    },
    Engine(EngineError),
}

/// Resolve one edit against current content.
pub fn resolve(
    content: &str,
    edit: &Edit,
    config: &EditorConfig,
    max_ops: usize,
) -> Result<FoundMatch, MatchFailure> {
    let lines = LineCounter::new(content);

    // Hash guard applies before any matching.
    if let Some(guard) = &edit.expected_hash {
        if !guard.matches(content) {
            return Err(MatchFailure::Engine(EngineError::HashMismatch {
                expected: guard.value.clone(),
                actual: guard.compute(content),
            }));
        }
    }

    // 1. Explicit index range.
    if let Some(range) = &edit.index_range {
        if range.start > range.end
            || range.end > content.len()
            || !content.is_char_boundary(range.start)
            || !content.is_char_boundary(range.end)
        {
            return Err(MatchFailure::Engine(EngineError::IndexRangeOutOfBounds {
                start: range.start,
                end: range.end,
                len: content.len(),
            }));
        }
        let slice = &content[range.start..range.end];
        if slice != edit.target_string {
            return Err(MatchFailure::Engine(EngineError::HashMismatch {
                expected: preview(&edit.target_string),
                actual: preview(slice),
            }));
        }
        let kind = MatchKind::IndexRange;
        return Ok(FoundMatch {
            start: range.start,
            end: range.end,
            line: lines.line_for_offset(range.start),
            kind,
            confidence: confidence_with_boosts(kind.base_confidence(), edit),
        });
    }

    let mut attempts: Vec<AttemptInfo> = Vec::new();
    let mut candidates: Vec<(usize, usize, MatchKind)> = Vec::new();

    match edit.fuzzy_mode {
        // 2. Levenshtein: exact regex first, window sliding second.
        Some(FuzzyMode::Levenshtein) => {
            let exact = find_literal(content, &edit.target_string);
            attempts.push(AttemptInfo {
                level: "exact".to_string(),
                candidates: exact.len(),
            });
            if exact.is_empty() {
                let windows =
                    fuzzy::levenshtein_candidates(content, &edit.target_string, config, max_ops)
                        .map_err(MatchFailure::Engine)?;
                attempts.push(AttemptInfo {
                    level: "levenshtein".to_string(),
                    candidates: windows.len(),
                });
                candidates.extend(windows.into_iter().map(|m| {
                    (
                        m.start,
                        m.end,
                        MatchKind::Levenshtein {
                            distance: m.distance,
                            max_distance: m.max_distance,
                        },
                    )
                }));
            } else {
                candidates
                    .extend(exact.into_iter().map(|(s, e)| (s, e, MatchKind::Exact)));
            }
        }
        // 3. Whitespace-flexible regex.
        Some(FuzzyMode::Whitespace) => {
            if let Some(re) = fuzzy::whitespace_regex(&edit.target_string) {
                let found: Vec<(usize, usize)> =
                    re.find_iter(content).map(|m| (m.start(), m.end())).collect();
                attempts.push(AttemptInfo {
                    level: "whitespace-fuzzy".to_string(),
                    candidates: found.len(),
                });
                candidates.extend(
                    found
                        .into_iter()
                        .map(|(s, e)| (s, e, MatchKind::WhitespaceFuzzy)),
                );
            }
        }
        // 4. Normalization ladder up to the declared level.
        None => {
            let max_level = edit.normalization.unwrap_or(NormalizationLevel::Exact);
            for level in max_level.ladder_through() {
                let Some(re) = normalize::regex_for(&edit.target_string, *level, config.tab_width)
                else {
                    continue;
                };
                let found: Vec<(usize, usize)> =
                    re.find_iter(content).map(|m| (m.start(), m.end())).collect();
                attempts.push(AttemptInfo {
                    level: level.as_str().to_string(),
                    candidates: found.len(),
                });
                if !found.is_empty() {
                    let kind = if *level == NormalizationLevel::Exact {
                        MatchKind::Exact
                    } else {
                        MatchKind::Normalized(*level)
                    };
                    candidates.extend(found.into_iter().map(|(s, e)| (s, e, kind)));
                    break;
                }
            }
        }
    }

    // Positional and context filters.
    let survivors: Vec<(usize, usize, MatchKind)> = candidates
        .into_iter()
        .filter(|(start, _, _)| {
            let line = lines.line_for_offset(*start);
            edit.anchor_search_range
                .map(|r| r.contains(line))
                .unwrap_or(true)
                && edit.line_range.map(|r| r.contains(line)).unwrap_or(true)
        })
        .filter(|(start, end, _)| context_ok(content, *start, *end, edit))
        .collect();

    match survivors.len() {
        0 => Err(MatchFailure::NotFound {
            attempts,
            guesses: best_guess_lines(content, &edit.target_string, 3),
        }),
        1 => {
            let (start, end, kind) = survivors[0];
            Ok(FoundMatch {
                start,
                end,
                line: lines.line_for_offset(start),
                kind,
                confidence: confidence_with_boosts(kind.base_confidence(), edit),
            })
        }
        _ => {
            let scored: Vec<(usize, f64, String)> = survivors
                .iter()
                .map(|(start, end, kind)| {
                    let line = lines.line_for_offset(*start);
                    let text = line_text(content, &lines, line);
                    (
                        line,
                        confidence_with_boosts(kind.base_confidence(), edit),
                        text,
                    )
                })
                .collect();
            let mut conflicting_lines: Vec<usize> = scored.iter().map(|(l, _, _)| *l).collect();
            conflicting_lines.sort_unstable();
            conflicting_lines.dedup();
            // First occurrence wins ties.
            let strongest_line = scored
                .iter()
                .fold(None::<(usize, f64)>, |best, (line, conf, _)| match best {
                    Some((_, best_conf)) if *conf <= best_conf => best,
                    _ => Some((*line, *conf)),
                })
                .map(|(l, _)| l)
                .unwrap_or(conflicting_lines[0]);
            let snippets = scored
                .into_iter()
                .take(5)
                .map(|(line, confidence, text)| Guess {
                    line,
                    text,
                    confidence,
                })
                .collect();
            Err(MatchFailure::Ambiguous {
                conflicting_lines,
                strongest_line,
                snippets,
            })
        }
    }
}

fn find_literal(content: &str, target: &str) -> Vec<(usize, usize)> {
    if target.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut from = 0;
    while let Some(pos) = content[from..].find(target) {
        let start = from + pos;
        out.push((start, start + target.len()));
        from = start + target.len();
    }
    out
}

/// Context comparison follows the fuzzy mode: exact containment normally,
/// whitespace-collapsed containment for either fuzzy path.
fn context_ok(content: &str, start: usize, end: usize, edit: &Edit) -> bool {
    let window = 240usize;
    if let Some(before) = &edit.before_context {
        let from = start.saturating_sub(window);
        let from = (from..=start).find(|i| content.is_char_boundary(*i)).unwrap_or(start);
        if !context_contains(&content[from..start], before, edit.fuzzy_mode) {
            return false;
        }
    }
    if let Some(after) = &edit.after_context {
        let to = (end + window).min(content.len());
        let to = (end..=to)
            .rev()
            .find(|i| content.is_char_boundary(*i))
            .unwrap_or(end);
        if !context_contains(&content[end..to], after, edit.fuzzy_mode) {
            return false;
        }
    }
    true
}

fn context_contains(haystack: &str, needle: &str, mode: Option<FuzzyMode>) -> bool {
    match mode {
        None => haystack.contains(needle),
        Some(_) => collapse_ws(haystack).contains(&collapse_ws(needle)),
    }
}

fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn confidence_with_boosts(base: f64, edit: &Edit) -> f64 {
    let mut confidence = base;
    if edit.before_context.is_some() {
        confidence += 0.1;
    }
    if edit.after_context.is_some() {
        confidence += 0.1;
    }
    if edit.line_range.is_some() {
        confidence += 0.1;
    }
    if edit.index_range.is_some() {
        confidence += 0.15;
    }
    confidence.min(1.0)
}

fn line_text(content: &str, lines: &LineCounter, line: usize) -> String {
    lines
        .line_span(line)
        .map(|(s, e)| content[s..e].trim().to_string())
        .unwrap_or_default()
}

/// Lines most similar to the target, for NO_MATCH diagnostics.
fn best_guess_lines(content: &str, target: &str, count: usize) -> Vec<Guess> {
    let target_trigrams = fuzzy::trigram_set(target);
    let mut scored: Vec<Guess> = content
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let score = fuzzy::jaccard(&target_trigrams, &fuzzy::trigram_set(line));
            if score > 0.0 {
                Some(Guess {
                    line: i + 1,
                    text: line.trim().to_string(),
                    confidence: score * 0.6,
                })
            } else {
                None
            }
        })
        .collect();
    scored.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(count);
    scored
}

fn preview(text: &str) -> String {
    const MAX: usize = 80;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX).collect();
        format!("{cut}\u{2026}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::edit::{ExpectedHash, HashAlgorithm, IndexRange, LineRange};

    fn config() -> EditorConfig {
        EditorConfig::default()
    }

    fn resolve_edit(content: &str, edit: &Edit) -> Result<FoundMatch, MatchFailure> {
        resolve(content, edit, &config(), 100_000)
    }

    #[test]
    fn exact_single_match_resolves() {
        let m = resolve_edit("let x = 1;\n", &Edit::replace("x = 1", "x = 2")).unwrap();
        assert_eq!((m.start, m.end), (4, 9));
        assert_eq!(m.kind, MatchKind::Exact);
        assert_eq!(m.confidence, 1.0);
        assert_eq!(m.line, 1);
    }

    #[test]
    fn index_range_validates_bounds_and_content() {
        let content = "abcdef";
        let edit = Edit {
            index_range: Some(IndexRange { start: 2, end: 4 }),
            ..Edit::replace("cd", "CD")
        };
        let m = resolve_edit(content, &edit).unwrap();
        assert_eq!((m.start, m.end), (2, 4));
        assert_eq!(m.kind, MatchKind::IndexRange);

        let bad_bounds = Edit {
            index_range: Some(IndexRange { start: 2, end: 99 }),
            ..Edit::replace("cd", "CD")
        };
        assert!(matches!(
            resolve_edit(content, &bad_bounds),
            Err(MatchFailure::Engine(EngineError::IndexRangeOutOfBounds { .. }))
        ));

        let drifted = Edit {
            index_range: Some(IndexRange { start: 2, end: 4 }),
            ..Edit::replace("zz", "CD")
        };
        assert!(matches!(
            resolve_edit(content, &drifted),
            Err(MatchFailure::Engine(EngineError::HashMismatch { .. }))
        ));
    }

    #[test]
    fn hash_guard_rejects_drifted_file() {
        let edit = Edit {
            expected_hash: Some(ExpectedHash {
                algorithm: HashAlgorithm::Sha256,
                value: "0".repeat(64),
            }),
            ..Edit::replace("a", "b")
        };
        assert!(matches!(
            resolve_edit("a\n", &edit),
            Err(MatchFailure::Engine(EngineError::HashMismatch { .. }))
        ));
    }

    #[test]
    fn ladder_stops_at_first_yielding_level() {
        let content = "function  f( x , y )\n";
        let edit = Edit {
            normalization: Some(NormalizationLevel::Whitespace),
            ..Edit::replace("function f(x, y)", "function f(a, b)")
        };
        let m = resolve_edit(content, &edit).unwrap();
        assert_eq!(m.kind, MatchKind::Normalized(NormalizationLevel::Whitespace));
        assert!((m.confidence - 0.82).abs() < 1e-9);
    }

    #[test]
    fn ladder_never_climbs_past_declared_max() {
        let content = "function  f( x , y )\n";
        // Only exact allowed: the whitespace drift must not match.
        let err = resolve_edit(content, &Edit::replace("function f(x, y)", "g")).unwrap_err();
        let MatchFailure::NotFound { attempts, guesses } = err else {
            panic!("expected NotFound");
        };
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].level, "exact");
        assert_eq!(attempts[0].candidates, 0);
        assert!(!guesses.is_empty());
        assert_eq!(guesses[0].line, 1);
    }

    #[test]
    fn ambiguity_reports_conflicting_lines() {
        let content = "x=1;\nx=1;\n";
        let err = resolve_edit(content, &Edit::replace("x=1;", "x=2;")).unwrap_err();
        let MatchFailure::Ambiguous {
            conflicting_lines,
            strongest_line,
            snippets,
        } = err
        else {
            panic!("expected Ambiguous");
        };
        assert_eq!(conflicting_lines, vec![1, 2]);
        assert_eq!(strongest_line, 1);
        assert_eq!(snippets.len(), 2);
    }

    #[test]
    fn line_range_disambiguates() {
        let content = "x=1;\nx=1;\n";
        let edit = Edit {
            line_range: Some(LineRange { start: 2, end: 2 }),
            ..Edit::replace("x=1;", "x=2;")
        };
        let m = resolve_edit(content, &edit).unwrap();
        assert_eq!(m.line, 2);
        // line-range boost on top of exact, capped.
        assert_eq!(m.confidence, 1.0);
    }

    #[test]
    fn context_filters_candidates() {
        let content = "// first\nx=1;\n// second\nx=1;\n";
        let edit = Edit {
            before_context: Some("second".to_string()),
            ..Edit::replace("x=1;", "x=2;")
        };
        let m = resolve_edit(content, &edit).unwrap();
        assert_eq!(m.line, 4);
    }

    #[test]
    fn levenshtein_path_prefers_exact() {
        let content = "function computeTotal() {}\n";
        let edit = Edit {
            fuzzy_mode: Some(FuzzyMode::Levenshtein),
            ..Edit::replace("function computeTotal()", "function total()")
        };
        let m = resolve_edit(content, &edit).unwrap();
        assert_eq!(m.kind, MatchKind::Exact);
    }

    #[test]
    fn levenshtein_path_accepts_near_miss() {
        let content = "function computeTotal(items) {\n  return 0;\n}\n";
        let edit = Edit {
            fuzzy_mode: Some(FuzzyMode::Levenshtein),
            ..Edit::replace("function computeTotel(items)", "function total(items)")
        };
        let m = resolve_edit(content, &edit).unwrap();
        let MatchKind::Levenshtein { distance, .. } = m.kind else {
            panic!("expected levenshtein kind");
        };
        assert_eq!(distance, 1);
        assert!(m.confidence > 0.5 && m.confidence < 1.0);
    }

    #[test]
    fn whitespace_fuzzy_matches_spacing_drift() {
        let content = "const   total =  sum(a, b);\n";
        let edit = Edit {
            fuzzy_mode: Some(FuzzyMode::Whitespace),
            ..Edit::replace("const total = sum(a, b);", "const total = add(a, b);")
        };
        let m = resolve_edit(content, &edit).unwrap();
        assert_eq!(m.kind, MatchKind::WhitespaceFuzzy);
        assert!((m.confidence - 0.8).abs() < 1e-9);
    }
}
