//! Fuzzy matching paths: whitespace-flexible regex and trigram-gated
//! levenshtein window sliding.

use regex::Regex;
use std::collections::HashSet;
use std::time::Duration;

use crate::config::EditorConfig;
use crate::error::EngineError;
use crate::symbol_index::levenshtein;
use crate::util::Deadline;

/// Wall-clock ceiling for one levenshtein resolution.
pub const FUZZY_TIMEOUT: Duration = Duration::from_secs(5);

/// Line-level trigram gate.
const LINE_JACCARD_GATE: f64 = 0.3;
/// Per-window trigram gate.
const WINDOW_JACCARD_GATE: f64 = 0.2;
/// Fallback candidate-line count when the gate admits nothing.
const FALLBACK_TOP_LINES: usize = 50;

/// `\s+` in place of interior whitespace runs, with word boundaries on
/// target boundaries when they are alphanumeric.
pub fn whitespace_regex(target: &str) -> Option<Regex> {
    let chunks: Vec<&str> = target.split_whitespace().collect();
    if chunks.is_empty() {
        return None;
    }
    let mut pattern = String::new();
    if target
        .trim()
        .chars()
        .next()
        .map(|c| c.is_alphanumeric() || c == '_')
        .unwrap_or(false)
    {
        pattern.push_str("\\b");
    }
    pattern.push_str(
        &chunks
            .iter()
            .map(|c| regex::escape(c))
            .collect::<Vec<_>>()
            .join("\\s+"),
    );
    if target
        .trim()
        .chars()
        .last()
        .map(|c| c.is_alphanumeric() || c == '_')
        .unwrap_or(false)
    {
        pattern.push_str("\\b");
    }
    Regex::new(&pattern).ok()
}

/// A window accepted by the levenshtein path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevMatch {
    pub start: usize,
    pub end: usize,
    pub distance: usize,
    pub max_distance: usize,
}

/// Window tolerance: `max(1, 0.2 x |t|)` for short targets, `0.3 x |t|`
/// beyond ten characters.
pub fn tolerance_for(target_len: usize) -> usize {
    if target_len < 10 {
        ((target_len as f64 * 0.2) as usize).max(1)
    } else {
        (target_len as f64 * 0.3) as usize
    }
}

pub(crate) fn trigram_set(text: &str) -> HashSet<[u8; 3]> {
    let bytes: Vec<u8> = text.bytes().map(|b| b.to_ascii_lowercase()).collect();
    bytes
        .windows(3)
        .map(|w| [w[0], w[1], w[2]])
        .collect()
}

pub(crate) fn jaccard(a: &HashSet<[u8; 3]>, b: &HashSet<[u8; 3]>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Trigram-gated sliding-window levenshtein search.
///
/// Returns the accepted, non-overlapping windows ordered by position. Errors
/// on oversize targets and on budget exhaustion, leaving nothing half-done.
pub fn levenshtein_candidates(
    content: &str,
    target: &str,
    config: &EditorConfig,
    max_ops: usize,
) -> Result<Vec<LevMatch>, EngineError> {
    let target_len = target.len();
    if target_len >= config.levenshtein_max_target {
        return Err(EngineError::TargetTooLongForLevenshtein {
            len: target_len,
            max: config.levenshtein_max_target,
        });
    }
    if target_len == 0 {
        return Ok(Vec::new());
    }

    let deadline = Deadline::after(FUZZY_TIMEOUT);
    let target_trigrams = trigram_set(target);
    let tolerance = tolerance_for(target_len);

    // Gate to likely lines first; fall back to the overall closest lines.
    let mut line_spans: Vec<(usize, usize, f64)> = Vec::new();
    let mut offset = 0usize;
    for line in content.split_inclusive('\n') {
        let score = jaccard(&target_trigrams, &trigram_set(line));
        line_spans.push((offset, offset + line.len(), score));
        offset += line.len();
    }
    let mut candidates: Vec<(usize, usize)> = line_spans
        .iter()
        .filter(|(_, _, s)| *s >= LINE_JACCARD_GATE)
        .map(|(a, b, _)| (*a, *b))
        .collect();
    if candidates.is_empty() {
        let mut by_score: Vec<&(usize, usize, f64)> =
            line_spans.iter().filter(|(_, _, s)| *s > 0.0).collect();
        by_score.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        candidates = by_score
            .into_iter()
            .take(FALLBACK_TOP_LINES)
            .map(|(a, b, _)| (*a, *b))
            .collect();
        candidates.sort();
    }

    let bytes = content.as_bytes();
    let min_len = target_len.saturating_sub(tolerance).max(1);
    let max_len = target_len + tolerance;
    let mut ops = 0usize;
    let mut accepted: Vec<LevMatch> = Vec::new();

    for (span_start, span_end) in candidates {
        // Extend the span so windows may cross into the next line.
        let region_end = (span_end + max_len).min(content.len());
        let is_ident = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
        for start in span_start..span_end {
            if !content.is_char_boundary(start) {
                continue;
            }
            // Word-boundary start positions only.
            if start > 0 && is_ident(bytes[start - 1]) && is_ident(bytes[start]) {
                continue;
            }
            if deadline.expired() {
                return Err(EngineError::FuzzyBudgetExceeded { ops });
            }
            let mut best_here: Option<LevMatch> = None;
            for len in min_len..=max_len {
                let end = start + len;
                if end > region_end || !content.is_char_boundary(end) {
                    break;
                }
                let window = &content[start..end];
                if jaccard(&target_trigrams, &trigram_set(window)) < WINDOW_JACCARD_GATE {
                    continue;
                }
                ops += (target_len + 1) * (len + 1);
                if ops > max_ops {
                    return Err(EngineError::FuzzyBudgetExceeded { ops });
                }
                let distance = levenshtein(target, window);
                if distance <= tolerance {
                    let better = best_here
                        .map(|b| distance < b.distance)
                        .unwrap_or(true);
                    if better {
                        best_here = Some(LevMatch {
                            start,
                            end,
                            distance,
                            max_distance: tolerance,
                        });
                    }
                }
            }
            if let Some(m) = best_here {
                accepted.push(m);
            }
        }
    }

    // Keep the best of overlapping windows.
    accepted.sort_by_key(|m| (m.distance, m.start));
    let mut kept: Vec<LevMatch> = Vec::new();
    for m in accepted {
        if kept.iter().all(|k| m.end <= k.start || m.start >= k.end) {
            kept.push(m);
        }
    }
    kept.sort_by_key(|m| m.start);
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EditorConfig {
        EditorConfig::default()
    }

    #[test]
    fn whitespace_regex_collapses_runs() {
        let re = whitespace_regex("const x = 1;").unwrap();
        assert!(re.is_match("const   x =\t1;"));
        assert!(!re.is_match("const xy = 1;"));
    }

    #[test]
    fn whitespace_regex_bounds_words() {
        let re = whitespace_regex("count").unwrap();
        assert!(re.is_match("let count = 0"));
        assert!(!re.is_match("recount = 0"));
    }

    #[test]
    fn finds_near_miss_within_tolerance() {
        let content = "function computeTotal(items) {\n  return sum(items);\n}\n";
        // One substitution away from the real text.
        let matches =
            levenshtein_candidates(content, "function computeTotel(items)", &config(), 100_000)
                .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].distance, 1);
        let found = &content[matches[0].start..matches[0].end];
        assert!(found.starts_with("function computeTot"));
    }

    #[test]
    fn rejects_far_targets() {
        let content = "the quick brown fox\n";
        let matches =
            levenshtein_candidates(content, "completely unrelated words", &config(), 100_000)
                .unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn oversize_target_is_refused() {
        let target = "x".repeat(300);
        let err = levenshtein_candidates("irrelevant", &target, &config(), 100_000).unwrap_err();
        assert!(matches!(
            err,
            EngineError::TargetTooLongForLevenshtein { len: 300, .. }
        ));
    }

    #[test]
    fn operation_cap_aborts_cleanly() {
        let content = "abcdefgh ".repeat(500);
        let err = levenshtein_candidates(&content, "abcdefghi", &config(), 100).unwrap_err();
        assert!(matches!(err, EngineError::FuzzyBudgetExceeded { .. }));
    }

    #[test]
    fn tolerance_scales_with_length() {
        assert_eq!(tolerance_for(4), 1);
        assert_eq!(tolerance_for(9), 1);
        assert_eq!(tolerance_for(20), 6);
    }
}
