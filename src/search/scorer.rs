//! Multi-signal hybrid scoring.
//!
//! Each candidate file gets a weighted normalized sum of independent
//! signals; the weight profile is a function of the detected query intent.
//! The final score is `100 x sum(signal x weight)`, adjusted by a small
//! path-depth multiplier.

use regex::Regex;
use std::collections::HashMap;

use crate::search::query::{QueryIntent, SearchQuery};
use crate::symbol::Symbol;

const BM25_K1: f64 = 1.2;
const BM25_B: f64 = 0.75;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Signal weight profile. Every profile sums to 1.0.
#[derive(Debug, Clone, Copy)]
pub struct Weights {
    pub content: f64,
    pub filename: f64,
    pub symbol: f64,
    pub comment: f64,
    pub pattern: f64,
    pub test_coverage: f64,
    pub recency: f64,
    pub outbound_importance: f64,
}

impl Weights {
    pub fn for_intent(intent: QueryIntent) -> Self {
        match intent {
            QueryIntent::Symbol => Self {
                content: 0.15,
                filename: 0.20,
                symbol: 0.35,
                comment: 0.05,
                pattern: 0.05,
                test_coverage: 0.05,
                recency: 0.05,
                outbound_importance: 0.10,
            },
            QueryIntent::Content => Self {
                content: 0.40,
                filename: 0.10,
                symbol: 0.10,
                comment: 0.10,
                pattern: 0.10,
                test_coverage: 0.05,
                recency: 0.05,
                outbound_importance: 0.10,
            },
            QueryIntent::Filename => Self {
                content: 0.10,
                filename: 0.40,
                symbol: 0.15,
                comment: 0.05,
                pattern: 0.05,
                test_coverage: 0.05,
                recency: 0.10,
                outbound_importance: 0.10,
            },
            QueryIntent::Mixed => Self {
                content: 0.25,
                filename: 0.20,
                symbol: 0.20,
                comment: 0.10,
                pattern: 0.05,
                test_coverage: 0.05,
                recency: 0.05,
                outbound_importance: 0.10,
            },
        }
    }
}

/// Collection-wide statistics for BM25: document frequencies over the
/// candidate set plus average document length.
#[derive(Debug, Default)]
pub struct Bm25Stats {
    doc_count: usize,
    total_len: usize,
    df: HashMap<String, usize>,
}

impl Bm25Stats {
    pub fn add_document(&mut self, tokens: &[String], terms: &[String]) {
        self.doc_count += 1;
        self.total_len += tokens.len();
        for term in terms {
            if tokens.iter().any(|t| t == term) {
                *self.df.entry(term.clone()).or_insert(0) += 1;
            }
        }
    }

    fn avg_len(&self) -> f64 {
        if self.doc_count == 0 {
            0.0
        } else {
            self.total_len as f64 / self.doc_count as f64
        }
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.doc_count as f64;
        let df = self.df.get(term).copied().unwrap_or(0) as f64;
        // Classic BM25 IDF, clamped: a term present in every candidate
        // contributes nothing and the literal-match floor takes over.
        ((n - df + 0.5) / (df + 0.5)).ln().max(0.0)
    }
}

pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Per-file inputs the engine gathers before scoring.
pub struct SignalInputs<'a> {
    pub rel_path: &'a str,
    pub content: &'a str,
    pub tokens: &'a [String],
    pub symbols: &'a [Symbol],
    pub age_ms: Option<i64>,
    pub in_degree: usize,
    pub has_test_sibling: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredSignals {
    pub score: f64,
    pub content_score: f64,
    pub filename_match_type: &'static str,
    pub filename_multiplier: f64,
    pub depth_multiplier: f64,
    /// Weighted contribution per signal.
    pub breakdown: HashMap<&'static str, f64>,
    /// Signals with a non-zero contribution.
    pub signals: Vec<&'static str>,
}

pub struct HybridScorer {
    weights: Weights,
    pattern_regexes: Vec<Regex>,
}

impl HybridScorer {
    pub fn new(query: &SearchQuery) -> Self {
        let pattern_regexes = query
            .patterns
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();
        Self {
            weights: Weights::for_intent(query.intent),
            pattern_regexes,
        }
    }

    pub fn weights(&self) -> Weights {
        self.weights
    }

    pub fn score(
        &self,
        query: &SearchQuery,
        stats: &Bm25Stats,
        inputs: &SignalInputs,
    ) -> ScoredSignals {
        let terms: Vec<String> = query.keywords.iter().map(|k| k.folded().to_lowercase()).collect();

        let bm25 = self.bm25(stats, inputs.tokens, &terms);
        let literal_hits = terms
            .iter()
            .filter(|t| inputs.tokens.iter().any(|tok| tok == *t))
            .count();
        // BM25 can collapse to ~0 on tiny collections even with literal
        // hits; the floor keeps ordering meaningful.
        let content_score = if bm25 < 1e-9 && literal_hits > 0 {
            10.0 + bm25 / 100.0
        } else {
            bm25
        };

        let (filename_raw, filename_match_type) = filename_signal(inputs.rel_path, query);
        let symbol_raw = symbol_signal(inputs.symbols, query);
        let comment_raw = comment_signal(inputs.content, query);
        let pattern_raw = self.pattern_signal(inputs.content);
        let test_raw = if inputs.has_test_sibling { 1.0 } else { 0.0 };
        let recency_raw = recency_signal(inputs.age_ms);
        let outbound_raw = (((inputs.in_degree + 1) as f64).log2() / 7.0).min(1.0);

        // Normalize unbounded raws into [0, 1].
        let content_norm = content_score / (content_score + 1.0);
        let filename_norm = filename_raw / 100.0;
        let symbol_norm = (symbol_raw / 64.0).min(1.0);
        let comment_norm = (comment_raw / 50.0).min(1.0);
        let pattern_norm = (pattern_raw / 200.0).min(1.0);

        let w = &self.weights;
        let contributions: [(&'static str, f64); 8] = [
            ("content", content_norm * w.content),
            ("filename", filename_norm * w.filename),
            ("symbol", symbol_norm * w.symbol),
            ("comment", comment_norm * w.comment),
            ("pattern", pattern_norm * w.pattern),
            ("testCoverage", test_raw * w.test_coverage),
            ("recency", recency_raw * w.recency),
            ("outboundImportance", outbound_raw * w.outbound_importance),
        ];

        let depth_multiplier = depth_multiplier(inputs.rel_path);
        let total: f64 = contributions.iter().map(|(_, v)| v).sum();
        let score = 100.0 * total * depth_multiplier;

        let breakdown: HashMap<&'static str, f64> = contributions.iter().cloned().collect();
        let signals = contributions
            .iter()
            .filter(|(_, v)| *v > 0.0)
            .map(|(name, _)| *name)
            .collect();

        ScoredSignals {
            score,
            content_score,
            filename_match_type,
            filename_multiplier: 1.0 + filename_norm,
            depth_multiplier,
            breakdown,
            signals,
        }
    }

    fn bm25(&self, stats: &Bm25Stats, tokens: &[String], terms: &[String]) -> f64 {
        if tokens.is_empty() || terms.is_empty() {
            return 0.0;
        }
        let avg_len = stats.avg_len().max(1.0);
        let len_norm = BM25_K1 * (1.0 - BM25_B + BM25_B * tokens.len() as f64 / avg_len);
        let mut score = 0.0;
        for term in terms {
            let tf = tokens.iter().filter(|t| *t == term).count() as f64;
            if tf == 0.0 {
                continue;
            }
            score += stats.idf(term) * (tf * (BM25_K1 + 1.0)) / (tf + len_norm);
        }
        score
    }

    fn pattern_signal(&self, content: &str) -> f64 {
        self.pattern_regexes
            .iter()
            .map(|re| 100.0 * re.find_iter(content).count() as f64)
            .sum()
    }
}

fn filename_signal(rel_path: &str, query: &SearchQuery) -> (f64, &'static str) {
    let basename = rel_path.rsplit('/').next().unwrap_or(rel_path);
    let stem = basename.split_once('.').map(|(s, _)| s).unwrap_or(basename);
    let mut best = (0.0, "none");
    for keyword in &query.keywords {
        let (folded_base, folded_stem, folded_kw) = if keyword.case_sensitive {
            (basename.to_string(), stem.to_string(), keyword.text.clone())
        } else {
            (
                basename.to_lowercase(),
                stem.to_lowercase(),
                keyword.text.to_lowercase(),
            )
        };
        let candidate = if folded_base == folded_kw {
            (100.0, "exact")
        } else if folded_stem == folded_kw {
            (100.0, "stem")
        } else if folded_base.contains(&folded_kw) {
            (50.0, "partial")
        } else {
            (0.0, "none")
        };
        if candidate.0 > best.0 {
            best = candidate;
        }
    }
    best
}

fn symbol_signal(symbols: &[Symbol], query: &SearchQuery) -> f64 {
    let mut raw = 0.0;
    for symbol in symbols {
        let name = symbol.name();
        let mut exact = false;
        let mut partial = false;
        for keyword in &query.keywords {
            let hit_exact = if keyword.case_sensitive {
                name == keyword.text
            } else {
                name.eq_ignore_ascii_case(&keyword.text)
            };
            if hit_exact {
                exact = true;
            } else if keyword.matches_in(name) {
                partial = true;
            }
        }
        if exact {
            raw += 32.0;
        } else if partial {
            raw += 16.0;
        }
    }
    raw
}

fn comment_signal(content: &str, query: &SearchQuery) -> f64 {
    let comments = extract_comment_text(content);
    let mut raw = 0.0;
    for keyword in &query.keywords {
        let haystack = if keyword.case_sensitive {
            comments.clone()
        } else {
            comments.to_lowercase()
        };
        let needle = if keyword.case_sensitive {
            keyword.text.clone()
        } else {
            keyword.text.to_lowercase()
        };
        if needle.is_empty() {
            continue;
        }
        raw += 10.0 * haystack.matches(&needle).count() as f64;
    }
    raw
}

/// Pull line and block comment text out of source content.
pub fn extract_comment_text(content: &str) -> String {
    let mut out = String::new();
    let mut in_block = false;
    for line in content.lines() {
        let mut rest = line;
        loop {
            if in_block {
                match rest.find("*/") {
                    Some(end) => {
                        out.push_str(&rest[..end]);
                        out.push('\n');
                        in_block = false;
                        rest = &rest[end + 2..];
                    }
                    None => {
                        out.push_str(rest);
                        out.push('\n');
                        break;
                    }
                }
            } else if let Some(start) = rest.find("/*") {
                if let Some(line_pos) = rest.find("//") {
                    if line_pos < start {
                        out.push_str(&rest[line_pos + 2..]);
                        out.push('\n');
                        break;
                    }
                }
                in_block = true;
                rest = &rest[start + 2..];
            } else if let Some(pos) = rest.find("//") {
                out.push_str(&rest[pos + 2..]);
                out.push('\n');
                break;
            } else {
                break;
            }
        }
    }
    out
}

fn recency_signal(age_ms: Option<i64>) -> f64 {
    match age_ms {
        Some(age) if age < 7 * DAY_MS => 1.0,
        Some(age) if age < 30 * DAY_MS => 0.8,
        Some(age) if age < 90 * DAY_MS => 0.6,
        _ => 0.4,
    }
}

fn depth_multiplier(rel_path: &str) -> f64 {
    let depth = rel_path.split('/').count();
    if depth <= 3 {
        1.0
    } else {
        (1.0 - 0.05 * (depth - 3) as f64).max(0.7)
    }
}
