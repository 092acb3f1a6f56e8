//! The normalization ladder.
//!
//! Levels form a closed alphabet, tried strictly in order up to the edit's
//! declared maximum. Each level's regex tolerates exactly the class of drift
//! that the level admits and nothing beyond it:
//!
//! - `exact`       - byte-for-byte
//! - `line-endings`- CRLF/LF drift
//! - `trailing`    - plus trailing whitespace before newlines
//! - `indentation` - plus leading-whitespace drift per line
//! - `whitespace`  - any interior whitespace amount/kind, including none
//!                   where the target has none
//! - `structural`  - whitespace fully ignored between significant chars

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NormalizationLevel {
    Exact,
    LineEndings,
    Trailing,
    Indentation,
    Whitespace,
    Structural,
}

impl NormalizationLevel {
    pub const LADDER: [NormalizationLevel; 6] = [
        NormalizationLevel::Exact,
        NormalizationLevel::LineEndings,
        NormalizationLevel::Trailing,
        NormalizationLevel::Indentation,
        NormalizationLevel::Whitespace,
        NormalizationLevel::Structural,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NormalizationLevel::Exact => "exact",
            NormalizationLevel::LineEndings => "line-endings",
            NormalizationLevel::Trailing => "trailing",
            NormalizationLevel::Indentation => "indentation",
            NormalizationLevel::Whitespace => "whitespace",
            NormalizationLevel::Structural => "structural",
        }
    }

    /// The ladder rungs up to and including this level.
    pub fn ladder_through(self) -> &'static [NormalizationLevel] {
        let idx = Self::LADDER.iter().position(|l| *l == self).unwrap_or(0);
        &Self::LADDER[..=idx]
    }

    /// Match confidence contributed by accepting at this level.
    pub fn confidence(self) -> f64 {
        match self {
            NormalizationLevel::Exact => 1.0,
            NormalizationLevel::LineEndings => 0.95,
            NormalizationLevel::Trailing => 0.9,
            NormalizationLevel::Indentation => 0.87,
            NormalizationLevel::Whitespace => 0.82,
            NormalizationLevel::Structural => 0.75,
        }
    }
}

/// Build the regex for a target at a given level. Targets are matched
/// literally; only the admitted drift class is relaxed.
pub fn regex_for(target: &str, level: NormalizationLevel, tab_width: usize) -> Option<Regex> {
    if target.is_empty() {
        return None;
    }
    let pattern = match level {
        NormalizationLevel::Exact => regex::escape(target),
        NormalizationLevel::LineEndings => join_lines(target, |line| regex::escape(line)),
        NormalizationLevel::Trailing => join_lines(target, |line| {
            format!("{}[ \\t]*", regex::escape(line.trim_end_matches([' ', '\t'])))
        }),
        NormalizationLevel::Indentation => {
            let expanded = expand_tabs(target, tab_width);
            join_lines(&expanded, |line| {
                let stripped = line.trim_start_matches([' ', '\t']);
                format!(
                    "[ \\t]*{}[ \\t]*",
                    regex::escape(stripped.trim_end_matches([' ', '\t']))
                )
            })
        }
        NormalizationLevel::Whitespace => flexible_whitespace(target, false),
        NormalizationLevel::Structural => flexible_whitespace(target, true),
    };
    Regex::new(&pattern).ok()
}

fn join_lines<F>(target: &str, f: F) -> String
where
    F: Fn(&str) -> String,
{
    let normalized = target.replace("\r\n", "\n");
    normalized
        .split('\n')
        .map(|line| f(line))
        .collect::<Vec<_>>()
        .join("\\r?\\n")
}

fn expand_tabs(target: &str, tab_width: usize) -> String {
    target.replace('\t', &" ".repeat(tab_width.max(1)))
}

/// Escape every non-whitespace char; target whitespace runs become `\s+`
/// (or `\s*` when fully structural), and `\s*` is admitted at punctuation
/// boundaries where the target has none. Identifiers never dissolve: two
/// adjacent alphanumeric chars stay adjacent.
fn flexible_whitespace(target: &str, structural: bool) -> String {
    let gap = if structural { "\\s*" } else { "\\s+" };
    let mut pattern = String::new();
    let mut pending_ws = false;
    let mut prev_char: Option<char> = None;
    for c in target.chars() {
        if c.is_whitespace() {
            pending_ws = true;
            continue;
        }
        if pending_ws {
            pattern.push_str(gap);
            pending_ws = false;
        } else if let Some(prev) = prev_char {
            let word_interior =
                (prev.is_alphanumeric() || prev == '_') && (c.is_alphanumeric() || c == '_');
            if !word_interior {
                pattern.push_str("\\s*");
            }
        }
        pattern.push_str(&regex::escape(&c.to_string()));
        prev_char = Some(c);
    }
    pattern
}
