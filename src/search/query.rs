//! Query parsing, intent detection, and smart-case.

use once_cell::sync::Lazy;
use regex::Regex;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap());
static FILENAMEISH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|/)[\w.-]+\.[A-Za-z0-9]{1,5}$").unwrap());

/// Detected query intent; drives the signal weight profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryIntent {
    Symbol,
    Content,
    Filename,
    Mixed,
}

/// One keyword with its smart-case resolution: a keyword containing an
/// uppercase letter matches case-sensitively, otherwise insensitively.
#[derive(Debug, Clone)]
pub struct Keyword {
    pub text: String,
    pub case_sensitive: bool,
}

impl Keyword {
    fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            case_sensitive: text.chars().any(|c| c.is_uppercase()),
        }
    }

    /// Case-normalized form for insensitive comparisons.
    pub fn folded(&self) -> String {
        if self.case_sensitive {
            self.text.clone()
        } else {
            self.text.to_lowercase()
        }
    }

    pub fn matches_in(&self, haystack: &str) -> bool {
        if self.case_sensitive {
            haystack.contains(&self.text)
        } else {
            haystack.to_lowercase().contains(&self.text.to_lowercase())
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub raw: String,
    pub keywords: Vec<Keyword>,
    pub intent: QueryIntent,
    /// Extra regex patterns supplied alongside the query.
    pub patterns: Vec<String>,
    pub word_boundary: bool,
    /// Extension whitelist applied during post-processing.
    pub file_types: Option<Vec<String>>,
}

impl SearchQuery {
    pub fn parse(raw: &str) -> Self {
        let keywords: Vec<Keyword> = raw
            .split_whitespace()
            .filter(|t| !t.is_empty())
            .map(Keyword::new)
            .collect();
        let intent = detect_intent(raw, &keywords);
        Self {
            raw: raw.to_string(),
            keywords,
            intent,
            patterns: Vec::new(),
            word_boundary: false,
            file_types: None,
        }
    }

    pub fn with_intent(mut self, intent: QueryIntent) -> Self {
        self.intent = intent;
        self
    }

    pub fn with_patterns(mut self, patterns: Vec<String>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn with_word_boundary(mut self, enabled: bool) -> Self {
        self.word_boundary = enabled;
        self
    }

    pub fn with_file_types(mut self, types: Option<Vec<String>>) -> Self {
        self.file_types = types;
        self
    }

    /// Regex matching any keyword literally, honoring word-boundary and
    /// smart-case settings. Used for literal line matches.
    pub fn keyword_regex(&self) -> Option<Regex> {
        if self.keywords.is_empty() {
            return None;
        }
        let any_sensitive = self.keywords.iter().any(|k| k.case_sensitive);
        let alternatives: Vec<String> = self
            .keywords
            .iter()
            .map(|k| {
                let escaped = regex::escape(&k.text);
                if self.word_boundary {
                    format!(r"\b{escaped}\b")
                } else {
                    escaped
                }
            })
            .collect();
        let mut pattern = format!("({})", alternatives.join("|"));
        if !any_sensitive {
            pattern = format!("(?i){pattern}");
        }
        Regex::new(&pattern).ok()
    }
}

fn detect_intent(raw: &str, keywords: &[Keyword]) -> QueryIntent {
    let trimmed = raw.trim();
    if FILENAMEISH.is_match(trimmed) || trimmed.contains('/') {
        return QueryIntent::Filename;
    }
    match keywords.len() {
        0 => QueryIntent::Content,
        1 => {
            let word = &keywords[0].text;
            if IDENTIFIER.is_match(word)
                && (has_inner_uppercase(word) || word.contains('_') || word.len() <= 24)
            {
                QueryIntent::Symbol
            } else {
                QueryIntent::Mixed
            }
        }
        2 => QueryIntent::Mixed,
        _ => QueryIntent::Content,
    }
}

fn has_inner_uppercase(word: &str) -> bool {
    word.chars().skip(1).any(|c| c.is_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_identifier_is_symbol_intent() {
        assert_eq!(SearchQuery::parse("Authenticator").intent, QueryIntent::Symbol);
        assert_eq!(SearchQuery::parse("parse_file").intent, QueryIntent::Symbol);
    }

    #[test]
    fn phrases_are_content_intent() {
        assert_eq!(
            SearchQuery::parse("retry the connection after failure").intent,
            QueryIntent::Content
        );
    }

    #[test]
    fn paths_are_filename_intent() {
        assert_eq!(SearchQuery::parse("auth.service.ts").intent, QueryIntent::Filename);
        assert_eq!(SearchQuery::parse("src/auth").intent, QueryIntent::Filename);
    }

    #[test]
    fn smart_case_per_keyword() {
        let query = SearchQuery::parse("Auth token");
        assert!(query.keywords[0].case_sensitive);
        assert!(!query.keywords[1].case_sensitive);

        assert!(query.keywords[0].matches_in("the Auth module"));
        assert!(!query.keywords[0].matches_in("the auth module"));
        assert!(query.keywords[1].matches_in("TOKEN refresh"));
    }

    #[test]
    fn keyword_regex_honors_word_boundary() {
        let query = SearchQuery::parse("auth").with_word_boundary(true);
        let re = query.keyword_regex().unwrap();
        assert!(re.is_match("auth flow"));
        assert!(!re.is_match("authentication"));
    }
}
