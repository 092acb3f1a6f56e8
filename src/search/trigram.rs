//! Per-file trigram posting lists.
//!
//! A file's term set is the set of overlapping, case-folded 3-grams of its
//! content. A query string is tokenized the same way; candidate files are
//! those whose term set contains every query trigram. Posting lists persist
//! in the store and rebuild idempotently.

use std::collections::{HashMap, HashSet};

use crate::config::SearchConfig;

pub type Trigram = [u8; 3];

/// Extract the case-folded trigram set of a text, bounded by `max_terms`.
pub fn extract_trigrams(text: &str, max_terms: usize) -> HashSet<Trigram> {
    let bytes: Vec<u8> = text.bytes().map(|b| b.to_ascii_lowercase()).collect();
    let mut terms = HashSet::new();
    for window in bytes.windows(3) {
        terms.insert([window[0], window[1], window[2]]);
        if terms.len() >= max_terms {
            break;
        }
    }
    terms
}

#[derive(Debug)]
pub struct TrigramIndex {
    postings: HashMap<Trigram, HashSet<String>>,
    file_terms: HashMap<String, HashSet<Trigram>>,
    doc_lens: HashMap<String, usize>,
    max_file_bytes: usize,
    max_terms_per_file: usize,
    max_doc_freq: usize,
}

impl TrigramIndex {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            postings: HashMap::new(),
            file_terms: HashMap::new(),
            doc_lens: HashMap::new(),
            max_file_bytes: config.max_file_bytes,
            max_terms_per_file: config.max_terms_per_file,
            max_doc_freq: config.max_doc_freq,
        }
    }

    pub fn file_count(&self) -> usize {
        self.file_terms.len()
    }

    pub fn doc_len(&self, rel_path: &str) -> Option<usize> {
        self.doc_lens.get(rel_path).copied()
    }

    /// Index or re-index one file. Oversized files keep an empty term set so
    /// they never gate into candidates through this index.
    pub fn add_file(&mut self, rel_path: &str, content: &str) {
        self.remove_file(rel_path);
        if content.len() > self.max_file_bytes {
            self.doc_lens.insert(rel_path.to_string(), content.len());
            self.file_terms.insert(rel_path.to_string(), HashSet::new());
            return;
        }
        let terms = extract_trigrams(content, self.max_terms_per_file);
        for term in &terms {
            self.postings
                .entry(*term)
                .or_default()
                .insert(rel_path.to_string());
        }
        self.doc_lens.insert(rel_path.to_string(), content.len());
        self.file_terms.insert(rel_path.to_string(), terms);
    }

    pub fn remove_file(&mut self, rel_path: &str) {
        if let Some(terms) = self.file_terms.remove(rel_path) {
            for term in terms {
                if let Some(set) = self.postings.get_mut(&term) {
                    set.remove(rel_path);
                    if set.is_empty() {
                        self.postings.remove(&term);
                    }
                }
            }
        }
        self.doc_lens.remove(rel_path);
    }

    /// Files whose term set contains every query trigram.
    ///
    /// Returns None when the query is too short to gate or every trigram was
    /// dropped as pathologically common; callers fall back to other candidate
    /// sources.
    pub fn candidates(&self, query: &str) -> Option<HashSet<String>> {
        let query_terms = extract_trigrams(query, usize::MAX);
        if query_terms.is_empty() {
            return None;
        }
        let mut selective: Vec<&HashSet<String>> = Vec::new();
        for term in &query_terms {
            match self.postings.get(term) {
                Some(set) if set.len() > self.max_doc_freq => continue,
                Some(set) => selective.push(set),
                // A trigram absent from every file: no candidates.
                None => return Some(HashSet::new()),
            }
        }
        if selective.is_empty() {
            return None;
        }
        selective.sort_by_key(|s| s.len());
        let mut result: HashSet<String> = selective[0].clone();
        for set in &selective[1..] {
            result.retain(|path| set.contains(path));
            if result.is_empty() {
                break;
            }
        }
        Some(result)
    }

    /// Flatten postings for persistence. Sorted for stable output.
    pub fn to_postings(&self) -> Vec<(String, Vec<String>)> {
        let mut out: Vec<(String, Vec<String>)> = self
            .postings
            .iter()
            .map(|(term, paths)| {
                let key = String::from_utf8_lossy(term).into_owned();
                let mut paths: Vec<String> = paths.iter().cloned().collect();
                paths.sort();
                (key, paths)
            })
            .collect();
        out.sort();
        out
    }

    /// Rebuild in-memory state from persisted postings.
    pub fn load_postings(&mut self, postings: Vec<(String, Vec<String>)>) {
        self.postings.clear();
        self.file_terms.clear();
        for (key, paths) in postings {
            let bytes = key.as_bytes();
            if bytes.len() != 3 {
                continue;
            }
            let term: Trigram = [bytes[0], bytes[1], bytes[2]];
            for path in &paths {
                self.file_terms
                    .entry(path.clone())
                    .or_default()
                    .insert(term);
            }
            self.postings.insert(term, paths.into_iter().collect());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> TrigramIndex {
        TrigramIndex::new(&SearchConfig::default())
    }

    #[test]
    fn extracts_case_folded_trigrams() {
        let terms = extract_trigrams("AbCd", usize::MAX);
        assert!(terms.contains(b"abc"));
        assert!(terms.contains(b"bcd"));
        assert_eq!(terms.len(), 2);
    }

    #[test]
    fn candidates_require_every_trigram() {
        let mut idx = index();
        idx.add_file("a.ts", "function authenticate() {}");
        idx.add_file("b.ts", "function render() {}");

        let hits = idx.candidates("authenticate").unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits.contains("a.ts"));

        let hits = idx.candidates("zzzqqq").unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn short_query_cannot_gate() {
        let mut idx = index();
        idx.add_file("a.ts", "xy");
        assert!(idx.candidates("ab").is_none());
    }

    #[test]
    fn remove_file_clears_postings() {
        let mut idx = index();
        idx.add_file("a.ts", "function authenticate() {}");
        idx.remove_file("a.ts");
        assert_eq!(idx.file_count(), 0);
        let hits = idx.candidates("authenticate").unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn reindex_is_idempotent() {
        let mut idx = index();
        idx.add_file("a.ts", "alpha beta");
        idx.add_file("a.ts", "alpha beta");
        let hits = idx.candidates("alpha").unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn oversized_files_are_not_gated_in() {
        let config = SearchConfig {
            max_file_bytes: 8,
            ..SearchConfig::default()
        };
        let mut idx = TrigramIndex::new(&config);
        idx.add_file("big.ts", "authenticate everywhere");
        let hits = idx.candidates("authenticate").unwrap();
        assert!(hits.is_empty());
        // Length is still recorded for diagnostics.
        assert!(idx.doc_len("big.ts").unwrap() > 8);
    }

    #[test]
    fn postings_round_trip() {
        let mut idx = index();
        idx.add_file("a.ts", "function authenticate() {}");
        idx.add_file("b.ts", "authentication flows");
        let postings = idx.to_postings();

        let mut restored = index();
        restored.load_postings(postings.clone());
        assert_eq!(restored.to_postings(), postings);
        let hits = restored.candidates("authent").unwrap();
        assert_eq!(hits.len(), 2);
    }
}
