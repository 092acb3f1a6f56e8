//! Candidate collection: union of trigram hits, path matches, and symbol
//! name matches, with a bounded fallback scan when the union runs small.

use anyhow::Result;
use std::collections::BTreeSet;
use std::rc::Rc;

use crate::search::query::SearchQuery;
use crate::search::trigram::TrigramIndex;
use crate::store::IndexStore;

/// Below this many candidates the collector tops up from a bounded scan of
/// the indexed file list.
const SMALL_UNION: usize = 10;

pub struct CandidateCollector {
    store: Rc<IndexStore>,
    max_candidates: usize,
}

impl CandidateCollector {
    pub fn new(store: Rc<IndexStore>, max_candidates: usize) -> Self {
        Self {
            store,
            max_candidates,
        }
    }

    /// Collect candidate relative paths for a query. The result is bounded
    /// by `max_candidates`; the flag reports whether the bound truncated it.
    pub fn collect(
        &self,
        query: &SearchQuery,
        trigrams: &TrigramIndex,
    ) -> Result<(Vec<String>, bool)> {
        // BTreeSet keeps candidate order stable across runs.
        let mut union: BTreeSet<String> = BTreeSet::new();

        // 1. Trigram-gated hits for the raw query.
        if let Some(hits) = trigrams.candidates(&query.raw) {
            union.extend(hits);
        }

        // 2. Files whose path contains every keyword.
        let all_paths = self.store.list_paths()?;
        for path in &all_paths {
            let matched = !query.keywords.is_empty()
                && query.keywords.iter().all(|k| k.matches_in(path));
            if matched {
                union.insert(path.clone());
            }
        }

        // 3. Files with any symbol name containing any keyword.
        for keyword in &query.keywords {
            for (path, symbols) in self.store.symbols_like(&keyword.text, self.max_candidates)? {
                if symbols
                    .iter()
                    .any(|s| keyword.matches_in(s.name()))
                {
                    union.insert(path);
                }
            }
        }

        // 4. Bounded fallback scan when the union is too small.
        if union.len() < SMALL_UNION {
            let mut sorted: Vec<&String> = all_paths.iter().collect();
            sorted.sort();
            for path in sorted {
                if union.len() >= SMALL_UNION.max(self.max_candidates.min(all_paths.len())) {
                    break;
                }
                union.insert(path.clone());
            }
        }

        let truncated = union.len() > self.max_candidates;
        let candidates: Vec<String> = union.into_iter().take(self.max_candidates).collect();
        Ok((candidates, truncated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::symbol::{Definition, DefinitionKind, Symbol};

    fn def(name: &str) -> Symbol {
        Symbol::Definition(Definition {
            kind: DefinitionKind::Function,
            name: name.into(),
            signature: format!("function {name}()"),
            start_line: 1,
            end_line: 1,
            start_byte: 0,
            end_byte: 1,
            doc: None,
            modifiers: vec![],
            calls: vec![],
            content: None,
        })
    }

    fn store_with(files: &[(&str, &str)]) -> Rc<IndexStore> {
        let store = Rc::new(IndexStore::open_in_memory().unwrap());
        for (path, symbol_name) in files {
            store
                .replace_symbols(path, 1, "typescript", &[def(symbol_name)])
                .unwrap();
        }
        store
    }

    #[test]
    fn unions_trigram_path_and_symbol_sources() {
        let store = store_with(&[
            ("src/auth/login.ts", "login"),
            ("src/render.ts", "render"),
            ("docs/auth.md", "x"),
        ]);
        let mut trigrams = TrigramIndex::new(&SearchConfig::default());
        trigrams.add_file("src/render.ts", "const auth = connect();");

        let collector = CandidateCollector::new(store, 50);
        let query = SearchQuery::parse("auth");
        let (candidates, truncated) = collector.collect(&query, &trigrams).unwrap();
        assert!(!truncated);
        // Path hit, trigram hit, and the fallback keeps small indexes whole.
        assert!(candidates.contains(&"src/auth/login.ts".to_string()));
        assert!(candidates.contains(&"src/render.ts".to_string()));
    }

    #[test]
    fn respects_max_candidates() {
        let files: Vec<(String, String)> = (0..30)
            .map(|i| (format!("src/auth/file{i}.ts"), "auth_helper".to_string()))
            .collect();
        let refs: Vec<(&str, &str)> = files
            .iter()
            .map(|(a, b)| (a.as_str(), b.as_str()))
            .collect();
        let store = store_with(&refs);
        let trigrams = TrigramIndex::new(&SearchConfig::default());

        let collector = CandidateCollector::new(store, 5);
        let query = SearchQuery::parse("auth");
        let (candidates, truncated) = collector.collect(&query, &trigrams).unwrap();
        assert_eq!(candidates.len(), 5);
        assert!(truncated);
    }
}
