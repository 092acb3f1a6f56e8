//! Persistent symbol index with a hot LRU tier.
//!
//! Maps relative paths to symbol lists. Files are parsed on demand and only
//! re-parsed when the on-disk mtime differs from the stored value. A bounded
//! in-memory LRU fronts the SQLite cold store; modification notifications are
//! debounced into batches through an explicit pending set.

use anyhow::Result;
use log::{debug, warn};
use lru::LruCache;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::languages::registry::ParserRegistry;
use crate::store::IndexStore;
use crate::symbol::Symbol;
use crate::util::{mtime_ms, to_abs_path, to_rel_path};

/// Hot tier capacity.
const HOT_CACHE_SIZE: usize = 50;

/// Modification notifications are batched for this long before reindexing.
pub const DEBOUNCE: Duration = Duration::from_millis(500);

/// Maximum results returned by either search tier.
const SEARCH_LIMIT: usize = 100;

/// Fuzzy fallback edit-distance ceiling.
const MAX_EDIT_DISTANCE: usize = 2;

#[derive(Clone)]
struct HotEntry {
    mtime: i64,
    symbols: Rc<Vec<Symbol>>,
}

/// A search hit: the owning file plus the matching symbol.
#[derive(Debug, Clone)]
pub struct SymbolHit {
    pub file_path: String,
    pub symbol: Symbol,
    pub score: f64,
}

pub struct SymbolIndex {
    root: PathBuf,
    store: Rc<IndexStore>,
    registry: ParserRegistry,
    hot: RefCell<LruCache<String, HotEntry>>,
    pending: RefCell<HashSet<String>>,
    pending_since: Cell<Option<Instant>>,
    skeleton_cache: bool,
}

impl SymbolIndex {
    pub fn new(root: &Path, store: Rc<IndexStore>) -> Self {
        Self {
            root: root.to_path_buf(),
            store,
            registry: ParserRegistry::new(),
            hot: RefCell::new(LruCache::new(NonZeroUsize::new(HOT_CACHE_SIZE).unwrap())),
            pending: RefCell::new(HashSet::new()),
            pending_since: Cell::new(None),
            skeleton_cache: false,
        }
    }

    /// Enable the on-disk skeleton cache under `.mcp/skeletons/`.
    pub fn with_skeleton_cache(mut self, enabled: bool) -> Self {
        self.skeleton_cache = enabled;
        self
    }

    /// Rebuild the parser registry with an explicit per-file parse budget.
    pub fn with_parse_budget_ms(mut self, max_parse_time_ms: u64) -> Self {
        self.registry = ParserRegistry::with_parse_timeout_ms(max_parse_time_ms);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &Rc<IndexStore> {
        &self.store
    }

    pub fn supports(&self, rel_path: &str) -> bool {
        self.registry.supports(rel_path)
    }

    /// Symbols for a file, parsing and persisting when stale.
    ///
    /// Unsupported extensions yield an empty list persisted with the current
    /// mtime; missing files drop the row and return empty.
    pub fn get_symbols_for_file(&self, path: &Path) -> Result<Rc<Vec<Symbol>>> {
        let rel = to_rel_path(&self.root, path);
        let abs = to_abs_path(&self.root, &rel);

        let Some(mtime) = mtime_ms(&abs) else {
            self.drop_file(&rel)?;
            return Ok(Rc::new(Vec::new()));
        };

        if let Some(entry) = self.hot.borrow_mut().get(&rel) {
            if entry.mtime == mtime {
                return Ok(entry.symbols.clone());
            }
        }

        if let Some(record) = self.store.get_file_record(&rel)? {
            if record.last_modified == mtime {
                if let Some(symbols) = self.store.get_symbols(&rel)? {
                    let symbols = Rc::new(symbols);
                    self.cache_hot(&rel, mtime, symbols.clone());
                    return Ok(symbols);
                }
            }
        }

        self.reindex(&rel, &abs, mtime)
    }

    fn reindex(&self, rel: &str, abs: &Path, mtime: i64) -> Result<Rc<Vec<Symbol>>> {
        let (symbols, language) = if !self.registry.supports(rel) {
            (Vec::new(), "unknown".to_string())
        } else if let Some(cached) = self.load_skeleton(rel, mtime) {
            cached
        } else {
            let source = match std::fs::read_to_string(abs) {
                Ok(source) => source,
                Err(err) => {
                    // Unreadable or non-UTF-8 content degrades to empty.
                    warn!("failed to read {rel}: {err}");
                    String::new()
                }
            };
            match self.registry.parse(rel, &source) {
                Some(outcome) => {
                    self.save_skeleton(rel, mtime, &outcome.symbols, &outcome.language);
                    (outcome.symbols, outcome.language)
                }
                None => (Vec::new(), "unknown".to_string()),
            }
        };

        self.store
            .replace_symbols(rel, mtime, &language, &symbols)?;
        let symbols = Rc::new(symbols);
        self.cache_hot(rel, mtime, symbols.clone());
        Ok(symbols)
    }

    fn cache_hot(&self, rel: &str, mtime: i64, symbols: Rc<Vec<Symbol>>) {
        let evicted = self
            .hot
            .borrow_mut()
            .push(rel.to_string(), HotEntry { mtime, symbols });
        if let Some((path, _)) = evicted {
            if path != rel {
                debug!("hot cache evicted {path}");
            }
        }
    }

    fn drop_file(&self, rel: &str) -> Result<()> {
        self.hot.borrow_mut().pop(rel);
        self.store.remove_file(rel)?;
        Ok(())
    }

    /// Streamed scan of the cold store.
    pub fn get_all_symbols(&self) -> Result<Vec<(String, Vec<Symbol>)>> {
        let mut out = Vec::new();
        self.store
            .for_each_symbols(|path, symbols| out.push((path.to_string(), symbols)))?;
        Ok(out)
    }

    // ==================== Search ====================

    /// Exact substring search (case-insensitive), falling back to fuzzy
    /// matching when nothing hits.
    pub fn search(&self, query: &str) -> Result<Vec<SymbolHit>> {
        let query_lower = query.to_lowercase();
        let mut hits = Vec::new();
        for (path, symbols) in self.store.symbols_like(query, SEARCH_LIMIT * 4)? {
            for symbol in symbols {
                if symbol.name().to_lowercase().contains(&query_lower) {
                    hits.push(SymbolHit {
                        file_path: path.clone(),
                        symbol,
                        score: 1.0,
                    });
                    if hits.len() >= SEARCH_LIMIT {
                        return Ok(hits);
                    }
                }
            }
        }
        if hits.is_empty() {
            return self.fuzzy_search(query, MAX_EDIT_DISTANCE);
        }
        Ok(hits)
    }

    /// Levenshtein-based fallback with prefix and exact-match boosts.
    pub fn fuzzy_search(&self, query: &str, max_edit_distance: usize) -> Result<Vec<SymbolHit>> {
        let query_lower = query.to_lowercase();
        let mut hits = Vec::new();
        self.store.for_each_symbols(|path, symbols| {
            for symbol in symbols {
                let name_lower = symbol.name().to_lowercase();
                let distance = levenshtein(&query_lower, &name_lower);
                if distance > max_edit_distance {
                    continue;
                }
                let max_len = query_lower.chars().count().max(name_lower.chars().count());
                let mut score = if max_len == 0 {
                    1.0
                } else {
                    1.0 - distance as f64 / max_len as f64
                };
                if name_lower.starts_with(&query_lower) {
                    score += 0.2;
                }
                if name_lower == query_lower {
                    score += 0.3;
                }
                hits.push(SymbolHit {
                    file_path: path.to_string(),
                    symbol,
                    score: score.min(1.0),
                });
            }
        })?;
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(SEARCH_LIMIT);
        Ok(hits)
    }

    // ==================== Incremental updates ====================

    /// Buffer a modified path for the next debounced reindex batch.
    pub fn mark_file_modified(&self, path: &Path) {
        let rel = to_rel_path(&self.root, path);
        self.pending.borrow_mut().insert(rel);
        if self.pending_since.get().is_none() {
            self.pending_since.set(Some(Instant::now()));
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.borrow().is_empty()
    }

    /// Drain the pending set when the debounce window has elapsed.
    /// Returns the paths that were reindexed or dropped.
    pub fn flush_if_due(&self) -> Result<Vec<String>> {
        match self.pending_since.get() {
            Some(since) if since.elapsed() >= DEBOUNCE => self.flush_pending(),
            _ => Ok(Vec::new()),
        }
    }

    /// Drain the pending set immediately. A path whose file no longer exists
    /// is dropped from both caches.
    pub fn flush_pending(&self) -> Result<Vec<String>> {
        let batch: Vec<String> = self.pending.borrow_mut().drain().collect();
        self.pending_since.set(None);
        for rel in &batch {
            let abs = to_abs_path(&self.root, rel);
            if abs.is_file() {
                self.get_symbols_for_file(&abs)?;
            } else {
                self.drop_file(rel)?;
            }
        }
        Ok(batch)
    }

    // ==================== Skeleton cache ====================

    fn skeleton_path(&self, rel: &str, mtime: i64) -> PathBuf {
        let path_hash = blake3::hash(rel.as_bytes()).to_hex();
        let options_hash = blake3::hash(b"ts,tsx,d.ts,js,jsx,mjs,cjs").to_hex();
        self.root
            .join(".mcp")
            .join("skeletons")
            .join(&path_hash[..16])
            .join(format!("{}-{}.json", mtime, &options_hash[..8]))
    }

    fn load_skeleton(&self, rel: &str, mtime: i64) -> Option<(Vec<Symbol>, String)> {
        if !self.skeleton_cache {
            return None;
        }
        let path = self.skeleton_path(rel, mtime);
        let raw = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    fn save_skeleton(&self, rel: &str, mtime: i64, symbols: &[Symbol], language: &str) {
        if !self.skeleton_cache {
            return;
        }
        let path = self.skeleton_path(rel, mtime);
        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return;
            }
        }
        if let Ok(json) = serde_json::to_string(&(symbols, language)) {
            let _ = std::fs::write(path, json);
        }
    }
}

/// Classic dynamic-programming edit distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a_len = a.chars().count();
    let b_len = b.chars().count();
    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut d = vec![vec![0usize; b_len + 1]; a_len + 1];
    for (i, row) in d.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, val) in d[0].iter_mut().enumerate() {
        *val = j;
    }
    for (i, ca) in a.chars().enumerate() {
        for (j, cb) in b.chars().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            d[i + 1][j + 1] = std::cmp::min(
                std::cmp::min(d[i][j + 1] + 1, d[i + 1][j] + 1),
                d[i][j] + cost,
            );
        }
    }
    d[a_len][b_len]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn index_at(root: &Path) -> SymbolIndex {
        let store = Rc::new(IndexStore::open(&root.join(".mcp/index.db")).unwrap());
        SymbolIndex::new(root, store)
    }

    #[test]
    fn parses_and_persists_on_first_access() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.ts"), "function alpha() {}\n").unwrap();

        let index = index_at(root);
        let symbols = index.get_symbols_for_file(&root.join("a.ts")).unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name(), "alpha");

        let record = index.store.get_file_record("a.ts").unwrap().unwrap();
        assert_eq!(record.language, "typescript");
    }

    #[test]
    fn reparses_only_when_mtime_changes() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let file = root.join("a.ts");
        fs::write(&file, "function alpha() {}\n").unwrap();

        let index = index_at(root);
        index.get_symbols_for_file(&file).unwrap();

        // Rewriting the content without bumping mtime keeps the cached parse.
        let mtime = mtime_ms(&file).unwrap();
        fs::write(&file, "function beta() {}\n").unwrap();
        let changed = mtime_ms(&file).unwrap() != mtime;
        let symbols = index.get_symbols_for_file(&file).unwrap();
        if changed {
            assert_eq!(symbols[0].name(), "beta");
        } else {
            assert_eq!(symbols[0].name(), "alpha");
        }
    }

    #[test]
    fn unsupported_extension_persists_empty() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("notes.md"), "# notes\n").unwrap();

        let index = index_at(root);
        let symbols = index.get_symbols_for_file(&root.join("notes.md")).unwrap();
        assert!(symbols.is_empty());
        assert!(index.store.get_file_record("notes.md").unwrap().is_some());
    }

    #[test]
    fn missing_file_drops_row() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let file = root.join("a.ts");
        fs::write(&file, "function alpha() {}\n").unwrap();

        let index = index_at(root);
        index.get_symbols_for_file(&file).unwrap();
        fs::remove_file(&file).unwrap();
        let symbols = index.get_symbols_for_file(&file).unwrap();
        assert!(symbols.is_empty());
        assert!(index.store.get_file_record("a.ts").unwrap().is_none());
    }

    #[test]
    fn exact_search_falls_back_to_fuzzy() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("auth.ts"), "function authenticate() {}\n").unwrap();

        let index = index_at(root);
        index.get_symbols_for_file(&root.join("auth.ts")).unwrap();

        // Substring hit through the LIKE tier.
        let hits = index.search("authent").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].symbol.name(), "authenticate");

        // Typo: one substitution, caught by the fuzzy tier.
        let hits = index.search("authentibate").unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score > 0.8);
    }

    #[test]
    fn fuzzy_boosts_exact_and_prefix() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(
            root.join("m.ts"),
            "function run() {}\nfunction runs() {}\n",
        )
        .unwrap();
        let index = index_at(root);
        index.get_symbols_for_file(&root.join("m.ts")).unwrap();

        let hits = index.fuzzy_search("run", 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].symbol.name(), "run"); // exact beats prefix
        assert_eq!(hits[0].score, 1.0);
        assert!(hits[1].score < 1.0);
    }

    #[test]
    fn debounce_batches_modifications() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let file = root.join("a.ts");
        fs::write(&file, "function alpha() {}\n").unwrap();

        let index = index_at(root);
        index.mark_file_modified(&file);
        assert!(index.has_pending());
        // Not yet due.
        assert!(index.flush_if_due().unwrap().is_empty());
        // Forced drain indexes the batch.
        let flushed = index.flush_pending().unwrap();
        assert_eq!(flushed, vec!["a.ts".to_string()]);
        assert!(!index.has_pending());
        assert!(index.store.get_file_record("a.ts").unwrap().is_some());
    }

    #[test]
    fn pending_path_for_deleted_file_is_dropped() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let file = root.join("a.ts");
        fs::write(&file, "function alpha() {}\n").unwrap();

        let index = index_at(root);
        index.get_symbols_for_file(&file).unwrap();
        fs::remove_file(&file).unwrap();
        index.mark_file_modified(&file);
        index.flush_pending().unwrap();
        assert!(index.store.get_file_record("a.ts").unwrap().is_none());
    }

    #[test]
    fn skeleton_cache_round_trips() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.ts"), "function alpha() {}\n").unwrap();

        let index = index_at(root).with_skeleton_cache(true);
        index.get_symbols_for_file(&root.join("a.ts")).unwrap();
        assert!(root.join(".mcp/skeletons").is_dir());

        let cached = index
            .load_skeleton("a.ts", mtime_ms(&root.join("a.ts")).unwrap())
            .unwrap();
        assert_eq!(cached.0.len(), 1);
        assert_eq!(cached.1, "typescript");
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }
}
