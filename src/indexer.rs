//! Engine wiring and the baseline scan.
//!
//! `Engine` owns the shared subsystems; `build_full_index` walks the
//! repository (gitignore-aware plus the baked-in skip set), indexes symbols,
//! rebuilds dependency edges, and feeds the trigram postings, pruning rows
//! for files that vanished.

use anyhow::{Context, Result};
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use log::{debug, info, warn};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

use crate::config::{Config, BAKED_IGNORES};
use crate::editor::EditorEngine;
use crate::graph::deps::DependencyGraph;
use crate::resolver::ModuleResolver;
use crate::search::engine::SearchEngine;
use crate::search::trigram::TrigramIndex;
use crate::store::IndexStore;
use crate::symbol_index::SymbolIndex;
use crate::util::{now_ms, to_abs_path, to_rel_path};

/// Progress information during indexing
#[derive(Debug, Clone)]
pub struct IndexProgress {
    /// Number of files indexed so far
    pub files_done: usize,
    /// Total number of files to index
    pub files_total: usize,
    /// Number of symbols found so far
    pub symbols_found: usize,
    /// Elapsed time in seconds
    pub elapsed_secs: f64,
    /// Files indexed per second (rolling average)
    pub files_per_sec: f64,
    /// Estimated seconds remaining (None if not enough data)
    pub eta_secs: Option<f64>,
    /// Current file being indexed (if any)
    pub current_file: Option<String>,
    /// Phase of indexing
    pub phase: IndexPhase,
}

/// Phase of the indexing process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPhase {
    /// Scanning directory for files to index
    Scanning,
    /// Parsing files and extracting symbols
    Parsing,
    /// Rebuilding dependency edges and trigram postings
    Resolving,
    /// Finalizing (prune, persist)
    Finalizing,
}

impl std::fmt::Display for IndexPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexPhase::Scanning => write!(f, "Scanning"),
            IndexPhase::Parsing => write!(f, "Parsing"),
            IndexPhase::Resolving => write!(f, "Resolving"),
            IndexPhase::Finalizing => write!(f, "Finalizing"),
        }
    }
}

/// Summary of indexing results
#[derive(Debug, Clone)]
pub struct IndexSummary {
    pub files_indexed: usize,
    pub symbols_found: usize,
    pub duration_secs: f64,
    pub files_per_sec: f64,
}

/// The wired engine: one instance per repository root.
pub struct Engine {
    root: PathBuf,
    config: Config,
    pub store: Rc<IndexStore>,
    pub symbols: Rc<SymbolIndex>,
    pub resolver: Rc<ModuleResolver>,
    pub graph: DependencyGraph,
    pub trigrams: RefCell<TrigramIndex>,
    pub search: SearchEngine,
    pub editor: EditorEngine,
}

impl Engine {
    pub fn open(root: &Path, db_path: &Path, config: Config) -> Result<Self> {
        let store = Rc::new(IndexStore::open(db_path)?);
        let symbols = Rc::new(
            SymbolIndex::new(root, store.clone())
                .with_parse_budget_ms(config.budgets.max_parse_time_ms),
        );
        let resolver = Rc::new(ModuleResolver::new(root));
        let graph = DependencyGraph::new(root, store.clone(), resolver.clone(), symbols.clone());
        let mut trigrams = TrigramIndex::new(&config.search);
        trigrams.load_postings(store.load_trigram_postings()?);
        let search = SearchEngine::new(root, store.clone(), config.clone());

        let editor_symbols = symbols.clone();
        let editor = EditorEngine::new(root, config.editor.clone(), config.budgets.clone())
            .with_invalidation(move |path| editor_symbols.mark_file_modified(path));

        Ok(Self {
            root: root.to_path_buf(),
            config,
            store,
            symbols,
            resolver,
            graph,
            trigrams: RefCell::new(trigrams),
            search,
            editor,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Reindex one path end to end: symbols, edges, trigram postings.
    pub fn reindex_file(&self, path: &Path) -> Result<()> {
        let rel = to_rel_path(&self.root, path);
        let abs = to_abs_path(&self.root, &rel);
        if abs.is_file() {
            self.symbols.get_symbols_for_file(&abs)?;
            self.graph.rebuild_file(&abs)?;
            if let Ok(content) = std::fs::read_to_string(&abs) {
                self.trigrams.borrow_mut().add_file(&rel, &content);
            }
        } else {
            self.symbols.get_symbols_for_file(&abs)?; // drops the row
            self.store.remove_file(&rel)?;
            self.trigrams.borrow_mut().remove_file(&rel);
        }
        Ok(())
    }

    /// Drain the symbol index's debounced pending set and propagate the
    /// batch through the dependency graph and trigram index.
    pub fn drain_pending(&self, force: bool) -> Result<Vec<String>> {
        let flushed = if force {
            self.symbols.flush_pending()?
        } else {
            self.symbols.flush_if_due()?
        };
        for rel in &flushed {
            let abs = to_abs_path(&self.root, rel);
            if abs.is_file() {
                self.graph.rebuild_file(&abs)?;
                if let Ok(content) = std::fs::read_to_string(&abs) {
                    self.trigrams.borrow_mut().add_file(rel, &content);
                }
            } else {
                self.trigrams.borrow_mut().remove_file(rel);
            }
        }
        if !flushed.is_empty() {
            self.persist_trigrams()?;
        }
        Ok(flushed)
    }

    pub fn persist_trigrams(&self) -> Result<()> {
        let postings = self.trigrams.borrow().to_postings();
        self.store.replace_trigram_postings(&postings)
    }
}

/// Collect every indexable file under the root, honoring gitignore rules,
/// the baked-in skip set, and user ignore patterns.
pub fn scan_files(root: &Path, config: &Config) -> Result<Vec<PathBuf>> {
    let mut overrides = OverrideBuilder::new(root);
    for pattern in &config.ignore_patterns {
        overrides
            .add(&format!("!{pattern}"))
            .with_context(|| format!("invalid ignore pattern {pattern}"))?;
    }
    let overrides = overrides.build()?;

    let mut walker = WalkBuilder::new(root);
    walker
        .hidden(false)
        .git_global(false)
        .git_exclude(false)
        .overrides(overrides)
        .filter_entry(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| !BAKED_IGNORES.contains(&name))
                .unwrap_or(true)
        });

    let mut files = Vec::new();
    for entry in walker.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("scan error: {err}");
                continue;
            }
        };
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Rebuild the index from scratch for a repository root.
///
/// If `progress_callback` is provided, it is called periodically with
/// progress updates.
pub fn build_full_index<F>(engine: &Engine, progress_callback: Option<F>) -> Result<IndexSummary>
where
    F: Fn(&IndexProgress),
{
    let root = engine.root().to_path_buf();
    info!("Starting full index at {}", root.display());
    let start_time = Instant::now();

    let report = |progress: IndexProgress| {
        if let Some(ref cb) = progress_callback {
            cb(&progress);
        }
    };

    report(IndexProgress {
        files_done: 0,
        files_total: 0,
        symbols_found: 0,
        elapsed_secs: 0.0,
        files_per_sec: 0.0,
        eta_secs: None,
        current_file: None,
        phase: IndexPhase::Scanning,
    });

    let files = scan_files(&root, engine.config())?;
    let files_total = files.len();
    info!("Found {files_total} files to index");

    let mut seen = std::collections::HashSet::new();
    let mut total_symbols = 0usize;

    for (i, path) in files.iter().enumerate() {
        let elapsed = start_time.elapsed().as_secs_f64();
        let files_per_sec = if elapsed > 0.0 { i as f64 / elapsed } else { 0.0 };
        let eta_secs = if files_per_sec > 0.0 {
            Some((files_total - i) as f64 / files_per_sec)
        } else {
            None
        };
        report(IndexProgress {
            files_done: i,
            files_total,
            symbols_found: total_symbols,
            elapsed_secs: elapsed,
            files_per_sec,
            eta_secs,
            current_file: Some(path.to_string_lossy().to_string()),
            phase: IndexPhase::Parsing,
        });

        let rel = to_rel_path(&root, path);
        match engine.symbols.get_symbols_for_file(path) {
            Ok(symbols) => {
                seen.insert(rel.clone());
                total_symbols += symbols.len();
            }
            Err(err) => {
                warn!("indexing failed for {rel}: {err:#}");
                continue;
            }
        }
        if let Err(err) = engine.graph.rebuild_file(path) {
            warn!("dependency rebuild failed for {rel}: {err:#}");
        }
        if let Ok(content) = std::fs::read_to_string(path) {
            engine.trigrams.borrow_mut().add_file(&rel, &content);
        }
    }

    report(IndexProgress {
        files_done: files_total,
        files_total,
        symbols_found: total_symbols,
        elapsed_secs: start_time.elapsed().as_secs_f64(),
        files_per_sec: files_total as f64 / start_time.elapsed().as_secs_f64().max(0.001),
        eta_secs: None,
        current_file: None,
        phase: IndexPhase::Resolving,
    });

    // Prune rows for files that no longer exist on disk.
    let known = engine.store.list_paths()?;
    for path in known.difference(&seen) {
        engine.store.remove_file(path)?;
        engine.trigrams.borrow_mut().remove_file(path);
        debug!("Pruned deleted file {path}");
    }

    report(IndexProgress {
        files_done: files_total,
        files_total,
        symbols_found: total_symbols,
        elapsed_secs: start_time.elapsed().as_secs_f64(),
        files_per_sec: files_total as f64 / start_time.elapsed().as_secs_f64().max(0.001),
        eta_secs: None,
        current_file: None,
        phase: IndexPhase::Finalizing,
    });

    engine.persist_trigrams()?;
    engine
        .store
        .set_metadata("last_built_ms", &now_ms().to_string())?;

    let duration_secs = start_time.elapsed().as_secs_f64();
    let files_per_sec = files_total as f64 / duration_secs.max(0.001);
    info!(
        "Full index complete: {files_total} files, {total_symbols} symbols in {duration_secs:.1}s ({files_per_sec:.1} files/sec). DB at {}",
        engine.store.db_path().display()
    );

    Ok(IndexSummary {
        files_indexed: files_total,
        symbols_found: total_symbols,
        duration_secs,
        files_per_sec,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Direction;
    use std::fs;
    use tempfile::tempdir;

    fn engine_at(root: &Path) -> Engine {
        Engine::open(root, &root.join(".mcp/index.db"), Config::default()).unwrap()
    }

    #[test]
    fn full_index_covers_symbols_deps_and_trigrams() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(
            root.join("src/a.ts"),
            "import { b } from \"./b\";\nexport function a() { b(); }\n",
        )
        .unwrap();
        fs::write(root.join("src/b.ts"), "export function b() {}\n").unwrap();

        let engine = engine_at(root);
        let summary = build_full_index(&engine, None::<fn(&IndexProgress)>).unwrap();
        assert_eq!(summary.files_indexed, 2);
        assert!(summary.symbols_found >= 3);

        let edges = engine
            .graph
            .get_dependencies(Path::new("src/a.ts"), Direction::Downstream)
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target, "src/b.ts");

        let hits = engine.trigrams.borrow().candidates("function").unwrap();
        assert_eq!(hits.len(), 2);
        // Postings were persisted.
        assert!(!engine.store.load_trigram_postings().unwrap().is_empty());
    }

    #[test]
    fn baked_ignores_are_skipped() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), "x\n").unwrap();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/a.ts"), "export const a = 1;\n").unwrap();

        let files = scan_files(root, &Config::default()).unwrap();
        assert!(files.iter().all(|f| !f.to_string_lossy().contains("node_modules")));
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn user_ignore_patterns_apply() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("generated")).unwrap();
        fs::write(root.join("generated/api.ts"), "export const x = 1;\n").unwrap();
        fs::write(root.join("main.ts"), "export const y = 1;\n").unwrap();

        let config = Config {
            ignore_patterns: vec!["generated/".to_string()],
            ..Config::default()
        };
        let files = scan_files(root, &config).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("main.ts"));
    }

    #[test]
    fn rerun_prunes_deleted_files() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.ts"), "export const a = 1;\n").unwrap();
        fs::write(root.join("b.ts"), "export const b = 1;\n").unwrap();

        let engine = engine_at(root);
        build_full_index(&engine, None::<fn(&IndexProgress)>).unwrap();
        assert_eq!(engine.store.counts().unwrap().files, 2);

        fs::remove_file(root.join("b.ts")).unwrap();
        build_full_index(&engine, None::<fn(&IndexProgress)>).unwrap();
        assert_eq!(engine.store.counts().unwrap().files, 1);
        assert!(engine.store.get_file_record("b.ts").unwrap().is_none());
    }

    #[test]
    fn editor_writes_feed_the_pending_set() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.ts"), "export const a = 1;\n").unwrap();
        let engine = engine_at(root);
        build_full_index(&engine, None::<fn(&IndexProgress)>).unwrap();

        let result = engine
            .editor
            .apply_edits(
                &root.join("a.ts"),
                &[crate::editor::Edit::replace("a = 1", "a = 2")],
                &crate::editor::ApplyOptions::default(),
            )
            .unwrap();
        assert!(result.success);
        assert!(engine.symbols.has_pending());
        let flushed = engine.drain_pending(true).unwrap();
        assert_eq!(flushed, vec!["a.ts".to_string()]);
    }
}
