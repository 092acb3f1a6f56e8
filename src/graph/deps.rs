//! File-to-file dependency graph.
//!
//! Edges are derived from each file's import symbols through the module
//! resolver and replaced atomically per file. The reverse index is keyed by
//! normalized relative path, like everything else in the store.

use anyhow::Result;
use log::debug;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::graph::Direction;
use crate::resolver::ModuleResolver;
use crate::store::{DependencyEdge, EdgeMetadata, IndexStore, UnresolvedImport};
use crate::symbol::{Import, ImportKind, Symbol};
use crate::symbol_index::SymbolIndex;
use crate::util::{mtime_ms, now_ms, to_abs_path, to_rel_path};
use crate::workspace;

/// Default BFS depth bound for transitive queries.
pub const MAX_TRANSITIVE_DEPTH: usize = 20;

/// An index older than this is demoted one confidence tier.
const STALE_AFTER_MS: i64 = 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    fn demote(self) -> Self {
        match self {
            Confidence::High => Confidence::Medium,
            Confidence::Medium | Confidence::Low => Confidence::Low,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatus {
    pub total_files: usize,
    pub total_edges: usize,
    pub unresolved_imports: usize,
    pub files_with_unresolved: usize,
    pub unresolved_ratio: f64,
    pub confidence: Confidence,
    /// Advisory only; behavior never branches on it.
    pub is_monorepo: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_built_ms: Option<i64>,
    pub stale: bool,
}

pub struct DependencyGraph {
    root: PathBuf,
    store: Rc<IndexStore>,
    resolver: Rc<ModuleResolver>,
    symbols: Rc<SymbolIndex>,
}

impl DependencyGraph {
    pub fn new(
        root: &Path,
        store: Rc<IndexStore>,
        resolver: Rc<ModuleResolver>,
        symbols: Rc<SymbolIndex>,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            store,
            resolver,
            symbols,
        }
    }

    pub fn resolver(&self) -> &Rc<ModuleResolver> {
        &self.resolver
    }

    /// Re-derive a file's outgoing edges from its current import symbols.
    /// Builtins and external packages are skipped; everything else that fails
    /// to resolve is recorded as unresolved.
    pub fn rebuild_file(&self, path: &Path) -> Result<()> {
        let rel = to_rel_path(&self.root, path);
        let abs = to_abs_path(&self.root, &rel);
        let symbols = self.symbols.get_symbols_for_file(&abs)?;

        let mut outgoing = Vec::new();
        let mut unresolved = Vec::new();
        for symbol in symbols.iter() {
            let Symbol::Import(import) = symbol else {
                continue;
            };
            self.resolve_import(&rel, &abs, import, &mut outgoing, &mut unresolved);
        }

        let mtime = mtime_ms(&abs).unwrap_or_else(now_ms);
        self.store
            .replace_dependencies(&rel, mtime, &outgoing, &unresolved)?;
        debug!(
            "dependencies rebuilt for {rel}: {} edges, {} unresolved",
            outgoing.len(),
            unresolved.len()
        );
        Ok(())
    }

    fn resolve_import(
        &self,
        rel: &str,
        abs: &Path,
        import: &Import,
        outgoing: &mut Vec<DependencyEdge>,
        unresolved: &mut Vec<UnresolvedImport>,
    ) {
        let result = self.resolver.resolve_detailed(abs, &import.source);
        if result.core || result.external {
            return;
        }
        let metadata = EdgeMetadata {
            what: import_what(import),
            line: import.line,
            specifier: import.source.clone(),
            strategy: result.strategy.as_str().to_string(),
        };
        match result.resolved_path {
            Some(target_abs) if target_abs.starts_with(&self.root) => {
                outgoing.push(DependencyEdge {
                    source: rel.to_string(),
                    target: to_rel_path(&self.root, &target_abs),
                    kind: import_kind_str(import.kind).to_string(),
                    metadata,
                });
            }
            Some(target_abs) => {
                unresolved.push(UnresolvedImport {
                    specifier: import.source.clone(),
                    error: format!(
                        "resolved outside repository root: {}",
                        target_abs.display()
                    ),
                    metadata,
                });
            }
            None => {
                unresolved.push(UnresolvedImport {
                    specifier: import.source.clone(),
                    error: result
                        .error
                        .unwrap_or_else(|| "resolution failed".to_string()),
                    metadata: EdgeMetadata {
                        strategy: "unresolved".to_string(),
                        ..metadata
                    },
                });
            }
        }
    }

    // ==================== Queries ====================

    /// Edges touching a file. Absolute paths in yield absolute paths out.
    pub fn get_dependencies(&self, path: &Path, direction: Direction) -> Result<Vec<DependencyEdge>> {
        let rel = to_rel_path(&self.root, path);
        let mut edges = Vec::new();
        if matches!(direction, Direction::Downstream | Direction::Both) {
            edges.extend(self.store.dependencies_from(&rel)?);
        }
        if matches!(direction, Direction::Upstream | Direction::Both) {
            edges.extend(self.store.dependencies_to(&rel)?);
        }
        if path.is_absolute() {
            for edge in &mut edges {
                edge.source = to_abs_path(&self.root, &edge.source)
                    .to_string_lossy()
                    .into_owned();
                edge.target = to_abs_path(&self.root, &edge.target)
                    .to_string_lossy()
                    .into_owned();
            }
        }
        Ok(edges)
    }

    /// Depth-limited BFS over the outgoing (or incoming) relation. Returns
    /// the set of reachable relative paths, excluding the start.
    pub fn get_transitive_dependencies(
        &self,
        path: &Path,
        direction: Direction,
        max_depth: usize,
    ) -> Result<Vec<String>> {
        let start = to_rel_path(&self.root, path);
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        queue.push_back((start.clone(), 0));
        visited.insert(start.clone());

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let mut neighbors = Vec::new();
            if matches!(direction, Direction::Downstream | Direction::Both) {
                neighbors.extend(
                    self.store
                        .dependencies_from(&current)?
                        .into_iter()
                        .map(|e| e.target),
                );
            }
            if matches!(direction, Direction::Upstream | Direction::Both) {
                neighbors.extend(
                    self.store
                        .dependencies_to(&current)?
                        .into_iter()
                        .map(|e| e.source),
                );
            }
            for next in neighbors {
                if visited.insert(next.clone()) {
                    queue.push_back((next, depth + 1));
                }
            }
        }

        visited.remove(&start);
        let mut out: Vec<String> = visited.into_iter().collect();
        out.sort();
        Ok(out)
    }

    /// Files importing the given one (direct upstream edges).
    pub fn get_importers(&self, path: &Path) -> Result<Vec<String>> {
        let rel = to_rel_path(&self.root, path);
        let mut importers: Vec<String> = self
            .store
            .dependencies_to(&rel)?
            .into_iter()
            .map(|e| e.source)
            .collect();
        importers.sort();
        importers.dedup();
        Ok(importers)
    }

    pub fn get_index_status(&self) -> Result<IndexStatus> {
        let counts = self.store.counts()?;
        let ratio = if counts.files == 0 {
            0.0
        } else {
            counts.files_with_unresolved as f64 / counts.files as f64
        };
        let mut confidence = if counts.files_with_unresolved == 0 {
            Confidence::High
        } else if ratio < 0.25 {
            Confidence::Medium
        } else {
            Confidence::Low
        };
        let last_built_ms = self
            .store
            .get_metadata("last_built_ms")?
            .and_then(|v| v.parse::<i64>().ok());
        let stale = last_built_ms
            .map(|built| now_ms() - built > STALE_AFTER_MS)
            .unwrap_or(true);
        if stale {
            confidence = confidence.demote();
        }
        Ok(IndexStatus {
            total_files: counts.files,
            total_edges: counts.edges,
            unresolved_imports: counts.unresolved,
            files_with_unresolved: counts.files_with_unresolved,
            unresolved_ratio: ratio,
            confidence,
            is_monorepo: workspace::detect_monorepo(&self.root),
            last_built_ms,
            stale,
        })
    }

    // ==================== Invalidation ====================

    /// Drop a file's edges; symbols are invalidated by the symbol index.
    pub fn invalidate_file(&self, path: &Path) -> Result<()> {
        let rel = to_rel_path(&self.root, path);
        self.store.clear_dependencies(&rel)
    }

    /// Drop every indexed entry under a directory prefix.
    pub fn invalidate_directory(&self, path: &Path) -> Result<()> {
        let rel = to_rel_path(&self.root, path);
        self.store.remove_prefix(&rel)
    }

    /// Retry resolution for every file that still has unresolved imports.
    /// Cached failures are dropped first so the retry actually re-probes.
    pub fn rebuild_unresolved(&self) -> Result<usize> {
        let paths = self.store.paths_with_unresolved()?;
        if paths.is_empty() {
            return Ok(0);
        }
        self.resolver.clear_caches();
        let count = paths.len();
        for rel in paths {
            let abs = to_abs_path(&self.root, &rel);
            self.rebuild_file(&abs)?;
        }
        Ok(count)
    }
}

fn import_kind_str(kind: ImportKind) -> &'static str {
    match kind {
        ImportKind::Named => "named",
        ImportKind::Default => "default",
        ImportKind::Namespace => "namespace",
        ImportKind::SideEffect => "side-effect",
    }
}

fn import_what(import: &Import) -> String {
    match import.kind {
        ImportKind::Namespace => "*".to_string(),
        ImportKind::Default => import.alias.clone().unwrap_or_else(|| "default".into()),
        ImportKind::SideEffect => String::new(),
        ImportKind::Named => import
            .names
            .iter()
            .map(|n| n.local().to_string())
            .collect::<Vec<_>>()
            .join(","),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        graph: DependencyGraph,
    }

    fn fixture(files: &[(&str, &str)]) -> Fixture {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        for (rel, content) in files {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let store = Rc::new(IndexStore::open(&root.join(".mcp/index.db")).unwrap());
        let resolver = Rc::new(ModuleResolver::new(&root));
        let symbols = Rc::new(SymbolIndex::new(&root, store.clone()));
        let graph = DependencyGraph::new(&root, store, resolver, symbols);
        Fixture {
            _dir: dir,
            root,
            graph,
        }
    }

    fn rebuild_all(f: &Fixture, rels: &[&str]) {
        for rel in rels {
            f.graph.rebuild_file(&f.root.join(rel)).unwrap();
        }
    }

    #[test]
    fn builds_edges_for_resolved_imports() {
        let f = fixture(&[
            ("a.ts", "import { b } from \"./b\";\n"),
            ("b.ts", "export const b = 1;\n"),
        ]);
        rebuild_all(&f, &["a.ts", "b.ts"]);

        let edges = f
            .graph
            .get_dependencies(Path::new("a.ts"), Direction::Downstream)
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target, "b.ts");
        assert_eq!(edges[0].kind, "named");
        assert_eq!(edges[0].metadata.what, "b");
        assert_eq!(edges[0].metadata.strategy, "relative");
    }

    #[test]
    fn absolute_path_in_yields_absolute_out() {
        let f = fixture(&[
            ("a.ts", "import { b } from \"./b\";\n"),
            ("b.ts", "export const b = 1;\n"),
        ]);
        rebuild_all(&f, &["a.ts"]);

        let edges = f
            .graph
            .get_dependencies(&f.root.join("a.ts"), Direction::Downstream)
            .unwrap();
        assert!(Path::new(&edges[0].target).is_absolute());
    }

    #[test]
    fn unresolvable_import_recorded_not_raised() {
        let f = fixture(&[("a.ts", "import { x } from \"./ghost\";\n")]);
        rebuild_all(&f, &["a.ts"]);

        let unresolved = f.graph.store.unresolved_for("a.ts").unwrap();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].specifier, "./ghost");
        assert_eq!(unresolved[0].metadata.strategy, "unresolved");
        assert!(f
            .graph
            .get_dependencies(Path::new("a.ts"), Direction::Downstream)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn builtins_and_externals_are_skipped() {
        let f = fixture(&[(
            "a.ts",
            "import * as fs from \"fs\";\nimport _ from \"lodash\";\n",
        )]);
        fs::create_dir_all(f.root.join("node_modules/lodash")).unwrap();
        rebuild_all(&f, &["a.ts"]);

        assert!(f
            .graph
            .get_dependencies(Path::new("a.ts"), Direction::Downstream)
            .unwrap()
            .is_empty());
        assert!(f.graph.store.unresolved_for("a.ts").unwrap().is_empty());
    }

    #[test]
    fn transitive_bfs_excludes_start() {
        let f = fixture(&[
            ("a.ts", "import { b } from \"./b\";\n"),
            ("b.ts", "import { c } from \"./c\";\nexport const b = 1;\n"),
            ("c.ts", "export const c = 1;\n"),
        ]);
        rebuild_all(&f, &["a.ts", "b.ts", "c.ts"]);

        let reachable = f
            .graph
            .get_transitive_dependencies(Path::new("a.ts"), Direction::Downstream, 20)
            .unwrap();
        assert_eq!(reachable, vec!["b.ts".to_string(), "c.ts".to_string()]);
    }

    #[test]
    fn transitive_bfs_respects_depth_and_cycles() {
        let f = fixture(&[
            ("a.ts", "import { b } from \"./b\";\n"),
            ("b.ts", "import { c } from \"./c\";\nexport const b = 1;\n"),
            ("c.ts", "import { a } from \"./a\";\nexport const c = 1;\n"),
        ]);
        rebuild_all(&f, &["a.ts", "b.ts", "c.ts"]);

        let shallow = f
            .graph
            .get_transitive_dependencies(Path::new("a.ts"), Direction::Downstream, 1)
            .unwrap();
        assert_eq!(shallow, vec!["b.ts".to_string()]);

        // The a -> b -> c -> a cycle terminates via the visited set.
        let full = f
            .graph
            .get_transitive_dependencies(Path::new("a.ts"), Direction::Downstream, 20)
            .unwrap();
        assert_eq!(full, vec!["b.ts".to_string(), "c.ts".to_string()]);
    }

    #[test]
    fn importers_come_from_the_reverse_index() {
        let f = fixture(&[
            ("a.ts", "import { c } from \"./c\";\n"),
            ("b.ts", "import { c } from \"./c\";\n"),
            ("c.ts", "export const c = 1;\n"),
        ]);
        rebuild_all(&f, &["a.ts", "b.ts", "c.ts"]);

        let importers = f.graph.get_importers(Path::new("c.ts")).unwrap();
        assert_eq!(importers, vec!["a.ts".to_string(), "b.ts".to_string()]);
    }

    #[test]
    fn status_reports_confidence_tiers() {
        let f = fixture(&[
            ("a.ts", "import { b } from \"./b\";\n"),
            ("b.ts", "export const b = 1;\n"),
        ]);
        rebuild_all(&f, &["a.ts", "b.ts"]);
        f.graph
            .store
            .set_metadata("last_built_ms", &now_ms().to_string())
            .unwrap();

        let status = f.graph.get_index_status().unwrap();
        assert_eq!(status.confidence, Confidence::High);
        assert!(!status.stale);
        assert_eq!(status.total_files, 2);
        assert_eq!(status.total_edges, 1);

        // A stale index demotes one tier.
        f.graph
            .store
            .set_metadata("last_built_ms", &(now_ms() - 2 * 60 * 60 * 1000).to_string())
            .unwrap();
        let status = f.graph.get_index_status().unwrap();
        assert_eq!(status.confidence, Confidence::Medium);
        assert!(status.stale);
    }

    #[test]
    fn rebuild_unresolved_retries_after_file_appears() {
        let f = fixture(&[("a.ts", "import { b } from \"./b\";\n")]);
        rebuild_all(&f, &["a.ts"]);
        assert_eq!(f.graph.store.paths_with_unresolved().unwrap().len(), 1);

        // The missing module appears; the retry busts the cached failure.
        fs::write(f.root.join("b.ts"), "export const b = 1;\n").unwrap();
        let retried = f.graph.rebuild_unresolved().unwrap();
        assert_eq!(retried, 1);
        assert!(f.graph.store.paths_with_unresolved().unwrap().is_empty());
        assert_eq!(
            f.graph
                .get_dependencies(Path::new("a.ts"), Direction::Downstream)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn invalidate_directory_clears_by_prefix() {
        let f = fixture(&[
            ("src/a.ts", "import { b } from \"./b\";\n"),
            ("src/b.ts", "export const b = 1;\n"),
            ("lib/c.ts", "export const c = 1;\n"),
        ]);
        rebuild_all(&f, &["src/a.ts", "src/b.ts", "lib/c.ts"]);

        f.graph.invalidate_directory(&f.root.join("src")).unwrap();
        assert!(f.graph.store.get_file_record("src/a.ts").unwrap().is_none());
        assert!(f.graph.store.get_file_record("lib/c.ts").unwrap().is_some());
        assert!(f
            .graph
            .get_dependencies(Path::new("src/a.ts"), Direction::Downstream)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn invalidate_file_clears_edges_only() {
        let f = fixture(&[
            ("a.ts", "import { b } from \"./b\";\n"),
            ("b.ts", "export const b = 1;\n"),
        ]);
        rebuild_all(&f, &["a.ts"]);
        f.graph.invalidate_file(Path::new("a.ts")).unwrap();
        assert!(f
            .graph
            .get_dependencies(Path::new("a.ts"), Direction::Downstream)
            .unwrap()
            .is_empty());
        // Symbols survive; only the edges were dropped.
        assert!(f.graph.store.get_symbols("a.ts").unwrap().is_some());
    }
}
