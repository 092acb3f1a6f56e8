//! Symbol-level call graph.
//!
//! Nodes are `relative/path.ts::name` ids; edges carry the syntactic call
//! type plus a confidence tier. Expansion is BFS with a depth bound, over a
//! snapshot of the symbol index:
//!
//! - downstream targets resolve local-first, then through the file's import
//!   bindings, then through a global name fallback;
//! - upstream candidates come from a process-wide callee index and are kept
//!   only when re-resolution lands on the current definition.

use anyhow::Result;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::rc::Rc;

use crate::graph::Direction;
use crate::resolver::ModuleResolver;
use crate::symbol::{CallSite, CallType, Definition, Import, ImportKind, Symbol};
use crate::symbol_index::SymbolIndex;
use crate::util::{to_rel_path, to_abs_path};

/// Call-graph confidence tiers, strictly ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallConfidence {
    Definite,
    Possible,
    Inferred,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CallEdge {
    pub from: String,
    pub to: String,
    pub call_type: CallType,
    pub confidence: CallConfidence,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallNode {
    pub id: String,
    pub name: String,
    pub file_path: String,
    pub line: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallGraph {
    pub root: String,
    pub nodes: HashMap<String, CallNode>,
    pub edges: Vec<CallEdge>,
    /// Set when depth or a missing context prevented full expansion.
    pub truncated: bool,
}

/// Snapshot-based builder. Construction walks the cold store once; analyze
/// calls reuse the snapshot.
pub struct CallGraphBuilder {
    resolver: Rc<ModuleResolver>,
    defs_by_file: HashMap<String, Vec<Definition>>,
    defs_by_name: HashMap<String, Vec<(String, Definition)>>,
    imports_by_file: HashMap<String, Vec<Import>>,
    /// Process-wide callee index: callee name -> (file, caller name, site).
    callee_index: HashMap<String, Vec<(String, String, CallSite)>>,
}

impl CallGraphBuilder {
    pub fn new(symbols: &SymbolIndex, resolver: Rc<ModuleResolver>) -> Result<Self> {
        let mut defs_by_file: HashMap<String, Vec<Definition>> = HashMap::new();
        let mut defs_by_name: HashMap<String, Vec<(String, Definition)>> = HashMap::new();
        let mut imports_by_file: HashMap<String, Vec<Import>> = HashMap::new();
        let mut callee_index: HashMap<String, Vec<(String, String, CallSite)>> = HashMap::new();

        for (path, symbols) in symbols.get_all_symbols()? {
            for symbol in symbols {
                match symbol {
                    Symbol::Definition(def) => {
                        for call in &def.calls {
                            callee_index.entry(call.callee.clone()).or_default().push((
                                path.clone(),
                                def.name.clone(),
                                call.clone(),
                            ));
                        }
                        defs_by_name
                            .entry(def.name.clone())
                            .or_default()
                            .push((path.clone(), def.clone()));
                        defs_by_file.entry(path.clone()).or_default().push(def);
                    }
                    Symbol::Import(import) => {
                        imports_by_file.entry(path.clone()).or_default().push(import);
                    }
                    Symbol::Export(_) => {}
                }
            }
        }

        Ok(Self {
            resolver,
            defs_by_file,
            defs_by_name,
            imports_by_file,
            callee_index,
        })
    }

    /// Analyze a symbol's call relationships up to `max_depth` edges away.
    pub fn analyze(
        &self,
        symbol_name: &str,
        file_path: &Path,
        direction: Direction,
        max_depth: usize,
    ) -> Result<CallGraph> {
        let root_rel = to_rel_path(self.resolver.root(), file_path);
        let root_id = crate::symbol::symbol_id(&root_rel, symbol_name);

        let mut graph = CallGraph {
            root: root_id.clone(),
            nodes: HashMap::new(),
            edges: Vec::new(),
            truncated: false,
        };
        let Some(root_def) = self.find_def(&root_rel, symbol_name) else {
            graph.truncated = true;
            return Ok(graph);
        };
        self.add_node(&mut graph, &root_rel, root_def);

        let mut seen_edges: HashSet<(String, String, usize, usize, CallType)> = HashSet::new();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(root_id.clone());
        let mut queue: VecDeque<(String, String, usize)> = VecDeque::new();
        queue.push_back((root_rel.clone(), symbol_name.to_string(), 0));

        while let Some((file, name, depth)) = queue.pop_front() {
            let Some(def) = self.find_def(&file, &name) else {
                continue;
            };
            let at_limit = depth >= max_depth;

            if matches!(direction, Direction::Downstream | Direction::Both) {
                if at_limit {
                    if !def.calls.is_empty() {
                        graph.truncated = true;
                    }
                } else {
                    for call in &def.calls {
                        let targets = self.resolve_call_targets(&file, call, &mut graph.truncated);
                        for (target_file, target_def, confidence) in targets {
                            self.link(
                                &mut graph,
                                &mut seen_edges,
                                &file,
                                &name,
                                &target_file,
                                &target_def,
                                call,
                                confidence,
                            );
                            let target_id =
                                crate::symbol::symbol_id(&target_file, &target_def.name);
                            if visited.insert(target_id) {
                                queue.push_back((target_file, target_def.name.clone(), depth + 1));
                            }
                        }
                    }
                }
            }

            if matches!(direction, Direction::Upstream | Direction::Both) {
                let callers = self.find_callers(&file, def);
                if at_limit {
                    if !callers.is_empty() {
                        graph.truncated = true;
                    }
                } else {
                    for (caller_file, caller_name, call, confidence) in callers {
                        let Some(caller_def) = self.find_def(&caller_file, &caller_name) else {
                            continue;
                        };
                        self.link(
                            &mut graph,
                            &mut seen_edges,
                            &caller_file,
                            &caller_name,
                            &file,
                            def,
                            &call,
                            confidence,
                        );
                        self.add_node(&mut graph, &caller_file, caller_def);
                        let caller_id = crate::symbol::symbol_id(&caller_file, &caller_name);
                        if visited.insert(caller_id) {
                            queue.push_back((caller_file, caller_name, depth + 1));
                        }
                    }
                }
            }
        }

        Ok(graph)
    }

    #[allow(clippy::too_many_arguments)]
    fn link(
        &self,
        graph: &mut CallGraph,
        seen: &mut HashSet<(String, String, usize, usize, CallType)>,
        from_file: &str,
        from_name: &str,
        to_file: &str,
        to_def: &Definition,
        call: &CallSite,
        confidence: CallConfidence,
    ) {
        let from = crate::symbol::symbol_id(from_file, from_name);
        let to = crate::symbol::symbol_id(to_file, &to_def.name);
        if !seen.insert((
            from.clone(),
            to.clone(),
            call.line,
            call.column,
            call.call_type,
        )) {
            return;
        }
        self.add_node(graph, to_file, to_def);
        graph.edges.push(CallEdge {
            from,
            to,
            call_type: call.call_type,
            confidence,
            line: call.line,
            column: call.column,
        });
    }

    fn add_node(&self, graph: &mut CallGraph, file: &str, def: &Definition) {
        let id = crate::symbol::symbol_id(file, &def.name);
        graph.nodes.entry(id.clone()).or_insert_with(|| CallNode {
            id,
            name: def.name.clone(),
            file_path: file.to_string(),
            line: def.start_line,
        });
    }

    fn find_def(&self, file: &str, name: &str) -> Option<&Definition> {
        self.defs_by_file
            .get(file)?
            .iter()
            .find(|d| d.name == name)
    }

    /// Resolve a call site to candidate target definitions.
    fn resolve_call_targets(
        &self,
        file: &str,
        call: &CallSite,
        truncated: &mut bool,
    ) -> Vec<(String, Definition, CallConfidence)> {
        let receiver_is_local = call
            .callee_object
            .as_deref()
            .map(|o| matches!(o, "this" | "super" | "self"))
            .unwrap_or(true);

        // 1. Local definition in the same file.
        if receiver_is_local {
            if let Some(def) = self.find_def(file, &call.callee) {
                return vec![(file.to_string(), def.clone(), CallConfidence::Definite)];
            }
        }

        // 2. Imported binding.
        if let Some(imports) = self.imports_by_file.get(file) {
            for import in imports {
                let (matched, confidence) = match (import.kind, call.callee_object.as_deref()) {
                    (ImportKind::Namespace, Some(object)) => (
                        import.alias.as_deref() == Some(object),
                        CallConfidence::Possible,
                    ),
                    (ImportKind::Named, None) => (
                        import.names.iter().any(|n| n.local() == call.callee),
                        CallConfidence::Definite,
                    ),
                    (ImportKind::Default, None) => (
                        import.alias.as_deref() == Some(call.callee.as_str()),
                        CallConfidence::Possible,
                    ),
                    _ => (false, CallConfidence::Possible),
                };
                if !matched {
                    continue;
                }
                let context = to_abs_path(self.resolver.root(), file);
                let result = self.resolver.resolve_detailed(&context, &import.source);
                let Some(target_abs) = result.resolved_path else {
                    // Import context exists but cannot be followed.
                    *truncated = true;
                    continue;
                };
                let target_rel = to_rel_path(self.resolver.root(), &target_abs);
                let target_name = match import.kind {
                    // Named imports may alias; follow the original name.
                    ImportKind::Named => import
                        .names
                        .iter()
                        .find(|n| n.local() == call.callee)
                        .map(|n| n.name.clone())
                        .unwrap_or_else(|| call.callee.clone()),
                    _ => call.callee.clone(),
                };
                if let Some(def) = self.find_def(&target_rel, &target_name) {
                    return vec![(target_rel, def.clone(), confidence)];
                }
            }
        }

        // 3. Global fallback: every definition with that name.
        self.defs_by_name
            .get(&call.callee)
            .map(|defs| {
                defs.iter()
                    .map(|(f, d)| (f.clone(), d.clone(), CallConfidence::Inferred))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Callers whose re-resolved call site lands on the given definition.
    fn find_callers(
        &self,
        file: &str,
        def: &Definition,
    ) -> Vec<(String, String, CallSite, CallConfidence)> {
        let mut out = Vec::new();
        let Some(candidates) = self.callee_index.get(&def.name) else {
            return out;
        };
        for (caller_file, caller_name, call) in candidates {
            let mut ignored = false;
            let targets = self.resolve_call_targets(caller_file, call, &mut ignored);
            for (target_file, target_def, confidence) in targets {
                if target_file == file && target_def.name == def.name {
                    out.push((
                        caller_file.clone(),
                        caller_name.clone(),
                        call.clone(),
                        confidence,
                    ));
                    break;
                }
            }
        }
        out
    }
}
