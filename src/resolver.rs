//! Import specifier resolution.
//!
//! Resolves an import specifier in the context of a source file through a
//! strategy ladder: relative, absolute, path-alias, node-style, and an
//! opt-in bundler fallback. Results are cached by `(context, specifier)`;
//! file- and directory-existence checks are cached separately.
//!
//! Runtime builtins report `core = true` and node-package resolutions report
//! `external = true`; the dependency graph ignores both.

use log::debug;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::util::normalize_path;

/// Extension probe order: typed source first, then runtime source, then data.
pub const EXTENSIONS: &[&str] = &["ts", "tsx", "d.ts", "js", "jsx", "json"];

/// Workspace layouts scanned for member tsconfig files.
const WORKSPACE_GLOBS: &[&str] = &["packages", "apps", "libs", "services"];

static CORE_MODULES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "assert", "buffer", "child_process", "cluster", "console", "constants", "crypto",
        "dgram", "dns", "domain", "events", "fs", "http", "http2", "https", "module", "net",
        "os", "path", "perf_hooks", "process", "punycode", "querystring", "readline", "repl",
        "stream", "string_decoder", "timers", "tls", "tty", "url", "util", "v8", "vm",
        "worker_threads", "zlib",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Relative,
    Absolute,
    Alias,
    Node,
    Bundler,
    Unresolved,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Relative => "relative",
            Strategy::Absolute => "absolute",
            Strategy::Alias => "alias",
            Strategy::Node => "node",
            Strategy::Bundler => "bundler",
            Strategy::Unresolved => "unresolved",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolutionResult {
    pub resolved_path: Option<PathBuf>,
    pub strategy: Strategy,
    /// Candidate paths probed, in order, for diagnostics.
    pub attempts: Vec<String>,
    pub error: Option<String>,
    /// Language-runtime builtin (`fs`, `node:path`, ...).
    pub core: bool,
    /// Resolves into a node package rather than repository source.
    pub external: bool,
}

impl ResolutionResult {
    fn unresolved(attempts: Vec<String>, error: String) -> Self {
        Self {
            resolved_path: None,
            strategy: Strategy::Unresolved,
            attempts,
            error: Some(error),
            core: false,
            external: false,
        }
    }
}

/// A compiled `paths` mapping: `@/*` becomes prefix `@/` + empty suffix, and
/// each target keeps its own `*` substitution point.
#[derive(Debug, Clone)]
struct CompiledAlias {
    prefix: String,
    suffix: String,
    /// Absolute target templates, `*` marking the substitution point.
    targets: Vec<String>,
}

impl CompiledAlias {
    fn matches(&self, specifier: &str) -> Option<String> {
        let rest = specifier.strip_prefix(&self.prefix)?;
        let captured = rest.strip_suffix(&self.suffix)?;
        Some(captured.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct TsConfig {
    #[serde(rename = "compilerOptions")]
    compiler_options: Option<CompilerOptions>,
}

#[derive(Debug, Deserialize)]
struct CompilerOptions {
    #[serde(rename = "baseUrl")]
    base_url: Option<String>,
    paths: Option<HashMap<String, Vec<String>>>,
}

pub struct ModuleResolver {
    root: PathBuf,
    aliases: Vec<CompiledAlias>,
    /// Base directories of discovered tsconfig files, for the bundler ladder.
    alias_bases: Vec<PathBuf>,
    bundler_fallback: bool,
    resolution_cache: RefCell<HashMap<(String, String), ResolutionResult>>,
    exists_cache: RefCell<HashMap<PathBuf, bool>>,
    dir_cache: RefCell<HashMap<PathBuf, bool>>,
}

impl ModuleResolver {
    pub fn new(root: &Path) -> Self {
        let mut resolver = Self {
            root: root.to_path_buf(),
            aliases: Vec::new(),
            alias_bases: Vec::new(),
            bundler_fallback: false,
            resolution_cache: RefCell::new(HashMap::new()),
            exists_cache: RefCell::new(HashMap::new()),
            dir_cache: RefCell::new(HashMap::new()),
        };
        resolver.load_alias_configs();
        resolver
    }

    pub fn with_bundler_fallback(mut self, enabled: bool) -> Self {
        self.bundler_fallback = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drop the resolution and existence caches so the next lookup sees the
    /// filesystem as it is now.
    pub fn clear_caches(&self) {
        self.resolution_cache.borrow_mut().clear();
        self.exists_cache.borrow_mut().clear();
        self.dir_cache.borrow_mut().clear();
    }

    /// Drop all caches and re-discover alias configurations.
    pub fn invalidate(&mut self) {
        self.clear_caches();
        self.aliases.clear();
        self.alias_bases.clear();
        self.load_alias_configs();
    }

    /// Resolve a specifier in the context of a source file. The context may
    /// be absolute or repo-relative; resolved paths come back absolute.
    pub fn resolve_detailed(&self, context_file: &Path, specifier: &str) -> ResolutionResult {
        let context_abs = if context_file.is_absolute() {
            context_file.to_path_buf()
        } else {
            self.root.join(context_file)
        };
        let key = (normalize_path(&context_abs), specifier.to_string());
        if let Some(cached) = self.resolution_cache.borrow().get(&key) {
            return cached.clone();
        }
        let result = self.resolve_uncached(&context_abs, specifier);
        self.resolution_cache
            .borrow_mut()
            .insert(key, result.clone());
        result
    }

    fn resolve_uncached(&self, context_abs: &Path, specifier: &str) -> ResolutionResult {
        let mut attempts = Vec::new();

        if is_core_module(specifier) {
            return ResolutionResult {
                resolved_path: None,
                strategy: Strategy::Node,
                attempts,
                error: None,
                core: true,
                external: false,
            };
        }

        let context_dir = context_abs
            .parent()
            .unwrap_or(&self.root)
            .to_path_buf();

        // 1. Relative
        if specifier.starts_with("./") || specifier.starts_with("../") {
            let base = context_dir.join(specifier);
            if let Some(hit) = self.probe(&base, &mut attempts) {
                return self.hit(hit, Strategy::Relative, attempts);
            }
            return ResolutionResult::unresolved(
                attempts,
                format!("relative specifier {specifier} did not match a file"),
            );
        }

        // 2. Absolute
        if Path::new(specifier).is_absolute() {
            let base = PathBuf::from(specifier);
            if let Some(hit) = self.probe(&base, &mut attempts) {
                return self.hit(hit, Strategy::Absolute, attempts);
            }
            return ResolutionResult::unresolved(
                attempts,
                format!("absolute specifier {specifier} did not match a file"),
            );
        }

        // 3. Alias
        for alias in &self.aliases {
            let Some(captured) = alias.matches(specifier) else {
                continue;
            };
            for target in &alias.targets {
                let candidate = PathBuf::from(target.replace('*', &captured));
                if let Some(hit) = self.probe(&candidate, &mut attempts) {
                    return self.hit(hit, Strategy::Alias, attempts);
                }
            }
        }

        // 4. Node: walk node_modules up from the context directory, then try
        //    the repository root as a second stage.
        if let Some(result) = self.resolve_node(&context_dir, specifier, &mut attempts) {
            return result;
        }

        // 5. Bundler (opt-in): bare specifier joined against the root and
        //    each alias base.
        if self.bundler_fallback {
            let mut bases = vec![self.root.clone()];
            bases.extend(self.alias_bases.iter().cloned());
            for base in bases {
                let candidate = base.join(specifier);
                if let Some(hit) = self.probe(&candidate, &mut attempts) {
                    return self.hit(hit, Strategy::Bundler, attempts);
                }
            }
        }

        debug!("unresolved specifier {specifier} from {}", context_abs.display());
        ResolutionResult::unresolved(
            attempts,
            format!("no strategy resolved {specifier}"),
        )
    }

    fn hit(
        &self,
        path: PathBuf,
        strategy: Strategy,
        attempts: Vec<String>,
    ) -> ResolutionResult {
        ResolutionResult {
            resolved_path: Some(path),
            strategy,
            attempts,
            error: None,
            core: false,
            external: false,
        }
    }

    fn resolve_node(
        &self,
        context_dir: &Path,
        specifier: &str,
        attempts: &mut Vec<String>,
    ) -> Option<ResolutionResult> {
        let package = specifier
            .split('/')
            .take(if specifier.starts_with('@') { 2 } else { 1 })
            .collect::<Vec<_>>()
            .join("/");

        let mut dirs: Vec<PathBuf> = Vec::new();
        let mut current = Some(context_dir.to_path_buf());
        while let Some(dir) = current {
            dirs.push(dir.clone());
            if dir == self.root {
                break;
            }
            current = dir.parent().map(|p| p.to_path_buf());
        }
        // Second stage: the root, even when the context sits outside it.
        if dirs.last().map(|d| d != &self.root).unwrap_or(true) {
            dirs.push(self.root.clone());
        }

        for dir in dirs {
            let package_dir = dir.join("node_modules").join(&package);
            attempts.push(normalize_path(&package_dir));
            if self.is_dir(&package_dir) || self.exists(&package_dir) {
                return Some(ResolutionResult {
                    resolved_path: None,
                    strategy: Strategy::Node,
                    attempts: std::mem::take(attempts),
                    error: None,
                    core: false,
                    external: true,
                });
            }
        }
        None
    }

    /// Probe a candidate path: as-is, with each extension appended, then as
    /// a directory holding `index.<ext>`. Reports the first hit.
    fn probe(&self, base: &Path, attempts: &mut Vec<String>) -> Option<PathBuf> {
        attempts.push(normalize_path(base));
        if self.is_file(base) {
            return Some(base.to_path_buf());
        }
        let raw = base.to_string_lossy();
        for ext in EXTENSIONS {
            let candidate = PathBuf::from(format!("{raw}.{ext}"));
            attempts.push(normalize_path(&candidate));
            if self.is_file(&candidate) {
                return Some(candidate);
            }
        }
        if self.is_dir(base) {
            for ext in EXTENSIONS {
                let candidate = base.join(format!("index.{ext}"));
                attempts.push(normalize_path(&candidate));
                if self.is_file(&candidate) {
                    return Some(candidate);
                }
            }
        }
        None
    }

    fn exists(&self, path: &Path) -> bool {
        if let Some(&known) = self.exists_cache.borrow().get(path) {
            return known;
        }
        let exists = path.exists();
        self.exists_cache
            .borrow_mut()
            .insert(path.to_path_buf(), exists);
        exists
    }

    fn is_file(&self, path: &Path) -> bool {
        self.exists(path) && !self.is_dir(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        if let Some(&known) = self.dir_cache.borrow().get(path) {
            return known;
        }
        let is_dir = path.is_dir();
        self.dir_cache
            .borrow_mut()
            .insert(path.to_path_buf(), is_dir);
        is_dir
    }

    // ==================== Alias discovery ====================

    fn load_alias_configs(&mut self) {
        let mut config_paths = vec![self.root.join("tsconfig.json")];
        for layout in WORKSPACE_GLOBS {
            let container = self.root.join(layout);
            let Ok(entries) = std::fs::read_dir(&container) else {
                continue;
            };
            for entry in entries.flatten() {
                let member = entry.path().join("tsconfig.json");
                if member.is_file() {
                    config_paths.push(member);
                }
            }
        }
        for config_path in config_paths {
            if let Err(err) = self.load_one_config(&config_path) {
                debug!("skipping {}: {err:#}", config_path.display());
            }
        }
    }

    fn load_one_config(&mut self, config_path: &Path) -> anyhow::Result<()> {
        if !config_path.is_file() {
            return Ok(());
        }
        let raw = std::fs::read_to_string(config_path)?;
        // tsconfig files routinely carry comments and trailing commas.
        let config: TsConfig = serde_json5::from_str(&raw)?;
        let Some(options) = config.compiler_options else {
            return Ok(());
        };
        let config_dir = config_path.parent().unwrap_or(&self.root);
        let base = config_dir.join(options.base_url.as_deref().unwrap_or("."));
        self.alias_bases.push(base.clone());
        let Some(paths) = options.paths else {
            return Ok(());
        };
        for (pattern, targets) in paths {
            let (prefix, suffix) = match pattern.split_once('*') {
                Some((p, s)) => (p.to_string(), s.to_string()),
                None => (pattern.clone(), String::new()),
            };
            let targets = targets
                .iter()
                .map(|t| normalize_path(&base.join(t)))
                .collect();
            self.aliases.push(CompiledAlias {
                prefix,
                suffix,
                targets,
            });
        }
        Ok(())
    }
}

pub fn is_core_module(specifier: &str) -> bool {
    let bare = specifier.strip_prefix("node:").unwrap_or(specifier);
    let package = bare.split('/').next().unwrap_or(bare);
    CORE_MODULES.contains(package)
}
