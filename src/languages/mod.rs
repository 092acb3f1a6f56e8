//! Language parsers.
//!
//! Each language binds a tree-sitter grammar behind the `LanguageParser`
//! trait; the registry dispatches on file extension. Parse failures never
//! propagate: the indexer degrades the file to an empty symbol list so one
//! bad file cannot poison indexing.

pub mod extract;
pub mod javascript;
pub mod registry;
pub mod typescript;

use anyhow::Result;
use tree_sitter::Language;

use crate::symbol::Symbol;

/// Configuration for a language parser.
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// Human-readable language tag stored on the file record.
    pub name: &'static str,
    /// File extensions this parser handles, in resolution priority order.
    pub extensions: &'static [&'static str],
}

/// The parser capability: grammar loading happens once at construction,
/// parsing is per-call.
pub trait LanguageParser: Send + Sync {
    fn config(&self) -> LanguageConfig;

    fn language(&self) -> &Language;

    /// Parse a file into its ordered symbol list. Byte ranges in the result
    /// are offsets into `source`.
    fn parse(&self, rel_path: &str, source: &str) -> Result<Vec<Symbol>>;

    fn handles_extension(&self, ext: &str) -> bool {
        self.config().extensions.contains(&ext)
    }
}

/// Result of parsing one file.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub symbols: Vec<Symbol>,
    pub language: String,
}

/// Extract the text content of a tree-sitter node from source code.
pub fn slice(source: &str, node: &tree_sitter::Node) -> String {
    let bytes = node.byte_range();
    source.get(bytes).unwrap_or_default().trim().to_string()
}
