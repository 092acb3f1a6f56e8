//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use quarry::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "quarry", version, about = "Local code-intelligence engine")]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output (for scripts). Errors still go to stderr.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format (text, json, jsonl, csv, tsv)
    #[arg(long, short = 'f', global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Workspace root (auto-detected from .mcp/, .git/, tsconfig.json, etc.)
    #[arg(long, short = 'w', global = true, env = "QUARRY_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Path to the SQLite index database (default: <workspace>/.mcp/index.db)
    #[arg(long, global = true, env = "QUARRY_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build or rebuild the full index
    Index {
        /// Delete and recreate the index before scanning
        #[arg(long)]
        rebuild: bool,
    },
    /// Build the index, then watch the workspace for changes
    Watch,
    /// Hybrid ranked search across filenames, symbols, comments, and content
    Search {
        /// The query string
        query: String,
        /// Force a query intent instead of auto-detection
        #[arg(long, value_enum)]
        intent: Option<IntentArg>,
        /// Extra regex patterns scored against file content
        #[arg(long = "pattern")]
        patterns: Vec<String>,
        /// Match keywords only on word boundaries
        #[arg(long)]
        word_boundary: bool,
        /// Restrict results to these file extensions
        #[arg(long = "type")]
        file_types: Vec<String>,
        /// Maximum number of results
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Search the symbol index by name
    Symbols {
        /// Substring (or fuzzy pattern with --fuzzy) to match symbol names
        query: String,
        /// Force fuzzy matching with this maximum edit distance
        #[arg(long)]
        fuzzy: Option<usize>,
        /// Limit the number of results
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Resolve an import specifier in the context of a source file
    Resolve {
        /// The specifier to resolve, e.g. "./util" or "@/lib/auth"
        specifier: String,
        /// The importing file
        #[arg(long)]
        file: PathBuf,
    },
    /// Show dependency edges for a file
    Deps {
        /// File to inspect
        file: PathBuf,
        /// Traversal direction
        #[arg(long, value_enum, default_value = "downstream")]
        direction: quarry::graph::Direction,
        /// Follow transitive edges
        #[arg(long)]
        transitive: bool,
        /// Depth bound for transitive traversal
        #[arg(long, default_value = "20")]
        depth: usize,
    },
    /// Analyze a symbol's call graph
    Calls {
        /// Symbol name
        symbol: String,
        /// File containing the definition
        #[arg(long)]
        file: PathBuf,
        /// Traversal direction
        #[arg(long, value_enum, default_value = "downstream")]
        direction: quarry::graph::Direction,
        /// Depth bound
        #[arg(long, default_value = "3")]
        depth: usize,
    },
    /// Apply anchor-based edits from a JSON file
    Edit {
        /// File to edit
        file: PathBuf,
        /// JSON array of edits (path to file, or inline with --inline)
        #[arg(long)]
        edits: String,
        /// Treat --edits as inline JSON instead of a path
        #[arg(long)]
        inline: bool,
        /// Compute the diff without writing
        #[arg(long)]
        dry_run: bool,
        /// Use the patience diff for the dry-run output
        #[arg(long)]
        semantic: bool,
        /// Description recorded on the operation
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Undo the most recent edit operation (or a specific one)
    Undo {
        /// Operation id to undo; defaults to the most recent
        #[arg(long)]
        operation: Option<String>,
    },
    /// Delete a file, honoring the destructive-operation gate
    Delete {
        /// File to delete
        file: PathBuf,
        /// Confirmation hash of the file's current content
        #[arg(long)]
        confirm_hash: Option<String>,
        /// Require hash confirmation regardless of size
        #[arg(long)]
        strict: bool,
    },
    /// Show index status (totals, unresolved ratio, confidence tier)
    Status,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum IntentArg {
    Symbol,
    Content,
    Filename,
    Mixed,
}

impl From<IntentArg> for quarry::search::QueryIntent {
    fn from(value: IntentArg) -> Self {
        match value {
            IntentArg::Symbol => quarry::search::QueryIntent::Symbol,
            IntentArg::Content => quarry::search::QueryIntent::Content,
            IntentArg::Filename => quarry::search::QueryIntent::Filename,
            IntentArg::Mixed => quarry::search::QueryIntent::Mixed,
        }
    }
}
