//! Parser registry: extension-based dispatch over the installed grammars.

use log::warn;

use crate::languages::javascript::JavaScriptParser;
use crate::languages::typescript::TypeScriptParser;
use crate::languages::{LanguageParser, ParseOutcome};

pub struct ParserRegistry {
    parsers: Vec<Box<dyn LanguageParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::with_parse_timeout_ms(crate::config::Budgets::default().max_parse_time_ms)
    }

    /// Install parsers with an explicit per-file parse budget.
    pub fn with_parse_timeout_ms(max_parse_time_ms: u64) -> Self {
        Self {
            parsers: vec![
                Box::new(TypeScriptParser::new(max_parse_time_ms)),
                Box::new(JavaScriptParser::new(max_parse_time_ms)),
            ],
        }
    }

    /// True when some parser handles the path's extension.
    pub fn supports(&self, rel_path: &str) -> bool {
        match extension_of(rel_path) {
            Some(ext) => self.parsers.iter().any(|p| p.handles_extension(ext)),
            None => false,
        }
    }

    /// Parse a file into symbols. Returns None for unsupported extensions.
    /// Parser errors degrade the file to an empty symbol list.
    pub fn parse(&self, rel_path: &str, source: &str) -> Option<ParseOutcome> {
        let ext = extension_of(rel_path)?;
        let parser = self.parsers.iter().find(|p| p.handles_extension(ext))?;
        let language = parser.config().name.to_string();
        match parser.parse(rel_path, source) {
            Ok(symbols) => Some(ParseOutcome { symbols, language }),
            Err(err) => {
                warn!("parse failed for {rel_path}: {err:#}");
                Some(ParseOutcome {
                    symbols: Vec::new(),
                    language,
                })
            }
        }
    }

}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn extension_of(rel_path: &str) -> Option<&str> {
    // `.d.ts` is longer than the plain extension; check it first.
    if rel_path.ends_with(".d.ts") {
        return Some("d.ts");
    }
    rel_path.rsplit_once('.').map(|(_, ext)| ext)
}
