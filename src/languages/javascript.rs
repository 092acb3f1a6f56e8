//! JavaScript/JSX parser.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use tree_sitter::{Language, Parser};

use crate::languages::{extract, LanguageConfig, LanguageParser};
use crate::symbol::Symbol;

static JS_LANGUAGE: Lazy<Language> = Lazy::new(|| tree_sitter_javascript::LANGUAGE.into());

pub struct JavaScriptParser {
    timeout_micros: u64,
}

impl JavaScriptParser {
    pub fn new(max_parse_time_ms: u64) -> Self {
        Self {
            timeout_micros: max_parse_time_ms * 1000,
        }
    }
}

impl Default for JavaScriptParser {
    fn default() -> Self {
        Self::new(crate::config::Budgets::default().max_parse_time_ms)
    }
}

impl LanguageParser for JavaScriptParser {
    fn config(&self) -> LanguageConfig {
        LanguageConfig {
            name: "javascript",
            extensions: &["js", "jsx", "mjs", "cjs"],
        }
    }

    fn language(&self) -> &Language {
        &JS_LANGUAGE
    }

    fn parse(&self, rel_path: &str, source: &str) -> Result<Vec<Symbol>> {
        let mut parser = Parser::new();
        parser
            .set_language(&JS_LANGUAGE)
            .context("failed to set JavaScript language")?;
        #[allow(deprecated)]
        parser.set_timeout_micros(self.timeout_micros);
        let tree = parser
            .parse(source, None)
            .with_context(|| format!("failed to parse {rel_path}"))?;
        Ok(extract::extract(source, &tree))
    }
}
