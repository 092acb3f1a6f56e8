//! TypeScript/TSX parser.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use tree_sitter::{Language, Parser};

use crate::languages::{extract, LanguageConfig, LanguageParser};
use crate::symbol::Symbol;

static TS_LANGUAGE: Lazy<Language> =
    Lazy::new(|| tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into());
static TSX_LANGUAGE: Lazy<Language> = Lazy::new(|| tree_sitter_typescript::LANGUAGE_TSX.into());

pub struct TypeScriptParser {
    timeout_micros: u64,
}

impl TypeScriptParser {
    pub fn new(max_parse_time_ms: u64) -> Self {
        Self {
            timeout_micros: max_parse_time_ms * 1000,
        }
    }
}

impl Default for TypeScriptParser {
    fn default() -> Self {
        Self::new(crate::config::Budgets::default().max_parse_time_ms)
    }
}

impl LanguageParser for TypeScriptParser {
    fn config(&self) -> LanguageConfig {
        LanguageConfig {
            name: "typescript",
            extensions: &["ts", "tsx", "d.ts"],
        }
    }

    fn language(&self) -> &Language {
        &TS_LANGUAGE
    }

    fn parse(&self, rel_path: &str, source: &str) -> Result<Vec<Symbol>> {
        let language: &Language = if rel_path.ends_with(".tsx") {
            &TSX_LANGUAGE
        } else {
            &TS_LANGUAGE
        };
        let mut parser = Parser::new();
        parser
            .set_language(language)
            .context("failed to set TypeScript language")?;
        #[allow(deprecated)]
        parser.set_timeout_micros(self.timeout_micros);
        let tree = parser
            .parse(source, None)
            .with_context(|| format!("failed to parse {rel_path}"))?;
        Ok(extract::extract(source, &tree))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{CallType, DefinitionKind, ExportKind, ImportKind};

    fn parse(source: &str) -> Vec<Symbol> {
        TypeScriptParser::default()
            .parse("src/sample.ts", source)
            .unwrap()
    }

    #[test]
    fn extracts_functions_with_calls() {
        let symbols = parse(
            r#"
/** Greets a user. */
export async function greet(name: string): Promise<void> {
    const text = format(name);
    logger.info(text);
}
"#,
        );
        let defs: Vec<_> = symbols.iter().filter_map(|s| s.as_definition()).collect();
        assert_eq!(defs.len(), 1);
        let greet = defs[0];
        assert_eq!(greet.kind, DefinitionKind::Function);
        assert_eq!(greet.name, "greet");
        assert!(greet.signature.contains("greet(name: string)"));
        assert!(greet.modifiers.contains(&"export".to_string()));
        assert!(greet.modifiers.contains(&"async".to_string()));
        assert_eq!(greet.doc.as_deref(), Some("/** Greets a user. */"));

        let callees: Vec<_> = greet.calls.iter().map(|c| c.callee.as_str()).collect();
        assert_eq!(callees, vec!["format", "info"]);
        assert_eq!(greet.calls[1].callee_object.as_deref(), Some("logger"));
        assert_eq!(greet.calls[1].call_type, CallType::Method);
    }

    #[test]
    fn extracts_classes_interfaces_and_methods() {
        let symbols = parse(
            r#"
interface Store {
    read(key: string): string;
}
class MemoryStore {
    read(key: string): string { return this.lookup(key); }
    static empty(): MemoryStore { return new MemoryStore(); }
}
"#,
        );
        let names: Vec<_> = symbols
            .iter()
            .filter_map(|s| s.as_definition())
            .map(|d| (d.kind, d.name.as_str()))
            .collect();
        assert!(names.contains(&(DefinitionKind::Interface, "Store")));
        assert!(names.contains(&(DefinitionKind::Class, "MemoryStore")));
        assert!(names.contains(&(DefinitionKind::Method, "read")));
        assert!(names.contains(&(DefinitionKind::Method, "empty")));

        let empty = symbols
            .iter()
            .filter_map(|s| s.as_definition())
            .find(|d| d.name == "empty")
            .unwrap();
        assert!(empty.modifiers.contains(&"static".to_string()));
        assert!(empty
            .calls
            .iter()
            .any(|c| c.callee == "MemoryStore" && c.call_type == CallType::Constructor));

        let read = symbols
            .iter()
            .filter_map(|s| s.as_definition())
            .find(|d| d.name == "read" && d.kind == DefinitionKind::Method)
            .unwrap();
        assert_eq!(read.calls[0].callee_object.as_deref(), Some("this"));
    }

    #[test]
    fn extracts_import_shapes() {
        let symbols = parse(
            r#"
import def from "./default";
import * as ns from "./namespace";
import { a, b as c } from "./named";
import type { T } from "./types";
import "./side-effect";
"#,
        );
        let imports: Vec<_> = symbols.iter().filter_map(|s| s.as_import()).collect();
        assert_eq!(imports.len(), 5);

        let default = imports.iter().find(|i| i.source == "./default").unwrap();
        assert_eq!(default.kind, ImportKind::Default);
        assert_eq!(default.alias.as_deref(), Some("def"));

        let ns = imports.iter().find(|i| i.source == "./namespace").unwrap();
        assert_eq!(ns.kind, ImportKind::Namespace);
        assert_eq!(ns.alias.as_deref(), Some("ns"));

        let named = imports.iter().find(|i| i.source == "./named").unwrap();
        assert_eq!(named.kind, ImportKind::Named);
        assert_eq!(named.names.len(), 2);
        assert_eq!(named.names[1].name, "b");
        assert_eq!(named.names[1].alias.as_deref(), Some("c"));

        let types = imports.iter().find(|i| i.source == "./types").unwrap();
        assert!(types.type_only);

        let side = imports.iter().find(|i| i.source == "./side-effect").unwrap();
        assert_eq!(side.kind, ImportKind::SideEffect);
    }

    #[test]
    fn extracts_export_shapes() {
        let symbols = parse(
            r#"
const secret = 1;
export { secret as token };
export { helper } from "./helper";
export * from "./everything";
export default secret;
"#,
        );
        let exports: Vec<_> = symbols.iter().filter_map(|s| s.as_export()).collect();
        assert_eq!(exports.len(), 4);
        assert!(exports
            .iter()
            .any(|e| e.kind == ExportKind::Named && e.names[0].alias.as_deref() == Some("token")));
        assert!(exports
            .iter()
            .any(|e| e.kind == ExportKind::ReExport && e.source.as_deref() == Some("./helper")));
        assert!(exports
            .iter()
            .any(|e| e.kind == ExportKind::Namespace
                && e.source.as_deref() == Some("./everything")));
        assert!(exports.iter().any(|e| e.kind == ExportKind::Default));

        // The exported alias is findable as a symbol.
        assert!(symbols
            .iter()
            .filter_map(|s| s.as_definition())
            .any(|d| d.kind == DefinitionKind::ExportSpecifier && d.name == "token"));
    }

    #[test]
    fn extracts_variables_with_arrow_bodies() {
        let symbols = parse("export const handler = (req) => { return process(req); };\n");
        let handler = symbols
            .iter()
            .filter_map(|s| s.as_definition())
            .find(|d| d.name == "handler")
            .unwrap();
        assert_eq!(handler.kind, DefinitionKind::Variable);
        assert!(handler.modifiers.contains(&"export".to_string()));
        assert_eq!(handler.calls[0].callee, "process");
    }

    #[test]
    fn byte_ranges_slice_the_source() {
        let source = "function tiny() {}\n";
        let symbols = parse(source);
        let def = symbols[0].as_definition().unwrap();
        assert_eq!(&source[def.start_byte..def.end_byte], "function tiny() {}");
        assert_eq!(def.start_line, 1);
    }
}
