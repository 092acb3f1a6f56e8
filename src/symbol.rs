//! The symbol data model shared by the parsers, the index, and the graphs.
//!
//! Symbols are a tagged sum over three shapes: definitions, imports, and
//! exports. Downstream code matches on the tag first, then narrows to the
//! kind-specific fields; there is no inheritance hierarchy. Byte ranges are
//! closed-open and always intersect the file they came from.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionKind {
    Class,
    Function,
    Method,
    Interface,
    Variable,
    ExportSpecifier,
}

impl DefinitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefinitionKind::Class => "class",
            DefinitionKind::Function => "function",
            DefinitionKind::Method => "method",
            DefinitionKind::Interface => "interface",
            DefinitionKind::Variable => "variable",
            DefinitionKind::ExportSpecifier => "export_specifier",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportKind {
    Named,
    Namespace,
    Default,
    SideEffect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportKind {
    Named,
    Default,
    Namespace,
    ReExport,
}

/// How a call site invokes its callee. Mirrors what the parser can see
/// syntactically; the call graph assigns confidence separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    Direct,
    Method,
    Constructor,
}

/// A call recorded inside a definition's body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub callee: String,
    /// Receiver expression for method calls (`obj` in `obj.f()`), when it is
    /// a plain identifier. `this`/`super`/`self` are kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callee_object: Option<String>,
    pub line: usize,
    pub column: usize,
    pub call_type: CallType,
}

/// An imported name together with its local alias, if renamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedName {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl ImportedName {
    /// The name the binding is visible under in the importing file.
    pub fn local(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub kind: DefinitionKind,
    pub name: String,
    pub signature: String,
    pub start_line: usize,
    pub end_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub calls: Vec<CallSite>,
    /// When populated, equals `file[start_byte..end_byte]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Import {
    /// Raw specifier before resolution, e.g. `./util` or `@scope/pkg`.
    pub source: String,
    pub kind: ImportKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<ImportedName>,
    #[serde(default)]
    pub type_only: bool,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Export {
    pub kind: ExportKind,
    /// Source specifier for re-exports (`export { x } from "./y"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<ImportedName>,
    pub line: usize,
}

/// A symbol extracted from a source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Symbol {
    Definition(Definition),
    Import(Import),
    Export(Export),
}

impl Symbol {
    pub fn as_definition(&self) -> Option<&Definition> {
        match self {
            Symbol::Definition(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_import(&self) -> Option<&Import> {
        match self {
            Symbol::Import(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_export(&self) -> Option<&Export> {
        match self {
            Symbol::Export(e) => Some(e),
            _ => None,
        }
    }

    /// Display name for search and listings. Imports surface their specifier.
    pub fn name(&self) -> &str {
        match self {
            Symbol::Definition(d) => &d.name,
            Symbol::Import(i) => &i.source,
            Symbol::Export(e) => e
                .names
                .first()
                .map(|n| n.name.as_str())
                .unwrap_or("export"),
        }
    }
}

/// Stable identifier for a definition within the repository:
/// `relative/path.ts::name`.
pub fn symbol_id(rel_path: &str, name: &str) -> String {
    format!("{rel_path}::{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_definition() -> Definition {
        Definition {
            kind: DefinitionKind::Function,
            name: "login".into(),
            signature: "function login(user: string): Session".into(),
            start_line: 3,
            end_line: 9,
            start_byte: 40,
            end_byte: 220,
            doc: None,
            modifiers: vec!["export".into(), "async".into()],
            calls: vec![CallSite {
                callee: "validate".into(),
                callee_object: None,
                line: 4,
                column: 5,
                call_type: CallType::Direct,
            }],
            content: None,
        }
    }

    #[test]
    fn serializes_with_type_tag() {
        let sym = Symbol::Definition(sample_definition());
        let json = serde_json::to_string(&sym).unwrap();
        assert!(json.contains(r#""type":"definition"#));
        assert!(json.contains(r#""kind":"function"#));
        let back: Symbol = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name(), "login");
    }

    #[test]
    fn import_kinds_use_kebab_case() {
        let imp = Symbol::Import(Import {
            source: "./util".into(),
            kind: ImportKind::SideEffect,
            alias: None,
            names: vec![],
            type_only: false,
            line: 1,
        });
        let json = serde_json::to_string(&imp).unwrap();
        assert!(json.contains(r#""kind":"side-effect"#));
    }

    #[test]
    fn imported_name_local_prefers_alias() {
        let n = ImportedName {
            name: "Foo".into(),
            alias: Some("Renamed".into()),
        };
        assert_eq!(n.local(), "Renamed");
    }

    #[test]
    fn symbol_id_format() {
        assert_eq!(symbol_id("src/a.ts", "f"), "src/a.ts::f");
    }
}
