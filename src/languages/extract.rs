//! Shared symbol extraction for the TypeScript/JavaScript grammar family.
//!
//! Both grammars expose the same node kinds for the constructs indexed here;
//! TypeScript-only kinds (interfaces, type-only imports) simply never appear
//! in JavaScript trees.

use tree_sitter::{Node, Tree};

use crate::languages::slice;
use crate::symbol::{
    CallSite, CallType, Definition, DefinitionKind, Export, ExportKind, Import, ImportKind,
    ImportedName, Symbol,
};

/// Longest signature kept verbatim; anything longer is cut at a char boundary.
const MAX_SIGNATURE_LEN: usize = 200;

pub fn extract(source: &str, tree: &Tree) -> Vec<Symbol> {
    let root = tree.root_node();
    let mut symbols = Vec::new();
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        visit_top_level(&child, source, &mut symbols, false);
    }
    symbols
}

fn visit_top_level(node: &Node, source: &str, symbols: &mut Vec<Symbol>, exported: bool) {
    match node.kind() {
        "import_statement" => collect_import(node, source, symbols),
        "export_statement" => collect_export(node, source, symbols),
        "function_declaration" | "generator_function_declaration" => {
            if let Some(def) = function_definition(node, source, exported) {
                symbols.push(Symbol::Definition(def));
            }
        }
        "class_declaration" => collect_class(node, source, symbols, exported),
        "interface_declaration" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let mut def = definition_shell(
                    node,
                    source,
                    DefinitionKind::Interface,
                    slice(source, &name_node),
                    exported,
                );
                def.signature = signature_before_body(node, source);
                symbols.push(Symbol::Definition(def));
            }
        }
        "lexical_declaration" | "variable_declaration" => {
            collect_variables(node, source, symbols, exported)
        }
        _ => {}
    }
}

fn collect_class(node: &Node, source: &str, symbols: &mut Vec<Symbol>, exported: bool) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let mut def = definition_shell(
        node,
        source,
        DefinitionKind::Class,
        slice(source, &name_node),
        exported,
    );
    def.signature = signature_before_body(node, source);
    symbols.push(Symbol::Definition(def));

    let Some(body) = node.child_by_field_name("body") else {
        return;
    };
    let mut cursor = body.walk();
    for member in body.children(&mut cursor) {
        if member.kind() != "method_definition" {
            continue;
        }
        let Some(method_name) = member.child_by_field_name("name") else {
            continue;
        };
        let mut method = definition_shell(
            &member,
            source,
            DefinitionKind::Method,
            slice(source, &method_name),
            false,
        );
        method.signature = signature_before_body(&member, source);
        for kw in ["static", "async", "get", "set"] {
            if has_keyword_child(&member, kw) {
                method.modifiers.push(kw.to_string());
            }
        }
        if let Some(body) = member.child_by_field_name("body") {
            method.calls = collect_calls(&body, source);
        }
        symbols.push(Symbol::Definition(method));
    }
}

fn collect_variables(node: &Node, source: &str, symbols: &mut Vec<Symbol>, exported: bool) {
    let mut cursor = node.walk();
    for declarator in node.children(&mut cursor) {
        if declarator.kind() != "variable_declarator" {
            continue;
        }
        let Some(name_node) = declarator.child_by_field_name("name") else {
            continue;
        };
        if name_node.kind() != "identifier" {
            continue; // destructuring patterns are not indexed as symbols
        }
        let mut def = definition_shell(
            node,
            source,
            DefinitionKind::Variable,
            slice(source, &name_node),
            exported,
        );
        def.signature = first_line(&slice(source, node));
        if let Some(value) = declarator.child_by_field_name("value") {
            if matches!(
                value.kind(),
                "arrow_function" | "function_expression" | "function"
            ) {
                if let Some(body) = value.child_by_field_name("body") {
                    def.calls = collect_calls(&body, source);
                }
            }
        }
        symbols.push(Symbol::Definition(def));
    }
}

fn function_definition(node: &Node, source: &str, exported: bool) -> Option<Definition> {
    let name_node = node.child_by_field_name("name")?;
    let mut def = definition_shell(
        node,
        source,
        DefinitionKind::Function,
        slice(source, &name_node),
        exported,
    );
    def.signature = signature_before_body(node, source);
    if has_keyword_child(node, "async") {
        def.modifiers.push("async".to_string());
    }
    if let Some(body) = node.child_by_field_name("body") {
        def.calls = collect_calls(&body, source);
    }
    Some(def)
}

fn definition_shell(
    node: &Node,
    source: &str,
    kind: DefinitionKind,
    name: String,
    exported: bool,
) -> Definition {
    let mut modifiers = Vec::new();
    if exported {
        modifiers.push("export".to_string());
    }
    Definition {
        kind,
        name,
        signature: String::new(),
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
        doc: doc_comment(node, source),
        modifiers,
        calls: Vec::new(),
        content: None,
    }
}

/// Text from the node start to the start of its body, single-lined.
fn signature_before_body(node: &Node, source: &str) -> String {
    let end = node
        .child_by_field_name("body")
        .map(|b| b.start_byte())
        .unwrap_or_else(|| node.end_byte());
    let raw = source.get(node.start_byte()..end).unwrap_or_default();
    let mut sig: String = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if sig.len() > MAX_SIGNATURE_LEN {
        let cut = (0..=MAX_SIGNATURE_LEN)
            .rev()
            .find(|i| sig.is_char_boundary(*i))
            .unwrap_or(0);
        sig.truncate(cut);
    }
    sig
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().trim().to_string()
}

/// Doc comment immediately preceding the node (or its export wrapper).
fn doc_comment(node: &Node, source: &str) -> Option<String> {
    let anchor = match node.parent() {
        Some(parent) if parent.kind() == "export_statement" => parent,
        _ => *node,
    };
    let prev = anchor.prev_sibling()?;
    if prev.kind() != "comment" {
        return None;
    }
    let text = slice(source, &prev);
    if text.starts_with("/**") {
        Some(text)
    } else {
        None
    }
}

fn has_keyword_child(node: &Node, keyword: &str) -> bool {
    let mut cursor = node.walk();
    let result = node.children(&mut cursor).any(|c| c.kind() == keyword);
    result
}

/// Enumerate call sites in a definition body.
fn collect_calls(body: &Node, source: &str) -> Vec<CallSite> {
    let mut calls = Vec::new();
    let mut stack = vec![*body];
    while let Some(node) = stack.pop() {
        match node.kind() {
            "call_expression" => {
                if let Some(callee) = node.child_by_field_name("function") {
                    match callee.kind() {
                        "identifier" => calls.push(CallSite {
                            callee: slice(source, &callee),
                            callee_object: None,
                            line: node.start_position().row + 1,
                            column: node.start_position().column + 1,
                            call_type: CallType::Direct,
                        }),
                        "member_expression" => {
                            if let Some(property) = callee.child_by_field_name("property") {
                                let object = callee
                                    .child_by_field_name("object")
                                    .filter(|o| {
                                        matches!(o.kind(), "identifier" | "this" | "super")
                                    })
                                    .map(|o| slice(source, &o));
                                calls.push(CallSite {
                                    callee: slice(source, &property),
                                    callee_object: object,
                                    line: node.start_position().row + 1,
                                    column: node.start_position().column + 1,
                                    call_type: CallType::Method,
                                });
                            }
                        }
                        _ => {}
                    }
                }
            }
            "new_expression" => {
                if let Some(ctor) = node.child_by_field_name("constructor") {
                    if ctor.kind() == "identifier" {
                        calls.push(CallSite {
                            callee: slice(source, &ctor),
                            callee_object: None,
                            line: node.start_position().row + 1,
                            column: node.start_position().column + 1,
                            call_type: CallType::Constructor,
                        });
                    }
                }
            }
            _ => {}
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            stack.push(child);
        }
    }
    // Stack traversal visits in reverse source order.
    calls.sort_by_key(|c| (c.line, c.column));
    calls
}

// ==================== Imports ====================

fn collect_import(node: &Node, source: &str, symbols: &mut Vec<Symbol>) {
    let Some(source_node) = node.child_by_field_name("source") else {
        return;
    };
    let specifier = strip_quotes(&slice(source, &source_node));
    let line = node.start_position().row + 1;
    let type_only = has_keyword_child(node, "type");

    let mut emitted = false;
    let mut stack = vec![*node];
    while let Some(n) = stack.pop() {
        match n.kind() {
            "identifier" => {
                // Default import binding: `import Foo from "./foo"`.
                symbols.push(Symbol::Import(Import {
                    source: specifier.clone(),
                    kind: ImportKind::Default,
                    alias: Some(slice(source, &n)),
                    names: vec![],
                    type_only,
                    line,
                }));
                emitted = true;
                continue;
            }
            "namespace_import" => {
                let alias = n
                    .named_children(&mut n.walk())
                    .find(|c| c.kind() == "identifier")
                    .map(|c| slice(source, &c));
                symbols.push(Symbol::Import(Import {
                    source: specifier.clone(),
                    kind: ImportKind::Namespace,
                    alias,
                    names: vec![],
                    type_only,
                    line,
                }));
                emitted = true;
                continue;
            }
            "named_imports" => {
                let names = collect_specifier_names(&n, source, "import_specifier");
                if !names.is_empty() {
                    symbols.push(Symbol::Import(Import {
                        source: specifier.clone(),
                        kind: ImportKind::Named,
                        alias: None,
                        names,
                        type_only,
                        line,
                    }));
                    emitted = true;
                }
                continue;
            }
            "string" => continue,
            _ => {}
        }
        let mut cursor = n.walk();
        for child in n.children(&mut cursor) {
            stack.push(child);
        }
    }

    if !emitted {
        symbols.push(Symbol::Import(Import {
            source: specifier,
            kind: ImportKind::SideEffect,
            alias: None,
            names: vec![],
            type_only: false,
            line,
        }));
    }
}

fn collect_specifier_names(node: &Node, source: &str, specifier_kind: &str) -> Vec<ImportedName> {
    let mut names = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() != specifier_kind {
            continue;
        }
        let Some(name_node) = child.child_by_field_name("name") else {
            continue;
        };
        let alias = child
            .child_by_field_name("alias")
            .map(|a| slice(source, &a));
        names.push(ImportedName {
            name: slice(source, &name_node),
            alias,
        });
    }
    names
}

// ==================== Exports ====================

fn collect_export(node: &Node, source: &str, symbols: &mut Vec<Symbol>) {
    let line = node.start_position().row + 1;
    let export_source = node
        .child_by_field_name("source")
        .map(|s| strip_quotes(&slice(source, &s)));

    // `export function f() {}` and friends carry the declaration inline.
    if let Some(declaration) = node.child_by_field_name("declaration") {
        visit_top_level(&declaration, source, symbols, true);
        return;
    }

    // `export default <expr>`.
    if has_keyword_child(node, "default") {
        let name = node
            .named_children(&mut node.walk())
            .find(|c| c.kind() == "identifier")
            .map(|c| slice(source, &c));
        symbols.push(Symbol::Export(Export {
            kind: ExportKind::Default,
            source: None,
            names: name
                .map(|n| {
                    vec![ImportedName {
                        name: n,
                        alias: None,
                    }]
                })
                .unwrap_or_default(),
            line,
        }));
        return;
    }

    // `export * from "./x"` (optionally `as ns`).
    if node
        .children(&mut node.walk())
        .any(|c| c.kind() == "*" || c.kind() == "namespace_export")
    {
        symbols.push(Symbol::Export(Export {
            kind: ExportKind::Namespace,
            source: export_source,
            names: vec![],
            line,
        }));
        return;
    }

    // `export { a, b as c }` with or without a source.
    let mut names = Vec::new();
    let mut stack = vec![*node];
    while let Some(n) = stack.pop() {
        if n.kind() == "export_clause" {
            names = collect_specifier_names(&n, source, "export_specifier");
            break;
        }
        let mut cursor = n.walk();
        for child in n.children(&mut cursor) {
            stack.push(child);
        }
    }
    if names.is_empty() {
        return;
    }

    let kind = if export_source.is_some() {
        ExportKind::ReExport
    } else {
        ExportKind::Named
    };
    // Local `export { x as y }` also makes the exported alias a findable
    // symbol in its own right.
    if kind == ExportKind::Named {
        for name in &names {
            symbols.push(Symbol::Definition(Definition {
                kind: DefinitionKind::ExportSpecifier,
                name: name.local().to_string(),
                signature: format!("export {{ {} }}", spec_text(name)),
                start_line: line,
                end_line: line,
                start_byte: node.start_byte(),
                end_byte: node.end_byte(),
                doc: None,
                modifiers: vec![],
                calls: vec![],
                content: None,
            }));
        }
    }
    symbols.push(Symbol::Export(Export {
        kind,
        source: export_source,
        names,
        line,
    }));
}

fn spec_text(name: &ImportedName) -> String {
    match &name.alias {
        Some(alias) => format!("{} as {}", name.name, alias),
        None => name.name.clone(),
    }
}

fn strip_quotes(raw: &str) -> String {
    raw.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .trim_matches('`')
        .to_string()
}
