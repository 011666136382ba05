use tree_sitter::{Node, Tree, TreeCursor};

use super::LanguageExtractor;
use crate::indexer::{ExtractedRef, ExtractedSymbol, RefKind, SymbolKind};

pub struct TypeScriptExtractor;

impl LanguageExtractor for TypeScriptExtractor {
    fn language(&self) -> tree_sitter::Language {
        tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
    }

    fn extensions(&self) -> &[&str] {
        &["ts", "tsx", "js", "jsx", "mjs", "cjs"]
    }

    fn extract(&self, source: &[u8], tree: &Tree) -> Vec<ExtractedSymbol> {
        let mut symbols = Vec::new();
        let root = tree.root_node();
        extract_from_node(root, source, &mut symbols);
        symbols
    }
}

/// File-level references (imports, re-exports) don't belong to any
/// declaration, so they're carried on a synthetic empty-name symbol the
/// caller folds into the file's reference set. Declarations use their own
/// `references` field for everything found in their body.
pub(super) fn extract_file_level_refs(source: &[u8], tree: &Tree) -> Vec<ExtractedRef> {
    let mut refs = Vec::new();
    let mut cursor = tree.root_node().walk();
    collect_module_refs(&mut cursor, source, &mut refs);
    refs
}

fn collect_module_refs(cursor: &mut TreeCursor, source: &[u8], refs: &mut Vec<ExtractedRef>) {
    loop {
        let node = cursor.node();
        match node.kind() {
            "import_statement" => extract_import(node, source, refs),
            "export_statement" => extract_export(node, source, refs),
            "call_expression" => {
                if is_dynamic_import(node, source) {
                    if let Some(spec) = dynamic_import_source(node, source) {
                        let pos = node.start_position();
                        refs.push(
                            ExtractedRef::new(
                                spec.clone(),
                                RefKind::DynamicImport,
                                pos.row + 1,
                                pos.column + 1,
                            )
                            .with_import_source(spec),
                        );
                    }
                }
            }
            _ => {}
        }

        if cursor.goto_first_child() {
            collect_module_refs(cursor, source, refs);
            cursor.goto_parent();
        }

        if !cursor.goto_next_sibling() {
            break;
        }
    }
}

fn is_dynamic_import(node: Node, source: &[u8]) -> bool {
    node.child_by_field_name("function")
        .map(|f| text(f, source) == "import")
        .unwrap_or(false)
}

fn dynamic_import_source(node: Node, source: &[u8]) -> Option<String> {
    let args = node.child_by_field_name("arguments")?;
    let mut cursor = args.walk();
    for arg in args.children(&mut cursor) {
        if arg.kind() == "string" {
            return Some(string_literal_value(arg, source));
        }
    }
    None
}

fn extract_import(node: Node, source: &[u8], refs: &mut Vec<ExtractedRef>) {
    let Some(source_node) = node.child_by_field_name("source") else {
        return;
    };
    let import_source = string_literal_value(source_node, source);

    let clause = node
        .children(&mut node.walk())
        .find(|c| c.kind() == "import_clause");

    let Some(clause) = clause else {
        // Side-effect-only import: `import "./polyfill";`
        let pos = node.start_position();
        refs.push(
            ExtractedRef::new(
                import_source.clone(),
                RefKind::Import,
                pos.row + 1,
                pos.column + 1,
            )
            .with_import_source(import_source),
        );
        return;
    };

    let mut cursor = clause.walk();
    for binding in clause.children(&mut cursor) {
        match binding.kind() {
            "identifier" => push_import_binding(binding, source, &import_source, refs),
            "namespace_import" => {
                if let Some(ident) = binding
                    .children(&mut binding.walk())
                    .find(|c| c.kind() == "identifier")
                {
                    push_import_binding(ident, source, &import_source, refs);
                }
            }
            "named_imports" => {
                let mut nc = binding.walk();
                for spec in binding.children(&mut nc) {
                    if spec.kind() != "import_specifier" {
                        continue;
                    }
                    let name_node = spec
                        .child_by_field_name("alias")
                        .or_else(|| spec.child_by_field_name("name"));
                    if let Some(n) = name_node {
                        push_import_binding(n, source, &import_source, refs);
                    }
                }
            }
            _ => {}
        }
    }
}

fn push_import_binding(
    binding: Node,
    source: &[u8],
    import_source: &str,
    refs: &mut Vec<ExtractedRef>,
) {
    let pos = binding.start_position();
    refs.push(
        ExtractedRef::new(
            text(binding, source),
            RefKind::Import,
            pos.row + 1,
            pos.column + 1,
        )
        .with_import_source(import_source),
    );
}

fn extract_export(node: Node, source: &[u8], refs: &mut Vec<ExtractedRef>) {
    let Some(source_node) = node.child_by_field_name("source") else {
        return;
    };
    let import_source = string_literal_value(source_node, source);
    let pos = node.start_position();

    let has_star = node
        .children(&mut node.walk())
        .any(|c| c.kind() == "*" || c.kind() == "namespace_export");

    if has_star {
        refs.push(
            ExtractedRef::new(
                import_source.clone(),
                RefKind::ExportAll,
                pos.row + 1,
                pos.column + 1,
            )
            .with_import_source(import_source),
        );
        return;
    }

    if let Some(clause) = node
        .children(&mut node.walk())
        .find(|c| c.kind() == "export_clause")
    {
        let mut cursor = clause.walk();
        for spec in clause.children(&mut cursor) {
            if spec.kind() != "export_specifier" {
                continue;
            }
            if let Some(name) = spec.child_by_field_name("name") {
                let p = name.start_position();
                refs.push(
                    ExtractedRef::new(
                        text(name, source),
                        RefKind::ReExport,
                        p.row + 1,
                        p.column + 1,
                    )
                    .with_import_source(import_source.clone()),
                );
            }
        }
    } else {
        refs.push(
            ExtractedRef::new(
                import_source.clone(),
                RefKind::ReExport,
                pos.row + 1,
                pos.column + 1,
            )
            .with_import_source(import_source),
        );
    }
}

fn string_literal_value(node: Node, source: &[u8]) -> String {
    let raw = text(node, source);
    raw.trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_string()
}

fn extract_from_node(node: Node, source: &[u8], symbols: &mut Vec<ExtractedSymbol>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "function_declaration" | "generator_function_declaration" => {
                if let Some(sym) = extract_function(child, source) {
                    symbols.push(sym);
                }
            }
            "class_declaration" => {
                if let Some(sym) = extract_class(child, source) {
                    symbols.push(sym);
                }
            }
            "interface_declaration" => {
                if let Some(sym) = extract_interface(child, source) {
                    symbols.push(sym);
                }
            }
            "type_alias_declaration" => {
                if let Some(sym) = extract_type_alias(child, source) {
                    symbols.push(sym);
                }
            }
            "enum_declaration" => {
                if let Some(sym) = extract_enum(child, source) {
                    symbols.push(sym);
                }
            }
            "lexical_declaration" | "variable_declaration" => {
                extract_variable_declarations(child, source, symbols);
            }
            "export_statement" => {
                // Recurse into export to find the actual declaration
                extract_from_node(child, source, symbols);
            }
            "import_statement" => {
                // Tracked as file-level references, not symbols — see extract_file_level_refs.
            }
            _ => {}
        }
    }
}

fn text(node: Node, source: &[u8]) -> String {
    node.utf8_text(source).unwrap_or("").to_string()
}

fn build_signature(node: Node, source: &[u8]) -> String {
    let params = node
        .child_by_field_name("parameters")
        .map(|n| text(n, source))
        .unwrap_or_default();
    let return_type = node
        .child_by_field_name("return_type")
        .map(|n| text(n, source))
        .unwrap_or_default();
    format!("{params}{return_type}")
}

fn get_doc_comment(node: Node, source: &[u8]) -> Option<String> {
    let mut prev = node.prev_sibling();
    // Skip export_statement wrapper
    if node.parent().map(|p| p.kind()) == Some("export_statement") {
        prev = node.parent().and_then(|p| p.prev_sibling());
    }
    if let Some(comment_node) = prev {
        if comment_node.kind() == "comment" {
            let t = text(comment_node, source);
            if t.starts_with("/**") {
                let cleaned = t
                    .trim_start_matches("/**")
                    .trim_end_matches("*/")
                    .lines()
                    .map(|l| l.trim().trim_start_matches('*').trim())
                    .filter(|l| !l.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n");
                if !cleaned.is_empty() {
                    return Some(cleaned);
                }
            }
        }
    }
    None
}

fn extract_function(node: Node, source: &[u8]) -> Option<ExtractedSymbol> {
    let name = node.child_by_field_name("name").map(|n| text(n, source))?;
    let sig = build_signature(node, source);
    let doc = get_doc_comment(node, source);

    let mut refs = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        extract_body_refs(body, source, &mut refs);
    }
    if let Some(ret) = node.child_by_field_name("return_type") {
        extract_type_refs(ret, source, &mut refs);
    }

    Some(ExtractedSymbol {
        name,
        kind: SymbolKind::Fn,
        signature: Some(sig),
        doc_comment: doc,
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        children: Vec::new(),
        references: refs,
    })
}

fn extract_class(node: Node, source: &[u8]) -> Option<ExtractedSymbol> {
    let name = node.child_by_field_name("name").map(|n| text(n, source))?;
    let doc = get_doc_comment(node, source);

    let mut children = Vec::new();
    let mut refs = Vec::new();

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "class_heritage" {
            let mut hc = child.walk();
            for heritage_clause in child.children(&mut hc) {
                let kind = match heritage_clause.kind() {
                    "extends_clause" => Some(RefKind::Extends),
                    "implements_clause" => Some(RefKind::Implements),
                    _ => None,
                };
                let Some(kind) = kind else { continue };
                let mut tc = heritage_clause.walk();
                for type_node in heritage_clause.children(&mut tc) {
                    if matches!(
                        type_node.kind(),
                        "identifier" | "type_identifier" | "generic_type"
                    ) {
                        let ident = type_node
                            .children(&mut type_node.walk())
                            .find(|c| matches!(c.kind(), "identifier" | "type_identifier"))
                            .unwrap_or(type_node);
                        let pos = ident.start_position();
                        refs.push(ExtractedRef::new(
                            text(ident, source),
                            kind,
                            pos.row + 1,
                            pos.column + 1,
                        ));
                    }
                }
            }
        }
    }

    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for member in body.children(&mut cursor) {
            match member.kind() {
                "method_definition" => {
                    if let Some(method) = extract_method(member, source) {
                        children.push(method);
                    }
                }
                "public_field_definition" | "property_definition" => {
                    if let Some(field) = extract_field(member, source) {
                        children.push(field);
                    }
                }
                _ => {}
            }
        }
    }

    Some(ExtractedSymbol {
        name,
        kind: SymbolKind::Class,
        signature: None,
        doc_comment: doc,
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        children,
        references: refs,
    })
}

fn extract_method(node: Node, source: &[u8]) -> Option<ExtractedSymbol> {
    let name = node.child_by_field_name("name").map(|n| text(n, source))?;
    let sig = build_signature(node, source);
    let doc = get_doc_comment(node, source);

    let mut refs = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        extract_body_refs(body, source, &mut refs);
    }

    Some(ExtractedSymbol {
        name,
        kind: SymbolKind::Method,
        signature: Some(sig),
        doc_comment: doc,
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        children: Vec::new(),
        references: refs,
    })
}

fn extract_field(node: Node, source: &[u8]) -> Option<ExtractedSymbol> {
    let name = node.child_by_field_name("name").map(|n| text(n, source))?;
    let type_ann = node.child_by_field_name("type").map(|n| text(n, source));
    let mut refs = Vec::new();
    if let Some(t) = node.child_by_field_name("type") {
        extract_type_refs(t, source, &mut refs);
    }
    Some(ExtractedSymbol {
        name,
        kind: SymbolKind::Property,
        signature: type_ann,
        doc_comment: None,
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        children: Vec::new(),
        references: refs,
    })
}

fn extract_interface(node: Node, source: &[u8]) -> Option<ExtractedSymbol> {
    let name = node.child_by_field_name("name").map(|n| text(n, source))?;
    let doc = get_doc_comment(node, source);

    let mut children = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for member in body.children(&mut cursor) {
            match member.kind() {
                "property_signature" => {
                    if let Some(prop_name) = member.child_by_field_name("name") {
                        let type_ann = member.child_by_field_name("type").map(|n| text(n, source));
                        children.push(ExtractedSymbol {
                            name: text(prop_name, source),
                            kind: SymbolKind::Property,
                            signature: type_ann,
                            doc_comment: None,
                            start_line: member.start_position().row + 1,
                            end_line: member.end_position().row + 1,
                            children: Vec::new(),
                            references: Vec::new(),
                        });
                    }
                }
                "method_signature" => {
                    if let Some(method_name) = member.child_by_field_name("name") {
                        children.push(ExtractedSymbol {
                            name: text(method_name, source),
                            kind: SymbolKind::Method,
                            signature: Some(build_signature(member, source)),
                            doc_comment: None,
                            start_line: member.start_position().row + 1,
                            end_line: member.end_position().row + 1,
                            children: Vec::new(),
                            references: Vec::new(),
                        });
                    }
                }
                _ => {}
            }
        }
    }

    Some(ExtractedSymbol {
        name,
        kind: SymbolKind::Interface,
        signature: None,
        doc_comment: doc,
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        children,
        references: Vec::new(),
    })
}

fn extract_type_alias(node: Node, source: &[u8]) -> Option<ExtractedSymbol> {
    let name = node.child_by_field_name("name").map(|n| text(n, source))?;
    let value = node.child_by_field_name("value").map(|n| text(n, source));
    let doc = get_doc_comment(node, source);

    let mut refs = Vec::new();
    if let Some(v) = node.child_by_field_name("value") {
        extract_type_refs(v, source, &mut refs);
    }

    Some(ExtractedSymbol {
        name,
        kind: SymbolKind::Type,
        signature: value,
        doc_comment: doc,
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        children: Vec::new(),
        references: refs,
    })
}

fn extract_enum(node: Node, source: &[u8]) -> Option<ExtractedSymbol> {
    let name = node.child_by_field_name("name").map(|n| text(n, source))?;
    let doc = get_doc_comment(node, source);

    let mut children = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for member in body.children(&mut cursor) {
            if member.kind() == "enum_assignment" || member.kind() == "property_identifier" {
                let member_name = if member.kind() == "property_identifier" {
                    text(member, source)
                } else {
                    member
                        .child_by_field_name("name")
                        .map(|n| text(n, source))
                        .unwrap_or_default()
                };
                if !member_name.is_empty() {
                    children.push(ExtractedSymbol {
                        name: member_name,
                        kind: SymbolKind::EnumMember,
                        signature: None,
                        doc_comment: None,
                        start_line: member.start_position().row + 1,
                        end_line: member.end_position().row + 1,
                        children: Vec::new(),
                        references: Vec::new(),
                    });
                }
            }
        }
    }

    Some(ExtractedSymbol {
        name,
        kind: SymbolKind::Enum,
        signature: None,
        doc_comment: doc,
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        children,
        references: Vec::new(),
    })
}

fn extract_variable_declarations(node: Node, source: &[u8], symbols: &mut Vec<ExtractedSymbol>) {
    let mut cursor = node.walk();
    let is_const = text(node, source).trim_start().starts_with("const");
    for child in node.children(&mut cursor) {
        if child.kind() == "variable_declarator" {
            let name_node = child.child_by_field_name("name");
            let value_node = child.child_by_field_name("value");

            if let (Some(name_n), Some(value_n)) = (name_node, value_node) {
                let name = text(name_n, source);
                match value_n.kind() {
                    "arrow_function" | "function" | "function_expression" => {
                        let sig = build_signature(value_n, source);
                        let doc = get_doc_comment(node, source);

                        let mut refs = Vec::new();
                        if let Some(body) = value_n.child_by_field_name("body") {
                            extract_body_refs(body, source, &mut refs);
                        }

                        symbols.push(ExtractedSymbol {
                            name,
                            kind: SymbolKind::Fn,
                            signature: Some(sig),
                            doc_comment: doc,
                            start_line: node.start_position().row + 1,
                            end_line: node.end_position().row + 1,
                            children: Vec::new(),
                            references: refs,
                        });
                    }
                    _ => {
                        let type_ann = child.child_by_field_name("type").map(|n| text(n, source));
                        symbols.push(ExtractedSymbol {
                            name,
                            kind: if is_const {
                                SymbolKind::Const
                            } else {
                                SymbolKind::Var
                            },
                            signature: type_ann,
                            doc_comment: get_doc_comment(node, source),
                            start_line: node.start_position().row + 1,
                            end_line: node.end_position().row + 1,
                            children: Vec::new(),
                            references: Vec::new(),
                        });
                    }
                }
            }
        }
    }
}

/// Calls, bare identifier reads and member-property reads inside a body.
fn extract_body_refs(node: Node, source: &[u8], refs: &mut Vec<ExtractedRef>) {
    let mut cursor = node.walk();
    extract_body_refs_recursive(&mut cursor, source, refs);
}

fn extract_body_refs_recursive(
    cursor: &mut TreeCursor,
    source: &[u8],
    refs: &mut Vec<ExtractedRef>,
) {
    loop {
        let node = cursor.node();
        match node.kind() {
            "call_expression" => {
                if let Some(func) = node.child_by_field_name("function") {
                    if let Some(name) = callee_name(func, source) {
                        let pos = func.start_position();
                        refs.push(ExtractedRef::new(
                            name,
                            RefKind::Call,
                            pos.row + 1,
                            pos.column + 1,
                        ));
                    }
                }
            }
            "member_expression" if node.parent().map(|p| p.kind()) != Some("call_expression") => {
                if let Some(prop) = node.child_by_field_name("property") {
                    let pos = prop.start_position();
                    refs.push(ExtractedRef::new(
                        text(prop, source),
                        RefKind::PropertyAccess,
                        pos.row + 1,
                        pos.column + 1,
                    ));
                }
            }
            "type_annotation" => extract_type_refs(node, source, refs),
            _ => {}
        }

        if cursor.goto_first_child() {
            extract_body_refs_recursive(cursor, source, refs);
            cursor.goto_parent();
        }

        if !cursor.goto_next_sibling() {
            break;
        }
    }
}

fn callee_name(func: Node, source: &[u8]) -> Option<String> {
    match func.kind() {
        "identifier" => Some(text(func, source)),
        "member_expression" => {
            let prop = func
                .child_by_field_name("property")
                .map(|n| text(n, source));
            let obj = func.child_by_field_name("object").map(|n| text(n, source));
            match (obj, prop) {
                (Some(o), Some(p)) => Some(format!("{o}.{p}")),
                (None, Some(p)) => Some(p),
                _ => None,
            }
        }
        _ => {
            let t = text(func, source);
            if t.is_empty() { None } else { Some(t) }
        }
    }
}

/// Walks a type annotation/alias value and emits a `type_reference` for
/// every named type it mentions (ignoring primitives/keywords).
fn extract_type_refs(node: Node, source: &[u8], refs: &mut Vec<ExtractedRef>) {
    let mut cursor = node.walk();
    extract_type_refs_recursive(&mut cursor, source, refs);
}

fn extract_type_refs_recursive(
    cursor: &mut TreeCursor,
    source: &[u8],
    refs: &mut Vec<ExtractedRef>,
) {
    loop {
        let node = cursor.node();
        if node.kind() == "type_identifier" {
            let pos = node.start_position();
            refs.push(ExtractedRef::new(
                text(node, source),
                RefKind::TypeReference,
                pos.row + 1,
                pos.column + 1,
            ));
        }

        if cursor.goto_first_child() {
            extract_type_refs_recursive(cursor, source, refs);
            cursor.goto_parent();
        }

        if !cursor.goto_next_sibling() {
            break;
        }
    }
}
