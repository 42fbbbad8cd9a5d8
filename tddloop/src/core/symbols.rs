//! Static discovery of the top-level names a Python solution exports.
//!
//! The candidate is untrusted, so discovery is a tree-sitter walk over the
//! source text. Nothing here imports or evaluates it.

use std::cell::RefCell;

use serde::Serialize;
use tracing::{debug, warn};
use tree_sitter::{Node, Parser, Tree};

thread_local! {
    static PYTHON_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        // A language mismatch surfaces as a failed parse below.
        let _ = p.set_language(&tree_sitter_python::LANGUAGE.into());
        p
    });
}

/// Ordered, duplicate-free set of top-level names (first-seen order).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SymbolSet(Vec<String>);

impl SymbolSet {
    /// Insert `name` unless already present. Returns whether it was new.
    pub fn insert(&mut self, name: &str) -> bool {
        if self.0.iter().any(|existing| existing == name) {
            return false;
        }
        self.0.push(name.to_string());
        true
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// Location of the first syntax error in a source file (1-based).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntaxDiagnostic {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl std::fmt::Display for SyntaxDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at line {}, column {}",
            self.message, self.line, self.column
        )
    }
}

/// Result of symbol discovery.
///
/// `symbols` is always empty when `syntax_error` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Discovery {
    pub symbols: SymbolSet,
    pub syntax_error: Option<SyntaxDiagnostic>,
}

/// Enumerate the names importable from `source` if it were loaded as a module.
///
/// Collects `def`/`async def`, `class` (decorated or not), `type` aliases and
/// single-name bindings (`x = ...`, `x: T = ...`). Tuple targets, chained assignments,
/// bare annotations and nested definitions are not exported.
pub fn discover_symbols(source: &str) -> Discovery {
    let Some(tree) = parse_python(source) else {
        warn!("python parser produced no tree");
        return Discovery {
            symbols: SymbolSet::default(),
            syntax_error: Some(SyntaxDiagnostic {
                line: 1,
                column: 1,
                message: "source could not be parsed".to_string(),
            }),
        };
    };

    let root = tree.root_node();
    if root.has_error() {
        let diagnostic = first_error(root);
        warn!(%diagnostic, "solution has a syntax error; no symbols discovered");
        return Discovery {
            symbols: SymbolSet::default(),
            syntax_error: Some(diagnostic),
        };
    }

    // Python 2 statements the grammar still accepts but an interpreter rejects.
    if let Some(diagnostic) = first_legacy_statement(root) {
        warn!(%diagnostic, "solution uses Python 2 syntax; no symbols discovered");
        return Discovery {
            symbols: SymbolSet::default(),
            syntax_error: Some(diagnostic),
        };
    }

    let mut symbols = SymbolSet::default();
    let bytes = source.as_bytes();
    let mut cursor = root.walk();
    for statement in root.named_children(&mut cursor) {
        if let Some(name) = statement_name(statement, bytes) {
            symbols.insert(name);
        }
    }
    debug!(count = symbols.len(), "discovered top-level symbols");

    Discovery {
        symbols,
        syntax_error: None,
    }
}

fn parse_python(source: &str) -> Option<Tree> {
    PYTHON_PARSER.with(|p| p.borrow_mut().parse(source, None))
}

/// Name bound by a module-level statement, if it binds exactly one.
fn statement_name<'a>(node: Node<'_>, source: &'a [u8]) -> Option<&'a str> {
    match node.kind() {
        "function_definition" | "class_definition" => field_text(node, "name", source),
        "decorated_definition" => {
            let definition = node.child_by_field_name("definition")?;
            statement_name(definition, source)
        }
        "type_alias_statement" => {
            let left = node
                .child_by_field_name("left")
                .or_else(|| node.named_child(0))?;
            alias_name(left, source)
        }
        "expression_statement" => {
            let first = node.named_child(0)?;
            if node.named_child_count() != 1 || first.kind() != "assignment" {
                return None;
            }
            assignment_name(first, source)
        }
        _ => None,
    }
}

fn assignment_name<'a>(node: Node<'_>, source: &'a [u8]) -> Option<&'a str> {
    let left = node.child_by_field_name("left")?;
    if left.kind() != "identifier" {
        return None;
    }
    // `x: int` declares without binding; `a = b = 1` is multi-target.
    let right = node.child_by_field_name("right")?;
    if right.kind() == "assignment" {
        return None;
    }
    left.utf8_text(source).ok()
}

/// Name declared by the left side of `type Name[T] = ...`.
fn alias_name<'a>(node: Node<'_>, source: &'a [u8]) -> Option<&'a str> {
    match node.kind() {
        "identifier" => node.utf8_text(source).ok(),
        "type" | "generic_type" => alias_name(node.named_child(0)?, source),
        "subscript" => alias_name(node.child_by_field_name("value")?, source),
        _ => None,
    }
}

fn field_text<'a>(node: Node<'_>, field: &str, source: &'a [u8]) -> Option<&'a str> {
    node.child_by_field_name(field)?.utf8_text(source).ok()
}

fn first_legacy_statement(root: Node<'_>) -> Option<SyntaxDiagnostic> {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if matches!(node.kind(), "print_statement" | "exec_statement") {
            let position = node.start_position();
            let keyword = node.kind().trim_end_matches("_statement");
            return Some(SyntaxDiagnostic {
                line: position.row + 1,
                column: position.column + 1,
                message: format!("syntax error: Python 2 {keyword} statement"),
            });
        }
        if cursor.goto_first_child() {
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}

fn first_error(root: Node<'_>) -> SyntaxDiagnostic {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            let position = node.start_position();
            let message = if node.is_missing() {
                format!("syntax error: missing {}", node.kind())
            } else {
                "syntax error".to_string()
            };
            return SyntaxDiagnostic {
                line: position.row + 1,
                column: position.column + 1,
                message,
            };
        }

        if node.has_error() && cursor.goto_first_child() {
            continue;
        }

        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                let position = root.start_position();
                return SyntaxDiagnostic {
                    line: position.row + 1,
                    column: position.column + 1,
                    message: "syntax error".to_string(),
                };
            }
        }
    }
}
