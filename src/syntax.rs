//! Parser adapter: source text in, syntax tree and normalized locations out.
//!
//! The tree-sitter grammars are error tolerant, so "did it parse" is decided
//! here: any ERROR or MISSING node turns the whole parse into a [`ParseError`].
//! Model files are edited live, so this is the common path, not an exceptional one.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tree_sitter::{Language, Node, Parser, Tree};

use crate::error::ParseError;

/// One end of a source span.
///
/// `line` is 1-based, `character` is 0-based. `character` and `offset` count
/// UTF-16 code units, which is what editors use for cursor positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub offset: u32,
    pub line: u32,
    pub character: u32,
}

/// Half-open `[from, to)` span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub from: SourceLocation,
    pub to: SourceLocation,
}

/// Grammar flavour, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Plain JavaScript with JSX, class fields and decorators.
    JavaScript,
    /// TypeScript with JSX.
    TypeScript,
    Tsx,
}

impl Dialect {
    pub fn for_path(path: &Path) -> Self {
        match path_ext_lower(path).as_str() {
            "ts" | "mts" | "cts" => Dialect::TypeScript,
            "tsx" => Dialect::Tsx,
            // Unknown extensions get the most permissive untyped grammar.
            _ => Dialect::JavaScript,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Dialect::JavaScript => "javascript",
            Dialect::TypeScript => "typescript",
            Dialect::Tsx => "tsx",
        }
    }

    fn language(self) -> Language {
        match self {
            Dialect::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            // JSX is accepted in every dialect, so `.ts` files use the TSX
            // grammar too; `<T>x` casts are rejected there as they are in `.tsx`.
            Dialect::TypeScript | Dialect::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }
}

pub(crate) fn path_ext_lower(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Byte offset -> (line, UTF-16 column, UTF-16 offset) conversion table.
#[derive(Debug)]
struct LineIndex {
    /// Byte offset of the first character of each line.
    line_starts: Vec<usize>,
    /// UTF-16 offset of the first character of each line.
    utf16_starts: Vec<u32>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        let mut utf16_starts = vec![0];
        let mut utf16: u32 = 0;
        for (idx, ch) in text.char_indices() {
            utf16 += ch.len_utf16() as u32;
            if ch == '\n' {
                line_starts.push(idx + 1);
                utf16_starts.push(utf16);
            }
        }
        Self {
            line_starts,
            utf16_starts,
        }
    }

    fn location(&self, text: &str, byte: usize) -> Option<SourceLocation> {
        if byte > text.len() {
            return None;
        }
        let line = self.line_starts.partition_point(|&start| start <= byte) - 1;
        let start = self.line_starts[line];
        let character: u32 = text
            .get(start..byte)?
            .chars()
            .map(|c| c.len_utf16() as u32)
            .sum();
        Some(SourceLocation {
            offset: self.utf16_starts[line] + character,
            line: line as u32 + 1,
            character,
        })
    }
}

/// A successfully parsed file: the tree plus the text it was parsed from.
pub struct SyntaxTree {
    source: String,
    tree: Tree,
    dialect: Dialect,
    lines: LineIndex,
}

impl std::fmt::Debug for SyntaxTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntaxTree")
            .field("dialect", &self.dialect)
            .field("bytes", &self.source.len())
            .finish()
    }
}

/// Parse `source_text`, choosing the grammar from `file_path`'s extension.
pub fn parse(source_text: &str, file_path: &Path) -> Result<SyntaxTree, ParseError> {
    let dialect = Dialect::for_path(file_path);

    let mut parser = Parser::new();
    parser
        .set_language(&dialect.language())
        .map_err(|e| ParseError::Grammar {
            dialect: dialect.name(),
            message: e.to_string(),
        })?;

    let tree = parser.parse(source_text, None).ok_or(ParseError::NoTree)?;
    let parsed = SyntaxTree {
        source: source_text.to_string(),
        tree,
        dialect,
        lines: LineIndex::new(source_text),
    };

    if parsed.root().has_error() {
        return Err(parsed.first_syntax_error());
    }
    Ok(parsed)
}

impl SyntaxTree {
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn text(&self, node: Node<'_>) -> &str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    /// Span of `node`, or `None` for nodes the parser synthesized (MISSING
    /// tokens) or whose byte range does not map back onto the source.
    pub fn location_of(&self, node: Node<'_>) -> Option<Span> {
        if node.is_missing() || node.end_byte() < node.start_byte() {
            return None;
        }
        let from = self.lines.location(&self.source, node.start_byte())?;
        let to = self.lines.location(&self.source, node.end_byte())?;
        Some(Span { from, to })
    }

    fn first_syntax_error(&self) -> ParseError {
        let mut stack = vec![self.root()];
        while let Some(node) = stack.pop() {
            if node.is_error() || node.is_missing() {
                let at = self
                    .lines
                    .location(&self.source, node.start_byte())
                    .unwrap_or(SourceLocation {
                        offset: 0,
                        line: 1,
                        character: 0,
                    });
                let message = if node.is_missing() {
                    format!("missing `{}`", node.kind())
                } else {
                    let snippet: String = self.text(node).chars().take(24).collect();
                    format!("unexpected `{}`", snippet.trim())
                };
                return ParseError::Syntax {
                    message,
                    line: at.line,
                    character: at.character,
                };
            }
            if !node.has_error() {
                continue;
            }
            // Push in reverse so the leftmost offending child is found first.
            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
        ParseError::Syntax {
            message: "syntax error".to_string(),
            line: 1,
            character: 0,
        }
    }

    // ── Lowering into tagged variants ──────────────────────────────────────

    /// Classify an expression node. Parentheses are transparent.
    pub fn expr<'t>(&'t self, node: Node<'t>) -> Expr<'t> {
        match node.kind() {
            "parenthesized_expression" => match node.named_child(0) {
                Some(inner) => self.expr(inner),
                None => Expr::Other(node),
            },
            "object" => Expr::Object(ObjectLit { node }),
            "string" => Expr::Str(string_value(self.text(node))),
            _ => Expr::Other(node),
        }
    }

    /// `export default <expr>` statements yield their value expression.
    pub fn default_export_value<'t>(&'t self, node: Node<'t>) -> Option<Node<'t>> {
        if node.kind() != "export_statement" {
            return None;
        }
        // `value` is only populated for `export default <expression>`.
        node.child_by_field_name("value")
    }

    /// Top-level members of an object literal, in source order.
    pub fn properties<'t>(&'t self, object: ObjectLit<'t>) -> Vec<Property<'t>> {
        let mut cursor = object.node.walk();
        object
            .node
            .named_children(&mut cursor)
            .map(|child| self.property(child))
            .collect()
    }

    fn property<'t>(&'t self, node: Node<'t>) -> Property<'t> {
        match node.kind() {
            "pair" => {
                let key = node.child_by_field_name("key");
                let value = node.child_by_field_name("value");
                match (key, value) {
                    (Some(key), Some(value)) => Property::Pair {
                        key: self.key(key),
                        value: self.expr(value),
                    },
                    _ => Property::Other(node),
                }
            }
            "method_definition" => match node.child_by_field_name("name") {
                Some(name) => Property::Method { key: self.key(name) },
                None => Property::Other(node),
            },
            "shorthand_property_identifier" => Property::Shorthand { key: self.key(node) },
            "spread_element" => Property::Spread(node),
            _ => Property::Other(node),
        }
    }

    fn key<'t>(&'t self, node: Node<'t>) -> Key<'t> {
        let name = match node.kind() {
            "property_identifier" | "shorthand_property_identifier" | "identifier" => {
                Some(self.text(node).to_string())
            }
            "string" => Some(string_value(self.text(node))),
            // computed keys, numbers and private names have no static name
            _ => None,
        }
        .filter(|n| !n.is_empty());
        Key { node, name }
    }
}

fn unquote(raw: &str) -> &str {
    let raw = raw.trim();
    for q in ['\'', '"'] {
        if raw.len() >= 2 && raw.starts_with(q) && raw.ends_with(q) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

/// Value of a string literal: quotes removed and escape sequences decoded.
///
/// Decoding goes through UTF-16 so `\uD83D\uDE00` pairs combine; malformed
/// escapes are kept as written.
fn string_value(raw: &str) -> String {
    let body = unquote(raw);
    let mut units: Vec<u16> = Vec::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    fn push(units: &mut Vec<u16>, c: char) {
        let mut buf = [0u16; 2];
        units.extend_from_slice(c.encode_utf16(&mut buf));
    }

    while let Some(c) = chars.next() {
        if c != '\\' {
            push(&mut units, c);
            continue;
        }
        let Some(esc) = chars.next() else {
            push(&mut units, c);
            break;
        };
        match esc {
            'n' => push(&mut units, '\n'),
            't' => push(&mut units, '\t'),
            'r' => push(&mut units, '\r'),
            'b' => push(&mut units, '\u{8}'),
            'f' => push(&mut units, '\u{c}'),
            'v' => push(&mut units, '\u{b}'),
            '0' if !chars.peek().is_some_and(|d| d.is_ascii_digit()) => push(&mut units, '\0'),
            // Line continuation.
            '\n' => {}
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            'x' => {
                let hex: String = chars.clone().take(2).collect();
                match u16::from_str_radix(&hex, 16) {
                    Ok(unit) if hex.len() == 2 => {
                        chars.nth(1);
                        units.push(unit);
                    }
                    _ => push(&mut units, 'x'),
                }
            }
            'u' if chars.peek() == Some(&'{') => {
                let digits: String = chars.clone().skip(1).take_while(|d| *d != '}').collect();
                let code = u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32);
                match code {
                    Some(ch) if !digits.is_empty() => {
                        chars.nth(digits.chars().count() + 1);
                        push(&mut units, ch);
                    }
                    _ => push(&mut units, 'u'),
                }
            }
            'u' => {
                let hex: String = chars.clone().take(4).collect();
                match u16::from_str_radix(&hex, 16) {
                    Ok(unit) if hex.len() == 4 => {
                        chars.nth(3);
                        units.push(unit);
                    }
                    _ => push(&mut units, 'u'),
                }
            }
            other => push(&mut units, other),
        }
    }
    String::from_utf16_lossy(&units)
}

/// An expression, narrowed to the shapes model extraction cares about.
#[derive(Debug, Clone)]
pub enum Expr<'t> {
    Object(ObjectLit<'t>),
    /// String literal, quotes removed.
    Str(String),
    Other(Node<'t>),
}

#[derive(Debug, Clone, Copy)]
pub struct ObjectLit<'t> {
    pub node: Node<'t>,
}

/// Property key with its statically known name, if any.
#[derive(Debug, Clone)]
pub struct Key<'t> {
    pub node: Node<'t>,
    pub name: Option<String>,
}

/// One member of an object literal.
#[derive(Debug, Clone)]
pub enum Property<'t> {
    /// `key: value`
    Pair { key: Key<'t>, value: Expr<'t> },
    /// `key() {}`, `*key() {}`, `async key() {}`, getters and setters.
    Method { key: Key<'t> },
    /// `{ key }`
    Shorthand { key: Key<'t> },
    /// `...rest`
    Spread(Node<'t>),
    /// Comments and anything else the grammar places between members.
    Other(Node<'t>),
}

impl<'t> Property<'t> {
    pub fn key(&self) -> Option<&Key<'t>> {
        match self {
            Property::Pair { key, .. } | Property::Method { key } | Property::Shorthand { key } => {
                Some(key)
            }
            Property::Spread(_) | Property::Other(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn first_pair_key_span(tree: &SyntaxTree) -> Span {
        let root = tree.root();
        let mut cursor = root.walk();
        for stmt in root.named_children(&mut cursor) {
            if let Some(value) = tree.default_export_value(stmt) {
                if let Expr::Object(obj) = tree.expr(value) {
                    let props = tree.properties(obj);
                    let key = props.iter().find_map(|p| p.key()).unwrap();
                    return tree.location_of(key.node).unwrap();
                }
            }
        }
        panic!("no default export object");
    }

    #[test]
    fn dialect_follows_extension() {
        assert_eq!(Dialect::for_path(Path::new("/a/user.ts")), Dialect::TypeScript);
        assert_eq!(Dialect::for_path(Path::new("/a/user.TSX")), Dialect::Tsx);
        assert_eq!(Dialect::for_path(Path::new("/a/user.jsx")), Dialect::JavaScript);
        assert_eq!(Dialect::for_path(Path::new("/a/user")), Dialect::JavaScript);
    }

    #[test]
    fn type_annotations_need_typescript_extension() {
        let src = "type A = { payload: any };\nexport default { namespace: 'a' };\n";
        assert!(parse(src, &PathBuf::from("m.ts")).is_ok());
        assert!(parse(src, &PathBuf::from("m.js")).is_err());
    }

    #[test]
    fn jsx_and_spread_parse_in_javascript() {
        let src = "const el = <div {...props}>hi</div>;\nexport default { ...base, namespace: 'x' };\n";
        assert!(parse(src, &PathBuf::from("m.js")).is_ok());
        assert!(parse(src, &PathBuf::from("m.tsx")).is_ok());
        assert!(parse(src, &PathBuf::from("m.ts")).is_ok());
    }

    #[test]
    fn angle_bracket_casts_are_rejected_like_tsx() {
        let src = "const n = <number>x;\nexport default { namespace: 'a' };\n";
        assert!(parse(src, &PathBuf::from("m.ts")).is_err());
        assert!(parse(src, &PathBuf::from("m.tsx")).is_err());
        let src = "const n = x as number;\nexport default { namespace: 'a' };\n";
        assert!(parse(src, &PathBuf::from("m.ts")).is_ok());
    }

    #[test]
    fn string_escapes_are_decoded() {
        assert_eq!(string_value(r"'it\'s'"), "it's");
        assert_eq!(string_value(r#""say \"hi\"""#), "say \"hi\"");
        assert_eq!(string_value(r"'a\\b'"), "a\\b");
        assert_eq!(string_value(r"'\u0041\x42\u{43}'"), "ABC");
        assert_eq!(string_value(r"'\uD83D\uDE00'"), "😀");
        assert_eq!(string_value(r"'tab\there'"), "tab\there");
        assert_eq!(string_value(r"'bad\u12'"), "badu12");
    }

    #[test]
    fn syntax_error_reports_position() {
        let src = "export default {\n  namespace: 'a',,\n";
        let err = parse(src, &PathBuf::from("m.js")).unwrap_err();
        match err {
            ParseError::Syntax { line, .. } => assert!(line >= 2, "line was {line}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn locations_are_one_based_lines_zero_based_columns() {
        let src = "// header\nexport default {\n  namespace: 'a',\n};\n";
        let tree = parse(src, &PathBuf::from("m.js")).unwrap();
        let span = first_pair_key_span(&tree);
        assert_eq!(span.from.line, 3);
        assert_eq!(span.from.character, 2);
        assert_eq!(span.to.character, 11);
        assert_eq!(span.from.offset as usize, src.find("namespace").unwrap());
        assert_eq!(span.to.offset - span.from.offset, "namespace".len() as u32);
    }

    #[test]
    fn columns_count_utf16_units() {
        let src = "export default { /* ünï 😀 */ namespace: 'a' };\n";
        let tree = parse(src, &PathBuf::from("m.js")).unwrap();
        let span = first_pair_key_span(&tree);
        let expected: u32 = src[..src.find("namespace").unwrap()]
            .chars()
            .map(|c| c.len_utf16() as u32)
            .sum();
        assert_eq!(span.from.character, expected);
        assert_eq!(span.from.offset, expected);
    }

    #[test]
    fn parentheses_are_transparent_and_strings_unquoted() {
        let src = "export default ({ namespace: \"quoted\" });\n";
        let tree = parse(src, &PathBuf::from("m.js")).unwrap();
        let root = tree.root();
        let stmt = root.named_child(0).unwrap();
        let value = tree.default_export_value(stmt).unwrap();
        let Expr::Object(obj) = tree.expr(value) else {
            panic!("expected object literal");
        };
        match tree.properties(obj).first() {
            Some(Property::Pair { key, value: Expr::Str(s) }) => {
                assert_eq!(key.name.as_deref(), Some("namespace"));
                assert_eq!(s, "quoted");
            }
            other => panic!("unexpected property {other:?}"),
        }
    }
}
