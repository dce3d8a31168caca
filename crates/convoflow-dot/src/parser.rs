use std::collections::HashMap;

use winnow::ascii::{digit1, multispace0};
use winnow::combinator::{alt, cut_err, opt};
use winnow::error::{ContextError, ErrMode, StrContext, StrContextValue};
use winnow::token::{literal, take_while};
use winnow::{ModalResult, Parser};

use convoflow_types::ConvoflowError;

use crate::ast::*;

fn make_cut_error(desc: &'static str) -> ErrMode<ContextError<StrContext>> {
    let mut e = ContextError::new();
    e.push(StrContext::Expected(StrContextValue::Description(desc)));
    ErrMode::Cut(e)
}

/// Strip `//`, `#` and `/* */` comments, keeping string literals and newlines intact.
pub(crate) fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut at_line_start = true;

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'/') => {
                while let Some(&n) = chars.peek() {
                    if n == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '#' if at_line_start => {
                while let Some(&n) = chars.peek() {
                    if n == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    if n == '\n' {
                        out.push('\n');
                    }
                    prev = n;
                }
            }
            '"' => {
                out.push('"');
                while let Some(n) = chars.next() {
                    out.push(n);
                    if n == '\\' {
                        if let Some(escaped) = chars.next() {
                            out.push(escaped);
                        }
                    } else if n == '"' {
                        break;
                    }
                }
            }
            other => out.push(other),
        }
        if c == '\n' {
            at_line_start = true;
        } else if !c.is_whitespace() {
            at_line_start = false;
        }
    }
    out
}

fn ws<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    multispace0.parse_next(input)
}

/// Parse an identifier: [A-Za-z_][A-Za-z0-9_]*
fn identifier<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        take_while(1, |c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

/// Parse a double-quoted string with escape support.
fn quoted_string(input: &mut &str) -> ModalResult<String> {
    let _ = '"'.parse_next(input)?;
    let mut s = String::new();
    loop {
        let c = winnow::token::any.parse_next(input)?;
        match c {
            '"' => break,
            '\\' => {
                let esc = winnow::token::any.parse_next(input)?;
                match esc {
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    '\\' => s.push('\\'),
                    '"' => s.push('"'),
                    other => {
                        s.push('\\');
                        s.push(other);
                    }
                }
            }
            other => s.push(other),
        }
    }
    Ok(s)
}

/// A node id is a bare identifier or a quoted string.
fn node_id(input: &mut &str) -> ModalResult<String> {
    alt((quoted_string, identifier.map(String::from))).parse_next(input)
}

fn boolean_value(input: &mut &str) -> ModalResult<bool> {
    alt((literal("true").value(true), literal("false").value(false))).parse_next(input)
}

/// Parse a number: optional sign, digits, optional fraction.
fn number_value(input: &mut &str) -> ModalResult<AttributeValue> {
    let s: &str = (opt(alt(('-', '+'))), digit1, opt(('.', digit1)))
        .take()
        .parse_next(input)?;
    if s.contains('.') {
        s.parse()
            .map(AttributeValue::Float)
            .map_err(|_| ErrMode::Backtrack(ContextError::new()))
    } else {
        s.parse()
            .map(AttributeValue::Integer)
            .map_err(|_| ErrMode::Backtrack(ContextError::new()))
    }
}

fn attr_value(input: &mut &str) -> ModalResult<AttributeValue> {
    alt((
        quoted_string.map(AttributeValue::String),
        boolean_value.map(AttributeValue::Boolean),
        number_value,
        // Unquoted words such as `shape=box` are plain strings.
        identifier.map(|s: &str| AttributeValue::String(s.to_string())),
    ))
    .parse_next(input)
}

/// Parse a single attribute: key '=' value.
fn attr(input: &mut &str) -> ModalResult<(String, AttributeValue)> {
    let key = identifier.parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let _ = '='.parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let value = attr_value
        .context(StrContext::Expected(StrContextValue::Description(
            "attribute value",
        )))
        .parse_next(input)?;
    Ok((key.to_string(), value))
}

/// Parse an attribute block: '[' attr ( (','|';')? attr )* ']'
fn attr_block(input: &mut &str) -> ModalResult<HashMap<String, AttributeValue>> {
    let _ = '['.parse_next(input)?;
    let _ = ws.parse_next(input)?;

    let mut attrs = HashMap::new();
    while let Some((key, value)) = opt(attr).parse_next(input)? {
        attrs.insert(key, value);
        let _ = ws.parse_next(input)?;
        let _ = opt(alt((',', ';'))).parse_next(input)?;
        let _ = ws.parse_next(input)?;
    }

    let _ = ']'
        .context(StrContext::Expected(StrContextValue::CharLiteral(']')))
        .parse_next(input)?;
    Ok(attrs)
}

enum Statement {
    GraphAttrs(HashMap<String, AttributeValue>),
    NodeDefaults(HashMap<String, AttributeValue>),
    EdgeDefaults(HashMap<String, AttributeValue>),
    Node(String, HashMap<String, AttributeValue>),
    Edge(Vec<String>, HashMap<String, AttributeValue>),
    GraphAttrDecl(String, AttributeValue),
}

/// Parse `<keyword> [ ... ]` for the `graph`, `node` and `edge` default statements.
fn defaults_stmt(input: &mut &str) -> ModalResult<Statement> {
    let kind = alt((literal("graph"), literal("node"), literal("edge"))).parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let attrs = attr_block.parse_next(input)?;
    Ok(match kind {
        "graph" => Statement::GraphAttrs(attrs),
        "node" => Statement::NodeDefaults(attrs),
        _ => Statement::EdgeDefaults(attrs),
    })
}

/// Parse a node statement, an edge chain, or a bare `key = value` graph attribute.
fn node_or_edge_stmt(input: &mut &str) -> ModalResult<Statement> {
    let first = node_id.parse_next(input)?;
    let _ = ws.parse_next(input)?;

    if opt(literal("->")).parse_next(input)?.is_some() {
        let mut chain = vec![first];
        loop {
            let _ = ws.parse_next(input)?;
            let next = cut_err(node_id.context(StrContext::Expected(
                StrContextValue::Description("edge target identifier"),
            )))
            .parse_next(input)?;
            chain.push(next);
            let _ = ws.parse_next(input)?;
            if opt(literal("->")).parse_next(input)?.is_none() {
                break;
            }
        }
        let attrs = opt(attr_block).parse_next(input)?.unwrap_or_default();
        return Ok(Statement::Edge(chain, attrs));
    }

    if opt(literal("--")).parse_next(input)?.is_some() {
        return Err(make_cut_error(
            "only directed edges (->); undirected edges (--) are not supported",
        ));
    }

    if opt('=').parse_next(input)?.is_some() {
        let _ = ws.parse_next(input)?;
        let val = attr_value.parse_next(input)?;
        return Ok(Statement::GraphAttrDecl(first, val));
    }

    let attrs = opt(attr_block).parse_next(input)?.unwrap_or_default();
    Ok(Statement::Node(first, attrs))
}

fn statement(input: &mut &str) -> ModalResult<Statement> {
    let stmt = alt((defaults_stmt, node_or_edge_stmt)).parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let _ = opt(';').parse_next(input)?;
    Ok(stmt)
}

fn statements(input: &mut &str) -> ModalResult<Vec<Statement>> {
    let mut stmts = Vec::new();
    loop {
        let _ = ws.parse_next(input)?;
        if input.is_empty() || input.starts_with('}') {
            break;
        }
        stmts.push(statement.parse_next(input)?);
    }
    Ok(stmts)
}

/// Fold statements into a graph, applying node/edge defaults in source order.
fn merge_statements(name: String, stmts: Vec<Statement>) -> DotGraph {
    let mut graph = DotGraph {
        name,
        attrs: HashMap::new(),
        nodes: HashMap::new(),
        edges: Vec::new(),
    };
    let mut node_defaults: HashMap<String, AttributeValue> = HashMap::new();
    let mut edge_defaults: HashMap<String, AttributeValue> = HashMap::new();

    for stmt in stmts {
        match stmt {
            Statement::GraphAttrs(attrs) => graph.attrs.extend(attrs),
            Statement::GraphAttrDecl(key, val) => {
                graph.attrs.insert(key, val);
            }
            Statement::NodeDefaults(attrs) => node_defaults.extend(attrs),
            Statement::EdgeDefaults(attrs) => edge_defaults.extend(attrs),
            Statement::Node(id, attrs) => {
                let node = graph.nodes.entry(id.clone()).or_insert_with(|| NodeDef {
                    id,
                    attrs: node_defaults.clone(),
                    declared: true,
                });
                node.declared = true;
                node.attrs.extend(attrs);
            }
            Statement::Edge(chain, attrs) => {
                for node_id in &chain {
                    graph
                        .nodes
                        .entry(node_id.clone())
                        .or_insert_with(|| NodeDef {
                            id: node_id.clone(),
                            attrs: node_defaults.clone(),
                            declared: false,
                        });
                }
                // A -> B -> C expands to (A, B), (B, C)
                for pair in chain.windows(2) {
                    let mut merged = edge_defaults.clone();
                    merged.extend(attrs.clone());
                    graph.edges.push(EdgeDef {
                        from: pair[0].clone(),
                        to: pair[1].clone(),
                        attrs: merged,
                    });
                }
            }
        }
    }
    graph
}

/// Top-level parser: 'digraph' name? '{' statements '}'.
fn parse_digraph(input: &mut &str) -> ModalResult<DotGraph> {
    let _ = ws.parse_next(input)?;

    if input.starts_with("strict") {
        return Err(make_cut_error(
            "'digraph' keyword (strict graphs are not supported)",
        ));
    }
    if input.starts_with("graph") {
        return Err(make_cut_error(
            "'digraph' keyword (undirected graphs are not supported)",
        ));
    }

    let _ = literal("digraph")
        .context(StrContext::Expected(StrContextValue::StringLiteral(
            "digraph",
        )))
        .parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let name = opt(node_id).parse_next(input)?.unwrap_or_default();
    let _ = ws.parse_next(input)?;
    let _ = '{'
        .context(StrContext::Expected(StrContextValue::CharLiteral('{')))
        .parse_next(input)?;
    let stmts = statements.parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let _ = '}'
        .context(StrContext::Expected(StrContextValue::CharLiteral('}')))
        .parse_next(input)?;
    let _ = ws.parse_next(input)?;

    Ok(merge_statements(name, stmts))
}

/// Compute a 1-based (line, col) for the point where parsing stopped.
fn line_col(text: &str, remaining_len: usize) -> (usize, usize) {
    let consumed = text.len().saturating_sub(remaining_len);
    let prefix = &text[..consumed];
    let line = prefix.matches('\n').count() + 1;
    let col = match prefix.rfind('\n') {
        Some(pos) => prefix[pos + 1..].chars().count() + 1,
        None => prefix.chars().count() + 1,
    };
    (line, col)
}

/// Parse DOT source into a [`DotGraph`].
pub fn parse(input: &str) -> Result<DotGraph, ConvoflowError> {
    let stripped = strip_comments(input);
    let mut remaining = stripped.as_str();

    let result = parse_digraph.parse_next(&mut remaining);
    match result {
        Ok(graph) if remaining.trim().is_empty() => Ok(graph),
        Ok(_) => {
            let (line, col) = line_col(&stripped, remaining.len());
            Err(ConvoflowError::ParseError {
                line,
                col,
                message: "unexpected content after closing '}'".into(),
                source_snippet: Some(remaining.chars().take(40).collect()),
            })
        }
        Err(e) => {
            let (line, col) = line_col(&stripped, remaining.len());
            let snippet: String = remaining.chars().take(40).collect();
            Err(ConvoflowError::ParseError {
                line,
                col,
                message: e.to_string(),
                source_snippet: if snippet.is_empty() { None } else { Some(snippet) },
            })
        }
    }
}
