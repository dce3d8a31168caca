use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A parsed `digraph` with defaults already applied to its nodes and edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DotGraph {
    pub name: String,
    pub attrs: HashMap<String, AttributeValue>,
    pub nodes: HashMap<String, NodeDef>,
    /// Edges in source order, chains already expanded into pairs.
    pub edges: Vec<EdgeDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDef {
    pub id: String,
    pub attrs: HashMap<String, AttributeValue>,
    /// `false` when the node only appeared as an edge endpoint.
    pub declared: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDef {
    pub from: String,
    pub to: String,
    pub attrs: HashMap<String, AttributeValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Render the value the way it would appear on the right of `=`.
    pub fn to_dot(&self) -> String {
        match self {
            AttributeValue::String(s) => format!("\"{}\"", escape(s)),
            AttributeValue::Integer(i) => i.to_string(),
            AttributeValue::Float(f) => f.to_string(),
            AttributeValue::Boolean(b) => b.to_string(),
        }
    }
}

/// Escape a string for use inside a double-quoted DOT literal.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}
