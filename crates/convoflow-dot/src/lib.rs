//! DOT parser for the Graphviz subset used to author ConvoFlow call flows.
//!
//! Parses `digraph Name { ... }` with node and edge statements, chained edges,
//! `node`/`edge`/`graph` defaults and typed attribute values.
//! Produces a typed AST: [`DotGraph`], [`NodeDef`], [`EdgeDef`], [`AttributeValue`].
//!
//! # Example
//! ```
//! let dot = r#"digraph Flow { start -> billing [keyword="billing"] }"#;
//! let graph = convoflow_dot::parse(dot).unwrap();
//! assert_eq!(graph.name, "Flow");
//! assert_eq!(graph.edges.len(), 1);
//! ```

pub mod ast;
mod parser;

pub use ast::*;
pub use parser::parse;
