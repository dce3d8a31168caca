//! Call-flow validation: lint rules and diagnostics.
//!
//! Call [`validate`] for advisory diagnostics or [`validate_or_raise`] to
//! fail when any `Error`-severity issue is found.

use std::collections::{BTreeSet, VecDeque};

use convoflow_types::{ConvoflowError, Result};

use crate::engine::RESERVED_COMMANDS;
use crate::graph::CallFlowGraph;

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub node_id: Option<String>,
    pub keyword: Option<String>,
    pub fix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

// ---------------------------------------------------------------------------
// LintRule trait
// ---------------------------------------------------------------------------

pub trait LintRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, graph: &CallFlowGraph) -> Vec<Diagnostic>;
}

/// Ids reachable from the start node by following transitions.
fn reachable_from_start(graph: &CallFlowGraph) -> BTreeSet<String> {
    let mut visited = BTreeSet::new();
    let mut queue = VecDeque::new();
    visited.insert(graph.start_node().to_string());
    queue.push_back(graph.start_node().to_string());

    while let Some(current) = queue.pop_front() {
        let Some(node) = graph.node(&current) else {
            continue;
        };
        for target in node.transitions.values() {
            if visited.insert(target.clone()) {
                queue.push_back(target.clone());
            }
        }
    }
    visited
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct StartNodeRule;
impl LintRule for StartNodeRule {
    fn name(&self) -> &str { "start_node" }
    fn apply(&self, graph: &CallFlowGraph) -> Vec<Diagnostic> {
        let start = graph.start_node();
        if graph.node(start).is_some() {
            return vec![];
        }
        vec![Diagnostic {
            rule: self.name().into(),
            severity: Severity::Error,
            message: format!("Call flow has no start node '{start}'"),
            node_id: Some(start.to_string()),
            keyword: None,
            fix: Some(format!("Add a node '{start}' or set the graph attribute start=\"<node>\"")),
        }]
    }
}

struct NodeTextRule;
impl LintRule for NodeTextRule {
    fn name(&self) -> &str { "node_text" }
    fn apply(&self, graph: &CallFlowGraph) -> Vec<Diagnostic> {
        graph
            .all_nodes()
            .filter(|n| n.text.is_none())
            .map(|n| Diagnostic {
                rule: self.name().into(),
                severity: Severity::Error,
                message: format!("Node '{}' has no text", n.id),
                node_id: Some(n.id.clone()),
                keyword: None,
                fix: Some(format!("Declare {} [text=\"...\"]", n.id)),
            })
            .collect()
    }
}

struct TransitionTargetExistsRule;
impl LintRule for TransitionTargetExistsRule {
    fn name(&self) -> &str { "transition_target_exists" }
    fn apply(&self, graph: &CallFlowGraph) -> Vec<Diagnostic> {
        graph
            .transitions()
            .filter(|(_, _, to)| graph.node(to).is_none())
            .map(|(from, keyword, to)| Diagnostic {
                rule: self.name().into(),
                severity: Severity::Error,
                message: format!("Transition '{keyword}' of node '{from}' targets missing node '{to}'"),
                node_id: Some(from.to_string()),
                keyword: Some(keyword.to_string()),
                fix: Some(format!("Add node '{to}' or fix the transition target")),
            })
            .collect()
    }
}

struct ReachabilityRule;
impl LintRule for ReachabilityRule {
    fn name(&self) -> &str { "reachability" }
    fn apply(&self, graph: &CallFlowGraph) -> Vec<Diagnostic> {
        if graph.node(graph.start_node()).is_none() {
            return vec![]; // StartNodeRule will catch this
        }
        let reachable = reachable_from_start(graph);
        graph
            .all_nodes()
            .filter(|n| !reachable.contains(&n.id))
            .map(|n| Diagnostic {
                rule: self.name().into(),
                severity: Severity::Warning,
                message: format!("Node '{}' is not reachable from the start node", n.id),
                node_id: Some(n.id.clone()),
                keyword: None,
                fix: Some(format!("Add a transition leading to '{}' or remove it", n.id)),
            })
            .collect()
    }
}

struct ReservedKeywordRule;
impl LintRule for ReservedKeywordRule {
    fn name(&self) -> &str { "reserved_keyword" }
    fn apply(&self, graph: &CallFlowGraph) -> Vec<Diagnostic> {
        graph
            .transitions()
            .filter(|(_, keyword, _)| RESERVED_COMMANDS.contains(&keyword.to_lowercase().as_str()))
            .map(|(from, keyword, _)| Diagnostic {
                rule: self.name().into(),
                severity: Severity::Warning,
                message: format!(
                    "Keyword '{keyword}' on node '{from}' is a reserved command and is never routed"
                ),
                node_id: Some(from.to_string()),
                keyword: Some(keyword.to_string()),
                fix: Some("Rename the keyword".into()),
            })
            .collect()
    }
}

struct TerminalReachableRule;
impl LintRule for TerminalReachableRule {
    fn name(&self) -> &str { "terminal_reachable" }
    fn apply(&self, graph: &CallFlowGraph) -> Vec<Diagnostic> {
        if graph.node(graph.start_node()).is_none() {
            return vec![];
        }
        let has_terminal = reachable_from_start(graph)
            .iter()
            .filter_map(|id| graph.node(id))
            .any(|n| n.is_terminal());
        if has_terminal {
            return vec![];
        }
        vec![Diagnostic {
            rule: self.name().into(),
            severity: Severity::Warning,
            message: "No terminal node is reachable from the start node; sessions can only end with 'exit'".into(),
            node_id: None,
            keyword: None,
            fix: Some("Add a node without outgoing transitions".into()),
        }]
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run all built-in lint rules and return collected diagnostics.
pub fn validate(graph: &CallFlowGraph) -> Vec<Diagnostic> {
    let rules: Vec<Box<dyn LintRule>> = vec![
        Box::new(StartNodeRule),
        Box::new(NodeTextRule),
        Box::new(TransitionTargetExistsRule),
        Box::new(ReachabilityRule),
        Box::new(ReservedKeywordRule),
        Box::new(TerminalReachableRule),
    ];

    let mut diagnostics = Vec::new();
    for rule in &rules {
        diagnostics.extend(rule.apply(graph));
    }
    diagnostics
}

/// Run all lint rules; return `Err` if any `Error`-severity diagnostic found.
pub fn validate_or_raise(graph: &CallFlowGraph) -> Result<Vec<Diagnostic>> {
    let diagnostics = validate(graph);
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| d.message.clone())
        .collect();
    if !errors.is_empty() {
        return Err(ConvoflowError::ValidationError(errors.join("; ")));
    }
    Ok(diagnostics)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn build(dot: &str) -> CallFlowGraph {
        CallFlowGraph::parse(dot).unwrap()
    }

    fn rules_hit(diags: &[Diagnostic]) -> Vec<&str> {
        diags.iter().map(|d| d.rule.as_str()).collect()
    }

    #[test]
    fn valid_flow_passes() {
        let g = build(r#"digraph G {
            start [text="Billing or hours?"]
            billing [text="Billing."]
            hours [text="Open 9 to 5."]
            start -> billing [keyword="billing"]
            start -> hours [keyword="business_hours"]
        }"#);
        let diags = validate(&g);
        assert!(diags.is_empty(), "Expected no diagnostics, got: {diags:?}");
        assert!(validate_or_raise(&g).is_ok());
    }

    #[test]
    fn missing_start_node_error() {
        let g = build(r#"digraph G { welcome [text="hi"] }"#);
        let diags = validate(&g);
        assert!(diags
            .iter()
            .any(|d| d.rule == "start_node" && d.severity == Severity::Error));
        assert!(matches!(
            validate_or_raise(&g).unwrap_err(),
            ConvoflowError::ValidationError(_)
        ));
    }

    #[test]
    fn start_attribute_is_respected() {
        let g = build(r#"digraph G { start = "welcome"; welcome [text="hi"] }"#);
        assert!(!rules_hit(&validate(&g)).contains(&"start_node"));
    }

    #[test]
    fn textless_node_error() {
        let g = build(r#"digraph G {
            start [text="hi"]
            start -> ghost [keyword="ghost"]
        }"#);
        let diags = validate(&g);
        let text_errors: Vec<_> = diags.iter().filter(|d| d.rule == "node_text").collect();
        assert_eq!(text_errors.len(), 1);
        assert_eq!(text_errors[0].node_id.as_deref(), Some("ghost"));
        assert_eq!(text_errors[0].severity, Severity::Error);
    }

    #[test]
    fn missing_target_error() {
        let mut g = CallFlowGraph::new("g");
        g.add_node("start", "hi")
            .add_transition("start", "billing", "billing_node")
            .unwrap();
        let diags = validate(&g);
        let d = diags
            .iter()
            .find(|d| d.rule == "transition_target_exists")
            .unwrap();
        assert_eq!(d.keyword.as_deref(), Some("billing"));
        assert!(d.message.contains("billing_node"));
    }

    #[test]
    fn unreachable_node_warning() {
        let g = build(r#"digraph G {
            start [text="hi"]
            done [text="bye"]
            orphan [text="nobody comes here"]
            start -> done
        }"#);
        let diags = validate(&g);
        let d = diags.iter().find(|d| d.rule == "reachability").unwrap();
        assert_eq!(d.node_id.as_deref(), Some("orphan"));
        assert_eq!(d.severity, Severity::Warning);
        assert!(validate_or_raise(&g).is_ok());
    }

    #[test]
    fn reserved_keyword_warning() {
        let g = build(r#"digraph G {
            start [text="hi"]
            bye [text="bye"]
            start -> bye [keyword="Exit"]
        }"#);
        let diags = validate(&g);
        assert!(diags
            .iter()
            .any(|d| d.rule == "reserved_keyword" && d.keyword.as_deref() == Some("Exit")));
    }

    #[test]
    fn cycle_without_terminal_warning() {
        let g = build(r#"digraph G {
            start [text="menu"]
            again [text="again"]
            start -> again
            again -> start
        }"#);
        assert!(rules_hit(&validate(&g)).contains(&"terminal_reachable"));
    }
}
