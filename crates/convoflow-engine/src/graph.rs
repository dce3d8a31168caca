use std::collections::{BTreeMap, HashMap};

use convoflow_dot::{AttributeValue, DotGraph, EdgeDef, NodeDef};
use convoflow_types::{ConvoflowError, Result};

/// Start node used when a flow does not name one.
pub const DEFAULT_START_NODE: &str = "start";

#[derive(Debug, Clone)]
pub struct FlowNode {
    pub id: String,
    /// `None` when the node was referenced but never given text.
    pub text: Option<String>,
    /// Outgoing keyword -> target node id. Empty means terminal.
    pub transitions: BTreeMap<String, String>,
    pub raw_attrs: HashMap<String, AttributeValue>,
}

impl FlowNode {
    fn bare(id: &str) -> Self {
        Self {
            id: id.to_string(),
            text: None,
            transitions: BTreeMap::new(),
            raw_attrs: HashMap::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.transitions.is_empty()
    }
}

/// In-memory call flow. Read-only once built, so one instance can back any
/// number of sessions behind an `Arc`.
#[derive(Debug, Clone)]
pub struct CallFlowGraph {
    pub name: String,
    pub attrs: HashMap<String, AttributeValue>,
    start: String,
    nodes: BTreeMap<String, FlowNode>,
}

// --- Attribute extraction helpers ---

fn get_text_attr(attrs: &HashMap<String, AttributeValue>, key: &str) -> Option<String> {
    attrs.get(key).map(|v| match v {
        AttributeValue::String(s) => s.clone(),
        AttributeValue::Integer(i) => i.to_string(),
        AttributeValue::Float(f) => f.to_string(),
        AttributeValue::Boolean(b) => b.to_string(),
    })
}

fn node_def_to_flow_node(id: &str, def: &NodeDef) -> FlowNode {
    FlowNode {
        id: id.to_string(),
        text: get_text_attr(&def.attrs, "text").or_else(|| get_text_attr(&def.attrs, "label")),
        transitions: BTreeMap::new(),
        raw_attrs: def.attrs.clone(),
    }
}

fn edge_keyword(edge: &EdgeDef) -> String {
    get_text_attr(&edge.attrs, "keyword")
        .or_else(|| get_text_attr(&edge.attrs, "label"))
        .unwrap_or_else(|| edge.to.clone())
}

impl CallFlowGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: HashMap::new(),
            start: DEFAULT_START_NODE.to_string(),
            nodes: BTreeMap::new(),
        }
    }

    /// Parse DOT source and build the flow from it.
    pub fn parse(source: &str) -> Result<Self> {
        Self::from_dot(convoflow_dot::parse(source)?)
    }

    pub fn from_dot(graph: DotGraph) -> Result<Self> {
        let mut flow = Self::new(graph.name.clone());
        if let Some(start) = get_text_attr(&graph.attrs, "start") {
            flow.start = start;
        }

        for (id, def) in &graph.nodes {
            flow.nodes.insert(id.clone(), node_def_to_flow_node(id, def));
        }
        for edge in &graph.edges {
            flow.add_transition(&edge.from, &edge_keyword(edge), &edge.to)?;
        }

        flow.attrs = graph.attrs;
        Ok(flow)
    }

    /// Create the node if needed and set its display text.
    pub fn add_node(&mut self, id: &str, text: impl Into<String>) -> &mut Self {
        self.nodes
            .entry(id.to_string())
            .or_insert_with(|| FlowNode::bare(id))
            .text = Some(text.into());
        self
    }

    /// Add `from --keyword--> to`. Keywords are unique per source node.
    pub fn add_transition(&mut self, from: &str, keyword: &str, to: &str) -> Result<&mut Self> {
        let node = self
            .nodes
            .entry(from.to_string())
            .or_insert_with(|| FlowNode::bare(from));
        if let Some(existing) = node.transitions.get(keyword) {
            return Err(ConvoflowError::ValidationError(format!(
                "Node '{from}' has two transitions with keyword '{keyword}' (to '{existing}' and '{to}')"
            )));
        }
        node.transitions.insert(keyword.to_string(), to.to_string());
        Ok(self)
    }

    pub fn set_start_node(&mut self, id: impl Into<String>) -> &mut Self {
        self.start = id.into();
        self
    }

    pub fn start_node(&self) -> &str {
        &self.start
    }

    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.get(id)
    }

    /// All nodes, ordered by id.
    pub fn all_nodes(&self) -> impl Iterator<Item = &FlowNode> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn transition_count(&self) -> usize {
        self.nodes.values().map(|n| n.transitions.len()).sum()
    }

    /// Every `(from, keyword, to)` triple, ordered by source then keyword.
    pub fn transitions(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.nodes.values().flat_map(|n| {
            n.transitions
                .iter()
                .map(move |(k, to)| (n.id.as_str(), k.as_str(), to.as_str()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MENU: &str = r#"digraph CoolCompany {
        start [text="What can I help you with today?"]
        billing [label="Want to check your balance or make a payment?"]
        balance [text="Redirecting to balance system..."]
        payment [text="Redirecting to payment system..."]

        start -> billing [keyword="billing"]
        billing -> balance [label="account_balance"]
        billing -> payment
    }"#;

    #[test]
    fn builds_nodes_and_keywords_from_dot() {
        let g = CallFlowGraph::parse(MENU).unwrap();
        assert_eq!(g.name, "CoolCompany");
        assert_eq!(g.start_node(), "start");
        assert_eq!(g.node_count(), 4);
        assert_eq!(g.transition_count(), 3);

        let billing = g.node("billing").unwrap();
        assert_eq!(
            billing.text.as_deref(),
            Some("Want to check your balance or make a payment?")
        );
        assert_eq!(billing.transitions["account_balance"], "balance");
        // No keyword or label: the target id is the keyword.
        assert_eq!(billing.transitions["payment"], "payment");
        assert!(g.node("payment").unwrap().is_terminal());
    }

    #[test]
    fn text_attribute_wins_over_label() {
        let g = CallFlowGraph::parse(r#"digraph G { start [text="spoken", label="drawn"] }"#).unwrap();
        assert_eq!(g.node("start").unwrap().text.as_deref(), Some("spoken"));
    }

    #[test]
    fn edge_only_nodes_have_no_text() {
        let g = CallFlowGraph::parse(r#"digraph G { start [text="hi"] start -> ghost }"#).unwrap();
        assert!(g.node("ghost").unwrap().text.is_none());
    }

    #[test]
    fn start_graph_attribute() {
        let g = CallFlowGraph::parse(r#"digraph G { start = "welcome"; welcome [text="hi"] }"#).unwrap();
        assert_eq!(g.start_node(), "welcome");
    }

    #[test]
    fn duplicate_keyword_rejected() {
        let err = CallFlowGraph::parse(
            r#"digraph G {
                start -> a [keyword="help"]
                start -> b [keyword="help"]
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConvoflowError::ValidationError(_)));
        assert!(err.to_string().contains("'help'"));
    }

    #[test]
    fn same_keyword_on_different_nodes_is_fine() {
        let g = CallFlowGraph::parse(
            r#"digraph G {
                start -> a [keyword="help"]
                a -> b [keyword="help"]
            }"#,
        )
        .unwrap();
        assert_eq!(g.transition_count(), 2);
    }

    #[test]
    fn builder_mirrors_dot() {
        let mut g = CallFlowGraph::new("built");
        g.add_node("start", "Hello")
            .add_node("billing_node", "Billing")
            .add_transition("start", "billing", "billing_node")
            .unwrap();
        assert_eq!(g.node("start").unwrap().transitions["billing"], "billing_node");
        assert!(g.add_transition("start", "billing", "elsewhere").is_err());

        let triples: Vec<_> = g.transitions().collect();
        assert_eq!(triples, vec![("start", "billing", "billing_node")]);
    }

    #[test]
    fn add_node_keeps_existing_transitions() {
        let mut g = CallFlowGraph::new("g");
        g.add_transition("start", "a", "A").unwrap();
        g.add_node("start", "Now with text");
        let start = g.node("start").unwrap();
        assert_eq!(start.text.as_deref(), Some("Now with text"));
        assert_eq!(start.transitions.len(), 1);
    }
}
