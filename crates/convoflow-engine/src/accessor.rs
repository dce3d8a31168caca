//! Read-only access to node text and outgoing transitions.

use std::collections::BTreeMap;

use async_trait::async_trait;
use convoflow_types::{ConvoflowError, Result};

use crate::graph::CallFlowGraph;

/// Outgoing keyword -> target node id. Empty means terminal.
pub type Transitions = BTreeMap<String, String>;

/// Lookup of node data by id.
///
/// Implementations must not change what they return while a session is
/// running, and signal absence with [`ConvoflowError::NodeNotFound`].
#[async_trait]
pub trait GraphAccessor: Send + Sync {
    async fn node_text(&self, node_id: &str) -> Result<String>;

    async fn transitions(&self, node_id: &str) -> Result<Transitions>;
}

#[async_trait]
impl GraphAccessor for CallFlowGraph {
    async fn node_text(&self, node_id: &str) -> Result<String> {
        self.node(node_id)
            .and_then(|n| n.text.clone())
            .ok_or_else(|| ConvoflowError::NodeNotFound {
                node: node_id.to_string(),
            })
    }

    async fn transitions(&self, node_id: &str) -> Result<Transitions> {
        self.node(node_id)
            .map(|n| n.transitions.clone())
            .ok_or_else(|| ConvoflowError::NodeNotFound {
                node: node_id.to_string(),
            })
    }
}
