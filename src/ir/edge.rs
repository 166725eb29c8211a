use crate::graph;
use crate::ir::{EdgeId, NodeId};

#[derive(Clone, Debug, PartialEq)]
pub struct Edge {
    pub(crate) id: EdgeId,
    pub(crate) name: String,
    pub(crate) producer: Option<NodeId>,
    pub(crate) consumers: Vec<NodeId>,
}

impl Edge {
    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn producer(&self) -> Option<NodeId> {
        self.producer
    }

    /// Each consuming node appears once, even if it reads the edge through several inputs.
    pub fn consumers(&self) -> &[NodeId] {
        &self.consumers
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    pub(crate) fn add_consumer(&mut self, node: NodeId) {
        if !self.consumers.contains(&node) {
            self.consumers.push(node);
        }
    }

    pub(crate) fn remove_consumer(&mut self, node: NodeId) {
        self.consumers.retain(|x| *x != node);
    }
}

impl graph::Link<EdgeId> for Edge {
    fn link_id(&self) -> EdgeId {
        self.id
    }
}
