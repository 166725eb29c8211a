use crate::graph;
use crate::ir::{EdgeId, NodeId};
use serde::{Deserialize, Serialize};

/// The (domain, name, version) triple identifying an operator's semantics.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpKind {
    #[serde(default)]
    pub domain: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u64,
}

fn default_version() -> u64 {
    1
}

impl OpKind {
    pub fn new(domain: &str, name: &str, version: u64) -> Self {
        Self {
            domain: domain.to_string(),
            name: name.to_string(),
            version,
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.domain.is_empty() {
            write!(f, "{}-{}", self.name, self.version)
        } else {
            write!(f, "{}.{}-{}", self.domain, self.name, self.version)
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) kind: OpKind,
    pub(crate) inputs: Vec<EdgeId>,
    pub(crate) outputs: Vec<EdgeId>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    pub fn input_ids(&self) -> &[EdgeId] {
        &self.inputs
    }

    pub fn output_ids(&self) -> &[EdgeId] {
        &self.outputs
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn input(&self, idx: usize) -> Option<EdgeId> {
        self.inputs.get(idx).copied()
    }

    pub fn output(&self, idx: usize) -> Option<EdgeId> {
        self.outputs.get(idx).copied()
    }
}

impl graph::Node<EdgeId> for Node {
    fn inputs(&self) -> impl Iterator<Item = EdgeId> {
        self.inputs.iter().copied()
    }

    fn outputs(&self) -> impl Iterator<Item = EdgeId> {
        self.outputs.iter().copied()
    }
}
