//! Graph intermediate representation: nodes, edges, the owning topology and the per-graph data
//! (constants, parameter blocks, quantization metadata) that travels with it.
pub mod builder;
pub mod edge;
pub mod model;
pub mod node;
pub mod topo;
pub mod utils;

pub use builder::GraphBuilder;
pub use edge::Edge;
pub use model::{ConstantDef, ModelDef, NodeDef};
pub use node::{Node, OpKind};
pub use topo::GraphTopo;

use crate::host_tensor::HostTensor;
use crate::ops::{CommonParam, QuantTable};
use std::collections::HashMap;

pub type NodeId = usize;
pub type EdgeId = usize;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),
    #[error("Graph contains a cycle: {remaining} of {total} nodes could not be ordered")]
    CyclicGraph { remaining: usize, total: usize },
    #[error("Unknown node id {0}")]
    UnknownNode(NodeId),
    #[error("Unknown edge id {0}")]
    UnknownEdge(EdgeId),
}

/// Everything attached to a topology that is not connectivity.
#[derive(Clone, Debug, Default)]
pub struct GraphData {
    pub constants: HashMap<EdgeId, HostTensor>,
    pub params: HashMap<NodeId, serde_json::Value>,
    pub common_params: HashMap<NodeId, CommonParam>,
    pub quant: QuantTable,
    pub outputs: Vec<EdgeId>,
}

#[derive(Clone, Debug)]
pub struct Graph {
    pub topo: GraphTopo,
    pub data: GraphData,
}

impl Graph {
    pub fn from_model_def(def: &ModelDef) -> Result<Self, GraphError> {
        let mut builder = GraphBuilder::new();
        def.populate(&mut builder)?;
        builder.finalize()
    }

    pub fn is_constant(&self, edge: EdgeId) -> bool {
        self.data.constants.contains_key(&edge)
    }

    /// Edges the caller has to bind before execution: no producer and no constant value.
    pub fn input_edges(&self) -> Vec<EdgeId> {
        self.topo
            .edges()
            .filter(|e| e.producer().is_none() && !self.is_constant(e.id()))
            .map(|e| e.id())
            .collect()
    }

    pub fn output_edges(&self) -> &[EdgeId] {
        &self.data.outputs
    }

    pub fn is_output(&self, edge: EdgeId) -> bool {
        self.data.outputs.contains(&edge)
    }

    pub fn to_graphviz(&self) -> String {
        utils::to_graphviz(&self.topo)
    }
}
