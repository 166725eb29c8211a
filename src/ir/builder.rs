use crate::host_tensor::HostTensor;
use crate::ir::node::OpKind;
use crate::ir::topo::GraphTopo;
use crate::ir::{EdgeId, Graph, GraphData, GraphError, NodeId};
use crate::ops::{CommonParam, QuantParam};
use std::collections::HashSet;

struct PendingNode {
    name: String,
    kind: OpKind,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

/// Collects nodes by edge name and resolves them into a [`Graph`] in one step.
///
/// Nothing is validated until [`GraphBuilder::finalize`]; an edge name used by several nodes
/// becomes a single edge with one producer and many consumers.
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<PendingNode>,
    constants: Vec<(String, HostTensor)>,
    params: Vec<(String, serde_json::Value)>,
    common_params: Vec<(String, CommonParam)>,
    quant: Vec<(String, QuantParam)>,
    outputs: Vec<String>,
}

fn invalid(msg: String) -> GraphError {
    log::error!("{msg}");
    GraphError::InvalidGraph(msg)
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: &str, kind: OpKind, inputs: &[&str], outputs: &[&str]) -> &mut Self {
        self.nodes.push(PendingNode {
            name: name.to_string(),
            kind,
            inputs: inputs.iter().map(|x| x.to_string()).collect(),
            outputs: outputs.iter().map(|x| x.to_string()).collect(),
        });
        self
    }

    pub fn add_constant(&mut self, edge: &str, value: HostTensor) -> &mut Self {
        self.constants.push((edge.to_string(), value));
        self
    }

    /// Raw, not yet validated parameter block for a node. Bound during operator finalization.
    pub fn set_params(&mut self, node: &str, params: serde_json::Value) -> &mut Self {
        self.params.push((node.to_string(), params));
        self
    }

    pub fn set_common_param(&mut self, node: &str, param: CommonParam) -> &mut Self {
        self.common_params.push((node.to_string(), param));
        self
    }

    pub fn set_quant(&mut self, edge: &str, param: QuantParam) -> &mut Self {
        self.quant.push((edge.to_string(), param));
        self
    }

    pub fn mark_output(&mut self, edge: &str) -> &mut Self {
        self.outputs.push(edge.to_string());
        self
    }

    pub fn finalize(self) -> Result<Graph, GraphError> {
        let mut topo = GraphTopo::new();

        let mut seen_names = HashSet::new();
        for node in &self.nodes {
            if !seen_names.insert(node.name.as_str()) {
                return Err(invalid(format!("duplicate node name `{}`", node.name)));
            }
            if node.outputs.is_empty() {
                return Err(invalid(format!("node `{}` has no outputs", node.name)));
            }
            let mut seen_outputs = HashSet::new();
            for output in &node.outputs {
                if !seen_outputs.insert(output.as_str()) {
                    return Err(invalid(format!(
                        "node `{}` lists output edge `{}` more than once",
                        node.name, output
                    )));
                }
            }
        }

        for node in self.nodes {
            let inputs: Vec<EdgeId> = node.inputs.iter().map(|x| topo.add_edge(x)).collect();
            let outputs: Vec<EdgeId> = node.outputs.iter().map(|x| topo.add_edge(x)).collect();
            let node_id = topo.add_node(&node.name, node.kind, inputs.clone(), outputs.clone());
            for edge_id in inputs {
                if let Some(edge) = topo.edge_mut(edge_id) {
                    edge.add_consumer(node_id);
                }
            }
            for edge_id in outputs {
                if let Some(edge) = topo.edge_mut(edge_id) {
                    if let Some(existing) = edge.producer {
                        let msg = format!(
                            "edge `{}` is produced by both node[{}] and node[{}] `{}`",
                            edge.name, existing, node_id, node.name
                        );
                        return Err(invalid(msg));
                    }
                    edge.producer = Some(node_id);
                }
            }
        }

        let edge_id = |topo: &GraphTopo, name: &str, what: &str| -> Result<EdgeId, GraphError> {
            topo.get_edge_by_name(name)
                .map(|e| e.id())
                .ok_or_else(|| invalid(format!("{what} refers to unknown edge `{name}`")))
        };
        let node_id = |topo: &GraphTopo, name: &str, what: &str| -> Result<NodeId, GraphError> {
            topo.get_node_by_name(name)
                .map(|n| n.id())
                .ok_or_else(|| invalid(format!("{what} refers to unknown node `{name}`")))
        };

        let mut data = GraphData::default();
        for (name, value) in self.constants {
            let id = edge_id(&topo, &name, "constant")?;
            if let Some(producer) = topo.get_edge(id).and_then(|e| e.producer()) {
                return Err(invalid(format!(
                    "constant edge `{name}` is also produced by node[{producer}]"
                )));
            }
            data.constants.insert(id, value);
        }
        for (name, value) in self.params {
            data.params.insert(node_id(&topo, &name, "parameter block")?, value);
        }
        for (name, value) in self.common_params {
            data.common_params.insert(node_id(&topo, &name, "common parameter")?, value);
        }
        data.quant.resize(topo.max_edge_id());
        for (name, value) in self.quant {
            let id = edge_id(&topo, &name, "quantization entry")?;
            data.quant.set(id, value);
        }
        for name in self.outputs {
            let id = edge_id(&topo, &name, "graph output")?;
            if !data.outputs.contains(&id) {
                data.outputs.push(id);
            }
        }
        if data.outputs.is_empty() {
            data.outputs = topo
                .edges()
                .filter(|e| e.producer().is_some() && e.consumers().is_empty())
                .map(|e| e.id())
                .collect();
        }

        log::debug!(
            "finalized graph with {} nodes, {} edges, {} constants, {} outputs",
            topo.node_count(),
            topo.edge_count(),
            data.constants.len(),
            data.outputs.len()
        );
        Ok(Graph { topo, data })
    }
}
