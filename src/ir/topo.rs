use crate::graph::InnerGraph;
use crate::ir::edge::Edge;
use crate::ir::node::{Node, OpKind};
use crate::ir::utils;
use crate::ir::{EdgeId, GraphError, NodeId};
use std::collections::HashMap;

/// Owns every node and edge of a graph.
///
/// Nodes and edges live in dense slots indexed by id. Removal leaves a tombstone, so ids of the
/// survivors stay valid as indices into auxiliary arrays sized by [`GraphTopo::max_node_id`] and
/// [`GraphTopo::max_edge_id`].
#[derive(Clone, Debug, Default)]
pub struct GraphTopo {
    nodes: Vec<Option<Node>>,
    edges: Vec<Option<Edge>>,
    node_ids_by_name: HashMap<String, NodeId>,
    edge_ids_by_name: HashMap<String, EdgeId>,
}

impl GraphTopo {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_edge(&mut self, name: &str) -> EdgeId {
        if let Some(id) = self.edge_ids_by_name.get(name) {
            return *id;
        }
        let id = self.edges.len();
        self.edges.push(Some(Edge {
            id,
            name: name.to_string(),
            producer: None,
            consumers: Vec::new(),
        }));
        self.edge_ids_by_name.insert(name.to_string(), id);
        id
    }

    pub(crate) fn add_node(&mut self, name: &str, kind: OpKind, inputs: Vec<EdgeId>, outputs: Vec<EdgeId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Some(Node {
            id,
            name: name.to_string(),
            kind,
            inputs,
            outputs,
        }));
        self.node_ids_by_name.insert(name.to_string(), id);
        id
    }

    pub(crate) fn edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge> {
        self.edges.get_mut(id).and_then(|x| x.as_mut())
    }

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id).and_then(|x| x.as_ref())
    }

    pub fn get_node_by_name(&self, name: &str) -> Option<&Node> {
        self.node_ids_by_name.get(name).and_then(|id| self.get_node(*id))
    }

    pub fn get_edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id).and_then(|x| x.as_ref())
    }

    pub fn get_edge_by_name(&self, name: &str) -> Option<&Edge> {
        self.edge_ids_by_name.get(name).and_then(|id| self.get_edge(*id))
    }

    /// Upper bound (exclusive) of node ids ever assigned in this snapshot.
    pub fn max_node_id(&self) -> NodeId {
        self.nodes.len()
    }

    /// Upper bound (exclusive) of edge ids ever assigned in this snapshot.
    pub fn max_edge_id(&self) -> EdgeId {
        self.edges.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|x| x.is_some()).count()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().filter(|x| x.is_some()).count()
    }

    /// Live nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter_map(|x| x.as_ref())
    }

    /// Live edges in id order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter_map(|x| x.as_ref())
    }

    /// Nodes producing any input of `node`, deduplicated, in input order.
    pub fn find_predecessors(&self, node: NodeId) -> Vec<NodeId> {
        let mut res = Vec::new();
        if let Some(node) = self.get_node(node) {
            for edge in node.input_ids() {
                if let Some(producer) = self.get_edge(*edge).and_then(|e| e.producer()) {
                    if !res.contains(&producer) {
                        res.push(producer);
                    }
                }
            }
        }
        res
    }

    /// Nodes consuming any output of `node`, deduplicated, in output order.
    pub fn find_successors(&self, node: NodeId) -> Vec<NodeId> {
        let mut res = Vec::new();
        if let Some(node) = self.get_node(node) {
            for edge in node.output_ids() {
                if let Some(edge) = self.get_edge(*edge) {
                    for consumer in edge.consumers() {
                        if !res.contains(consumer) {
                            res.push(*consumer);
                        }
                    }
                }
            }
        }
        res
    }

    /// Nodes none of whose outputs is consumed.
    pub fn find_leaf_nodes(&self) -> Vec<NodeId> {
        self.nodes()
            .filter(|node| {
                node.output_ids()
                    .iter()
                    .all(|e| self.get_edge(*e).map(|e| e.consumers().is_empty()).unwrap_or(true))
            })
            .map(|node| node.id())
            .collect()
    }

    /// Tombstones a node and detaches it from its edges. Outputs of the node lose their producer.
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        let node = self.nodes.get_mut(id)?.take()?;
        self.node_ids_by_name.remove(&node.name);
        for edge in &node.inputs {
            if let Some(edge) = self.edge_mut(*edge) {
                edge.remove_consumer(id);
            }
        }
        for edge in &node.outputs {
            if let Some(edge) = self.edge_mut(*edge) {
                if edge.producer == Some(id) {
                    edge.producer = None;
                }
            }
        }
        Some(node)
    }

    /// Tombstones an edge that is no longer connected to any node.
    pub fn remove_edge(&mut self, id: EdgeId) -> Result<Edge, GraphError> {
        let edge = self.get_edge(id).ok_or(GraphError::UnknownEdge(id))?;
        if edge.producer().is_some() || !edge.consumers().is_empty() {
            log::debug!("refusing to remove edge[{}] `{}`: still connected", id, edge.name());
            return Err(GraphError::InvalidGraph(format!(
                "edge `{}` is still connected and cannot be removed",
                edge.name()
            )));
        }
        let edge = self.edges[id].take().ok_or(GraphError::UnknownEdge(id))?;
        self.edge_ids_by_name.remove(&edge.name);
        Ok(edge)
    }

    fn in_degree(&self, node: NodeId) -> u32 {
        self.find_predecessors(node).len() as u32
    }

    /// Breadth-first dependency order over all live nodes.
    pub fn bfs_order(&self) -> Result<Vec<NodeId>, GraphError> {
        let mut order = Vec::with_capacity(self.node_count());
        utils::bfs(
            self.max_node_id(),
            |f| self.nodes().for_each(|n| f(n.id())),
            |nid| self.in_degree(nid),
            |nid, f| self.find_successors(nid).into_iter().for_each(|x| f(x)),
            |nid, _| order.push(nid),
        )?;
        Ok(order)
    }

    /// Dependency order that keeps long chains contiguous.
    pub fn deeper_first_order(&self) -> Result<Vec<NodeId>, GraphError> {
        let mut order = Vec::with_capacity(self.node_count());
        utils::dfs_deeper_first(
            self.max_node_id(),
            |f| self.nodes().for_each(|n| f(n.id())),
            |nid| self.in_degree(nid),
            |nid, f| self.find_successors(nid).into_iter().for_each(|x| f(x)),
            |nid| order.push(nid),
        )?;
        Ok(order)
    }

    /// Per-node BFS wavefront index, indexed by node id. Tombstoned ids map to `None`.
    pub fn wavefront_levels(&self) -> Result<Vec<Option<usize>>, GraphError> {
        let mut levels = vec![None; self.max_node_id()];
        utils::bfs(
            self.max_node_id(),
            |f| self.nodes().for_each(|n| f(n.id())),
            |nid| self.in_degree(nid),
            |nid, f| self.find_successors(nid).into_iter().for_each(|x| f(x)),
            |nid, level| levels[nid] = Some(level as usize),
        )?;
        Ok(levels)
    }
}

impl InnerGraph for GraphTopo {
    type NodeId = NodeId;
    type LinkId = EdgeId;
    type AnyNode = Node;
    type AnyLink = Edge;

    fn nodes(&self) -> impl Iterator<Item = NodeId> {
        GraphTopo::nodes(self).map(|n| n.id())
    }

    fn links(&self) -> impl Iterator<Item = EdgeId> {
        GraphTopo::edges(self).map(|e| e.id())
    }

    fn get_node(&self, id: &NodeId) -> Option<&Node> {
        GraphTopo::get_node(self, *id)
    }

    fn get_link(&self, id: &EdgeId) -> Option<&Edge> {
        GraphTopo::get_edge(self, *id)
    }

    fn input_links(&self) -> impl Iterator<Item = EdgeId> {
        GraphTopo::edges(self).filter(|e| e.producer().is_none()).map(|e| e.id())
    }

    fn output_links(&self) -> impl Iterator<Item = EdgeId> {
        GraphTopo::edges(self).filter(|e| e.consumers().is_empty()).map(|e| e.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::GraphBuilder;

    #[test]
    fn removal_keeps_survivor_ids() {
        let mut builder = GraphBuilder::new();
        builder.add_node("a", OpKind::new("test", "op1", 1), &["x"], &["y"]);
        builder.add_node("b", OpKind::new("test", "op1", 1), &["y"], &["z"]);
        builder.add_node("c", OpKind::new("test", "op1", 1), &["z"], &["w"]);
        let mut graph = builder.finalize().unwrap();
        let topo = &mut graph.topo;

        let max_nodes = topo.max_node_id();
        let y = topo.get_edge_by_name("y").unwrap().id();
        topo.remove_node(1).unwrap();

        assert_eq!(topo.max_node_id(), max_nodes);
        assert!(topo.get_node(1).is_none());
        assert_eq!(topo.get_node(2).unwrap().name(), "c");
        assert_eq!(topo.get_node_by_name("c").unwrap().id(), 2);
        assert!(topo.get_edge(y).unwrap().consumers().is_empty());
        assert_eq!(topo.find_leaf_nodes(), vec![0, 2]);
        assert!(topo.remove_edge(y).is_err());
    }
}
