use crate::ir::utils::reversed_dfs;
use crate::ir::{EdgeId, Graph, GraphError, NodeId};

/// Removes every node that no graph output depends on. Returns the removed ids.
pub fn eliminate_dead_nodes(graph: &mut Graph) -> Result<Vec<NodeId>, GraphError> {
    let topo = &graph.topo;
    let mut live = vec![false; topo.max_node_id()];
    reversed_dfs(
        topo.max_node_id(),
        |f| {
            for edge in graph.output_edges() {
                if let Some(producer) = topo.get_edge(*edge).and_then(|e| e.producer()) {
                    f(producer);
                }
            }
        },
        |nid, f| topo.find_predecessors(nid).into_iter().for_each(|p| f(p)),
        |nid| live[nid] = true,
        None,
    )?;

    let dead: Vec<NodeId> = topo.nodes().map(|n| n.id()).filter(|id| !live[*id]).collect();
    for nid in &dead {
        if let Some(node) = graph.topo.remove_node(*nid) {
            log::debug!("removed dead node[{}] `{}` ({})", nid, node.name(), node.kind());
        }
    }
    remove_dangling_edges(graph);
    if !dead.is_empty() {
        log::info!("dead node elimination removed {} nodes", dead.len());
    }
    Ok(dead)
}

/// Removes edges left without producer and consumers that are not graph outputs, together
/// with their constant data.
pub fn remove_dangling_edges(graph: &mut Graph) -> Vec<EdgeId> {
    let dangling: Vec<EdgeId> = graph
        .topo
        .edges()
        .filter(|e| e.producer().is_none() && e.consumers().is_empty() && !graph.is_output(e.id()))
        .map(|e| e.id())
        .collect();
    for edge in &dangling {
        graph.data.constants.remove(edge);
        if let Err(e) = graph.topo.remove_edge(*edge) {
            log::warn!("could not remove dangling edge {edge}: {e}");
        }
    }
    dangling
}
