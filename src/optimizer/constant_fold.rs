use crate::host_tensor::HostTensor;
use crate::ir::{Graph, Node, NodeId};
use crate::optimizer::remove_dangling_edges;

/// Evaluates, along `order`, every node whose inputs are all constants and replaces it by
/// constants on its outputs. Folded outputs feed later folds.
///
/// `eval` runs one node on its constant inputs. Returns the folded node ids.
pub fn fold_constants<E>(
    graph: &mut Graph,
    order: &[NodeId],
    mut eval: impl FnMut(&Node, &[&HostTensor]) -> Result<Vec<HostTensor>, E>,
) -> Result<Vec<NodeId>, E> {
    let mut folded = Vec::new();
    for nid in order {
        let Some(node) = graph.topo.get_node(*nid) else {
            continue;
        };
        if node.input_count() == 0 || !node.input_ids().iter().all(|e| graph.is_constant(*e)) {
            continue;
        }
        let inputs: Vec<&HostTensor> = node
            .input_ids()
            .iter()
            .filter_map(|e| graph.data.constants.get(e))
            .collect();
        let outputs = eval(node, &inputs)?;
        let output_ids = node.output_ids().to_vec();
        log::debug!("folded node[{}] `{}` into {} constants", nid, node.name(), output_ids.len());

        graph.topo.remove_node(*nid);
        for (edge, value) in output_ids.into_iter().zip(outputs) {
            graph.data.constants.insert(edge, value);
        }
        folded.push(*nid);
    }
    if !folded.is_empty() {
        remove_dangling_edges(graph);
        log::info!("constant folding removed {} nodes", folded.len());
    }
    Ok(folded)
}
