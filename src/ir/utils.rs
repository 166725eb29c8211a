//! Generic traversals over node ids.
//!
//! The walkers only see the graph through callbacks, so the same code serves the scheduler, the
//! optimizer passes and tests over hand-built adjacency lists. Each call allocates its own
//! visited state sized by `max_node_id`; node ids handed out by the callbacks must be below it.
//! Successor and predecessor callbacks must report each neighbour once, consistently with the
//! in-degree callback.
use crate::ir::topo::GraphTopo;
use crate::ir::{GraphError, NodeId};
use std::collections::VecDeque;
use std::fmt::Write;

fn out_of_range(nid: NodeId, max_node_id: NodeId) -> GraphError {
    let msg = format!("node id {nid} is out of range (max node id {max_node_id})");
    log::error!("{msg}");
    GraphError::InvalidGraph(msg)
}

/// Dependency-ordered breadth-first walk.
///
/// Every node handed out by `for_each_node` is visited exactly once, after all of its
/// predecessors. `visit` receives the node and its wavefront level: the length of the longest
/// path reaching it from a source. Nodes that never become ready are reported as a cycle.
pub fn bfs<FN, GI, FS, V>(
    max_node_id: NodeId,
    for_each_node: FN,
    get_in_degree: GI,
    for_each_successor: FS,
    mut visit: V,
) -> Result<(), GraphError>
where
    FN: FnOnce(&mut dyn FnMut(NodeId)),
    GI: Fn(NodeId) -> u32,
    FS: Fn(NodeId, &mut dyn FnMut(NodeId)),
    V: FnMut(NodeId, u32),
{
    let mut in_degree = vec![0u32; max_node_id];
    let mut present = vec![false; max_node_id];
    let mut queue = VecDeque::new();
    let mut total = 0usize;
    let mut bad_id = None;

    for_each_node(&mut |nid| {
        if nid >= max_node_id {
            bad_id.get_or_insert(nid);
            return;
        }
        if present[nid] {
            return;
        }
        present[nid] = true;
        total += 1;
        in_degree[nid] = get_in_degree(nid);
        if in_degree[nid] == 0 {
            queue.push_back((nid, 0u32));
        }
    });
    if let Some(nid) = bad_id {
        return Err(out_of_range(nid, max_node_id));
    }

    let mut visited = 0usize;
    while let Some((nid, level)) = queue.pop_front() {
        visit(nid, level);
        visited += 1;
        for_each_successor(nid, &mut |succ| {
            if succ >= max_node_id || !present[succ] || in_degree[succ] == 0 {
                return;
            }
            in_degree[succ] -= 1;
            if in_degree[succ] == 0 {
                queue.push_back((succ, level + 1));
            }
        });
    }

    if visited < total {
        log::error!("bfs ordered {visited} of {total} nodes; the graph contains a cycle");
        return Err(GraphError::CyclicGraph {
            remaining: total - visited,
            total,
        });
    }
    Ok(())
}

/// Walks predecessors starting from the end frontier and visits nodes in post-order, so every
/// visited node comes after the visited nodes it depends on.
///
/// A node for which `stop` holds is visited but its predecessors are not expanded through it.
pub fn reversed_dfs<FE, FP, V>(
    max_node_id: NodeId,
    for_each_end: FE,
    for_each_predecessor: FP,
    mut visit: V,
    stop: Option<&dyn Fn(NodeId) -> bool>,
) -> Result<(), GraphError>
where
    FE: FnOnce(&mut dyn FnMut(NodeId)),
    FP: Fn(NodeId, &mut dyn FnMut(NodeId)),
    V: FnMut(NodeId),
{
    let mut ends = Vec::new();
    for_each_end(&mut |nid| ends.push(nid));

    let mut visited = vec![false; max_node_id];
    let mut stack: Vec<(NodeId, bool)> = Vec::new();
    for end in ends {
        if end >= max_node_id {
            return Err(out_of_range(end, max_node_id));
        }
        stack.push((end, false));
        while let Some((nid, expanded)) = stack.pop() {
            if expanded {
                visit(nid);
                continue;
            }
            if visited[nid] {
                continue;
            }
            visited[nid] = true;
            stack.push((nid, true));
            if stop.is_some_and(|f| f(nid)) {
                continue;
            }
            let mut preds = Vec::new();
            for_each_predecessor(nid, &mut |p| preds.push(p));
            for p in preds.into_iter().rev() {
                if p >= max_node_id {
                    return Err(out_of_range(p, max_node_id));
                }
                if !visited[p] {
                    stack.push((p, false));
                }
            }
        }
    }
    Ok(())
}

/// Forward walk that always continues along the longest remaining chain.
///
/// Among the nodes that are ready, the one with the longest path to a sink runs first, and the
/// successors it releases are explored before older ready nodes. Ties go to the lower id. The
/// result is a topological order that keeps deep chains contiguous, which shortens the lifetime
/// of intermediate tensors.
pub fn dfs_deeper_first<FN, GI, FS, V>(
    max_node_id: NodeId,
    for_each_node: FN,
    get_in_degree: GI,
    for_each_successor: FS,
    mut visit: V,
) -> Result<(), GraphError>
where
    FN: FnOnce(&mut dyn FnMut(NodeId)),
    GI: Fn(NodeId) -> u32,
    FS: Fn(NodeId, &mut dyn FnMut(NodeId)),
    V: FnMut(NodeId),
{
    let mut nodes = Vec::new();
    for_each_node(&mut |nid| nodes.push(nid));

    let mut successors: Vec<Vec<NodeId>> = vec![Vec::new(); max_node_id];
    let mut order = Vec::with_capacity(nodes.len());
    bfs(
        max_node_id,
        |f| nodes.iter().for_each(|n| f(*n)),
        &get_in_degree,
        &for_each_successor,
        |nid, _| order.push(nid),
    )?;
    for nid in &order {
        for_each_successor(*nid, &mut |s| {
            if s < max_node_id {
                successors[*nid].push(s);
            }
        });
    }

    let mut height = vec![0usize; max_node_id];
    for nid in order.iter().rev() {
        height[*nid] = 1 + successors[*nid].iter().map(|s| height[*s]).max().unwrap_or(0);
    }

    let mut present = vec![false; max_node_id];
    let mut remaining = vec![0u32; max_node_id];
    for nid in &order {
        present[*nid] = true;
        remaining[*nid] = get_in_degree(*nid);
    }

    // Ready nodes are pushed lowest priority first so the tallest one sits on top of the stack.
    let by_priority = |a: &NodeId, b: &NodeId| height[*a].cmp(&height[*b]).then(b.cmp(a));
    let mut stack: Vec<NodeId> = order.iter().copied().filter(|n| remaining[*n] == 0).collect();
    stack.sort_by(by_priority);

    while let Some(nid) = stack.pop() {
        visit(nid);
        let mut ready = Vec::new();
        for succ in &successors[nid] {
            if !present[*succ] || remaining[*succ] == 0 {
                continue;
            }
            remaining[*succ] -= 1;
            if remaining[*succ] == 0 {
                ready.push(*succ);
            }
        }
        ready.sort_by(by_priority);
        stack.extend(ready);
    }
    Ok(())
}

/// Renders the topology in graphviz DOT form. Edges without a producer appear as plain labels.
pub fn to_graphviz(topo: &GraphTopo) -> String {
    let mut out = String::from("digraph G {\n");
    for node in topo.nodes() {
        let _ = writeln!(out, "  n{} [label=\"{}\\n{}\", shape=box];", node.id(), node.name(), node.kind());
    }
    for edge in topo.edges() {
        let src = match edge.producer() {
            Some(p) => format!("n{p}"),
            None => {
                let _ = writeln!(out, "  e{} [label=\"{}\", shape=plaintext];", edge.id(), edge.name());
                format!("e{}", edge.id())
            }
        };
        if edge.consumers().is_empty() && edge.producer().is_some() {
            let _ = writeln!(out, "  e{} [label=\"{}\", shape=plaintext];", edge.id(), edge.name());
            let _ = writeln!(out, "  {} -> e{};", src, edge.id());
        }
        for consumer in edge.consumers() {
            let _ = writeln!(out, "  {} -> n{} [label=\"{}\"];", src, consumer, edge.name());
        }
    }
    out.push_str("}\n");
    out
}
