use crate::graph::{InnerGraph, Node};
use std::collections::HashMap;

/// How node positions are derived from a schedule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum_macros::Display)]
pub enum LivenessMode {
    /// One position per node in execution order.
    #[default]
    Serial,
    /// Nodes of the same BFS wavefront share a position and are treated as live together.
    Wavefront,
}

/// Inclusive range of positions during which a tensor must stay intact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Interval {
    pub start: usize,
    pub end: usize,
}

impl Interval {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn contains(&self, position: usize) -> bool {
        self.start <= position && position <= self.end
    }
}

/// Live interval of every link touched by a positioned node.
///
/// A link lives from its producer's position (0 without producer) to its last consumer's
/// position. Links for which `is_output` holds live until `last_position`. Nodes for which
/// `position` returns `None` are ignored.
pub fn compute_liveness<G: InnerGraph>(
    graph: &G,
    position: impl Fn(&G::NodeId) -> Option<usize>,
    last_position: usize,
    is_output: impl Fn(&G::LinkId) -> bool,
) -> HashMap<G::LinkId, Interval> {
    let mut spans: HashMap<G::LinkId, (Option<usize>, usize)> = HashMap::new();
    for node_id in graph.nodes() {
        let (Some(pos), Some(node)) = (position(&node_id), graph.get_node(&node_id)) else {
            continue;
        };
        for link in node.outputs() {
            let span = spans.entry(link).or_insert((None, pos));
            span.0 = Some(span.0.map_or(pos, |s| s.min(pos)));
            span.1 = span.1.max(pos);
        }
        for link in node.inputs() {
            let span = spans.entry(link).or_insert((None, pos));
            span.1 = span.1.max(pos);
        }
    }
    spans
        .into_iter()
        .map(|(link, (start, end))| {
            let end = if is_output(&link) { last_position.max(end) } else { end };
            (link, Interval::new(start.unwrap_or(0), end))
        })
        .collect()
}
