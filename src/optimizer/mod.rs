//! Graph rewriting passes, gated by the engine's optimization level.
mod constant_fold;
mod dead_code;

pub use constant_fold::fold_constants;
pub use dead_code::{eliminate_dead_nodes, remove_dangling_edges};

use crate::engines::OptimizationLevel;
use crate::ir::NodeId;

/// Passes enabled at a given optimization level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassSet {
    pub dead_node_elimination: bool,
    pub constant_folding: bool,
}

impl PassSet {
    pub fn for_level(level: OptimizationLevel) -> Self {
        Self {
            dead_node_elimination: level >= OptimizationLevel::Basic,
            constant_folding: level >= OptimizationLevel::Extended,
        }
    }
}

/// Nodes removed by the passes that ran.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    pub dead_nodes: Vec<NodeId>,
    pub folded_nodes: Vec<NodeId>,
}
