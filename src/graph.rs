//! Backbone traits shared by the graph layers of the runtime.
//!
//! The IR topology implements these so that passes which only care about connectivity
//! (liveness analysis, execution observers) stay independent of the concrete node type.
use crate::host_tensor::HostTensor;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Instant;

/// A tensor value flowing between a producer node and its consumers.
pub trait Link<LinkIdT: Clone + Eq + Hash + Debug> {
    /// Stable id at graph scope.
    fn link_id(&self) -> LinkIdT;
}

/// Node within a graph. Exposes its interface to links.
pub trait Node<LinkIdT: Clone + Eq + Hash + Debug> {
    /// Incoming link handles in input index order.
    fn inputs(&self) -> impl Iterator<Item = LinkIdT>;
    /// Outgoing link handles in output index order.
    fn outputs(&self) -> impl Iterator<Item = LinkIdT>;
}

/// The inner structure of a graph: nodes and links, plus IO interface.
pub trait InnerGraph {
    type NodeId: Clone + Eq + Hash + Debug;
    type LinkId: Clone + Eq + Hash + Debug;
    type AnyNode: Node<Self::LinkId>;
    type AnyLink: Link<Self::LinkId>;

    /// Deterministic iteration over live nodes and links.
    fn nodes(&self) -> impl Iterator<Item = Self::NodeId>;
    fn links(&self) -> impl Iterator<Item = Self::LinkId>;

    fn get_node(&self, id: &Self::NodeId) -> Option<&Self::AnyNode>;
    fn get_link(&self, id: &Self::LinkId) -> Option<&Self::AnyLink>;

    /// Links with no producer.
    fn input_links(&self) -> impl Iterator<Item = Self::LinkId>;
    /// Links with no consumer.
    fn output_links(&self) -> impl Iterator<Item = Self::LinkId>;
}

/// Observer API for instrumentation of graph execution.
pub trait Observer<G: InnerGraph> {
    fn on_node_scheduled(&mut self, _node: &G::AnyNode) {}
    fn on_node_executed(&mut self, _node: &G::AnyNode, _start: Instant, _end: Instant) {}
    fn on_tensor_assigned(&mut self, _link: &G::AnyLink, _tensor: &HostTensor) {}
}

impl<G: InnerGraph> Observer<G> for () {}
