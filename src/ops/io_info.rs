use crate::ir::{EdgeId, Node};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoRole {
    Input,
    Output,
}

type AcquireFn<'a, T> = Box<dyn Fn(EdgeId, IoRole) -> Option<&'a T> + 'a>;

/// Binds a node's ordered inputs and outputs to per-edge objects.
///
/// The same node is viewed through shape descriptors at compile time and through runtime edge
/// objects at execution time; only the acquire function differs.
pub struct InputOutputInfo<'a, T> {
    node: &'a Node,
    acquire: AcquireFn<'a, T>,
}

impl<'a, T> InputOutputInfo<'a, T> {
    pub fn new(node: &'a Node, acquire: impl Fn(EdgeId, IoRole) -> Option<&'a T> + 'a) -> Self {
        Self {
            node,
            acquire: Box::new(acquire),
        }
    }

    pub fn node(&self) -> &'a Node {
        self.node
    }

    pub fn input_count(&self) -> usize {
        self.node.input_count()
    }

    pub fn output_count(&self) -> usize {
        self.node.output_count()
    }

    pub fn input(&self, idx: usize) -> Option<&'a T> {
        self.node.input(idx).and_then(|eid| (self.acquire)(eid, IoRole::Input))
    }

    pub fn output(&self, idx: usize) -> Option<&'a T> {
        self.node.output(idx).and_then(|eid| (self.acquire)(eid, IoRole::Output))
    }

    pub fn inputs(&self) -> impl Iterator<Item = Option<&'a T>> + '_ {
        (0..self.input_count()).map(|i| self.input(i))
    }
}
