use crate::{error::SegmentResult, memory::try_push};
use std::ops::Index;

/// Stable position of a node within a [`Chain`].
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeHandle(usize);

impl NodeHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// An append-only sequence grown one node at a time.
///
/// Every incremental list in the crate (input files, edges, events, levels,
/// durations) is one of these. Appending returns the handle of the new tail;
/// handles stay valid until the chain is cleared.
#[derive(Debug, Clone, PartialEq)]
pub struct Chain<T> {
    nodes: Vec<T>,
}

impl<T> Default for Chain<T> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<T> Chain<T> {
    pub fn append(&mut self, value: T) -> SegmentResult<NodeHandle> {
        try_push(&mut self.nodes, value).map(NodeHandle)
    }

    pub fn tail(&self) -> Option<NodeHandle> {
        self.nodes.len().checked_sub(1).map(NodeHandle)
    }

    pub fn last(&self) -> Option<&T> {
        self.nodes.last()
    }

    pub fn get(&self, handle: NodeHandle) -> Option<&T> {
        self.nodes.get(handle.0)
    }

    pub fn get_mut(&mut self, handle: NodeHandle) -> Option<&mut T> {
        self.nodes.get_mut(handle.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.nodes.iter()
    }

    pub fn handles(&self) -> impl Iterator<Item = NodeHandle> + use<T> {
        (0..self.nodes.len()).map(NodeHandle)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.nodes
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.nodes
    }

    /// Drops every node and releases the storage.
    pub fn clear(&mut self) {
        self.nodes = Vec::new();
    }

    pub fn into_vec(self) -> Vec<T> {
        self.nodes
    }
}

impl<T> Index<NodeHandle> for Chain<T> {
    type Output = T;

    fn index(&self, handle: NodeHandle) -> &T {
        &self.nodes[handle.0]
    }
}

impl<'a, T> IntoIterator for &'a Chain<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}
