//! Conversion-scoped snapshot of a node tree

use std::collections::BTreeSet;

use glam::Mat4;
use hashbrown::HashMap;

use super::{Model, NodeId};
use crate::error::Result;
use crate::math::try_inverse;

/// Flattened tree in traversal order
///
/// Index `i` everywhere refers to the `i`-th node of [`Model::tree_nodes`].
/// World matrices are computed once when the layout is built; a layout must
/// not outlive edits to the model it was taken from.
#[derive(Clone, Debug)]
pub struct TreeLayout {
    nodes: Vec<NodeId>,
    labels: Vec<String>,
    parents: Vec<Option<usize>>,
    depths: Vec<usize>,
    world: Vec<Mat4>,
    index_of: HashMap<NodeId, usize>,
}

impl TreeLayout {
    pub fn new(model: &Model) -> Self {
        let nodes = model.tree_nodes();
        let index_of: HashMap<NodeId, usize> = nodes.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        let mut parents = Vec::with_capacity(nodes.len());
        let mut depths = Vec::with_capacity(nodes.len());
        let mut world = Vec::with_capacity(nodes.len());
        for &id in &nodes {
            let node = model.node(id);
            let parent = node.parent().and_then(|p| index_of.get(&p).copied());
            // Parents always precede their children in pre-order
            let (depth, parent_world) = match parent {
                Some(p) => (depths[p] + 1, world[p]),
                None => (0, Mat4::IDENTITY),
            };
            parents.push(parent);
            depths.push(depth);
            world.push(parent_world * node.local_matrix());
        }

        Self {
            labels: nodes.iter().map(|&id| model.node(id).label.clone()).collect(),
            nodes,
            parents,
            depths,
            world,
            index_of,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_id(&self, index: usize) -> NodeId {
        self.nodes[index]
    }

    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        self.index_of.get(&id).copied()
    }

    pub fn label(&self, index: usize) -> &str {
        &self.labels[index]
    }

    pub fn parent(&self, index: usize) -> Option<usize> {
        self.parents[index]
    }

    pub fn depth(&self, index: usize) -> usize {
        self.depths[index]
    }

    pub fn world_matrix(&self, index: usize) -> Mat4 {
        self.world[index]
    }

    /// The node itself followed by each of its ancestors
    pub fn chain(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(Some(index), move |&i| self.parents[i])
    }

    /// Deepest node lying on the parent chain of every given node
    ///
    /// Each node counts as being on its own chain. When several candidates
    /// share the maximum depth the later one in traversal order wins. Nodes
    /// without any shared ancestor (separate top-level siblings) resolve to
    /// the tree root, index `0`.
    pub fn common_ancestor<I>(&self, indices: I) -> usize
    where
        I: IntoIterator<Item = usize>,
    {
        let contributors: BTreeSet<usize> = indices.into_iter().collect();
        if contributors.len() == 1 {
            return contributors.into_iter().next().unwrap_or(0);
        }

        let mut hits: HashMap<usize, usize> = HashMap::new();
        for &node in &contributors {
            for ancestor in self.chain(node) {
                *hits.entry(ancestor).or_default() += 1;
            }
        }

        hits.into_iter()
            .filter(|&(_, count)| count == contributors.len())
            .map(|(ancestor, _)| ancestor)
            .max_by_key(|&ancestor| (self.depths[ancestor], ancestor))
            .unwrap_or(0)
    }

    /// Matrix taking `node`-local coordinates into `root`-local coordinates
    pub fn vertex_matrix(&self, node: usize, root: usize) -> Result<Mat4> {
        if node == root {
            return Ok(Mat4::IDENTITY);
        }
        Ok(try_inverse(self.world[root], &self.labels[root])? * self.world[node])
    }

    /// Inverse of [`vertex_matrix`](Self::vertex_matrix): `root` space into `node` space
    pub fn local_matrix_from(&self, root: usize, node: usize) -> Result<Mat4> {
        if node == root {
            return Ok(Mat4::IDENTITY);
        }
        Ok(try_inverse(self.world[node], &self.labels[node])? * self.world[root])
    }
}
