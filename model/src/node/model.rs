//! Node arena with explicit change notification

use std::fmt;

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::{Node, NodeId, VertexWelding, EULER_ORDER};
use crate::attach::{Attach, AttachId};

/// Change notification sent to subscribers, synchronously, after each edit
#[derive(Clone, Debug, PartialEq)]
pub enum NodeEvent {
    /// A node was inserted under or next to `0`
    StructureChanged(NodeId),
    TransformChanged(NodeId),
    AttachChanged {
        node: NodeId,
        previous: Option<AttachId>,
        current: Option<AttachId>,
    },
    WeldingChanged(NodeId),
}

type Subscriber = Box<dyn FnMut(&NodeEvent)>;

/// A node tree plus the attaches its nodes reference
///
/// The first node is the root; further top-level nodes hang off the root's
/// sibling chain. Attaches are shared by handle, so two nodes pointing at the
/// same [`AttachId`] share one mesh.
#[derive(Serialize, Deserialize)]
pub struct Model {
    nodes: Vec<Node>,
    attaches: Vec<Attach>,
    #[serde(skip)]
    subscribers: Vec<Subscriber>,
}

impl Clone for Model {
    /// Subscribers are not carried over to the clone
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            attaches: self.attaches.clone(),
            subscribers: Vec::new(),
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("nodes", &self.nodes)
            .field("attaches", &self.attaches)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl Model {
    pub fn new(root_label: impl Into<String>) -> Self {
        Self {
            nodes: vec![Node::new(root_label)],
            attaches: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn attach(&self, id: AttachId) -> &Attach {
        &self.attaches[id.0]
    }

    pub fn attach_mut(&mut self, id: AttachId) -> &mut Attach {
        &mut self.attaches[id.0]
    }

    pub fn attaches(&self) -> &[Attach] {
        &self.attaches
    }

    /// Attach of a node, if any
    pub fn node_attach(&self, id: NodeId) -> Option<&Attach> {
        self.node(id).attach.map(|a| self.attach(a))
    }

    /// Register a callback invoked after every mutation
    pub fn subscribe(&mut self, subscriber: impl FnMut(&NodeEvent) + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    fn emit(&mut self, event: NodeEvent) {
        for subscriber in &mut self.subscribers {
            subscriber(&event);
        }
    }

    // ========================================================================
    // Structure
    // ========================================================================

    /// Append a new node at the end of `parent`'s child list
    pub fn add_child(&mut self, parent: NodeId, label: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        let mut node = Node::new(label);
        node.parent = Some(parent);

        match self.last_child(parent) {
            Some(last) => {
                node.previous = Some(last);
                self.nodes[last.0].next = Some(id);
            }
            None => self.nodes[parent.0].first_child = Some(id),
        }

        self.nodes.push(node);
        self.emit(NodeEvent::StructureChanged(parent));
        id
    }

    /// Append a new node at the end of `node`'s sibling chain
    pub fn append_sibling(&mut self, node: NodeId, label: impl Into<String>) -> NodeId {
        let mut last = node;
        while let Some(next) = self.nodes[last.0].next {
            last = next;
        }

        let id = NodeId(self.nodes.len());
        let mut sibling = Node::new(label);
        sibling.parent = self.nodes[node.0].parent;
        sibling.previous = Some(last);
        self.nodes[last.0].next = Some(id);
        self.nodes.push(sibling);
        self.emit(NodeEvent::StructureChanged(node));
        id
    }

    fn last_child(&self, parent: NodeId) -> Option<NodeId> {
        let mut child = self.nodes[parent.0].first_child?;
        while let Some(next) = self.nodes[child.0].next {
            child = next;
        }
        Some(child)
    }

    /// Direct children in sibling order
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut children = Vec::new();
        let mut child = self.nodes[id.0].first_child;
        while let Some(c) = child {
            children.push(c);
            child = self.nodes[c.0].next;
        }
        children
    }

    /// Depth-first pre-order over the whole tree, starting at the root
    ///
    /// Positions in this list are the node indices used by weighted meshes.
    pub fn tree_nodes(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            let node = &self.nodes[id.0];
            if let Some(next) = node.next {
                stack.push(next);
            }
            if let Some(child) = node.first_child {
                stack.push(child);
            }
        }
        order
    }

    // ========================================================================
    // Transforms
    // ========================================================================

    pub fn set_transform(&mut self, id: NodeId, position: Vec3, rotation: Quat, scale: Vec3) {
        self.nodes[id.0].set_transform(position, rotation, scale);
        self.emit(NodeEvent::TransformChanged(id));
    }

    pub fn set_position(&mut self, id: NodeId, position: Vec3) {
        let node = &self.nodes[id.0];
        let (rotation, scale) = (node.rotation, node.scale);
        self.set_transform(id, position, rotation, scale);
    }

    pub fn set_rotation(&mut self, id: NodeId, rotation: Quat) {
        let node = &self.nodes[id.0];
        let (position, scale) = (node.position, node.scale);
        self.set_transform(id, position, rotation, scale);
    }

    /// Set the rotation from angles in [`EULER_ORDER`]
    pub fn set_euler(&mut self, id: NodeId, euler: Vec3) {
        self.set_rotation(id, Quat::from_euler(EULER_ORDER, euler.x, euler.y, euler.z));
    }

    pub fn set_scale(&mut self, id: NodeId, scale: Vec3) {
        let node = &self.nodes[id.0];
        let (position, rotation) = (node.position, node.rotation);
        self.set_transform(id, position, rotation, scale);
    }

    /// Composition of every local matrix from the root down to `id`
    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let mut matrix = self.nodes[id.0].local_matrix;
        let mut parent = self.nodes[id.0].parent;
        while let Some(p) = parent {
            matrix = self.nodes[p.0].local_matrix * matrix;
            parent = self.nodes[p.0].parent;
        }
        matrix
    }

    // ========================================================================
    // Attaches
    // ========================================================================

    pub fn add_attach(&mut self, attach: Attach) -> AttachId {
        self.attaches.push(attach);
        AttachId(self.attaches.len() - 1)
    }

    pub fn set_attach(&mut self, id: NodeId, attach: Option<AttachId>) {
        let previous = std::mem::replace(&mut self.nodes[id.0].attach, attach);
        self.emit(NodeEvent::AttachChanged {
            node: id,
            previous,
            current: attach,
        });
    }

    pub fn set_welding(&mut self, id: NodeId, welding: Option<Vec<VertexWelding>>) {
        self.nodes[id.0].welding = welding;
        self.emit(NodeEvent::WeldingChanged(id));
    }

    /// Detach every attach and welding and drop the attach storage
    pub fn clear_attaches(&mut self) {
        for i in 0..self.nodes.len() {
            let id = NodeId(i);
            if self.nodes[i].attach.is_some() {
                self.set_attach(id, None);
            }
            if self.nodes[i].welding.is_some() {
                self.set_welding(id, None);
            }
        }
        self.attaches.clear();
    }

    /// Generate buffer meshes for every attach that has none
    pub fn buffer_attaches(&mut self) {
        for attach in &mut self.attaches {
            if !attach.is_buffered() {
                attach.generate_buffer();
            }
        }
    }
}
