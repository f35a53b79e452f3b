//! Scene-graph nodes
//!
//! Nodes live in a [`Model`] arena and link to each other through stable
//! [`NodeId`] handles: an owning child/sibling chain plus a non-owning parent
//! back-reference.

mod layout;
mod model;
mod welding;

use glam::{EulerRot, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

pub use layout::TreeLayout;
pub use model::{Model, NodeEvent};
pub use welding::{VertexWelding, Weld};

use crate::attach::AttachId;

/// Euler order used for the derived rotation angles
pub const EULER_ORDER: EulerRot = EulerRot::ZYX;

/// Stable handle of a node inside a [`Model`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A node of the scene graph
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub label: String,
    position: Vec3,
    rotation: Quat,
    /// Derived from `rotation` (radians, [`EULER_ORDER`])
    euler: Vec3,
    scale: Vec3,
    local_matrix: Mat4,

    pub(crate) parent: Option<NodeId>,
    pub(crate) first_child: Option<NodeId>,
    pub(crate) next: Option<NodeId>,
    pub(crate) previous: Option<NodeId>,

    pub(crate) attach: Option<AttachId>,
    pub(crate) welding: Option<Vec<VertexWelding>>,
}

impl Node {
    pub(crate) fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            euler: Vec3::ZERO,
            scale: Vec3::ONE,
            local_matrix: Mat4::IDENTITY,
            parent: None,
            first_child: None,
            next: None,
            previous: None,
            attach: None,
            welding: None,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn euler(&self) -> Vec3 {
        self.euler
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Cached `translation * rotation * scale`
    pub fn local_matrix(&self) -> Mat4 {
        self.local_matrix
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn first_child(&self) -> Option<NodeId> {
        self.first_child
    }

    pub fn next(&self) -> Option<NodeId> {
        self.next
    }

    pub fn previous(&self) -> Option<NodeId> {
        self.previous
    }

    pub fn attach(&self) -> Option<AttachId> {
        self.attach
    }

    pub fn welding(&self) -> Option<&[VertexWelding]> {
        self.welding.as_deref()
    }

    pub(crate) fn set_transform(&mut self, position: Vec3, rotation: Quat, scale: Vec3) {
        self.position = position;
        self.rotation = rotation.normalize();
        let (a, b, c) = self.rotation.to_euler(EULER_ORDER);
        self.euler = Vec3::new(a, b, c);
        self.scale = scale;
        self.local_matrix = Mat4::from_scale_rotation_translation(scale, self.rotation, position);
    }
}
