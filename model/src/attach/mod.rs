//! Mesh data attached to nodes
//!
//! An attach holds its format-specific data plus, once buffered, the
//! engine-ready buffer meshes every conversion works from. The format set is
//! closed, so dispatch is an exhaustive `match` over [`AttachData`].

pub mod basic;
mod buffer;
pub mod chunk;
pub mod gc;
mod material;

use glam::Vec3;
use serde::{Deserialize, Serialize};

pub use basic::{BasicAttach, BasicMesh, BasicPolygon, BasicPolygonType};
pub use buffer::{BufferCorner, BufferMesh, BufferVertex};
pub use chunk::ChunkAttach;
pub use gc::GcAttach;
pub use material::{BlendMode, BufferMaterial, Color, FilterMode, MaterialAttributes};

use crate::math::Bounds;

/// Attach format tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachFormat {
    Buffer,
    Basic,
    Chunk,
    Gc,
}

impl AttachFormat {
    /// Parse a format name as used on the command line
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "buffer" => Some(Self::Buffer),
            "basic" => Some(Self::Basic),
            "chunk" => Some(Self::Chunk),
            "gc" => Some(Self::Gc),
            _ => None,
        }
    }
}

/// Format-specific attach payload
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AttachData {
    /// The buffer meshes are the data
    Buffer,
    Basic(BasicAttach),
    Chunk(ChunkAttach),
    Gc(GcAttach),
}

/// Stable handle of an attach inside a [`Model`](crate::node::Model)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttachId(pub(crate) usize);

impl AttachId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Mesh data owned by a node
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attach {
    pub label: String,
    pub bounds: Bounds,
    pub data: AttachData,
    /// Engine-ready triangle chunks; `None` until buffered
    pub mesh_data: Option<Vec<BufferMesh>>,
}

impl Attach {
    /// Attach whose buffer meshes are its native data
    pub fn from_buffer(label: impl Into<String>, meshes: Vec<BufferMesh>) -> Self {
        let mut attach = Self {
            label: label.into(),
            bounds: Bounds::default(),
            data: AttachData::Buffer,
            mesh_data: Some(meshes),
        };
        attach.recompute_bounds();
        attach
    }

    pub fn from_basic(label: impl Into<String>, data: BasicAttach) -> Self {
        Self::unbuffered(label, AttachData::Basic(data))
    }

    pub fn from_chunk(label: impl Into<String>, data: ChunkAttach) -> Self {
        Self::unbuffered(label, AttachData::Chunk(data))
    }

    pub fn from_gc(label: impl Into<String>, data: GcAttach) -> Self {
        Self::unbuffered(label, AttachData::Gc(data))
    }

    fn unbuffered(label: impl Into<String>, data: AttachData) -> Self {
        let mut attach = Self {
            label: label.into(),
            bounds: Bounds::default(),
            data,
            mesh_data: None,
        };
        attach.recompute_bounds();
        attach
    }

    pub fn format(&self) -> AttachFormat {
        match self.data {
            AttachData::Buffer => AttachFormat::Buffer,
            AttachData::Basic(_) => AttachFormat::Basic,
            AttachData::Chunk(_) => AttachFormat::Chunk,
            AttachData::Gc(_) => AttachFormat::Gc,
        }
    }

    pub fn is_buffered(&self) -> bool {
        self.mesh_data.is_some()
    }

    /// Buffer meshes derived from the format data, leaving the attach untouched
    ///
    /// `None` for buffer attaches, whose meshes cannot be rebuilt.
    pub fn build_buffer(&self) -> Option<Vec<BufferMesh>> {
        match &self.data {
            AttachData::Buffer => None,
            AttachData::Basic(basic) => Some(basic.to_buffer()),
            AttachData::Chunk(chunk) => Some(chunk.to_buffer()),
            AttachData::Gc(gc) => Some(gc.to_buffer()),
        }
    }

    /// Fill `mesh_data` from the format data
    pub fn generate_buffer(&mut self) {
        if let Some(meshes) = self.build_buffer() {
            self.mesh_data = Some(meshes);
        }
    }

    /// Recompute the bounding sphere from the vertex positions
    pub fn recompute_bounds(&mut self) {
        let positions = self.positions();
        self.bounds = Bounds::from_points(positions.iter().copied());
    }

    /// Every vertex position stored by the attach, in its local space
    pub fn positions(&self) -> Vec<Vec3> {
        match &self.data {
            AttachData::Buffer => self
                .mesh_data
                .iter()
                .flatten()
                .flat_map(|m| m.vertices.iter().map(|v| v.position))
                .collect(),
            AttachData::Basic(basic) => basic.positions.clone(),
            AttachData::Chunk(chunk) => chunk
                .vertex_chunks
                .iter()
                .flat_map(|c| c.vertices.iter().map(|v| v.position))
                .collect(),
            AttachData::Gc(gc) => gc
                .vertex_blocks
                .iter()
                .flat_map(|b| b.vertices.iter().map(|v| v.position))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_names() {
        assert_eq!(AttachFormat::from_name("GC"), Some(AttachFormat::Gc));
        assert_eq!(AttachFormat::from_name("chunk"), Some(AttachFormat::Chunk));
        assert_eq!(AttachFormat::from_name("ninja"), None);
    }

    #[test]
    fn test_buffer_attach_bounds() {
        let mesh = BufferMesh::from_vertices(
            vec![
                BufferVertex::new(Vec3::new(-2.0, 0.0, 0.0), Vec3::Y, 0),
                BufferVertex::new(Vec3::new(2.0, 0.0, 0.0), Vec3::Y, 1),
            ],
            false,
            true,
        );
        let attach = Attach::from_buffer("a", vec![mesh]);
        assert!(attach.is_buffered());
        assert_eq!(attach.format(), AttachFormat::Buffer);
        assert_eq!(attach.bounds.radius, 2.0);
    }
}
