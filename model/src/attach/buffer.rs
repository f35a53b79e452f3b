//! Engine-ready buffer meshes
//!
//! A buffer mesh is one step of the engine's draw program for a node:
//! it may write vertices into the shared vertex cache, draw corners that read
//! from the cache, or both. Vertex blocks either overwrite their cache slots
//! (`continue_weight == false`, the hardware "start" state) or add weighted
//! contributions onto what earlier nodes left there.

use std::hash::{Hash, Hasher};

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::material::{BufferMaterial, Color};
use crate::strip::decode_strip;

/// Vertex written into a cache slot
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BufferVertex {
    pub position: Vec3,
    pub normal: Vec3,
    /// Cache slot, relative to the mesh's write offset
    pub index: u16,
    pub weight: f32,
}

impl BufferVertex {
    pub fn new(position: Vec3, normal: Vec3, index: u16) -> Self {
        Self {
            position,
            normal,
            index,
            weight: 1.0,
        }
    }

    pub fn weighted(position: Vec3, normal: Vec3, index: u16, weight: f32) -> Self {
        Self {
            position,
            normal,
            index,
            weight,
        }
    }
}

/// Polygon corner reading a cache slot
///
/// Hashing and equality go through the bit patterns of the texcoord, so two
/// corners are "identical" only when every field matches exactly.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BufferCorner {
    pub vertex_index: u16,
    pub color: Color,
    pub texcoord: Vec2,
}

impl BufferCorner {
    /// Serialized size: u16 index + RGBA8 + 2 x f32
    pub const STRUCT_SIZE: usize = 14;

    pub fn new(vertex_index: u16, color: Color, texcoord: Vec2) -> Self {
        Self {
            vertex_index,
            color,
            texcoord,
        }
    }

    pub fn plain(vertex_index: u16) -> Self {
        Self::new(vertex_index, Color::WHITE, Vec2::ZERO)
    }

    pub fn with_vertex_index(self, vertex_index: u16) -> Self {
        Self {
            vertex_index,
            ..self
        }
    }

    fn key(&self) -> (u16, Color, u32, u32) {
        (
            self.vertex_index,
            self.color,
            self.texcoord.x.to_bits(),
            self.texcoord.y.to_bits(),
        )
    }
}

impl PartialEq for BufferCorner {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for BufferCorner {}

impl Hash for BufferCorner {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// One draw/write step of a buffered attach
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferMesh {
    /// Vertices written to the cache before drawing
    pub vertices: Vec<BufferVertex>,
    pub material: BufferMaterial,
    /// Corner data; interpreted through `index_list` when present
    pub corners: Vec<BufferCorner>,
    /// Optional indices into `corners`
    pub index_list: Option<Vec<u16>>,
    /// Corner sequence is a single triangle strip (joined with degenerates)
    pub strippified: bool,
    /// Vertex block adds onto the cache instead of overwriting it
    pub continue_weight: bool,
    pub has_normals: bool,
    pub has_colors: bool,
    /// Added to every vertex index written by this mesh
    pub vertex_write_offset: u32,
    /// Added to every corner vertex index read by this mesh
    pub vertex_read_offset: u32,
}

impl BufferMesh {
    /// Vertex-only block
    pub fn from_vertices(vertices: Vec<BufferVertex>, continue_weight: bool, has_normals: bool) -> Self {
        Self {
            vertices,
            continue_weight,
            has_normals,
            ..Default::default()
        }
    }

    /// Polygon-only block holding a plain triangle list
    pub fn from_triangles(
        corners: Vec<BufferCorner>,
        material: BufferMaterial,
        has_normals: bool,
        has_colors: bool,
    ) -> Self {
        Self {
            material,
            corners,
            has_normals,
            has_colors,
            ..Default::default()
        }
    }

    pub fn has_vertices(&self) -> bool {
        !self.vertices.is_empty()
    }

    pub fn has_polygons(&self) -> bool {
        !self.corners.is_empty()
    }

    /// Corner sequence after resolving the index list (encoding not expanded)
    pub fn sequence(&self) -> Vec<BufferCorner> {
        match &self.index_list {
            Some(indices) => indices
                .iter()
                .filter_map(|&i| self.corners.get(i as usize).copied())
                .collect(),
            None => self.corners.clone(),
        }
    }

    /// Triangle list (3 corners per triangle) as read from the cache
    ///
    /// The read offset is applied to the returned vertex indices. Degenerate
    /// strip triangles (used to join strips) are dropped.
    pub fn triangle_corners(&self) -> Vec<BufferCorner> {
        let sequence = self.sequence();
        let mut triangles = if self.strippified {
            decode_strip(&sequence, false, |a, b| a.vertex_index == b.vertex_index)
        } else {
            let whole = sequence.len() - sequence.len() % 3;
            sequence[..whole].to_vec()
        };

        if self.vertex_read_offset != 0 {
            for c in &mut triangles {
                c.vertex_index = (c.vertex_index as u32 + self.vertex_read_offset) as u16;
            }
        }
        triangles
    }

    /// Cache slot written by a vertex of this mesh
    #[inline]
    pub fn write_slot(&self, vertex: &BufferVertex) -> usize {
        vertex.index as usize + self.vertex_write_offset as usize
    }
}
