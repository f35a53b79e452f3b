//! Basic attach format
//!
//! Node-local vertex arrays drawn directly by polygon index; there is no
//! shared vertex cache and no hardware weighting. Cross-node influence is
//! emulated through [`VertexWelding`](crate::node::VertexWelding) on the node.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::buffer::{BufferCorner, BufferMesh, BufferVertex};
use super::material::{BufferMaterial, Color};
use crate::strip::decode_strip;

/// Polygon layout of a basic mesh
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BasicPolygonType {
    Triangles,
    /// Quad `a b c d` is drawn as `(a, b, c)` and `(b, d, c)`
    Quads,
    Strips,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BasicPolygon {
    pub indices: Vec<u16>,
    /// Strip starts with flipped winding (strips only)
    pub reversed: bool,
}

impl BasicPolygon {
    pub fn new(indices: Vec<u16>) -> Self {
        Self {
            indices,
            reversed: false,
        }
    }
}

/// Polygons sharing one material
///
/// `colors` and `texcoords`, when present, hold one entry per polygon corner
/// in polygon order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BasicMesh {
    pub material_index: u16,
    pub polygon_type: BasicPolygonType,
    pub polygons: Vec<BasicPolygon>,
    pub colors: Option<Vec<Color>>,
    pub texcoords: Option<Vec<Vec2>>,
}

impl BasicMesh {
    pub fn corner_count(&self) -> usize {
        self.polygons.iter().map(|p| p.indices.len()).sum()
    }

    /// Triangle list with per-corner attributes resolved
    pub fn triangle_corners(&self) -> Vec<BufferCorner> {
        let mut triangles = Vec::new();
        let mut corner = 0usize;

        for polygon in &self.polygons {
            let corners: Vec<BufferCorner> = polygon
                .indices
                .iter()
                .enumerate()
                .map(|(i, &index)| {
                    let color = self
                        .colors
                        .as_ref()
                        .and_then(|c| c.get(corner + i).copied())
                        .unwrap_or(Color::WHITE);
                    let texcoord = self
                        .texcoords
                        .as_ref()
                        .and_then(|t| t.get(corner + i).copied())
                        .unwrap_or(Vec2::ZERO);
                    BufferCorner::new(index, color, texcoord)
                })
                .collect();
            corner += corners.len();

            match self.polygon_type {
                BasicPolygonType::Triangles => {
                    let whole = corners.len() - corners.len() % 3;
                    triangles.extend_from_slice(&corners[..whole]);
                }
                BasicPolygonType::Quads => {
                    for q in corners.chunks_exact(4) {
                        triangles.extend_from_slice(&[q[0], q[1], q[2], q[1], q[3], q[2]]);
                    }
                }
                BasicPolygonType::Strips => {
                    triangles.extend(decode_strip(&corners, polygon.reversed, |a, b| {
                        a.vertex_index == b.vertex_index
                    }));
                }
            }
        }

        triangles
    }
}

/// Basic attach payload
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicAttach {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub meshes: Vec<BasicMesh>,
    pub materials: Vec<BufferMaterial>,
}

impl BasicAttach {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn normal(&self, index: usize) -> Vec3 {
        self.normals.get(index).copied().unwrap_or(Vec3::Y)
    }

    pub fn material(&self, index: u16) -> BufferMaterial {
        self.materials
            .get(index as usize)
            .cloned()
            .unwrap_or_default()
    }

    /// Buffer meshes: one vertex block, then one polygon block per mesh
    pub fn to_buffer(&self) -> Vec<BufferMesh> {
        let has_normals = !self.normals.is_empty();
        let vertices = self
            .positions
            .iter()
            .enumerate()
            .map(|(i, &p)| BufferVertex::new(p, self.normal(i), i as u16))
            .collect();

        let mut meshes = vec![BufferMesh::from_vertices(vertices, false, has_normals)];
        for mesh in &self.meshes {
            let corners = mesh.triangle_corners();
            if corners.is_empty() {
                continue;
            }
            meshes.push(BufferMesh::from_triangles(
                corners,
                self.material(mesh.material_index),
                has_normals,
                mesh.colors.is_some(),
            ));
        }
        meshes
    }
}
