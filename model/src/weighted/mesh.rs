//! Canonical bone-weighted mesh

use std::collections::BTreeSet;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::attach::{BufferCorner, BufferMaterial, BufferMesh};
use crate::error::{ModelError, Result};

/// Largest number of vertices addressable by 16-bit corner indices
pub const MAX_VERTICES: usize = 1 << 16;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightedVertex {
    pub position: Vec3,
    pub normal: Vec3,
    /// One weight per depending node, `None` on weightless meshes
    pub weights: Option<Vec<f32>>,
}

impl WeightedVertex {
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Self {
            position,
            normal,
            weights: None,
        }
    }

    pub fn weighted(position: Vec3, normal: Vec3, weights: Vec<f32>) -> Self {
        Self {
            position,
            normal,
            weights: Some(weights),
        }
    }

    /// Weight of depending slot `slot`, treating weightless vertices as fully owned by slot 0
    pub fn weight(&self, slot: usize) -> f32 {
        match &self.weights {
            Some(weights) => weights.get(slot).copied().unwrap_or(0.0),
            None if slot == 0 => 1.0,
            None => 0.0,
        }
    }

    /// Exact bit pattern of every field
    pub(crate) fn bit_key(&self) -> Vec<u32> {
        let mut key = Vec::with_capacity(7 + self.weights.as_ref().map_or(0, Vec::len));
        key.extend(self.position.to_array().map(f32::to_bits));
        key.extend(self.normal.to_array().map(f32::to_bits));
        match &self.weights {
            Some(weights) => {
                key.push(1);
                key.extend(weights.iter().map(|w| w.to_bits()));
            }
            None => key.push(0),
        }
        key
    }
}

/// Mesh whose vertices are blended from one or more tree nodes
///
/// Positions and normals are expressed in the space of the root node. A mesh
/// is placed once per entry of `root_indices`; `depending_node_indices` are
/// traversal offsets relative to that root.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightedMesh {
    pub label: Option<String>,
    pub vertices: Vec<WeightedVertex>,
    /// Triangle corner lists, one per material
    pub triangle_sets: Vec<Vec<BufferCorner>>,
    pub materials: Vec<BufferMaterial>,
    pub root_indices: BTreeSet<usize>,
    pub depending_node_indices: BTreeSet<usize>,
    pub has_colors: bool,
    pub has_normals: bool,
}

impl WeightedMesh {
    pub fn is_weighted(&self) -> bool {
        self.depending_node_indices.len() > 1
    }

    pub fn triangle_count(&self) -> usize {
        self.triangle_sets.iter().map(|t| t.len() / 3).sum()
    }

    /// Depending node indices relative to the root, in slot order
    pub fn depending(&self) -> Vec<usize> {
        self.depending_node_indices.iter().copied().collect()
    }

    /// Lift one node's weightless buffer meshes
    ///
    /// Vertex blocks are replayed into a local cache; only the slots that the
    /// polygons read become vertices, numbered in slot order.
    pub fn from_buffer_meshes(meshes: &[BufferMesh], root: usize, label: Option<String>) -> Result<Self> {
        let mut cache: Vec<Option<(Vec3, Vec3)>> = Vec::new();
        for mesh in meshes {
            for vertex in &mesh.vertices {
                let slot = mesh.write_slot(vertex);
                if slot >= cache.len() {
                    cache.resize(slot + 1, None);
                }
                cache[slot] = Some((vertex.position, vertex.normal));
            }
        }

        let polygons: Vec<&BufferMesh> = meshes.iter().filter(|m| m.has_polygons()).collect();
        let mut used = BTreeSet::new();
        let triangle_lists: Vec<Vec<BufferCorner>> = polygons
            .iter()
            .map(|m| {
                let corners = m.triangle_corners();
                used.extend(corners.iter().map(|c| c.vertex_index as usize));
                corners
            })
            .collect();

        let mut remap = vec![0u16; cache.len()];
        let mut vertices = Vec::with_capacity(used.len());
        for &slot in &used {
            let Some((position, normal)) = cache.get(slot).copied().flatten() else {
                return Err(ModelError::CorruptWeights {
                    node: root,
                    reason: format!("polygons read vertex slot {slot}, which is never written"),
                });
            };
            remap[slot] = vertices.len() as u16;
            vertices.push(WeightedVertex::new(position, normal));
        }

        let mut mesh = Self {
            label,
            vertices,
            triangle_sets: Vec::new(),
            materials: Vec::new(),
            root_indices: BTreeSet::from([root]),
            depending_node_indices: BTreeSet::from([0]),
            has_colors: polygons.iter().any(|m| m.has_colors),
            has_normals: meshes.iter().any(|m| m.has_normals),
        };
        for (source, corners) in polygons.iter().zip(triangle_lists) {
            if corners.is_empty() {
                continue;
            }
            let corners = corners
                .into_iter()
                .map(|c| c.with_vertex_index(remap[c.vertex_index as usize]))
                .collect();
            mesh.triangle_sets.push(corners);
            mesh.materials.push(source.material.clone());
        }
        mesh.validate()?;
        Ok(mesh)
    }

    /// Check the structural invariants
    pub fn validate(&self) -> Result<()> {
        if self.vertices.len() > MAX_VERTICES {
            return Err(ModelError::TooManyVertices(self.vertices.len()));
        }
        if self.depending_node_indices.is_empty() {
            return Err(ModelError::InvalidWeights("mesh has no depending nodes".into()));
        }
        if self.triangle_sets.len() != self.materials.len() {
            return Err(ModelError::InvalidWeights(format!(
                "{} triangle sets but {} materials",
                self.triangle_sets.len(),
                self.materials.len()
            )));
        }

        let depending = self.depending_node_indices.len();
        for (i, vertex) in self.vertices.iter().enumerate() {
            match &vertex.weights {
                Some(weights) if weights.len() != depending => {
                    return Err(ModelError::InvalidWeights(format!(
                        "vertex {i} has {} weights for {depending} depending nodes",
                        weights.len()
                    )));
                }
                None if depending > 1 => {
                    return Err(ModelError::InvalidWeights(format!(
                        "vertex {i} has no weights on a mesh with {depending} depending nodes"
                    )));
                }
                _ => {}
            }
        }

        for set in &self.triangle_sets {
            if let Some(c) = set.iter().find(|c| c.vertex_index as usize >= self.vertices.len()) {
                return Err(ModelError::InvalidWeights(format!(
                    "corner references vertex {} of {}",
                    c.vertex_index,
                    self.vertices.len()
                )));
            }
        }
        Ok(())
    }

    /// Replace the vertex list, rewriting corners through `remap` (old index -> new index)
    pub(crate) fn remap_vertices(&mut self, vertices: Vec<WeightedVertex>, remap: &[u32]) {
        self.vertices = vertices;
        for set in &mut self.triangle_sets {
            for corner in set.iter_mut() {
                corner.vertex_index = remap[corner.vertex_index as usize] as u16;
            }
        }
    }

    /// Drop vertices no corner references; returns how many were removed
    pub(crate) fn prune_unreferenced(&mut self) -> usize {
        let mut referenced = vec![false; self.vertices.len()];
        for corner in self.triangle_sets.iter().flatten() {
            referenced[corner.vertex_index as usize] = true;
        }

        let mut remap = vec![0u32; self.vertices.len()];
        let mut kept = Vec::with_capacity(self.vertices.len());
        for (i, vertex) in self.vertices.iter().enumerate() {
            if referenced[i] {
                remap[i] = kept.len() as u32;
                kept.push(vertex.clone());
            }
        }

        let removed = self.vertices.len() - kept.len();
        if removed > 0 {
            self.remap_vertices(kept, &remap);
        }
        removed
    }
}
