//! Weighted meshes to chunk attaches
//!
//! Weighted meshes normally become `NormalWeighted` vertex chunks: `Start`
//! for each node's first contributions, `Middle` for later ones and `End`
//! for the fragment's final continuing chunk. Meshes where every vertex is
//! owned by exactly one node and the corners carry colors take the binary
//! path instead: one plain `Normal` chunk per node, no weight status at all.

use std::collections::BTreeMap;

use glam::Mat4;
use tracing::debug;

use super::mesh::WeightedMesh;
use super::offsetable::{OffsetableAttachConverter, SplitVertex, depending_spaces, split_weights};
use super::offsets::{Fragment, VertexOffset};
use crate::attach::chunk::{
    ChunkAttach, ChunkCorner, ChunkStrip, ChunkVertex, ChunkVertexKind, PolyChunk, StripAttributes, StripChunk,
    VertexChunk, WeightStatus,
};
use crate::attach::{Attach, AttachFormat, BufferCorner, BufferMaterial};
use crate::error::Result;
use crate::node::TreeLayout;
use crate::strip::{Strippifier, strippify_corners};

impl VertexOffset for ChunkAttach {
    fn offset_vertices(&mut self, offset: u32) {
        for chunk in &mut self.vertex_chunks {
            chunk.index_offset = (chunk.index_offset as u32 + offset) as u16;
        }
        for poly in &mut self.poly_chunks {
            if let PolyChunk::Strip(strip) = poly {
                for corner in strip.strips.iter_mut().flat_map(|s| s.corners.iter_mut()) {
                    corner.index = (corner.index as u32 + offset) as u16;
                }
            }
        }
    }
}

pub struct ChunkConverter<'a> {
    strippifier: &'a dyn Strippifier,
}

impl<'a> ChunkConverter<'a> {
    pub fn new(strippifier: &'a dyn Strippifier) -> Self {
        Self { strippifier }
    }

    /// Material, texture and strip chunks for every triangle set
    ///
    /// Material state is only re-emitted when it changes; the first set always
    /// emits it so parts can be concatenated safely.
    fn poly_chunks(&self, mesh: &WeightedMesh, remap: impl Fn(u16) -> u16) -> Vec<PolyChunk> {
        let mut chunks = Vec::new();
        let mut current: Option<&BufferMaterial> = None;

        for (corners, material) in mesh.triangle_sets.iter().zip(&mesh.materials) {
            if corners.is_empty() {
                continue;
            }
            if current != Some(material) {
                chunks.extend(PolyChunk::for_material(material));
                current = Some(material);
            }

            let corners: Vec<BufferCorner> = corners
                .iter()
                .map(|c| c.with_vertex_index(remap(c.vertex_index)))
                .collect();
            let strips = strippify_corners(&corners, self.strippifier)
                .into_iter()
                .map(|strip| ChunkStrip {
                    reversed: false,
                    corners: strip.iter().map(ChunkCorner::from_buffer).collect(),
                })
                .collect();

            chunks.push(PolyChunk::Strip(StripChunk {
                attributes: StripAttributes::from_material(material.attributes),
                has_uvs: material.use_texture(),
                has_colors: mesh.has_colors,
                strips,
            }));
        }
        chunks
    }

    /// Every vertex is owned by exactly one depending node
    fn is_binary_weighted(mesh: &WeightedMesh) -> bool {
        let depending = mesh.depending_node_indices.len();
        mesh.vertices
            .iter()
            .all(|v| (0..depending).filter(|&slot| v.weight(slot) > 0.0).count() == 1)
    }

    fn convert_binary(&self, mesh: &WeightedMesh, layout: &TreeLayout, root: usize, label: String) -> Result<Fragment<ChunkAttach>> {
        let spaces = depending_spaces(mesh, layout, root)?;
        let start = spaces.first().map_or(root, |s| s.0);
        let end = spaces.last().map_or(root, |s| s.0);

        // Owning weight slot -> vertices, in node order
        let mut owned: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, vertex) in mesh.vertices.iter().enumerate() {
            let slot = (0..spaces.len()).find(|&s| vertex.weight(s) > 0.0).unwrap_or(0);
            owned.entry(slot).or_default().push(i);
        }

        let kind = if mesh.has_normals {
            ChunkVertexKind::Normal
        } else {
            ChunkVertexKind::Position
        };
        let mut attaches: Vec<Option<ChunkAttach>> = vec![None; end - start + 1];
        let mut remap = vec![0u16; mesh.vertices.len()];
        let mut running = 0u16;
        for (slot, vertices) in owned {
            let (node, matrix, normals) = spaces[slot];
            let chunk = VertexChunk {
                kind,
                weight_status: WeightStatus::Start,
                index_offset: running,
                vertices: vertices
                    .iter()
                    .enumerate()
                    .map(|(k, &v)| {
                        remap[v] = running + k as u16;
                        let vertex = &mesh.vertices[v];
                        ChunkVertex::new(
                            matrix.transform_point3(vertex.position),
                            normals.transform_vector3(vertex.normal),
                        )
                    })
                    .collect(),
            };
            running += vertices.len() as u16;
            attaches[node - start].get_or_insert_with(ChunkAttach::default).vertex_chunks.push(chunk);
        }

        let polys = self.poly_chunks(mesh, |i| remap[i as usize]);
        attaches[end - start].get_or_insert_with(ChunkAttach::default).poly_chunks = polys;

        debug!(label = %label, nodes = end - start + 1, "binary weighted chunk fast path");
        Ok(Fragment {
            label,
            vertex_count: mesh.vertices.len() as u32,
            start,
            attaches,
        })
    }
}

fn weighted_chunk(vertices: &[SplitVertex], weight_status: WeightStatus) -> VertexChunk {
    VertexChunk {
        kind: ChunkVertexKind::NormalWeighted,
        weight_status,
        index_offset: 0,
        vertices: vertices
            .iter()
            .map(|v| ChunkVertex::weighted(v.position, v.normal, v.slot, v.weight))
            .collect(),
    }
}

fn transform_chunk_vertices(attach: &mut ChunkAttach, matrix: Mat4, normals: Mat4) {
    for vertex in attach.vertex_chunks.iter_mut().flat_map(|c| c.vertices.iter_mut()) {
        vertex.position = matrix.transform_point3(vertex.position);
        vertex.normal = normals.transform_vector3(vertex.normal);
    }
}

fn finish_attach(label: String, data: ChunkAttach) -> Attach {
    let mut attach = Attach::from_chunk(label, data);
    attach.generate_buffer();
    attach
}

impl OffsetableAttachConverter for ChunkConverter<'_> {
    type Part = ChunkAttach;

    fn format(&self) -> AttachFormat {
        AttachFormat::Chunk
    }

    fn convert_weightless(&self, mesh: &WeightedMesh, root: usize, label: String) -> Result<Fragment<ChunkAttach>> {
        let kind = if mesh.has_normals {
            ChunkVertexKind::Normal
        } else {
            ChunkVertexKind::Position
        };
        let attach = ChunkAttach {
            vertex_chunks: vec![VertexChunk {
                kind,
                weight_status: WeightStatus::Start,
                index_offset: 0,
                vertices: mesh
                    .vertices
                    .iter()
                    .map(|v| ChunkVertex::new(v.position, v.normal))
                    .collect(),
            }],
            poly_chunks: self.poly_chunks(mesh, |i| i),
        };
        Ok(Fragment {
            label,
            vertex_count: mesh.vertices.len() as u32,
            start: root,
            attaches: vec![Some(attach)],
        })
    }

    fn convert_weighted(
        &self,
        mesh: &WeightedMesh,
        layout: &TreeLayout,
        root: usize,
        label: String,
    ) -> Result<Fragment<ChunkAttach>> {
        if mesh.has_colors && Self::is_binary_weighted(mesh) {
            return self.convert_binary(mesh, layout, root, label);
        }

        let split = split_weights(mesh, layout, root)?;
        let mut attaches: Vec<Option<ChunkAttach>> = split
            .nodes
            .iter()
            .map(|node| {
                node.as_ref().map(|node| {
                    let mut vertex_chunks = Vec::new();
                    if !node.init.is_empty() {
                        vertex_chunks.push(weighted_chunk(&node.init, WeightStatus::Start));
                    }
                    if !node.next.is_empty() {
                        vertex_chunks.push(weighted_chunk(&node.next, WeightStatus::Middle));
                    }
                    ChunkAttach {
                        vertex_chunks,
                        poly_chunks: Vec::new(),
                    }
                })
            })
            .collect();

        // Final continuing write of the fragment ends the accumulation
        if let Some(chunk) = attaches
            .iter_mut()
            .rev()
            .flatten()
            .flat_map(|a| a.vertex_chunks.iter_mut().rev())
            .find(|c| c.weight_status == WeightStatus::Middle)
        {
            chunk.weight_status = WeightStatus::End;
        }

        if let Some(Some(last)) = attaches.get_mut(split.last) {
            last.poly_chunks = self.poly_chunks(mesh, |i| i);
        }

        Ok(Fragment {
            label,
            vertex_count: mesh.vertices.len() as u32,
            start: split.start,
            attaches,
        })
    }

    fn correct_space(&self, part: &mut ChunkAttach, matrix: Mat4, normals: Mat4) {
        transform_chunk_vertices(part, matrix, normals);
    }

    fn finish(&self, part: ChunkAttach, label: String) -> Attach {
        finish_attach(label, part)
    }

    fn combine_attaches(&self, parts: Vec<ChunkAttach>, label: String) -> Attach {
        let mut combined = ChunkAttach::default();
        let mut polys = Vec::new();
        for part in parts {
            combined.vertex_chunks.extend(part.vertex_chunks);
            polys.extend(part.poly_chunks);
        }
        combined.poly_chunks = polys;
        finish_attach(label, combined)
    }
}
