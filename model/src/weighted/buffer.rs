//! Weighted meshes to buffer attaches

use glam::Mat4;

use super::mesh::WeightedMesh;
use super::offsetable::{OffsetableAttachConverter, SplitVertex, split_weights};
use super::offsets::{Fragment, VertexOffset};
use super::optimize::optimize_polygons;
use crate::attach::{Attach, AttachFormat, BufferMesh, BufferVertex};
use crate::config::ConvertOptions;
use crate::error::Result;
use crate::node::TreeLayout;
use crate::strip::Strippifier;

/// Buffer meshes owned by one node
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BufferPart(pub Vec<BufferMesh>);

impl VertexOffset for BufferPart {
    fn offset_vertices(&mut self, offset: u32) {
        for mesh in &mut self.0 {
            if mesh.has_vertices() {
                mesh.vertex_write_offset += offset;
            }
            if mesh.has_polygons() {
                mesh.vertex_read_offset += offset;
            }
        }
    }
}

pub struct BufferConverter<'a> {
    options: &'a ConvertOptions,
    strippifier: &'a dyn Strippifier,
}

impl<'a> BufferConverter<'a> {
    pub fn new(options: &'a ConvertOptions, strippifier: &'a dyn Strippifier) -> Self {
        Self {
            options,
            strippifier,
        }
    }

    fn polygon_meshes(&self, mesh: &WeightedMesh) -> Vec<BufferMesh> {
        mesh.triangle_sets
            .iter()
            .zip(&mesh.materials)
            .filter(|(corners, _)| !corners.is_empty())
            .map(|(corners, material)| {
                let mut buffer =
                    BufferMesh::from_triangles(corners.clone(), material.clone(), mesh.has_normals, mesh.has_colors);
                if self.options.optimize_polygons {
                    optimize_polygons(&mut buffer, self.strippifier);
                }
                buffer
            })
            .collect()
    }
}

fn vertex_block(vertices: &[SplitVertex], continue_weight: bool, has_normals: bool) -> BufferMesh {
    BufferMesh::from_vertices(
        vertices
            .iter()
            .map(|v| BufferVertex::weighted(v.position, v.normal, v.slot, v.weight))
            .collect(),
        continue_weight,
        has_normals,
    )
}

impl OffsetableAttachConverter for BufferConverter<'_> {
    type Part = BufferPart;

    fn format(&self) -> AttachFormat {
        AttachFormat::Buffer
    }

    fn convert_weightless(&self, mesh: &WeightedMesh, root: usize, label: String) -> Result<Fragment<BufferPart>> {
        let vertices = mesh
            .vertices
            .iter()
            .enumerate()
            .map(|(i, v)| BufferVertex::new(v.position, v.normal, i as u16))
            .collect();

        let mut meshes = vec![BufferMesh::from_vertices(vertices, false, mesh.has_normals)];
        meshes.extend(self.polygon_meshes(mesh));
        Ok(Fragment {
            label,
            vertex_count: mesh.vertices.len() as u32,
            start: root,
            attaches: vec![Some(BufferPart(meshes))],
        })
    }

    fn convert_weighted(
        &self,
        mesh: &WeightedMesh,
        layout: &TreeLayout,
        root: usize,
        label: String,
    ) -> Result<Fragment<BufferPart>> {
        let split = split_weights(mesh, layout, root)?;
        let mut attaches: Vec<Option<BufferPart>> = split
            .nodes
            .iter()
            .map(|node| {
                node.as_ref().map(|node| {
                    let mut meshes = Vec::new();
                    if !node.init.is_empty() {
                        meshes.push(vertex_block(&node.init, false, mesh.has_normals));
                    }
                    if !node.next.is_empty() {
                        meshes.push(vertex_block(&node.next, true, mesh.has_normals));
                    }
                    BufferPart(meshes)
                })
            })
            .collect();

        if let Some(Some(last)) = attaches.get_mut(split.last) {
            last.0.extend(self.polygon_meshes(mesh));
        }

        Ok(Fragment {
            label,
            vertex_count: mesh.vertices.len() as u32,
            start: split.start,
            attaches,
        })
    }

    fn correct_space(&self, part: &mut BufferPart, matrix: Mat4, normals: Mat4) {
        for vertex in part.0.iter_mut().flat_map(|m| m.vertices.iter_mut()) {
            vertex.position = matrix.transform_point3(vertex.position);
            vertex.normal = normals.transform_vector3(vertex.normal);
        }
    }

    fn finish(&self, part: BufferPart, label: String) -> Attach {
        Attach::from_buffer(label, part.0)
    }

    fn combine_attaches(&self, parts: Vec<BufferPart>, label: String) -> Attach {
        let (vertices, polygons): (Vec<BufferMesh>, Vec<BufferMesh>) =
            parts.into_iter().flat_map(|p| p.0).partition(|m| m.has_vertices());
        Attach::from_buffer(label, vertices.into_iter().chain(polygons).collect())
    }
}
