//! Weighted meshes to GC attaches

use glam::{Mat4, Vec2};
use hashbrown::HashMap;

use super::mesh::WeightedMesh;
use super::offsetable::{OffsetableAttachConverter, SplitVertex, split_weights};
use super::offsets::{Fragment, VertexOffset};
use crate::attach::gc::{GcAttach, GcCorner, GcMesh, GcParameter, GcPolygon, GcPolygonType, GcVertexBlock};
use crate::attach::{Attach, AttachFormat, BufferVertex, Color};
use crate::error::Result;
use crate::node::TreeLayout;
use crate::strip::{Strippifier, strippify_corners};

impl VertexOffset for GcAttach {
    fn offset_vertices(&mut self, offset: u32) {
        for block in &mut self.vertex_blocks {
            block.cache_offset = (block.cache_offset as u32 + offset) as u16;
        }
        for mesh in self.opaque_meshes.iter_mut().chain(self.transparent_meshes.iter_mut()) {
            for corner in mesh.polygons.iter_mut().flat_map(|p| p.corners.iter_mut()) {
                corner.position_index = (corner.position_index as u32 + offset) as u16;
            }
        }
    }
}

/// Deduplicated color and texcoord arrays
#[derive(Default)]
struct AttributeTable {
    colors: Vec<Color>,
    color_ids: HashMap<Color, u16>,
    texcoords: Vec<Vec2>,
    texcoord_ids: HashMap<(u32, u32), u16>,
}

impl AttributeTable {
    fn color(&mut self, color: Color) -> u16 {
        *self.color_ids.entry(color).or_insert_with(|| {
            self.colors.push(color);
            (self.colors.len() - 1) as u16
        })
    }

    fn texcoord(&mut self, texcoord: Vec2) -> u16 {
        let key = (texcoord.x.to_bits(), texcoord.y.to_bits());
        *self.texcoord_ids.entry(key).or_insert_with(|| {
            self.texcoords.push(texcoord);
            (self.texcoords.len() - 1) as u16
        })
    }
}

pub struct GcConverter<'a> {
    strippifier: &'a dyn Strippifier,
}

impl<'a> GcConverter<'a> {
    pub fn new(strippifier: &'a dyn Strippifier) -> Self {
        Self { strippifier }
    }

    /// Attribute arrays and meshes for every triangle set
    fn polygons(&self, mesh: &WeightedMesh, attach: &mut GcAttach) {
        let mut table = AttributeTable::default();

        for (corners, material) in mesh.triangle_sets.iter().zip(&mesh.materials) {
            if corners.is_empty() {
                continue;
            }
            let corners: Vec<GcCorner> = corners
                .iter()
                .map(|c| GcCorner {
                    position_index: c.vertex_index,
                    color_index: if mesh.has_colors { table.color(c.color) } else { 0 },
                    texcoord_index: table.texcoord(c.texcoord),
                })
                .collect();

            let strips = strippify_corners(&corners, self.strippifier);
            let strip_corners: usize = strips.iter().map(Vec::len).sum();
            let polygons = if strip_corners < corners.len() {
                strips
                    .into_iter()
                    .map(|corners| GcPolygon {
                        kind: GcPolygonType::TriangleStrip,
                        corners,
                    })
                    .collect()
            } else {
                vec![GcPolygon {
                    kind: GcPolygonType::Triangles,
                    corners,
                }]
            };

            let gc_mesh = GcMesh {
                parameters: GcParameter::for_material(material),
                vertex_colors: mesh.has_colors,
                polygons,
            };
            if material.use_alpha() {
                attach.transparent_meshes.push(gc_mesh);
            } else {
                attach.opaque_meshes.push(gc_mesh);
            }
        }

        attach.colors = table.colors;
        attach.texcoords = table.texcoords;
    }
}

fn vertex_block(vertices: &[SplitVertex], continue_weight: bool) -> GcVertexBlock {
    GcVertexBlock {
        cache_offset: 0,
        continue_weight,
        vertices: vertices
            .iter()
            .map(|v| BufferVertex::weighted(v.position, v.normal, v.slot, v.weight))
            .collect(),
    }
}

fn finish_attach(label: String, data: GcAttach) -> Attach {
    let mut attach = Attach::from_gc(label, data);
    attach.generate_buffer();
    attach
}

impl OffsetableAttachConverter for GcConverter<'_> {
    type Part = GcAttach;

    fn format(&self) -> AttachFormat {
        AttachFormat::Gc
    }

    fn convert_weightless(&self, mesh: &WeightedMesh, root: usize, label: String) -> Result<Fragment<GcAttach>> {
        let mut attach = GcAttach {
            vertex_blocks: vec![GcVertexBlock {
                cache_offset: 0,
                continue_weight: false,
                vertices: mesh
                    .vertices
                    .iter()
                    .enumerate()
                    .map(|(i, v)| BufferVertex::new(v.position, v.normal, i as u16))
                    .collect(),
            }],
            ..Default::default()
        };
        self.polygons(mesh, &mut attach);

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
    ) -> Result<Fragment<GcAttach>> {
        let split = split_weights(mesh, layout, root)?;
        let mut attaches: Vec<Option<GcAttach>> = split
            .nodes
            .iter()
            .map(|node| {
                node.as_ref().map(|node| {
                    let mut attach = GcAttach::default();
                    if !node.init.is_empty() {
                        attach.vertex_blocks.push(vertex_block(&node.init, false));
                    }
                    if !node.next.is_empty() {
                        attach.vertex_blocks.push(vertex_block(&node.next, true));
                    }
                    attach
                })
            })
            .collect();

        if let Some(Some(last)) = attaches.get_mut(split.last) {
            self.polygons(mesh, last);
        }

        Ok(Fragment {
            label,
            vertex_count: mesh.vertices.len() as u32,
            start: split.start,
            attaches,
        })
    }

    fn correct_space(&self, part: &mut GcAttach, matrix: Mat4, normals: Mat4) {
        for vertex in part.vertex_blocks.iter_mut().flat_map(|b| b.vertices.iter_mut()) {
            vertex.position = matrix.transform_point3(vertex.position);
            vertex.normal = normals.transform_vector3(vertex.normal);
        }
    }

    fn finish(&self, part: GcAttach, label: String) -> Attach {
        finish_attach(label, part)
    }

    fn combine_attaches(&self, parts: Vec<GcAttach>, label: String) -> Attach {
        let mut combined = GcAttach::default();
        for mut part in parts {
            let color_base = combined.colors.len() as u16;
            let texcoord_base = combined.texcoords.len() as u16;
            for mesh in part.opaque_meshes.iter_mut().chain(part.transparent_meshes.iter_mut()) {
                for corner in mesh.polygons.iter_mut().flat_map(|p| p.corners.iter_mut()) {
                    corner.color_index += color_base;
                    corner.texcoord_index += texcoord_base;
                }
            }
            combined.vertex_blocks.extend(part.vertex_blocks);
            combined.colors.extend(part.colors);
            combined.texcoords.extend(part.texcoords);
            combined.opaque_meshes.extend(part.opaque_meshes);
            combined.transparent_meshes.extend(part.transparent_meshes);
        }
        finish_attach(label, combined)
    }
}
