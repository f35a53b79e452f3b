//! Weighted meshes from buffered attaches
//!
//! The tree is walked in traversal order while replaying every vertex block
//! into a simulated vertex cache. Each cache slot remembers which nodes wrote
//! a non-zero weight into it since its last "start" write; the polygons of a
//! node then reveal which nodes its mesh depends on.

use std::borrow::Cow;
use std::collections::BTreeSet;

use glam::{Mat4, Vec3};
use hashbrown::HashMap;
use tracing::{debug, trace};

use super::mesh::{MAX_VERTICES, WeightedMesh, WeightedVertex};
use crate::attach::{AttachId, BufferCorner, BufferMesh, Color};
use crate::config::ConvertOptions;
use crate::error::{ModelError, Result};
use crate::math::normal_matrix;
use crate::node::{Model, TreeLayout};

#[derive(Clone, Copy, Debug)]
struct Contribution {
    node: usize,
    position: Vec3,
    normal: Vec3,
    weight: f32,
}

#[derive(Clone, Debug, Default)]
struct Slot {
    written: bool,
    nodes: BTreeSet<usize>,
    contributions: Vec<Contribution>,
}

/// Simulated engine vertex cache
#[derive(Default)]
struct VertexCache {
    slots: Vec<Slot>,
}

impl VertexCache {
    fn replay(&mut self, node: usize, mesh: &BufferMesh) {
        for vertex in &mesh.vertices {
            let index = mesh.write_slot(vertex);
            if index >= self.slots.len() {
                self.slots.resize_with(index + 1, Slot::default);
            }
            let slot = &mut self.slots[index];
            if !mesh.continue_weight {
                slot.nodes.clear();
                slot.contributions.clear();
            }
            slot.written = true;
            if vertex.weight > 0.0 {
                slot.nodes.insert(node);
                slot.contributions.push(Contribution {
                    node,
                    position: vertex.position,
                    normal: vertex.normal,
                    weight: vertex.weight,
                });
            }
        }
    }

    fn slot(&self, node: usize, index: usize) -> Result<&Slot> {
        match self.slots.get(index) {
            Some(slot) if slot.written => Ok(slot),
            _ => Err(ModelError::CorruptWeights {
                node,
                reason: format!("polygons read vertex slot {index}, which is never written"),
            }),
        }
    }
}

/// Matrices taking one contributor's space into the mesh root's space
struct Space {
    vertices: Mat4,
    normals: Mat4,
}

fn accumulate(
    slot: &Slot,
    spaces: &HashMap<usize, (usize, Space)>,
    weight_count: usize,
    weight_epsilon: f32,
) -> WeightedVertex {
    let mut position = Vec3::ZERO;
    let mut normal = Vec3::ZERO;
    let mut weights = vec![0.0f32; weight_count];

    for c in &slot.contributions {
        let Some((weight_slot, space)) = spaces.get(&c.node) else {
            continue;
        };
        position += space.vertices.transform_point3(c.position) * c.weight;
        normal += space.normals.transform_vector3(c.normal) * c.weight;
        weights[*weight_slot] += c.weight;
    }

    let total: f32 = weights.iter().sum();
    if (total - 1.0).abs() > weight_epsilon && total > 0.0 {
        position /= total;
        normal /= total;
        for w in &mut weights {
            *w /= total;
        }
    }

    WeightedVertex::weighted(position, normal.normalize_or_zero(), weights)
}

/// Convert every mesh-bearing node of a buffered tree
pub(crate) fn convert(
    model: &Model,
    layout: &TreeLayout,
    options: &ConvertOptions,
    buffers: &[Option<Cow<'_, [BufferMesh]>>],
) -> Result<Vec<WeightedMesh>> {
    let mut cache = VertexCache::default();
    let mut meshes: Vec<WeightedMesh> = Vec::new();
    let mut by_attach: HashMap<AttachId, usize> = HashMap::new();

    for index in 0..layout.len() {
        let (Some(attach_id), Some(buffer)) = (model.node(layout.node_id(index)).attach(), buffers[index].as_ref())
        else {
            continue;
        };
        let attach = model.attach(attach_id);

        for mesh in buffer.iter() {
            cache.replay(index, mesh);
        }

        let polygons: Vec<(&BufferMesh, Vec<BufferCorner>)> = buffer
            .iter()
            .filter(|m| m.has_polygons())
            .map(|m| (m, m.triangle_corners()))
            .filter(|(_, corners)| !corners.is_empty())
            .collect();
        let used: BTreeSet<usize> = polygons
            .iter()
            .flat_map(|(_, corners)| corners.iter().map(|c| c.vertex_index as usize))
            .collect();
        if used.is_empty() {
            trace!(node = index, "attach draws nothing");
            continue;
        }
        if used.len() > MAX_VERTICES {
            return Err(ModelError::TooManyVertices(used.len()));
        }

        let mut contributors = BTreeSet::new();
        for &slot in &used {
            contributors.extend(cache.slot(index, slot)?.nodes.iter().copied());
        }
        if contributors.is_empty() {
            return Err(ModelError::CorruptWeights {
                node: index,
                reason: "polygons read only zero-weight vertices".into(),
            });
        }

        let weightless = contributors.len() == 1;
        let owner = contributors.first().copied().unwrap_or(index);
        if weightless && owner == index {
            if let Some(&existing) = by_attach.get(&attach_id) {
                debug!(node = index, attach = %attach.label, "reusing weightless mesh of shared attach");
                meshes[existing].root_indices.insert(index);
                continue;
            }
        }

        let root = if weightless {
            owner
        } else {
            layout.common_ancestor(contributors.iter().copied())
        };
        let mut spaces = HashMap::new();
        for (weight_slot, &node) in contributors.iter().enumerate() {
            let vertices = layout.vertex_matrix(node, root)?;
            let normals = normal_matrix(vertices, layout.label(node))?;
            spaces.insert(node, (weight_slot, Space { vertices, normals }));
        }

        let mut remap: HashMap<usize, u16> = HashMap::with_capacity(used.len());
        let mut vertices = Vec::with_capacity(used.len());
        for &slot in &used {
            let mut vertex = accumulate(cache.slot(index, slot)?, &spaces, contributors.len(), options.weight_epsilon);
            if weightless {
                vertex.weights = None;
            }
            remap.insert(slot, vertices.len() as u16);
            vertices.push(vertex);
        }

        let mut mesh = WeightedMesh {
            label: Some(attach.label.clone()),
            vertices,
            triangle_sets: Vec::with_capacity(polygons.len()),
            materials: Vec::with_capacity(polygons.len()),
            root_indices: BTreeSet::from([root]),
            depending_node_indices: contributors.iter().map(|&n| n - root).collect(),
            has_colors: polygons.iter().any(|(m, _)| m.has_colors),
            has_normals: buffer.iter().any(|m| m.has_normals),
        };
        for (source, corners) in polygons {
            // Colorless blocks draw white whatever their corners hold
            mesh.triangle_sets.push(
                corners
                    .into_iter()
                    .map(|c| BufferCorner {
                        color: if source.has_colors { c.color } else { Color::WHITE },
                        ..c.with_vertex_index(remap[&(c.vertex_index as usize)])
                    })
                    .collect(),
            );
            mesh.materials.push(source.material.clone());
        }

        debug!(
            node = index,
            root,
            depending = contributors.len(),
            vertices = mesh.vertices.len(),
            triangles = mesh.triangle_count(),
            "built weighted mesh"
        );
        if weightless && owner == index {
            by_attach.insert(attach_id, meshes.len());
        }
        meshes.push(mesh);
    }

    Ok(meshes)
}
