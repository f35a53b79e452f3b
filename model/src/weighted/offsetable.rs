//! Shared framework for formats with a hardware vertex cache
//!
//! Buffer, Chunk and GC attaches all write vertices into the engine's shared
//! cache, so a weighted mesh becomes one [`Fragment`] spanning the nodes it
//! depends on. Fragments are replicated per root, placed by the offset
//! planner, then bucketed per node and turned into attaches.

use std::collections::BTreeMap;

use glam::{Mat4, Vec3};
use tracing::{debug, info, warn};

use super::mesh::WeightedMesh;
use super::offsets::{Fragment, VertexOffset, plan_vertex_offsets};
use crate::attach::{Attach, AttachFormat};
use crate::error::{ModelError, Result};
use crate::math::normal_matrix;
use crate::node::{Model, TreeLayout};

/// Per-format half of the native-skinning conversion
pub trait OffsetableAttachConverter {
    /// Format-specific piece of an attach, owned by one node
    type Part: Clone + VertexOffset;

    fn format(&self) -> AttachFormat;

    /// Single-node fragment at `root`, vertices already in root space
    fn convert_weightless(&self, mesh: &WeightedMesh, root: usize, label: String) -> Result<Fragment<Self::Part>>;

    /// Fragment over the depending node range of `mesh` placed at `root`
    fn convert_weighted(
        &self,
        mesh: &WeightedMesh,
        layout: &TreeLayout,
        root: usize,
        label: String,
    ) -> Result<Fragment<Self::Part>>;

    /// Transform every vertex of a part by `matrix`, normals by `normals`
    fn correct_space(&self, part: &mut Self::Part, matrix: Mat4, normals: Mat4);

    /// Attach for a node that received exactly one part
    fn finish(&self, part: Self::Part, label: String) -> Attach;

    /// Attach for a node that received parts from several fragments
    fn combine_attaches(&self, parts: Vec<Self::Part>, label: String) -> Attach;
}

// ============================================================================
// Weight splitting
// ============================================================================

/// A vertex as one depending node writes it
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct SplitVertex {
    /// Fragment-relative cache slot
    pub slot: u16,
    /// In the writing node's local space
    pub position: Vec3,
    pub normal: Vec3,
    pub weight: f32,
}

/// Vertices a depending node writes, split by accumulation state
#[derive(Clone, Debug, Default)]
pub(crate) struct NodeSplit {
    /// First non-zero contribution: overwrites the slot
    pub init: Vec<SplitVertex>,
    /// Later contributions: add onto the slot
    pub next: Vec<SplitVertex>,
}

#[derive(Clone, Debug)]
pub(crate) struct WeightSplit {
    /// Traversal index of the first depending node
    pub start: usize,
    /// Indexed relative to `start`; `None` for nodes in the range that do not depend
    pub nodes: Vec<Option<NodeSplit>>,
    /// Relative index of the last depending node, which draws the polygons
    pub last: usize,
}

/// Transforms from a mesh root into each depending node, relative index -> matrices
pub(crate) fn depending_spaces(mesh: &WeightedMesh, layout: &TreeLayout, root: usize) -> Result<Vec<(usize, Mat4, Mat4)>> {
    mesh.depending_node_indices
        .iter()
        .map(|&relative| {
            let node = root + relative;
            if node >= layout.len() {
                return Err(ModelError::InvalidWeights(format!(
                    "depending node {node} lies outside the {}-node tree",
                    layout.len()
                )));
            }
            let matrix = layout.local_matrix_from(root, node)?;
            let normals = normal_matrix(matrix, layout.label(node))?;
            Ok((node, matrix, normals))
        })
        .collect()
}

/// Split a weighted mesh into per-node init and continue vertex groups
///
/// A vertex is initialized by the lowest-indexed node with a non-zero weight
/// and continued by every later one. Vertices without any weight are written
/// with weight zero by the first depending node so their slot stays defined.
pub(crate) fn split_weights(mesh: &WeightedMesh, layout: &TreeLayout, root: usize) -> Result<WeightSplit> {
    let spaces = depending_spaces(mesh, layout, root)?;
    let (Some(&(start, ..)), Some(&(end, ..))) = (spaces.first(), spaces.last()) else {
        return Err(ModelError::InvalidWeights("mesh has no depending nodes".into()));
    };

    let mut nodes: Vec<Option<NodeSplit>> = vec![None; end - start + 1];
    for &(node, ..) in &spaces {
        nodes[node - start] = Some(NodeSplit::default());
    }

    for (i, vertex) in mesh.vertices.iter().enumerate() {
        let place = |matrix: Mat4, normals: Mat4, weight: f32| SplitVertex {
            slot: i as u16,
            position: matrix.transform_point3(vertex.position),
            normal: normals.transform_vector3(vertex.normal),
            weight,
        };

        let mut initialized = false;
        for (slot, &(node, matrix, normals)) in spaces.iter().enumerate() {
            let weight = vertex.weight(slot);
            if weight <= 0.0 {
                continue;
            }
            let Some(target) = nodes[node - start].as_mut() else {
                continue;
            };
            if initialized {
                target.next.push(place(matrix, normals, weight));
            } else {
                target.init.push(place(matrix, normals, weight));
                initialized = true;
            }
        }

        if !initialized {
            let (node, matrix, normals) = spaces[0];
            if let Some(target) = nodes[node - start].as_mut() {
                target.init.push(place(matrix, normals, 0.0));
            }
        }
    }

    Ok(WeightSplit {
        start,
        last: end - start,
        nodes,
    })
}

// ============================================================================
// Orchestration
// ============================================================================

/// Matrix moving a part converted for `base` into the space of the same part at `replica`
///
/// Both are `(root, node)` traversal pairs; the vertex keeps its position
/// relative to its root.
fn replica_space(layout: &TreeLayout, base: (usize, usize), replica: (usize, usize)) -> Result<Mat4> {
    let to_root = layout.vertex_matrix(base.1, base.0)?;
    let from_root = layout.local_matrix_from(replica.0, replica.1)?;
    Ok(from_root * to_root)
}

/// Emit attaches for every weighted mesh through `converter`
pub fn convert<C: OffsetableAttachConverter>(
    model: &mut Model,
    layout: &TreeLayout,
    meshes: &[WeightedMesh],
    converter: &C,
) -> Result<()> {
    let mut fragments: Vec<Fragment<C::Part>> = Vec::new();

    for (i, mesh) in meshes.iter().enumerate() {
        mesh.validate()?;
        let Some(&first_root) = mesh.root_indices.first() else {
            warn!(mesh = i, "weighted mesh has no root, skipping");
            continue;
        };

        let base_label = mesh.label.clone().unwrap_or_else(|| format!("mesh_{i}"));
        let replicated = mesh.root_indices.len() > 1;
        let label_at = |root: usize| {
            if replicated {
                format!("{base_label}_{root}")
            } else {
                base_label.clone()
            }
        };

        if first_root >= layout.len() {
            return Err(ModelError::InvalidWeights(format!(
                "root {first_root} of \"{base_label}\" lies outside the {}-node tree",
                layout.len()
            )));
        }
        let base = if mesh.is_weighted() {
            converter.convert_weighted(mesh, layout, first_root, label_at(first_root))?
        } else {
            converter.convert_weightless(mesh, first_root, label_at(first_root))?
        };

        let mut replicas = Vec::with_capacity(mesh.root_indices.len() - 1);
        for &root in mesh.root_indices.iter().skip(1) {
            let mut replica = base.clone();
            replica.label = label_at(root);
            replica.start = base.start - first_root + root;
            if replica.end() >= layout.len() {
                return Err(ModelError::InvalidWeights(format!(
                    "replica of \"{base_label}\" at root {root} runs past the {}-node tree",
                    layout.len()
                )));
            }
            for (k, part) in replica.attaches.iter_mut().enumerate() {
                let Some(part) = part else {
                    continue;
                };
                let node = replica.start + k;
                let matrix = replica_space(layout, (first_root, base.start + k), (root, node))?;
                if !matrix.abs_diff_eq(Mat4::IDENTITY, 1e-6) {
                    converter.correct_space(part, matrix, normal_matrix(matrix, layout.label(node))?);
                }
            }
            replicas.push(replica);
        }
        fragments.push(base);
        fragments.extend(replicas);
    }

    plan_vertex_offsets(&mut fragments)?;

    let mut buckets: BTreeMap<usize, Vec<(String, C::Part)>> = BTreeMap::new();
    for fragment in fragments {
        let split = fragment.attaches.iter().filter(|p| p.is_some()).count() > 1;
        for (k, part) in fragment.attaches.into_iter().enumerate() {
            let Some(part) = part else {
                continue;
            };
            let label = if split {
                format!("{}_{k}", fragment.label)
            } else {
                fragment.label.clone()
            };
            buckets.entry(fragment.start + k).or_default().push((label, part));
        }
    }

    let node_count = buckets.len();
    for (node, mut parts) in buckets {
        let attach = if parts.len() == 1 {
            let (label, part) = parts.remove(0);
            converter.finish(part, label)
        } else {
            debug!(node, parts = parts.len(), "combining parts");
            let label = format!("{}_attach", layout.label(node));
            converter.combine_attaches(parts.into_iter().map(|(_, p)| p).collect(), label)
        };
        let id = model.add_attach(attach);
        model.set_attach(layout.node_id(node), Some(id));
    }

    info!(format = ?converter.format(), meshes = meshes.len(), nodes = node_count, "emitted attaches");
    Ok(())
}
