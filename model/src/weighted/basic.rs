//! Welding emulation for the basic format
//!
//! Basic attaches cannot blend vertices in hardware. A node instead carries
//! [`VertexWelding`] records that rebuild some of its vertices from vertices of
//! other nodes, and every set of nodes linked by welds lifts into one weighted
//! mesh. Exporting goes the other way: each triangle is baked into the node
//! that dominates it, and blended vertices become welds again.

use std::collections::BTreeMap;

use glam::{Mat4, Vec2, Vec3};
use hashbrown::{HashMap, HashSet};
use tracing::{debug, info, trace};

use super::mesh::{MAX_VERTICES, WeightedMesh, WeightedVertex};
use super::offsetable::depending_spaces;
use crate::attach::{
    Attach, AttachData, AttachFormat, AttachId, BasicAttach, BasicMesh, BasicPolygon, BasicPolygonType,
    BufferCorner,
};
use crate::config::ConvertOptions;
use crate::error::{ModelError, Result};
use crate::math::{normal_matrix, transform_vertex};
use crate::node::{Model, TreeLayout, VertexWelding, Weld};
use crate::strip::{Strippifier, strippify_corners};

// ============================================================================
// Attach -> weighted
// ============================================================================

struct BasicNode<'a> {
    id: AttachId,
    attach: &'a Attach,
    basic: &'a BasicAttach,
}

fn basic_nodes<'a>(model: &'a Model, layout: &TreeLayout) -> Vec<Option<BasicNode<'a>>> {
    (0..layout.len())
        .map(|i| {
            let id = model.node(layout.node_id(i)).attach()?;
            let attach = model.attach(id);
            match &attach.data {
                AttachData::Basic(basic) => Some(BasicNode { id, attach, basic }),
                _ => None,
            }
        })
        .collect()
}

fn welding<'m>(model: &'m Model, layout: &TreeLayout, index: usize) -> &'m [VertexWelding] {
    model.node(layout.node_id(index)).welding().unwrap_or(&[])
}

fn vertex_count(nodes: &[Option<BasicNode<'_>>], index: usize) -> usize {
    nodes[index].as_ref().map_or(0, |n| n.basic.vertex_count())
}

fn validate_welding(model: &Model, layout: &TreeLayout, nodes: &[Option<BasicNode<'_>>]) -> Result<()> {
    for node in 0..layout.len() {
        let own = vertex_count(nodes, node);
        for record in welding(model, layout, node) {
            if record.destination_vertex as usize >= own {
                return Err(ModelError::WeldVertexOutOfRange {
                    node,
                    source_node: node,
                    vertex: record.destination_vertex,
                    vertex_count: own,
                });
            }
            for weld in &record.welds {
                if weld.node_index >= layout.len() {
                    return Err(ModelError::WeldOutsideTree {
                        node,
                        source_node: weld.node_index,
                        node_count: layout.len(),
                    });
                }
                let count = vertex_count(nodes, weld.node_index);
                if weld.vertex_index as usize >= count {
                    return Err(ModelError::WeldVertexOutOfRange {
                        node,
                        source_node: weld.node_index,
                        vertex: weld.vertex_index,
                        vertex_count: count,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Disjoint sets over traversal indices; every set is represented by its lowest index
struct WeldGroups {
    parent: Vec<usize>,
}

impl WeldGroups {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a != b {
            self.parent[a.max(b)] = a.min(b);
        }
    }
}

/// Lift every basic attach of the tree, merging welded node groups
pub(crate) fn to_weighted(model: &Model, layout: &TreeLayout, options: &ConvertOptions) -> Result<Vec<WeightedMesh>> {
    let nodes = basic_nodes(model, layout);
    validate_welding(model, layout, &nodes)?;

    let mut groups = WeldGroups::new(layout.len());
    for node in 0..layout.len() {
        for weld in welding(model, layout, node).iter().flat_map(|r| &r.welds) {
            groups.union(node, weld.node_index);
        }
    }
    let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for node in (0..layout.len()).filter(|&i| nodes[i].is_some()) {
        members.entry(groups.find(node)).or_default().push(node);
    }

    let mut meshes: Vec<WeightedMesh> = Vec::new();
    let mut identity: HashMap<AttachId, usize> = HashMap::new();
    for group in members.into_values() {
        let welded = group.len() > 1 || !welding(model, layout, group[0]).is_empty();
        if welded {
            let mesh = weld_group(model, layout, &nodes, &group, options)?;
            if mesh.triangle_count() == 0 {
                trace!(nodes = ?group, "welded group draws nothing");
                continue;
            }
            meshes.push(mesh);
            continue;
        }

        let node = group[0];
        let Some(basic) = &nodes[node] else {
            continue;
        };
        if let Some(&shared) = identity.get(&basic.id) {
            meshes[shared].root_indices.insert(node);
            continue;
        }
        let mesh = WeightedMesh::from_buffer_meshes(&basic.basic.to_buffer(), node, Some(basic.attach.label.clone()))?;
        if mesh.triangle_count() == 0 {
            trace!(node, "attach draws nothing");
            continue;
        }
        identity.insert(basic.id, meshes.len());
        meshes.push(mesh);
    }

    debug!(meshes = meshes.len(), "lifted basic attaches");
    Ok(meshes)
}

/// One weighted mesh out of a group of welded nodes
fn weld_group(
    model: &Model,
    layout: &TreeLayout,
    nodes: &[Option<BasicNode<'_>>],
    group: &[usize],
    options: &ConvertOptions,
) -> Result<WeightedMesh> {
    let root = layout.common_ancestor(group.iter().copied());
    let slot_of: HashMap<usize, usize> = group.iter().enumerate().map(|(slot, &n)| (n, slot)).collect();

    let total: usize = group.iter().map(|&n| vertex_count(nodes, n)).sum();
    if total > MAX_VERTICES {
        return Err(ModelError::TooManyVertices(total));
    }

    let mut bases = Vec::with_capacity(group.len());
    let mut vertices = Vec::with_capacity(total);
    for (slot, &node) in group.iter().enumerate() {
        bases.push(vertices.len());
        let Some(member) = &nodes[node] else {
            continue;
        };
        let matrix = layout.vertex_matrix(node, root)?;
        let normals = normal_matrix(matrix, layout.label(node))?;
        for (j, &position) in member.basic.positions.iter().enumerate() {
            let (position, normal) = transform_vertex(matrix, normals, position, member.basic.normal(j));
            let mut weights = vec![0.0; group.len()];
            weights[slot] = 1.0;
            vertices.push(WeightedVertex::weighted(position, normal, weights));
        }
    }

    // Welds read the unwelded vertices, so chained welds do not compound
    let rest = vertices.clone();
    for (slot, &node) in group.iter().enumerate() {
        for record in welding(model, layout, node) {
            let mut weights = vec![0.0; group.len()];
            let blended = record.evaluate(|weld| {
                let source = *slot_of.get(&weld.node_index)?;
                weights[source] += weld.weight;
                let vertex = rest.get(bases[source] + weld.vertex_index as usize)?;
                Some((vertex.position, vertex.normal))
            });
            let Some((position, normal)) = blended else {
                return Err(ModelError::CorruptWeights {
                    node,
                    reason: format!("weld source of vertex {} is missing", record.destination_vertex),
                });
            };
            // The blend stays as authored; only the weights are rescaled
            let sum: f32 = weights.iter().sum();
            if sum > 0.0 && (sum - 1.0).abs() > options.weight_epsilon {
                weights.iter_mut().for_each(|w| *w /= sum);
            }
            vertices[bases[slot] + record.destination_vertex as usize] =
                WeightedVertex::weighted(position, normal, weights);
        }
    }

    let mut triangle_sets = Vec::new();
    let mut materials = Vec::new();
    let mut has_colors = false;
    let mut has_normals = false;
    for (slot, &node) in group.iter().enumerate() {
        let Some(member) = &nodes[node] else {
            continue;
        };
        has_normals |= !member.basic.normals.is_empty();
        for mesh in &member.basic.meshes {
            let corners = mesh.triangle_corners();
            if corners.is_empty() {
                continue;
            }
            let count = member.basic.vertex_count();
            if let Some(c) = corners.iter().find(|c| c.vertex_index as usize >= count) {
                return Err(ModelError::CorruptWeights {
                    node,
                    reason: format!("polygon references vertex {} of {count}", c.vertex_index),
                });
            }
            has_colors |= mesh.colors.is_some();
            let base = bases[slot];
            triangle_sets.push(
                corners
                    .into_iter()
                    .map(|c| c.with_vertex_index((base + c.vertex_index as usize) as u16))
                    .collect(),
            );
            materials.push(member.basic.material(mesh.material_index));
        }
    }

    let label = nodes[group[0]].as_ref().map(|n| n.attach.label.clone());
    let mut mesh = WeightedMesh {
        label,
        vertices,
        triangle_sets,
        materials,
        root_indices: [root].into(),
        depending_node_indices: group.iter().map(|&n| n - root).collect(),
        has_colors,
        has_normals,
    };

    let merged = merge_close_vertices(&mut mesh, options.weld_epsilon);
    let pruned = mesh.prune_unreferenced();
    debug!(root, nodes = group.len(), merged, pruned, "welded group");
    mesh.validate()?;
    Ok(mesh)
}

fn close(a: &WeightedVertex, b: &WeightedVertex, epsilon: f32) -> bool {
    a.position.distance(b.position) <= epsilon && a.normal.distance(b.normal) <= epsilon && a.weights == b.weights
}

/// Merge vertices within `epsilon` of each other that carry equal weights
///
/// The first vertex of a cluster is kept and later ones are remapped onto
/// it. Passes repeat until one merges nothing; returns the merged count.
pub(crate) fn merge_close_vertices(mesh: &mut WeightedMesh, epsilon: f32) -> usize {
    let mut total = 0;
    loop {
        let merged = merge_pass(mesh, epsilon);
        if merged == 0 {
            return total;
        }
        total += merged;
    }
}

fn merge_pass(mesh: &mut WeightedMesh, epsilon: f32) -> usize {
    let cell_size = if epsilon > 0.0 { epsilon } else { 1.0 };
    let cell = |p: Vec3| {
        let c = (p / cell_size).floor();
        (c.x as i32, c.y as i32, c.z as i32)
    };

    let mut grid: HashMap<(i32, i32, i32), Vec<u32>> = HashMap::new();
    let mut kept: Vec<WeightedVertex> = Vec::with_capacity(mesh.vertices.len());
    let mut remap = Vec::with_capacity(mesh.vertices.len());

    for vertex in &mesh.vertices {
        let (x, y, z) = cell(vertex.position);
        let mut found = None;
        'search: for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let key = (x.saturating_add(dx), y.saturating_add(dy), z.saturating_add(dz));
                    let Some(candidates) = grid.get(&key) else {
                        continue;
                    };
                    if let Some(&k) = candidates.iter().find(|&&k| close(&kept[k as usize], vertex, epsilon)) {
                        found = Some(k);
                        break 'search;
                    }
                }
            }
        }

        let target = match found {
            Some(k) => k,
            None => {
                let k = kept.len() as u32;
                kept.push(vertex.clone());
                grid.entry((x, y, z)).or_default().push(k);
                k
            }
        };
        remap.push(target);
    }

    let merged = mesh.vertices.len() - kept.len();
    if merged > 0 {
        mesh.remap_vertices(kept, &remap);
        drop_degenerate(mesh);
    }
    merged
}

/// Remove triangles that lost an edge to merging, along with emptied sets
fn drop_degenerate(mesh: &mut WeightedMesh) {
    let sets = std::mem::take(&mut mesh.triangle_sets);
    let materials = std::mem::take(&mut mesh.materials);
    for (corners, material) in sets.into_iter().zip(materials) {
        let kept: Vec<BufferCorner> = corners
            .chunks_exact(3)
            .filter(|t| !is_degenerate(t))
            .flatten()
            .copied()
            .collect();
        if kept.len() != corners.len() {
            trace!(dropped = (corners.len() - kept.len()) / 3, "dropped degenerate triangles");
        }
        if !kept.is_empty() {
            mesh.triangle_sets.push(kept);
            mesh.materials.push(material);
        }
    }
}

fn is_degenerate(t: &[BufferCorner]) -> bool {
    t[0].vertex_index == t[1].vertex_index || t[1].vertex_index == t[2].vertex_index || t[0].vertex_index == t[2].vertex_index
}

// ============================================================================
// Weighted -> attach
// ============================================================================

/// What one node receives from one placement of a weighted mesh
struct NodeBuild {
    /// Weighted vertex -> local vertex
    local: HashMap<u32, u16>,
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    /// Triangle corners per triangle set of the mesh
    triangles: Vec<Vec<BufferCorner>>,
    welding: Vec<VertexWelding>,
    welded: HashSet<u32>,
}

impl NodeBuild {
    fn new(sets: usize) -> Self {
        Self {
            local: HashMap::new(),
            positions: Vec::new(),
            normals: Vec::new(),
            triangles: vec![Vec::new(); sets],
            welding: Vec::new(),
            welded: HashSet::new(),
        }
    }

    fn vertex(&mut self, index: u32, source: &WeightedVertex, matrix: Mat4, normals: Mat4) -> Result<u16> {
        if let Some(&local) = self.local.get(&index) {
            return Ok(local);
        }
        if self.positions.len() >= MAX_VERTICES {
            return Err(ModelError::TooManyVertices(self.positions.len() + 1));
        }
        let (position, normal) = transform_vertex(matrix, normals, source.position, source.normal);
        let local = self.positions.len() as u16;
        self.positions.push(position);
        self.normals.push(normal);
        self.local.insert(index, local);
        Ok(local)
    }
}

/// Node index plus root-to-node vertex and normal matrices, in slot order
type Spaces = [(usize, Mat4, Mat4)];

/// Depending slot with the largest summed corner weight; ties go to the lower slot
fn drawing_slot(mesh: &WeightedMesh, triangle: &[BufferCorner], slots: usize) -> usize {
    let mut best = 0;
    let mut best_weight = f32::MIN;
    for slot in 0..slots {
        let weight: f32 = triangle
            .iter()
            .map(|c| mesh.vertices[c.vertex_index as usize].weight(slot))
            .sum();
        if weight > best_weight {
            best = slot;
            best_weight = weight;
        }
    }
    best
}

/// Whether `owner` alone fully determines the vertex
fn is_owned(vertex: &WeightedVertex, owner: usize, slots: usize, epsilon: f32) -> bool {
    (0..slots).all(|slot| {
        let weight = vertex.weight(slot);
        if slot == owner {
            (weight - 1.0).abs() <= epsilon
        } else {
            weight == 0.0
        }
    })
}

/// Local index of a weighted vertex on `owner`, recording a weld if it needs one
fn place_vertex(
    mesh: &WeightedMesh,
    spaces: &Spaces,
    builds: &mut [NodeBuild],
    owner: usize,
    index: u32,
    epsilon: f32,
) -> Result<u16> {
    let source = &mesh.vertices[index as usize];
    let (_, matrix, normals) = spaces[owner];
    let local = builds[owner].vertex(index, source, matrix, normals)?;
    if builds[owner].welded.contains(&index) || is_owned(source, owner, spaces.len(), epsilon) {
        return Ok(local);
    }

    let mut welds = Vec::new();
    for (slot, &(node, matrix, normals)) in spaces.iter().enumerate() {
        let weight = source.weight(slot);
        if weight == 0.0 {
            continue;
        }
        let vertex_index = if slot == owner {
            local
        } else {
            builds[slot].vertex(index, source, matrix, normals)?
        };
        welds.push(Weld {
            node_index: node,
            vertex_index: vertex_index as u32,
            weight,
        });
    }
    builds[owner].welded.insert(index);
    builds[owner].welding.push(VertexWelding::new(local as u32, welds));
    Ok(local)
}

/// Split one placement of a mesh into per-node builds, in slot order
fn bake_placement(mesh: &WeightedMesh, spaces: &Spaces, options: &ConvertOptions) -> Result<Vec<NodeBuild>> {
    let mut builds: Vec<NodeBuild> = (0..spaces.len())
        .map(|_| NodeBuild::new(mesh.triangle_sets.len()))
        .collect();

    for (set, corners) in mesh.triangle_sets.iter().enumerate() {
        for triangle in corners.chunks_exact(3) {
            if is_degenerate(triangle) {
                continue;
            }
            let owner = drawing_slot(mesh, triangle, spaces.len());
            for corner in triangle {
                let local = place_vertex(
                    mesh,
                    spaces,
                    &mut builds,
                    owner,
                    corner.vertex_index as u32,
                    options.weight_epsilon,
                )?;
                builds[owner].triangles[set].push(corner.with_vertex_index(local));
            }
        }
    }
    Ok(builds)
}

/// Basic mesh for one material, as strips when that takes fewer corners
fn basic_mesh(
    corners: &[BufferCorner],
    material_index: u16,
    has_colors: bool,
    strippifier: &dyn Strippifier,
) -> BasicMesh {
    let strips = strippify_corners(corners, strippifier);
    let strip_corners: usize = strips.iter().map(Vec::len).sum();
    let (polygon_type, polygons) = if strip_corners < corners.len() {
        (BasicPolygonType::Strips, strips)
    } else {
        (
            BasicPolygonType::Triangles,
            corners.chunks_exact(3).map(<[BufferCorner]>::to_vec).collect(),
        )
    };

    let flat = || polygons.iter().flatten();
    BasicMesh {
        material_index,
        polygon_type,
        colors: has_colors.then(|| flat().map(|c| c.color).collect()),
        texcoords: flat()
            .any(|c| c.texcoord != Vec2::ZERO)
            .then(|| flat().map(|c| c.texcoord).collect()),
        polygons: polygons
            .iter()
            .map(|p| BasicPolygon::new(p.iter().map(|c| c.vertex_index).collect()))
            .collect(),
    }
}

/// A node's share of one placement, ready to be combined with others
struct NodePart {
    /// Placement the part came from
    tag: usize,
    label: String,
    basic: BasicAttach,
    welding: Vec<VertexWelding>,
}

fn node_part(
    build: NodeBuild,
    mesh: &WeightedMesh,
    tag: usize,
    label: String,
    strippifier: &dyn Strippifier,
) -> NodePart {
    let mut basic = BasicAttach {
        positions: build.positions,
        normals: if mesh.has_normals { build.normals } else { Vec::new() },
        meshes: Vec::new(),
        materials: Vec::new(),
    };
    for (corners, material) in build.triangles.iter().zip(&mesh.materials) {
        if corners.is_empty() {
            continue;
        }
        let material_index = match basic.materials.iter().position(|m| m == material) {
            Some(i) => i,
            None => {
                basic.materials.push(material.clone());
                basic.materials.len() - 1
            }
        };
        basic
            .meshes
            .push(basic_mesh(corners, material_index as u16, mesh.has_colors, strippifier));
    }
    NodePart {
        tag,
        label,
        basic,
        welding: build.welding,
    }
}

/// Emit basic attaches and welding for every weighted mesh
pub(crate) fn from_weighted(
    model: &mut Model,
    layout: &TreeLayout,
    meshes: &[WeightedMesh],
    options: &ConvertOptions,
    strippifier: &dyn Strippifier,
) -> Result<()> {
    let mut parts: BTreeMap<usize, Vec<NodePart>> = BTreeMap::new();
    let mut tag = 0;

    for (i, mesh) in meshes.iter().enumerate() {
        mesh.validate()?;
        let base_label = mesh.label.clone().unwrap_or_else(|| format!("mesh_{i}"));
        let replicated = mesh.root_indices.len() > 1;

        for &root in &mesh.root_indices {
            if root >= layout.len() {
                return Err(ModelError::InvalidWeights(format!(
                    "root {root} of \"{base_label}\" lies outside the {}-node tree",
                    layout.len()
                )));
            }
            let spaces = depending_spaces(mesh, layout, root)?;
            let Some(&(start, ..)) = spaces.first() else {
                continue;
            };
            let builds = bake_placement(mesh, &spaces, options)?;

            let label = if replicated {
                format!("{base_label}_{root}")
            } else {
                base_label.clone()
            };
            let populated = builds.iter().filter(|b| !b.positions.is_empty()).count();
            for (build, &(node, ..)) in builds.into_iter().zip(spaces.iter()) {
                if build.positions.is_empty() {
                    continue;
                }
                let label = if populated > 1 {
                    format!("{label}_{}", node - start)
                } else {
                    label.clone()
                };
                parts
                    .entry(node)
                    .or_default()
                    .push(node_part(build, mesh, tag, label, strippifier));
            }
            tag += 1;
        }
    }

    emit(model, layout, parts)
}

/// Combine parts per node and attach them
///
/// Weld sources point into other nodes' parts, so every part's vertex base
/// is fixed before any weld is rewritten.
fn emit(model: &mut Model, layout: &TreeLayout, parts: BTreeMap<usize, Vec<NodePart>>) -> Result<()> {
    let mut bases: HashMap<(usize, usize), u32> = HashMap::new();
    for (&node, node_parts) in &parts {
        let mut base = 0usize;
        for part in node_parts {
            bases.insert((part.tag, node), base as u32);
            base += part.basic.vertex_count();
        }
        if base > MAX_VERTICES {
            return Err(ModelError::TooManyVertices(base));
        }
    }

    let node_count = parts.len();
    for (node, node_parts) in parts {
        let label = match node_parts.as_slice() {
            [single] => single.label.clone(),
            _ => {
                debug!(node, parts = node_parts.len(), "combining parts");
                format!("{}_attach", layout.label(node))
            }
        };
        let with_normals = node_parts.iter().any(|p| !p.basic.normals.is_empty());

        let mut combined = BasicAttach::default();
        let mut welding = Vec::new();
        for part in node_parts {
            let vertex_base = combined.positions.len() as u16;
            let material_base = combined.materials.len() as u16;
            if with_normals {
                if part.basic.normals.is_empty() {
                    combined.normals.extend(std::iter::repeat_n(Vec3::Y, part.basic.vertex_count()));
                } else {
                    combined.normals.extend(part.basic.normals);
                }
            }
            combined.positions.extend(part.basic.positions);
            combined.materials.extend(part.basic.materials);
            for mut mesh in part.basic.meshes {
                mesh.material_index += material_base;
                for index in mesh.polygons.iter_mut().flat_map(|p| p.indices.iter_mut()) {
                    *index += vertex_base;
                }
                combined.meshes.push(mesh);
            }
            for mut record in part.welding {
                record.destination_vertex += vertex_base as u32;
                for weld in &mut record.welds {
                    weld.vertex_index += bases.get(&(part.tag, weld.node_index)).copied().unwrap_or(0);
                }
                welding.push(record);
            }
        }

        let mut attach = Attach::from_basic(label, combined);
        attach.generate_buffer();
        let id = model.add_attach(attach);
        let node_id = layout.node_id(node);
        model.set_attach(node_id, Some(id));
        if !welding.is_empty() {
            model.set_welding(node_id, Some(welding));
        }
    }

    info!(format = ?AttachFormat::Basic, nodes = node_count, "emitted attaches");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::attach::BufferMaterial;
    use crate::strip::GreedyStrippifier;

    fn triangle_attach(offset: Vec3) -> BasicAttach {
        BasicAttach {
            positions: vec![offset, offset + Vec3::X, offset + Vec3::Y],
            normals: vec![Vec3::Z; 3],
            meshes: vec![BasicMesh {
                material_index: 0,
                polygon_type: BasicPolygonType::Triangles,
                polygons: vec![BasicPolygon::new(vec![0, 1, 2])],
                colors: None,
                texcoords: None,
            }],
            materials: vec![BufferMaterial::default()],
        }
    }

    // root -> a, b under root
    fn welded_model(welds: Vec<VertexWelding>) -> Model {
        let mut model = Model::new("root");
        let root = model.root();
        let a = model.add_child(root, "a");
        let b = model.add_child(root, "b");
        model.set_position(b, Vec3::new(5.0, 0.0, 0.0));
        for (node, label) in [(a, "a_mesh"), (b, "b_mesh")] {
            let id = model.add_attach(Attach::from_basic(label, triangle_attach(Vec3::ZERO)));
            model.set_attach(node, Some(id));
        }
        model.set_welding(b, Some(welds));
        model
    }

    fn weld(node_index: usize, vertex_index: u32, weight: f32) -> Weld {
        Weld {
            node_index,
            vertex_index,
            weight,
        }
    }

    #[test]
    fn test_welded_nodes_form_one_mesh() {
        let model = welded_model(vec![VertexWelding::new(0, vec![weld(1, 0, 0.5), weld(2, 0, 0.5)])]);
        let layout = TreeLayout::new(&model);
        let meshes = to_weighted(&model, &layout, &ConvertOptions::default()).unwrap();
        assert_eq!(meshes.len(), 1);

        let mesh = &meshes[0];
        assert_eq!(mesh.root_indices, BTreeSet::from([0]));
        assert_eq!(mesh.depending(), vec![1, 2]);
        assert_eq!(mesh.label.as_deref(), Some("a_mesh"));
        assert_eq!(mesh.triangle_count(), 2);

        let welded = mesh
            .vertices
            .iter()
            .find(|v| v.weights.as_deref() == Some(&[0.5, 0.5][..]))
            .unwrap();
        // midway between a's origin and b's origin at x = 5
        assert!((welded.position - Vec3::new(2.5, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_partial_weld_weights_are_normalized() {
        let model = welded_model(vec![VertexWelding::new(0, vec![weld(1, 1, 0.5), weld(2, 1, 0.3)])]);
        let layout = TreeLayout::new(&model);
        let meshes = to_weighted(&model, &layout, &ConvertOptions::default()).unwrap();

        let welded = meshes[0]
            .vertices
            .iter()
            .find(|v| v.weight(0) > 0.0 && v.weight(1) > 0.0)
            .unwrap();
        assert!((welded.weight(0) - 0.625).abs() < 1e-5);
        assert!((welded.weight(1) - 0.375).abs() < 1e-5);
        // 0.5 * (1, 0, 0) + 0.3 * (6, 0, 0), as authored
        assert!((welded.position - Vec3::new(2.3, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_unwelded_attach_shared_across_nodes() {
        let mut model = Model::new("root");
        let root = model.root();
        let a = model.add_child(root, "a");
        let b = model.add_child(root, "b");
        let id = model.add_attach(Attach::from_basic("shared", triangle_attach(Vec3::ZERO)));
        model.set_attach(a, Some(id));
        model.set_attach(b, Some(id));

        let layout = TreeLayout::new(&model);
        let meshes = to_weighted(&model, &layout, &ConvertOptions::default()).unwrap();
        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0].root_indices, BTreeSet::from([1, 2]));
        assert!(!meshes[0].is_weighted());
    }

    #[test]
    fn test_weld_outside_tree() {
        let model = welded_model(vec![VertexWelding::new(0, vec![weld(7, 0, 1.0)])]);
        let layout = TreeLayout::new(&model);
        let err = to_weighted(&model, &layout, &ConvertOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            ModelError::WeldOutsideTree {
                node: 2,
                source_node: 7,
                node_count: 3
            }
        ));
    }

    #[test]
    fn test_weld_vertex_out_of_range() {
        let model = welded_model(vec![VertexWelding::new(0, vec![weld(1, 3, 1.0)])]);
        let layout = TreeLayout::new(&model);
        let err = to_weighted(&model, &layout, &ConvertOptions::default()).unwrap_err();
        assert!(matches!(err, ModelError::WeldVertexOutOfRange { source_node: 1, vertex: 3, .. }));

        let model = welded_model(vec![VertexWelding::new(9, vec![weld(1, 0, 1.0)])]);
        let layout = TreeLayout::new(&model);
        let err = to_weighted(&model, &layout, &ConvertOptions::default()).unwrap_err();
        assert!(matches!(err, ModelError::WeldVertexOutOfRange { node: 2, source_node: 2, vertex: 9, .. }));
    }

    fn loose_mesh(positions: &[Vec3], weights: &[[f32; 2]]) -> WeightedMesh {
        WeightedMesh {
            label: None,
            vertices: positions
                .iter()
                .zip(weights)
                .map(|(&p, w)| WeightedVertex::weighted(p, Vec3::Z, w.to_vec()))
                .collect(),
            triangle_sets: vec![(0..positions.len() as u16).map(BufferCorner::plain).collect()],
            materials: vec![BufferMaterial::default()],
            root_indices: BTreeSet::from([0]),
            depending_node_indices: BTreeSet::from([0, 1]),
            has_colors: false,
            has_normals: true,
        }
    }

    #[test]
    fn test_merge_close_vertices_is_idempotent() {
        let eps = 1e-3;
        let mut mesh = loose_mesh(
            &[
                Vec3::ZERO,
                Vec3::X,
                Vec3::Y,
                Vec3::new(0.0005, 0.0, 0.0),
                Vec3::X,
                Vec3::new(0.0, 0.0, 1.0),
            ],
            &[[1.0, 0.0]; 6],
        );
        assert_eq!(merge_close_vertices(&mut mesh, eps), 2);
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.vertices[0].position, Vec3::ZERO, "first writer wins");
        let indices: Vec<u16> = mesh.triangle_sets[0].iter().map(|c| c.vertex_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 0, 1, 3]);

        let snapshot = mesh.clone();
        assert_eq!(merge_close_vertices(&mut mesh, eps), 0);
        assert_eq!(mesh, snapshot);
    }

    #[test]
    fn test_merge_requires_equal_weights() {
        let mut mesh = loose_mesh(
            &[Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ZERO, Vec3::X, Vec3::Y],
            &[[1.0, 0.0], [1.0, 0.0], [1.0, 0.0], [0.0, 1.0], [0.0, 1.0], [0.0, 1.0]],
        );
        assert_eq!(merge_close_vertices(&mut mesh, 1e-3), 0);
        assert_eq!(mesh.vertices.len(), 6);
    }

    #[test]
    fn test_reverse_welds_blended_vertices() {
        let mut model = Model::new("root");
        let root = model.root();
        model.add_child(root, "a");
        let layout = TreeLayout::new(&model);

        let mut mesh = loose_mesh(&[Vec3::ZERO, Vec3::X, Vec3::Y], &[[1.0, 0.0], [1.0, 0.0], [0.5, 0.5]]);
        mesh.label = Some("arm".into());
        from_weighted(
            &mut model,
            &layout,
            &[mesh],
            &ConvertOptions::default(),
            &GreedyStrippifier,
        )
        .unwrap();

        let root_node = model.node(model.root());
        let attach = model.attach(root_node.attach().unwrap());
        assert_eq!(attach.label, "arm_0");
        let welding = root_node.welding().unwrap();
        assert_eq!(welding.len(), 1);
        assert_eq!(welding[0].destination_vertex, 2);
        assert_eq!(welding[0].welds[0], weld(0, 2, 0.5), "the drawing node references itself");
        assert_eq!(welding[0].welds[1], weld(1, 0, 0.5));

        let a = model.node(layout.node_id(1));
        let source = model.attach(a.attach().unwrap());
        assert_eq!(source.label, "arm_1");
        let AttachData::Basic(basic) = &source.data else {
            panic!("expected basic attach");
        };
        assert_eq!(basic.positions, vec![Vec3::Y]);
        assert!(basic.meshes.is_empty());
        assert!(a.welding().is_none());
    }

    #[test]
    fn test_drawing_slot_tie_goes_to_lower() {
        let mesh = loose_mesh(&[Vec3::ZERO, Vec3::X, Vec3::Y], &[[0.5, 0.5]; 3]);
        assert_eq!(drawing_slot(&mesh, &mesh.triangle_sets[0], 2), 0);

        let mesh = loose_mesh(&[Vec3::ZERO, Vec3::X, Vec3::Y], &[[0.4, 0.6], [0.5, 0.5], [0.5, 0.5]]);
        assert_eq!(drawing_slot(&mesh, &mesh.triangle_sets[0], 2), 1);
    }
}
