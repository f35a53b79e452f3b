//! Shared model builders and an engine-equivalent posed triangle evaluator

#![allow(dead_code)]

use glam::{Mat4, Vec2, Vec3};
use ninja_model::attach::{BasicAttach, BasicMesh, BasicPolygon, BasicPolygonType};
use ninja_model::{
    Attach, AttachData, BufferCorner, BufferMaterial, BufferMesh, BufferVertex, Color, Model, NodeId, TreeLayout,
    WeightedMesh,
};

pub const TOLERANCE: f32 = 1e-4;

/// Vertex block writing `vertices` at consecutive slots from `offset`
pub fn vertex_block(offset: u32, continue_weight: bool, vertices: &[(Vec3, f32)]) -> BufferMesh {
    BufferMesh {
        vertex_write_offset: offset,
        ..BufferMesh::from_vertices(
            vertices
                .iter()
                .enumerate()
                .map(|(i, &(p, w))| BufferVertex::weighted(p, Vec3::Z, i as u16, w))
                .collect(),
            continue_weight,
            true,
        )
    }
}

pub fn polygons(indices: &[u16], has_colors: bool) -> BufferMesh {
    let corners = indices
        .iter()
        .map(|&i| {
            if has_colors {
                BufferCorner::new(i, Color::new(i as u8 * 30, 0, 255, 255), Vec2::ZERO)
            } else {
                BufferCorner::plain(i)
            }
        })
        .collect();
    BufferMesh::from_triangles(corners, BufferMaterial::default(), true, has_colors)
}

pub fn attach_buffer(model: &mut Model, node: NodeId, label: &str, meshes: Vec<BufferMesh>) {
    let id = model.add_attach(Attach::from_buffer(label, meshes));
    model.set_attach(node, Some(id));
}

/// Weightless buffer triangle in the xy plane
pub fn triangle_buffer() -> Vec<BufferMesh> {
    vec![
        vertex_block(0, false, &[(Vec3::ZERO, 1.0), (Vec3::X, 1.0), (Vec3::Y, 1.0)]),
        polygons(&[0, 1, 2], false),
    ]
}

/// Two-bone arm: `root -> upper -> lower`, a quad strip skinned across the elbow
///
/// Upper writes the shoulder row fully and the elbow row at half weight;
/// lower continues the elbow row, writes the wrist row and draws.
pub fn skinned_arm() -> Model {
    let mut model = Model::new("root");
    let root = model.root();
    let upper = model.add_child(root, "upper");
    let lower = model.add_child(upper, "lower");
    model.set_position(upper, Vec3::new(0.0, 1.0, 0.0));
    model.set_position(lower, Vec3::new(0.0, 2.0, 0.0));

    attach_buffer(
        &mut model,
        upper,
        "upper_mesh",
        vec![vertex_block(
            0,
            false,
            &[
                (Vec3::new(-0.5, 0.0, 0.0), 1.0),
                (Vec3::new(0.5, 0.0, 0.0), 1.0),
                (Vec3::new(-0.5, 2.0, 0.0), 0.5),
                (Vec3::new(0.5, 2.0, 0.0), 0.5),
            ],
        )],
    );
    attach_buffer(
        &mut model,
        lower,
        "arm",
        vec![
            vertex_block(2, true, &[(Vec3::new(-0.5, 0.0, 0.0), 0.5), (Vec3::new(0.5, 0.0, 0.0), 0.5)]),
            vertex_block(4, false, &[(Vec3::new(-0.5, 2.0, 0.0), 1.0), (Vec3::new(0.5, 2.0, 0.0), 1.0)]),
            polygons(&[0, 1, 2, 2, 1, 3, 2, 3, 4, 4, 3, 5], false),
        ],
    );
    model
}

/// Rigidly skinned pair: every vertex belongs to exactly one of two nodes
pub fn rigid_pair(has_colors: bool) -> Model {
    let mut model = Model::new("root");
    let root = model.root();
    let a = model.add_child(root, "a");
    let b = model.add_child(a, "b");
    model.set_position(a, Vec3::new(1.0, 0.0, 0.0));
    model.set_position(b, Vec3::new(0.0, 1.0, 0.0));

    attach_buffer(
        &mut model,
        a,
        "a_mesh",
        vec![vertex_block(0, false, &[(Vec3::ZERO, 1.0), (Vec3::X, 1.0)])],
    );
    attach_buffer(
        &mut model,
        b,
        "box",
        vec![
            vertex_block(2, false, &[(Vec3::ZERO, 1.0), (Vec3::X, 1.0)]),
            polygons(&[0, 1, 2, 2, 1, 3], has_colors),
        ],
    );
    model
}

pub fn basic_triangle(offset: Vec3) -> BasicAttach {
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

/// Move nodes away from their rest transforms
pub fn pose(model: &mut Model, rotations: &[(usize, f32)]) {
    let layout = TreeLayout::new(model);
    for &(index, angle) in rotations {
        let id = layout.node_id(index);
        let euler = model.node(id).euler();
        model.set_euler(id, euler + Vec3::new(0.0, 0.3 * angle, angle));
    }
}

fn point(matrix: Mat4, p: Vec3) -> Vec3 {
    matrix.transform_point3(p)
}

/// One drawn triangle with the render state and corner attributes it draws with
#[derive(Clone, Debug)]
pub struct Face {
    pub positions: [Vec3; 3],
    pub material: BufferMaterial,
    pub colors: [Color; 3],
    pub texcoords: [Vec2; 3],
}

impl Face {
    fn new(positions: [Vec3; 3], material: &BufferMaterial, corners: &[BufferCorner], has_colors: bool) -> Self {
        Self {
            positions,
            material: material.clone(),
            colors: [0, 1, 2].map(|i| if has_colors { corners[i].color } else { Color::WHITE }),
            texcoords: [0, 1, 2].map(|i| corners[i].texcoord),
        }
    }
}

/// World-space faces as the engine would draw the tree
///
/// Cache formats replay buffer meshes through a simulated vertex cache that
/// accumulates `world * position * weight`; basic attaches are drawn
/// directly with welded vertices rebuilt from their world-space sources.
pub fn posed_faces(model: &Model) -> Vec<Face> {
    let layout = TreeLayout::new(model);
    let mut cache = vec![Vec3::ZERO; 1 << 16];
    let mut faces = Vec::new();

    for index in 0..layout.len() {
        let node = model.node(layout.node_id(index));
        let Some(id) = node.attach() else {
            continue;
        };
        let attach = model.attach(id);
        let world = layout.world_matrix(index);

        if let AttachData::Basic(basic) = &attach.data {
            let mut posed: Vec<Vec3> = basic.positions.iter().map(|&p| point(world, p)).collect();
            for record in node.welding().unwrap_or(&[]) {
                posed[record.destination_vertex as usize] = record
                    .welds
                    .iter()
                    .map(|weld| {
                        let source = model.node(layout.node_id(weld.node_index));
                        let source_attach = model.attach(source.attach().expect("weld source has an attach"));
                        let AttachData::Basic(source_basic) = &source_attach.data else {
                            panic!("weld source is not a basic attach");
                        };
                        point(
                            layout.world_matrix(weld.node_index),
                            source_basic.positions[weld.vertex_index as usize],
                        ) * weld.weight
                    })
                    .sum();
            }
            for mesh in &basic.meshes {
                let material = basic.material(mesh.material_index);
                for t in mesh.triangle_corners().chunks_exact(3) {
                    let positions = [0, 1, 2].map(|i| posed[t[i].vertex_index as usize]);
                    faces.push(Face::new(positions, &material, t, true));
                }
            }
            continue;
        }

        for mesh in attach.mesh_data.as_deref().expect("attach is buffered") {
            for vertex in &mesh.vertices {
                let value = point(world, vertex.position) * vertex.weight;
                let slot = mesh.write_slot(vertex);
                if mesh.continue_weight {
                    cache[slot] += value;
                } else {
                    cache[slot] = value;
                }
            }
            for t in mesh.triangle_corners().chunks_exact(3) {
                let positions = [0, 1, 2].map(|i| cache[t[i].vertex_index as usize]);
                faces.push(Face::new(positions, &mesh.material, t, mesh.has_colors));
            }
        }
    }
    faces
}

/// World-space triangles as the engine would draw the tree
pub fn posed_triangles(model: &Model) -> Vec<[Vec3; 3]> {
    posed_faces(model).into_iter().map(|face| face.positions).collect()
}

/// Weighted meshes posed by linear blend skinning
///
/// Each depending node carries the root-space rest vertex along with its
/// own motion from `rest` to `posed`.
pub fn posed_weighted(rest: &Model, posed: &Model, meshes: &[WeightedMesh]) -> Vec<[Vec3; 3]> {
    let rest = TreeLayout::new(rest);
    let posed = TreeLayout::new(posed);
    let mut triangles = Vec::new();

    for mesh in meshes {
        for &root in &mesh.root_indices {
            let skin: Vec<Mat4> = mesh
                .depending()
                .iter()
                .map(|&d| {
                    posed.world_matrix(root + d) * rest.world_matrix(root + d).inverse() * rest.world_matrix(root)
                })
                .collect();
            let place = |index: u16| {
                let vertex = &mesh.vertices[index as usize];
                skin.iter()
                    .enumerate()
                    .map(|(k, m)| point(*m, vertex.position) * vertex.weight(k))
                    .sum::<Vec3>()
            };
            for t in mesh.triangle_sets.iter().flat_map(|s| s.chunks_exact(3)) {
                triangles.push([place(t[0].vertex_index), place(t[1].vertex_index), place(t[2].vertex_index)]);
            }
        }
    }
    triangles
}

fn same_triangle(a: &[Vec3; 3], b: &[Vec3; 3]) -> bool {
    (0..3).any(|r| (0..3).all(|i| a[i].distance(b[(i + r) % 3]) < TOLERANCE))
}

/// Both lists hold the same oriented triangles, in any order
pub fn assert_same_triangles(expected: &[[Vec3; 3]], actual: &[[Vec3; 3]]) {
    assert_eq!(expected.len(), actual.len(), "triangle counts differ");
    let mut unmatched: Vec<&[Vec3; 3]> = actual.iter().collect();
    for triangle in expected {
        let found = unmatched
            .iter()
            .position(|candidate| same_triangle(triangle, candidate))
            .unwrap_or_else(|| panic!("no match for triangle {triangle:?} in {unmatched:?}"));
        unmatched.swap_remove(found);
    }
}

/// Rotation of `b` that lines its corners up with `a`, if any
fn matching_rotation(a: &Face, b: &Face) -> Option<usize> {
    (0..3).find(|&r| {
        (0..3).all(|i| {
            let j = (i + r) % 3;
            a.positions[i].distance(b.positions[j]) < TOLERANCE
                && a.colors[i] == b.colors[j]
                && a.texcoords[i].distance(b.texcoords[j]) < TOLERANCE
        })
    })
}

/// Both lists hold the same faces, in any order
///
/// Faces match when their oriented corners agree on position, color and
/// texture coordinate and they draw with equal materials.
pub fn assert_same_faces(expected: &[Face], actual: &[Face]) {
    assert_eq!(expected.len(), actual.len(), "face counts differ");
    let mut unmatched: Vec<&Face> = actual.iter().collect();
    for face in expected {
        let found = unmatched
            .iter()
            .position(|candidate| candidate.material == face.material && matching_rotation(face, candidate).is_some())
            .unwrap_or_else(|| panic!("no match for face {face:?} in {unmatched:?}"));
        unmatched.swap_remove(found);
    }
}
