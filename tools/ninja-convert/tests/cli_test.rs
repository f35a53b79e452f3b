//! Integration tests for ninja-convert
//!
//! Writes model documents to a temp dir, runs the binary on them and checks
//! the documents it writes back.

use std::path::Path;
use std::process::{Command, Output};

use glam::Vec3;
use ninja_model::attach::{BasicAttach, BasicMesh, BasicPolygon, BasicPolygonType};
use ninja_model::{
    Attach, AttachFormat, BufferCorner, BufferMaterial, BufferMesh, BufferVertex, Model, TreeLayout,
};
use tempfile::tempdir;

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ninja-convert"))
        .args(args)
        .output()
        .expect("Failed to run ninja-convert")
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("temp path is utf-8")
}

fn write_model(model: &Model, path: &Path) {
    std::fs::write(path, serde_json::to_string(model).unwrap()).expect("Failed to write model");
}

fn read_model(path: &Path) -> Model {
    let text = std::fs::read_to_string(path).expect("Failed to read model");
    serde_json::from_str(&text).expect("Output is not a model document")
}

// root -> bone -> tip; tip draws a quad whose near edge is shared with bone
fn skinned_model() -> Model {
    let mut model = Model::new("root");
    let root = model.root();
    let bone = model.add_child(root, "bone");
    let tip = model.add_child(bone, "tip");
    model.set_position(tip, Vec3::new(0.0, 1.0, 0.0));

    let near = BufferMesh::from_vertices(
        vec![
            BufferVertex::weighted(Vec3::ZERO, Vec3::Z, 0, 0.5),
            BufferVertex::weighted(Vec3::X, Vec3::Z, 1, 0.5),
        ],
        false,
        true,
    );
    let id = model.add_attach(Attach::from_buffer("bone_mesh", vec![near]));
    model.set_attach(bone, Some(id));

    let far = BufferMesh {
        vertex_write_offset: 2,
        ..BufferMesh::from_vertices(
            vec![
                BufferVertex::weighted(Vec3::Y, Vec3::Z, 0, 1.0),
                BufferVertex::weighted(Vec3::ONE.with_z(0.0), Vec3::Z, 1, 1.0),
            ],
            false,
            true,
        )
    };
    let corners = [0, 1, 2, 2, 1, 3].map(BufferCorner::plain).to_vec();
    let meshes = vec![
        BufferMesh::from_vertices(
            vec![
                BufferVertex::weighted(Vec3::new(0.0, -1.0, 0.0), Vec3::Z, 0, 0.5),
                BufferVertex::weighted(Vec3::new(1.0, -1.0, 0.0), Vec3::Z, 1, 0.5),
            ],
            true,
            true,
        ),
        far,
        BufferMesh::from_triangles(corners, BufferMaterial::default(), true, false),
    ];
    let id = model.add_attach(Attach::from_buffer("quad", meshes));
    model.set_attach(tip, Some(id));
    model
}

fn basic_model() -> Model {
    let mut model = Model::new("root");
    let root = model.root();
    let basic = BasicAttach {
        positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
        normals: vec![Vec3::Z; 3],
        meshes: vec![BasicMesh {
            material_index: 0,
            polygon_type: BasicPolygonType::Triangles,
            polygons: vec![BasicPolygon::new(vec![0, 1, 2])],
            colors: None,
            texcoords: None,
        }],
        materials: vec![BufferMaterial::default()],
    };
    let id = model.add_attach(Attach::from_basic("tri", basic));
    model.set_attach(root, Some(id));
    model
}

#[test]
fn test_convert_to_each_format() {
    let dir = tempdir().expect("Failed to create temp dir");
    let input = dir.path().join("arm.json");
    write_model(&skinned_model(), &input);

    for (name, format) in [
        ("chunk", AttachFormat::Chunk),
        ("gc", AttachFormat::Gc),
        ("basic", AttachFormat::Basic),
        ("buffer", AttachFormat::Buffer),
    ] {
        let output = dir.path().join(format!("arm_{name}.json"));
        let result = run(&["convert", path_str(&input), "--format", name, "-o", path_str(&output)]);
        assert!(result.status.success(), "convert to {name} failed: {}", String::from_utf8_lossy(&result.stderr));

        let model = read_model(&output);
        assert!(!model.attaches().is_empty());
        assert!(model.attaches().iter().all(|a| a.format() == format));

        let layout = TreeLayout::new(&model);
        assert!(model.node_attach(layout.node_id(2)).is_some(), "the drawing node keeps an attach");
    }
}

#[test]
fn test_convert_default_output_path() {
    let dir = tempdir().expect("Failed to create temp dir");
    let input = dir.path().join("arm.json");
    write_model(&skinned_model(), &input);

    let result = run(&["convert", path_str(&input), "-f", "gc"]);
    assert!(result.status.success());
    assert!(dir.path().join("arm.gc.json").exists());
}

#[test]
fn test_convert_with_options_file() {
    let dir = tempdir().expect("Failed to create temp dir");
    let input = dir.path().join("arm.json");
    let options = dir.path().join("options.toml");
    let output = dir.path().join("out.json");
    write_model(&skinned_model(), &input);
    std::fs::write(&options, "optimize_polygons = false\noptimize_vertices = false\n").unwrap();

    let result = run(&[
        "convert",
        path_str(&input),
        "--format",
        "buffer",
        "--options",
        path_str(&options),
        "-o",
        path_str(&output),
    ]);
    assert!(result.status.success());
    assert!(read_model(&output).attaches().iter().all(|a| a.is_buffered()));
}

#[test]
fn test_rejects_unknown_format_and_bad_options() {
    let dir = tempdir().expect("Failed to create temp dir");
    let input = dir.path().join("arm.json");
    write_model(&skinned_model(), &input);

    let result = run(&["convert", path_str(&input), "--format", "strips"]);
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("Unknown attach format"));

    let options = dir.path().join("bad.toml");
    std::fs::write(&options, "buffer_mode = \"sometimes\"\n").unwrap();
    let result = run(&["convert", path_str(&input), "--format", "gc", "--options", path_str(&options)]);
    assert!(!result.status.success());
}

#[test]
fn test_inspect_lists_weighted_meshes() {
    let dir = tempdir().expect("Failed to create temp dir");
    let input = dir.path().join("arm.json");
    write_model(&skinned_model(), &input);

    let result = run(&["inspect", path_str(&input)]);
    assert!(result.status.success());
    let stdout = String::from_utf8_lossy(&result.stdout);
    assert!(stdout.contains("1 weighted mesh(es)"), "unexpected output: {stdout}");
    assert!(stdout.contains("quad: roots {1}, depending [0, 1], 4 vertices, 2 triangles, weighted"));
}

#[test]
fn test_buffer_generates_mesh_data() {
    let dir = tempdir().expect("Failed to create temp dir");
    let input = dir.path().join("tri.json");
    let output = dir.path().join("tri_buffered.json");
    write_model(&basic_model(), &input);
    assert!(!read_model(&input).attaches()[0].is_buffered());

    let result = run(&["buffer", path_str(&input), "-o", path_str(&output)]);
    assert!(result.status.success());
    let model = read_model(&output);
    let meshes = model.attaches()[0].mesh_data.as_deref().expect("attach is buffered");
    assert!(meshes.iter().any(BufferMesh::has_polygons));
}

#[test]
fn test_missing_input_fails() {
    let dir = tempdir().expect("Failed to create temp dir");
    let result = run(&["inspect", path_str(&dir.path().join("missing.json"))]);
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("Failed to read"));
}
