//! Bone-weighted mesh conversion
//!
//! [`to_weighted`] lifts every attach of a tree into [`WeightedMesh`]es and
//! [`from_weighted`] emits them back into one attach format. Formats with a
//! hardware vertex cache (buffer, chunk, GC) share the
//! [`offsetable`] framework; the basic format emulates weights through
//! welding.

mod basic;
mod buffer;
mod buffered;
mod chunk;
mod gc;
mod mesh;
pub mod offsetable;
pub mod offsets;
mod optimize;

use std::borrow::Cow;

use tracing::{debug, info};

pub use buffer::{BufferConverter, BufferPart};
pub use chunk::ChunkConverter;
pub use gc::GcConverter;
pub use mesh::{MAX_VERTICES, WeightedMesh, WeightedVertex};
pub use offsetable::OffsetableAttachConverter;
pub use offsets::{Fragment, VertexOffset, plan_vertex_offsets};
pub use optimize::{EncodingCosts, PolygonEncoding, encoded_size, measure_encodings, optimize_polygons, optimize_vertices};

use crate::attach::{AttachFormat, BufferMesh};
use crate::config::{BufferMode, ConvertOptions};
use crate::error::{ModelError, Result};
use crate::node::{Model, TreeLayout};
use crate::strip::{GreedyStrippifier, Strippifier};

/// The single attach format used throughout the tree, if any node has an attach
fn tree_format(model: &Model, layout: &TreeLayout) -> Result<Option<AttachFormat>> {
    let mut format = None;
    for index in 0..layout.len() {
        let Some(id) = model.node(layout.node_id(index)).attach() else {
            continue;
        };
        let found = model.attach(id).format();
        match format {
            None => format = Some(found),
            Some(expected) if expected != found => {
                return Err(ModelError::InconsistentFormats { expected, found });
            }
            Some(_) => {}
        }
    }
    Ok(format)
}

/// Buffer meshes of every node's attach, indexed by traversal index
fn node_buffers<'m>(
    model: &'m Model,
    layout: &TreeLayout,
    options: &ConvertOptions,
) -> Result<Vec<Option<Cow<'m, [BufferMesh]>>>> {
    (0..layout.len())
        .map(|index| {
            let Some(id) = model.node(layout.node_id(index)).attach() else {
                return Ok(None);
            };
            let attach = model.attach(id);
            if let Some(meshes) = &attach.mesh_data {
                return Ok(Some(Cow::Borrowed(meshes.as_slice())));
            }
            match options.buffer_mode {
                BufferMode::Generate => match attach.build_buffer() {
                    Some(meshes) => Ok(Some(Cow::Owned(meshes))),
                    None => Err(ModelError::Unbuffered(attach.label.clone())),
                },
                BufferMode::UseExisting => Err(ModelError::Unbuffered(attach.label.clone())),
            }
        })
        .collect()
}

/// Lift every attach of the tree into weighted meshes
///
/// Attaches that are shared by several nodes come back as one mesh with
/// several roots.
pub fn to_weighted(model: &Model, options: &ConvertOptions) -> Result<Vec<WeightedMesh>> {
    let layout = TreeLayout::new(model);
    let meshes = match tree_format(model, &layout)? {
        None => Vec::new(),
        Some(AttachFormat::Basic) => basic::to_weighted(model, &layout, options)?,
        Some(format) => {
            debug!(?format, "lifting buffered attaches");
            let buffers = node_buffers(model, &layout, options)?;
            buffered::convert(model, &layout, options, &buffers)?
        }
    };

    info!(
        meshes = meshes.len(),
        weighted = meshes.iter().filter(|m| m.is_weighted()).count(),
        "converted tree to weighted meshes"
    );
    Ok(meshes)
}

/// Replace the tree's attaches with `meshes` emitted in `format`
pub fn from_weighted(
    model: &mut Model,
    meshes: &[WeightedMesh],
    format: AttachFormat,
    options: &ConvertOptions,
) -> Result<()> {
    from_weighted_with(model, meshes, format, options, &GreedyStrippifier)
}

/// [`from_weighted`] with a caller-supplied strip builder
pub fn from_weighted_with(
    model: &mut Model,
    meshes: &[WeightedMesh],
    format: AttachFormat,
    options: &ConvertOptions,
    strippifier: &dyn Strippifier,
) -> Result<()> {
    let meshes: Cow<'_, [WeightedMesh]> = if options.optimize_vertices {
        let mut owned = meshes.to_vec();
        let merged: usize = owned.iter_mut().map(optimize_vertices).sum();
        debug!(merged, "merged identical vertices before emitting");
        Cow::Owned(owned)
    } else {
        Cow::Borrowed(meshes)
    };

    let layout = TreeLayout::new(model);
    model.clear_attaches();

    match format {
        AttachFormat::Buffer => {
            offsetable::convert(model, &layout, &meshes, &BufferConverter::new(options, strippifier))
        }
        AttachFormat::Chunk => offsetable::convert(model, &layout, &meshes, &ChunkConverter::new(strippifier)),
        AttachFormat::Gc => offsetable::convert(model, &layout, &meshes, &GcConverter::new(strippifier)),
        AttachFormat::Basic => basic::from_weighted(model, &layout, &meshes, options, strippifier),
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::attach::{Attach, BasicAttach, BufferCorner, BufferMaterial, BufferVertex};

    fn triangle_buffer() -> Vec<BufferMesh> {
        vec![
            BufferMesh::from_vertices(
                vec![
                    BufferVertex::new(Vec3::ZERO, Vec3::Z, 0),
                    BufferVertex::new(Vec3::X, Vec3::Z, 1),
                    BufferVertex::new(Vec3::Y, Vec3::Z, 2),
                ],
                false,
                true,
            ),
            BufferMesh::from_triangles(
                vec![BufferCorner::plain(0), BufferCorner::plain(1), BufferCorner::plain(2)],
                BufferMaterial::default(),
                true,
                false,
            ),
        ]
    }

    #[test]
    fn test_mixed_formats_rejected() {
        let mut model = Model::new("root");
        let root = model.root();
        let a = model.add_child(root, "a");
        let buffer = model.add_attach(Attach::from_buffer("buffer", triangle_buffer()));
        let basic = model.add_attach(Attach::from_basic("basic", BasicAttach::default()));
        model.set_attach(root, Some(buffer));
        model.set_attach(a, Some(basic));

        let err = to_weighted(&model, &ConvertOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            ModelError::InconsistentFormats {
                expected: AttachFormat::Buffer,
                found: AttachFormat::Basic
            }
        ));
    }

    #[test]
    fn test_unbuffered_attach() {
        let mut model = Model::new("root");
        let root = model.root();
        let mut attach = Attach::from_buffer("chunky", triangle_buffer());
        attach.data = crate::attach::AttachData::Chunk(Default::default());
        attach.mesh_data = None;
        let id = model.add_attach(attach);
        model.set_attach(root, Some(id));

        let err = to_weighted(&model, &ConvertOptions::default()).unwrap_err();
        assert!(matches!(err, ModelError::Unbuffered(ref label) if label == "chunky"));

        let options = ConvertOptions {
            buffer_mode: BufferMode::Generate,
            ..Default::default()
        };
        assert!(to_weighted(&model, &options).unwrap().is_empty(), "empty chunk data draws nothing");
    }

    #[test]
    fn test_from_weighted_replaces_attaches() {
        let mut model = Model::new("root");
        let root = model.root();
        let id = model.add_attach(Attach::from_buffer("tri", triangle_buffer()));
        model.set_attach(root, Some(id));

        let options = ConvertOptions::default();
        let meshes = to_weighted(&model, &options).unwrap();
        assert_eq!(meshes.len(), 1);

        from_weighted(&mut model, &meshes, AttachFormat::Gc, &options).unwrap();
        assert_eq!(model.attaches().len(), 1);
        let attach = model.node_attach(root).unwrap();
        assert_eq!(attach.format(), AttachFormat::Gc);
        assert_eq!(attach.label, "tri");
        assert!(attach.is_buffered());
    }
}
