//! GC attach format
//!
//! Positions and normals live in weighted vertex blocks that write into the
//! shared cache; colors and texture coordinates are separate arrays indexed
//! independently by each polygon corner. Meshes carry parameter lists that
//! update the render state for themselves and every mesh after them, first
//! across the opaque list, then the transparent list.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::buffer::{BufferCorner, BufferMesh, BufferVertex};
use super::material::{BlendMode, BufferMaterial, Color, FilterMode, MaterialAttributes};
use crate::strip::decode_strip;

/// Block of vertices written into the cache at `cache_offset + vertex.index`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GcVertexBlock {
    pub cache_offset: u16,
    pub continue_weight: bool,
    pub vertices: Vec<BufferVertex>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GcPolygonType {
    Triangles,
    TriangleStrip,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GcCorner {
    /// Cache slot holding position and normal
    pub position_index: u16,
    pub color_index: u16,
    pub texcoord_index: u16,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GcPolygon {
    pub kind: GcPolygonType,
    pub corners: Vec<GcCorner>,
}

/// Texture wrap bits carried by a texture parameter
const WRAP_FLAGS: MaterialAttributes = MaterialAttributes::CLAMP_U
    .union(MaterialAttributes::CLAMP_V)
    .union(MaterialAttributes::MIRROR_U)
    .union(MaterialAttributes::MIRROR_V);

/// Render state change
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GcParameter {
    Lighting {
        enabled: bool,
        flat: bool,
        ambient: bool,
    },
    BlendAlpha {
        enabled: bool,
        source: BlendMode,
        destination: BlendMode,
    },
    AmbientColor(Color),
    DiffuseColor(Color),
    Specular {
        enabled: bool,
        color: Color,
        exponent: f32,
    },
    Texture {
        texture_index: u16,
        filter: FilterMode,
        mipmap_distance_multiplier: f32,
        wrap: MaterialAttributes,
    },
    NoTexture,
    Culling {
        double_sided: bool,
    },
    EnvironmentMap(bool),
}

impl GcParameter {
    /// Full parameter set putting `material` into effect
    pub fn for_material(material: &BufferMaterial) -> Vec<GcParameter> {
        let a = material.attributes;
        let mut parameters = vec![
            GcParameter::Lighting {
                enabled: !a.contains(MaterialAttributes::NO_LIGHTING),
                flat: a.contains(MaterialAttributes::FLAT_SHADING),
                ambient: !a.contains(MaterialAttributes::NO_AMBIENT),
            },
            GcParameter::BlendAlpha {
                enabled: a.contains(MaterialAttributes::USE_ALPHA),
                source: material.source_blend,
                destination: material.destination_blend,
            },
            GcParameter::AmbientColor(material.ambient),
            GcParameter::DiffuseColor(material.diffuse),
            GcParameter::Specular {
                enabled: !a.contains(MaterialAttributes::NO_SPECULAR),
                color: material.specular,
                exponent: material.specular_exponent,
            },
            GcParameter::Culling {
                double_sided: a.contains(MaterialAttributes::DOUBLE_SIDED),
            },
            GcParameter::EnvironmentMap(a.contains(MaterialAttributes::ENVIRONMENT_MAP)),
        ];
        parameters.push(GcParameter::Texture {
            texture_index: material.texture_index as u16,
            filter: material.texture_filtering,
            mipmap_distance_multiplier: material.mipmap_distance_multiplier,
            wrap: a & WRAP_FLAGS,
        });
        if !material.use_texture() {
            parameters.push(GcParameter::NoTexture);
        }
        parameters
    }

    fn apply(&self, material: &mut BufferMaterial) {
        let a = &mut material.attributes;
        match self {
            GcParameter::Lighting {
                enabled,
                flat,
                ambient,
            } => {
                a.set(MaterialAttributes::NO_LIGHTING, !enabled);
                a.set(MaterialAttributes::FLAT_SHADING, *flat);
                a.set(MaterialAttributes::NO_AMBIENT, !ambient);
            }
            GcParameter::BlendAlpha {
                enabled,
                source,
                destination,
            } => {
                a.set(MaterialAttributes::USE_ALPHA, *enabled);
                material.source_blend = *source;
                material.destination_blend = *destination;
            }
            GcParameter::AmbientColor(color) => material.ambient = *color,
            GcParameter::DiffuseColor(color) => material.diffuse = *color,
            GcParameter::Specular {
                enabled,
                color,
                exponent,
            } => {
                a.set(MaterialAttributes::NO_SPECULAR, !enabled);
                material.specular = *color;
                material.specular_exponent = *exponent;
            }
            GcParameter::Texture {
                texture_index,
                filter,
                mipmap_distance_multiplier,
                wrap,
            } => {
                a.insert(MaterialAttributes::USE_TEXTURE);
                a.remove(WRAP_FLAGS);
                a.insert(*wrap & WRAP_FLAGS);
                material.texture_index = *texture_index as u32;
                material.texture_filtering = *filter;
                material.mipmap_distance_multiplier = *mipmap_distance_multiplier;
            }
            GcParameter::NoTexture => a.remove(MaterialAttributes::USE_TEXTURE),
            GcParameter::Culling { double_sided } => {
                a.set(MaterialAttributes::DOUBLE_SIDED, *double_sided)
            }
            GcParameter::EnvironmentMap(enabled) => {
                a.set(MaterialAttributes::ENVIRONMENT_MAP, *enabled)
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GcMesh {
    pub parameters: Vec<GcParameter>,
    /// Corners index the color array; otherwise they draw white
    #[serde(default)]
    pub vertex_colors: bool,
    pub polygons: Vec<GcPolygon>,
}

/// GC attach payload
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GcAttach {
    pub vertex_blocks: Vec<GcVertexBlock>,
    pub colors: Vec<Color>,
    pub texcoords: Vec<Vec2>,
    pub opaque_meshes: Vec<GcMesh>,
    pub transparent_meshes: Vec<GcMesh>,
}

impl GcAttach {
    fn corner(&self, corner: &GcCorner, vertex_colors: bool) -> BufferCorner {
        let color = if vertex_colors {
            self.colors.get(corner.color_index as usize).copied()
        } else {
            None
        };
        BufferCorner::new(
            corner.position_index,
            color.unwrap_or(Color::WHITE),
            self.texcoords
                .get(corner.texcoord_index as usize)
                .copied()
                .unwrap_or(Vec2::ZERO),
        )
    }

    /// Buffer meshes: every vertex block, then one polygon block per mesh
    pub fn to_buffer(&self) -> Vec<BufferMesh> {
        let mut meshes: Vec<BufferMesh> = self
            .vertex_blocks
            .iter()
            .map(|block| BufferMesh {
                vertex_write_offset: block.cache_offset as u32,
                ..BufferMesh::from_vertices(block.vertices.clone(), block.continue_weight, true)
            })
            .collect();

        let mut material = BufferMaterial::default();
        for mesh in self.opaque_meshes.iter().chain(&self.transparent_meshes) {
            for parameter in &mesh.parameters {
                parameter.apply(&mut material);
            }

            let mut corners = Vec::new();
            for polygon in &mesh.polygons {
                let resolved: Vec<BufferCorner> = polygon
                    .corners
                    .iter()
                    .map(|c| self.corner(c, mesh.vertex_colors))
                    .collect();
                match polygon.kind {
                    GcPolygonType::Triangles => {
                        let whole = resolved.len() - resolved.len() % 3;
                        corners.extend_from_slice(&resolved[..whole]);
                    }
                    GcPolygonType::TriangleStrip => corners.extend(decode_strip(&resolved, false, |a, b| {
                        a.vertex_index == b.vertex_index
                    })),
                }
            }
            if corners.is_empty() {
                continue;
            }
            meshes.push(BufferMesh::from_triangles(corners, material.clone(), true, mesh.vertex_colors));
        }

        meshes
    }
}
