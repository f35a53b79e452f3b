//! Chunk attach format
//!
//! Vertex chunks write into the shared vertex cache; poly chunks form a small
//! state machine where material and texture chunks change the render state
//! used by every strip chunk after them.
//!
//! # Vertex chunk addressing
//! ```text
//! Position / Normal:  slot = index_offset + position in chunk
//! NormalWeighted:     slot = index_offset + vertex.index
//! ```
//! Weighted chunks carry a [`WeightStatus`]: `Start` overwrites the slot,
//! `Middle` and `End` add onto it.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::buffer::{BufferCorner, BufferMesh, BufferVertex};
use super::material::{BlendMode, BufferMaterial, Color, FilterMode, MaterialAttributes};
use crate::strip::decode_strip;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkVertexKind {
    Position,
    Normal,
    NormalWeighted,
}

/// Accumulation state of a weighted vertex chunk
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightStatus {
    Start,
    Middle,
    End,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkVertex {
    pub position: Vec3,
    pub normal: Vec3,
    /// Slot relative to the chunk offset (weighted chunks only)
    pub index: u16,
    pub weight: f32,
}

impl ChunkVertex {
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Self {
            position,
            normal,
            index: 0,
            weight: 1.0,
        }
    }

    pub fn weighted(position: Vec3, normal: Vec3, index: u16, weight: f32) -> Self {
        Self {
            position,
            normal,
            index,
            weight,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VertexChunk {
    pub kind: ChunkVertexKind,
    pub weight_status: WeightStatus,
    pub index_offset: u16,
    pub vertices: Vec<ChunkVertex>,
}

impl VertexChunk {
    /// Cache slot written by the vertex at `position` in this chunk
    pub fn slot(&self, position: usize) -> usize {
        let relative = match self.kind {
            ChunkVertexKind::NormalWeighted => self.vertices[position].index as usize,
            ChunkVertexKind::Position | ChunkVertexKind::Normal => position,
        };
        self.index_offset as usize + relative
    }

    fn to_buffer(&self) -> BufferMesh {
        let vertices = self
            .vertices
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let normal = match self.kind {
                    ChunkVertexKind::Position => Vec3::Y,
                    _ => v.normal,
                };
                let weight = match self.kind {
                    ChunkVertexKind::NormalWeighted => v.weight,
                    _ => 1.0,
                };
                BufferVertex::weighted(v.position, normal, (self.slot(i) - self.index_offset as usize) as u16, weight)
            })
            .collect();

        BufferMesh {
            vertex_write_offset: self.index_offset as u32,
            ..BufferMesh::from_vertices(
                vertices,
                self.weight_status != WeightStatus::Start,
                self.kind != ChunkVertexKind::Position,
            )
        }
    }
}

/// Lighting colors and blending
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterialChunk {
    pub diffuse: Option<Color>,
    pub ambient: Option<Color>,
    pub specular: Option<Color>,
    pub specular_exponent: u8,
    pub source_blend: BlendMode,
    pub destination_blend: BlendMode,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextureChunk {
    pub texture_index: u16,
    pub filter: FilterMode,
    pub mipmap_distance_multiplier: f32,
    pub clamp_u: bool,
    pub clamp_v: bool,
    pub mirror_u: bool,
    pub mirror_v: bool,
}

bitflags::bitflags! {
    /// Per-strip render flags
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct StripAttributes: u8 {
        const IGNORE_LIGHT = 1 << 0;
        const IGNORE_SPECULAR = 1 << 1;
        const IGNORE_AMBIENT = 1 << 2;
        const USE_ALPHA = 1 << 3;
        const DOUBLE_SIDE = 1 << 4;
        const FLAT_SHADING = 1 << 5;
        const ENVIRONMENT_MAPPING = 1 << 6;
    }
}

const STRIP_FLAG_MAP: [(StripAttributes, MaterialAttributes); 7] = [
    (StripAttributes::IGNORE_LIGHT, MaterialAttributes::NO_LIGHTING),
    (StripAttributes::IGNORE_SPECULAR, MaterialAttributes::NO_SPECULAR),
    (StripAttributes::IGNORE_AMBIENT, MaterialAttributes::NO_AMBIENT),
    (StripAttributes::USE_ALPHA, MaterialAttributes::USE_ALPHA),
    (StripAttributes::DOUBLE_SIDE, MaterialAttributes::DOUBLE_SIDED),
    (StripAttributes::FLAT_SHADING, MaterialAttributes::FLAT_SHADING),
    (StripAttributes::ENVIRONMENT_MAPPING, MaterialAttributes::ENVIRONMENT_MAP),
];

impl StripAttributes {
    pub fn from_material(attributes: MaterialAttributes) -> Self {
        STRIP_FLAG_MAP
            .iter()
            .filter(|(_, m)| attributes.contains(*m))
            .fold(Self::empty(), |acc, (s, _)| acc | *s)
    }

    fn apply(self, attributes: &mut MaterialAttributes) {
        for (s, m) in STRIP_FLAG_MAP {
            attributes.set(m, self.contains(s));
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkCorner {
    pub index: u16,
    pub texcoord: Vec2,
    pub color: Color,
}

impl ChunkCorner {
    pub fn from_buffer(corner: &BufferCorner) -> Self {
        Self {
            index: corner.vertex_index,
            texcoord: corner.texcoord,
            color: corner.color,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkStrip {
    pub reversed: bool,
    pub corners: Vec<ChunkCorner>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StripChunk {
    pub attributes: StripAttributes,
    pub has_uvs: bool,
    pub has_colors: bool,
    pub strips: Vec<ChunkStrip>,
}

impl StripChunk {
    fn triangle_corners(&self) -> Vec<BufferCorner> {
        let mut triangles = Vec::new();
        for strip in &self.strips {
            let corners: Vec<BufferCorner> = strip
                .corners
                .iter()
                .map(|c| {
                    BufferCorner::new(
                        c.index,
                        if self.has_colors { c.color } else { Color::WHITE },
                        if self.has_uvs { c.texcoord } else { Vec2::ZERO },
                    )
                })
                .collect();
            triangles.extend(decode_strip(&corners, strip.reversed, |a, b| {
                a.vertex_index == b.vertex_index
            }));
        }
        triangles
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PolyChunk {
    Material(MaterialChunk),
    Texture(TextureChunk),
    Strip(StripChunk),
}

impl PolyChunk {
    /// Material and texture chunks that put `material` into effect
    pub fn for_material(material: &BufferMaterial) -> [PolyChunk; 2] {
        let attributes = material.attributes;
        [
            PolyChunk::Material(MaterialChunk {
                diffuse: Some(material.diffuse),
                ambient: Some(material.ambient),
                specular: Some(material.specular),
                specular_exponent: material.specular_exponent.round().clamp(0.0, 255.0) as u8,
                source_blend: material.source_blend,
                destination_blend: material.destination_blend,
            }),
            PolyChunk::Texture(TextureChunk {
                texture_index: material.texture_index as u16,
                filter: material.texture_filtering,
                mipmap_distance_multiplier: material.mipmap_distance_multiplier,
                clamp_u: attributes.contains(MaterialAttributes::CLAMP_U),
                clamp_v: attributes.contains(MaterialAttributes::CLAMP_V),
                mirror_u: attributes.contains(MaterialAttributes::MIRROR_U),
                mirror_v: attributes.contains(MaterialAttributes::MIRROR_V),
            }),
        ]
    }
}

/// Chunk attach payload
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkAttach {
    pub vertex_chunks: Vec<VertexChunk>,
    pub poly_chunks: Vec<PolyChunk>,
}

impl ChunkAttach {
    /// Buffer meshes: every vertex chunk, then one polygon block per strip chunk
    pub fn to_buffer(&self) -> Vec<BufferMesh> {
        let has_normals = self
            .vertex_chunks
            .iter()
            .any(|c| c.kind != ChunkVertexKind::Position);
        let mut meshes: Vec<BufferMesh> = self.vertex_chunks.iter().map(VertexChunk::to_buffer).collect();

        let mut material = BufferMaterial::default();
        for chunk in &self.poly_chunks {
            match chunk {
                PolyChunk::Material(m) => {
                    if let Some(diffuse) = m.diffuse {
                        material.diffuse = diffuse;
                    }
                    if let Some(ambient) = m.ambient {
                        material.ambient = ambient;
                    }
                    if let Some(specular) = m.specular {
                        material.specular = specular;
                        material.specular_exponent = m.specular_exponent as f32;
                    }
                    material.source_blend = m.source_blend;
                    material.destination_blend = m.destination_blend;
                }
                PolyChunk::Texture(t) => {
                    material.texture_index = t.texture_index as u32;
                    material.texture_filtering = t.filter;
                    material.mipmap_distance_multiplier = t.mipmap_distance_multiplier;
                    material.attributes.set(MaterialAttributes::CLAMP_U, t.clamp_u);
                    material.attributes.set(MaterialAttributes::CLAMP_V, t.clamp_v);
                    material.attributes.set(MaterialAttributes::MIRROR_U, t.mirror_u);
                    material.attributes.set(MaterialAttributes::MIRROR_V, t.mirror_v);
                }
                PolyChunk::Strip(strip) => {
                    strip.attributes.apply(&mut material.attributes);
                    material.attributes.set(MaterialAttributes::USE_TEXTURE, strip.has_uvs);

                    let corners = strip.triangle_corners();
                    if corners.is_empty() {
                        continue;
                    }
                    meshes.push(BufferMesh::from_triangles(
                        corners,
                        material.clone(),
                        has_normals,
                        strip.has_colors,
                    ));
                }
            }
        }

        meshes
    }
}
