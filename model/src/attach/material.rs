//! Render-state materials shared by every attach format

use serde::{Deserialize, Serialize};

/// 8-bit RGBA color
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Self = Self::new(0xFF, 0xFF, 0xFF, 0xFF);
    pub const BLACK: Self = Self::new(0, 0, 0, 0xFF);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

/// Alpha blend factor
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendMode {
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    #[default]
    SrcAlpha,
    InvSrcAlpha,
    DstAlpha,
    InvDstAlpha,
}

/// Texture sampling mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterMode {
    PointSampled,
    #[default]
    Bilinear,
    Trilinear,
}

bitflags::bitflags! {
    /// Material render attributes
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MaterialAttributes: u16 {
        const USE_TEXTURE = 1 << 0;
        const USE_ALPHA = 1 << 1;
        const NO_LIGHTING = 1 << 2;
        const FLAT_SHADING = 1 << 3;
        /// Backface culling disabled
        const DOUBLE_SIDED = 1 << 4;
        const ENVIRONMENT_MAP = 1 << 5;
        const NO_SPECULAR = 1 << 6;
        const NO_AMBIENT = 1 << 7;
        const CLAMP_U = 1 << 8;
        const CLAMP_V = 1 << 9;
        const MIRROR_U = 1 << 10;
        const MIRROR_V = 1 << 11;
    }
}

/// Engine-ready material (render state only)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BufferMaterial {
    pub diffuse: Color,
    pub specular: Color,
    pub specular_exponent: f32,
    pub ambient: Color,
    pub texture_index: u32,
    pub texture_filtering: FilterMode,
    pub mipmap_distance_multiplier: f32,
    pub source_blend: BlendMode,
    pub destination_blend: BlendMode,
    pub attributes: MaterialAttributes,
}

impl Default for BufferMaterial {
    fn default() -> Self {
        Self {
            diffuse: Color::WHITE,
            specular: Color::WHITE,
            specular_exponent: 11.0,
            ambient: Color::BLACK,
            texture_index: 0,
            texture_filtering: FilterMode::Bilinear,
            mipmap_distance_multiplier: 1.0,
            source_blend: BlendMode::SrcAlpha,
            destination_blend: BlendMode::InvSrcAlpha,
            attributes: MaterialAttributes::USE_TEXTURE,
        }
    }
}

impl BufferMaterial {
    #[inline]
    pub fn use_texture(&self) -> bool {
        self.attributes.contains(MaterialAttributes::USE_TEXTURE)
    }

    #[inline]
    pub fn use_alpha(&self) -> bool {
        self.attributes.contains(MaterialAttributes::USE_ALPHA)
    }
}
