//! Conversion options
//!
//! Options are plain data so tools can keep them in a TOML file next to the
//! models they convert:
//!
//! ```toml
//! buffer_mode = "generate"
//! optimize_polygons = true
//! weld_epsilon = 0.0001
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How [`to_weighted`](crate::weighted::to_weighted) treats attaches without buffer data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferMode {
    /// Attaches must already carry buffer meshes
    #[default]
    UseExisting,
    /// Buffer meshes are generated from the format data before conversion
    Generate,
}

/// Options shared by both conversion directions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    pub buffer_mode: BufferMode,
    /// Pick the smallest polygon encoding for every emitted buffer mesh
    pub optimize_polygons: bool,
    /// Merge bit-identical weighted vertices before emitting attaches
    pub optimize_vertices: bool,
    /// Distance under which welded vertices are considered identical
    pub weld_epsilon: f32,
    /// Tolerance before accumulated weights are renormalized
    pub weight_epsilon: f32,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            buffer_mode: BufferMode::UseExisting,
            optimize_polygons: true,
            optimize_vertices: true,
            weld_epsilon: 1e-4,
            weight_epsilon: 1e-5,
        }
    }
}

impl ConvertOptions {
    /// Parse options from TOML text; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
