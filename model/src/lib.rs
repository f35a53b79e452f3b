//! Ninja Model - scene-graph models and bone-weighted mesh conversion
//!
//! This crate converts between a node tree whose nodes carry format-specific
//! mesh data and a canonical bone-weighted mesh representation, and re-emits
//! weighted meshes into any supported attach format.
//!
//! # Architecture
//!
//! - [`Model`] - Node arena with explicit change notification
//! - [`Attach`] - Basic, Chunk, GC or Buffer mesh data plus engine-ready [`BufferMesh`]es
//! - [`WeightedMesh`] - Canonical weighted mesh shared by every conversion
//! - [`to_weighted`] / [`from_weighted`] - The two conversion directions

pub mod attach;
pub mod config;
pub mod error;
pub mod math;
pub mod node;
pub mod strip;
pub mod weighted;

// Re-export the conversion surface
pub use attach::{
    Attach, AttachData, AttachFormat, AttachId, BufferCorner, BufferMaterial, BufferMesh, BufferVertex, Color,
};
pub use config::{BufferMode, ConvertOptions};
pub use error::{ModelError, Result};
pub use node::{Model, Node, NodeEvent, NodeId, TreeLayout, VertexWelding, Weld};
pub use strip::{GreedyStrippifier, Strippifier};
pub use weighted::{
    PolygonEncoding, WeightedMesh, WeightedVertex, from_weighted, from_weighted_with, optimize_polygons,
    optimize_vertices, to_weighted,
};
