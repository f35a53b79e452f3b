//! Error type for model conversion
//!
//! Every variant is a fail-fast condition: either the caller handed in a model
//! that violates a conversion precondition, or the data itself is corrupt.
//! Degenerate geometry is never reported here; it is dropped during conversion.

use crate::attach::AttachFormat;

/// Errors raised by tree analysis, weighted conversion and option parsing.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// An attach has no buffer mesh data and buffering was not requested
    #[error("attach \"{0}\" has no buffered mesh data (buffer the model first)")]
    Unbuffered(String),

    /// Two attaches inside one tree use different formats
    #[error("model mixes attach formats: {expected:?} and {found:?}")]
    InconsistentFormats {
        expected: AttachFormat,
        found: AttachFormat,
    },

    /// A weld references a node index past the end of the tree
    #[error("welding on node {node} references node {source_node}, but the tree has {node_count} nodes")]
    WeldOutsideTree {
        node: usize,
        source_node: usize,
        node_count: usize,
    },

    /// A weld references a vertex the node does not have
    #[error("welding on node {node} references vertex {vertex} of node {source_node}, which has {vertex_count} vertices")]
    WeldVertexOutOfRange {
        node: usize,
        source_node: usize,
        vertex: u32,
        vertex_count: usize,
    },

    /// A transform could not be inverted (zero scale)
    #[error("node \"{0}\" has a degenerate transform that cannot be inverted")]
    DegenerateTransform(String),

    /// Vertex cache contents contradict the polygons that read them
    #[error("corrupt weight data on node {node}: {reason}")]
    CorruptWeights { node: usize, reason: String },

    /// Mesh exceeds the 16-bit vertex index space
    #[error("mesh has {0} vertices, but at most 65536 can be addressed")]
    TooManyVertices(usize),

    /// Planned vertex offsets ran past the 16-bit cache
    #[error("fragment \"{label}\" needs {count} vertex slots at offset {offset}, exceeding the 65536-slot cache")]
    VertexCacheOverflow {
        label: String,
        offset: u32,
        count: u32,
    },

    /// Weighted mesh internal invariants do not hold
    #[error("invalid weighted mesh: {0}")]
    InvalidWeights(String),

    /// Conversion options failed to parse
    #[error("failed to parse conversion options: {0}")]
    Options(#[from] toml::de::Error),
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, ModelError>;
