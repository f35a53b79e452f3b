//! Vertex welding records

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// One weighted source of a welded vertex
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Weld {
    /// Traversal index of the source node
    pub node_index: usize,
    pub vertex_index: u32,
    pub weight: f32,
}

/// Destination vertex rebuilt as `Σ weld.weight * source vertex`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VertexWelding {
    pub destination_vertex: u32,
    pub welds: Vec<Weld>,
}

impl VertexWelding {
    pub fn new(destination_vertex: u32, welds: Vec<Weld>) -> Self {
        Self {
            destination_vertex,
            welds,
        }
    }

    pub fn total_weight(&self) -> f32 {
        self.welds.iter().map(|w| w.weight).sum()
    }

    /// Blend the source vertices
    ///
    /// `source` resolves a weld to its position and normal, already expressed
    /// in the destination node's space. Returns `None` if any source is
    /// missing.
    pub fn evaluate<F>(&self, mut source: F) -> Option<(Vec3, Vec3)>
    where
        F: FnMut(&Weld) -> Option<(Vec3, Vec3)>,
    {
        let mut position = Vec3::ZERO;
        let mut normal = Vec3::ZERO;
        for weld in &self.welds {
            let (p, n) = source(weld)?;
            position += p * weld.weight;
            normal += n * weld.weight;
        }
        Some((position, normal.normalize_or_zero()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_blends_sources() {
        let welding = VertexWelding::new(
            0,
            vec![
                Weld {
                    node_index: 0,
                    vertex_index: 0,
                    weight: 0.5,
                },
                Weld {
                    node_index: 1,
                    vertex_index: 0,
                    weight: 0.5,
                },
            ],
        );
        let (p, n) = welding
            .evaluate(|w| Some((Vec3::splat(w.node_index as f32 * 2.0), Vec3::Y)))
            .unwrap();
        assert_eq!(p, Vec3::ONE);
        assert_eq!(n, Vec3::Y);
        assert_eq!(welding.total_weight(), 1.0);
    }

    #[test]
    fn test_missing_source() {
        let welding = VertexWelding::new(
            3,
            vec![Weld {
                node_index: 4,
                vertex_index: 9,
                weight: 1.0,
            }],
        );
        assert!(welding.evaluate(|_| None).is_none());
    }
}
