//! Polygon encoding selection and vertex dedup

use hashbrown::HashMap;
use tracing::trace;

use super::mesh::{MAX_VERTICES, WeightedMesh};
use crate::attach::{BufferCorner, BufferMesh};
use crate::strip::{Strippifier, join_strips};

/// Size of one entry of a buffer mesh index list
const INDEX_SIZE: usize = 2;

/// How a buffer mesh stores its corners
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolygonEncoding {
    /// Three corners per triangle
    Flat,
    /// Unique corners plus a triangle index list
    Indexed,
    /// One joined triangle strip of corners
    Strip,
    /// Unique corners plus a strip index list
    IndexedStrip,
}

/// Byte cost of every candidate encoding
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodingCosts {
    pub flat: usize,
    pub indexed: usize,
    pub strip: usize,
    pub indexed_strip: usize,
}

impl EncodingCosts {
    /// Smallest candidate; ties go to the earlier of flat, indexed, strip, indexed-strip
    pub fn cheapest(&self) -> (PolygonEncoding, usize) {
        let candidates = [
            (PolygonEncoding::Flat, self.flat),
            (PolygonEncoding::Indexed, self.indexed),
            (PolygonEncoding::Strip, self.strip),
            (PolygonEncoding::IndexedStrip, self.indexed_strip),
        ];
        let mut best = candidates[0];
        for candidate in &candidates[1..] {
            if candidate.1 < best.1 {
                best = *candidate;
            }
        }
        best
    }
}

/// Deduplicated, non-degenerate triangle list of one mesh
struct Flattened {
    unique: Vec<BufferCorner>,
    /// Three ids into `unique` per triangle
    triangles: Vec<u32>,
    /// Joined strip of ids into `unique`
    strip: Vec<u32>,
}

impl Flattened {
    fn new(mesh: &BufferMesh, strippifier: &dyn Strippifier) -> Self {
        let mut triangles: Vec<[BufferCorner; 3]> = mesh
            .triangle_corners()
            .chunks_exact(3)
            .map(|t| [t[0], t[1], t[2]])
            .collect();

        if mesh.vertex_read_offset != 0 {
            let offset = mesh.vertex_read_offset;
            for corner in triangles.iter_mut().flatten() {
                corner.vertex_index = (corner.vertex_index as u32).wrapping_sub(offset) as u16;
            }
        }

        let mut i = 0;
        while i < triangles.len() {
            let [a, b, c] = triangles[i];
            if a.vertex_index == b.vertex_index
                || b.vertex_index == c.vertex_index
                || a.vertex_index == c.vertex_index
            {
                trace!(triangle = i, "dropping degenerate triangle");
                triangles.swap_remove(i);
            } else {
                i += 1;
            }
        }

        let mut ids: HashMap<BufferCorner, u32> = HashMap::new();
        let mut unique = Vec::new();
        let triangles: Vec<u32> = triangles
            .iter()
            .flatten()
            .map(|corner| {
                *ids.entry(*corner).or_insert_with(|| {
                    unique.push(*corner);
                    (unique.len() - 1) as u32
                })
            })
            .collect();

        let strip = join_strips(&strippifier.strippify(&triangles));
        Self {
            unique,
            triangles,
            strip,
        }
    }

    fn costs(&self) -> EncodingCosts {
        let corner = BufferCorner::STRUCT_SIZE;
        // Index lists cannot address more than 16 bits of unique corners
        let indexable = self.unique.len() <= MAX_VERTICES;
        let unique = self.unique.len() * corner;
        EncodingCosts {
            flat: self.triangles.len() * corner,
            indexed: if indexable {
                unique + self.triangles.len() * INDEX_SIZE
            } else {
                usize::MAX
            },
            strip: self.strip.len() * corner,
            indexed_strip: if indexable {
                unique + self.strip.len() * INDEX_SIZE
            } else {
                usize::MAX
            },
        }
    }

    fn resolve(&self, ids: &[u32]) -> Vec<BufferCorner> {
        ids.iter().map(|&i| self.unique[i as usize]).collect()
    }
}

/// Byte costs of the four encodings for a mesh's current polygons
pub fn measure_encodings(mesh: &BufferMesh, strippifier: &dyn Strippifier) -> EncodingCosts {
    Flattened::new(mesh, strippifier).costs()
}

/// Bytes taken by a mesh's corner data as currently encoded
pub fn encoded_size(mesh: &BufferMesh) -> usize {
    mesh.corners.len() * BufferCorner::STRUCT_SIZE + mesh.index_list.as_ref().map_or(0, |l| l.len() * INDEX_SIZE)
}

/// Re-encode a mesh's polygons using the smallest encoding
///
/// Degenerate triangles are dropped and identical corners merged first. The
/// read offset is preserved.
pub fn optimize_polygons(mesh: &mut BufferMesh, strippifier: &dyn Strippifier) -> PolygonEncoding {
    let flattened = Flattened::new(mesh, strippifier);
    let costs = flattened.costs();
    let (encoding, cost) = costs.cheapest();

    let (corners, index_list, strippified) = match encoding {
        PolygonEncoding::Flat => (flattened.resolve(&flattened.triangles), None, false),
        PolygonEncoding::Indexed => (
            flattened.unique.clone(),
            Some(flattened.triangles.iter().map(|&i| i as u16).collect()),
            false,
        ),
        PolygonEncoding::Strip => (flattened.resolve(&flattened.strip), None, true),
        PolygonEncoding::IndexedStrip => (
            flattened.unique.clone(),
            Some(flattened.strip.iter().map(|&i| i as u16).collect()),
            true,
        ),
    };

    trace!(?encoding, cost, ?costs, "polygon encoding chosen");
    mesh.corners = corners;
    mesh.index_list = index_list;
    mesh.strippified = strippified;
    encoding
}

/// Merge vertices whose every field is bit-identical; returns the number merged
pub fn optimize_vertices(mesh: &mut WeightedMesh) -> usize {
    let mut ids: HashMap<Vec<u32>, u32> = HashMap::new();
    let mut kept = Vec::with_capacity(mesh.vertices.len());
    let remap: Vec<u32> = mesh
        .vertices
        .iter()
        .map(|vertex| {
            *ids.entry(vertex.bit_key()).or_insert_with(|| {
                kept.push(vertex.clone());
                (kept.len() - 1) as u32
            })
        })
        .collect();

    let merged = mesh.vertices.len() - kept.len();
    if merged > 0 {
        mesh.remap_vertices(kept, &remap);
        trace!(merged, "merged identical weighted vertices");
    }
    merged
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::attach::{BufferMaterial, Color};
    use crate::strip::GreedyStrippifier;
    use crate::weighted::WeightedVertex;
    use glam::{Vec2, Vec3};

    fn grid_mesh(columns: u16) -> BufferMesh {
        // Row of quads, top vertex x, bottom vertex columns + 1 + x
        let row = columns + 1;
        let mut corners = Vec::new();
        for x in 0..columns {
            let (top, bottom) = (x, row + x);
            for i in [top, bottom, top + 1, top + 1, bottom, bottom + 1] {
                corners.push(BufferCorner::plain(i));
            }
        }
        BufferMesh::from_triangles(corners, BufferMaterial::default(), true, false)
    }

    fn indices(mesh: &BufferMesh) -> Vec<u16> {
        mesh.triangle_corners().iter().map(|c| c.vertex_index).collect()
    }

    #[test]
    fn test_long_strip_wins() {
        let mut mesh = grid_mesh(8);
        let before = indices(&mesh);
        let costs = measure_encodings(&mesh, &GreedyStrippifier);
        let encoding = optimize_polygons(&mut mesh, &GreedyStrippifier);
        assert_eq!(encoding, PolygonEncoding::Strip);
        assert_eq!(encoded_size(&mesh), costs.cheapest().1);
        assert_eq!(indices(&mesh).len(), before.len());
    }

    #[test]
    fn test_single_triangle_stays_flat() {
        let mut mesh = grid_mesh(1);
        mesh.corners.truncate(3);
        assert_eq!(optimize_polygons(&mut mesh, &GreedyStrippifier), PolygonEncoding::Flat);
        assert_eq!(mesh.corners.len(), 3);
        assert!(mesh.index_list.is_none());
    }

    #[test]
    fn test_degenerates_dropped() {
        let mut mesh = grid_mesh(1);
        mesh.corners.extend([BufferCorner::plain(0), BufferCorner::plain(0), BufferCorner::plain(3)]);
        optimize_polygons(&mut mesh, &GreedyStrippifier);
        assert_eq!(mesh.triangle_corners().len(), 6);
    }

    #[test]
    fn test_read_offset_preserved() {
        let mut mesh = grid_mesh(4);
        mesh.vertex_read_offset = 100;
        let before = indices(&mesh);
        optimize_polygons(&mut mesh, &GreedyStrippifier);
        let mut after = indices(&mesh);
        let mut before_sorted = before.clone();
        before_sorted.sort();
        after.sort();
        assert_eq!(after, before_sorted);
        assert!(after.iter().all(|&i| i >= 100));
    }

    #[test]
    fn test_distinct_corner_attributes_kept() {
        // Same vertex with two texcoords must not be merged into one corner
        let mut mesh = grid_mesh(1);
        mesh.corners[5] = BufferCorner::new(3, Color::WHITE, Vec2::ONE);
        mesh.corners[3].texcoord = Vec2::new(0.5, 0.5);
        let costs = measure_encodings(&mesh, &GreedyStrippifier);
        optimize_polygons(&mut mesh, &GreedyStrippifier);
        assert_eq!(encoded_size(&mesh), costs.cheapest().1);
        let texcoords: Vec<Vec2> = mesh.triangle_corners().iter().map(|c| c.texcoord).collect();
        assert!(texcoords.contains(&Vec2::ONE));
        assert!(texcoords.contains(&Vec2::new(0.5, 0.5)));
    }

    #[test]
    fn test_cheapest_prefers_earlier_on_tie() {
        let costs = EncodingCosts {
            flat: 10,
            indexed: 10,
            strip: 10,
            indexed_strip: 4,
        };
        assert_eq!(costs.cheapest(), (PolygonEncoding::IndexedStrip, 4));
        let tied = EncodingCosts { indexed_strip: 10, ..costs };
        assert_eq!(tied.cheapest().0, PolygonEncoding::Flat);
    }

    #[test]
    fn test_optimize_vertices() {
        let v = WeightedVertex::weighted(Vec3::ONE, Vec3::Y, vec![0.5, 0.5]);
        let mut mesh = WeightedMesh {
            label: None,
            vertices: vec![
                v.clone(),
                WeightedVertex::weighted(Vec3::ZERO, Vec3::Y, vec![1.0, 0.0]),
                v,
                WeightedVertex::weighted(Vec3::ONE, Vec3::Y, vec![0.25, 0.75]),
            ],
            triangle_sets: vec![vec![BufferCorner::plain(2), BufferCorner::plain(1), BufferCorner::plain(3)]],
            materials: vec![BufferMaterial::default()],
            root_indices: BTreeSet::from([0]),
            depending_node_indices: BTreeSet::from([0, 1]),
            has_colors: false,
            has_normals: true,
        };
        assert_eq!(optimize_vertices(&mut mesh), 1);
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.triangle_sets[0][0].vertex_index, 0);
        assert_eq!(mesh.triangle_sets[0][2].vertex_index, 2);
        assert_eq!(optimize_vertices(&mut mesh), 0);
    }
}
