//! Vertex cache offset planning
//!
//! Fragments spanning overlapping node ranges share the engine's vertex cache
//! and must not write the same slots. Each node keeps a list of reserved slot
//! ranges; fragments are placed greedily into the first gap that is free on
//! every node they span.

use tracing::debug;

use crate::error::{ModelError, Result};

/// Number of addressable cache slots
pub const CACHE_SLOTS: u32 = 1 << 16;

/// Shift every vertex slot a part writes or reads
pub trait VertexOffset {
    fn offset_vertices(&mut self, offset: u32);
}

/// Converted output of one weighted mesh at one root
///
/// `attaches[k]` belongs to traversal index `start + k`.
#[derive(Clone, Debug)]
pub struct Fragment<P> {
    pub label: String,
    /// Slots used, counted from the fragment's own slot 0
    pub vertex_count: u32,
    pub start: usize,
    pub attaches: Vec<Option<P>>,
}

impl<P> Fragment<P> {
    /// Last traversal index spanned
    pub fn end(&self) -> usize {
        self.start + self.attaches.len().saturating_sub(1)
    }
}

impl<P: VertexOffset> Fragment<P> {
    pub fn modify_vertex_offset(&mut self, offset: u32) {
        for part in self.attaches.iter_mut().flatten() {
            part.offset_vertices(offset);
        }
    }
}

/// Merge overlapping or touching half-open ranges
fn merge_ranges(mut ranges: Vec<(u32, u32)>) -> Vec<(u32, u32)> {
    ranges.sort_unstable();
    let mut merged: Vec<(u32, u32)> = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// First slot at which `count` free slots follow
fn first_gap(merged: &[(u32, u32)], count: u32) -> u32 {
    let mut cursor = 0u32;
    for &(start, end) in merged {
        if start.saturating_sub(cursor) >= count {
            return cursor;
        }
        cursor = cursor.max(end);
    }
    cursor
}

/// Assign non-colliding slot offsets to every fragment, in order
///
/// Fragments placed at a non-zero offset have their parts rewritten through
/// [`Fragment::modify_vertex_offset`]. Returns the offset chosen per fragment.
pub fn plan_vertex_offsets<P: VertexOffset>(fragments: &mut [Fragment<P>]) -> Result<Vec<u32>> {
    let node_count = fragments.iter().map(|f| f.end() + 1).max().unwrap_or(0);
    let mut reserved: Vec<Vec<(u32, u32)>> = vec![Vec::new(); node_count];
    let mut offsets = Vec::with_capacity(fragments.len());

    for fragment in fragments.iter_mut() {
        let (start, end) = (fragment.start, fragment.end());
        let count = fragment.vertex_count;

        let taken = merge_ranges(reserved[start..=end].iter().flatten().copied().collect());
        let gap = first_gap(&taken, count);
        if gap as u64 + count as u64 > CACHE_SLOTS as u64 {
            return Err(ModelError::VertexCacheOverflow {
                label: fragment.label.clone(),
                offset: gap,
                count,
            });
        }

        if count > 0 {
            for node in &mut reserved[start..=end] {
                node.push((gap, gap + count));
            }
        }
        if gap > 0 {
            fragment.modify_vertex_offset(gap);
        }
        debug!(label = %fragment.label, start, end, count, offset = gap, "placed fragment");
        offsets.push(gap);
    }

    Ok(offsets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Slots(u32);

    impl VertexOffset for Slots {
        fn offset_vertices(&mut self, offset: u32) {
            self.0 += offset;
        }
    }

    fn fragment(start: usize, len: usize, count: u32) -> Fragment<Slots> {
        Fragment {
            label: format!("f{start}"),
            vertex_count: count,
            start,
            attaches: (0..len).map(|_| Some(Slots(0))).collect(),
        }
    }

    #[test]
    fn test_disjoint_ranges_start_at_zero() {
        let mut fragments = vec![fragment(0, 2, 10), fragment(2, 1, 10)];
        assert_eq!(plan_vertex_offsets(&mut fragments).unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_overlapping_ranges_stack() {
        let mut fragments = vec![fragment(0, 3, 10), fragment(1, 1, 4), fragment(2, 2, 5)];
        let offsets = plan_vertex_offsets(&mut fragments).unwrap();
        assert_eq!(offsets, vec![0, 10, 14]);
        assert_eq!(fragments[1].attaches[0], Some(Slots(10)));
        assert_eq!(fragments[2].attaches[1], Some(Slots(14)));
    }

    #[test]
    fn test_fills_earlier_gap() {
        // node 0: [0,4)  node 1: [0,4) then [4, 12)  -> fragment on node 0 fits at 4
        let mut fragments = vec![fragment(0, 2, 4), fragment(1, 1, 8), fragment(0, 1, 3)];
        let offsets = plan_vertex_offsets(&mut fragments).unwrap();
        assert_eq!(offsets, vec![0, 4, 4]);
    }

    #[test]
    fn test_reservations_merged_across_nodes() {
        let mut fragments = vec![fragment(0, 1, 4), fragment(1, 1, 6), fragment(0, 1, 2), fragment(0, 2, 2)];
        let offsets = plan_vertex_offsets(&mut fragments).unwrap();
        // node 0: [0,4) [4,6)   node 1: [0,6)  -> merged [0,6)
        assert_eq!(offsets, vec![0, 0, 4, 6]);
    }

    #[test]
    fn test_gap_before_first_reservation() {
        let mut fragments = vec![fragment(0, 1, 2), fragment(0, 2, 3), fragment(1, 1, 2)];
        let offsets = plan_vertex_offsets(&mut fragments).unwrap();
        // node 1 only holds [2,5), leaving [0,2) free
        assert_eq!(offsets, vec![0, 2, 0]);
    }

    #[test]
    fn test_ranges_never_overlap() {
        let mut fragments: Vec<Fragment<Slots>> = (0..12)
            .map(|i| fragment(i % 5, 1 + i % 3, 3 + (i as u32 * 7) % 11))
            .collect();
        let offsets = plan_vertex_offsets(&mut fragments).unwrap();
        for i in 0..fragments.len() {
            for j in i + 1..fragments.len() {
                let (a, b) = (&fragments[i], &fragments[j]);
                if a.start > b.end() || b.start > a.end() {
                    continue;
                }
                let (ra, rb) = (
                    offsets[i]..offsets[i] + a.vertex_count,
                    offsets[j]..offsets[j] + b.vertex_count,
                );
                assert!(ra.end <= rb.start || rb.end <= ra.start, "fragments {i} and {j} collide");
            }
        }
    }

    #[test]
    fn test_overflow() {
        let mut fragments = vec![fragment(0, 1, 60000), fragment(0, 1, 6000)];
        let err = plan_vertex_offsets(&mut fragments).unwrap_err();
        assert!(matches!(err, ModelError::VertexCacheOverflow { offset: 60000, count: 6000, .. }));
    }
}
