//! Triangle strip helpers
//!
//! Strip building itself is a leaf service behind [`Strippifier`]; the rest of
//! the crate only needs to join strips into one sequence and expand strips back
//! into triangle lists.

use std::hash::Hash;

use hashbrown::HashMap;

/// Builds triangle strips out of a triangle list
///
/// `triangles` holds three indices per triangle. Every returned strip starts
/// with a triangle in its original winding and alternates from there, so the
/// strips expand back to the same set of oriented triangles.
pub trait Strippifier {
    fn strippify(&self, triangles: &[u32]) -> Vec<Vec<u32>>;
}

/// Greedy edge-walking strippifier
///
/// Starts a strip at the first unused triangle and keeps extending it across
/// the shared edge required by the strip's current winding parity.
#[derive(Debug, Default, Clone, Copy)]
pub struct GreedyStrippifier;

impl Strippifier for GreedyStrippifier {
    fn strippify(&self, triangles: &[u32]) -> Vec<Vec<u32>> {
        let tris: Vec<[u32; 3]> = triangles
            .chunks_exact(3)
            .map(|t| [t[0], t[1], t[2]])
            .collect();

        // Directed edge -> triangles containing it
        let mut edges: HashMap<(u32, u32), Vec<usize>> = HashMap::new();
        for (i, [a, b, c]) in tris.iter().copied().enumerate() {
            edges.entry((a, b)).or_default().push(i);
            edges.entry((b, c)).or_default().push(i);
            edges.entry((c, a)).or_default().push(i);
        }

        let mut used = vec![false; tris.len()];
        let mut strips = Vec::new();

        for start in 0..tris.len() {
            if used[start] {
                continue;
            }
            used[start] = true;
            let mut strip = tris[start].to_vec();

            loop {
                let n = strip.len();
                // Triangle k = n - 2 is flipped when k is odd
                let (p, q) = if (n - 2) % 2 == 0 {
                    (strip[n - 2], strip[n - 1])
                } else {
                    (strip[n - 1], strip[n - 2])
                };

                let next = edges
                    .get(&(p, q))
                    .and_then(|candidates| candidates.iter().copied().find(|&t| !used[t]));
                let Some(t) = next else {
                    break;
                };

                used[t] = true;
                let third = tris[t]
                    .iter()
                    .copied()
                    .find(|&v| v != p && v != q)
                    .unwrap_or(p);
                strip.push(third);
            }

            strips.push(strip);
        }

        strips
    }
}

/// Strippify a triangle list of arbitrary corners
///
/// Identical corners are shared so strips can run across them.
pub fn strippify_corners<T>(corners: &[T], strippifier: &dyn Strippifier) -> Vec<Vec<T>>
where
    T: Copy + Eq + Hash,
{
    let mut ids: HashMap<T, u32> = HashMap::new();
    let mut unique = Vec::new();
    let triangles: Vec<u32> = corners
        .iter()
        .map(|corner| {
            *ids.entry(*corner).or_insert_with(|| {
                unique.push(*corner);
                (unique.len() - 1) as u32
            })
        })
        .collect();

    strippifier
        .strippify(&triangles)
        .into_iter()
        .map(|strip| strip.into_iter().map(|i| unique[i as usize]).collect())
        .collect()
}

/// Expand a strip into a triangle list
///
/// Triangles for which `same` reports two identical corners are skipped; these
/// are the degenerate joins inserted by [`join_strips`].
pub fn decode_strip<T, F>(strip: &[T], reversed: bool, same: F) -> Vec<T>
where
    T: Copy,
    F: Fn(&T, &T) -> bool,
{
    let mut triangles = Vec::with_capacity(strip.len().saturating_sub(2) * 3);
    for k in 0..strip.len().saturating_sub(2) {
        let (a, b, c) = (strip[k], strip[k + 1], strip[k + 2]);
        if same(&a, &b) || same(&b, &c) || same(&a, &c) {
            continue;
        }
        if (k % 2 == 1) != reversed {
            triangles.extend_from_slice(&[b, a, c]);
        } else {
            triangles.extend_from_slice(&[a, b, c]);
        }
    }
    triangles
}

/// Concatenate strips into one sequence using degenerate joins
///
/// Every joined strip starts on an even position so its winding is preserved.
pub fn join_strips<T: Copy>(strips: &[Vec<T>]) -> Vec<T> {
    let mut joined: Vec<T> = Vec::new();
    for strip in strips.iter().filter(|s| !s.is_empty()) {
        if let Some(&last) = joined.last() {
            joined.push(last);
            if joined.len() % 2 == 0 {
                joined.push(strip[0]);
            }
            joined.push(strip[0]);
        }
        joined.extend_from_slice(strip);
    }
    joined
}
