//! Math helpers shared by the converters
//!
//! Matrices follow glam's column-vector convention: a world matrix maps
//! node-local points to world space and composes as `parent * local`.

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Determinant magnitude below which a transform is treated as singular
const SINGULAR_DETERMINANT: f32 = 1e-12;

/// Invert a node matrix, failing on zero-scale transforms
pub fn try_inverse(matrix: Mat4, label: &str) -> Result<Mat4> {
    if matrix.determinant().abs() < SINGULAR_DETERMINANT {
        return Err(ModelError::DegenerateTransform(label.to_string()));
    }
    Ok(matrix.inverse())
}

/// Matrix for transforming normals (inverse-transpose, handles non-uniform scale)
///
/// Fails like [`try_inverse`] when `matrix` is singular.
pub fn normal_matrix(matrix: Mat4, label: &str) -> Result<Mat4> {
    Ok(try_inverse(matrix, label)?.transpose())
}

/// Transform a point and a normal by a matrix pair, renormalizing the normal
#[inline]
pub fn transform_vertex(matrix: Mat4, normals: Mat4, position: Vec3, normal: Vec3) -> (Vec3, Vec3) {
    (
        matrix.transform_point3(position),
        normals.transform_vector3(normal).normalize_or_zero(),
    )
}

/// Bounding sphere of an attach
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub position: Vec3,
    pub radius: f32,
}

impl Bounds {
    /// Sphere centered on the box midpoint, enclosing every point
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = Vec3> + Clone,
    {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        let mut any = false;
        for p in points.clone() {
            min = min.min(p);
            max = max.max(p);
            any = true;
        }
        if !any {
            return Self::default();
        }

        let position = (min + max) * 0.5;
        let radius = points
            .into_iter()
            .map(|p| p.distance(position))
            .fold(0.0f32, f32::max);
        Self { position, radius }
    }
}
