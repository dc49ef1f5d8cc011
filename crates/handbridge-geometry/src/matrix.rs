//! Rotation + translation matrix

use serde::{Deserialize, Serialize};

use crate::vector::Vector3;

/// Row-major 3×4 transform: upper-left 3×3 is an orthonormal rotation,
/// column 3 is the translation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Matrix3x4 {
    /// Rows of the matrix
    pub m: [[f64; 4]; 3],
}

impl Matrix3x4 {
    /// Identity rotation, zero translation.
    pub const IDENTITY: Self = Self {
        m: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        ],
    };

    /// Wrap raw rows.
    #[must_use]
    pub const fn new(m: [[f64; 4]; 3]) -> Self {
        Self { m }
    }

    /// Build from a 3×3 rotation and a translation.
    #[must_use]
    pub const fn from_rotation_translation(r: [[f64; 3]; 3], t: Vector3) -> Self {
        Self {
            m: [
                [r[0][0], r[0][1], r[0][2], t.x],
                [r[1][0], r[1][1], r[1][2], t.y],
                [r[2][0], r[2][1], r[2][2], t.z],
            ],
        }
    }

    /// Upper-left 3×3 block.
    #[must_use]
    pub const fn rotation(&self) -> [[f64; 3]; 3] {
        let m = &self.m;
        [
            [m[0][0], m[0][1], m[0][2]],
            [m[1][0], m[1][1], m[1][2]],
            [m[2][0], m[2][1], m[2][2]],
        ]
    }

    /// Translation column.
    #[must_use]
    pub const fn translation(&self) -> Vector3 {
        Vector3::new(self.m[0][3], self.m[1][3], self.m[2][3])
    }

    /// Replace the translation column.
    #[must_use]
    pub const fn with_translation(mut self, t: Vector3) -> Self {
        self.m[0][3] = t.x;
        self.m[1][3] = t.y;
        self.m[2][3] = t.z;
        self
    }

    /// Trace of the rotation block.
    #[must_use]
    pub fn trace(&self) -> f64 {
        self.m[0][0] + self.m[1][1] + self.m[2][2]
    }

    /// Apply the rotation block only.
    #[must_use]
    pub fn rotate(&self, v: &Vector3) -> Vector3 {
        let [r0, r1, r2] = self.rotation();
        Vector3::new(
            r0[0] * v.x + r0[1] * v.y + r0[2] * v.z,
            r1[0] * v.x + r1[1] * v.y + r1[2] * v.z,
            r2[0] * v.x + r2[1] * v.y + r2[2] * v.z,
        )
    }

    /// Apply rotation then translation.
    #[must_use]
    pub fn transform_point(&self, p: &Vector3) -> Vector3 {
        self.rotate(p) + self.translation()
    }

    /// Determinant of the rotation block (`+1` for a proper rotation).
    #[must_use]
    pub fn determinant(&self) -> f64 {
        let [a, b, c] = self.rotation();
        a[0] * (b[1] * c[2] - b[2] * c[1]) - a[1] * (b[0] * c[2] - b[2] * c[0])
            + a[2] * (b[0] * c[1] - b[1] * c[0])
    }

    /// True when all elements differ from `other` by at most `tolerance`.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        self.m
            .iter()
            .flatten()
            .zip(other.m.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}

impl Default for Matrix3x4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

fn column(r: &[[f64; 3]; 3], j: usize) -> [f64; 3] {
    let [r0, r1, r2] = r;
    match j {
        0 => [r0[0], r1[0], r2[0]],
        1 => [r0[1], r1[1], r2[1]],
        _ => [r0[2], r1[2], r2[2]],
    }
}

fn dot3(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn product(rows: [[f64; 3]; 3], rhs: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let cols = [column(rhs, 0), column(rhs, 1), column(rhs, 2)];
    rows.map(|row| cols.map(|col| dot3(&row, &col)))
}

fn transpose(r: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    [column(r, 0), column(r, 1), column(r, 2)]
}

/// 3×3 product `a·b` of the rotation blocks.
///
/// The translation column of the result is copied from `a`; callers that
/// compose full rigid transforms add the rotated translation of `b` themselves.
#[must_use]
pub fn mat_mul_33(a: &Matrix3x4, b: &Matrix3x4) -> Matrix3x4 {
    Matrix3x4::from_rotation_translation(product(a.rotation(), &b.rotation()), a.translation())
}

/// 3×3 product `aᵀ·b` of the rotation blocks, i.e. the rotation of `b`
/// expressed in the frame of `a`.
///
/// The translation column of the result is zero.
#[must_use]
pub fn transpose_mul_33(a: &Matrix3x4, b: &Matrix3x4) -> Matrix3x4 {
    Matrix3x4::from_rotation_translation(
        product(transpose(&a.rotation()), &b.rotation()),
        Vector3::ZERO,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rot_z_90() -> Matrix3x4 {
        Matrix3x4::new([
            [0.0, -1.0, 0.0, 1.0],
            [1.0, 0.0, 0.0, 2.0],
            [0.0, 0.0, 1.0, 3.0],
        ])
    }

    #[test]
    fn test_mat_mul_keeps_left_translation() {
        let a = rot_z_90();
        let b = Matrix3x4::IDENTITY.with_translation(Vector3::new(9.0, 9.0, 9.0));
        let c = mat_mul_33(&a, &b);
        assert!(c.approx_eq(&a, 1e-12));
    }

    #[test]
    fn test_transpose_mul_self_is_identity() {
        let a = rot_z_90();
        let c = transpose_mul_33(&a, &a);
        assert!(c.approx_eq(&Matrix3x4::IDENTITY, 1e-12));
    }

    #[test]
    fn test_transform_point() {
        let a = rot_z_90();
        let p = a.transform_point(&Vector3::new(1.0, 0.0, 0.0));
        assert!((p.x - 1.0).abs() < 1e-12);
        assert!((p.y - 3.0).abs() < 1e-12);
        assert!((p.z - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_determinant_of_rotation() {
        assert!((rot_z_90().determinant() - 1.0).abs() < 1e-12);
    }
}
