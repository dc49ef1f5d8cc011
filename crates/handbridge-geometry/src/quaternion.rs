//! Unit quaternions

use core::ops::Mul;

use serde::{Deserialize, Serialize};

use crate::vector::Vector3;

/// Rotation quaternion `w + xi + yj + zk`.
///
/// Multiplication composes right-to-left: `a * b` applies `b` first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    /// Scalar part
    pub w: f64,
    /// i component
    pub x: f64,
    /// j component
    pub y: f64,
    /// k component
    pub z: f64,
}

impl Quaternion {
    /// The identity rotation.
    pub const IDENTITY: Self = Self::new(1.0, 0.0, 0.0, 0.0);

    /// Create a quaternion from its components.
    #[must_use]
    pub const fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// A pure-imaginary quaternion carrying a vector.
    #[must_use]
    pub const fn from_vector(v: &Vector3) -> Self {
        Self::new(0.0, v.x, v.y, v.z)
    }

    /// Rotation of `angle` radians about `axis` (normalised internally).
    #[must_use]
    pub fn from_axis_angle(axis: &Vector3, angle: f64) -> Self {
        let axis = axis.normalized();
        let (s, c) = (angle * 0.5).sin_cos();
        Self::new(c, axis.x * s, axis.y * s, axis.z * s)
    }

    /// Vector part.
    #[must_use]
    pub const fn vector(&self) -> Vector3 {
        Vector3::new(self.x, self.y, self.z)
    }

    /// Conjugate (negated vector part). For a unit quaternion this is the
    /// inverse rotation.
    #[must_use]
    pub const fn conjugate(&self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Euclidean norm.
    #[must_use]
    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Four-component dot product.
    #[must_use]
    pub fn dot(&self, other: &Self) -> f64 {
        self.w * other.w + self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Unit quaternion in the same direction; identity for a zero input.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let n = self.norm();
        if n > 0.0 {
            Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
        } else {
            Self::IDENTITY
        }
    }

    /// True if `self` and `other` describe the same rotation, accounting for
    /// the `q` / `-q` double cover.
    #[must_use]
    pub fn same_rotation(&self, other: &Self, tolerance: f64) -> bool {
        (self.dot(other).abs() - 1.0).abs() <= tolerance
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Quaternion {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        quaternion_multiply(&self, &rhs)
    }
}

/// Hamilton product `a * b`.
#[must_use]
pub fn quaternion_multiply(a: &Quaternion, b: &Quaternion) -> Quaternion {
    Quaternion::new(
        a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z,
        a.w * b.x + a.x * b.w + a.y * b.z - a.z * b.y,
        a.w * b.y - a.x * b.z + a.y * b.w + a.z * b.x,
        a.w * b.z + a.x * b.y - a.y * b.x + a.z * b.w,
    )
}

/// Conjugate of `q`.
#[must_use]
pub fn quaternion_conjugate(q: &Quaternion) -> Quaternion {
    q.conjugate()
}

/// Rotate `v` by `q` using the sandwich product.
///
/// With `reverse == false` this computes `q·v·q̄`; with `reverse == true` it
/// computes `q̄·v·q`, which is the world-to-local direction for a unit `q`.
#[must_use]
pub fn quaternion_rotate_vector(q: &Quaternion, v: &Vector3, reverse: bool) -> Vector3 {
    let p = Quaternion::from_vector(v);
    let r = if reverse {
        quaternion_multiply(&quaternion_multiply(&q.conjugate(), &p), q)
    } else {
        quaternion_multiply(&quaternion_multiply(q, &p), &q.conjugate())
    };
    r.vector()
}
