//! Conversions between rotation matrices, yaw/pitch/roll and quaternions

use crate::matrix::Matrix3x4;
use crate::quaternion::{Quaternion, quaternion_multiply};
use crate::vector::Vector3;

/// Convert the rotation block of `m` into a quaternion.
///
/// Uses the branch-on-trace method. When the trace is positive the scalar
/// branch is taken; otherwise the branch for the largest diagonal element is
/// chosen so the scale factor never approaches zero. Equal diagonal elements
/// resolve in the order `m00`, `m11`, `m22`. This only affects which formula
/// produces the result, not the rotation it describes.
///
/// The host runtime's matrices are left-handed relative to the target frame,
/// so the vector part of the result is negated with respect to the textbook
/// formula. Every orientation downstream depends on this flip.
#[must_use]
pub fn quaternion_from_rotation_matrix(m: &Matrix3x4) -> Quaternion {
    let [[m00, m01, m02], [m10, m11, m12], [m20, m21, m22]] = m.rotation();
    let trace = m00 + m11 + m22;

    let q = if trace > 0.0 {
        let s = 0.5 / (trace + 1.0).sqrt();
        Quaternion::new(0.25 / s, (m21 - m12) * s, (m02 - m20) * s, (m10 - m01) * s)
    } else if m00 >= m11 && m00 >= m22 {
        let s = 2.0 * (1.0 + m00 - m11 - m22).sqrt();
        Quaternion::new((m21 - m12) / s, 0.25 * s, (m01 + m10) / s, (m02 + m20) / s)
    } else if m11 >= m22 {
        let s = 2.0 * (1.0 + m11 - m00 - m22).sqrt();
        Quaternion::new((m02 - m20) / s, (m01 + m10) / s, 0.25 * s, (m12 + m21) / s)
    } else {
        let s = 2.0 * (1.0 + m22 - m00 - m11).sqrt();
        Quaternion::new((m10 - m01) / s, (m02 + m20) / s, (m12 + m21) / s, 0.25 * s)
    };

    q.conjugate()
}

/// Rebuild a rotation matrix (zero translation) from a quaternion produced by
/// [`quaternion_from_rotation_matrix`].
///
/// Applies the same handedness flip in reverse, so
/// `rotation_matrix_from_quaternion(&quaternion_from_rotation_matrix(&m))`
/// reproduces the rotation block of `m`.
#[must_use]
pub fn rotation_matrix_from_quaternion(q: &Quaternion) -> Matrix3x4 {
    let Quaternion { w, x, y, z } = q.conjugate().normalized();

    Matrix3x4::from_rotation_translation(
        [
            [
                1.0 - 2.0 * (y * y + z * z),
                2.0 * (x * y - w * z),
                2.0 * (x * z + w * y),
            ],
            [
                2.0 * (x * y + w * z),
                1.0 - 2.0 * (x * x + z * z),
                2.0 * (y * z - w * x),
            ],
            [
                2.0 * (x * z - w * y),
                2.0 * (y * z + w * x),
                1.0 - 2.0 * (x * x + y * y),
            ],
        ],
        Vector3::ZERO,
    )
}

/// Quaternion for `Ry(yaw) · Rx(pitch) · Rz(roll)`, angles in radians.
///
/// The order matters: roll is applied first, then pitch, then yaw.
#[must_use]
pub fn quaternion_from_yaw_pitch_roll(yaw: f64, pitch: f64, roll: f64) -> Quaternion {
    let (sy, cy) = (yaw * 0.5).sin_cos();
    let (sp, cp) = (pitch * 0.5).sin_cos();
    let (sr, cr) = (roll * 0.5).sin_cos();

    let ry = Quaternion::new(cy, 0.0, sy, 0.0);
    let rx = Quaternion::new(cp, sp, 0.0, 0.0);
    let rz = Quaternion::new(cr, 0.0, 0.0, sr);

    quaternion_multiply(&quaternion_multiply(&ry, &rx), &rz)
}

/// Yaw, pitch and roll (radians) of a tracked hand in the tracking hardware's
/// axis convention (X right, Y up, Z toward the user).
///
/// Yaw and pitch come from the hand's forward `direction`, roll from the palm
/// `normal`.
#[must_use]
pub fn yaw_pitch_roll_from_direction(direction: &Vector3, normal: &Vector3) -> (f64, f64, f64) {
    let yaw = direction.x.atan2(-direction.z);
    let pitch = direction.y.atan2(-direction.z);
    let roll = normal.x.atan2(-normal.y);
    (yaw, pitch, roll)
}
