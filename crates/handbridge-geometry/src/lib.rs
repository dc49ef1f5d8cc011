//! Rotation and rigid-transform math for handbridge
//!
//! This crate provides the small amount of linear algebra needed to turn a
//! hand-tracking sample into a controller pose in the host runtime's frame.
//!
//! # Overview
//!
//! - **[`Vector3`]**: position, velocity and translation (double precision)
//! - **[`Quaternion`]**: unit rotations, composed right-to-left
//! - **[`Matrix3x4`]**: the host runtime's device-to-world transform
//!   (orthonormal 3×3 rotation plus a translation column)
//! - **[`convert`]**: conversions between rotation matrices, yaw/pitch/roll
//!   and quaternions
//!
//! Every function is pure and defined for all finite inputs. Callers must not
//! feed degenerate or NaN rotation matrices; the output is unspecified (but
//! never a panic) in that case.
//!
//! # Handedness
//!
//! Matrices reported by the host runtime are converted with a sign flip on the
//! quaternion vector part (see [`quaternion_from_rotation_matrix`]). The
//! inverse conversion [`rotation_matrix_from_quaternion`] undoes the same flip,
//! so a matrix survives a round trip unchanged.
//!
//! # Example
//!
//! ```
//! use handbridge_geometry::prelude::*;
//!
//! let q = quaternion_from_yaw_pitch_roll(std::f64::consts::FRAC_PI_2, 0.0, 0.0);
//! let v = quaternion_rotate_vector(&q, &Vector3::new(0.0, 0.0, -1.0), false);
//! assert!((v.x + 1.0).abs() < 1e-9);
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![deny(unused_must_use)]
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod convert;
pub mod matrix;
pub mod prelude;
pub mod quaternion;
pub mod vector;

pub use convert::{
    quaternion_from_rotation_matrix, quaternion_from_yaw_pitch_roll,
    rotation_matrix_from_quaternion, yaw_pitch_roll_from_direction,
};
pub use matrix::{Matrix3x4, mat_mul_33, transpose_mul_33};
pub use quaternion::{
    Quaternion, quaternion_conjugate, quaternion_multiply, quaternion_rotate_vector,
};
pub use vector::Vector3;

/// Millimetres to metres.
pub const MILLIMETERS_TO_METERS: f64 = 0.001;
