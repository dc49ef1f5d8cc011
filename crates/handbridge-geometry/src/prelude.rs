//! Prelude module for convenient imports

pub use crate::MILLIMETERS_TO_METERS;
pub use crate::convert::{
    quaternion_from_rotation_matrix, quaternion_from_yaw_pitch_roll,
    rotation_matrix_from_quaternion, yaw_pitch_roll_from_direction,
};
pub use crate::matrix::{Matrix3x4, mat_mul_33, transpose_mul_33};
pub use crate::quaternion::{
    Quaternion, quaternion_conjugate, quaternion_multiply, quaternion_rotate_vector,
};
pub use crate::vector::Vector3;
