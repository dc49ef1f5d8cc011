//! Convenience re-exports.

pub use crate::must::{must, must_err, must_some, must_with};
pub use crate::wait::wait_until;
pub use crate::{TestResult, assert_approx_eq, assert_same_rotation, assert_vec3_approx_eq};

#[cfg(feature = "tracing")]
pub use crate::init_test_tracing;
