//! Approximate-equality assertions.
//!
//! The vector and quaternion macros only touch the `x`/`y`/`z` (and `w`)
//! fields, so they work with any type shaped like the geometry crate's.

/// Assert that two floating-point values differ by at most `tolerance`.
///
/// ```rust
/// use handbridge_test_helpers::assert_approx_eq;
///
/// assert_approx_eq!(1.0_f64, 1.0001, 0.001);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $tolerance:expr $(,)?) => {
        let left = $left;
        let right = $right;
        let tolerance = $tolerance;
        let diff = (left - right).abs();
        if !(diff <= tolerance) {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}`,\n  tolerance: `{:?}`",
                left, right, diff, tolerance
            );
        }
    };
    ($left:expr, $right:expr, $tolerance:expr, $($arg:tt)+) => {
        let left = $left;
        let right = $right;
        let tolerance = $tolerance;
        let diff = (left - right).abs();
        if !(diff <= tolerance) {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}`,\n  tolerance: `{:?}`: {}",
                left, right, diff, tolerance, format_args!($($arg)+)
            );
        }
    };
}

/// Assert that two 3-vectors agree component-wise within `tolerance`.
///
/// ```rust
/// use handbridge_test_helpers::assert_vec3_approx_eq;
///
/// struct V { x: f64, y: f64, z: f64 }
/// assert_vec3_approx_eq!(V { x: 1.0, y: 2.0, z: 3.0 }, V { x: 1.0, y: 2.0, z: 3.0 }, 1e-9);
/// ```
#[macro_export]
macro_rules! assert_vec3_approx_eq {
    ($left:expr, $right:expr, $tolerance:expr $(,)?) => {
        let l = &$left;
        let r = &$right;
        let tolerance = $tolerance;
        let diffs = [(l.x - r.x).abs(), (l.y - r.y).abs(), (l.z - r.z).abs()];
        if diffs.iter().any(|d| !(*d <= tolerance)) {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: ({:?}, {:?}, {:?}),\n right: ({:?}, {:?}, {:?}),\n  tolerance: `{:?}`",
                l.x, l.y, l.z, r.x, r.y, r.z, tolerance
            );
        }
    };
}

/// Assert that two unit quaternions describe the same rotation, treating
/// `q` and `-q` as equal.
///
/// ```rust
/// use handbridge_test_helpers::assert_same_rotation;
///
/// struct Q { w: f64, x: f64, y: f64, z: f64 }
/// assert_same_rotation!(
///     Q { w: 1.0, x: 0.0, y: 0.0, z: 0.0 },
///     Q { w: -1.0, x: 0.0, y: 0.0, z: 0.0 },
///     1e-9
/// );
/// ```
#[macro_export]
macro_rules! assert_same_rotation {
    ($left:expr, $right:expr, $tolerance:expr $(,)?) => {
        let l = &$left;
        let r = &$right;
        let tolerance = $tolerance;
        let dot = l.w * r.w + l.x * r.x + l.y * r.y + l.z * r.z;
        let err = (dot.abs() - 1.0).abs();
        if !(err <= tolerance) {
            panic!(
                "assertion failed: rotations differ\n  left: ({:?}, {:?}, {:?}, {:?}),\n right: ({:?}, {:?}, {:?}, {:?}),\n  |dot|-1: `{:?}`",
                l.w, l.x, l.y, l.z, r.w, r.x, r.y, r.z, err
            );
        }
    };
}
