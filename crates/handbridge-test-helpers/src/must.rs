//! Unwrap helpers that report the caller's location on failure.
//!
//! Production crates deny `unwrap()`; tests use these instead so a failure
//! points at the test line rather than at this module.

use std::fmt::Debug;

/// Unwrap a `Result`, panicking with the error's `Debug` output.
///
/// ```rust
/// use handbridge_test_helpers::must;
///
/// let value = must("7".parse::<u32>());
/// assert_eq!(value, 7);
/// ```
#[track_caller]
pub fn must<T, E: Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("must: unexpected Err: {e:?}"),
    }
}

/// Unwrap a `Result`, prefixing the panic message with `context`.
#[track_caller]
pub fn must_with<T, E: Debug>(result: Result<T, E>, context: &str) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("{context}: unexpected Err: {e:?}"),
    }
}

/// Unwrap an `Option`, panicking with `msg` on `None`.
#[track_caller]
pub fn must_some<T>(option: Option<T>, msg: &str) -> T {
    match option {
        Some(v) => v,
        None => panic!("must_some: {msg}"),
    }
}

/// Assert that a `Result` is an error and return it.
///
/// ```rust
/// use handbridge_test_helpers::must_err;
///
/// let err = must_err("x".parse::<u32>());
/// assert!(!err.to_string().is_empty());
/// ```
#[track_caller]
pub fn must_err<T: Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(v) => panic!("must_err: expected Err, got Ok({v:?})"),
        Err(e) => e,
    }
}
