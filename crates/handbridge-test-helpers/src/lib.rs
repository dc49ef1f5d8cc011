//! Shared test utilities for handbridge.
//!
//! # Modules
//!
//! - [`mod@must`] - Unwrap helpers with `#[track_caller]` context
//! - [`assertions`] - Approximate-equality macros for scalars, vectors and
//!   rotations
//! - [`wait`] - Polling helpers for tests that observe background threads
//! - [`prelude`] - Convenience re-exports
//!
//! ```rust,ignore
//! use handbridge_test_helpers::prelude::*;
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![allow(clippy::unwrap_used, clippy::panic)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod assertions;
pub mod must;
pub mod prelude;
pub mod wait;

pub use must::*;
pub use wait::wait_until;

/// Result type for tests that propagate errors with `?`.
pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Install a `tracing` subscriber that writes through the test harness's
/// captured output. Safe to call from every test; only the first call wins.
#[cfg(feature = "tracing")]
#[cfg_attr(docsrs, doc(cfg(feature = "tracing")))]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}
