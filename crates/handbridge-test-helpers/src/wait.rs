//! Polling for conditions driven by other threads.

use std::thread;
use std::time::{Duration, Instant};

/// Poll `condition` every millisecond until it holds or `timeout` elapses.
/// Returns whether the condition was observed.
pub fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
}
