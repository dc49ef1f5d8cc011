//! Atomic counters for the request/reply path.
//!
//! Counters are incremented from both the calling thread and the receive loop
//! with `Ordering::Relaxed`; a [`StatsSnapshot`] is eventually consistent and
//! individual counters are not synchronised with each other.

use core::sync::atomic::{AtomicU64, Ordering};

/// Counter snapshot returned by [`IpcStats::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Requests written to the server queue
    pub requests_sent: u64,
    /// Replies delivered to a waiting caller
    pub replies_matched: u64,
    /// Replies with no waiting caller (late, unknown or duplicate id)
    pub stale_replies: u64,
    /// Inbound messages that failed to decode
    pub malformed_replies: u64,
    /// Modal calls that gave up waiting
    pub timeouts: u64,
    /// Requests that could not be written
    pub send_failures: u64,
}

/// Atomic request/reply counters shared between a client and its receive loop.
#[derive(Debug)]
pub struct IpcStats {
    requests_sent: AtomicU64,
    replies_matched: AtomicU64,
    stale_replies: AtomicU64,
    malformed_replies: AtomicU64,
    timeouts: AtomicU64,
    send_failures: AtomicU64,
}

impl Default for IpcStats {
    fn default() -> Self {
        Self::new()
    }
}

impl IpcStats {
    /// Create zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            requests_sent: AtomicU64::new(0),
            replies_matched: AtomicU64::new(0),
            stale_replies: AtomicU64::new(0),
            malformed_replies: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn inc_requests_sent(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn inc_replies_matched(&self) {
        self.replies_matched.fetch_add(1, Ordering::Relaxed);
    }

    /// Move one reply from matched to stale; its caller left before delivery.
    #[inline]
    pub(crate) fn reclassify_matched_as_stale(&self) {
        self.replies_matched.fetch_sub(1, Ordering::Relaxed);
        self.stale_replies.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn inc_stale_replies(&self) {
        self.stale_replies.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn inc_malformed_replies(&self) {
        self.malformed_replies.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn inc_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn inc_send_failures(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            replies_matched: self.replies_matched.load(Ordering::Relaxed),
            stale_replies: self.stale_replies.load(Ordering::Relaxed),
            malformed_replies: self.malformed_replies.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }
}
