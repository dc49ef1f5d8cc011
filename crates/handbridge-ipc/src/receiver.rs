//! Reply receive loop
//!
//! One thread per connection reads the client's inbound queue and routes each
//! reply to the caller waiting on its request id. The loop is the only owner
//! of the pending-call table; callers talk to it through [`LoopCommand`]s.
//!
//! A caller enqueues `Register` before writing its request, and the loop
//! drains every queued command after a reply arrives and before looking it
//! up, so a reply can never overtake its own registration.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::codec::{Message, MessageCodec, MessageKind};
use crate::error::{IpcError, IpcResult};
use crate::stats::IpcStats;
use crate::transport::MessageQueue;

/// Completion slot for one modal request.
pub(crate) type ReplySlot = Sender<Message>;

pub(crate) enum LoopCommand {
    Register { request_id: u32, slot: ReplySlot },
    Cancel { request_id: u32 },
    PendingCount { reply: Sender<usize> },
}

/// Handle to a running receive loop.
pub(crate) struct ReceiveLoop {
    control: Sender<LoopCommand>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ReceiveLoop {
    pub(crate) fn spawn(
        inbound: Arc<dyn MessageQueue>,
        codec: MessageCodec,
        stats: Arc<IpcStats>,
        poll_interval: Duration,
    ) -> IpcResult<Self> {
        let (control, commands) = channel::unbounded();
        let running = Arc::new(AtomicBool::new(true));

        let worker = Worker {
            inbound,
            codec,
            stats,
            poll_interval,
            commands,
            running: Arc::clone(&running),
            pending: HashMap::new(),
        };
        let handle = thread::Builder::new()
            .name(format!("ipc-recv-{}", worker.inbound.name()))
            .spawn(move || worker.run())
            .map_err(|e| IpcError::connection(format!("Failed to spawn receive thread: {e}")))?;

        Ok(Self {
            control,
            running,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Register a completion slot. Must be called before the request is sent.
    pub(crate) fn register(&self, request_id: u32, slot: ReplySlot) -> IpcResult<()> {
        self.control
            .send(LoopCommand::Register { request_id, slot })
            .map_err(|_closed| IpcError::connection("receive loop is not running"))
    }

    /// Drop the slot for `request_id`, if still present.
    pub(crate) fn cancel(&self, request_id: u32) {
        if self
            .control
            .send(LoopCommand::Cancel { request_id })
            .is_err()
        {
            trace!(request_id, "Receive loop gone; nothing to cancel");
        }
    }

    /// Ask the loop how many calls are still waiting for a reply.
    pub(crate) fn pending_count(&self, timeout: Duration) -> IpcResult<usize> {
        let (reply, answer) = channel::bounded(1);
        self.control
            .send(LoopCommand::PendingCount { reply })
            .map_err(|_closed| IpcError::connection("receive loop is not running"))?;
        answer
            .recv_timeout(timeout)
            .map_err(|_elapsed| IpcError::timeout(timeout))
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop the loop and wait for it to exit. Idempotent.
    pub(crate) fn stop(&self) {
        self.running.store(false, Ordering::Release);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Receive thread panicked");
            }
        }
    }
}

impl Drop for ReceiveLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    inbound: Arc<dyn MessageQueue>,
    codec: MessageCodec,
    stats: Arc<IpcStats>,
    poll_interval: Duration,
    commands: Receiver<LoopCommand>,
    running: Arc<AtomicBool>,
    pending: HashMap<u32, ReplySlot>,
}

impl Worker {
    fn run(mut self) {
        info!(queue = self.inbound.name(), "Receive loop started");

        while self.running.load(Ordering::Acquire) {
            if !self.drain_commands() {
                break;
            }
            match self.inbound.recv_timeout(self.poll_interval) {
                Ok(Some(bytes)) => {
                    if !self.drain_commands() {
                        break;
                    }
                    self.dispatch(&bytes);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Inbound queue receive failed");
                    thread::sleep(self.poll_interval);
                }
            }
        }

        // Dropping the slots wakes every remaining waiter with a disconnect.
        let abandoned = self.pending.len();
        self.pending.clear();
        self.running.store(false, Ordering::Release);
        info!(abandoned, "Receive loop stopped");
    }

    /// Apply all queued commands. Returns `false` once every handle is gone.
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.apply(command),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn apply(&mut self, command: LoopCommand) {
        match command {
            LoopCommand::Register { request_id, slot } => {
                if self.pending.contains_key(&request_id) {
                    // Dropping `slot` fails the second caller instead of
                    // letting two calls share one reply.
                    warn!(request_id, "Request id already in flight; rejecting");
                } else {
                    self.pending.insert(request_id, slot);
                }
            }
            LoopCommand::Cancel { request_id } => {
                if self.pending.remove(&request_id).is_some() {
                    trace!(request_id, "Cancelled pending call");
                }
            }
            LoopCommand::PendingCount { reply } => {
                if reply.send(self.pending.len()).is_err() {
                    trace!("Pending-count requester went away");
                }
            }
        }
    }

    fn dispatch(&mut self, bytes: &[u8]) {
        let message = match self.codec.decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                self.stats.inc_malformed_replies();
                debug!(error = %e, len = bytes.len(), "Discarding undecodable message");
                return;
            }
        };

        let request_id = message.header.request_id;
        if message.header.kind != MessageKind::Reply {
            self.stats.inc_malformed_replies();
            debug!(request_id, "Discarding non-reply message on client queue");
            return;
        }

        match self.pending.remove(&request_id) {
            Some(slot) => {
                // Counted before delivery so a woken caller sees its reply in the stats.
                self.stats.inc_replies_matched();
                if slot.try_send(message).is_ok() {
                    trace!(request_id, "Reply delivered");
                } else {
                    // Caller timed out before its cancel was processed.
                    self.stats.reclassify_matched_as_stale();
                    debug!(request_id, "Reply arrived after caller gave up");
                }
            }
            None => {
                self.stats.inc_stale_replies();
                debug!(request_id, "Discarding reply with no pending call");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MessageHeader;
    use crate::protocol::{Opcode, ReplyStatus};
    use crate::transport::{LocalTransport, QueueTransport};

    const POLL: Duration = Duration::from_millis(5);

    fn setup() -> IpcResult<(Arc<dyn MessageQueue>, ReceiveLoop, Arc<IpcStats>)> {
        let transport = LocalTransport::new();
        let inbound = transport.create_queue("client")?;
        let stats = Arc::new(IpcStats::new());
        let rx_loop = ReceiveLoop::spawn(
            Arc::clone(&inbound),
            MessageCodec::new(),
            Arc::clone(&stats),
            POLL,
        )?;
        Ok((inbound, rx_loop, stats))
    }

    fn reply_bytes(request_id: u32) -> IpcResult<Vec<u8>> {
        let request = MessageHeader::request(Opcode::Ping, request_id, 1, true);
        MessageCodec::new().encode(&MessageHeader::reply_to(&request, ReplyStatus::Ok), &())
    }

    #[test]
    fn test_reply_routed_to_registered_slot() -> IpcResult<()> {
        let (inbound, rx_loop, stats) = setup()?;
        let (slot, waiter) = channel::bounded(1);
        rx_loop.register(7, slot)?;
        inbound.try_send(&reply_bytes(7)?)?;

        let message = waiter
            .recv_timeout(Duration::from_secs(2))
            .map_err(|_e| IpcError::connection("no reply"))?;
        assert_eq!(message.header.request_id, 7);
        assert_eq!(rx_loop.pending_count(Duration::from_secs(2))?, 0);
        assert_eq!(stats.snapshot().replies_matched, 1);
        Ok(())
    }

    #[test]
    fn test_unknown_reply_is_discarded() -> IpcResult<()> {
        let (inbound, rx_loop, stats) = setup()?;
        inbound.try_send(&reply_bytes(99)?)?;
        inbound.try_send(b"garbage")?;

        assert!(handbridge_test_helpers::wait_until(Duration::from_secs(2), || {
            let s = stats.snapshot();
            s.stale_replies == 1 && s.malformed_replies == 1
        }));
        assert_eq!(rx_loop.pending_count(Duration::from_secs(2))?, 0);
        Ok(())
    }

    #[test]
    fn test_cancel_removes_slot() -> IpcResult<()> {
        let (_inbound, rx_loop, _stats) = setup()?;
        let (slot, _waiter) = channel::bounded(1);
        rx_loop.register(3, slot)?;
        assert_eq!(rx_loop.pending_count(Duration::from_secs(2))?, 1);

        rx_loop.cancel(3);
        assert_eq!(rx_loop.pending_count(Duration::from_secs(2))?, 0);
        Ok(())
    }

    #[test]
    fn test_duplicate_registration_rejected() -> IpcResult<()> {
        let (_inbound, rx_loop, _stats) = setup()?;
        let (first, _first_waiter) = channel::bounded(1);
        let (second, second_waiter) = channel::bounded::<Message>(1);
        rx_loop.register(5, first)?;
        rx_loop.register(5, second)?;

        assert!(matches!(
            second_waiter.recv_timeout(Duration::from_secs(2)),
            Err(channel::RecvTimeoutError::Disconnected)
        ));
        assert_eq!(rx_loop.pending_count(Duration::from_secs(2))?, 1);
        Ok(())
    }

    #[test]
    fn test_stop_wakes_waiters_and_is_idempotent() -> IpcResult<()> {
        let (_inbound, rx_loop, _stats) = setup()?;
        let (slot, waiter) = channel::bounded::<Message>(1);
        rx_loop.register(1, slot)?;
        rx_loop.stop();
        rx_loop.stop();

        assert!(!rx_loop.is_running());
        assert!(waiter.recv_timeout(Duration::from_secs(2)).is_err());
        let (late, _late_waiter) = channel::bounded(1);
        assert!(rx_loop.register(2, late).is_err());
        Ok(())
    }
}
