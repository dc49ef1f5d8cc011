//! In-process queues backed by bounded crossbeam channels

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::debug;

use super::{MessageQueue, QueueTransport, TransportConfig, TransportType};
use crate::error::{IpcError, IpcResult};

struct LocalQueue {
    name: String,
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    removed: AtomicBool,
    max_message_size: usize,
}

impl MessageQueue for LocalQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_send(&self, bytes: &[u8]) -> IpcResult<()> {
        if self.removed.load(Ordering::Acquire) {
            return Err(IpcError::connection(format!("queue '{}' was removed", self.name)));
        }
        if bytes.len() > self.max_message_size {
            return Err(IpcError::Encoding(format!(
                "Message size {} exceeds queue limit {}",
                bytes.len(),
                self.max_message_size
            )));
        }
        match self.tx.try_send(bytes.to_vec()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                Err(IpcError::connection(format!("queue '{}' is full", self.name)))
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(IpcError::connection(format!("queue '{}' is closed", self.name)))
            }
        }
    }

    fn recv_timeout(&self, timeout: Duration) -> IpcResult<Option<Vec<u8>>> {
        match self.rx.recv_timeout(timeout) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(IpcError::connection(format!("queue '{}' is closed", self.name)))
            }
        }
    }
}

/// In-process transport. Cloning shares the queue registry, so a driver and
/// a client created from clones of one `LocalTransport` can talk to each other.
#[derive(Clone)]
pub struct LocalTransport {
    queues: Arc<Mutex<HashMap<String, Arc<LocalQueue>>>>,
    config: TransportConfig,
}

impl std::fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTransport")
            .field("queues", &self.queues.lock().keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish()
    }
}

impl LocalTransport {
    /// Create an empty registry with default limits.
    pub fn new() -> Self {
        Self::with_config(TransportConfig {
            transport: TransportType::Local,
            ..TransportConfig::default()
        })
    }

    /// Create an empty registry with the given capacity and size limits.
    pub fn with_config(config: TransportConfig) -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Whether a queue of that name currently exists.
    pub fn has_queue(&self, name: &str) -> bool {
        self.queues.lock().contains_key(name)
    }

    /// Number of live queues.
    pub fn queue_count(&self) -> usize {
        self.queues.lock().len()
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueTransport for LocalTransport {
    fn open_queue(&self, name: &str) -> IpcResult<Arc<dyn MessageQueue>> {
        let queues = self.queues.lock();
        let queue = queues
            .get(name)
            .ok_or_else(|| IpcError::connection(format!("queue '{name}' does not exist")))?;
        Ok(Arc::clone(queue) as Arc<dyn MessageQueue>)
    }

    fn create_queue(&self, name: &str) -> IpcResult<Arc<dyn MessageQueue>> {
        let mut queues = self.queues.lock();
        if queues.contains_key(name) {
            return Err(IpcError::connection(format!("queue '{name}' already exists")));
        }
        let (tx, rx) = channel::bounded(self.config.queue_capacity.max(1));
        let queue = Arc::new(LocalQueue {
            name: name.to_string(),
            tx,
            rx,
            removed: AtomicBool::new(false),
            max_message_size: self.config.max_message_size,
        });
        queues.insert(name.to_string(), Arc::clone(&queue));
        debug!(queue = name, "Created local queue");
        Ok(queue as Arc<dyn MessageQueue>)
    }

    fn remove_queue(&self, name: &str) -> IpcResult<()> {
        if let Some(queue) = self.queues.lock().remove(name) {
            queue.removed.store(true, Ordering::Release);
            debug!(queue = name, "Removed local queue");
        }
        Ok(())
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Local
    }
}
