//! Queue transport abstraction for IPC
//!
//! The protocol runs over a pair of named, message-oriented queues: a
//! well-known server queue the driver reads, and a per-client queue the
//! driver replies on. Queues carry whole messages, may drop or reorder
//! nothing within one sender, and give no delivery guarantees beyond that.

use std::sync::Arc;
use std::time::Duration;

#[cfg(unix)]
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::DEFAULT_MAX_MESSAGE_SIZE;
use crate::error::IpcResult;

mod local;
#[cfg(unix)]
mod unix;

pub use local::LocalTransport;
#[cfg(unix)]
pub use unix::UnixDatagramTransport;

/// Default number of messages a queue buffers before sends fail
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// One end of a named message queue.
pub trait MessageQueue: Send + Sync {
    /// Queue name
    fn name(&self) -> &str;

    /// Send one message without blocking. A full or vanished queue is an error.
    fn try_send(&self, bytes: &[u8]) -> IpcResult<()>;

    /// Wait up to `timeout` for the next message. `Ok(None)` means the wait
    /// elapsed with nothing to read.
    fn recv_timeout(&self, timeout: Duration) -> IpcResult<Option<Vec<u8>>>;
}

/// Factory for named queues.
pub trait QueueTransport: Send + Sync {
    /// Open an existing queue for sending. Fails with a connection error when
    /// no queue of that name exists.
    fn open_queue(&self, name: &str) -> IpcResult<Arc<dyn MessageQueue>>;

    /// Create a queue owned by the caller, who will read from it.
    fn create_queue(&self, name: &str) -> IpcResult<Arc<dyn MessageQueue>>;

    /// Remove a queue created with [`QueueTransport::create_queue`]. Removing
    /// a queue that does not exist is not an error.
    fn remove_queue(&self, name: &str) -> IpcResult<()>;

    /// Get the transport type
    fn transport_type(&self) -> TransportType;
}

/// Transport type configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportType {
    /// In-process channels; both ends must share the same transport instance
    Local,
    /// Unix datagram sockets, one socket file per queue (Unix only)
    #[cfg(unix)]
    UnixDatagram {
        /// Directory holding the socket files
        base_dir: PathBuf,
    },
}

impl TransportType {
    /// Create a Unix datagram transport rooted at `base_dir`
    #[cfg(unix)]
    pub fn unix_datagram(base_dir: impl Into<PathBuf>) -> Self {
        TransportType::UnixDatagram {
            base_dir: base_dir.into(),
        }
    }

    /// Get the default transport for the current platform
    pub fn platform_default() -> Self {
        #[cfg(unix)]
        {
            TransportType::UnixDatagram {
                base_dir: std::env::temp_dir().join("handbridge"),
            }
        }
        #[cfg(not(unix))]
        {
            TransportType::Local
        }
    }

    /// Get a human-readable description of the transport
    pub fn description(&self) -> String {
        match self {
            TransportType::Local => "in-process channels".to_string(),
            #[cfg(unix)]
            TransportType::UnixDatagram { base_dir } => {
                format!("Unix datagram sockets in {}", base_dir.display())
            }
        }
    }
}

impl Default for TransportType {
    fn default() -> Self {
        Self::platform_default()
    }
}

/// Transport configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Transport type
    pub transport: TransportType,
    /// Messages buffered per queue (in-process transport only)
    pub queue_capacity: usize,
    /// Largest message a queue accepts, header included
    pub max_message_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            transport: TransportType::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl TransportConfig {
    /// Instantiate the configured transport.
    ///
    /// For [`TransportType::Local`] this creates a fresh, empty registry; the
    /// driver and client must share the returned handle.
    pub fn build_transport(&self) -> Arc<dyn QueueTransport> {
        match &self.transport {
            TransportType::Local => Arc::new(LocalTransport::with_config(self.clone())),
            #[cfg(unix)]
            TransportType::UnixDatagram { base_dir } => {
                Arc::new(UnixDatagramTransport::new(base_dir.clone(), self.max_message_size))
            }
        }
    }
}

/// Transport builder for creating transports with configuration
#[derive(Debug, Default)]
pub struct TransportBuilder {
    config: TransportConfig,
}

impl TransportBuilder {
    /// Create a new transport builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the transport type
    pub fn transport(mut self, transport: TransportType) -> Self {
        self.config.transport = transport;
        self
    }

    /// Set the per-queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Set the maximum message size
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Build the configuration
    pub fn build(self) -> TransportConfig {
        self.config
    }
}
