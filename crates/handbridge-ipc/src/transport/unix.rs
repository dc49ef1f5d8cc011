//! Unix datagram socket queues
//!
//! Each named queue is a bound `SOCK_DGRAM` socket at `<base_dir>/<name>.sock`.
//! Senders use an unbound, non-blocking socket and `send_to`, so a full
//! receive buffer surfaces as an immediate error rather than a stall.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::time::Duration;

use std::sync::Arc;

use tracing::{debug, warn};

use super::{MessageQueue, QueueTransport, TransportType};
use crate::error::{IpcError, IpcResult};

const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

struct UnixQueue {
    name: String,
    path: PathBuf,
    socket: UnixDatagram,
    owned: bool,
    max_message_size: usize,
}

impl MessageQueue for UnixQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_send(&self, bytes: &[u8]) -> IpcResult<()> {
        if bytes.len() > self.max_message_size {
            return Err(IpcError::Encoding(format!(
                "Message size {} exceeds queue limit {}",
                bytes.len(),
                self.max_message_size
            )));
        }
        match self.socket.send_to(bytes, &self.path) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                Err(IpcError::connection(format!("queue '{}' is full", self.name)))
            }
            Err(e) => Err(IpcError::connection(format!(
                "send to queue '{}' failed: {e}",
                self.name
            ))),
        }
    }

    fn recv_timeout(&self, timeout: Duration) -> IpcResult<Option<Vec<u8>>> {
        if !self.owned {
            return Err(IpcError::connection(format!(
                "queue '{}' was opened for sending only",
                self.name
            )));
        }
        self.socket
            .set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))?;

        // One spare byte detects datagrams longer than the limit.
        let mut buf = vec![0u8; self.max_message_size + 1];
        match self.socket.recv(&mut buf) {
            Ok(n) if n > self.max_message_size => {
                warn!(queue = %self.name, "Dropping oversized datagram");
                Ok(None)
            }
            Ok(n) => {
                buf.truncate(n);
                Ok(Some(buf))
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for UnixQueue {
    fn drop(&mut self) {
        if self.owned {
            if let Err(e) = fs::remove_file(&self.path) {
                if e.kind() != ErrorKind::NotFound {
                    debug!(path = %self.path.display(), error = %e, "Failed to remove socket file");
                }
            }
        }
    }
}

/// Datagram-socket transport for talking to a driver in another process.
#[derive(Debug, Clone)]
pub struct UnixDatagramTransport {
    base_dir: PathBuf,
    max_message_size: usize,
}

impl UnixDatagramTransport {
    /// Create a transport whose socket files live in `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>, max_message_size: usize) -> Self {
        Self {
            base_dir: base_dir.into(),
            max_message_size,
        }
    }

    /// Directory holding the socket files.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn socket_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(format!("{name}.sock"))
    }
}

impl QueueTransport for UnixDatagramTransport {
    fn open_queue(&self, name: &str) -> IpcResult<Arc<dyn MessageQueue>> {
        let path = self.socket_path(name);
        if !path.exists() {
            return Err(IpcError::connection(format!(
                "queue '{name}' does not exist at {}",
                path.display()
            )));
        }
        let socket = UnixDatagram::unbound()?;
        socket.set_nonblocking(true)?;
        Ok(Arc::new(UnixQueue {
            name: name.to_string(),
            path,
            socket,
            owned: false,
            max_message_size: self.max_message_size,
        }) as Arc<dyn MessageQueue>)
    }

    fn create_queue(&self, name: &str) -> IpcResult<Arc<dyn MessageQueue>> {
        fs::create_dir_all(&self.base_dir)?;
        let path = self.socket_path(name);
        if path.exists() {
            // Left behind by a process that did not shut down cleanly.
            debug!(path = %path.display(), "Replacing stale socket file");
            fs::remove_file(&path)?;
        }
        let socket = UnixDatagram::bind(&path)?;
        debug!(queue = name, path = %path.display(), "Bound datagram queue");
        Ok(Arc::new(UnixQueue {
            name: name.to_string(),
            path,
            socket,
            owned: true,
            max_message_size: self.max_message_size,
        }) as Arc<dyn MessageQueue>)
    }

    fn remove_queue(&self, name: &str) -> IpcResult<()> {
        match fs::remove_file(self.socket_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn transport_type(&self) -> TransportType {
        TransportType::UnixDatagram {
            base_dir: self.base_dir.clone(),
        }
    }
}
