//! Request/reply IPC for the handbridge virtual-controller driver
//!
//! This crate implements the client side of a small request/reply protocol
//! spoken with an out-of-process driver over a pair of named message queues,
//! plus an in-process driver used for testing.
//!
//! # Architecture
//!
//! - [`client`]: [`IpcClient`] with connect/disconnect, modal and non-modal
//!   calls, and typed wrappers for every operation
//! - `receiver`: the per-connection receive loop that owns the pending-call
//!   table and routes replies by request id
//! - [`codec`]: 16-byte little-endian header plus bincode payload
//! - [`protocol`]: opcodes, reply statuses, property keys and payload types
//! - [`device`]: device pose and controller state carried on the wire
//! - [`transport`]: queue abstraction with in-process and Unix datagram
//!   implementations
//! - [`loopback`]: [`LoopbackDriver`], an in-process driver
//! - [`error`]: IPC-specific error types
//!
//! # Delivery model
//!
//! Queues provide no acknowledgement. A modal call registers a completion
//! slot with the receive loop before the request is written and waits up to
//! `call_timeout` for the matching reply; a reply that arrives after its
//! caller gave up is counted and discarded. Non-modal calls never wait.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use handbridge_ipc::prelude::*;
//!
//! fn run() -> IpcResult<()> {
//!     let transport = LocalTransport::new();
//!     let _driver = LoopbackDriver::start(Arc::new(transport.clone()), LoopbackConfig::default())?;
//!
//!     let client = IpcClient::new(IpcConfig::default(), Arc::new(transport));
//!     client.connect()?;
//!     let id = client.add_virtual_device(VirtualDeviceType::TrackedController, "hand_left", false)?;
//!     client.publish_virtual_device(id)?;
//!     client.disconnect();
//!     Ok(())
//! }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod client;
pub mod codec;
pub mod device;
pub mod error;
pub mod loopback;
pub mod prelude;
pub mod protocol;
mod receiver;
pub mod stats;
pub mod transport;

pub use client::{IpcClient, IpcConfig};
pub use codec::{Message, MessageCodec, MessageHeader};
pub use error::{IpcError, IpcResult};
pub use loopback::{LoopbackConfig, LoopbackDriver};
pub use protocol::{Opcode, ReplyStatus};
pub use transport::{MessageQueue, QueueTransport, TransportType};

/// Current wire protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// Well-known name of the driver's server queue
pub const DEFAULT_SERVER_QUEUE_NAME: &str = "handbridge.server";

/// Prefix of per-client reply queue names
pub const DEFAULT_CLIENT_QUEUE_PREFIX: &str = "handbridge.client";

/// Default maximum message size in bytes, header included
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4096;
