//! Hand-tracking to virtual-controller pose pipeline
//!
//! [`HandBridge`] turns each tracking frame into a device pose and
//! controller state per hand, registers each hand's virtual controller with
//! the driver the first time the hand is seen, and pushes per-frame updates.
//!
//! # Overview
//!
//! - [`transform`]: the pure per-hand transform ([`transform_hand_sample`])
//! - [`trigger`]: index-finger bend to trigger axis and press
//! - [`hand`]: per-hand lifecycle, `Unregistered → Registering → Ready`
//! - [`bridge`]: the frame loop owning both hands
//! - [`ports`]: traits for the host runtime, tracking clock and driver client
//! - [`config`]: JSON-loadable settings
//!
//! # Failure policy
//!
//! A failed registration leaves the hand unregistered and is retried on a
//! later frame with the hand in view. Per-frame update failures are logged and
//! dropped. Neither stops frame processing.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use handbridge_geometry::{Matrix3x4, Vector3};
//! use handbridge_ipc::prelude::{IpcClient, IpcConfig, LocalTransport, LoopbackConfig, LoopbackDriver};
//! use handbridge_pipeline::prelude::*;
//!
//! struct Runtime;
//! impl HostRuntime for Runtime {
//!     fn device_to_world(&self, _device_index: u32, _prediction_seconds: f64) -> HeadPose {
//!         HeadPose::valid(Matrix3x4::IDENTITY)
//!     }
//! }
//!
//! struct Clock;
//! impl TrackingClock for Clock {
//!     fn now_us(&self) -> i64 {
//!         0
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = LocalTransport::new();
//! let _driver = LoopbackDriver::start(Arc::new(transport.clone()), LoopbackConfig::default())?;
//! let client = IpcClient::new(IpcConfig::default(), Arc::new(transport));
//! client.connect()?;
//!
//! let mut bridge = HandBridge::new(BridgeConfig::default(), client, Runtime, Clock)?;
//! let frame = TrackingFrame {
//!     timestamp_us: 0,
//!     hands: vec![HandSample::at_rest(Hand::Left, Vector3::new(0.0, 150.0, 0.0))],
//! };
//! let output = bridge.process_frame(&frame);
//! assert_eq!(output.hand(Hand::Left).hand_state, HandState::Ready);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![deny(unused_must_use)]
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod bridge;
pub mod config;
pub mod error;
pub mod hand;
pub mod ports;
pub mod prelude;
#[cfg(any(test, feature = "testing"))]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub mod testing;
pub mod transform;
pub mod trigger;
pub mod types;

pub use bridge::{BridgeStats, HandBridge};
pub use config::{BridgeConfig, HandConfig};
pub use error::{PipelineError, PipelineResult};
pub use ports::{HostRuntime, TrackingClock, VirtualDeviceClient};
pub use transform::transform_hand_sample;
pub use types::{FrameOutput, Hand, HandSample, HandState, HeadPose, TrackingFrame};
