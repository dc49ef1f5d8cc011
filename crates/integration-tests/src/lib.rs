//! End-to-end test support for handbridge
//!
//! Fixtures for building tracking frames and a rig that wires an
//! [`IpcClient`] to an in-process [`LoopbackDriver`] over a
//! [`LocalTransport`].

#![deny(rust_2018_idioms)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::print_stdout)]

pub mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use handbridge_ipc::prelude::*;
use handbridge_pipeline::prelude::*;
use handbridge_pipeline::testing::{FixedClock, StaticHostRuntime};
use tracing::info;

/// Modal call timeout used by rigs; generous so slow CI machines pass.
pub const RIG_CALL_TIMEOUT: Duration = Duration::from_millis(1000);

/// Receive-loop poll interval used by rigs.
pub const RIG_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// A connected client and the driver it talks to.
#[derive(Debug)]
pub struct LoopbackRig {
    /// Shared in-process transport
    pub transport: LocalTransport,
    /// The driver
    pub driver: LoopbackDriver,
    /// Connected client
    pub client: Arc<IpcClient>,
}

impl LoopbackRig {
    /// Start a driver with `driver_config` and connect a client to it.
    pub fn start(driver_config: LoopbackConfig) -> Result<Self> {
        let transport = LocalTransport::new();
        let driver = LoopbackDriver::start(Arc::new(transport.clone()), driver_config)?;
        let config = IpcConfig::default()
            .with_call_timeout(RIG_CALL_TIMEOUT)
            .with_recv_poll_interval(RIG_POLL_INTERVAL);
        let client = Arc::new(IpcClient::new(config, Arc::new(transport.clone())));
        client.connect()?;
        info!(client_id = ?client.client_id(), "Loopback rig connected");
        Ok(Self {
            transport,
            driver,
            client,
        })
    }

    /// Start with the default driver configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::start(LoopbackConfig::default())
    }

    /// A bridge over this rig's client with an identity head pose.
    pub fn bridge(
        &self,
        config: BridgeConfig,
    ) -> Result<HandBridge<Arc<IpcClient>, StaticHostRuntime, FixedClock>> {
        Ok(HandBridge::new(
            config,
            Arc::clone(&self.client),
            StaticHostRuntime::identity(),
            FixedClock::new(0),
        )?)
    }
}
