//! Request/reply IPC client
//!
//! [`IpcClient`] connects to a driver's well-known server queue, creates its
//! own reply queue, and runs a receive loop that routes replies back to
//! waiting callers. Calls are either modal (block until the matching reply or
//! `call_timeout`) or fire-and-forget.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError};
use handbridge_geometry::{Matrix3x4, Quaternion, Vector3};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::codec::{Message, MessageCodec, MessageHeader};
use crate::device::{ControllerState, DevicePose, VirtualDeviceType};
use crate::error::{IpcError, IpcResult};
use crate::protocol::{
    AddVirtualDeviceReply, AddVirtualDeviceRequest, ButtonMappingRequest, ClientConnectReply,
    ClientConnectRequest, DeviceRequest, DeviceToggleRequest, MotionCompensationEnableRequest,
    MotionCompensationModeRequest, OffsetTarget, Opcode, PingReply, PropertyKey, PropertyType,
    RemoveButtonMappingRequest, RemovePropertyRequest, RotationOffsetRequest, SetControllerStateRequest,
    SetPoseRequest, SetPropertyRequest, TranslationOffsetRequest, VelAccCompensationMode,
    VirtualDeviceCountReply, VirtualDeviceInfo,
};
use crate::receiver::ReceiveLoop;
use crate::stats::{IpcStats, StatsSnapshot};
use crate::transport::{MessageQueue, QueueTransport, TransportConfig};
use crate::{DEFAULT_CLIENT_QUEUE_PREFIX, DEFAULT_SERVER_QUEUE_NAME, PROTOCOL_VERSION};

/// IPC client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcConfig {
    /// Name of the driver's server queue
    pub server_queue: String,
    /// Prefix of this client's reply queue; a random suffix is appended
    pub client_queue_prefix: String,
    /// How long a modal call waits for its reply
    pub call_timeout: Duration,
    /// Upper bound on one receive-loop wait; also bounds shutdown latency
    pub recv_poll_interval: Duration,
    /// Transport settings
    pub transport: TransportConfig,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            server_queue: DEFAULT_SERVER_QUEUE_NAME.to_string(),
            client_queue_prefix: DEFAULT_CLIENT_QUEUE_PREFIX.to_string(),
            call_timeout: Duration::from_millis(1000),
            recv_poll_interval: Duration::from_millis(50),
            transport: TransportConfig::default(),
        }
    }
}

impl IpcConfig {
    /// Set the server queue name
    pub fn with_server_queue(mut self, name: impl Into<String>) -> Self {
        self.server_queue = name.into();
        self
    }

    /// Set the modal call timeout
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the receive-loop poll interval
    pub fn with_recv_poll_interval(mut self, interval: Duration) -> Self {
        self.recv_poll_interval = interval;
        self
    }

    /// Set the transport settings
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }
}

struct Connection {
    server: Arc<dyn MessageQueue>,
    client_queue: String,
    client_id: u32,
    driver_version: u32,
    receiver: ReceiveLoop,
}

/// Client side of the driver protocol.
///
/// All methods take `&self`; the client can be shared between threads and
/// any number of modal calls may be in flight at once.
pub struct IpcClient {
    config: IpcConfig,
    transport: Arc<dyn QueueTransport>,
    codec: MessageCodec,
    next_request_id: AtomicU32,
    stats: Arc<IpcStats>,
    // Held only to read or swap the connection, never across a call.
    connection: Mutex<Option<Arc<Connection>>>,
    // Serialises `connect`; the handshake runs under this lock alone.
    connect_lock: Mutex<()>,
}

impl std::fmt::Debug for IpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcClient")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl IpcClient {
    /// Create a disconnected client over `transport`.
    pub fn new(config: IpcConfig, transport: Arc<dyn QueueTransport>) -> Self {
        let codec = MessageCodec::with_max_size(config.transport.max_message_size);
        Self {
            config,
            transport,
            codec,
            next_request_id: AtomicU32::new(1),
            stats: Arc::new(IpcStats::new()),
            connection: Mutex::new(None),
            connect_lock: Mutex::new(()),
        }
    }

    /// Create a disconnected client using the transport named in `config`.
    pub fn from_config(config: IpcConfig) -> Self {
        let transport = config.transport.build_transport();
        Self::new(config, transport)
    }

    /// Client configuration
    pub fn config(&self) -> &IpcConfig {
        &self.config
    }

    /// Whether `connect` has completed and `disconnect` has not been called.
    pub fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .as_ref()
            .is_some_and(|conn| conn.receiver.is_running())
    }

    /// Id the driver assigned during the handshake.
    pub fn client_id(&self) -> Option<u32> {
        self.connection.lock().as_ref().map(|conn| conn.client_id)
    }

    /// Counter snapshot
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Connect to the driver. Calling this while connected is a no-op.
    ///
    /// Other methods stay responsive during the handshake: until it
    /// completes they behave as if the client were disconnected.
    ///
    /// # Errors
    ///
    /// [`IpcError::Connection`] when the server queue does not exist, the
    /// handshake times out, or the driver speaks a different protocol version.
    pub fn connect(&self) -> IpcResult<()> {
        let _connecting = self.connect_lock.lock();
        if self.connection.lock().is_some() {
            return Ok(());
        }

        let server = self.transport.open_queue(&self.config.server_queue)?;
        let client_queue = format!(
            "{}-{}",
            self.config.client_queue_prefix,
            Uuid::new_v4().simple()
        );
        let inbound = self.transport.create_queue(&client_queue)?;
        let receiver = match ReceiveLoop::spawn(
            inbound,
            self.codec,
            Arc::clone(&self.stats),
            self.config.recv_poll_interval,
        ) {
            Ok(receiver) => receiver,
            Err(e) => {
                self.remove_client_queue(&client_queue);
                return Err(e);
            }
        };

        let handshake = ClientConnectRequest {
            protocol_version: PROTOCOL_VERSION,
            client_queue: client_queue.clone(),
        };
        let result = self
            .exchange(server.as_ref(), &receiver, 0, Opcode::ClientConnect, &handshake, true)
            .and_then(|reply| match reply {
                Some(reply) => reply.payload_as::<ClientConnectReply>(),
                None => Err(IpcError::connection("handshake produced no reply")),
            })
            .and_then(|reply| {
                if reply.protocol_version == PROTOCOL_VERSION {
                    Ok(reply)
                } else {
                    Err(IpcError::connection(format!(
                        "driver protocol version {} does not match client version {}",
                        reply.protocol_version, PROTOCOL_VERSION
                    )))
                }
            });

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                receiver.stop();
                self.remove_client_queue(&client_queue);
                warn!(error = %e, "Driver handshake failed");
                return Err(match e {
                    IpcError::Decoding(_) | IpcError::Encoding(_) => {
                        IpcError::connection(format!("handshake failed: {e}"))
                    }
                    other => other,
                });
            }
        };

        info!(
            client_id = reply.client_id,
            queue = %client_queue,
            transport = %self.transport.transport_type().description(),
            "Connected to driver"
        );
        *self.connection.lock() = Some(Arc::new(Connection {
            server,
            client_queue,
            client_id: reply.client_id,
            driver_version: reply.protocol_version,
            receiver,
        }));
        Ok(())
    }

    /// Say goodbye, stop the receive loop and remove the reply queue.
    /// Calling this while disconnected is a no-op.
    pub fn disconnect(&self) {
        let Some(conn) = self.connection.lock().take() else {
            return;
        };

        if let Err(e) = self.exchange(
            conn.server.as_ref(),
            &conn.receiver,
            conn.client_id,
            Opcode::ClientDisconnect,
            &(),
            false,
        ) {
            debug!(error = %e, "Disconnect notice not delivered");
        }
        conn.receiver.stop();
        self.remove_client_queue(&conn.client_queue);
        info!(client_id = conn.client_id, "Disconnected from driver");
    }

    /// Send `payload` under `opcode`.
    ///
    /// Modal calls block until the matching reply arrives or `call_timeout`
    /// elapses and return the reply; non-modal calls return `Ok(None)` as soon
    /// as the request is queued.
    ///
    /// # Errors
    ///
    /// [`IpcError::Connection`] when not connected, on send failure, or on
    /// timeout; a typed error for any non-OK driver status.
    pub fn call<P: Serialize + ?Sized>(
        &self,
        opcode: Opcode,
        payload: &P,
        modal: bool,
    ) -> IpcResult<Option<Message>> {
        let conn = self.active()?;
        self.exchange(
            conn.server.as_ref(),
            &conn.receiver,
            conn.client_id,
            opcode,
            payload,
            modal,
        )
    }

    /// Number of modal calls currently waiting for a reply.
    ///
    /// # Errors
    ///
    /// [`IpcError::Connection`] when not connected.
    pub fn pending_calls(&self) -> IpcResult<usize> {
        let conn = self.active()?;
        conn.receiver.pending_count(self.config.call_timeout)
    }

    /// Protocol version the driver reported at connect time.
    ///
    /// # Errors
    ///
    /// [`IpcError::Connection`] when not connected.
    pub fn driver_protocol_version(&self) -> IpcResult<u32> {
        Ok(self.active()?.driver_version)
    }

    /// Round-trip a `Ping`, returning the driver's protocol version.
    ///
    /// # Errors
    ///
    /// [`IpcError::Connection`] when not connected or on timeout.
    pub fn ping(&self) -> IpcResult<u32> {
        let reply: PingReply = self.call_modal(Opcode::Ping, &())?;
        Ok(reply.protocol_version)
    }

    /// Create a virtual device and return its driver-assigned id.
    ///
    /// # Errors
    ///
    /// [`IpcError::AlreadyInUse`] for a duplicate serial,
    /// [`IpcError::TooManyDevices`] when the driver is full, otherwise as for
    /// [`Self::call`].
    pub fn add_virtual_device(
        &self,
        device_type: VirtualDeviceType,
        serial: &str,
        publish: bool,
    ) -> IpcResult<u32> {
        let request = AddVirtualDeviceRequest {
            device_type,
            serial: serial.to_string(),
            publish,
        };
        let reply: AddVirtualDeviceReply = self.call_modal(Opcode::AddVirtualDevice, &request)?;
        Ok(reply.device_id)
    }

    /// Make a device visible to the host runtime.
    ///
    /// # Errors
    ///
    /// [`IpcError::InvalidId`] for an unknown device, otherwise as for [`Self::call`].
    pub fn publish_virtual_device(&self, device_id: u32) -> IpcResult<()> {
        self.call_modal(Opcode::PublishVirtualDevice, &DeviceRequest { device_id })
    }

    /// Number of devices the driver hosts.
    ///
    /// # Errors
    ///
    /// [`IpcError::Connection`] when not connected or on timeout.
    pub fn virtual_device_count(&self) -> IpcResult<u32> {
        let reply: VirtualDeviceCountReply = self.call_modal(Opcode::VirtualDeviceCount, &())?;
        Ok(reply.count)
    }

    /// Details of one device.
    ///
    /// # Errors
    ///
    /// [`IpcError::InvalidId`] for an unknown device, otherwise as for [`Self::call`].
    pub fn virtual_device_info(&self, device_id: u32) -> IpcResult<VirtualDeviceInfo> {
        self.call_modal(Opcode::VirtualDeviceInfo, &DeviceRequest { device_id })
    }

    /// Set an `i32` property.
    ///
    /// # Errors
    ///
    /// [`IpcError::InvalidId`] for an unknown device, [`IpcError::InvalidType`]
    /// when the driver expects another type for `property`, otherwise as for
    /// [`Self::call`].
    pub fn set_virtual_device_property_i32(
        &self,
        device_id: u32,
        property: PropertyKey,
        value: i32,
    ) -> IpcResult<()> {
        self.set_property(PropertyType::I32, device_id, property, value)
    }

    /// Set a `u64` property.
    ///
    /// # Errors
    ///
    /// [`IpcError::InvalidId`] for an unknown device, [`IpcError::InvalidType`]
    /// when the driver expects another type for `property`, otherwise as for
    /// [`Self::call`].
    pub fn set_virtual_device_property_u64(
        &self,
        device_id: u32,
        property: PropertyKey,
        value: u64,
    ) -> IpcResult<()> {
        self.set_property(PropertyType::U64, device_id, property, value)
    }

    /// Set an `f32` property.
    ///
    /// # Errors
    ///
    /// [`IpcError::InvalidId`] for an unknown device, [`IpcError::InvalidType`]
    /// when the driver expects another type for `property`, otherwise as for
    /// [`Self::call`].
    pub fn set_virtual_device_property_f32(
        &self,
        device_id: u32,
        property: PropertyKey,
        value: f32,
    ) -> IpcResult<()> {
        self.set_property(PropertyType::F32, device_id, property, value)
    }

    /// Set a `bool` property.
    ///
    /// # Errors
    ///
    /// [`IpcError::InvalidId`] for an unknown device, [`IpcError::InvalidType`]
    /// when the driver expects another type for `property`, otherwise as for
    /// [`Self::call`].
    pub fn set_virtual_device_property_bool(
        &self,
        device_id: u32,
        property: PropertyKey,
        value: bool,
    ) -> IpcResult<()> {
        self.set_property(PropertyType::Bool, device_id, property, value)
    }

    /// Set a string property.
    ///
    /// # Errors
    ///
    /// [`IpcError::InvalidId`] for an unknown device, [`IpcError::InvalidType`]
    /// when the driver expects another type for `property`, otherwise as for
    /// [`Self::call`].
    pub fn set_virtual_device_property_string(
        &self,
        device_id: u32,
        property: PropertyKey,
        value: &str,
    ) -> IpcResult<()> {
        self.set_property(PropertyType::String, device_id, property, value)
    }

    /// Set a matrix property.
    ///
    /// # Errors
    ///
    /// [`IpcError::InvalidId`] for an unknown device, [`IpcError::InvalidType`]
    /// when the driver expects another type for `property`, otherwise as for
    /// [`Self::call`].
    pub fn set_virtual_device_property_matrix34(
        &self,
        device_id: u32,
        property: PropertyKey,
        value: &Matrix3x4,
    ) -> IpcResult<()> {
        self.set_property(PropertyType::Matrix34, device_id, property, value)
    }

    /// Remove a property.
    ///
    /// # Errors
    ///
    /// [`IpcError::InvalidId`] for an unknown device, [`IpcError::NotFound`]
    /// when the property is not set, otherwise as for [`Self::call`].
    pub fn remove_virtual_device_property(
        &self,
        device_id: u32,
        property: PropertyKey,
    ) -> IpcResult<()> {
        self.call_modal(
            Opcode::RemoveProperty,
            &RemovePropertyRequest {
                device_id,
                property,
            },
        )
    }

    /// Push a device pose.
    ///
    /// # Errors
    ///
    /// As for [`Self::call`]; a non-modal push only reports send failures.
    pub fn set_virtual_device_pose(
        &self,
        device_id: u32,
        pose: &DevicePose,
        modal: bool,
    ) -> IpcResult<()> {
        let request = SetPoseRequest {
            device_id,
            pose: *pose,
        };
        self.call_unit(Opcode::SetPose, &request, modal)
    }

    /// Push a controller's buttons and axes.
    ///
    /// # Errors
    ///
    /// As for [`Self::call`]; a non-modal push only reports send failures.
    pub fn set_virtual_controller_state(
        &self,
        device_id: u32,
        state: &ControllerState,
        modal: bool,
    ) -> IpcResult<()> {
        let request = SetControllerStateRequest {
            device_id,
            state: *state,
        };
        self.call_unit(Opcode::SetControllerState, &request, modal)
    }

    /// Turn button remapping on or off for a device.
    ///
    /// # Errors
    ///
    /// [`IpcError::InvalidId`] for an unknown device, otherwise as for [`Self::call`].
    pub fn enable_button_mapping(&self, device_id: u32, enable: bool) -> IpcResult<()> {
        self.call_modal(
            Opcode::EnableButtonMapping,
            &DeviceToggleRequest { device_id, enable },
        )
    }

    /// Map `button` of `device_id` onto `target_button` of `target_device_id`.
    ///
    /// # Errors
    ///
    /// [`IpcError::InvalidId`] when either device is unknown, otherwise as for
    /// [`Self::call`].
    pub fn add_button_mapping(
        &self,
        device_id: u32,
        button: u32,
        target_device_id: u32,
        target_button: u32,
    ) -> IpcResult<()> {
        let request = ButtonMappingRequest {
            device_id,
            button,
            target_device_id,
            target_button,
        };
        self.call_modal(Opcode::AddButtonMapping, &request)
    }

    /// Remove the mapping of one button.
    ///
    /// # Errors
    ///
    /// [`IpcError::InvalidId`] for an unknown device, otherwise as for [`Self::call`].
    pub fn remove_button_mapping(&self, device_id: u32, button: u32) -> IpcResult<()> {
        self.call_modal(
            Opcode::RemoveButtonMapping,
            &RemoveButtonMappingRequest { device_id, button },
        )
    }

    /// Remove every mapping of a device.
    ///
    /// # Errors
    ///
    /// [`IpcError::InvalidId`] for an unknown device, otherwise as for [`Self::call`].
    pub fn clear_button_mappings(&self, device_id: u32) -> IpcResult<()> {
        self.call_modal(Opcode::ClearButtonMappings, &DeviceRequest { device_id })
    }

    /// Turn pose offsets on or off for a device.
    ///
    /// # Errors
    ///
    /// [`IpcError::InvalidId`] for an unknown device, otherwise as for [`Self::call`].
    pub fn enable_device_offsets(&self, device_id: u32, enable: bool) -> IpcResult<()> {
        self.call_modal(
            Opcode::EnableDeviceOffsets,
            &DeviceToggleRequest { device_id, enable },
        )
    }

    /// Set the rotation offset applied to `target`.
    ///
    /// # Errors
    ///
    /// [`IpcError::InvalidId`] for an unknown device, otherwise as for [`Self::call`].
    pub fn set_rotation_offset(
        &self,
        device_id: u32,
        target: OffsetTarget,
        rotation: Quaternion,
    ) -> IpcResult<()> {
        let request = RotationOffsetRequest {
            device_id,
            target,
            rotation,
        };
        self.call_modal(Opcode::SetRotationOffset, &request)
    }

    /// Set the translation offset applied to `target`.
    ///
    /// # Errors
    ///
    /// [`IpcError::InvalidId`] for an unknown device, otherwise as for [`Self::call`].
    pub fn set_translation_offset(
        &self,
        device_id: u32,
        target: OffsetTarget,
        translation: Vector3,
    ) -> IpcResult<()> {
        let request = TranslationOffsetRequest {
            device_id,
            target,
            translation,
        };
        self.call_modal(Opcode::SetTranslationOffset, &request)
    }

    /// Turn motion compensation on or off.
    ///
    /// # Errors
    ///
    /// As for [`Self::call`].
    pub fn set_motion_compensation_enabled(&self, enable: bool) -> IpcResult<()> {
        self.call_modal(
            Opcode::MotionCompensationEnable,
            &MotionCompensationEnableRequest { enable },
        )
    }

    /// Pick the device whose motion is compensated for.
    ///
    /// # Errors
    ///
    /// [`IpcError::InvalidId`] for an unknown device, otherwise as for [`Self::call`].
    pub fn set_motion_compensation_device(&self, device_id: u32) -> IpcResult<()> {
        self.call_modal(Opcode::MotionCompensationDevice, &DeviceRequest { device_id })
    }

    /// Pick how velocity and acceleration are compensated.
    ///
    /// # Errors
    ///
    /// As for [`Self::call`].
    pub fn set_motion_compensation_vel_acc_mode(
        &self,
        mode: VelAccCompensationMode,
    ) -> IpcResult<()> {
        self.call_modal(
            Opcode::MotionCompensationVelAccMode,
            &MotionCompensationModeRequest { mode },
        )
    }

    fn set_property<T: Serialize>(
        &self,
        ty: PropertyType,
        device_id: u32,
        property: PropertyKey,
        value: T,
    ) -> IpcResult<()> {
        let request = SetPropertyRequest {
            device_id,
            property,
            value,
        };
        self.call_modal(ty.set_opcode(), &request)
    }

    fn call_modal<P, R>(&self, opcode: Opcode, payload: &P) -> IpcResult<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        match self.call(opcode, payload, true)? {
            Some(reply) => reply.payload_as(),
            None => Err(IpcError::connection("modal call returned without a reply")),
        }
    }

    fn call_unit<P: Serialize + ?Sized>(
        &self,
        opcode: Opcode,
        payload: &P,
        modal: bool,
    ) -> IpcResult<()> {
        self.call(opcode, payload, modal).map(|_reply| ())
    }

    fn active(&self) -> IpcResult<Arc<Connection>> {
        self.connection
            .lock()
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| IpcError::connection("not connected"))
    }

    fn next_request_id(&self) -> u32 {
        loop {
            let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    fn exchange<P: Serialize + ?Sized>(
        &self,
        server: &dyn MessageQueue,
        receiver: &ReceiveLoop,
        client_id: u32,
        opcode: Opcode,
        payload: &P,
        modal: bool,
    ) -> IpcResult<Option<Message>> {
        let request_id = self.next_request_id();
        let header = MessageHeader::request(opcode, request_id, client_id, modal);
        let bytes = self.codec.encode(&header, payload)?;

        if !modal {
            self.send(server, request_id, &bytes)?;
            trace!(request_id, ?opcode, "Sent non-modal request");
            return Ok(None);
        }

        let (slot, waiter) = channel::bounded(1);
        receiver.register(request_id, slot)?;
        if let Err(e) = self.send(server, request_id, &bytes) {
            receiver.cancel(request_id);
            return Err(e);
        }
        trace!(request_id, ?opcode, "Sent modal request");

        match waiter.recv_timeout(self.config.call_timeout) {
            Ok(reply) => match IpcError::from_status(reply.status()) {
                None => Ok(Some(reply)),
                Some(err) => {
                    debug!(request_id, ?opcode, status = reply.status(), "Driver rejected request");
                    Err(err)
                }
            },
            Err(RecvTimeoutError::Timeout) => {
                receiver.cancel(request_id);
                self.stats.inc_timeouts();
                warn!(request_id, ?opcode, "Timed out waiting for reply");
                Err(IpcError::timeout(self.config.call_timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(IpcError::connection(
                "reply slot closed before a reply arrived",
            )),
        }
    }

    fn send(&self, server: &dyn MessageQueue, request_id: u32, bytes: &[u8]) -> IpcResult<()> {
        match server.try_send(bytes) {
            Ok(()) => {
                self.stats.inc_requests_sent();
                Ok(())
            }
            Err(e) => {
                self.stats.inc_send_failures();
                debug!(request_id, error = %e, "Request send failed");
                Err(match e {
                    IpcError::Connection { .. } => e,
                    other => IpcError::connection(format!("send failed: {other}")),
                })
            }
        }
    }

    fn remove_client_queue(&self, name: &str) {
        if let Err(e) = self.transport.remove_queue(name) {
            warn!(queue = name, error = %e, "Failed to remove client queue");
        }
    }
}

impl Drop for IpcClient {
    fn drop(&mut self) {
        if self.connection.lock().is_some() {
            debug!("IpcClient dropped while connected - disconnecting");
            self.disconnect();
        }
    }
}
