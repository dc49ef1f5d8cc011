//! In-process driver for tests and offline runs
//!
//! [`LoopbackDriver`] serves the driver side of the protocol on a server
//! queue: it performs the handshake, keeps a device table with the same
//! failure statuses a real driver reports, and records every pose and
//! controller update so tests can inspect what a client sent.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use handbridge_geometry::{Matrix3x4, Quaternion, Vector3};
use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info, trace, warn};

use crate::codec::{Message, MessageCodec, MessageHeader, MessageKind, encode_payload};
use crate::device::{ControllerState, DevicePose, VirtualDeviceType};
use crate::error::{IpcError, IpcResult};
use crate::protocol::{
    AddVirtualDeviceReply, AddVirtualDeviceRequest, ButtonMappingRequest, ClientConnectReply,
    ClientConnectRequest, DeviceRequest, DeviceToggleRequest, MotionCompensationEnableRequest,
    MotionCompensationModeRequest, OffsetTarget, Opcode, PingReply, PropertyValue,
    RemoveButtonMappingRequest, RemovePropertyRequest, ReplyStatus, RotationOffsetRequest,
    SetControllerStateRequest, SetPoseRequest, SetPropertyRequest, TranslationOffsetRequest,
    VelAccCompensationMode, VirtualDeviceCountReply, VirtualDeviceInfo,
};
use crate::transport::{MessageQueue, QueueTransport};
use crate::{DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_SERVER_QUEUE_NAME, PROTOCOL_VERSION};

/// Loopback driver configuration
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// Queue to serve
    pub server_queue: String,
    /// Device table capacity
    pub max_devices: usize,
    /// Version reported in handshakes; clients with another version are refused
    pub protocol_version: u32,
    /// Receive wait per loop iteration
    pub poll_interval: Duration,
    /// Largest message accepted or produced
    pub max_message_size: usize,
    /// Requests with these opcodes are processed but never answered
    pub silent_opcodes: HashSet<Opcode>,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            server_queue: DEFAULT_SERVER_QUEUE_NAME.to_string(),
            max_devices: 16,
            protocol_version: PROTOCOL_VERSION,
            poll_interval: Duration::from_millis(5),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            silent_opcodes: HashSet::new(),
        }
    }
}

/// One device as the loopback driver sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopbackDevice {
    /// Driver-assigned id
    pub device_id: u32,
    /// Kind of device
    pub device_type: VirtualDeviceType,
    /// Serial given at creation
    pub serial: String,
    /// Whether the device has been published
    pub published: bool,
    /// Current properties
    pub properties: BTreeMap<u32, PropertyValue>,
    /// Most recent pose, if any
    pub last_pose: Option<DevicePose>,
    /// Number of pose updates received
    pub pose_updates: u64,
    /// Most recent controller state, if any
    pub last_state: Option<ControllerState>,
    /// Number of controller-state updates received
    pub state_updates: u64,
    /// Whether button remapping is enabled
    pub button_mapping_enabled: bool,
    /// `button -> (target device, target button)`
    pub button_mappings: BTreeMap<u32, (u32, u32)>,
    /// Whether pose offsets are enabled
    pub offsets_enabled: bool,
    /// Rotation offsets by target
    pub rotation_offsets: HashMap<OffsetTarget, Quaternion>,
    /// Translation offsets by target
    pub translation_offsets: HashMap<OffsetTarget, Vector3>,
}

impl LoopbackDevice {
    fn new(device_id: u32, device_type: VirtualDeviceType, serial: String, published: bool) -> Self {
        Self {
            device_id,
            device_type,
            serial,
            published,
            properties: BTreeMap::new(),
            last_pose: None,
            pose_updates: 0,
            last_state: None,
            state_updates: 0,
            button_mapping_enabled: false,
            button_mappings: BTreeMap::new(),
            offsets_enabled: false,
            rotation_offsets: HashMap::new(),
            translation_offsets: HashMap::new(),
        }
    }
}

/// Motion compensation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionCompensation {
    /// Whether compensation is on
    pub enabled: bool,
    /// Reference device
    pub device_id: Option<u32>,
    /// Velocity/acceleration handling
    pub mode: VelAccCompensationMode,
}

#[derive(Default)]
struct DriverState {
    clients: HashMap<u32, Arc<dyn MessageQueue>>,
    next_client_id: u32,
    devices: Vec<LoopbackDevice>,
    opcode_counts: HashMap<Opcode, usize>,
    silent: HashSet<Opcode>,
    motion: MotionCompensation,
}

type Handled = Result<Vec<u8>, ReplyStatus>;

fn ok<T: Serialize>(payload: &T) -> Handled {
    encode_payload(payload).map_err(|_encode| ReplyStatus::UnknownError)
}

fn parse<T: DeserializeOwned>(message: &Message) -> Result<T, ReplyStatus> {
    message
        .payload_as()
        .map_err(|_decode| ReplyStatus::UnknownError)
}

impl DriverState {
    fn device_mut(&mut self, device_id: u32) -> Result<&mut LoopbackDevice, ReplyStatus> {
        self.devices
            .iter_mut()
            .find(|d| d.device_id == device_id)
            .ok_or(ReplyStatus::InvalidId)
    }

    fn set_property<T: DeserializeOwned>(
        &mut self,
        message: &Message,
        wrap: fn(T) -> PropertyValue,
    ) -> Handled {
        let request: SetPropertyRequest<T> = parse(message)?;
        let value = wrap(request.value);
        if let Some(expected) = request.property.expected_type() {
            if expected != value.property_type() {
                return Err(ReplyStatus::InvalidType);
            }
        }
        self.device_mut(request.device_id)?
            .properties
            .insert(request.property.0, value);
        ok(&())
    }

    fn handle(&mut self, opcode: Opcode, message: &Message, max_devices: usize) -> Handled {
        match opcode {
            Opcode::ClientConnect => Err(ReplyStatus::UnknownError),
            Opcode::ClientDisconnect => {
                self.clients.remove(&message.header.client_id);
                ok(&())
            }
            Opcode::Ping => ok(&PingReply {
                protocol_version: PROTOCOL_VERSION,
            }),
            Opcode::AddVirtualDevice => {
                let request: AddVirtualDeviceRequest = parse(message)?;
                if self.devices.iter().any(|d| d.serial == request.serial) {
                    return Err(ReplyStatus::AlreadyInUse);
                }
                if self.devices.len() >= max_devices {
                    return Err(ReplyStatus::TooManyDevices);
                }
                let device_id =
                    u32::try_from(self.devices.len()).map_err(|_full| ReplyStatus::TooManyDevices)?;
                self.devices.push(LoopbackDevice::new(
                    device_id,
                    request.device_type,
                    request.serial,
                    request.publish,
                ));
                ok(&AddVirtualDeviceReply { device_id })
            }
            Opcode::PublishVirtualDevice => {
                let request: DeviceRequest = parse(message)?;
                self.device_mut(request.device_id)?.published = true;
                ok(&())
            }
            Opcode::VirtualDeviceCount => ok(&VirtualDeviceCountReply {
                count: u32::try_from(self.devices.len()).unwrap_or(u32::MAX),
            }),
            Opcode::VirtualDeviceInfo => {
                let request: DeviceRequest = parse(message)?;
                let device = self.device_mut(request.device_id)?;
                ok(&VirtualDeviceInfo {
                    device_id: device.device_id,
                    device_type: device.device_type,
                    serial: device.serial.clone(),
                    published: device.published,
                })
            }
            Opcode::SetPropertyI32 => self.set_property::<i32>(message, PropertyValue::I32),
            Opcode::SetPropertyU64 => self.set_property::<u64>(message, PropertyValue::U64),
            Opcode::SetPropertyF32 => self.set_property::<f32>(message, PropertyValue::F32),
            Opcode::SetPropertyBool => self.set_property::<bool>(message, PropertyValue::Bool),
            Opcode::SetPropertyString => {
                self.set_property::<String>(message, PropertyValue::String)
            }
            Opcode::SetPropertyMatrix34 => {
                self.set_property::<Matrix3x4>(message, PropertyValue::Matrix34)
            }
            Opcode::RemoveProperty => {
                let request: RemovePropertyRequest = parse(message)?;
                self.device_mut(request.device_id)?
                    .properties
                    .remove(&request.property.0)
                    .ok_or(ReplyStatus::NotFound)?;
                ok(&())
            }
            Opcode::SetPose => {
                let request: SetPoseRequest = parse(message)?;
                let device = self.device_mut(request.device_id)?;
                device.last_pose = Some(request.pose);
                device.pose_updates += 1;
                ok(&())
            }
            Opcode::SetControllerState => {
                let request: SetControllerStateRequest = parse(message)?;
                let device = self.device_mut(request.device_id)?;
                device.last_state = Some(request.state);
                device.state_updates += 1;
                ok(&())
            }
            Opcode::EnableButtonMapping => {
                let request: DeviceToggleRequest = parse(message)?;
                self.device_mut(request.device_id)?.button_mapping_enabled = request.enable;
                ok(&())
            }
            Opcode::AddButtonMapping => {
                let request: ButtonMappingRequest = parse(message)?;
                self.device_mut(request.target_device_id)?;
                self.device_mut(request.device_id)?
                    .button_mappings
                    .insert(request.button, (request.target_device_id, request.target_button));
                ok(&())
            }
            Opcode::RemoveButtonMapping => {
                let request: RemoveButtonMappingRequest = parse(message)?;
                self.device_mut(request.device_id)?
                    .button_mappings
                    .remove(&request.button)
                    .ok_or(ReplyStatus::NotFound)?;
                ok(&())
            }
            Opcode::ClearButtonMappings => {
                let request: DeviceRequest = parse(message)?;
                self.device_mut(request.device_id)?.button_mappings.clear();
                ok(&())
            }
            Opcode::EnableDeviceOffsets => {
                let request: DeviceToggleRequest = parse(message)?;
                self.device_mut(request.device_id)?.offsets_enabled = request.enable;
                ok(&())
            }
            Opcode::SetRotationOffset => {
                let request: RotationOffsetRequest = parse(message)?;
                self.device_mut(request.device_id)?
                    .rotation_offsets
                    .insert(request.target, request.rotation);
                ok(&())
            }
            Opcode::SetTranslationOffset => {
                let request: TranslationOffsetRequest = parse(message)?;
                self.device_mut(request.device_id)?
                    .translation_offsets
                    .insert(request.target, request.translation);
                ok(&())
            }
            Opcode::MotionCompensationEnable => {
                let request: MotionCompensationEnableRequest = parse(message)?;
                self.motion.enabled = request.enable;
                ok(&())
            }
            Opcode::MotionCompensationDevice => {
                let request: DeviceRequest = parse(message)?;
                self.device_mut(request.device_id)?;
                self.motion.device_id = Some(request.device_id);
                ok(&())
            }
            Opcode::MotionCompensationVelAccMode => {
                let request: MotionCompensationModeRequest = parse(message)?;
                self.motion.mode = request.mode;
                ok(&())
            }
        }
    }
}

/// An in-process driver serving one server queue on its own thread.
pub struct LoopbackDriver {
    transport: Arc<dyn QueueTransport>,
    server_queue: String,
    state: Arc<Mutex<DriverState>>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for LoopbackDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackDriver")
            .field("server_queue", &self.server_queue)
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

struct Server {
    queue: Arc<dyn MessageQueue>,
    transport: Arc<dyn QueueTransport>,
    codec: MessageCodec,
    config: LoopbackConfig,
    state: Arc<Mutex<DriverState>>,
    running: Arc<AtomicBool>,
}

impl LoopbackDriver {
    /// Create the server queue and start serving it.
    ///
    /// # Errors
    ///
    /// Fails if the queue cannot be created or the thread cannot be spawned.
    pub fn start(transport: Arc<dyn QueueTransport>, config: LoopbackConfig) -> IpcResult<Self> {
        let queue = transport.create_queue(&config.server_queue)?;
        let state = Arc::new(Mutex::new(DriverState {
            next_client_id: 1,
            silent: config.silent_opcodes.clone(),
            ..DriverState::default()
        }));
        let running = Arc::new(AtomicBool::new(true));
        let server_queue = config.server_queue.clone();

        let server = Server {
            queue,
            transport: Arc::clone(&transport),
            codec: MessageCodec::with_max_size(config.max_message_size),
            config,
            state: Arc::clone(&state),
            running: Arc::clone(&running),
        };
        let handle = thread::Builder::new()
            .name("loopback-driver".to_string())
            .spawn(move || server.run())
            .map_err(|e| IpcError::connection(format!("Failed to spawn driver thread: {e}")))?;

        info!(queue = %server_queue, "Loopback driver started");
        Ok(Self {
            transport,
            server_queue,
            state,
            running,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Stop serving and remove the server queue. Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Loopback driver thread panicked");
            }
            if let Err(e) = self.transport.remove_queue(&self.server_queue) {
                warn!(error = %e, "Failed to remove server queue");
            }
            info!("Loopback driver stopped");
        }
    }

    /// Process requests with `opcode` but stop (or resume) answering them.
    pub fn set_silent(&self, opcode: Opcode, silent: bool) {
        let mut state = self.state.lock();
        if silent {
            state.silent.insert(opcode);
        } else {
            state.silent.remove(&opcode);
        }
    }

    /// Number of devices created so far
    pub fn device_count(&self) -> usize {
        self.state.lock().devices.len()
    }

    /// Snapshot of a device by id
    pub fn device(&self, device_id: u32) -> Option<LoopbackDevice> {
        self.state
            .lock()
            .devices
            .iter()
            .find(|d| d.device_id == device_id)
            .cloned()
    }

    /// Snapshot of a device by serial
    pub fn device_by_serial(&self, serial: &str) -> Option<LoopbackDevice> {
        self.state
            .lock()
            .devices
            .iter()
            .find(|d| d.serial == serial)
            .cloned()
    }

    /// How many requests with `opcode` were received
    pub fn opcode_count(&self, opcode: Opcode) -> usize {
        self.state
            .lock()
            .opcode_counts
            .get(&opcode)
            .copied()
            .unwrap_or(0)
    }

    /// Number of connected clients
    pub fn client_count(&self) -> usize {
        self.state.lock().clients.len()
    }

    /// Current motion compensation settings
    pub fn motion_compensation(&self) -> MotionCompensation {
        self.state.lock().motion
    }
}

impl Drop for LoopbackDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Server {
    fn run(self) {
        while self.running.load(Ordering::Acquire) {
            match self.queue.recv_timeout(self.config.poll_interval) {
                Ok(Some(bytes)) => self.process(&bytes),
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Server queue receive failed");
                    thread::sleep(self.config.poll_interval);
                }
            }
        }
    }

    fn process(&self, bytes: &[u8]) {
        let message = match self.codec.decode(bytes) {
            Ok(m) if m.header.kind == MessageKind::Request => m,
            Ok(_) => {
                debug!("Ignoring non-request message on server queue");
                return;
            }
            Err(e) => {
                debug!(error = %e, "Ignoring undecodable request");
                return;
            }
        };

        let opcode = message.opcode();
        if let Ok(op) = opcode {
            *self.state.lock().opcode_counts.entry(op).or_insert(0) += 1;
        }

        if opcode.as_ref().is_ok_and(|op| *op == Opcode::ClientConnect) {
            self.handshake(&message);
            return;
        }

        let (reply_queue, result, silent) = {
            let mut state = self.state.lock();
            let reply_queue = state.clients.get(&message.header.client_id).cloned();
            let result = match opcode {
                Ok(op) if reply_queue.is_some() => state.handle(op, &message, self.config.max_devices),
                Ok(_) => Err(ReplyStatus::InvalidId),
                Err(_) => Err(ReplyStatus::UnknownError),
            };
            let silent = opcode.as_ref().is_ok_and(|op| state.silent.contains(op));
            (reply_queue, result, silent)
        };

        let Some(reply_queue) = reply_queue else {
            warn!(client_id = message.header.client_id, "Request from unknown client");
            return;
        };
        if !message.header.reply_requested() || silent {
            return;
        }
        let (status, payload) = match result {
            Ok(payload) => (ReplyStatus::Ok, payload),
            Err(status) => (status, Vec::new()),
        };
        self.reply(reply_queue.as_ref(), &message.header, status, &payload);
    }

    fn handshake(&self, message: &Message) {
        let request: ClientConnectRequest = match message.payload_as() {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "Malformed handshake");
                return;
            }
        };
        let reply_queue = match self.transport.open_queue(&request.client_queue) {
            Ok(q) => q,
            Err(e) => {
                warn!(queue = %request.client_queue, error = %e, "Cannot open client queue");
                return;
            }
        };

        let version = self.config.protocol_version;
        let (status, client_id) = if request.protocol_version == version {
            let mut state = self.state.lock();
            let client_id = state.next_client_id;
            state.next_client_id = state.next_client_id.wrapping_add(1).max(1);
            state.clients.insert(client_id, Arc::clone(&reply_queue));
            (ReplyStatus::Ok, client_id)
        } else {
            warn!(
                client = request.protocol_version,
                driver = version,
                "Refusing client with mismatched protocol version"
            );
            (ReplyStatus::InvalidVersion, 0)
        };

        if self.state.lock().silent.contains(&Opcode::ClientConnect) {
            return;
        }
        match encode_payload(&ClientConnectReply {
            client_id,
            protocol_version: version,
        }) {
            Ok(payload) => self.reply(reply_queue.as_ref(), &message.header, status, &payload),
            Err(e) => warn!(error = %e, "Failed to encode handshake reply"),
        }
    }

    fn reply(&self, queue: &dyn MessageQueue, request: &MessageHeader, status: ReplyStatus, payload: &[u8]) {
        let header = MessageHeader::reply_to(request, status);
        let mut bytes = Vec::with_capacity(MessageHeader::SIZE + payload.len());
        bytes.extend_from_slice(&header.encode());
        bytes.extend_from_slice(payload);
        if bytes.len() > self.codec.max_message_size() {
            warn!(len = bytes.len(), "Reply too large; dropping");
            return;
        }
        match queue.try_send(&bytes) {
            Ok(()) => trace!(request_id = request.request_id, ?status, "Replied"),
            Err(e) => debug!(request_id = request.request_id, error = %e, "Reply not delivered"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalTransport;

    #[test]
    fn test_start_creates_and_stop_removes_queue() -> IpcResult<()> {
        let transport = LocalTransport::new();
        let driver = LoopbackDriver::start(Arc::new(transport.clone()), LoopbackConfig::default())?;
        assert!(transport.has_queue(DEFAULT_SERVER_QUEUE_NAME));

        driver.stop();
        driver.stop();
        assert!(!transport.has_queue(DEFAULT_SERVER_QUEUE_NAME));
        Ok(())
    }

    #[test]
    fn test_device_table_statuses() {
        let mut state = DriverState {
            next_client_id: 1,
            ..DriverState::default()
        };
        let add = |serial: &str| -> Message {
            let header = MessageHeader::request(Opcode::AddVirtualDevice, 1, 1, true);
            let payload = encode_payload(&AddVirtualDeviceRequest {
                device_type: VirtualDeviceType::TrackedController,
                serial: serial.to_string(),
                publish: false,
            })
            .unwrap_or_default();
            Message { header, payload }
        };

        assert!(state.handle(Opcode::AddVirtualDevice, &add("a"), 2).is_ok());
        assert_eq!(
            state.handle(Opcode::AddVirtualDevice, &add("a"), 2),
            Err(ReplyStatus::AlreadyInUse)
        );
        assert!(state.handle(Opcode::AddVirtualDevice, &add("b"), 2).is_ok());
        assert_eq!(
            state.handle(Opcode::AddVirtualDevice, &add("c"), 2),
            Err(ReplyStatus::TooManyDevices)
        );
    }
}
