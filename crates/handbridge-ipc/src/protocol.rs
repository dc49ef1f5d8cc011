//! Opcodes, reply status codes, property keys and request/reply payloads

use handbridge_geometry::{Matrix3x4, Quaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::device::{ControllerState, DevicePose, VirtualDeviceType};
use crate::error::IpcError;

/// Operation selector carried in every message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum Opcode {
    /// Handshake: protocol version and the client's reply queue
    ClientConnect = 1,
    /// Client is going away
    ClientDisconnect = 2,
    /// Liveness check
    Ping = 3,
    /// Create a virtual device
    AddVirtualDevice = 10,
    /// Make a device visible to the runtime
    PublishVirtualDevice = 11,
    /// Number of devices the driver hosts
    VirtualDeviceCount = 12,
    /// Details of one device
    VirtualDeviceInfo = 13,
    /// Set an `i32` property
    SetPropertyI32 = 20,
    /// Set a `u64` property
    SetPropertyU64 = 21,
    /// Set an `f32` property
    SetPropertyF32 = 22,
    /// Set a `bool` property
    SetPropertyBool = 23,
    /// Set a string property
    SetPropertyString = 24,
    /// Set a 3×4 matrix property
    SetPropertyMatrix34 = 25,
    /// Remove a property
    RemoveProperty = 26,
    /// Update a device pose
    SetPose = 30,
    /// Update a controller's buttons and axes
    SetControllerState = 31,
    /// Turn button remapping on or off for a device
    EnableButtonMapping = 40,
    /// Add one button mapping
    AddButtonMapping = 41,
    /// Remove one button mapping
    RemoveButtonMapping = 42,
    /// Remove all mappings of a device
    ClearButtonMappings = 43,
    /// Turn pose offsets on or off for a device
    EnableDeviceOffsets = 50,
    /// Set a rotation offset
    SetRotationOffset = 51,
    /// Set a translation offset
    SetTranslationOffset = 52,
    /// Turn motion compensation on or off
    MotionCompensationEnable = 60,
    /// Pick the motion compensation reference device
    MotionCompensationDevice = 61,
    /// Pick how velocity and acceleration are compensated
    MotionCompensationVelAccMode = 62,
}

impl Opcode {
    /// Every opcode, in wire order.
    pub const ALL: [Opcode; 26] = [
        Opcode::ClientConnect,
        Opcode::ClientDisconnect,
        Opcode::Ping,
        Opcode::AddVirtualDevice,
        Opcode::PublishVirtualDevice,
        Opcode::VirtualDeviceCount,
        Opcode::VirtualDeviceInfo,
        Opcode::SetPropertyI32,
        Opcode::SetPropertyU64,
        Opcode::SetPropertyF32,
        Opcode::SetPropertyBool,
        Opcode::SetPropertyString,
        Opcode::SetPropertyMatrix34,
        Opcode::RemoveProperty,
        Opcode::SetPose,
        Opcode::SetControllerState,
        Opcode::EnableButtonMapping,
        Opcode::AddButtonMapping,
        Opcode::RemoveButtonMapping,
        Opcode::ClearButtonMappings,
        Opcode::EnableDeviceOffsets,
        Opcode::SetRotationOffset,
        Opcode::SetTranslationOffset,
        Opcode::MotionCompensationEnable,
        Opcode::MotionCompensationDevice,
        Opcode::MotionCompensationVelAccMode,
    ];

    /// Wire value.
    #[must_use]
    pub const fn code(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for Opcode {
    type Error = IpcError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Opcode::ALL
            .into_iter()
            .find(|op| op.code() == code)
            .ok_or_else(|| IpcError::Decoding(format!("unknown opcode {code}")))
    }
}

/// Status the driver puts in every reply header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum ReplyStatus {
    /// Success
    Ok = 0,
    /// Unspecified failure
    UnknownError = 1,
    /// Unknown device id
    InvalidId = 2,
    /// Property value has the wrong type
    InvalidType = 3,
    /// Entry does not exist
    NotFound = 4,
    /// Serial already registered
    AlreadyInUse = 5,
    /// Device table full
    TooManyDevices = 6,
    /// Protocol version mismatch
    InvalidVersion = 7,
}

impl ReplyStatus {
    /// Parse a raw status code.
    #[must_use]
    pub const fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(ReplyStatus::Ok),
            1 => Some(ReplyStatus::UnknownError),
            2 => Some(ReplyStatus::InvalidId),
            3 => Some(ReplyStatus::InvalidType),
            4 => Some(ReplyStatus::NotFound),
            5 => Some(ReplyStatus::AlreadyInUse),
            6 => Some(ReplyStatus::TooManyDevices),
            7 => Some(ReplyStatus::InvalidVersion),
            _ => None,
        }
    }

    /// Wire value.
    #[must_use]
    pub const fn code(self) -> i16 {
        self as i16
    }
}

/// Value type of a device property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    /// `i32`
    I32,
    /// `u64`
    U64,
    /// `f32`
    F32,
    /// `bool`
    Bool,
    /// UTF-8 string
    String,
    /// 3×4 matrix
    Matrix34,
}

impl PropertyType {
    /// Opcode used to set a property of this type.
    #[must_use]
    pub const fn set_opcode(self) -> Opcode {
        match self {
            PropertyType::I32 => Opcode::SetPropertyI32,
            PropertyType::U64 => Opcode::SetPropertyU64,
            PropertyType::F32 => Opcode::SetPropertyF32,
            PropertyType::Bool => Opcode::SetPropertyBool,
            PropertyType::String => Opcode::SetPropertyString,
            PropertyType::Matrix34 => Opcode::SetPropertyMatrix34,
        }
    }
}

/// Device property identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyKey(pub u32);

impl PropertyKey {
    /// Tracking system name (string)
    pub const TRACKING_SYSTEM_NAME: Self = Self(1000);
    /// Model number (string)
    pub const MODEL_NUMBER: Self = Self(1001);
    /// Serial number (string)
    pub const SERIAL_NUMBER: Self = Self(1002);
    /// Render model name (string)
    pub const RENDER_MODEL_NAME: Self = Self(1003);
    /// Whether the device drifts in yaw (bool)
    pub const WILL_DRIFT_IN_YAW: Self = Self(1004);
    /// Manufacturer name (string)
    pub const MANUFACTURER_NAME: Self = Self(1005);
    /// Whether the device is wireless (bool)
    pub const DEVICE_IS_WIRELESS: Self = Self(1010);
    /// Whether the device is charging (bool)
    pub const DEVICE_IS_CHARGING: Self = Self(1011);
    /// Battery charge in `[0, 1]` (f32)
    pub const BATTERY_PERCENTAGE: Self = Self(1012);
    /// Device class (i32, see [`crate::device::DeviceClass`])
    pub const DEVICE_CLASS: Self = Self(1029);
    /// Controller role hint (i32, see [`crate::device::ControllerRole`])
    pub const CONTROLLER_ROLE_HINT: Self = Self(1037);
    /// Camera-to-head transform (matrix)
    pub const CAMERA_TO_HEAD_TRANSFORM: Self = Self(2016);
    /// Supported button mask (u64)
    pub const SUPPORTED_BUTTONS: Self = Self(3001);
    /// Axis 0 type (i32, see [`crate::device::AxisType`])
    pub const AXIS0_TYPE: Self = Self(3002);
    /// Axis 1 type (i32)
    pub const AXIS1_TYPE: Self = Self(3003);

    /// Type the driver requires for well-known keys. Unknown keys accept any type.
    #[must_use]
    pub const fn expected_type(self) -> Option<PropertyType> {
        match self.0 {
            1000..=1003 | 1005 => Some(PropertyType::String),
            1004 | 1010 | 1011 => Some(PropertyType::Bool),
            1012 => Some(PropertyType::F32),
            1029 | 1037 | 3002 | 3003 => Some(PropertyType::I32),
            2016 => Some(PropertyType::Matrix34),
            3001 => Some(PropertyType::U64),
            _ => None,
        }
    }
}

/// A typed property value, as stored by a driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// `i32`
    I32(i32),
    /// `u64`
    U64(u64),
    /// `f32`
    F32(f32),
    /// `bool`
    Bool(bool),
    /// String
    String(String),
    /// Matrix
    Matrix34(Matrix3x4),
}

impl PropertyValue {
    /// Type tag of the value.
    #[must_use]
    pub const fn property_type(&self) -> PropertyType {
        match self {
            PropertyValue::I32(_) => PropertyType::I32,
            PropertyValue::U64(_) => PropertyType::U64,
            PropertyValue::F32(_) => PropertyType::F32,
            PropertyValue::Bool(_) => PropertyType::Bool,
            PropertyValue::String(_) => PropertyType::String,
            PropertyValue::Matrix34(_) => PropertyType::Matrix34,
        }
    }
}

/// Which pose offset a rotation/translation offset request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OffsetTarget {
    /// The device's world-from-driver transform
    WorldFromDriver,
    /// The device's driver-from-head transform
    DriverFromHead,
    /// The device's own pose
    Device,
}

/// How motion compensation treats velocity and acceleration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VelAccCompensationMode {
    /// Pass through unchanged
    #[default]
    Default,
    /// Zero them
    SetZero,
    /// Subtract the reference device's motion
    SubtractReference,
}

/// `ClientConnect` request payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConnectRequest {
    /// Client's protocol version
    pub protocol_version: u32,
    /// Queue the driver should reply on
    pub client_queue: String,
}

/// `ClientConnect` reply payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConnectReply {
    /// Id the driver assigned to this client
    pub client_id: u32,
    /// Driver's protocol version
    pub protocol_version: u32,
}

/// `Ping` reply payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingReply {
    /// Driver's protocol version
    pub protocol_version: u32,
}

/// Payload for requests addressing a single device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRequest {
    /// Driver-assigned device id
    pub device_id: u32,
}

/// `AddVirtualDevice` request payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddVirtualDeviceRequest {
    /// Kind of device
    pub device_type: VirtualDeviceType,
    /// Unique serial chosen by the caller
    pub serial: String,
    /// Publish immediately
    pub publish: bool,
}

/// `AddVirtualDevice` reply payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddVirtualDeviceReply {
    /// Driver-assigned device id
    pub device_id: u32,
}

/// `VirtualDeviceCount` reply payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualDeviceCountReply {
    /// Number of devices
    pub count: u32,
}

/// `VirtualDeviceInfo` reply payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualDeviceInfo {
    /// Driver-assigned device id
    pub device_id: u32,
    /// Kind of device
    pub device_type: VirtualDeviceType,
    /// Serial given at creation
    pub serial: String,
    /// Whether the device has been published
    pub published: bool,
}

/// `SetProperty*` request payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetPropertyRequest<T> {
    /// Target device
    pub device_id: u32,
    /// Property key
    pub property: PropertyKey,
    /// New value
    pub value: T,
}

/// `RemoveProperty` request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovePropertyRequest {
    /// Target device
    pub device_id: u32,
    /// Property key
    pub property: PropertyKey,
}

/// `SetPose` request payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetPoseRequest {
    /// Target device
    pub device_id: u32,
    /// New pose
    pub pose: DevicePose,
}

/// `SetControllerState` request payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetControllerStateRequest {
    /// Target device
    pub device_id: u32,
    /// New button/axis state
    pub state: ControllerState,
}

/// Payload for enable/disable toggles addressed to one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceToggleRequest {
    /// Target device
    pub device_id: u32,
    /// New state
    pub enable: bool,
}

/// `AddButtonMapping` request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonMappingRequest {
    /// Device whose button is remapped
    pub device_id: u32,
    /// Source button id
    pub button: u32,
    /// Device that receives the mapped press
    pub target_device_id: u32,
    /// Button id on the target device
    pub target_button: u32,
}

/// `RemoveButtonMapping` request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveButtonMappingRequest {
    /// Device whose mapping is removed
    pub device_id: u32,
    /// Source button id
    pub button: u32,
}

/// `SetRotationOffset` request payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotationOffsetRequest {
    /// Target device
    pub device_id: u32,
    /// Which transform the offset applies to
    pub target: OffsetTarget,
    /// Offset rotation
    pub rotation: Quaternion,
}

/// `SetTranslationOffset` request payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TranslationOffsetRequest {
    /// Target device
    pub device_id: u32,
    /// Which transform the offset applies to
    pub target: OffsetTarget,
    /// Offset translation in metres
    pub translation: Vector3,
}

/// `MotionCompensationEnable` request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionCompensationEnableRequest {
    /// New state
    pub enable: bool,
}

/// `MotionCompensationVelAccMode` request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionCompensationModeRequest {
    /// New mode
    pub mode: VelAccCompensationMode,
}
