//! Prelude module for convenient imports

pub use crate::client::{IpcClient, IpcConfig};
pub use crate::codec::{Message, MessageCodec, MessageHeader, MessageKind, message_flags};
pub use crate::device::{
    AxisType, ControllerAxis, ControllerRole, ControllerState, DeviceClass, DevicePose,
    TrackingResult, VirtualDeviceType, buttons,
};
pub use crate::error::{IpcError, IpcResult};
pub use crate::loopback::{LoopbackConfig, LoopbackDevice, LoopbackDriver, MotionCompensation};
pub use crate::protocol::{
    OffsetTarget, Opcode, PropertyKey, PropertyType, PropertyValue, ReplyStatus,
    VelAccCompensationMode, VirtualDeviceInfo,
};
pub use crate::stats::{IpcStats, StatsSnapshot};
#[cfg(unix)]
pub use crate::transport::UnixDatagramTransport;
pub use crate::transport::{
    LocalTransport, MessageQueue, QueueTransport, TransportBuilder, TransportConfig,
    TransportType,
};
pub use crate::{
    DEFAULT_CLIENT_QUEUE_PREFIX, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_SERVER_QUEUE_NAME,
    PROTOCOL_VERSION,
};
