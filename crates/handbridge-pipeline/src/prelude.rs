//! Prelude module for convenient imports

pub use crate::bridge::{BridgeStats, HandBridge};
pub use crate::config::{BridgeConfig, HandConfig, OffsetConfig, TriggerConfig};
pub use crate::error::{PipelineError, PipelineResult};
pub use crate::hand::{HandSlot, SUPPORTED_BUTTON_MASK, registration_properties};
pub use crate::ports::{HostRuntime, TrackingClock, VirtualDeviceClient};
pub use crate::transform::{map_hardware_vector, time_offset_seconds, transform_hand_sample};
pub use crate::trigger::{TriggerReading, bend_factor, trigger_from_bend};
pub use crate::types::{
    FINGER_BONE_COUNT, FrameOutput, Hand, HandOutput, HandSample, HandState, HeadPose,
    TrackingFrame, VirtualDeviceRecord,
};
