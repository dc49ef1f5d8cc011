//! Seams to the collaborators the pipeline drives
//!
//! The tracking SDK, the host runtime and the driver connection live outside
//! this crate. Each is reached through a small trait so the pipeline can run
//! against the real services, the in-process loopback driver, or test doubles.

use std::sync::Arc;

use handbridge_ipc::device::{ControllerState, DevicePose, VirtualDeviceType};
use handbridge_ipc::protocol::{PropertyKey, PropertyValue};
use handbridge_ipc::{IpcClient, IpcResult};

use crate::types::HeadPose;

/// Host runtime pose query.
pub trait HostRuntime: Send + Sync {
    /// Device-to-world transform of `device_index` in raw tracking space,
    /// predicted `prediction_seconds` ahead.
    fn device_to_world(&self, device_index: u32, prediction_seconds: f64) -> HeadPose;
}

/// The tracking hardware's monotonic clock.
pub trait TrackingClock: Send + Sync {
    /// Current hardware time, microseconds.
    fn now_us(&self) -> i64;
}

/// The driver operations the pipeline issues.
///
/// Every method returns the client's typed error; the pipeline decides which
/// failures are fatal.
pub trait VirtualDeviceClient: Send + Sync {
    /// Create a virtual device and return its driver id.
    fn add_virtual_device(
        &self,
        device_type: VirtualDeviceType,
        serial: &str,
        publish: bool,
    ) -> IpcResult<u32>;

    /// Set one typed property.
    fn set_property(&self, device_id: u32, key: PropertyKey, value: &PropertyValue)
    -> IpcResult<()>;

    /// Make the device visible to the host runtime.
    fn publish_virtual_device(&self, device_id: u32) -> IpcResult<()>;

    /// Push a pose.
    fn set_pose(&self, device_id: u32, pose: &DevicePose, modal: bool) -> IpcResult<()>;

    /// Push buttons and axes.
    fn set_controller_state(
        &self,
        device_id: u32,
        state: &ControllerState,
        modal: bool,
    ) -> IpcResult<()>;
}

impl VirtualDeviceClient for IpcClient {
    fn add_virtual_device(
        &self,
        device_type: VirtualDeviceType,
        serial: &str,
        publish: bool,
    ) -> IpcResult<u32> {
        IpcClient::add_virtual_device(self, device_type, serial, publish)
    }

    fn set_property(
        &self,
        device_id: u32,
        key: PropertyKey,
        value: &PropertyValue,
    ) -> IpcResult<()> {
        match value {
            PropertyValue::I32(v) => self.set_virtual_device_property_i32(device_id, key, *v),
            PropertyValue::U64(v) => self.set_virtual_device_property_u64(device_id, key, *v),
            PropertyValue::F32(v) => self.set_virtual_device_property_f32(device_id, key, *v),
            PropertyValue::Bool(v) => self.set_virtual_device_property_bool(device_id, key, *v),
            PropertyValue::String(v) => {
                self.set_virtual_device_property_string(device_id, key, v)
            }
            PropertyValue::Matrix34(v) => {
                self.set_virtual_device_property_matrix34(device_id, key, v)
            }
        }
    }

    fn publish_virtual_device(&self, device_id: u32) -> IpcResult<()> {
        IpcClient::publish_virtual_device(self, device_id)
    }

    fn set_pose(&self, device_id: u32, pose: &DevicePose, modal: bool) -> IpcResult<()> {
        self.set_virtual_device_pose(device_id, pose, modal)
    }

    fn set_controller_state(
        &self,
        device_id: u32,
        state: &ControllerState,
        modal: bool,
    ) -> IpcResult<()> {
        self.set_virtual_controller_state(device_id, state, modal)
    }
}

impl<T: VirtualDeviceClient + ?Sized> VirtualDeviceClient for Arc<T> {
    fn add_virtual_device(
        &self,
        device_type: VirtualDeviceType,
        serial: &str,
        publish: bool,
    ) -> IpcResult<u32> {
        (**self).add_virtual_device(device_type, serial, publish)
    }

    fn set_property(
        &self,
        device_id: u32,
        key: PropertyKey,
        value: &PropertyValue,
    ) -> IpcResult<()> {
        (**self).set_property(device_id, key, value)
    }

    fn publish_virtual_device(&self, device_id: u32) -> IpcResult<()> {
        (**self).publish_virtual_device(device_id)
    }

    fn set_pose(&self, device_id: u32, pose: &DevicePose, modal: bool) -> IpcResult<()> {
        (**self).set_pose(device_id, pose, modal)
    }

    fn set_controller_state(
        &self,
        device_id: u32,
        state: &ControllerState,
        modal: bool,
    ) -> IpcResult<()> {
        (**self).set_controller_state(device_id, state, modal)
    }
}

impl<T: HostRuntime + ?Sized> HostRuntime for Arc<T> {
    fn device_to_world(&self, device_index: u32, prediction_seconds: f64) -> HeadPose {
        (**self).device_to_world(device_index, prediction_seconds)
    }
}

impl<T: TrackingClock + ?Sized> TrackingClock for Arc<T> {
    fn now_us(&self) -> i64 {
        (**self).now_us()
    }
}
