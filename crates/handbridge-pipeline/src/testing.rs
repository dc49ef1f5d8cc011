//! Test doubles for the pipeline's collaborators
//!
//! [`RecordingClient`] records every driver call and can inject failures;
//! [`StaticHostRuntime`] and [`FixedClock`] return whatever the test sets.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicUsize, Ordering};

use handbridge_geometry::Matrix3x4;
use handbridge_ipc::device::{ControllerState, DevicePose, VirtualDeviceType};
use handbridge_ipc::protocol::{PropertyKey, PropertyValue};
use handbridge_ipc::{IpcError, IpcResult};
use parking_lot::Mutex;

use crate::ports::{HostRuntime, TrackingClock, VirtualDeviceClient};
use crate::types::HeadPose;

/// Operation class of a recorded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// `add_virtual_device`
    AddVirtualDevice,
    /// `set_property`
    SetProperty,
    /// `publish_virtual_device`
    Publish,
    /// `set_pose`
    SetPose,
    /// `set_controller_state`
    SetControllerState,
}

/// One call seen by [`RecordingClient`], successful or not.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    /// Device creation
    AddVirtualDevice {
        /// Requested type
        device_type: VirtualDeviceType,
        /// Requested serial
        serial: String,
        /// Publish immediately
        publish: bool,
    },
    /// Property write
    SetProperty {
        /// Target device
        device_id: u32,
        /// Property key
        key: PropertyKey,
        /// Value
        value: PropertyValue,
    },
    /// Publish
    Publish {
        /// Target device
        device_id: u32,
    },
    /// Pose update
    SetPose {
        /// Target device
        device_id: u32,
        /// Pose
        pose: DevicePose,
        /// Modal flag
        modal: bool,
    },
    /// Controller state update
    SetControllerState {
        /// Target device
        device_id: u32,
        /// State
        state: ControllerState,
        /// Modal flag
        modal: bool,
    },
}

impl RecordedCall {
    /// Operation class.
    #[must_use]
    pub fn kind(&self) -> CallKind {
        match self {
            RecordedCall::AddVirtualDevice { .. } => CallKind::AddVirtualDevice,
            RecordedCall::SetProperty { .. } => CallKind::SetProperty,
            RecordedCall::Publish { .. } => CallKind::Publish,
            RecordedCall::SetPose { .. } => CallKind::SetPose,
            RecordedCall::SetControllerState { .. } => CallKind::SetControllerState,
        }
    }
}

/// In-memory [`VirtualDeviceClient`] that records calls.
///
/// Device ids are handed out from 0 in creation order. Failures can be
/// injected once ([`Self::fail_next`]) or persistently ([`Self::set_failing`]).
#[derive(Debug, Default)]
pub struct RecordingClient {
    calls: Mutex<Vec<RecordedCall>>,
    next_device_id: AtomicU32,
    one_shot: Mutex<HashMap<CallKind, VecDeque<IpcError>>>,
    failing: Mutex<HashSet<CallKind>>,
}

impl RecordingClient {
    /// An empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call of `kind` with `error`.
    pub fn fail_next(&self, kind: CallKind, error: IpcError) {
        self.one_shot.lock().entry(kind).or_default().push_back(error);
    }

    /// Fail every call of `kind` with a connection error until cleared.
    pub fn set_failing(&self, kind: CallKind, failing: bool) {
        let mut set = self.failing.lock();
        if failing {
            set.insert(kind);
        } else {
            set.remove(&kind);
        }
    }

    /// Every call so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Number of calls of `kind`.
    #[must_use]
    pub fn count(&self, kind: CallKind) -> usize {
        self.calls.lock().iter().filter(|c| c.kind() == kind).count()
    }

    /// Properties written to `device_id`, in order.
    #[must_use]
    pub fn properties(&self, device_id: u32) -> Vec<(PropertyKey, PropertyValue)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                RecordedCall::SetProperty {
                    device_id: id,
                    key,
                    value,
                } if *id == device_id => Some((*key, value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Last value written to `key` on `device_id`.
    #[must_use]
    pub fn property(&self, device_id: u32, key: PropertyKey) -> Option<PropertyValue> {
        self.properties(device_id)
            .into_iter()
            .rev()
            .find_map(|(k, v)| (k == key).then_some(v))
    }

    /// Poses pushed to `device_id`, in order.
    #[must_use]
    pub fn poses(&self, device_id: u32) -> Vec<DevicePose> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                RecordedCall::SetPose {
                    device_id: id,
                    pose,
                    ..
                } if *id == device_id => Some(*pose),
                _ => None,
            })
            .collect()
    }

    /// Controller states pushed to `device_id`, in order.
    #[must_use]
    pub fn states(&self, device_id: u32) -> Vec<ControllerState> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                RecordedCall::SetControllerState {
                    device_id: id,
                    state,
                    ..
                } if *id == device_id => Some(*state),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded calls. Injected failures and the id counter stay.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: RecordedCall) -> IpcResult<()> {
        let kind = call.kind();
        self.calls.lock().push(call);
        if let Some(error) = self.one_shot.lock().get_mut(&kind).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        if self.failing.lock().contains(&kind) {
            return Err(IpcError::connection(format!("injected {kind:?} failure")));
        }
        Ok(())
    }
}

impl VirtualDeviceClient for RecordingClient {
    fn add_virtual_device(
        &self,
        device_type: VirtualDeviceType,
        serial: &str,
        publish: bool,
    ) -> IpcResult<u32> {
        self.record(RecordedCall::AddVirtualDevice {
            device_type,
            serial: serial.to_string(),
            publish,
        })?;
        Ok(self.next_device_id.fetch_add(1, Ordering::Relaxed))
    }

    fn set_property(
        &self,
        device_id: u32,
        key: PropertyKey,
        value: &PropertyValue,
    ) -> IpcResult<()> {
        self.record(RecordedCall::SetProperty {
            device_id,
            key,
            value: value.clone(),
        })
    }

    fn publish_virtual_device(&self, device_id: u32) -> IpcResult<()> {
        self.record(RecordedCall::Publish { device_id })
    }

    fn set_pose(&self, device_id: u32, pose: &DevicePose, modal: bool) -> IpcResult<()> {
        self.record(RecordedCall::SetPose {
            device_id,
            pose: *pose,
            modal,
        })
    }

    fn set_controller_state(
        &self,
        device_id: u32,
        state: &ControllerState,
        modal: bool,
    ) -> IpcResult<()> {
        self.record(RecordedCall::SetControllerState {
            device_id,
            state: *state,
            modal,
        })
    }
}

/// [`HostRuntime`] returning a settable head pose.
#[derive(Debug)]
pub struct StaticHostRuntime {
    head: Mutex<HeadPose>,
    queries: AtomicUsize,
}

impl StaticHostRuntime {
    /// A runtime reporting `head`.
    #[must_use]
    pub fn new(head: HeadPose) -> Self {
        Self {
            head: Mutex::new(head),
            queries: AtomicUsize::new(0),
        }
    }

    /// A runtime reporting a valid identity head pose.
    #[must_use]
    pub fn identity() -> Self {
        Self::new(HeadPose::valid(Matrix3x4::IDENTITY))
    }

    /// Change the reported head pose.
    pub fn set_head(&self, head: HeadPose) {
        *self.head.lock() = head;
    }

    /// Number of pose queries so far.
    #[must_use]
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }
}

impl HostRuntime for StaticHostRuntime {
    fn device_to_world(&self, _device_index: u32, _prediction_seconds: f64) -> HeadPose {
        self.queries.fetch_add(1, Ordering::Relaxed);
        *self.head.lock()
    }
}

/// [`TrackingClock`] that only moves when told to.
#[derive(Debug, Default)]
pub struct FixedClock {
    now_us: AtomicI64,
}

impl FixedClock {
    /// A clock reading `now_us`.
    #[must_use]
    pub fn new(now_us: i64) -> Self {
        Self {
            now_us: AtomicI64::new(now_us),
        }
    }

    /// Set the current time.
    pub fn set(&self, now_us: i64) {
        self.now_us.store(now_us, Ordering::Relaxed);
    }

    /// Move the clock forward.
    pub fn advance(&self, delta_us: i64) {
        self.now_us.fetch_add(delta_us, Ordering::Relaxed);
    }
}

impl TrackingClock for FixedClock {
    fn now_us(&self) -> i64 {
        self.now_us.load(Ordering::Relaxed)
    }
}
