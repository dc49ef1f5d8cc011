//! Frame, sample and output types

use std::fmt;

use handbridge_geometry::{Matrix3x4, Vector3};
use handbridge_ipc::device::{ControllerRole, ControllerState, DevicePose, VirtualDeviceType};
use serde::{Deserialize, Serialize};

/// Number of bone directions reported for a finger.
pub const FINGER_BONE_COUNT: usize = 4;

/// Which hand a sample or device belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hand {
    /// Left hand
    Left,
    /// Right hand
    Right,
}

impl Hand {
    /// Both hands in slot order.
    pub const ALL: [Hand; 2] = [Hand::Left, Hand::Right];

    /// Slot index (`0` left, `1` right).
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Hand::Left => 0,
            Hand::Right => 1,
        }
    }

    /// Role hint sent to the driver.
    #[must_use]
    pub const fn role(self) -> ControllerRole {
        match self {
            Hand::Left => ControllerRole::LeftHand,
            Hand::Right => ControllerRole::RightHand,
        }
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Hand::Left => "left",
            Hand::Right => "right",
        }
    }
}

impl fmt::Display for Hand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked hand, in the tracking hardware's axis convention
/// (X right, Y up, Z toward the user) and units (millimetres).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandSample {
    /// Handedness
    pub hand: Hand,
    /// Palm centre, millimetres
    pub palm_position: Vector3,
    /// Palm velocity, millimetres per second
    pub palm_velocity: Vector3,
    /// Unit vector from the palm toward the fingers
    pub direction: Vector3,
    /// Unit vector out of the palm
    pub palm_normal: Vector3,
    /// Index finger bone directions from metacarpal to distal
    pub index_bones: [Vector3; FINGER_BONE_COUNT],
}

impl HandSample {
    /// A flat, forward-pointing hand at `palm_position` with a straight index finger.
    #[must_use]
    pub fn at_rest(hand: Hand, palm_position: Vector3) -> Self {
        let forward = Vector3::new(0.0, 0.0, -1.0);
        Self {
            hand,
            palm_position,
            palm_velocity: Vector3::ZERO,
            direction: forward,
            palm_normal: Vector3::new(0.0, -1.0, 0.0),
            index_bones: [forward; FINGER_BONE_COUNT],
        }
    }
}

/// One frame from the tracking hardware.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingFrame {
    /// Hardware clock at capture, microseconds
    pub timestamp_us: i64,
    /// Zero or more detected hands
    pub hands: Vec<HandSample>,
}

impl TrackingFrame {
    /// The first sample for `hand`, if it was detected.
    #[must_use]
    pub fn hand(&self, hand: Hand) -> Option<&HandSample> {
        self.hands.iter().find(|s| s.hand == hand)
    }
}

/// Device-to-world transform reported by the host runtime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    /// Whether `transform` can be used
    pub valid: bool,
    /// Device-to-world transform in raw tracking space
    pub transform: Matrix3x4,
}

impl HeadPose {
    /// A valid pose.
    #[must_use]
    pub const fn valid(transform: Matrix3x4) -> Self {
        Self {
            valid: true,
            transform,
        }
    }

    /// The pose reported when the runtime has no head tracking.
    #[must_use]
    pub const fn invalid() -> Self {
        Self {
            valid: false,
            transform: Matrix3x4::IDENTITY,
        }
    }
}

/// Registration record of a hand's virtual device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualDeviceRecord {
    /// Handle assigned locally before the driver confirms the device
    pub local_id: u32,
    /// Driver-assigned id once the device was added
    pub remote_id: Option<u32>,
    /// Device type requested from the driver
    pub device_type: VirtualDeviceType,
    /// Caller-chosen unique serial
    pub serial: String,
    /// Whether every registration step succeeded
    pub registered: bool,
}

/// Lifecycle of a hand's virtual device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandState {
    /// No successful registration yet
    Unregistered,
    /// Registration calls in flight
    Registering,
    /// Device registered; per-frame updates flow
    Ready,
}

/// What the pipeline produced for one hand in one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandOutput {
    /// Which hand
    pub hand: Hand,
    /// Computed pose (disconnected when the head pose was invalid)
    pub pose: DevicePose,
    /// Computed buttons and axes
    pub state: ControllerState,
    /// Lifecycle state after this frame
    pub hand_state: HandState,
    /// Whether the update was handed to the client without error
    pub pushed: bool,
}

/// Result of processing one tracking frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameOutput {
    /// Seconds between the frame timestamp and the tracking clock
    pub time_offset_seconds: f64,
    /// Whether the host runtime reported a usable head pose
    pub head_valid: bool,
    /// Per-hand output, indexed by [`Hand::index`]
    pub hands: [HandOutput; 2],
}

impl FrameOutput {
    /// Output for `hand`.
    #[must_use]
    pub fn hand(&self, hand: Hand) -> &HandOutput {
        let [left, right] = &self.hands;
        match hand {
            Hand::Left => left,
            Hand::Right => right,
        }
    }
}
