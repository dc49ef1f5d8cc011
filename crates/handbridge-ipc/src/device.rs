//! Virtual device state carried on the wire

use handbridge_geometry::{Quaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Button identifiers understood by the driver.
pub mod buttons {
    /// System button
    pub const SYSTEM: u32 = 0;
    /// Application menu button
    pub const APPLICATION_MENU: u32 = 1;
    /// Grip button
    pub const GRIP: u32 = 2;
    /// Axis 0 (trackpad) click
    pub const AXIS0: u32 = 32;
    /// Axis 1 (trigger) click
    pub const AXIS1: u32 = 33;

    /// Bit for `button` in a pressed/touched mask.
    #[must_use]
    pub const fn button_mask(button: u32) -> u64 {
        1u64 << (button & 63)
    }
}

/// Tracking quality reported alongside a pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TrackingResult {
    /// No data yet
    #[default]
    Uninitialized = 1,
    /// Tracking is settling
    Calibrating = 100,
    /// Normal tracking
    Running = 200,
    /// Tracked object left the sensor volume
    OutOfRange = 201,
}

/// What kind of virtual device to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum VirtualDeviceType {
    /// Placeholder
    #[default]
    None = 0,
    /// Hand-held controller
    TrackedController = 1,
}

/// Device class property values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum DeviceClass {
    /// Unset
    Invalid = 0,
    /// Head-mounted display
    Hmd = 1,
    /// Hand-held controller
    Controller = 2,
    /// Generic tracker
    GenericTracker = 3,
    /// Base station or camera
    TrackingReference = 4,
}

/// Controller role hint property values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ControllerRole {
    /// No preference
    Invalid = 0,
    /// Left hand
    LeftHand = 1,
    /// Right hand
    RightHand = 2,
}

/// Axis type property values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum AxisType {
    /// Axis not present
    None = 0,
    /// Two-dimensional trackpad
    TrackPad = 1,
    /// Two-dimensional stick
    Joystick = 2,
    /// One-dimensional trigger
    Trigger = 3,
}

/// Full pose of a virtual device.
///
/// When `device_is_connected` is false the driver ignores every other field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DevicePose {
    /// Seconds between the sample time and now (negative for past samples)
    pub time_offset_seconds: f64,
    /// Rotation of the driver frame in the runtime's world frame
    pub world_from_driver_rotation: Quaternion,
    /// Translation of the driver frame in the runtime's world frame
    pub world_from_driver_translation: Vector3,
    /// Rotation from the device head to the driver frame
    pub driver_from_head_rotation: Quaternion,
    /// Translation from the device head to the driver frame
    pub driver_from_head_translation: Vector3,
    /// Position in metres, driver frame
    pub position: Vector3,
    /// Velocity in metres per second, driver frame
    pub velocity: Vector3,
    /// Acceleration in metres per second squared
    pub acceleration: Vector3,
    /// Orientation, driver frame
    pub rotation: Quaternion,
    /// Angular velocity in radians per second
    pub angular_velocity: Vector3,
    /// Angular acceleration in radians per second squared
    pub angular_acceleration: Vector3,
    /// Tracking quality
    pub tracking_result: TrackingResult,
    /// Whether the pose fields are usable
    pub pose_is_valid: bool,
    /// Whether the device should be shown at all
    pub device_is_connected: bool,
}

impl DevicePose {
    /// A pose that tells the driver the device is gone.
    #[must_use]
    pub const fn disconnected() -> Self {
        Self {
            time_offset_seconds: 0.0,
            world_from_driver_rotation: Quaternion::IDENTITY,
            world_from_driver_translation: Vector3::ZERO,
            driver_from_head_rotation: Quaternion::IDENTITY,
            driver_from_head_translation: Vector3::ZERO,
            position: Vector3::ZERO,
            velocity: Vector3::ZERO,
            acceleration: Vector3::ZERO,
            rotation: Quaternion::IDENTITY,
            angular_velocity: Vector3::ZERO,
            angular_acceleration: Vector3::ZERO,
            tracking_result: TrackingResult::Uninitialized,
            pose_is_valid: false,
            device_is_connected: false,
        }
    }
}

impl Default for DevicePose {
    fn default() -> Self {
        Self::disconnected()
    }
}

/// One analog axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ControllerAxis {
    /// X value (the only value for triggers)
    pub x: f32,
    /// Y value
    pub y: f32,
}

/// Number of analog axes carried in [`ControllerState`].
pub const CONTROLLER_AXIS_COUNT: usize = 2;

/// Buttons and axes of a virtual controller.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ControllerState {
    /// Incremented by the sender for every update; lets the driver drop stale packets
    pub packet_num: u32,
    /// Pressed buttons, one bit per [`buttons`] id
    pub buttons_pressed: u64,
    /// Touched buttons
    pub buttons_touched: u64,
    /// Axis 0 is the trackpad, axis 1 the trigger
    pub axes: [ControllerAxis; CONTROLLER_AXIS_COUNT],
}

impl ControllerState {
    /// Set or clear a pressed bit.
    pub fn set_pressed(&mut self, button: u32, pressed: bool) {
        let mask = buttons::button_mask(button);
        if pressed {
            self.buttons_pressed |= mask;
        } else {
            self.buttons_pressed &= !mask;
        }
    }

    /// Set or clear a touched bit.
    pub fn set_touched(&mut self, button: u32, touched: bool) {
        let mask = buttons::button_mask(button);
        if touched {
            self.buttons_touched |= mask;
        } else {
            self.buttons_touched &= !mask;
        }
    }

    /// Whether `button` is pressed.
    #[must_use]
    pub const fn is_pressed(&self, button: u32) -> bool {
        self.buttons_pressed & buttons::button_mask(button) != 0
    }

    /// Whether `button` is touched.
    #[must_use]
    pub const fn is_touched(&self, button: u32) -> bool {
        self.buttons_touched & buttons::button_mask(button) != 0
    }
}
