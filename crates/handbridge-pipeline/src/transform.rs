//! Per-hand pose transform
//!
//! Everything here is pure: a tracking sample, the hand's settings and the
//! head transform go in, a device pose and controller state come out.

use handbridge_geometry::{
    MILLIMETERS_TO_METERS, Matrix3x4, Quaternion, Vector3, mat_mul_33,
    quaternion_from_rotation_matrix, quaternion_from_yaw_pitch_roll, quaternion_rotate_vector,
    yaw_pitch_roll_from_direction,
};
use handbridge_ipc::device::{ControllerState, DevicePose, TrackingResult, buttons};

use crate::config::HandConfig;
use crate::trigger::{TriggerReading, bend_factor, trigger_from_bend};
use crate::types::HandSample;

/// Seconds from now to the frame timestamp; negative for frames in the past.
#[must_use]
pub fn time_offset_seconds(frame_timestamp_us: i64, now_us: i64) -> f64 {
    frame_timestamp_us.saturating_sub(now_us) as f64 * 1e-6
}

/// Hardware axes (X right, Y up, Z toward the user, millimetres) to runtime
/// axes (metres).
#[must_use]
pub fn map_hardware_vector(v: &Vector3) -> Vector3 {
    Vector3::new(
        -v.x * MILLIMETERS_TO_METERS,
        -v.z * MILLIMETERS_TO_METERS,
        -v.y * MILLIMETERS_TO_METERS,
    )
}

/// World-from-driver rotation and translation for a driver frame fixed at
/// `offset` relative to `head`.
#[must_use]
pub fn world_from_driver(head: &Matrix3x4, offset: &Matrix3x4) -> (Quaternion, Vector3) {
    let head_rotation = quaternion_from_rotation_matrix(head);
    let rotation = quaternion_from_rotation_matrix(&mat_mul_33(head, offset));
    // Head quaternions carry the handedness flip, so the reverse sandwich
    // applies the head matrix's own rotation.
    let translation = head.translation()
        + quaternion_rotate_vector(&head_rotation, &offset.translation(), true);
    (rotation, translation)
}

/// Orientation of a hand from its direction and palm normal.
///
/// Only yaw and pitch are tracked. Roll is dropped on purpose: the hand is
/// reported with two rotational degrees of freedom.
#[must_use]
pub fn hand_rotation(direction: &Vector3, palm_normal: &Vector3) -> Quaternion {
    let (yaw, pitch, _roll) = yaw_pitch_roll_from_direction(direction, palm_normal);
    quaternion_from_yaw_pitch_roll(-yaw, pitch, 0.0)
}

/// Trigger reading for a sample.
#[must_use]
pub fn hand_trigger(sample: &HandSample, config: &HandConfig) -> TriggerReading {
    let bend = bend_factor(&sample.index_bones, config.trigger.saturation_radians);
    trigger_from_bend(bend, &config.trigger)
}

/// Controller state carrying a trigger reading on axis 1.
#[must_use]
pub fn controller_state(trigger: TriggerReading) -> ControllerState {
    let mut state = ControllerState::default();
    let [_trackpad, trigger_axis] = &mut state.axes;
    trigger_axis.x = trigger.axis as f32;
    state.set_touched(buttons::AXIS1, trigger.axis > 0.0);
    state.set_pressed(buttons::AXIS1, trigger.pressed);
    state
}

/// Turn one hand sample into a device pose and controller state.
///
/// `head` must be a valid device-to-world transform; callers handle an
/// invalid head pose with [`DevicePose::disconnected`]. The returned state
/// has packet number 0.
#[must_use]
pub fn transform_hand_sample(
    sample: &HandSample,
    config: &HandConfig,
    head: &Matrix3x4,
    time_offset_seconds: f64,
) -> (DevicePose, ControllerState) {
    let (world_rotation, world_translation) = world_from_driver(head, &config.offset.matrix());

    let pose = DevicePose {
        time_offset_seconds,
        world_from_driver_rotation: world_rotation,
        world_from_driver_translation: world_translation,
        driver_from_head_rotation: Quaternion::IDENTITY,
        driver_from_head_translation: Vector3::ZERO,
        position: map_hardware_vector(&sample.palm_position),
        velocity: map_hardware_vector(&sample.palm_velocity),
        acceleration: Vector3::ZERO,
        rotation: hand_rotation(&sample.direction, &sample.palm_normal),
        angular_velocity: Vector3::ZERO,
        angular_acceleration: Vector3::ZERO,
        tracking_result: TrackingResult::Running,
        pose_is_valid: true,
        device_is_connected: true,
    };

    (pose, controller_state(hand_trigger(sample, config)))
}
