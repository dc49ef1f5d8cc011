//! Tracking frame fixtures

use handbridge_geometry::Vector3;
use handbridge_pipeline::types::{FINGER_BONE_COUNT, Hand, HandSample, TrackingFrame};

/// Index finger bones curled by `step_radians` at every joint.
pub fn curled_index_bones(step_radians: f64) -> [Vector3; FINGER_BONE_COUNT] {
    let bone = |joint: f64| {
        let angle = step_radians * joint;
        Vector3::new(0.0, -angle.sin(), -angle.cos())
    };
    [bone(0.0), bone(1.0), bone(2.0), bone(3.0)]
}

/// A hand 15 cm above the sensor with a straight index finger.
pub fn open_hand(hand: Hand) -> HandSample {
    HandSample::at_rest(hand, Vector3::new(0.0, 150.0, 0.0))
}

/// A hand 15 cm above the sensor with a fully curled index finger.
pub fn fist(hand: Hand) -> HandSample {
    HandSample {
        index_bones: curled_index_bones(std::f64::consts::FRAC_PI_2),
        ..open_hand(hand)
    }
}

/// A frame at `timestamp_us` carrying `hands`.
pub fn frame(timestamp_us: i64, hands: Vec<HandSample>) -> TrackingFrame {
    TrackingFrame {
        timestamp_us,
        hands,
    }
}
