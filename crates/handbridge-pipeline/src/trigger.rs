//! Index-finger trigger heuristics

use handbridge_geometry::Vector3;

use crate::config::TriggerConfig;

/// Trigger reading derived from one hand sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TriggerReading {
    /// Analog value in `[0, 1]`
    pub axis: f64,
    /// Digital press
    pub pressed: bool,
}

/// Bend factor of a finger: total angle between consecutive bone directions
/// divided by `saturation_radians`.
///
/// A straight finger reads 0. A fully curled finger reads above 1; the value
/// is not clamped here.
#[must_use]
pub fn bend_factor(bones: &[Vector3], saturation_radians: f64) -> f64 {
    if saturation_radians <= 0.0 {
        return 0.0;
    }
    let curl: f64 = bones
        .windows(2)
        .map(|pair| match pair {
            [a, b] => a.angle_to(b),
            _ => 0.0,
        })
        .sum();
    curl / saturation_radians
}

/// Map a bend factor to a trigger reading.
#[must_use]
pub fn trigger_from_bend(bend: f64, config: &TriggerConfig) -> TriggerReading {
    if !(bend >= config.dead_zone) {
        return TriggerReading::default();
    }
    let range = 1.0 - config.dead_zone;
    let axis = if range > 0.0 {
        ((bend - config.dead_zone) / range).clamp(0.0, 1.0)
    } else {
        1.0
    };
    TriggerReading {
        axis,
        pressed: axis >= config.press_cutoff,
    }
}
