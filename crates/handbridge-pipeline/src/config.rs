//! Bridge configuration
//!
//! All structs deserialize with defaults for missing fields, so a JSON file
//! only needs the values it changes.

use std::path::Path;

use handbridge_geometry::{Matrix3x4, Quaternion, Vector3, quaternion_from_yaw_pitch_roll};
use handbridge_geometry::rotation_matrix_from_quaternion;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::types::Hand;

/// Prefix of the serial generated for a hand without an explicit one.
pub const DEFAULT_SERIAL_PREFIX: &str = "handbridge";

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Host runtime device index of the head-mounted display
    pub head_device_index: u32,
    /// Prediction time passed to the host runtime's pose query, seconds
    pub prediction_seconds: f64,
    /// Send per-frame updates modally (waits for each reply)
    pub modal_updates: bool,
    /// Tracking system name property
    pub tracking_system_name: String,
    /// Manufacturer name property
    pub manufacturer: String,
    /// Model number property
    pub model_number: String,
    /// Left hand settings
    pub left: HandConfig,
    /// Right hand settings
    pub right: HandConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            head_device_index: 0,
            prediction_seconds: 0.0,
            modal_updates: false,
            tracking_system_name: DEFAULT_SERIAL_PREFIX.to_string(),
            manufacturer: DEFAULT_SERIAL_PREFIX.to_string(),
            model_number: "handbridge-hand".to_string(),
            left: HandConfig::default(),
            right: HandConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Settings for `hand`.
    #[must_use]
    pub fn hand(&self, hand: Hand) -> &HandConfig {
        match hand {
            Hand::Left => &self.left,
            Hand::Right => &self.right,
        }
    }

    /// Serial of `hand`'s virtual device.
    #[must_use]
    pub fn serial(&self, hand: Hand) -> String {
        self.hand(hand)
            .serial
            .clone()
            .unwrap_or_else(|| format!("{DEFAULT_SERIAL_PREFIX}_{hand}"))
    }

    /// Set a hand's settings
    pub fn with_hand(mut self, hand: Hand, config: HandConfig) -> Self {
        match hand {
            Hand::Left => self.left = config,
            Hand::Right => self.right = config,
        }
        self
    }

    /// Send per-frame updates modally
    pub fn with_modal_updates(mut self, modal: bool) -> Self {
        self.modal_updates = modal;
        self
    }

    /// Check ranges and serial uniqueness.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidConfig`] naming the first offending value.
    pub fn validate(&self) -> PipelineResult<()> {
        if !self.prediction_seconds.is_finite() || self.prediction_seconds < 0.0 {
            return Err(PipelineError::invalid_config(format!(
                "prediction_seconds must be finite and non-negative, got {}",
                self.prediction_seconds
            )));
        }
        for hand in Hand::ALL {
            self.hand(hand).validate(hand)?;
        }
        let (left, right) = (self.serial(Hand::Left), self.serial(Hand::Right));
        if left.is_empty() || right.is_empty() {
            return Err(PipelineError::invalid_config("serials must not be empty"));
        }
        if left == right {
            return Err(PipelineError::invalid_config(format!(
                "both hands use serial '{left}'"
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Parse`] for malformed JSON, otherwise see [`Self::validate`].
    pub fn from_json_str(json: &str) -> PipelineResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Io`] if the file cannot be read, otherwise see
    /// [`Self::from_json_str`].
    pub fn from_json_file(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Parse`] if serialization fails.
    pub fn to_json(&self) -> PipelineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Per-hand settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HandConfig {
    /// Device serial; generated from the hand name when unset
    pub serial: Option<String>,
    /// Where the driver frame sits relative to the head
    pub offset: OffsetConfig,
    /// Index-finger trigger mapping
    pub trigger: TriggerConfig,
}

impl HandConfig {
    fn validate(&self, hand: Hand) -> PipelineResult<()> {
        self.offset
            .validate()
            .and_then(|()| self.trigger.validate())
            .map_err(|reason| PipelineError::invalid_config(format!("{hand} hand: {reason}")))
    }
}

/// Constant driver-from-head offset: a rotation given as yaw/pitch/roll in
/// degrees and a translation in metres.
///
/// The default tilts the frame 45 degrees down and moves it 10 cm back from
/// the head, where a head-mounted tracker sees the hands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffsetConfig {
    /// Yaw, degrees
    pub yaw_degrees: f64,
    /// Pitch, degrees
    pub pitch_degrees: f64,
    /// Roll, degrees
    pub roll_degrees: f64,
    /// Translation, metres, head frame
    pub translation: Vector3,
}

impl Default for OffsetConfig {
    fn default() -> Self {
        Self {
            yaw_degrees: 0.0,
            pitch_degrees: -45.0,
            roll_degrees: 0.0,
            translation: Vector3::new(0.0, 0.0, 0.1),
        }
    }
}

impl OffsetConfig {
    /// Offset rotation as a quaternion.
    #[must_use]
    pub fn rotation(&self) -> Quaternion {
        quaternion_from_yaw_pitch_roll(
            self.yaw_degrees.to_radians(),
            self.pitch_degrees.to_radians(),
            self.roll_degrees.to_radians(),
        )
    }

    /// Offset as a transform that can be composed onto the head pose.
    #[must_use]
    pub fn matrix(&self) -> Matrix3x4 {
        rotation_matrix_from_quaternion(&self.rotation()).with_translation(self.translation)
    }

    fn validate(&self) -> Result<(), String> {
        let angles = [self.yaw_degrees, self.pitch_degrees, self.roll_degrees];
        if angles.iter().all(|a| a.is_finite()) && self.translation.is_finite() {
            Ok(())
        } else {
            Err("offset must be finite".to_string())
        }
    }
}

/// Index-finger bend to trigger mapping.
///
/// Bend factors below `dead_zone` read as a released trigger. Above it the
/// axis rises linearly to 1 at a bend factor of 1, and the digital press is
/// set while the axis is at or above `press_cutoff`. There is a single cutoff
/// with no hysteresis, so a finger held right at the cutoff can chatter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Bend factor below which the trigger reads zero
    pub dead_zone: f64,
    /// Axis value at which the digital press latches
    pub press_cutoff: f64,
    /// Total index-finger curl, radians, that maps to a bend factor of 1
    pub saturation_radians: f64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            dead_zone: 0.25,
            press_cutoff: 0.95,
            saturation_radians: 3.0,
        }
    }
}

impl TriggerConfig {
    fn validate(&self) -> Result<(), String> {
        if !(0.0..1.0).contains(&self.dead_zone) {
            return Err(format!("dead_zone must be in [0, 1), got {}", self.dead_zone));
        }
        if !(self.press_cutoff > 0.0 && self.press_cutoff <= 1.0) {
            return Err(format!(
                "press_cutoff must be in (0, 1], got {}",
                self.press_cutoff
            ));
        }
        if !(self.saturation_radians.is_finite() && self.saturation_radians > 0.0) {
            return Err(format!(
                "saturation_radians must be positive, got {}",
                self.saturation_radians
            ));
        }
        Ok(())
    }
}
