//! Frame-driven bridge from hand tracking to virtual controllers

use handbridge_ipc::device::{ControllerState, DevicePose, TrackingResult};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::config::BridgeConfig;
use crate::error::PipelineResult;
use crate::hand::HandSlot;
use crate::ports::{HostRuntime, TrackingClock, VirtualDeviceClient};
use crate::transform::{time_offset_seconds, transform_hand_sample};
use crate::types::{FrameOutput, Hand, HandOutput, HandSample, HeadPose, TrackingFrame};

/// Frame and call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeStats {
    /// Frames processed
    pub frames: u64,
    /// Frames skipped because the head pose was invalid
    pub invalid_head_frames: u64,
    /// Completed registrations
    pub registrations: u64,
    /// Failed registration attempts
    pub registration_failures: u64,
    /// Pose/state updates handed to the client
    pub updates_sent: u64,
    /// Pose/state updates the client rejected
    pub update_failures: u64,
}

/// Owns both hands' state and drives them from tracking frames.
///
/// Called from the tracking callback thread. The only blocking work is
/// registration, which uses the client's bounded modal calls.
#[derive(Debug)]
pub struct HandBridge<C, R, K> {
    config: BridgeConfig,
    client: C,
    runtime: R,
    clock: K,
    slots: [HandSlot; 2],
    stats: BridgeStats,
}

struct FrameContext<'a, C: ?Sized> {
    config: &'a BridgeConfig,
    client: &'a C,
    head: HeadPose,
    time_offset_seconds: f64,
}

impl<C, R, K> HandBridge<C, R, K>
where
    C: VirtualDeviceClient,
    R: HostRuntime,
    K: TrackingClock,
{
    /// Create a bridge with both hands unregistered.
    ///
    /// # Errors
    ///
    /// [`crate::PipelineError::InvalidConfig`] if `config` does not validate.
    pub fn new(config: BridgeConfig, client: C, runtime: R, clock: K) -> PipelineResult<Self> {
        config.validate()?;
        let slots = Hand::ALL.map(|hand| HandSlot::new(hand, config.serial(hand)));
        Ok(Self {
            config,
            client,
            runtime,
            clock,
            slots,
            stats: BridgeStats::default(),
        })
    }

    /// Configuration in use.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The driver client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// The host runtime.
    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// The tracking clock.
    pub fn clock(&self) -> &K {
        &self.clock
    }

    /// State of `hand`.
    pub fn slot(&self, hand: Hand) -> &HandSlot {
        let [left, right] = &self.slots;
        match hand {
            Hand::Left => left,
            Hand::Right => right,
        }
    }

    /// Counters so far.
    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// Process one tracking frame.
    ///
    /// Never fails: registration and update errors are logged, counted and
    /// reflected in the returned [`FrameOutput`].
    pub fn process_frame(&mut self, frame: &TrackingFrame) -> FrameOutput {
        self.stats.frames += 1;

        let time_offset_seconds = time_offset_seconds(frame.timestamp_us, self.clock.now_us());
        let head = self
            .runtime
            .device_to_world(self.config.head_device_index, self.config.prediction_seconds);
        if !head.valid {
            self.stats.invalid_head_frames += 1;
            trace!("Head pose invalid; reporting hands disconnected");
        }

        let ctx = FrameContext {
            config: &self.config,
            client: &self.client,
            head,
            time_offset_seconds,
        };
        let stats = &mut self.stats;
        let [left, right] = &mut self.slots;
        let hands = [
            process_hand(left, frame.hand(Hand::Left), &ctx, stats),
            process_hand(right, frame.hand(Hand::Right), &ctx, stats),
        ];

        FrameOutput {
            time_offset_seconds,
            head_valid: head.valid,
            hands,
        }
    }
}

fn process_hand<C>(
    slot: &mut HandSlot,
    sample: Option<&HandSample>,
    ctx: &FrameContext<'_, C>,
    stats: &mut BridgeStats,
) -> HandOutput
where
    C: VirtualDeviceClient + ?Sized,
{
    let hand = slot.hand();
    let (pose, state) = match sample {
        // Without a frame of reference nothing is fabricated.
        _ if !ctx.head.valid => (DevicePose::disconnected(), ControllerState::default()),
        Some(sample) => {
            let (pose, state) = transform_hand_sample(
                sample,
                ctx.config.hand(hand),
                &ctx.head.transform,
                ctx.time_offset_seconds,
            );
            match slot.ensure_registered(ctx.client, ctx.config) {
                Ok(true) => stats.registrations += 1,
                Ok(false) => {}
                Err(_) => stats.registration_failures += 1,
            }
            (pose, state)
        }
        None => (not_visible_pose(ctx.time_offset_seconds), ControllerState::default()),
    };

    let pushed = match slot.push_update(ctx.client, &pose, &state, ctx.config.modal_updates) {
        Ok(pushed) => {
            if pushed {
                stats.updates_sent += 1;
            }
            pushed
        }
        Err(e) => {
            stats.update_failures += 1;
            warn!(hand = %hand, error = %e, "Dropping pose update");
            false
        }
    };

    HandOutput {
        hand,
        pose,
        state: ControllerState {
            packet_num: if pushed { slot.packet_num() } else { 0 },
            ..state
        },
        hand_state: slot.state(),
        pushed,
    }
}

/// Pose of a registered hand that is out of the tracker's view: the device
/// stays connected, its pose is flagged unusable.
fn not_visible_pose(time_offset_seconds: f64) -> DevicePose {
    DevicePose {
        time_offset_seconds,
        tracking_result: TrackingResult::OutOfRange,
        pose_is_valid: false,
        device_is_connected: true,
        ..DevicePose::disconnected()
    }
}
