//! Per-hand device lifecycle

use handbridge_ipc::device::{
    AxisType, ControllerState, DeviceClass, DevicePose, VirtualDeviceType, buttons,
};
use handbridge_ipc::protocol::{PropertyKey, PropertyValue};
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::ports::VirtualDeviceClient;
use crate::types::{Hand, HandState, VirtualDeviceRecord};

/// Buttons every hand controller advertises.
pub const SUPPORTED_BUTTON_MASK: u64 = buttons::button_mask(buttons::SYSTEM)
    | buttons::button_mask(buttons::APPLICATION_MENU)
    | buttons::button_mask(buttons::GRIP)
    | buttons::button_mask(buttons::AXIS0)
    | buttons::button_mask(buttons::AXIS1);

/// Static properties set once when a hand's device is registered.
#[must_use]
pub fn registration_properties(
    hand: Hand,
    config: &BridgeConfig,
) -> Vec<(PropertyKey, PropertyValue)> {
    vec![
        (
            PropertyKey::TRACKING_SYSTEM_NAME,
            PropertyValue::String(config.tracking_system_name.clone()),
        ),
        (
            PropertyKey::MODEL_NUMBER,
            PropertyValue::String(config.model_number.clone()),
        ),
        (
            PropertyKey::SERIAL_NUMBER,
            PropertyValue::String(config.serial(hand)),
        ),
        (
            PropertyKey::MANUFACTURER_NAME,
            PropertyValue::String(config.manufacturer.clone()),
        ),
        (PropertyKey::WILL_DRIFT_IN_YAW, PropertyValue::Bool(false)),
        (PropertyKey::DEVICE_IS_WIRELESS, PropertyValue::Bool(true)),
        (
            PropertyKey::DEVICE_CLASS,
            PropertyValue::I32(DeviceClass::Controller as i32),
        ),
        (
            PropertyKey::CONTROLLER_ROLE_HINT,
            PropertyValue::I32(hand.role() as i32),
        ),
        (
            PropertyKey::SUPPORTED_BUTTONS,
            PropertyValue::U64(SUPPORTED_BUTTON_MASK),
        ),
        (
            PropertyKey::AXIS0_TYPE,
            PropertyValue::I32(AxisType::TrackPad as i32),
        ),
        (
            PropertyKey::AXIS1_TYPE,
            PropertyValue::I32(AxisType::Trigger as i32),
        ),
    ]
}

/// Registration record and update sequencing for one hand.
///
/// `Unregistered → Registering → Ready`, never back. A failed registration
/// returns to `Unregistered` and is attempted again by the next
/// [`HandSlot::ensure_registered`]. A device the driver already created is
/// not created twice.
#[derive(Debug, Clone)]
pub struct HandSlot {
    hand: Hand,
    record: VirtualDeviceRecord,
    state: HandState,
    packet_num: u32,
    registration_attempts: u32,
}

impl HandSlot {
    /// An unregistered slot.
    #[must_use]
    pub fn new(hand: Hand, serial: String) -> Self {
        Self {
            hand,
            record: VirtualDeviceRecord {
                local_id: hand.index() as u32,
                remote_id: None,
                device_type: VirtualDeviceType::TrackedController,
                serial,
                registered: false,
            },
            state: HandState::Unregistered,
            packet_num: 0,
            registration_attempts: 0,
        }
    }

    /// Which hand.
    #[must_use]
    pub fn hand(&self) -> Hand {
        self.hand
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> HandState {
        self.state
    }

    /// Registration record.
    #[must_use]
    pub fn record(&self) -> &VirtualDeviceRecord {
        &self.record
    }

    /// Whether per-frame updates flow.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == HandState::Ready
    }

    /// Driver id once registration completed.
    #[must_use]
    pub fn device_id(&self) -> Option<u32> {
        self.record.remote_id.filter(|_| self.is_ready())
    }

    /// Number of registration attempts so far.
    #[must_use]
    pub fn registration_attempts(&self) -> u32 {
        self.registration_attempts
    }

    /// Packet number of the last successfully pushed controller state.
    ///
    /// A failed push does not consume a number.
    #[must_use]
    pub fn packet_num(&self) -> u32 {
        self.packet_num
    }

    /// Register the hand's device unless it is already ready.
    ///
    /// Returns `true` when this call completed the registration. Blocks on
    /// modal calls.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Registration`]; the slot stays `Unregistered`.
    pub fn ensure_registered<C>(&mut self, client: &C, config: &BridgeConfig) -> PipelineResult<bool>
    where
        C: VirtualDeviceClient + ?Sized,
    {
        if self.is_ready() {
            return Ok(false);
        }

        self.state = HandState::Registering;
        self.registration_attempts = self.registration_attempts.saturating_add(1);

        match self.register(client, config) {
            Ok(device_id) => {
                self.record.registered = true;
                self.state = HandState::Ready;
                info!(
                    hand = %self.hand,
                    device_id,
                    serial = %self.record.serial,
                    attempts = self.registration_attempts,
                    "Virtual controller registered"
                );
                Ok(true)
            }
            Err(source) => {
                self.state = HandState::Unregistered;
                warn!(
                    hand = %self.hand,
                    attempt = self.registration_attempts,
                    error = %source,
                    "Virtual controller registration failed"
                );
                Err(PipelineError::Registration {
                    hand: self.hand,
                    source,
                })
            }
        }
    }

    fn register<C>(&mut self, client: &C, config: &BridgeConfig) -> handbridge_ipc::IpcResult<u32>
    where
        C: VirtualDeviceClient + ?Sized,
    {
        let device_id = match self.record.remote_id {
            Some(id) => id,
            None => {
                let id =
                    client.add_virtual_device(self.record.device_type, &self.record.serial, false)?;
                debug!(hand = %self.hand, device_id = id, "Virtual device added");
                self.record.remote_id = Some(id);
                id
            }
        };

        for (key, value) in registration_properties(self.hand, config) {
            client.set_property(device_id, key, &value)?;
        }
        client.publish_virtual_device(device_id)?;
        Ok(device_id)
    }

    /// Push a pose and controller state. Does nothing and returns `false`
    /// before the hand is ready.
    ///
    /// The state's packet number is replaced with the slot's next one.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Update`] for the first failing call.
    pub fn push_update<C>(
        &mut self,
        client: &C,
        pose: &DevicePose,
        state: &ControllerState,
        modal: bool,
    ) -> PipelineResult<bool>
    where
        C: VirtualDeviceClient + ?Sized,
    {
        let Some(device_id) = self.device_id() else {
            return Ok(false);
        };

        let packet_num = self.packet_num.wrapping_add(1);
        let state = ControllerState {
            packet_num,
            ..*state
        };

        client
            .set_pose(device_id, pose, modal)
            .and_then(|()| client.set_controller_state(device_id, &state, modal))
            .map_err(|source| PipelineError::Update {
                hand: self.hand,
                source,
            })?;
        self.packet_num = packet_num;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CallKind, RecordingClient};
    use handbridge_ipc::IpcError;
    use handbridge_test_helpers::prelude::*;

    fn slot(hand: Hand) -> HandSlot {
        HandSlot::new(hand, BridgeConfig::default().serial(hand))
    }

    #[test]
    fn test_registration_sets_capabilities_and_publishes() -> TestResult {
        let client = RecordingClient::new();
        let mut slot = slot(Hand::Right);
        assert!(slot.ensure_registered(&client, &BridgeConfig::default())?);

        assert_eq!(slot.state(), HandState::Ready);
        assert_eq!(slot.device_id(), Some(0));
        assert_eq!(
            client.property(0, PropertyKey::DEVICE_CLASS),
            Some(PropertyValue::I32(DeviceClass::Controller as i32))
        );
        assert_eq!(
            client.property(0, PropertyKey::CONTROLLER_ROLE_HINT),
            Some(PropertyValue::I32(2))
        );
        assert_eq!(
            client.property(0, PropertyKey::SUPPORTED_BUTTONS),
            Some(PropertyValue::U64(SUPPORTED_BUTTON_MASK))
        );
        assert_eq!(client.count(CallKind::Publish), 1);
        Ok(())
    }

    #[test]
    fn test_ready_slot_does_not_register_again() -> TestResult {
        let client = RecordingClient::new();
        let mut slot = slot(Hand::Left);
        slot.ensure_registered(&client, &BridgeConfig::default())?;
        client.clear();

        assert!(!slot.ensure_registered(&client, &BridgeConfig::default())?);
        assert!(client.calls().is_empty());
        assert_eq!(slot.registration_attempts(), 1);
        Ok(())
    }

    #[test]
    fn test_failed_add_leaves_slot_unregistered() {
        let client = RecordingClient::new();
        client.fail_next(CallKind::AddVirtualDevice, IpcError::AlreadyInUse { status: 5 });
        let mut slot = slot(Hand::Left);

        let err = must_err(slot.ensure_registered(&client, &BridgeConfig::default()));
        assert!(err.is_registration());
        assert_eq!(err.ipc_error().and_then(IpcError::status_code), Some(5));
        assert_eq!(slot.state(), HandState::Unregistered);
        assert!(slot.device_id().is_none());
        assert!(!slot.record().registered);
    }

    #[test]
    fn test_retry_after_property_failure_reuses_device() -> TestResult {
        let client = RecordingClient::new();
        client.fail_next(CallKind::SetProperty, IpcError::connection("queue full"));
        let mut slot = slot(Hand::Left);

        assert!(slot.ensure_registered(&client, &BridgeConfig::default()).is_err());
        assert_eq!(slot.record().remote_id, Some(0));
        assert!(slot.ensure_registered(&client, &BridgeConfig::default())?);

        assert_eq!(client.count(CallKind::AddVirtualDevice), 1);
        assert_eq!(slot.device_id(), Some(0));
        assert_eq!(slot.registration_attempts(), 2);
        Ok(())
    }

    #[test]
    fn test_push_before_ready_is_noop() -> TestResult {
        let client = RecordingClient::new();
        let mut slot = slot(Hand::Right);
        let pushed = slot.push_update(
            &client,
            &DevicePose::disconnected(),
            &ControllerState::default(),
            false,
        )?;
        assert!(!pushed);
        assert!(client.calls().is_empty());
        Ok(())
    }

    #[test]
    fn test_push_numbers_packets() -> TestResult {
        let client = RecordingClient::new();
        let mut slot = slot(Hand::Right);
        slot.ensure_registered(&client, &BridgeConfig::default())?;

        let state = ControllerState {
            packet_num: 99,
            ..ControllerState::default()
        };
        slot.push_update(&client, &DevicePose::disconnected(), &state, false)?;
        slot.push_update(&client, &DevicePose::disconnected(), &state, false)?;

        let numbers: Vec<u32> = client.states(0).iter().map(|s| s.packet_num).collect();
        assert_eq!(numbers, vec![1, 2]);
        Ok(())
    }

    #[test]
    fn test_failed_push_does_not_consume_packet_number() -> TestResult {
        let client = RecordingClient::new();
        let mut slot = slot(Hand::Left);
        slot.ensure_registered(&client, &BridgeConfig::default())?;
        let pose = DevicePose::disconnected();
        let state = ControllerState::default();

        assert!(slot.push_update(&client, &pose, &state, false)?);
        client.fail_next(CallKind::SetPose, IpcError::connection("queue full"));
        let err = must_err(slot.push_update(&client, &pose, &state, false));
        assert!(matches!(err, PipelineError::Update { hand: Hand::Left, .. }));
        assert_eq!(slot.packet_num(), 1);

        assert!(slot.push_update(&client, &pose, &state, false)?);
        assert_eq!(slot.packet_num(), 2);
        let numbers: Vec<u32> = client.states(0).iter().map(|s| s.packet_num).collect();
        assert_eq!(numbers, vec![1, 2]);
        Ok(())
    }

    #[test]
    fn test_supported_mask_covers_trigger_and_trackpad() {
        assert_ne!(SUPPORTED_BUTTON_MASK & buttons::button_mask(buttons::AXIS0), 0);
        assert_ne!(SUPPORTED_BUTTON_MASK & buttons::button_mask(buttons::AXIS1), 0);
        assert_eq!(SUPPORTED_BUTTON_MASK.count_ones(), 5);
    }
}
