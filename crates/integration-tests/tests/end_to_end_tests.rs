//! Pipeline → IPC client → loopback driver, end to end

use std::time::Duration;

use anyhow::Result;
use handbridge_integration_tests::LoopbackRig;
use handbridge_integration_tests::fixtures::{fist, frame, open_hand};
use handbridge_ipc::prelude::*;
use handbridge_pipeline::prelude::*;
use handbridge_test_helpers::prelude::*;

const SETTLE: Duration = Duration::from_secs(2);

#[test]
fn hands_become_published_controllers() -> Result<()> {
    init_test_tracing();
    let rig = LoopbackRig::with_defaults()?;
    let mut bridge = rig.bridge(BridgeConfig::default())?;

    let out = bridge.process_frame(&frame(0, vec![open_hand(Hand::Left), open_hand(Hand::Right)]));
    assert!(Hand::ALL.iter().all(|&h| out.hand(h).hand_state == HandState::Ready));

    let left = must_some(rig.driver.device_by_serial("handbridge_left"), "left device");
    let right = must_some(rig.driver.device_by_serial("handbridge_right"), "right device");
    assert!(left.published && right.published);
    assert_eq!(left.device_type, VirtualDeviceType::TrackedController);
    assert_eq!(
        right.properties.get(&PropertyKey::CONTROLLER_ROLE_HINT.0),
        Some(&PropertyValue::I32(ControllerRole::RightHand as i32))
    );
    assert_eq!(
        left.properties.get(&PropertyKey::DEVICE_CLASS.0),
        Some(&PropertyValue::I32(DeviceClass::Controller as i32))
    );
    assert_eq!(rig.client.virtual_device_count()?, 2);
    Ok(())
}

#[test]
fn poses_and_states_reach_the_driver() -> Result<()> {
    let rig = LoopbackRig::with_defaults()?;
    let mut bridge = rig.bridge(BridgeConfig::default())?;

    for t in 0..10 {
        bridge.process_frame(&frame(t * 10_000, vec![fist(Hand::Left)]));
    }

    let device_id = must_some(bridge.slot(Hand::Left).device_id(), "left registered");
    assert!(wait_until(SETTLE, || {
        rig.driver.device(device_id).is_some_and(|d| d.state_updates == 10)
    }));

    let device = must_some(rig.driver.device(device_id), "left device");
    let pose = must_some(device.last_pose, "pose received");
    assert!(pose.device_is_connected && pose.pose_is_valid);
    let state = must_some(device.last_state, "state received");
    assert!(state.is_pressed(buttons::AXIS1));
    assert_eq!(state.packet_num, 10);
    assert_eq!(rig.client.pending_calls()?, 0);
    Ok(())
}

#[test]
fn capacity_limit_keeps_second_hand_unregistered() -> Result<()> {
    let rig = LoopbackRig::start(LoopbackConfig {
        max_devices: 1,
        ..LoopbackConfig::default()
    })?;
    let mut bridge = rig.bridge(BridgeConfig::default())?;

    let both = || frame(0, vec![open_hand(Hand::Left), open_hand(Hand::Right)]);
    let out = bridge.process_frame(&both());
    assert_eq!(out.hand(Hand::Left).hand_state, HandState::Ready);
    assert_eq!(out.hand(Hand::Right).hand_state, HandState::Unregistered);

    let out = bridge.process_frame(&both());
    assert!(out.hand(Hand::Left).pushed);
    assert_eq!(out.hand(Hand::Right).hand_state, HandState::Unregistered);
    assert_eq!(bridge.stats().registration_failures, 2);
    assert_eq!(rig.driver.device_count(), 1);
    Ok(())
}

#[test]
fn unknown_device_property_is_invalid_id_without_leak() -> Result<()> {
    let rig = LoopbackRig::with_defaults()?;

    let err = must_err(rig.client.set_virtual_device_property_i32(
        42,
        PropertyKey::DEVICE_CLASS,
        DeviceClass::Controller as i32,
    ));

    assert!(matches!(err, IpcError::InvalidId { .. }));
    assert_eq!(err.status_code(), Some(ReplyStatus::InvalidId.code()));
    assert_eq!(rig.client.pending_calls()?, 0);
    Ok(())
}

#[test]
fn wrong_property_type_is_rejected() -> Result<()> {
    let rig = LoopbackRig::with_defaults()?;
    let id = rig
        .client
        .add_virtual_device(VirtualDeviceType::TrackedController, "typed", false)?;

    let err = must_err(
        rig.client
            .set_virtual_device_property_bool(id, PropertyKey::DEVICE_CLASS, true),
    );
    assert!(matches!(err, IpcError::InvalidType { .. }));
    Ok(())
}

#[test]
fn driver_loss_does_not_stop_frames() -> Result<()> {
    let rig = LoopbackRig::with_defaults()?;
    let mut bridge = rig.bridge(BridgeConfig::default())?;
    bridge.process_frame(&frame(0, vec![open_hand(Hand::Left)]));

    rig.driver.stop();
    for t in 1..4 {
        let out = bridge.process_frame(&frame(t * 10_000, vec![open_hand(Hand::Left)]));
        assert!(!out.hand(Hand::Left).pushed);
    }
    assert_eq!(bridge.stats().update_failures, 3);
    assert_eq!(bridge.stats().frames, 4);
    Ok(())
}

#[test]
fn modal_updates_wait_for_the_driver() -> Result<()> {
    let rig = LoopbackRig::with_defaults()?;
    let mut bridge = rig.bridge(BridgeConfig::default().with_modal_updates(true))?;

    bridge.process_frame(&frame(0, vec![open_hand(Hand::Right)]));
    let device_id = must_some(bridge.slot(Hand::Right).device_id(), "right registered");

    // Modal pushes are acknowledged before process_frame returns.
    let device = must_some(rig.driver.device(device_id), "right device");
    assert_eq!(device.pose_updates, 1);
    assert_eq!(device.state_updates, 1);
    Ok(())
}

#[test]
fn duplicate_serial_is_already_in_use() -> Result<()> {
    let rig = LoopbackRig::with_defaults()?;
    rig.client
        .add_virtual_device(VirtualDeviceType::TrackedController, "handbridge_left", false)?;

    let mut bridge = rig.bridge(BridgeConfig::default())?;
    let out = bridge.process_frame(&frame(0, vec![open_hand(Hand::Left)]));

    assert_eq!(out.hand(Hand::Left).hand_state, HandState::Unregistered);
    let err = must_err(rig.client.add_virtual_device(
        VirtualDeviceType::TrackedController,
        "handbridge_left",
        false,
    ));
    assert!(matches!(err, IpcError::AlreadyInUse { .. }));
    Ok(())
}
