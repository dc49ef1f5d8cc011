//! Integration tests for handbridge-pipeline
//!
//! Drives a bridge against the in-process loopback driver over a local
//! transport, the same wiring a real deployment uses with a different queue
//! backend.

use std::sync::Arc;
use std::time::Duration;

use handbridge_geometry::{Matrix3x4, Vector3};
use handbridge_ipc::prelude::{
    IpcClient, IpcConfig, LocalTransport, LoopbackConfig, LoopbackDriver, PropertyKey,
    PropertyValue,
};
use handbridge_pipeline::prelude::*;
use handbridge_test_helpers::prelude::*;

#[derive(Debug)]
struct FixedHead(HeadPose);

impl HostRuntime for FixedHead {
    fn device_to_world(&self, _device_index: u32, _prediction_seconds: f64) -> HeadPose {
        self.0
    }
}

#[derive(Debug)]
struct ZeroClock;

impl TrackingClock for ZeroClock {
    fn now_us(&self) -> i64 {
        0
    }
}

type Rig = (LocalTransport, LoopbackDriver, Arc<IpcClient>);

fn start_driver() -> Result<Rig, Box<dyn std::error::Error>> {
    let transport = LocalTransport::new();
    let driver = LoopbackDriver::start(Arc::new(transport.clone()), LoopbackConfig::default())?;
    let client = Arc::new(IpcClient::new(
        IpcConfig::default().with_call_timeout(Duration::from_millis(1000)),
        Arc::new(transport.clone()),
    ));
    client.connect()?;
    Ok((transport, driver, client))
}

fn both_hands() -> TrackingFrame {
    TrackingFrame {
        timestamp_us: 0,
        hands: vec![
            HandSample::at_rest(Hand::Left, Vector3::new(-80.0, 200.0, 0.0)),
            HandSample::at_rest(Hand::Right, Vector3::new(80.0, 200.0, 0.0)),
        ],
    }
}

#[test]
fn test_config_file_drives_registration() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("bridge.json");
    std::fs::write(
        &path,
        r#"{
            "manufacturer": "Bench",
            "left": { "serial": "bench_left" },
            "right": { "serial": "bench_right" }
        }"#,
    )?;
    let config = BridgeConfig::from_json_file(&path)?;

    let (_transport, driver, client) = start_driver()?;
    let mut bridge = HandBridge::new(
        config,
        Arc::clone(&client),
        FixedHead(HeadPose::valid(Matrix3x4::IDENTITY)),
        ZeroClock,
    )?;
    let output = bridge.process_frame(&both_hands());

    assert_eq!(output.hand(Hand::Left).hand_state, HandState::Ready);
    assert_eq!(output.hand(Hand::Right).hand_state, HandState::Ready);
    assert_eq!(bridge.stats().registrations, 2);

    let left = must_some(driver.device_by_serial("bench_left"), "left device");
    assert!(left.published);
    assert_eq!(
        left.properties.get(&PropertyKey::MANUFACTURER_NAME.0),
        Some(&PropertyValue::String("Bench".to_string()))
    );
    assert_eq!(
        left.properties.get(&PropertyKey::CONTROLLER_ROLE_HINT.0),
        Some(&PropertyValue::I32(Hand::Left.role() as i32))
    );
    assert!(driver.device_by_serial("bench_right").is_some());
    Ok(())
}

#[test]
fn test_modal_updates_are_applied_before_process_frame_returns() -> TestResult {
    let (_transport, driver, client) = start_driver()?;
    let mut bridge = HandBridge::new(
        BridgeConfig::default().with_modal_updates(true),
        Arc::clone(&client),
        FixedHead(HeadPose::valid(Matrix3x4::IDENTITY)),
        ZeroClock,
    )?;

    bridge.process_frame(&both_hands());
    bridge.process_frame(&both_hands());

    let id = must_some(bridge.slot(Hand::Right).device_id(), "right device id");
    let device = must_some(driver.device(id), "right device");
    assert_eq!(device.pose_updates, 2);
    assert_eq!(device.state_updates, 2);
    assert_eq!(bridge.stats().update_failures, 0);
    Ok(())
}

#[test]
fn test_non_modal_updates_arrive_eventually() -> TestResult {
    let (_transport, driver, client) = start_driver()?;
    let mut bridge = HandBridge::new(
        BridgeConfig::default(),
        Arc::clone(&client),
        FixedHead(HeadPose::valid(Matrix3x4::IDENTITY)),
        ZeroClock,
    )?;
    bridge.process_frame(&both_hands());

    let id = must_some(bridge.slot(Hand::Left).device_id(), "left device id");
    assert!(wait_until(Duration::from_secs(2), || {
        driver
            .device(id)
            .is_some_and(|d| d.pose_updates == 1 && d.state_updates == 1)
    }));
    Ok(())
}

#[test]
fn test_unconnected_client_leaves_hands_unregistered() -> TestResult {
    let transport = LocalTransport::new();
    let client = IpcClient::new(IpcConfig::default(), Arc::new(transport));
    let mut bridge = HandBridge::new(
        BridgeConfig::default(),
        client,
        FixedHead(HeadPose::valid(Matrix3x4::IDENTITY)),
        ZeroClock,
    )?;

    let output = bridge.process_frame(&both_hands());
    assert_eq!(output.hand(Hand::Left).hand_state, HandState::Unregistered);
    assert!(!output.hand(Hand::Left).pushed);
    assert_eq!(bridge.stats().registration_failures, 2);
    assert_eq!(bridge.slot(Hand::Left).registration_attempts(), 1);

    // Still retried while the hand stays in view.
    bridge.process_frame(&both_hands());
    assert_eq!(bridge.slot(Hand::Left).registration_attempts(), 2);
    Ok(())
}

#[test]
fn test_invalid_config_is_rejected_by_new() {
    let shared = HandConfig {
        serial: Some("same".to_string()),
        ..HandConfig::default()
    };
    let config = BridgeConfig::default()
        .with_hand(Hand::Left, shared.clone())
        .with_hand(Hand::Right, shared);

    let client = IpcClient::new(IpcConfig::default(), Arc::new(LocalTransport::new()));
    let err = must_err(HandBridge::new(
        config,
        client,
        FixedHead(HeadPose::invalid()),
        ZeroClock,
    ));
    assert!(matches!(err, PipelineError::InvalidConfig(_)));
}
