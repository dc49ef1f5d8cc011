//! Unit tests for the IPC client against the loopback driver

use std::sync::Arc;
use std::time::Duration;

use handbridge_geometry::{Matrix3x4, Quaternion, Vector3};
use handbridge_ipc::prelude::*;
use handbridge_test_helpers::prelude::*;

struct Harness {
    transport: LocalTransport,
    driver: LoopbackDriver,
    client: IpcClient,
}

fn harness_with(driver_config: LoopbackConfig) -> IpcResult<Harness> {
    let transport = LocalTransport::new();
    let driver = LoopbackDriver::start(Arc::new(transport.clone()), driver_config)?;
    let client = IpcClient::new(
        IpcConfig::default()
            .with_call_timeout(Duration::from_millis(500))
            .with_recv_poll_interval(Duration::from_millis(5)),
        Arc::new(transport.clone()),
    );
    Ok(Harness {
        transport,
        driver,
        client,
    })
}

fn connected() -> IpcResult<Harness> {
    let h = harness_with(LoopbackConfig::default())?;
    h.client.connect()?;
    Ok(h)
}

mod connection_tests {
    use super::*;

    #[test]
    fn test_connect_handshake() -> IpcResult<()> {
        let h = connected()?;
        assert!(h.client.is_connected());
        assert_eq!(h.client.client_id(), Some(1));
        assert_eq!(h.client.driver_protocol_version()?, PROTOCOL_VERSION);
        assert_eq!(h.client.ping()?, PROTOCOL_VERSION);
        assert_eq!(h.driver.client_count(), 1);
        Ok(())
    }

    #[test]
    fn test_connect_twice_is_noop() -> IpcResult<()> {
        let h = connected()?;
        h.client.connect()?;
        assert_eq!(h.driver.opcode_count(Opcode::ClientConnect), 1);
        Ok(())
    }

    #[test]
    fn test_version_mismatch_is_connection_error() -> IpcResult<()> {
        let h = harness_with(LoopbackConfig {
            protocol_version: PROTOCOL_VERSION + 1,
            ..LoopbackConfig::default()
        })?;
        let err = must_err(h.client.connect());
        assert!(err.is_connection(), "unexpected error {err:?}");
        assert!(!h.client.is_connected());
        // Client queue was removed again; only the server queue is left.
        assert_eq!(h.transport.queue_count(), 1);
        Ok(())
    }

    #[test]
    fn test_disconnect_is_idempotent_and_notifies_driver() -> IpcResult<()> {
        let h = connected()?;
        h.client.disconnect();
        h.client.disconnect();

        assert!(!h.client.is_connected());
        assert!(wait_until(Duration::from_secs(2), || h.driver.client_count() == 0));
        assert!(matches!(h.client.ping(), Err(IpcError::Connection { .. })));
        assert_eq!(h.transport.queue_count(), 1);
        Ok(())
    }

    #[test]
    fn test_reconnect_gets_new_client_id() -> IpcResult<()> {
        let h = connected()?;
        h.client.disconnect();
        h.client.connect()?;
        assert_eq!(h.client.client_id(), Some(2));
        Ok(())
    }
}

mod device_tests {
    use super::*;

    #[test]
    fn test_add_publish_and_query() -> IpcResult<()> {
        let h = connected()?;
        let id = h
            .client
            .add_virtual_device(VirtualDeviceType::TrackedController, "hand_left", false)?;
        assert_eq!(h.client.virtual_device_count()?, 1);

        let info = h.client.virtual_device_info(id)?;
        assert_eq!(info.serial, "hand_left");
        assert!(!info.published);

        h.client.publish_virtual_device(id)?;
        assert!(h.client.virtual_device_info(id)?.published);
        Ok(())
    }

    #[test]
    fn test_duplicate_serial_is_already_in_use() -> IpcResult<()> {
        let h = connected()?;
        h.client
            .add_virtual_device(VirtualDeviceType::TrackedController, "dup", true)?;
        let err = must_err(h.client.add_virtual_device(
            VirtualDeviceType::TrackedController,
            "dup",
            true,
        ));
        assert!(matches!(err, IpcError::AlreadyInUse { .. }));
        assert_eq!(err.status_code(), Some(ReplyStatus::AlreadyInUse.code()));
        Ok(())
    }

    #[test]
    fn test_device_table_capacity() -> IpcResult<()> {
        let h = harness_with(LoopbackConfig {
            max_devices: 1,
            ..LoopbackConfig::default()
        })?;
        h.client.connect()?;
        h.client
            .add_virtual_device(VirtualDeviceType::TrackedController, "one", true)?;
        let err = must_err(h.client.add_virtual_device(
            VirtualDeviceType::TrackedController,
            "two",
            true,
        ));
        assert!(matches!(err, IpcError::TooManyDevices { status: 6 }));
        Ok(())
    }

    #[test]
    fn test_unknown_device_is_invalid_id() -> IpcResult<()> {
        let h = connected()?;
        assert!(matches!(
            h.client.publish_virtual_device(42),
            Err(IpcError::InvalidId { .. })
        ));
        assert!(matches!(
            h.client.virtual_device_info(42),
            Err(IpcError::InvalidId { .. })
        ));
        Ok(())
    }
}

mod property_tests {
    use super::*;

    #[test]
    fn test_typed_properties_are_stored() -> IpcResult<()> {
        let h = connected()?;
        let id = h
            .client
            .add_virtual_device(VirtualDeviceType::TrackedController, "props", false)?;

        h.client
            .set_virtual_device_property_string(id, PropertyKey::MODEL_NUMBER, "Hand")?;
        h.client.set_virtual_device_property_i32(
            id,
            PropertyKey::DEVICE_CLASS,
            DeviceClass::Controller as i32,
        )?;
        h.client.set_virtual_device_property_u64(
            id,
            PropertyKey::SUPPORTED_BUTTONS,
            buttons::button_mask(buttons::AXIS1),
        )?;
        h.client
            .set_virtual_device_property_bool(id, PropertyKey::WILL_DRIFT_IN_YAW, false)?;
        h.client
            .set_virtual_device_property_f32(id, PropertyKey::BATTERY_PERCENTAGE, 0.5)?;
        h.client.set_virtual_device_property_matrix34(
            id,
            PropertyKey::CAMERA_TO_HEAD_TRANSFORM,
            &Matrix3x4::IDENTITY,
        )?;

        let device = must_some(h.driver.device(id), "device exists");
        assert_eq!(
            device.properties.get(&PropertyKey::MODEL_NUMBER.0),
            Some(&PropertyValue::String("Hand".to_string()))
        );
        assert_eq!(
            device.properties.get(&PropertyKey::DEVICE_CLASS.0),
            Some(&PropertyValue::I32(2))
        );
        assert_eq!(device.properties.len(), 6);
        Ok(())
    }

    #[test]
    fn test_wrong_type_is_invalid_type() -> IpcResult<()> {
        let h = connected()?;
        let id = h
            .client
            .add_virtual_device(VirtualDeviceType::TrackedController, "typed", false)?;
        let err = must_err(h.client.set_virtual_device_property_i32(
            id,
            PropertyKey::SERIAL_NUMBER,
            7,
        ));
        assert!(matches!(err, IpcError::InvalidType { status: 3 }));
        Ok(())
    }

    #[test]
    fn test_remove_property() -> IpcResult<()> {
        let h = connected()?;
        let id = h
            .client
            .add_virtual_device(VirtualDeviceType::TrackedController, "rm", false)?;
        h.client
            .set_virtual_device_property_string(id, PropertyKey::RENDER_MODEL_NAME, "model")?;
        h.client
            .remove_virtual_device_property(id, PropertyKey::RENDER_MODEL_NAME)?;
        assert!(matches!(
            h.client
                .remove_virtual_device_property(id, PropertyKey::RENDER_MODEL_NAME),
            Err(IpcError::NotFound { status: 4 })
        ));
        Ok(())
    }
}

mod update_tests {
    use super::*;

    #[test]
    fn test_non_modal_pose_and_state_are_recorded() -> IpcResult<()> {
        let h = connected()?;
        let id = h
            .client
            .add_virtual_device(VirtualDeviceType::TrackedController, "upd", true)?;

        let mut pose = DevicePose::disconnected();
        pose.device_is_connected = true;
        pose.pose_is_valid = true;
        pose.position = Vector3::new(0.1, 0.2, 0.3);
        h.client.set_virtual_device_pose(id, &pose, false)?;

        let mut state = ControllerState::default();
        state.set_pressed(buttons::AXIS1, true);
        state.axes[1].x = 1.0;
        h.client.set_virtual_controller_state(id, &state, false)?;

        assert!(wait_until(Duration::from_secs(2), || {
            h.driver
                .device(id)
                .is_some_and(|d| d.pose_updates == 1 && d.state_updates == 1)
        }));
        let device = must_some(h.driver.device(id), "device exists");
        assert_eq!(device.last_pose, Some(pose));
        assert_eq!(device.last_state, Some(state));
        assert_eq!(h.client.pending_calls()?, 0);
        Ok(())
    }

    #[test]
    fn test_modal_pose_to_unknown_device_fails() -> IpcResult<()> {
        let h = connected()?;
        let result = h
            .client
            .set_virtual_device_pose(9, &DevicePose::disconnected(), true);
        assert!(matches!(result, Err(IpcError::InvalidId { .. })));
        Ok(())
    }

    #[test]
    fn test_button_mappings() -> IpcResult<()> {
        let h = connected()?;
        let a = h
            .client
            .add_virtual_device(VirtualDeviceType::TrackedController, "a", true)?;
        let b = h
            .client
            .add_virtual_device(VirtualDeviceType::TrackedController, "b", true)?;

        h.client.enable_button_mapping(a, true)?;
        h.client
            .add_button_mapping(a, buttons::GRIP, b, buttons::SYSTEM)?;
        let device = must_some(h.driver.device(a), "device exists");
        assert!(device.button_mapping_enabled);
        assert_eq!(
            device.button_mappings.get(&buttons::GRIP),
            Some(&(b, buttons::SYSTEM))
        );

        h.client.remove_button_mapping(a, buttons::GRIP)?;
        assert!(matches!(
            h.client.remove_button_mapping(a, buttons::GRIP),
            Err(IpcError::NotFound { .. })
        ));
        h.client
            .add_button_mapping(a, buttons::GRIP, b, buttons::SYSTEM)?;
        h.client.clear_button_mappings(a)?;
        assert!(
            must_some(h.driver.device(a), "device exists")
                .button_mappings
                .is_empty()
        );
        Ok(())
    }

    #[test]
    fn test_device_offsets() -> IpcResult<()> {
        let h = connected()?;
        let id = h
            .client
            .add_virtual_device(VirtualDeviceType::TrackedController, "off", true)?;
        let q = Quaternion::from_axis_angle(&Vector3::new(0.0, 1.0, 0.0), 0.5);

        h.client.enable_device_offsets(id, true)?;
        h.client
            .set_rotation_offset(id, OffsetTarget::WorldFromDriver, q)?;
        h.client
            .set_translation_offset(id, OffsetTarget::DriverFromHead, Vector3::new(0.0, 0.0, 0.1))?;

        let device = must_some(h.driver.device(id), "device exists");
        assert!(device.offsets_enabled);
        assert_eq!(
            device.rotation_offsets.get(&OffsetTarget::WorldFromDriver),
            Some(&q)
        );
        assert!(
            device
                .translation_offsets
                .contains_key(&OffsetTarget::DriverFromHead)
        );
        Ok(())
    }

    #[test]
    fn test_motion_compensation() -> IpcResult<()> {
        let h = connected()?;
        let id = h
            .client
            .add_virtual_device(VirtualDeviceType::TrackedController, "ref", true)?;
        h.client.set_motion_compensation_enabled(true)?;
        h.client.set_motion_compensation_device(id)?;
        h.client
            .set_motion_compensation_vel_acc_mode(VelAccCompensationMode::SetZero)?;
        assert!(matches!(
            h.client.set_motion_compensation_device(id + 1),
            Err(IpcError::InvalidId { .. })
        ));

        assert_eq!(
            h.driver.motion_compensation(),
            MotionCompensation {
                enabled: true,
                device_id: Some(id),
                mode: VelAccCompensationMode::SetZero,
            }
        );
        Ok(())
    }
}

mod stats_tests {
    use super::*;

    #[test]
    fn test_counters_track_traffic() -> IpcResult<()> {
        let h = connected()?;
        h.client.ping()?;
        h.client.ping()?;

        let stats = h.client.stats();
        // Handshake plus two pings.
        assert_eq!(stats.requests_sent, 3);
        assert_eq!(stats.replies_matched, 3);
        assert_eq!(stats.timeouts, 0);
        assert_eq!(stats.send_failures, 0);
        Ok(())
    }
}

#[cfg(unix)]
mod unix_transport_tests {
    use super::*;

    #[test]
    fn test_client_and_driver_over_datagram_sockets() -> TestResult {
        let dir = tempfile::tempdir()?;
        let transport = UnixDatagramTransport::new(dir.path(), DEFAULT_MAX_MESSAGE_SIZE);
        let driver = LoopbackDriver::start(Arc::new(transport.clone()), LoopbackConfig::default())?;
        let client = IpcClient::new(
            IpcConfig::default()
                .with_call_timeout(Duration::from_millis(500))
                .with_recv_poll_interval(Duration::from_millis(5)),
            Arc::new(transport),
        );
        client.connect()?;

        assert_eq!(client.ping()?, PROTOCOL_VERSION);
        let id = client.add_virtual_device(VirtualDeviceType::TrackedController, "unix-hand", true)?;
        client.set_virtual_device_property_string(id, PropertyKey::MODEL_NUMBER, "unix")?;
        client.set_virtual_device_pose(id, &DevicePose::default(), false)?;
        assert!(wait_until(Duration::from_secs(2), || {
            driver.device(id).is_some_and(|d| d.pose_updates == 1)
        }));

        let device = must_some(driver.device_by_serial("unix-hand"), "unix device");
        assert!(device.published);
        assert_eq!(
            device.properties.get(&PropertyKey::MODEL_NUMBER.0),
            Some(&PropertyValue::String("unix".to_string()))
        );

        client.disconnect();
        assert!(wait_until(Duration::from_secs(2), || driver.client_count() == 0));
        Ok(())
    }
}
