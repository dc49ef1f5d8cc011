//! Stress tests for concurrent calls and failure cleanup

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use handbridge_ipc::codec::encode_payload;
use handbridge_ipc::prelude::*;
use handbridge_ipc::protocol::{ClientConnectReply, PingReply};
use handbridge_test_helpers::prelude::*;

fn fast_config(call_timeout: Duration) -> IpcConfig {
    IpcConfig::default()
        .with_call_timeout(call_timeout)
        .with_recv_poll_interval(Duration::from_millis(5))
}

#[test]
fn concurrent_modal_calls_are_correlated() -> IpcResult<()> {
    const THREADS: u32 = 8;
    const CALLS_PER_THREAD: usize = 50;

    let transport = LocalTransport::new();
    let driver = LoopbackDriver::start(Arc::new(transport.clone()), LoopbackConfig::default())?;
    let client = Arc::new(IpcClient::new(
        fast_config(Duration::from_secs(2)),
        Arc::new(transport),
    ));
    client.connect()?;

    let mut ids = Vec::new();
    for i in 0..THREADS {
        ids.push(client.add_virtual_device(
            VirtualDeviceType::TrackedController,
            &format!("device-{i}"),
            false,
        )?);
    }

    let mut handles = Vec::new();
    for (i, id) in ids.into_iter().enumerate() {
        let client = Arc::clone(&client);
        handles.push(thread::spawn(move || -> IpcResult<usize> {
            let expected = format!("device-{i}");
            let mut matched = 0;
            for _ in 0..CALLS_PER_THREAD {
                let info = client.virtual_device_info(id)?;
                if info.serial == expected && info.device_id == id {
                    matched += 1;
                }
            }
            Ok(matched)
        }));
    }

    for handle in handles {
        let matched = must(handle.join().map_err(|_panic| "worker panicked"))?;
        assert_eq!(matched, CALLS_PER_THREAD);
    }

    assert_eq!(client.pending_calls()?, 0);
    let stats = client.stats();
    assert_eq!(stats.timeouts, 0);
    assert_eq!(stats.stale_replies, 0);
    assert_eq!(stats.replies_matched, stats.requests_sent);
    assert_eq!(
        driver.opcode_count(Opcode::VirtualDeviceInfo),
        THREADS as usize * CALLS_PER_THREAD
    );
    Ok(())
}

#[test]
fn timeout_leaves_no_pending_entry() -> IpcResult<()> {
    let transport = LocalTransport::new();
    let driver = LoopbackDriver::start(Arc::new(transport.clone()), LoopbackConfig::default())?;
    let client = IpcClient::new(fast_config(Duration::from_millis(40)), Arc::new(transport));
    client.connect()?;

    driver.set_silent(Opcode::Ping, true);
    for _ in 0..5 {
        let err = must_err(client.ping());
        assert!(err.is_connection());
    }
    assert_eq!(client.pending_calls()?, 0);
    assert_eq!(client.stats().timeouts, 5);

    driver.set_silent(Opcode::Ping, false);
    assert_eq!(client.ping()?, PROTOCOL_VERSION);
    Ok(())
}

#[test]
fn late_reply_is_discarded() -> IpcResult<()> {
    // Hand-rolled driver that answers the handshake promptly and the next
    // request only after the client has given up.
    let transport = LocalTransport::new();
    let server = transport.create_queue(DEFAULT_SERVER_QUEUE_NAME)?;
    let driver_transport = transport.clone();
    let driver = thread::spawn(move || -> IpcResult<()> {
        let codec = MessageCodec::new();
        let recv = |server: &Arc<dyn MessageQueue>| -> IpcResult<Message> {
            let bytes = server
                .recv_timeout(Duration::from_secs(2))?
                .ok_or_else(|| IpcError::connection("no request"))?;
            codec.decode(&bytes)
        };

        let hello = recv(&server)?;
        let request: handbridge_ipc::protocol::ClientConnectRequest = hello.payload_as()?;
        let client_queue = driver_transport.open_queue(&request.client_queue)?;
        let reply = ClientConnectReply {
            client_id: 1,
            protocol_version: PROTOCOL_VERSION,
        };
        client_queue.try_send(&codec.encode(
            &MessageHeader::reply_to(&hello.header, ReplyStatus::Ok),
            &reply,
        )?)?;

        let ping = recv(&server)?;
        thread::sleep(Duration::from_millis(150));
        let mut bytes = MessageHeader::reply_to(&ping.header, ReplyStatus::Ok)
            .encode()
            .to_vec();
        bytes.extend(encode_payload(&PingReply {
            protocol_version: PROTOCOL_VERSION,
        })?);
        client_queue.try_send(&bytes)
    });

    let client = IpcClient::new(fast_config(Duration::from_millis(50)), Arc::new(transport));
    client.connect()?;
    assert!(client.ping().is_err_and(|e| e.is_connection()));
    must(driver.join().map_err(|_panic| "driver panicked"))?;

    assert!(wait_until(Duration::from_secs(2), || client.stats().stale_replies == 1));
    assert_eq!(client.pending_calls()?, 0);
    assert_eq!(client.stats().replies_matched, 1);
    Ok(())
}

#[test]
fn invalid_id_reply_leaves_no_pending_entry() -> IpcResult<()> {
    let transport = LocalTransport::new();
    let _driver = LoopbackDriver::start(Arc::new(transport.clone()), LoopbackConfig::default())?;
    let client = IpcClient::new(fast_config(Duration::from_secs(2)), Arc::new(transport));
    client.connect()?;

    for _ in 0..20 {
        let err = must_err(client.set_virtual_device_property_string(
            77,
            PropertyKey::SERIAL_NUMBER,
            "ghost",
        ));
        assert!(matches!(err, IpcError::InvalidId { status: 2 }));
    }
    assert_eq!(client.pending_calls()?, 0);
    Ok(())
}

#[test]
fn send_failure_leaves_no_pending_entry() -> IpcResult<()> {
    let transport = LocalTransport::new();
    let driver = LoopbackDriver::start(Arc::new(transport.clone()), LoopbackConfig::default())?;
    let client = IpcClient::new(fast_config(Duration::from_secs(2)), Arc::new(transport));
    client.connect()?;

    driver.stop();
    let err = must_err(client.ping());
    assert!(err.is_connection());
    let err = must_err(client.set_virtual_device_pose(0, &DevicePose::disconnected(), false));
    assert!(err.is_connection());

    assert_eq!(client.pending_calls()?, 0);
    assert_eq!(client.stats().send_failures, 2);
    Ok(())
}

#[test]
fn non_modal_burst_never_blocks() -> IpcResult<()> {
    let transport = LocalTransport::new();
    let driver = LoopbackDriver::start(Arc::new(transport.clone()), LoopbackConfig::default())?;
    let client = IpcClient::new(fast_config(Duration::from_secs(2)), Arc::new(transport));
    client.connect()?;
    let id = client.add_virtual_device(VirtualDeviceType::TrackedController, "burst", true)?;

    let mut state = ControllerState::default();
    let mut sent = 0u64;
    for n in 0..100u32 {
        state.packet_num = n;
        if client.set_virtual_controller_state(id, &state, false).is_ok() {
            sent += 1;
        }
    }

    assert!(wait_until(Duration::from_secs(2), || {
        driver.device(id).is_some_and(|d| d.state_updates == sent)
    }));
    assert_eq!(client.pending_calls()?, 0);
    Ok(())
}

#[test]
fn non_modal_call_does_not_wait_for_a_pending_handshake() -> IpcResult<()> {
    // Nobody serves the server queue, so the handshake runs to its timeout.
    let transport = LocalTransport::new();
    let _server = transport.create_queue(DEFAULT_SERVER_QUEUE_NAME)?;
    let client = Arc::new(IpcClient::new(
        fast_config(Duration::from_millis(800)),
        Arc::new(transport.clone()),
    ));

    let connecting = Arc::clone(&client);
    let handshake = thread::spawn(move || connecting.connect());
    assert!(wait_until(Duration::from_secs(2), || transport.queue_count() == 2));

    let started = Instant::now();
    let result = client.call(Opcode::Ping, &(), false);
    let elapsed = started.elapsed();
    assert!(matches!(result, Err(IpcError::Connection { .. })));
    assert!(!client.is_connected());
    assert!(client.client_id().is_none());
    assert!(
        elapsed < Duration::from_millis(100),
        "non-modal call waited {elapsed:?}"
    );

    let outcome = must(handshake.join().map_err(|_panic| "connect thread panicked"));
    assert!(outcome.is_err_and(|e| e.is_connection()));
    assert_eq!(client.stats().timeouts, 1);
    Ok(())
}
