//! Codec benchmarks

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use handbridge_geometry::{Quaternion, Vector3};
use handbridge_ipc::codec::{MessageCodec, MessageHeader};
use handbridge_ipc::prelude::*;
use handbridge_ipc::protocol::SetPoseRequest;

fn pose_request() -> SetPoseRequest {
    let mut pose = DevicePose::disconnected();
    pose.device_is_connected = true;
    pose.pose_is_valid = true;
    pose.tracking_result = TrackingResult::Running;
    pose.position = Vector3::new(0.1, -0.2, -0.3);
    pose.rotation = Quaternion::from_axis_angle(&Vector3::new(0.0, 1.0, 0.0), 0.4);
    SetPoseRequest { device_id: 0, pose }
}

fn bench_header_encode(c: &mut Criterion) {
    let header = MessageHeader::request(Opcode::SetPose, 42, 1, false);
    c.bench_function("message_header_encode", |b| {
        b.iter(|| black_box(header.encode()))
    });
}

fn bench_header_decode(c: &mut Criterion) {
    let encoded = MessageHeader::request(Opcode::SetPose, 42, 1, false).encode();
    c.bench_function("message_header_decode", |b| {
        b.iter(|| black_box(MessageHeader::decode(black_box(&encoded)).ok()))
    });
}

fn bench_pose_encode(c: &mut Criterion) {
    let codec = MessageCodec::new();
    let header = MessageHeader::request(Opcode::SetPose, 42, 1, false);
    let request = pose_request();
    c.bench_function("set_pose_encode", |b| {
        b.iter(|| black_box(codec.encode(&header, black_box(&request)).ok()))
    });
}

fn bench_pose_decode(c: &mut Criterion) {
    let codec = MessageCodec::new();
    let header = MessageHeader::request(Opcode::SetPose, 42, 1, false);
    let bytes = codec.encode(&header, &pose_request()).unwrap_or_default();
    c.bench_function("set_pose_decode", |b| {
        b.iter(|| {
            let message = codec.decode(black_box(&bytes)).ok();
            black_box(message.and_then(|m| m.payload_as::<SetPoseRequest>().ok()))
        })
    });
}

criterion_group!(
    benches,
    bench_header_encode,
    bench_header_decode,
    bench_pose_encode,
    bench_pose_decode
);
criterion_main!(benches);
