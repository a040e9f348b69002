//! Codec benchmarks for studyhub-protocol.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use studyhub_protocol::{codec, Frame};

fn bench_encode_event(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_event");
    for size in [64usize, 1024, 16 * 1024] {
        let frame = Frame::event("User_bench", "ReceiveMessage", vec![b'x'; size]);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.iter(|| codec::encode(black_box(frame)))
        });
    }
    group.finish();
}

fn bench_decode_stream(c: &mut Criterion) {
    let frames: Vec<Frame> = (0..32)
        .map(|i| Frame::send_message_with_ack(i, "user-b", "see you at the library"))
        .collect();
    let mut wire = BytesMut::new();
    for frame in &frames {
        wire.extend_from_slice(&codec::encode(frame).unwrap());
    }

    c.bench_function("decode_stream_32_send_message", |b| {
        b.iter(|| {
            let mut buf = wire.clone();
            let mut count = 0;
            while let Ok(Some(frame)) = codec::decode_from(&mut buf) {
                black_box(frame);
                count += 1;
            }
            count
        })
    });
}

criterion_group!(benches, bench_encode_event, bench_decode_stream);
criterion_main!(benches);
