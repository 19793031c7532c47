//! Protocol encoding/decoding benchmarks.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use muxrpc_protocol::frame::Frame;
use muxrpc_protocol::{Decoder, Encoder, RequestFrame, ResponseFrame};

fn create_test_request(payload_size: usize) -> RequestFrame {
    let args = serde_json::json!({
        "DestAddrs": ["tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx"],
        "Amts": [50000],
        "Memo": "x".repeat(payload_size),
    });
    RequestFrame::new(42, "LitRPC.Send", serde_json::to_vec(&args).unwrap())
}

fn create_test_response(payload_size: usize) -> ResponseFrame {
    let result = serde_json::json!({
        "Txids": ["x".repeat(payload_size)],
    });
    ResponseFrame::ok(42, serde_json::to_vec(&result).unwrap())
}

fn bench_frame_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode");

    for size in [100, 1000, 10000] {
        let frame = Frame::new(Bytes::from("x".repeat(size)));

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.iter(|| black_box(frame.encode().unwrap()));
        });
    }

    group.finish();
}

fn bench_frame_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decode");

    for size in [100, 1000, 10000] {
        let encoded = Frame::new(Bytes::from("x".repeat(size))).encode().unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
            b.iter(|| {
                let mut buf = encoded.clone();
                black_box(Frame::decode(&mut buf).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_request_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_encode");

    for size in [100, 1000, 10000] {
        let request = create_test_request(size);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &request, |b, request| {
            b.iter(|| black_box(Encoder::encode_request(request).unwrap()));
        });
    }

    group.finish();
}

fn bench_response_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_decode");

    for size in [100, 1000, 10000] {
        let encoded = Encoder::encode_response(&create_test_response(size)).unwrap();

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
            b.iter(|| {
                let mut decoder = Decoder::new();
                decoder.extend(encoded);
                black_box(decoder.decode_response().unwrap())
            });
        });
    }

    group.finish();
}

/// Many small responses arriving in one read, as a busy node delivers them.
fn bench_response_stream_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_stream_decode");

    let count = 256u64;
    let mut stream = Vec::new();
    for id in 0..count {
        let response = ResponseFrame::ok(id, &b"{\"Confirmed\":1500,\"Unconfirmed\":0}"[..]);
        stream.extend_from_slice(&Encoder::encode_response(&response).unwrap());
    }

    group.throughput(Throughput::Elements(count));
    group.bench_function("batch_256", |b| {
        b.iter(|| {
            let mut decoder = Decoder::new();
            decoder.extend(&stream);
            let mut decoded = 0;
            while let Some(response) = decoder.decode_response().unwrap() {
                black_box(response);
                decoded += 1;
            }
            assert_eq!(decoded, count);
        });
    });

    group.finish();
}

fn bench_crc32c(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc32c");

    for size in [100, 1000, 10000, 100000] {
        let data = vec![0x42u8; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| black_box(crc32c::crc32c(data)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_frame_encode,
    bench_frame_decode,
    bench_request_encode,
    bench_response_decode,
    bench_response_stream_decode,
    bench_crc32c,
);

criterion_main!(benches);
