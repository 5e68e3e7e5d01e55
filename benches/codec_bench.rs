//! Wire codec benchmarks.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use hopsocks::proxy::codec::{DestinationRequest, Greeting};

fn bench_request_encode(c: &mut Criterion) {
    let request = DestinationRequest::connect("www.example.com", 443).unwrap();

    let mut group = c.benchmark_group("request_encode");
    group.throughput(Throughput::Bytes(request.encoded_len() as u64));

    group.bench_function("domain_15", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(64);
            request.encode(&mut buf);
            black_box(buf)
        })
    });

    group.finish();
}

fn bench_request_decode(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();

    let mut group = c.benchmark_group("request_decode");

    // Shortest and longest domains the format allows.
    for len in [1usize, 255] {
        let host = vec![b'a'; len];
        let mut wire = BytesMut::new();
        DestinationRequest::connect(host, 8080).unwrap().encode(&mut wire);
        let wire = wire.freeze();

        group.throughput(Throughput::Bytes(wire.len() as u64));
        group.bench_function(format!("domain_{}", len), |b| {
            b.to_async(&runtime).iter(|| async {
                let mut input: &[u8] = &wire;
                black_box(DestinationRequest::read_from(&mut input).await.unwrap())
            })
        });
    }

    group.finish();
}

fn bench_greeting_decode(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();

    let mut wire = BytesMut::new();
    Greeting::new(vec![0x00, 0x01, 0x02]).unwrap().encode(&mut wire);
    let wire = wire.freeze();

    c.bench_function("greeting_decode", |b| {
        b.to_async(&runtime).iter(|| async {
            let mut input: &[u8] = &wire;
            black_box(Greeting::read_from(&mut input).await.unwrap())
        })
    });
}

criterion_group!(
    benches,
    bench_request_encode,
    bench_request_decode,
    bench_greeting_decode,
);
criterion_main!(benches);
