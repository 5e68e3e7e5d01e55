//! Relay throughput over in-memory pipes.

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

use hopsocks::proxy::relay;

fn bench_relay_throughput(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();

    let mut group = c.benchmark_group("relay");

    for size in [64 * 1024usize, 1024 * 1024] {
        let payload = vec![0x5au8; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("one_way_{}k", size / 1024), |b| {
            b.to_async(&runtime).iter(|| {
                let payload = payload.clone();
                async move {
                    let (a, mut a_peer) = duplex(64 * 1024);
                    let (b_side, mut b_peer) = duplex(64 * 1024);
                    let session = tokio::spawn(relay(a, b_side));

                    let writer = tokio::spawn(async move {
                        a_peer.write_all(&payload).await.unwrap();
                        a_peer.shutdown().await.unwrap();
                        a_peer
                    });

                    let mut sink = Vec::with_capacity(size);
                    b_peer.read_to_end(&mut sink).await.unwrap();
                    b_peer.shutdown().await.unwrap();

                    let _a_peer = writer.await.unwrap();
                    session.await.unwrap().unwrap()
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_relay_throughput);
criterion_main!(benches);
