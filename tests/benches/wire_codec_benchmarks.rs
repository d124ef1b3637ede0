//! # Wire Codec Benchmarks
//!
//! | Path | Cost driver |
//! |------|-------------|
//! | New session | RSA wrap + signature |
//! | Seal on a cached session | XChaCha20 + HMAC + zlib |
//! | Unwrap on the receiver | RSA unwrap + signature check |
//! | Open on a cached session | HMAC + XChaCha20 + zlib |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fc_01_wire_codec::{InboundCipher, LocalIdentity, SessionCipher};
use shared_crypto::RsaKeyPair;
use shared_types::{FlowId, Message, MessageBody, SessionId, Timestamp};
use std::time::Duration;

fn batch(count: usize, size: usize) -> Vec<Message> {
    (0..count as u64)
        .map(|i| {
            Message::new(
                SessionId::Flow(FlowId("F:BENCH".into())),
                "ListProcesses",
                MessageBody::Data(vec![(i % 251) as u8; size]),
            )
            .with_ids(i + 1, 1)
        })
        .collect()
}

fn bench_sessions(c: &mut Criterion) {
    let agent = LocalIdentity::new("C.0000000000000001", RsaKeyPair::generate(2048).unwrap());
    let server = RsaKeyPair::generate(2048).unwrap();

    let mut group = c.benchmark_group("fc-01-session");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("new_session_cipher", |b| {
        b.iter(|| SessionCipher::new(black_box(&agent), server.public_key()).unwrap())
    });

    let session = SessionCipher::new(&agent, server.public_key()).unwrap();
    let envelope = session.seal(&batch(1, 64), Timestamp::from_secs(1)).unwrap();
    group.bench_function("unwrap_inbound_cipher", |b| {
        b.iter(|| InboundCipher::unwrap(black_box(&envelope), &server).unwrap())
    });
    group.finish();
}

fn bench_batches(c: &mut Criterion) {
    let agent = LocalIdentity::new("C.0000000000000001", RsaKeyPair::generate(2048).unwrap());
    let server = RsaKeyPair::generate(2048).unwrap();
    let session = SessionCipher::new(&agent, server.public_key()).unwrap();
    let probe = session.seal(&[], Timestamp::from_secs(1)).unwrap();
    let inbound = InboundCipher::unwrap(&probe, &server).unwrap();

    let mut group = c.benchmark_group("fc-01-batch");
    for count in [1usize, 10, 100] {
        let messages = batch(count, 512);
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("seal", count), &messages, |b, messages| {
            b.iter(|| session.seal(black_box(messages), Timestamp::from_secs(2)).unwrap())
        });

        let envelope = session.seal(&messages, Timestamp::from_secs(2)).unwrap();
        group.bench_with_input(BenchmarkId::new("open", count), &envelope, |b, envelope| {
            b.iter(|| inbound.open(black_box(envelope)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sessions, bench_batches);
criterion_main!(benches);
