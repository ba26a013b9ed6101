// Signing & verification benchmarks for the TAD identity/crypto stack.
//
// Covers Ed25519 keypair generation, canonical-encoding + signing of a
// representative gossip message, verification, and batch verification at
// various fanout sizes.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use tad_core::identity::canonical;
use tad_core::identity::keypair::SigningKeypair;
use tad_core::identity::node_id::NodeId;
use tad_core::crypto::signatures::{batch_verify_canonical, sign_canonical, verify_canonical};
use tad_core::persistence::models::Message;

fn sample_message(sender_id: NodeId, seq: u64) -> Message {
    Message {
        id: format!("msg-{seq:08}"),
        timestamp: 1_700_000_000.0 + seq as f64,
        sender_id,
        sender_name: Some("alice".into()),
        channel: "#general".into(),
        content: "gossip travels fast on a quiet LAN".into(),
        encrypted: false,
        nonce: None,
        signature: String::new(),
        ttl: 5,
        hop_count: 0,
    }
}

fn bench_keypair_generation(c: &mut Criterion) {
    c.bench_function("ed25519/keypair_generate", |b| {
        b.iter(SigningKeypair::generate);
    });
}

fn bench_canonicalize_message(c: &mut Criterion) {
    let kp = SigningKeypair::generate();
    let node_id = NodeId::from_public_key(&kp.public_key());
    let message = sample_message(node_id, 0);

    c.bench_function("canonical/encode_message", |b| {
        b.iter(|| canonical::to_canonical_json(&message.signable_fields()).unwrap());
    });
}

fn bench_sign_message(c: &mut Criterion) {
    let kp = SigningKeypair::generate();
    let node_id = NodeId::from_public_key(&kp.public_key());
    let message = sample_message(node_id, 0);

    c.bench_function("ed25519/sign_message", |b| {
        b.iter(|| sign_canonical(&kp, &message.signable_fields()).unwrap());
    });
}

fn bench_verify_signature(c: &mut Criterion) {
    let kp = SigningKeypair::generate();
    let node_id = NodeId::from_public_key(&kp.public_key());
    let message = sample_message(node_id, 0);
    let signature = sign_canonical(&kp, &message.signable_fields()).unwrap();
    let public_key = kp.public_key();

    c.bench_function("ed25519/verify_signature", |b| {
        b.iter(|| verify_canonical(&public_key, &message.signable_fields(), &signature));
    });
}

fn bench_batch_verify(c: &mut Criterion) {
    let mut group = c.benchmark_group("ed25519/batch_verify");

    for size in [10, 50, 100, 500] {
        let items: Vec<_> = (0..size)
            .map(|i| {
                let kp = SigningKeypair::generate();
                let node_id = NodeId::from_public_key(&kp.public_key());
                let message = sample_message(node_id, i as u64);
                let signable = message.signable_fields();
                let sig = sign_canonical(&kp, &signable).unwrap();
                (kp.public_key(), message, sig)
            })
            .collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &items, |b, items| {
            b.iter(|| {
                let pairs: Vec<_> = items
                    .iter()
                    .map(|(pk, msg, sig)| (pk.clone(), msg.signable_fields(), sig.clone()))
                    .collect();
                assert!(batch_verify_canonical(&pairs));
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_keypair_generation,
    bench_canonicalize_message,
    bench_sign_message,
    bench_verify_signature,
    bench_batch_verify,
);
criterion_main!(benches);
