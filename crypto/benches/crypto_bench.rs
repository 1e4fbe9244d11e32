use criterion::{black_box, criterion_group, criterion_main, Criterion};
use warden_types::AccountId;

fn blake2b_256_bench(c: &mut Criterion) {
    let data = [0xABu8; 256];

    c.bench_function("blake2b_256_256B", |b| {
        b.iter(|| warden_crypto::blake2b_256(black_box(&data)))
    });
}

fn fingerprint_1kb_bench(c: &mut Criterion) {
    let data = vec![0xCDu8; 1024];

    c.bench_function("fingerprint_1KB", |b| {
        b.iter(|| warden_crypto::fingerprint_of(black_box(&data)))
    });
}

fn request_id_bench(c: &mut Criterion) {
    let subject = AccountId::new("subject-bench");
    let proof = warden_crypto::fingerprint_of(b"bench proof");

    c.bench_function("derive_request_id", |b| {
        b.iter(|| warden_crypto::derive_request_id(black_box(&subject), black_box(&proof), 42))
    });
}

criterion_group!(
    benches,
    blake2b_256_bench,
    fingerprint_1kb_bench,
    request_id_bench
);
criterion_main!(benches);
