//! Proof benchmarks
//!
//! Measures committing a tree, producing a key proof from a cold tree, and
//! verifying that proof against its root.
//!
//! ```bash
//! cargo bench --bench proof
//! ```

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use mkvs::{verify_proof, Context, Hash, MemoryStore, Namespace, Proof, Tree};
use std::hint::black_box;

const KEYS: usize = 10_000;

fn key(i: usize) -> Vec<u8> {
    format!("account/{:08}", i).into_bytes()
}

fn populated(store: &MemoryStore) -> Hash {
    let ctx = Context::background();
    let mut tree = Tree::new(store);
    for i in 0..KEYS {
        tree.insert(&ctx, &key(i), &i.to_le_bytes()).unwrap();
    }
    tree.commit(&ctx, Namespace::default(), 0).unwrap()
}

fn benchmark_commit(c: &mut Criterion) {
    c.bench_function("commit 10k keys", |b| {
        b.iter_batched(
            MemoryStore::new,
            |store| black_box(populated(&store)),
            BatchSize::LargeInput,
        )
    });
}

fn benchmark_proofs(c: &mut Criterion) {
    let store = MemoryStore::new();
    let root = populated(&store);
    let ctx = Context::background();

    c.bench_function("prove key from cold tree", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 7919) % KEYS;
            let mut tree = Tree::from_root(&store, root);
            black_box(tree.get_proof(&ctx, &key(i)).unwrap())
        })
    });

    let proofs: Vec<Proof> = (0..64)
        .map(|i| {
            let mut tree = Tree::from_root(&store, root);
            tree.get_proof(&ctx, &key(i * 97)).unwrap()
        })
        .collect();

    c.bench_function("verify key proof", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % proofs.len();
            black_box(verify_proof(&root, &proofs[i]).unwrap())
        })
    });

    c.bench_function("decode cbor proof", |b| {
        let encoded = proofs[0].to_cbor().unwrap();
        b.iter(|| black_box(Proof::from_cbor(&encoded).unwrap()))
    });
}

criterion_group!(benches, benchmark_commit, benchmark_proofs);
criterion_main!(benches);
