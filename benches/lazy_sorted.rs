//! Windowed queries on the lazy collection against a full sort of the same data.

use std::hint::black_box;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};

use deferred_table::prelude::*;

const N: u32 = 100_000;

fn shuffled() -> Vec<u32> {
    // 7919 is coprime with N, so this is a permutation
    (0..N).map(|i| (i * 7919) % N).collect()
}

fn filled() -> LazySortedCollection<u32> {
    let mut collection = LazySortedCollection::with_capacity(SortOrder::natural(), N as usize);
    collection.add_all(shuffled());
    collection
}

fn bench_collection(c: &mut Criterion) {
    c.bench_function("add_100k", |b| {
        let values = shuffled();
        b.iter(|| {
            let mut collection = LazySortedCollection::new(SortOrder::natural());
            collection.add_all(values.iter().copied());
            black_box(collection.len())
        });
    });

    c.bench_function("first_page_of_100k", |b| {
        b.iter_batched(filled, |mut collection| black_box(collection.first(50, true)), BatchSize::LargeInput);
    });

    c.bench_function("middle_page_of_100k", |b| {
        b.iter_batched(
            filled,
            |mut collection| black_box(collection.range(N as usize / 2, 50, true)),
            BatchSize::LargeInput,
        );
    });

    c.bench_function("retain_1k_of_100k", |b| {
        b.iter_batched(
            filled,
            |mut collection| {
                collection.retain(1000);
                black_box(collection.len())
            },
            BatchSize::LargeInput,
        );
    });

    c.bench_function("full_sort_100k", |b| {
        b.iter_batched(filled, |mut collection| black_box(collection.items(true)), BatchSize::LargeInput);
    });

    c.bench_function("std_sort_100k", |b| {
        b.iter_batched(
            shuffled,
            |mut values| {
                values.sort_unstable();
                black_box(values)
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(20);
    targets = bench_collection
);
criterion_main!(benches);
