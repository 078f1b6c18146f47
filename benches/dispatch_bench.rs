//! Dispatcher benchmarks
//!
//! Node selection runs once per accepted request, so its cost sits directly
//! on the packet path.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use radgate_server::{select_node, HandlerNodes, NodeId};
use std::collections::HashSet;

fn node_set(n: usize) -> HashSet<NodeId> {
    (0..n).map(|i| NodeId::new(format!("worker{}", i))).collect()
}

fn bench_select_node(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_node");
    let local = NodeId::from("worker0");

    for size in [1usize, 4, 16, 64] {
        let advertised = node_set(size);
        let preference = HandlerNodes::Nodes(node_set(size));

        group.bench_with_input(BenchmarkId::new("intersect", size), &size, |b, _| {
            let mut rng = rand::rng();
            b.iter(|| {
                black_box(select_node(
                    black_box(&advertised),
                    black_box(&preference),
                    &local,
                    &mut rng,
                ))
            })
        });
    }

    let advertised = node_set(16);
    group.bench_function("local_preference", |b| {
        let mut rng = rand::rng();
        b.iter(|| {
            black_box(select_node(
                black_box(&advertised),
                &HandlerNodes::Local,
                &local,
                &mut rng,
            ))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_select_node);
criterion_main!(benches);
