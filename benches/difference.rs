//! Difference computation over a deep overlay chain

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use cartograph::graph::{BaseLayer, Difference, Graph};
use cartograph::types::Entity;

fn seeded_root(nodes: usize) -> Graph {
    let base = Arc::new(BaseLayer::new());
    let entities: Vec<Arc<Entity>> = (0..nodes)
        .map(|i| {
            Arc::new(
                Entity::node(
                    format!("n{}", i),
                    [(i % 360) as f64 - 180.0, (i % 180) as f64 - 90.0],
                )
                .new_version(1, true),
            )
        })
        .collect();
    base.rebase(&entities, false);
    Graph::new(base)
}

fn edited_chain(root: &Graph, edits: usize) -> Graph {
    let mut graph = root.branch();
    for i in 0..edits {
        let id = format!("n{}", i).into();
        if let Some(entity) = graph.get(&id) {
            graph = graph.replace(entity.moved_to([i as f64 * 0.001, 0.0]));
        }
    }
    graph
}

fn bench_difference(c: &mut Criterion) {
    let root = seeded_root(10_000);

    let shallow = edited_chain(&root, 10);
    c.bench_function("difference_10_edits", |b| {
        b.iter(|| black_box(Difference::between(black_box(&root), black_box(&shallow))))
    });

    let deep = edited_chain(&root, 500);
    c.bench_function("difference_500_edits", |b| {
        b.iter(|| black_box(Difference::between(black_box(&root), black_box(&deep))))
    });

    c.bench_function("difference_identity", |b| {
        b.iter(|| black_box(Difference::between(black_box(&deep), black_box(&deep))))
    });
}

criterion_group!(benches, bench_difference);
criterion_main!(benches);
