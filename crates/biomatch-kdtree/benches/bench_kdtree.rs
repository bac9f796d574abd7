use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use biomatch_kdtree::{KdTree, KdTreeParams};

fn random_points(num_points: usize) -> Vec<[f64; 3]> {
    (0..num_points)
        .map(|_| {
            [
                rand::random::<f64>() * 1000.0,
                rand::random::<f64>() * 1000.0,
                rand::random::<f64>() * 1000.0,
            ]
        })
        .collect()
}

fn build(points: &[[f64; 3]]) -> KdTree<f64> {
    let mut tree = KdTree::new(3, KdTreeParams::new(-1.0, points.len())).unwrap();
    for p in points {
        tree.insert(p).unwrap();
    }
    tree
}

fn bench_kdtree(c: &mut Criterion) {
    let mut group = c.benchmark_group("kdtree");

    for num_points in [1_000, 10_000, 100_000].iter() {
        let points = random_points(*num_points);
        let queries = random_points(1_000);

        group.bench_with_input(BenchmarkId::new("build", num_points), &points, |b, p| {
            b.iter(|| black_box(build(p)))
        });

        let tree = build(&points);
        group.bench_with_input(
            BenchmarkId::new("nearest_neighbor", num_points),
            &queries,
            |b, q| {
                b.iter(|| {
                    for query in q {
                        black_box(tree.nearest_neighbor(query, f64::INFINITY).unwrap());
                    }
                })
            },
        );

        group.bench_with_input(
            BenchmarkId::new("brute_force", num_points),
            &queries,
            |b, q| {
                b.iter(|| {
                    for query in q {
                        let best = points
                            .iter()
                            .map(|p| {
                                (p[0] - query[0]).powi(2)
                                    + (p[1] - query[1]).powi(2)
                                    + (p[2] - query[2]).powi(2)
                            })
                            .fold(f64::INFINITY, f64::min);
                        black_box(best);
                    }
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_kdtree);
criterion_main!(benches);
