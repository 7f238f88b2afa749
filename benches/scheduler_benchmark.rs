//! Scheduler hot-path benchmarks: `select`/`batch_select` cost across
//! cluster snapshot sizes, for every built-in placement policy
//! (`spec.md` §4.3).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use netpulse::cluster::NodeInfo;
use netpulse::scheduler::{Greedy, LeastLoad, LeastLoadRandom, LoadWeightedRandom};
use netpulse::traits::Scheduler;

fn snapshot(size: usize) -> Vec<NodeInfo> {
    (0..size)
        .map(|i| NodeInfo {
            node_id: format!("node-{i}"),
            hostname: format!("host-{i}"),
            capacity: 16,
            count: (i % 15) as u32,
            last_heartbeat: 0,
        })
        .collect()
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_select");
    for size in [1usize, 8, 64, 512] {
        let nodes = snapshot(size);

        group.bench_with_input(BenchmarkId::new("greedy", size), &nodes, |b, nodes| {
            let scheduler = Greedy;
            b.iter(|| scheduler.select(black_box(nodes), black_box("10.0.0.1")));
        });
        group.bench_with_input(BenchmarkId::new("least_load", size), &nodes, |b, nodes| {
            let scheduler = LeastLoad;
            b.iter(|| scheduler.select(black_box(nodes), black_box("10.0.0.1")));
        });
        group.bench_with_input(BenchmarkId::new("least_load_random", size), &nodes, |b, nodes| {
            let scheduler = LeastLoadRandom;
            b.iter(|| scheduler.select(black_box(nodes), black_box("10.0.0.1")));
        });
        group.bench_with_input(BenchmarkId::new("load_weighted_random", size), &nodes, |b, nodes| {
            let scheduler = LoadWeightedRandom;
            b.iter(|| scheduler.select(black_box(nodes), black_box("10.0.0.1")));
        });
    }
    group.finish();
}

fn bench_batch_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_batch_select");
    for size in [8usize, 64, 512] {
        let nodes = snapshot(size / 4 + 1);
        let hosts: Vec<String> = (0..size).map(|i| format!("10.0.{}.{}", i / 256, i % 256)).collect();

        group.bench_with_input(BenchmarkId::new("greedy", size), &(nodes.clone(), hosts.clone()), |b, (nodes, hosts)| {
            let scheduler = Greedy;
            b.iter(|| scheduler.batch_select(black_box(nodes), black_box(hosts)));
        });
        group.bench_with_input(
            BenchmarkId::new("load_weighted_random", size),
            &(nodes, hosts),
            |b, (nodes, hosts)| {
                let scheduler = LoadWeightedRandom;
                b.iter(|| scheduler.batch_select(black_box(nodes), black_box(hosts)));
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_select, bench_batch_select);
criterion_main!(benches);
