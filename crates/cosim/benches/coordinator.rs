// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Time Coordinator Benchmark
//!
//! Measures grant recomputation cost for:
//! - a chain of federates, each depending on the previous one
//! - a fully connected group, as formed by endpoint owners
//!
//! Each iteration advances every federate by one step.

#![allow(clippy::cast_possible_truncation)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cosim::{FederateId, Time, TimeCoordinator};

fn build(n: u32, full_mesh: bool) -> TimeCoordinator {
    let mut coord = TimeCoordinator::new();
    for id in 1..=n {
        coord.add_federate(FederateId(id), Time::ZERO);
    }
    for id in 1..=n {
        if full_mesh {
            for other in 1..=n {
                coord.add_dependency(FederateId(id), FederateId(other));
            }
        } else if id > 1 {
            coord.add_dependency(FederateId(id), FederateId(id - 1));
        }
    }
    for id in 1..=n {
        coord.enter_executing(FederateId(id));
    }
    coord
}

/// Request one step for every federate, last to first, so grants cascade.
fn step_all(coord: &mut TimeCoordinator, n: u32, step: u64) -> usize {
    let time = Time::from_nanos(step as i64 * 1_000_000);
    let mut grants = 0;
    for id in (1..=n).rev() {
        if let Ok(g) = coord.request_time(FederateId(id), time) {
            grants += g.len();
        }
    }
    grants
}

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("coordinator_chain");
    for n in [8u32, 64, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let mut coord = build(n, false);
            let mut step = 0u64;
            b.iter(|| {
                step += 1;
                black_box(step_all(&mut coord, n, step))
            });
        });
    }
    group.finish();
}

fn bench_mesh(c: &mut Criterion) {
    let mut group = c.benchmark_group("coordinator_mesh");
    for n in [4u32, 16, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let mut coord = build(n, true);
            let mut step = 0u64;
            b.iter(|| {
                step += 1;
                black_box(step_all(&mut coord, n, step))
            });
        });
    }
    group.finish();
}

fn bench_stall_roots(c: &mut Criterion) {
    let n = 256;
    let mut coord = build(n, false);
    for id in 2..=n {
        let _ = coord.request_time(FederateId(id), Time::from_nanos(1_000));
    }
    c.bench_function("coordinator_stall_roots_256", |b| {
        b.iter(|| black_box(coord.stall_roots()));
    });
}

criterion_group!(benches, bench_chain, bench_mesh, bench_stall_roots);
criterion_main!(benches);
