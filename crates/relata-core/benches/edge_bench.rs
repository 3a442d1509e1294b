//! # Edge Benchmarks
//!
//! Performance benchmarks for relata-core edge operations.
//!
//! Run with: `cargo bench -p relata-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use relata_core::primitives::COLLECTION_SUFFIX;
use relata_core::{
    EdgeCoordinator, EntityRef, MemoryEdgeStore, OrganizationScope, TypeFilter, Version,
};
use std::hint::black_box;
use std::sync::Arc;
use uuid::Uuid;

fn coordinator() -> EdgeCoordinator {
    EdgeCoordinator::new(
        Arc::new(MemoryEdgeStore::new()),
        OrganizationScope::new(Uuid::now_v7()),
        COLLECTION_SUFFIX,
    )
}

/// A head with `size` members in one collection.
fn create_collection(size: usize) -> (EdgeCoordinator, EntityRef, Vec<EntityRef>) {
    let edges = coordinator();
    let head = EntityRef::new("application", Uuid::now_v7());
    let members: Vec<EntityRef> = (0..size)
        .map(|_| EntityRef::new("device", Uuid::now_v7()))
        .collect();

    for member in &members {
        edges
            .write_collection_edge(&head, "devices", member)
            .expect("write");
    }
    (edges, head, members)
}

/// A single target held by `size` owners, each of which re-added it.
fn create_owned_target(size: usize) -> (EdgeCoordinator, EntityRef) {
    let edges = coordinator();
    let target = EntityRef::new("device", Uuid::now_v7());

    for _ in 0..size {
        let owner = EntityRef::new("user", Uuid::now_v7());
        for _ in 0..3 {
            edges
                .write_collection_edge(&owner, "devices", &target)
                .expect("write");
        }
    }
    (edges, target)
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_collection_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection_write");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| black_box(create_collection(size)));
        });
    }

    group.finish();
}

fn bench_membership_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("membership_check");

    for size in [100, 1000, 10000].iter() {
        let (edges, head, members) = create_collection(*size);
        let edge_type = edges.collection_type("devices");
        let member = &members[size / 2];

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(edges.has_live_edge(&head, &edge_type, member)));
        });
    }

    group.finish();
}

fn bench_edge_types(c: &mut Criterion) {
    let mut group = c.benchmark_group("edge_types_from_source");

    for size in [100, 1000, 10000].iter() {
        let (edges, head, _) = create_collection(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let types: Vec<_> = edges
                    .edge_types_from_source(&head)
                    .expect("types")
                    .collect();
                black_box(types)
            });
        });
    }

    group.finish();
}

fn bench_owners_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("owners_scan");

    for size in [100, 500, 1000].iter() {
        let (edges, target) = create_owned_target(*size);
        let filter = edges.collection_filter();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                black_box(
                    edges
                        .edges_to_target(&target, filter.clone(), Version::next())
                        .expect("read")
                        .count(),
                )
            });
        });
    }

    group.finish();
}

fn bench_tombstone_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("tombstone_resolution");

    for size in [100, 1000].iter() {
        let (edges, head, members) = create_collection(*size);
        for member in members.iter().step_by(2) {
            edges
                .remove_collection_edge(&head, "devices", member)
                .expect("remove");
        }

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                black_box(
                    edges
                        .edges_from_source(&head, TypeFilter::Any, Version::next())
                        .expect("read")
                        .count(),
                )
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_collection_write,
    bench_membership_check,
    bench_edge_types,
    bench_owners_scan,
    bench_tombstone_resolution,
);
criterion_main!(benches);
