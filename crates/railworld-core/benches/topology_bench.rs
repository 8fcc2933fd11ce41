//! Criterion benchmarks for the world engine's hot paths.
//!
//! Three benchmark groups:
//! - `find_track`: nearest-endpoint spiral search over a 10km yard ladder
//! - `first_init`: the full post-load pass over the same yard
//! - `update`: a steady-state frame with 40 vehicles and 200 launchers

use criterion::{criterion_group, criterion_main, Criterion};
use railworld_core::math::Vec3;
use railworld_core::test_utils::*;
use railworld_core::topology;
use railworld_core::world::World;

// ===========================================================================
// Scene builders
// ===========================================================================

/// A yard ladder: 8 parallel lines of chained 100m tracks over 10km,
/// each line under its own overhead wire, one substation per line.
fn build_yard(init: bool) -> World {
    let mut world = empty_world();
    for line in 0..8 {
        let z = line as f64 * 5.0;
        for i in 0..100 {
            let start = Vec3::new(i as f64 * 100.0, 0.0, z);
            straight_track(&mut world, &format!("l{line}_t{i}"), start, 100.0);
            straight_span(&mut world, "", start, 100.0, 5.5);
        }
        substation(&mut world, &format!("sub{line}"), Vec3::new(0.0, 0.0, z));
    }
    if init {
        world.first_init();
    }
    world
}

fn build_busy_yard() -> World {
    let mut world = build_yard(true);
    for i in 0..40 {
        vehicle_at(&mut world, "bench", Vec3::new(i as f64 * 250.0, 0.0, 0.0));
    }
    world
}

// ===========================================================================
// Benchmarks
// ===========================================================================

fn bench_find_track(c: &mut Criterion) {
    let world = build_yard(true);
    let probe = Vec3::new(5_000.0, 0.0, 20.0);
    c.bench_function("find_track_10km_yard", |b| {
        b.iter(|| topology::find_track(&world.nodes, &world.grid, std::hint::black_box(probe), None))
    });
}

fn bench_first_init(c: &mut Criterion) {
    c.bench_function("first_init_10km_yard", |b| {
        b.iter_with_setup(|| build_yard(false), |mut world| world.first_init())
    });
}

fn bench_update(c: &mut Criterion) {
    let mut world = build_busy_yard();
    c.bench_function("update_40_vehicles", |b| {
        b.iter(|| world.update(std::hint::black_box(0.05), 5))
    });
}

criterion_group!(benches, bench_find_track, bench_first_init, bench_update);
criterion_main!(benches);
