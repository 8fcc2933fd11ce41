//! Property-based tests for the world core.
//!
//! Uses proptest to generate random triangles, event batches and track
//! chains, then verifies the order and partition invariants hold.

use proptest::prelude::*;
use railworld_core::context::{WorldConfig, WorldContext};
use railworld_core::divider;
use railworld_core::event::{Event, EventAction, EventRegistry};
use railworld_core::id::TextureId;
use railworld_core::math::Vec3;
use railworld_core::node::{Geometry, Primitive, Vertex};
use railworld_core::registry::NodeRegistry;
use railworld_core::scheduler::EventScheduler;
use railworld_core::test_utils::*;

// ===========================================================================
// Generators
// ===========================================================================

fn vert(x: f64, z: f64) -> Vertex {
    Vertex {
        point: Vec3::new(x, 0.0, z),
        normal: Vec3::new(0.0, 1.0, 0.0),
        u: x / 100.0,
        v: z / 100.0,
    }
}

fn arb_triangle() -> impl Strategy<Value = [Vertex; 3]> {
    let coord = -3000.0..3000.0f64;
    [
        (coord.clone(), coord.clone()),
        (coord.clone(), coord.clone()),
        (coord.clone(), coord),
    ]
    .prop_map(|[(ax, az), (bx, bz), (cx, cz)]| [vert(ax, az), vert(bx, bz), vert(cx, cz)])
}

fn triangle_area(v: &[Vertex]) -> f64 {
    let (a, b, c) = (v[0].point, v[1].point, v[2].point);
    0.5 * ((b.x - a.x) * (c.z - a.z) - (b.z - a.z) * (c.x - a.x)).abs()
}

fn total_area(g: &Geometry) -> f64 {
    g.vertices.chunks_exact(3).map(triangle_area).sum()
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Subdivision is a partition: vertex counts stay a multiple of three
    /// and the summed area of the pieces equals the input area.
    #[test]
    fn divider_partitions_without_area_loss(tri in arb_triangle()) {
        let mut g = Geometry::new(Primitive::Triangles, TextureId(1));
        g.vertices = tri.to_vec();
        let before = total_area(&g);

        let extra = divider::divide(&mut g);
        let mut after = total_area(&g);
        for piece in &extra {
            prop_assert_eq!(piece.vertices.len() % 3, 0);
            after += total_area(piece);
        }
        prop_assert_eq!(g.vertices.len() % 3, 0);
        prop_assert!((after - before).abs() <= 1e-6 * before.max(1.0));
    }

    /// Queue order: a batch of random delays dispatches in start order,
    /// with equal starts preserving activation order.
    #[test]
    fn scheduler_dispatches_in_stable_start_order(delays in proptest::collection::vec(0..5u8, 1..20)) {
        let mut scheduler = EventScheduler::new();
        let mut events = EventRegistry::new();
        let mut nodes = NodeRegistry::new();
        let mut ctx = WorldContext::new(WorldConfig::default());

        for (i, &d) in delays.iter().enumerate() {
            let mut ev = Event::new(
                &format!("ev{i}"),
                EventAction::Message { text: String::new() },
            );
            ev.delay = f64::from(d);
            let id = events.insert(ev);
            scheduler.add_to_queue(&mut events, &mut nodes, &mut ctx, id, None);
        }
        ctx.clock.advance(10.0);
        scheduler.check_queue(&mut events, &mut nodes, &mut ctx);

        let mut expected: Vec<usize> = (0..delays.len()).collect();
        expected.sort_by_key(|&i| delays[i]);
        let dispatched: Vec<String> = scheduler
            .drain_dispatched()
            .into_iter()
            .map(|r| r.event_name)
            .collect();
        let wanted: Vec<String> = expected.iter().map(|i| format!("ev{i}")).collect();
        prop_assert_eq!(dispatched, wanted);
    }

    /// Link symmetry: a contiguous chain of tracks links every joint
    /// mutually, and the two chain ends stay open.
    #[test]
    fn track_chain_links_are_mutual(lengths in proptest::collection::vec(50.0..300.0f64, 2..12)) {
        let mut world = empty_world();
        let mut ids = Vec::new();
        let mut x = 0.0;
        for (i, len) in lengths.iter().enumerate() {
            ids.push(straight_track(
                &mut world,
                &format!("t{i}"),
                Vec3::new(x, 0.0, 0.0),
                *len,
            ));
            x += len;
        }
        world.first_init();

        let track = |id| world.nodes.get(id).and_then(|n| n.as_track()).unwrap();
        for pair in ids.windows(2) {
            let a = track(pair[0]);
            let b = track(pair[1]);
            prop_assert_eq!(a.next.map(|c| c.target), Some(pair[1]));
            prop_assert_eq!(a.next.map(|c| c.direction), Some(0));
            prop_assert_eq!(b.prev.map(|c| c.target), Some(pair[0]));
            prop_assert_eq!(b.prev.map(|c| c.direction), Some(1));
        }
        prop_assert!(track(ids[0]).prev.is_none());
        prop_assert!(track(*ids.last().unwrap()).next.is_none());
    }
}
