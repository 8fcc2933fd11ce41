//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::context::WorldConfig;
use crate::event::{Event, EventAction, NodeRef};
use crate::id::{NodeId, TextureId};
use crate::math::Vec3;
use crate::memcell::MemoryCell;
use crate::node::{NodePayload, WorldNode};
use crate::track::{Track, TrackKind};
use crate::traction::{PowerSource, TractionSpan};
use crate::vehicle::Vehicle;
use crate::world::World;

// ===========================================================================
// World constructors
// ===========================================================================

pub fn empty_world() -> World {
    World::new(WorldConfig::default())
}

pub fn world_with(config: WorldConfig) -> World {
    World::new(config)
}

// ===========================================================================
// Node constructors
// ===========================================================================

/// A straight rail track from `start`, `length` meters along +X.
pub fn straight_track(world: &mut World, name: &str, start: Vec3, length: f64) -> NodeId {
    let end = start + Vec3::new(length, 0.0, 0.0);
    let mid = (start + end) / 2.0;
    let mut track = Track::new(TrackKind::Normal, start, mid, end);
    track.texture1 = TextureId(1);
    world.add_node(WorldNode::new(name, mid, NodePayload::Track(track)))
}

/// A horizontal overhead span from `start`, `length` meters along +X at
/// wire height `height`.
pub fn straight_span(world: &mut World, name: &str, start: Vec3, length: f64, height: f64) -> NodeId {
    let p1 = Vec3::new(start.x, height, start.z);
    let p2 = p1 + Vec3::new(length, 0.0, 0.0);
    let mut span = TractionSpan::new(p1, p2);
    span.resistivity = 0.0002;
    let center = span.center();
    world.add_node(WorldNode::new(name, center, NodePayload::Traction(span)))
}

pub fn substation(world: &mut World, name: &str, at: Vec3) -> NodeId {
    let source = PowerSource::new(3000.0, 2500.0, 0.075);
    world.add_node(WorldNode::new(name, at, NodePayload::PowerSource(source)))
}

pub fn memcell_at(world: &mut World, name: &str, at: Vec3, text: &str) -> NodeId {
    let cell = MemoryCell::new(text, 0.0, 0.0);
    world.add_node(WorldNode::new(name, at, NodePayload::MemoryCell(cell)))
}

pub fn vehicle_at(world: &mut World, name: &str, at: Vec3) -> NodeId {
    let v = Vehicle::new(at, Vec3::new(1.0, 0.0, 0.0));
    world.add_node(WorldNode::new(name, at, NodePayload::Vehicle(v)))
}

// ===========================================================================
// Event constructors
// ===========================================================================

/// An update-values event writing `text` into the named cell.
pub fn text_event(name: &str, cell: &str, text: &str) -> Event {
    Event::new(
        name,
        EventAction::UpdateValues {
            cell: NodeRef::named(cell),
            text: text.to_string(),
            value1: 0.0,
            value2: 0.0,
            mask: crate::event::flags::UPDATE_MEM_STRING,
        },
    )
}

/// A delayed copy of `event`.
pub fn delayed(mut event: Event, delay: f64) -> Event {
    event.delay = delay;
    event
}
