//! World-state reports: list and status frames composed from a live
//! [`World`].
//!
//! List replies are sequences of single-string frames; the vehicle and
//! isolated-section lists close with a `"none"` entry, the busy-track
//! list does not. The counterpart relies on those shapes.

use railworld_core::node::NodeKind;
use railworld_core::world::World;

use crate::frame::{opcode, sim_params_frame, string_frame};

/// Names of scene vehicles, one frame each, closed with `"none"`. With
/// `all` false only crewed vehicles are listed.
pub fn vehicle_name_list(world: &World, all: bool) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    for id in world.nodes.iter_kind(NodeKind::Vehicle) {
        if let Some(node) = world.nodes.get(id)
            && let Some(vehicle) = node.as_vehicle()
            && (all || vehicle.has_driver)
        {
            frames.push(string_frame(opcode::VEHICLE_NAME, &node.name));
        }
    }
    frames.push(string_frame(opcode::VEHICLE_NAME, "none"));
    frames
}

/// One busy frame per named occupied track; no list terminator.
pub fn track_busy_list(world: &World) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    for id in world.nodes.iter_kind(NodeKind::Track) {
        if let Some(node) = world.nodes.get(id)
            && node.is_named()
            && let Some(track) = node.as_track()
            && !track.is_empty()
        {
            frames.push(string_frame(opcode::TRACK_BUSY, &node.name));
        }
    }
    frames
}

/// Busy/free state change of one track.
pub fn track_state(name: &str, busy: bool) -> Vec<u8> {
    let op = if busy { opcode::TRACK_BUSY } else { opcode::TRACK_FREE };
    string_frame(op, name)
}

/// State of every isolated section, closed with a free `"none"` entry.
pub fn isolated_list(world: &World) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    for (_, section) in world.isolated.iter() {
        let op = if section.busy() { opcode::ISOLATED_BUSY } else { opcode::ISOLATED_FREE };
        frames.push(string_frame(op, &section.name));
    }
    frames.push(string_frame(opcode::ISOLATED_FREE, "none"));
    frames
}

/// State of one isolated section by name; an unknown name reports free.
pub fn isolated_state(world: &World, name: &str) -> Vec<u8> {
    let busy = world
        .isolated
        .find(name)
        .and_then(|id| world.isolated.get(id))
        .map(|s| s.busy())
        .unwrap_or(false);
    let op = if busy { opcode::ISOLATED_BUSY } else { opcode::ISOLATED_FREE };
    string_frame(op, name)
}

/// Current simulation time and pause state.
pub fn sim_params(world: &World, flags: i32) -> Vec<u8> {
    sim_params_frame(flags, world.ctx.clock.day_fraction(), world.ctx.paused)
}

#[cfg(test)]
mod tests {
    use super::*;
    use railworld_core::math::Vec3;
    use railworld_core::test_utils::*;

    fn payload_text(frame: &[u8]) -> &[u8] {
        let len = frame[8] as usize;
        &frame[9..9 + len]
    }

    #[test]
    fn vehicle_list_filters_on_crew_and_terminates() {
        let mut world = empty_world();
        let a = vehicle_at(&mut world, "loco", Vec3::new(10.0, 0.0, 0.0));
        vehicle_at(&mut world, "wagon", Vec3::new(30.0, 0.0, 0.0));
        if let Some(v) = world.nodes.get_mut(a).and_then(|n| n.as_vehicle_mut()) {
            v.has_driver = true;
        }

        let crewed = vehicle_name_list(&world, false);
        assert_eq!(crewed.len(), 2);
        assert_eq!(payload_text(&crewed[0]), b"loco");
        assert_eq!(payload_text(&crewed[1]), b"none");

        let all = vehicle_name_list(&world, true);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn busy_track_list_has_no_terminator() {
        let mut world = empty_world();
        let t1 = straight_track(&mut world, "t1", Vec3::ZERO, 200.0);
        straight_track(&mut world, "t2", Vec3::new(200.0, 0.0, 0.0), 200.0);
        let loco = vehicle_at(&mut world, "loco", Vec3::new(10.0, 0.0, 0.0));
        world
            .nodes
            .get_mut(t1)
            .and_then(|n| n.as_track_mut())
            .unwrap()
            .add_vehicle("t1", loco)
            .unwrap();

        let frames = track_busy_list(&world);
        assert_eq!(frames.len(), 1);
        assert_eq!(payload_text(&frames[0]), b"t1");
    }

    #[test]
    fn isolated_list_reports_both_states() {
        let mut world = empty_world();
        let busy = world.isolated.find_or_create("izol1");
        world.isolated.find_or_create("izol2");
        if let Some(s) = world.isolated.get_mut(busy) {
            s.modify(4);
        }

        let frames = isolated_list(&world);
        assert_eq!(frames.len(), 3);
        let ops: Vec<u32> = frames
            .iter()
            .map(|f| u32::from_le_bytes([f[4], f[5], f[6], f[7]]))
            .collect();
        assert!(ops.contains(&opcode::ISOLATED_BUSY));
        assert_eq!(*ops.last().unwrap(), opcode::ISOLATED_FREE);
        assert_eq!(payload_text(frames.last().unwrap()), b"none");

        let single = isolated_state(&world, "izol1");
        assert_eq!(u32::from_le_bytes([single[4], single[5], single[6], single[7]]), opcode::ISOLATED_BUSY);
        // Unknown sections report free rather than erroring.
        let unknown = isolated_state(&world, "no_such");
        assert_eq!(u32::from_le_bytes([unknown[4], unknown[5], unknown[6], unknown[7]]), opcode::ISOLATED_FREE);
    }

    #[test]
    fn sim_params_reflect_clock_and_pause() {
        let mut world = empty_world();
        world.ctx.clock.set_time_of_day(12, 0);
        world.ctx.paused = true;
        let f = sim_params(&world, 3);
        assert_eq!(f.len(), 20);
        let time = f32::from_le_bytes([f[12], f[13], f[14], f[15]]);
        assert!((time - 0.5).abs() < 1e-6);
        assert_eq!(i32::from_le_bytes([f[16], f[17], f[18], f[19]]), 1);
    }
}
