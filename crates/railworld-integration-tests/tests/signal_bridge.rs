//! End-to-end frames for the external signaling process: a live world is
//! stepped, then its state is serialized and checked byte for byte.

use railworld_core::math::Vec3;
use railworld_core::test_utils::*;
use railworld_ipc::frame::{event_frame, opcode, SIGNATURE};
use railworld_ipc::report;
use railworld_ipc::telemetry::{vehicle_telemetry_frame, VehicleTelemetry};

fn op_of(frame: &[u8]) -> u32 {
    u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]])
}

fn text_of(frame: &[u8]) -> &[u8] {
    let len = frame[8] as usize;
    &frame[9..9 + len]
}

// ============================================================================
// 1. Dispatched events become opcode 2 frames
// ============================================================================

#[test]
fn dispatch_records_serialize_as_event_frames() {
    let mut world = empty_world();
    memcell_at(&mut world, "panel", Vec3::ZERO, "");
    let ev = world.add_event(delayed(text_event("sem_w5", "panel", "s1"), 1.0));
    let loco = vehicle_at(&mut world, "EP07-424", Vec3::ZERO);
    world.first_init();
    world.queue_event(ev, Some(loco));
    world.update(1.5, 1);

    let records = world.scheduler.drain_dispatched();
    assert_eq!(records.len(), 1);
    let frame = event_frame(&records[0].event_name, &records[0].activator_name);
    assert_eq!(&frame[0..4], &SIGNATURE.to_le_bytes());
    assert_eq!(op_of(&frame), opcode::EVENT);
    assert_eq!(frame.len(), 12 + "sem_w5".len() + "EP07-424".len());
    assert_eq!(text_of(&frame), b"sem_w5");
}

// ============================================================================
// 2. List replies from a populated yard
// ============================================================================

#[test]
fn yard_state_reports_round_trip() {
    let mut world = empty_world();
    let t1 = straight_track(&mut world, "st_a", Vec3::ZERO, 200.0);
    straight_track(&mut world, "st_b", Vec3::new(200.0, 0.0, 0.0), 200.0);
    let loco = vehicle_at(&mut world, "eu07", Vec3::new(10.0, 0.0, 0.0));
    if let Some(v) = world.nodes.get_mut(loco).and_then(|n| n.as_vehicle_mut()) {
        v.has_driver = true;
    }
    if let Some(t) = world.nodes.get_mut(t1).and_then(|n| n.as_track_mut()) {
        t.add_vehicle("st_a", loco).unwrap();
    }
    let section = world.isolated.find_or_create("iz_blok");
    world.first_init();
    world.isolated_modify(section, 1);

    // Crewed vehicle list ends with "none".
    let names = report::vehicle_name_list(&world, false);
    assert_eq!(names.len(), 2);
    assert_eq!(text_of(&names[0]), b"eu07");
    assert_eq!(text_of(&names[1]), b"none");

    // Only the occupied track appears, with no terminator.
    let busy = report::track_busy_list(&world);
    assert_eq!(busy.len(), 1);
    assert_eq!(op_of(&busy[0]), opcode::TRACK_BUSY);
    assert_eq!(text_of(&busy[0]), b"st_a");

    // The isolated section reports busy; the list closes with a free "none".
    let iso = report::isolated_list(&world);
    assert_eq!(iso.len(), 2);
    assert_eq!(op_of(&iso[0]), opcode::ISOLATED_BUSY);
    assert_eq!(text_of(&iso[0]), b"iz_blok");
    assert_eq!(op_of(&iso[1]), opcode::ISOLATED_FREE);
    assert_eq!(text_of(&iso[1]), b"none");
}

// ============================================================================
// 3. Simulation parameters track the stepped clock
// ============================================================================

#[test]
fn sim_params_follow_clock_and_pause() {
    let mut world = empty_world();
    world.ctx.clock.set_time_of_day(18, 0);
    let frame = report::sim_params(&world, 1);
    let day = f32::from_le_bytes([frame[12], frame[13], frame[14], frame[15]]);
    assert!((day - 0.75).abs() < 1e-6);
    assert_eq!(
        i32::from_le_bytes([frame[16], frame[17], frame[18], frame[19]]),
        0
    );

    world.ctx.paused = true;
    let frame = report::sim_params(&world, 1);
    assert_eq!(
        i32::from_le_bytes([frame[16], frame[17], frame[18], frame[19]]),
        1
    );
}

// ============================================================================
// 4. Telemetry from a stepped vehicle
// ============================================================================

#[test]
fn stepped_vehicle_telemetry_snapshot() {
    let mut world = empty_world();
    let loco = vehicle_at(&mut world, "ET22-1092", Vec3::ZERO);
    if let Some(v) = world.nodes.get_mut(loco).and_then(|n| n.as_vehicle_mut()) {
        v.velocity = 25.0;
    }
    world.first_init();
    world.update(4.0, 4);

    let v = world.nodes.get(loco).and_then(|n| n.as_vehicle()).unwrap();
    let t = VehicleTelemetry {
        name: world.nodes.get(loco).map(|n| n.name.clone()).unwrap_or_default(),
        day_fraction: world.ctx.clock.day_fraction(),
        position: v.position,
        velocity: v.velocity,
        distance_km: v.distance_km,
        ..Default::default()
    };
    let frame = vehicle_telemetry_frame(&t);
    assert_eq!(frame.len(), 10 + 128 + t.name.len());
    assert_eq!(op_of(&frame), opcode::VEHICLE_TELEMETRY);
    let pos_x = f32::from_le_bytes([frame[16], frame[17], frame[18], frame[19]]);
    assert!((f64::from(pos_x) - 100.0).abs() < 1e-3);
    let dist = f32::from_le_bytes([frame[52], frame[53], frame[54], frame[55]]);
    assert!((f64::from(dist) - 0.1).abs() < 1e-6);
}
