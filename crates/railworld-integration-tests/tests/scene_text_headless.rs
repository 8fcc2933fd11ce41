//! Scene-text round trips: legacy scenery source through the loader,
//! `firstinit` and the stepper.
//!
//! The scenery snippets are written in the legacy grammar, with the
//! statement shapes real scenery files use. Each test loads one snippet
//! and asserts on the initialized world rather than on the parse.

use railworld_core::math::Vec3;
use railworld_core::registry::NameClass;
use railworld_core::world::World;
use railworld_scene::{load_str, LoaderConfig};

const YARD_TRACK: &str = "node -1 0 t1 track normal 100 1.435 1.0 50 0 0 flat vis \
    rail_screw 4 tpd-new 0.2 1.0 1.1 \
    0 0 0 0.0  0 0 0  0 0 0  100 0 0 0.0  0 \
    velocity 80 isolated iso1 event1 sem_w5 endtrack";

fn load(text: &str) -> World {
    load_str(text, LoaderConfig::default()).unwrap().world
}

fn cell_text(world: &World, name: &str) -> String {
    world
        .nodes
        .find(NameClass::MemoryCell, name)
        .and_then(|id| world.nodes.get(id))
        .and_then(|n| n.as_memcell())
        .map(|c| c.text().to_string())
        .unwrap_or_default()
}

// ============================================================================
// 1. Cross-references resolve at firstinit
// ============================================================================

#[test]
fn track_event_and_isolated_section_wire_up() {
    let world = load(&format!(
        "{YARD_TRACK} \
         event sem_w5 updatevalues 0 cellX ShuntVelocity * 20 endevent \
         node -1 0 cellX memcell 5 0 0 Wait_for_orders 0 0 t1 endmemcell \
         firstinit"
    ));

    let t1 = world.nodes.find(NameClass::Track, "t1").unwrap();
    let track = world.nodes.get(t1).unwrap().as_track().unwrap();
    let sem = world.events.find("sem_w5").unwrap();
    assert_eq!(track.events.event1, Some(sem));
    assert_eq!(track.velocity, 80.0);

    // The isolated section exists with a synthesized cell of its name.
    let iso = world.isolated.find("iso1").unwrap();
    let cell = world.isolated.get(iso).unwrap().cell.unwrap();
    assert_eq!(world.nodes.find(NameClass::MemoryCell, "iso1"), Some(cell));

    // The authored cell bound to its broadcast track by name.
    let cx = world.nodes.find(NameClass::MemoryCell, "cellX").unwrap();
    let cell = world.nodes.get(cx).unwrap().as_memcell().unwrap();
    assert_eq!(cell.attached_track, Some(t1));
}

// ============================================================================
// 2. Startup events
// ============================================================================

#[test]
fn onstart_event_dispatches_on_the_first_frame() {
    let mut world = load(
        "node -1 0 panel memcell 0 0 0 dark 0 0 none endmemcell \
         event lampy_onstart updatevalues 0 panel jasno * * endevent \
         firstinit",
    );
    assert_eq!(cell_text(&world, "panel"), "dark");
    world.update(0.05, 1);
    assert_eq!(cell_text(&world, "panel"), "jasno");
}

// ============================================================================
// 3. Trainsets under the stepper
// ============================================================================

#[test]
fn loaded_trainset_rolls_on_update() {
    let mut world = load(&format!(
        "{YARD_TRACK} \
         trainset ros1 t1 10 36 \
         node -1 0 loco dynamic pkp/et22 none et22 0 headdriver 3 0 enddynamic \
         node -1 0 car dynamic pkp/111a none 111a 0 nobody 3 0 enddynamic \
         endtrainset \
         firstinit"
    ));

    let loco = world.nodes.find(NameClass::Vehicle, "loco").unwrap();
    let before = world
        .nodes
        .get(loco)
        .and_then(|n| n.as_vehicle())
        .map(|v| v.position)
        .unwrap();
    world.update(2.0, 4);
    let v = world.nodes.get(loco).and_then(|n| n.as_vehicle()).unwrap();
    // 36 km/h is 10 m/s; two seconds move the consist 20 m.
    assert!((v.position.distance_squared(before) - 400.0).abs() < 1.0);

    // The coupled wagon is dragged behind the locomotive.
    let car = world.nodes.find(NameClass::Vehicle, "car").unwrap();
    assert_eq!(v.coupled_next, Some(car));
}

#[test]
fn vehicle_entering_busy_condition_gates_an_event() {
    let mut world = load(&format!(
        "{YARD_TRACK} \
         node -1 0 panel memcell 0 0 0 idle 0 0 none endmemcell \
         event czuwak multiple 1 t1 czuwak_mark condition trackoccupied endevent \
         event czuwak_mark updatevalues 0 panel occupied * * endevent \
         trainset none t1 10 0 \
         node -1 0 loco dynamic pkp/et22 none et22 0 nobody 3 0 enddynamic \
         endtrainset \
         firstinit"
    ));
    // The trainset occupies t1, so the occupancy gate passes and the
    // child event fires on the following frame.
    assert!(world.queue_event_by_name("czuwak", None));
    world.update(1.5, 1);
    world.update(0.5, 1);
    assert_eq!(cell_text(&world, "panel"), "occupied");
}

// ============================================================================
// 4. Inline config and clock carry into the world
// ============================================================================

#[test]
fn time_and_config_statements_take_effect() {
    let world = load(
        "time 06:45 5:00 21:00 endtime \
         config joinduplicatedevents yes friction 0.85 endconfig \
         firstinit",
    );
    assert_eq!(world.ctx.clock.hour(), 6);
    assert_eq!(world.ctx.clock.minute(), 45);
    assert!(world.ctx.config.join_events);
    assert!((world.ctx.friction - 0.85).abs() < 1e-12);
}

// ============================================================================
// 5. Rotated consists land where the scenery author aimed
// ============================================================================

#[test]
fn origin_offsets_apply_to_loaded_nodes() {
    let world = load(
        "origin 1000 0 2000 \
         node -1 0 cellA memcell 10 0 5 x 0 0 none endmemcell \
         endorigin \
         firstinit",
    );
    let id = world.nodes.find(NameClass::MemoryCell, "cellA").unwrap();
    assert_eq!(
        world.nodes.get(id).unwrap().center,
        Vec3::new(1010.0, 0.0, 2005.0)
    );
}
