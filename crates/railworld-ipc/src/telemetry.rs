//! Telemetry frames: the vehicle snapshot (opcode 7) and the crewed
//! vehicle table (opcode 12).
//!
//! Opcode 7 carries 32 four-byte slots, floats and integers interleaved
//! at fixed positions, followed by the vehicle name. Opcode 12 is a flat
//! 1984-byte table of 31 records of 64 bytes each; short tables are padded
//! with placeholder records so the counterpart can index blindly.

use railworld_core::math::Vec3;

use crate::frame::{opcode, FrameWriter};

/// Driver status bits packed into telemetry slot 22.
pub fn status_bits(
    resistors: bool,
    converter: bool,
    compressor: bool,
    mains: bool,
    door_left: bool,
    door_right: bool,
    fuse: bool,
    departure_signal: bool,
) -> i32 {
    i32::from(resistors)
        | i32::from(converter) << 1
        | i32::from(compressor) << 2
        | i32::from(mains) << 3
        | i32::from(door_left) << 4
        | i32::from(door_right) << 5
        | i32::from(fuse) << 6
        | i32::from(departure_signal) << 7
}

/// Height reported for a pantograph slot with no pantograph fitted.
pub const PANTOGRAPH_ABSENT: f32 = -2.0;

/// One vehicle's telemetry snapshot, as the physics layer reports it.
#[derive(Debug, Clone, Default)]
pub struct VehicleTelemetry {
    pub name: String,
    /// Time of day, 1.0 = a full day.
    pub day_fraction: f64,
    pub position: Vec3,
    pub velocity: f64,
    /// Wheel circumference speed; diverges from `velocity` when slipping.
    pub wheel_speed: f64,
    pub acceleration: Vec3,
    pub distance_km: f64,
    pub pipe_press: f64,
    pub scnd_pipe_press: f64,
    pub brake_press: f64,
    pub tank_press: f64,
    pub total_current: f64,
    pub main_ctrl: i32,
    pub scnd_ctrl: i32,
    pub main_ctrl_actual: i32,
    pub scnd_ctrl_actual: i32,
    /// Packed driver status, from [`status_bits`].
    pub status: i32,
    /// Up to four pantograph heights; missing slots report
    /// [`PANTOGRAPH_ABSENT`].
    pub pantograph_heights: [Option<f64>; 4],
    /// Ammeter readings of the three motor groups.
    pub group_currents: [f64; 3],
    pub warning_signal: i32,
    pub traction_voltage: f64,
}

/// Number of four-byte data slots in a telemetry frame.
const TELEMETRY_SLOTS: i32 = 32;

/// Opcode 7: the full vehicle snapshot; frame length is
/// `10 + 128 + len(name)`.
pub fn vehicle_telemetry_frame(t: &VehicleTelemetry) -> Vec<u8> {
    let mut w = FrameWriter::new(opcode::VEHICLE_TELEMETRY);
    w.push_i32(TELEMETRY_SLOTS);
    w.push_f32(t.day_fraction as f32);
    w.push_f32(t.position.x as f32);
    w.push_f32(t.position.y as f32);
    w.push_f32(t.position.z as f32);
    w.push_f32(t.velocity as f32);
    w.push_f32(t.wheel_speed as f32);
    w.push_f32(0.0);
    w.push_f32(t.acceleration.x as f32);
    w.push_f32(t.acceleration.y as f32);
    w.push_f32(t.acceleration.z as f32);
    w.push_f32(t.distance_km as f32);
    w.push_f32(t.pipe_press as f32);
    w.push_f32(t.scnd_pipe_press as f32);
    w.push_f32(t.brake_press as f32);
    w.push_f32(t.tank_press as f32);
    w.push_f32(t.total_current as f32);
    w.push_i32(t.main_ctrl);
    w.push_i32(t.scnd_ctrl);
    w.push_i32(t.main_ctrl_actual);
    w.push_i32(t.scnd_ctrl_actual);
    // Slot 21 duplicates the shunting position; the counterpart reads it
    // from both places.
    w.push_i32(t.scnd_ctrl_actual);
    w.push_i32(t.status);
    for slot in t.pantograph_heights {
        w.push_f32(slot.map(|h| h as f32).unwrap_or(PANTOGRAPH_ABSENT));
    }
    for current in t.group_currents {
        w.push_f32(current as f32);
    }
    w.push_i32(t.warning_signal);
    w.push_f32(t.traction_voltage as f32);
    w.push_counted_str(&t.name);
    w.finish()
}

/// One crewed vehicle in the opcode 12 table.
#[derive(Debug, Clone)]
pub struct CrewedRecord {
    pub name: String,
    pub position: Vec3,
    /// Driver action code.
    pub action: i32,
    /// Isolated section under the vehicle.
    pub isolated: String,
    pub train: String,
}

/// Records per crewed table frame.
pub const CREWED_CAPACITY: usize = 31;
const CREWED_RECORD_BYTES: usize = 64;

fn push_crewed(w: &mut FrameWriter, name: &str, p: Vec3, action: i32, isolated: &str, train: &str) {
    w.push_fixed_str(name, 16);
    w.push_f32(p.x as f32);
    w.push_f32(p.y as f32);
    w.push_f32(p.z as f32);
    w.push_i32(action);
    w.push_fixed_str(isolated, 16);
    w.push_fixed_str(train, 16);
}

/// Opcode 12: the crewed vehicle table. Takes the first
/// [`CREWED_CAPACITY`] records and pads the rest with placeholders;
/// frame length is always `8 + 1984`.
pub fn crewed_table_frame(records: &[CrewedRecord]) -> Vec<u8> {
    let mut w = FrameWriter::new(opcode::CREWED_TABLE);
    for r in records.iter().take(CREWED_CAPACITY) {
        push_crewed(&mut w, &r.name, r.position, r.action, &r.isolated, &r.train);
    }
    for _ in records.len().min(CREWED_CAPACITY)..CREWED_CAPACITY {
        push_crewed(&mut w, "none", Vec3::new(1.0, 2.0, 3.0), 0, "none", "none");
    }
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32_at(f: &[u8], offset: usize) -> f32 {
        f32::from_le_bytes([f[offset], f[offset + 1], f[offset + 2], f[offset + 3]])
    }

    fn i32_at(f: &[u8], offset: usize) -> i32 {
        i32::from_le_bytes([f[offset], f[offset + 1], f[offset + 2], f[offset + 3]])
    }

    // -----------------------------------------------------------------
    // 1. opcode 7
    // -----------------------------------------------------------------

    #[test]
    fn telemetry_frame_slot_layout() {
        let t = VehicleTelemetry {
            name: "EU07-424".to_string(),
            day_fraction: 0.25,
            position: Vec3::new(120.0, 0.5, -30.0),
            velocity: 19.4,
            main_ctrl: 12,
            scnd_ctrl_actual: 3,
            status: status_bits(false, true, false, true, false, false, false, false),
            pantograph_heights: [Some(1.7), Some(1.65), None, None],
            group_currents: [150.0, 148.0, 0.0],
            warning_signal: 1,
            traction_voltage: 3210.0,
            ..Default::default()
        };
        let f = vehicle_telemetry_frame(&t);
        assert_eq!(f.len(), 10 + 128 + 8);

        // Slot n lives at byte 8 + 4n.
        assert_eq!(i32_at(&f, 8), 32);
        assert_eq!(f32_at(&f, 8 + 4), 0.25);
        assert_eq!(f32_at(&f, 8 + 8), 120.0);
        assert_eq!(f32_at(&f, 8 + 16), -30.0);
        assert_eq!(f32_at(&f, 8 + 20), 19.4);
        assert_eq!(f32_at(&f, 8 + 28), 0.0);
        assert_eq!(i32_at(&f, 8 + 68), 12);
        assert_eq!(i32_at(&f, 8 + 80), 3);
        assert_eq!(i32_at(&f, 8 + 84), 3);
        assert_eq!(i32_at(&f, 8 + 88), 2 | 8);
        assert_eq!(f32_at(&f, 8 + 92), 1.7);
        assert_eq!(f32_at(&f, 8 + 100), PANTOGRAPH_ABSENT);
        assert_eq!(f32_at(&f, 8 + 108), 150.0);
        assert_eq!(i32_at(&f, 8 + 120), 1);
        assert_eq!(f32_at(&f, 8 + 124), 3210.0);

        // Name follows the 128 data bytes, counted and NUL terminated.
        assert_eq!(f[8 + 128], 8);
        assert_eq!(&f[8 + 129..8 + 137], b"EU07-424");
        assert_eq!(f[8 + 137], 0);
    }

    // -----------------------------------------------------------------
    // 2. opcode 12
    // -----------------------------------------------------------------

    #[test]
    fn crewed_table_is_fixed_size_with_padding() {
        let records = vec![CrewedRecord {
            name: "ET22-1092".to_string(),
            position: Vec3::new(500.0, 0.0, 250.0),
            action: 2,
            isolated: "iso_station".to_string(),
            train: "40601".to_string(),
        }];
        let f = crewed_table_frame(&records);
        assert_eq!(f.len(), 8 + 1984);
        assert_eq!(
            f.len(),
            8 + CREWED_CAPACITY * CREWED_RECORD_BYTES
        );

        // First record.
        assert_eq!(&f[8..17], b"ET22-1092");
        assert_eq!(f[17], 0);
        assert_eq!(f32_at(&f, 8 + 16), 500.0);
        assert_eq!(f32_at(&f, 8 + 24), 250.0);
        assert_eq!(i32_at(&f, 8 + 28), 2);
        assert_eq!(&f[8 + 32..8 + 43], b"iso_station");
        assert_eq!(&f[8 + 48..8 + 53], b"40601");

        // Second record is the placeholder.
        let base = 8 + 64;
        assert_eq!(&f[base..base + 4], b"none");
        assert_eq!(f32_at(&f, base + 16), 1.0);
        assert_eq!(f32_at(&f, base + 20), 2.0);
        assert_eq!(f32_at(&f, base + 24), 3.0);
        assert_eq!(i32_at(&f, base + 28), 0);
        assert_eq!(&f[base + 32..base + 36], b"none");
        assert_eq!(&f[base + 48..base + 52], b"none");
    }

    #[test]
    fn crewed_table_caps_at_capacity() {
        let record = CrewedRecord {
            name: "SM42".to_string(),
            position: Vec3::ZERO,
            action: 1,
            isolated: String::new(),
            train: String::new(),
        };
        let f = crewed_table_frame(&vec![record; 40]);
        assert_eq!(f.len(), 8 + 1984);
    }

    // -----------------------------------------------------------------
    // 3. status bits
    // -----------------------------------------------------------------

    #[test]
    fn status_bits_pack_in_order() {
        assert_eq!(status_bits(true, false, false, false, false, false, false, false), 1);
        assert_eq!(status_bits(false, false, false, false, false, false, false, true), 128);
        assert_eq!(
            status_bits(true, true, true, true, true, true, true, true),
            255
        );
    }
}
