//! Railworld IPC -- the wire format of the external signaling process.
//!
//! The signaling counterpart exchanges fixed-layout binary frames: a
//! little-endian `EU07` signature word, a 32-bit opcode, and an
//! opcode-specific payload whose exact byte count the receiver checks.
//! This crate builds those frames bit-exact; transporting them (and
//! logging the traffic) is the embedding application's job.
//!
//! [`frame`] holds the header constants and the small frames, [`telemetry`]
//! the vehicle snapshot and crewed-vehicle table, and [`report`] composes
//! list replies from a live [`railworld_core::world::World`].

pub mod frame;
pub mod report;
pub mod telemetry;

pub use frame::{damage_frame, event_frame, opcode, sim_params_frame, string_frame, SIGNATURE};
pub use telemetry::{
    crewed_table_frame, status_bits, vehicle_telemetry_frame, CrewedRecord, VehicleTelemetry,
    CREWED_CAPACITY, PANTOGRAPH_ABSENT,
};
