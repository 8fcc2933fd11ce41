//! Frame assembly for the signaling-process wire format.
//!
//! Every frame opens with the little-endian `EU07` signature word and a
//! 32-bit opcode, followed by an opcode-specific payload. The counterpart
//! validates total frame length against the opcode, so each builder
//! produces exactly the byte count the legacy sender declared.

/// The `'EU07'` signature word (a big-endian character literal, stored
/// little-endian on the wire like every other word).
pub const SIGNATURE: u32 = 0x4555_3037;

/// Frame opcodes understood by the signaling counterpart.
pub mod opcode {
    /// Event fired, with the activating vehicle's name.
    pub const EVENT: u32 = 2;
    /// A track became free.
    pub const TRACK_FREE: u32 = 4;
    /// Simulation parameters (time of day, pause state).
    pub const SIM_PARAMS: u32 = 5;
    /// One entry of the same-name vehicle list.
    pub const VEHICLE_NAME: u32 = 6;
    /// Vehicle telemetry snapshot.
    pub const VEHICLE_TELEMETRY: u32 = 7;
    /// A track became occupied.
    pub const TRACK_BUSY: u32 = 8;
    /// One entry of the free isolated-section list.
    pub const ISOLATED_FREE: u32 = 10;
    /// One entry of the busy isolated-section list.
    pub const ISOLATED_BUSY: u32 = 11;
    /// Fixed-size table of crewed vehicles.
    pub const CREWED_TABLE: u32 = 12;
    /// Damage report for a vehicle.
    pub const DAMAGE: u32 = 13;
}

/// Little-endian byte accumulator for one frame.
pub(crate) struct FrameWriter {
    buf: Vec<u8>,
}

impl FrameWriter {
    /// Start a frame: signature word, then the opcode.
    pub fn new(op: u32) -> Self {
        let mut w = Self { buf: Vec::new() };
        w.push_u32(SIGNATURE);
        w.push_u32(op);
        w
    }

    pub fn push_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn push_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn push_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn push_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Length-prefixed, NUL-terminated string: one count byte, the bytes,
    /// one zero byte.
    pub fn push_counted_str(&mut self, s: &str) {
        self.push_u8(s.len() as u8);
        self.buf.extend_from_slice(s.as_bytes());
        self.push_u8(0);
    }

    /// Copy `s` into a fixed-width field, NUL terminated, truncating to
    /// `width - 1` bytes the way the fixed record layout demands.
    pub fn push_fixed_str(&mut self, s: &str, width: usize) {
        let bytes = s.as_bytes();
        let n = bytes.len().min(width - 1);
        self.buf.extend_from_slice(&bytes[..n]);
        self.buf.resize(self.buf.len() + width - n, 0);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Opcode 2: an event fired. Both names are counted and NUL terminated;
/// frame length is `12 + len(event) + len(activator)`.
pub fn event_frame(event: &str, activator: &str) -> Vec<u8> {
    let mut w = FrameWriter::new(opcode::EVENT);
    w.push_counted_str(event);
    w.push_counted_str(activator);
    w.finish()
}

/// Single counted string under an arbitrary opcode; frame length is
/// `10 + len(text)`. The track and isolated-section list entries all use
/// this shape, with `"none"` terminating a list.
pub fn string_frame(op: u32, text: &str) -> Vec<u8> {
    let mut w = FrameWriter::new(op);
    w.push_counted_str(text);
    w.finish()
}

/// Opcode 13: a flag byte, then the counted damage text; frame length is
/// `11 + len(text)`.
pub fn damage_frame(text: &str, flag: u8) -> Vec<u8> {
    let mut w = FrameWriter::new(opcode::DAMAGE);
    w.push_u8(flag);
    w.push_counted_str(text);
    w.finish()
}

/// Opcode 5: a flag word naming which parameters are significant, the time
/// of day as a fraction of the day, and the pause state. 20 bytes.
pub fn sim_params_frame(flags: i32, day_fraction: f64, paused: bool) -> Vec<u8> {
    let mut w = FrameWriter::new(opcode::SIM_PARAMS);
    w.push_i32(flags);
    w.push_f32(day_fraction as f32);
    w.push_i32(i32::from(paused));
    w.finish()
}
