//! Memory cells: named text/value1/value2 triples used as comparison
//! targets and command relays by the event system.

use serde::{Deserialize, Serialize};

use crate::event::flags;
use crate::id::{EventId, NodeId};
use crate::math::Vec3;

/// A command queued for a vehicle driver, relayed through a memory cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellCommand {
    pub text: String,
    pub value1: f64,
    pub value2: f64,
    /// Where the command originates; drivers use this for distance checks.
    pub location: Vec3,
}

/// A named key/value store: one string and two numeric slots, each
/// independently updatable and comparable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryCell {
    text: String,
    value1: f64,
    value2: f64,

    /// When true the cell relays commands; reading a restricted command
    /// class (velocity orders) through GetValues clears it.
    pub command_relay_enabled: bool,

    /// Event fired when the cell's contents are sent onward, resolved from
    /// the `<name>:sent` lookup.
    pub on_sent: Option<EventId>,

    /// Track whose occupants receive the cell contents as a command after
    /// a value-update event; from the trailing name of the cell statement.
    pub attached_track_name: String,
    pub attached_track: Option<NodeId>,
}

impl MemoryCell {
    pub fn new(text: &str, value1: f64, value2: f64) -> Self {
        Self {
            text: text.to_string(),
            value1,
            value2,
            command_relay_enabled: true,
            on_sent: None,
            attached_track_name: String::new(),
            attached_track: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn value1(&self) -> f64 {
        self.value1
    }

    pub fn value2(&self) -> f64 {
        self.value2
    }

    /// Apply an update. `mask` selects which slots change; the add bit
    /// switches the numeric slots from assignment to accumulation and the
    /// string slot from replacement to concatenation.
    pub fn update(&mut self, text: &str, value1: f64, value2: f64, mask: u32) {
        let add = mask & flags::UPDATE_MEM_ADD != 0;
        if mask & flags::UPDATE_MEM_STRING != 0 {
            if add {
                self.text.push_str(text);
            } else {
                self.text = text.to_string();
            }
        }
        if mask & flags::UPDATE_MEM_VAL1 != 0 {
            if add {
                self.value1 += value1;
            } else {
                self.value1 = value1;
            }
        }
        if mask & flags::UPDATE_MEM_VAL2 != 0 {
            if add {
                self.value2 += value2;
            } else {
                self.value2 = value2;
            }
        }
    }

    /// Three-way maskable compare. Each component is checked only when its
    /// conditional bit is present in `mask`; an empty mask matches.
    pub fn compare(&self, text: &str, value1: f64, value2: f64, mask: u32) -> bool {
        if mask & flags::CONDITIONAL_MEM_STRING != 0 && self.text != text {
            return false;
        }
        if mask & flags::CONDITIONAL_MEM_VAL1 != 0 && self.value1 != value1 {
            return false;
        }
        if mask & flags::CONDITIONAL_MEM_VAL2 != 0 && self.value2 != value2 {
            return false;
        }
        true
    }

    /// Mirror an isolated section's occupancy into the second value: set
    /// the busy bit on entry, clear the whole low byte on release.
    pub fn set_busy_bit(&mut self, busy: bool) {
        let bits = self.value2 as i64;
        self.value2 = if busy {
            (bits | crate::isolated::CELL_BUSY_BIT) as f64
        } else {
            (bits & crate::isolated::CELL_CLEAR_MASK) as f64
        };
    }

    /// Build the command this cell currently relays.
    pub fn command(&self, location: Vec3) -> CellCommand {
        CellCommand {
            text: self.text.clone(),
            value1: self.value1,
            value2: self.value2,
            location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_assign_and_add() {
        let mut cell = MemoryCell::new("Start", 1.0, 2.0);
        cell.update("SetVelocity", 40.0, 0.0, flags::UPDATE_MEM_STRING | flags::UPDATE_MEM_VAL1);
        assert_eq!(cell.text(), "SetVelocity");
        assert_eq!(cell.value1(), 40.0);
        assert_eq!(cell.value2(), 2.0);

        cell.update("", 5.0, 1.0, flags::UPDATE_MEM_VAL1 | flags::UPDATE_MEM_VAL2 | flags::UPDATE_MEM_ADD);
        assert_eq!(cell.value1(), 45.0);
        assert_eq!(cell.value2(), 3.0);
    }

    #[test]
    fn compare_respects_mask() {
        let cell = MemoryCell::new("SetVelocity", 5.0, 0.0);
        // Value1 alone: string and value2 are "don't care".
        assert!(cell.compare("whatever", 5.0, 99.0, flags::CONDITIONAL_MEM_VAL1));
        assert!(!cell.compare("whatever", 6.0, 0.0, flags::CONDITIONAL_MEM_VAL1));
        // Full compare.
        let all = flags::CONDITIONAL_MEM_STRING | flags::CONDITIONAL_MEM_VAL1 | flags::CONDITIONAL_MEM_VAL2;
        assert!(cell.compare("SetVelocity", 5.0, 0.0, all));
        assert!(!cell.compare("ShuntVelocity", 5.0, 0.0, all));
    }

    #[test]
    fn busy_bit_sets_and_clears_low_byte() {
        let mut cell = MemoryCell::new("", 0.0, 0x304 as f64);
        cell.set_busy_bit(true);
        assert_eq!(cell.value2() as i64, 0x305);
        cell.set_busy_bit(false);
        assert_eq!(cell.value2() as i64, 0x300);
    }

    #[test]
    fn empty_mask_matches() {
        let cell = MemoryCell::new("x", 1.0, 2.0);
        assert!(cell.compare("y", 0.0, 0.0, 0));
    }
}
