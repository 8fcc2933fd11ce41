//! Event launchers: per-frame triggers firing scheduled events.
//!
//! A launcher fires on a key press, a cyclic interval, or a time-of-day
//! match, then optionally gates on a memory-cell comparison. Proximity
//! gating against the observer is the caller's job; the stored radius is
//! pre-squared for that check.

use serde::{Deserialize, Serialize};

use crate::id::{EventId, NodeId};

/// A launcher payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLauncher {
    /// Squared trigger radius; negative means unbounded.
    pub radius_sq: f64,

    /// Key that fires the launcher, if any.
    pub key: Option<u8>,

    /// Cyclic interval in seconds; zero when the trigger is a
    /// time-of-day match instead.
    pub delta_time: f64,

    /// Seconds since the last trigger, doubling as the once-per-minute
    /// latch for time-of-day launchers.
    updated_time: f64,

    /// Time-of-day trigger; -1 when unused.
    pub hour: i32,
    pub minute: i32,

    pub event1_name: String,
    pub event2_name: String,
    pub event1: Option<EventId>,
    pub event2: Option<EventId>,

    /// Optional gating cell with comparison operands and mask.
    pub cell_name: String,
    pub cell: Option<NodeId>,
    pub check_mask: u32,
    pub check_text: String,
    pub check_value1: f64,
    pub check_value2: f64,
}

impl EventLauncher {
    pub fn new(radius: f64) -> Self {
        Self {
            radius_sq: if radius < 0.0 { radius } else { radius * radius },
            key: None,
            delta_time: 0.0,
            updated_time: 0.0,
            hour: -1,
            minute: -1,
            event1_name: String::new(),
            event2_name: String::new(),
            event1: None,
            event2: None,
            cell_name: String::new(),
            cell: None,
            check_mask: 0,
            check_text: String::new(),
            check_value1: 0.0,
            check_value2: 0.0,
        }
    }

    /// Decode the authored interval: negative is a cyclic period in
    /// seconds, positive is a clock time in HHMM.
    pub fn set_interval(&mut self, dt: f64) {
        if dt < 0.0 {
            self.delta_time = -dt;
        } else if dt > 0.0 {
            let dt = dt as i32;
            self.minute = dt % 100;
            self.hour = (dt - self.minute) / 100;
            self.delta_time = 0.0;
        }
    }

    /// Unbounded time trigger; lives in the catch-all sector instead of a
    /// position-derived one.
    pub fn is_global(&self) -> bool {
        self.delta_time == 0.0 && self.hour >= 0 && self.minute >= 0 && self.radius_sq < 0.0
    }

    pub fn in_radius(&self, distance_sq: f64) -> bool {
        self.radius_sq < 0.0 || distance_sq <= self.radius_sq
    }

    /// Advance the trigger clock and report whether the launcher fires
    /// this frame, before any cell gating.
    pub fn check(&mut self, dt: f64, hour: u32, minute: u32, key_pressed: bool) -> bool {
        let mut fired = key_pressed;
        if self.delta_time > 0.0 {
            if self.updated_time > self.delta_time {
                self.updated_time = 0.0;
                fired = true;
            } else {
                self.updated_time += dt;
            }
        } else if self.hour >= 0 {
            if self.hour as u32 == hour && self.minute as u32 == minute {
                // The latch keeps this to one shot per matching minute.
                if self.updated_time < 10.0 {
                    self.updated_time = 20.0;
                    fired = true;
                }
            } else {
                self.updated_time = 1.0;
            }
        }
        fired
    }

    /// Event to queue on a trigger; the alternate fires on a shifted key.
    pub fn triggered_event(&self, shifted: bool) -> Option<EventId> {
        if shifted && self.event2.is_some() {
            self.event2
        } else {
            self.event1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cyclic_interval_fires_and_resets() {
        let mut l = EventLauncher::new(-1.0);
        l.set_interval(-5.0);
        assert_eq!(l.delta_time, 5.0);
        let mut fires = 0;
        for _ in 0..14 {
            if l.check(1.0, 0, 0, false) {
                fires += 1;
            }
        }
        // The accumulator must exceed the 5 s period before a trigger
        // edge, so 1 s frames fire on the 7th and 14th frames.
        assert_eq!(fires, 2);
    }

    #[test]
    fn time_of_day_fires_once_per_minute() {
        let mut l = EventLauncher::new(-1.0);
        l.set_interval(1030.0);
        assert_eq!(l.hour, 10);
        assert_eq!(l.minute, 30);
        assert!(!l.check(1.0, 10, 29, false));
        assert!(l.check(1.0, 10, 30, false));
        // Same minute again: latched.
        assert!(!l.check(1.0, 10, 30, false));
        // Minute passes and comes back (next day): fires again.
        assert!(!l.check(1.0, 10, 31, false));
        assert!(l.check(1.0, 10, 30, false));
    }

    #[test]
    fn global_requires_unbounded_radius_and_time() {
        let mut l = EventLauncher::new(-1.0);
        l.set_interval(600.0);
        assert!(l.is_global());
        let mut bounded = EventLauncher::new(100.0);
        bounded.set_interval(600.0);
        assert!(!bounded.is_global());
        assert!(bounded.in_radius(100.0 * 100.0));
        assert!(!bounded.in_radius(101.0 * 101.0));
    }

    #[test]
    fn key_press_fires_directly() {
        let mut l = EventLauncher::new(-1.0);
        l.key = Some(b'A');
        assert!(l.check(0.02, 0, 0, true));
        assert!(!l.check(0.02, 0, 0, false));
    }
}
