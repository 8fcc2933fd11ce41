//! Per-scene shared state: configuration, simulation clock, RNG, render
//! version stamps.
//!
//! One `WorldContext` is constructed per loaded scene and passed by
//! reference to every component entry point; it replaces process-wide
//! globals and is torn down with the scene.

use serde::{Deserialize, Serialize};

use crate::rng::WorldRng;

/// Scene-wide configuration, deserialized from the loader config file or
/// defaulted. Every field has a serde default so partial configs are valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Kilometer squares per world side. The world spans
    /// `squares_per_side` km centered on the origin.
    pub squares_per_side: usize,

    /// Sectors per kilometer-square side.
    pub sectors_per_square: usize,

    /// Merge same-named events into joined chains without degrading the
    /// first occurrence. When false, a duplicate event name disables the
    /// original and logs a warning.
    pub join_events: bool,

    /// Bitmask enabling hidden by-name track event assignment
    /// (bit 0: `:event0`..`:eventall2` lookups).
    pub hidden_events: u32,

    /// When false, pantographs get a placeholder contact height instead of
    /// a dead wire when no span is found.
    pub live_traction: bool,

    /// When false, the wire-break check is skipped (tolerates miswired
    /// scenery).
    pub enable_traction: bool,

    /// Scene-wide friction coefficient; mutable at runtime by the friction
    /// event.
    pub friction: f64,

    /// Seed for the deterministic scenario RNG.
    pub seed: u64,

    /// Duplicate events whose name starts with one of these are dropped
    /// silently instead of joined or warned about.
    pub suppress_duplicate_prefixes: Vec<String>,

    /// Duplicate events whose name ends with one of these are dropped
    /// silently.
    pub suppress_duplicate_suffixes: Vec<String>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            squares_per_side: 500,
            sectors_per_square: 5,
            join_events: false,
            hidden_events: 0,
            live_traction: true,
            enable_traction: true,
            friction: 1.0,
            seed: 0,
            suppress_duplicate_prefixes: vec!["#".into(), "lineinfo:".into()],
            suppress_duplicate_suffixes: vec!["_warning".into(), "_shp".into()],
        }
    }
}

/// Simulation clock: elapsed scenario seconds plus wall time-of-day.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldClock {
    /// Seconds since scenario start. Event start times are expressed on
    /// this axis.
    elapsed: f64,

    /// Time of day in seconds past midnight, advanced with the scenario.
    day_seconds: f64,
}

impl WorldClock {
    /// Seconds since scenario start.
    pub fn now(&self) -> f64 {
        self.elapsed
    }

    /// Set the time of day, from the scene `time` statement.
    pub fn set_time_of_day(&mut self, hour: u32, minute: u32) {
        self.day_seconds = f64::from(hour) * 3600.0 + f64::from(minute) * 60.0;
    }

    /// Current hour of day (0..24).
    pub fn hour(&self) -> u32 {
        (self.day_seconds / 3600.0) as u32 % 24
    }

    /// Current minute of the hour (0..60).
    pub fn minute(&self) -> u32 {
        (self.day_seconds / 60.0) as u32 % 60
    }

    /// Fraction of the day elapsed, `0.0..1.0` (for telemetry frames).
    pub fn day_fraction(&self) -> f64 {
        (self.day_seconds / 86_400.0).rem_euclid(1.0)
    }

    /// Advance both axes by `dt` seconds.
    pub fn advance(&mut self, dt: f64) {
        self.elapsed += dt;
        self.day_seconds = (self.day_seconds + dt).rem_euclid(86_400.0);
    }
}

/// Shared per-scene state handed to every component entry point.
#[derive(Debug, Clone)]
pub struct WorldContext {
    pub config: WorldConfig,
    pub clock: WorldClock,
    pub rng: WorldRng,

    /// Scene-wide friction, initialized from config, mutable by events.
    pub friction: f64,

    /// Frame counter; kilometer squares stamp this to render once per
    /// frame even when several traversals touch them.
    pub frame_number: u32,

    /// Bumped to invalidate every cached geometry buffer; sectors compare
    /// their stamp against this before reuse.
    pub recompile_version: u32,

    pub paused: bool,
}

impl WorldContext {
    pub fn new(config: WorldConfig) -> Self {
        let rng = WorldRng::new(config.seed);
        let friction = config.friction;
        Self {
            config,
            clock: WorldClock::default(),
            rng,
            friction,
            frame_number: 0,
            recompile_version: 0,
            paused: false,
        }
    }

    /// Invalidate all cached sector geometry.
    pub fn request_recompile(&mut self) {
        self.recompile_version += 1;
    }
}

impl Default for WorldContext {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_time_of_day() {
        let mut clock = WorldClock::default();
        clock.set_time_of_day(10, 30);
        assert_eq!(clock.hour(), 10);
        assert_eq!(clock.minute(), 30);
        clock.advance(90.0);
        assert_eq!(clock.minute(), 31);
        assert!((clock.now() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn clock_wraps_midnight() {
        let mut clock = WorldClock::default();
        clock.set_time_of_day(23, 59);
        clock.advance(120.0);
        assert_eq!(clock.hour(), 0);
        assert_eq!(clock.minute(), 1);
    }

    #[test]
    fn config_defaults_carry_suppression_patterns() {
        let config = WorldConfig::default();
        assert!(config.suppress_duplicate_suffixes.contains(&"_warning".to_string()));
        assert!(config.suppress_duplicate_prefixes.contains(&"#".to_string()));
    }
}
