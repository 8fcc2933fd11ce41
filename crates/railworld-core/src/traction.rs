//! Overhead wire spans and the power sources feeding them.
//!
//! Spans link end-to-end like tracks, but carry an electrical overlay:
//! each end inherits a supply reference and an accumulated resistance from
//! its neighbors, and tensioning-run boundaries feed across a parallel
//! ring instead of a direct link.

use serde::{Deserialize, Serialize};

use crate::id::NodeId;
use crate::math::Vec3;

/// Wire conductor material; selects resistivity defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WireMaterial {
    #[default]
    None,
    Aluminum,
    Copper,
}

/// A directional link between two span ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpanLink {
    pub target: NodeId,
    /// Which end of the target this end touches (0 = its point1).
    pub target_end: u8,
}

/// End-marker bits set by [`TractionSpan::where_is`]: ends without a direct
/// neighbor are candidates for parallel-ring feeding.
pub const END_OPEN_1: u8 = 0x1;
pub const END_OPEN_2: u8 = 0x2;

/// One span of overhead wire between two support points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TractionSpan {
    pub point1: Vec3,
    pub point2: Vec3,

    /// Supply reference from the scene entry ("*" = inherit, "none" = no
    /// supply), resolved to a power-source node after load.
    pub power_name: String,
    pub section: Option<NodeId>,

    /// Per-end inherited supply and accumulated resistance (negative =
    /// not yet propagated).
    pub power: [Option<NodeId>; 2],
    pub resistance: [f64; 2],

    /// Direct end links.
    pub links: [Option<SpanLink>; 2],

    /// Open-end marker bits, set by `where_is`.
    pub end_marker: u8,

    /// Next span in the parallel (electrically common) ring.
    pub parallel: Option<NodeId>,
    pub parallel_name: String,

    pub material: WireMaterial,
    /// Ohms per meter of wire.
    pub resistivity: f64,
    pub wire_thickness: f64,
    pub damage_flag: u32,
    pub num_sections: u32,
    pub num_wires: u32,
    pub wire_offset: f64,
}

impl TractionSpan {
    pub fn new(point1: Vec3, point2: Vec3) -> Self {
        Self {
            point1,
            point2,
            power_name: String::new(),
            section: None,
            power: [None, None],
            resistance: [-1.0, -1.0],
            links: [None, None],
            end_marker: 0,
            parallel: None,
            parallel_name: String::new(),
            material: WireMaterial::default(),
            resistivity: 0.0,
            wire_thickness: 0.0,
            damage_flag: 0,
            num_sections: 0,
            num_wires: 0,
            wire_offset: 0.0,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.point1 + self.point2) / 2.0
    }

    /// Direction coefficients of the parametric wire equation
    /// `p(t) = point1 + t * parametric()`.
    pub fn parametric(&self) -> Vec3 {
        self.point2 - self.point1
    }

    pub fn length(&self) -> f64 {
        self.parametric().length()
    }

    /// Endpoint for end index 0/1.
    pub fn endpoint(&self, end: u8) -> Vec3 {
        if end == 0 { self.point1 } else { self.point2 }
    }

    /// Own wire resistance over the span length.
    pub fn own_resistance(&self) -> f64 {
        self.resistivity * self.length()
    }

    /// Mark ends that lack a direct neighbor; those feed through the
    /// parallel ring instead. Returns true when any end is open.
    pub fn where_is(&mut self) -> bool {
        self.end_marker = 0;
        if self.links[0].is_none() {
            self.end_marker |= END_OPEN_1;
        }
        if self.links[1].is_none() {
            self.end_marker |= END_OPEN_2;
        }
        self.end_marker != 0
    }

    /// Accept a supply inherited at `end`: the far end's resistance is the
    /// inherited base plus this span's own wire.
    pub fn resistance_calc(&mut self, end: usize, base: f64, source: Option<NodeId>) {
        self.resistance[end] = base;
        self.resistance[end ^ 1] = base + self.own_resistance();
        self.power[end] = source;
        self.power[end ^ 1] = source;
    }
}

/// A traction power source: either a physical substation or a named
/// electrical section that inherits a substation reference when linked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerSource {
    pub nominal_voltage: f64,
    pub voltage: f64,
    pub max_current: f64,
    pub internal_resistance: f64,

    /// Named section (true) vs physical substation (false). When two
    /// linked spans disagree on supply and exactly one side is a section,
    /// the substation reference wins.
    pub is_section: bool,

    /// Current drawn this tick, cleared by the per-tick update.
    pub current_sum: f64,
}

impl PowerSource {
    pub fn new(nominal_voltage: f64, max_current: f64, internal_resistance: f64) -> Self {
        Self {
            nominal_voltage,
            voltage: nominal_voltage,
            max_current,
            internal_resistance,
            is_section: false,
            current_sum: 0.0,
        }
    }

    /// Section placeholder awaiting substation inheritance.
    pub fn section() -> Self {
        let mut source = Self::new(0.0, 0.0, 0.0);
        source.is_section = true;
        source
    }

    /// Fallback substation synthesized for a missing supply reference.
    pub fn fallback() -> Self {
        Self::new(3000.0, 1000.0, 0.05)
    }

    pub fn set_voltage(&mut self, voltage: f64) {
        self.voltage = voltage;
    }

    /// Per-physics-tick bookkeeping: clear the current accumulator.
    pub fn update(&mut self, _dt: f64) {
        self.current_sum = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parametric_and_length() {
        let span = TractionSpan::new(Vec3::new(0.0, 5.0, 0.0), Vec3::new(30.0, 5.5, 40.0));
        let p = span.parametric();
        assert_eq!(p.x, 30.0);
        assert_eq!(p.y, 0.5);
        assert!((span.length() - (30.0f64 * 30.0 + 0.25 + 1600.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn where_is_marks_open_ends() {
        let mut span = TractionSpan::new(Vec3::ZERO, Vec3::new(70.0, 0.0, 0.0));
        assert!(span.where_is());
        assert_eq!(span.end_marker, END_OPEN_1 | END_OPEN_2);
    }

    #[test]
    fn resistance_propagates_across_span() {
        let mut span = TractionSpan::new(Vec3::ZERO, Vec3::new(100.0, 0.0, 0.0));
        span.resistivity = 0.0002;
        span.resistance_calc(0, 0.5, None);
        assert_eq!(span.resistance[0], 0.5);
        assert!((span.resistance[1] - 0.52).abs() < 1e-12);
    }

    #[test]
    fn power_source_tick_clears_current() {
        let mut source = PowerSource::new(3000.0, 2500.0, 0.075);
        source.current_sum = 812.0;
        source.update(0.05);
        assert_eq!(source.current_sum, 0.0);
    }
}
