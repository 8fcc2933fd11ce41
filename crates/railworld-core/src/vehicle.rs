//! Vehicle payloads as the world sees them.
//!
//! Full dynamics and AI live outside the core; this carries what the
//! stepper, event dispatch and telemetry need: position and motion along
//! the heading, track occupancy, the driver command inbox, and pantograph
//! state for the wire search.

use serde::{Deserialize, Serialize};

use crate::id::NodeId;
use crate::math::Vec3;
use crate::memcell::CellCommand;

/// A pantograph on a vehicle roof.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pantograph {
    pub raised: bool,

    /// Mount point in the vehicle frame: x along the front vector,
    /// y along up, z along left.
    pub mount: Vec3,

    /// Half-width of the working contact strip.
    pub width: f64,

    /// Extra reach of the horns beyond the strip; contact there rides up
    /// without losing power.
    pub width_extra: f64,

    /// Maximum mechanical height; negative after a wire break.
    pub rest_height: f64,

    /// Vertical distance to the tracked wire along the up vector.
    pub contact_height: f64,

    /// Span currently under the collector.
    pub wire: Option<NodeId>,
}

impl Pantograph {
    pub fn new(mount: Vec3) -> Self {
        Self {
            raised: false,
            mount,
            width: 0.635,
            width_extra: 0.15,
            rest_height: 1.8,
            contact_height: 0.0,
            wire: None,
        }
    }

    pub fn is_broken(&self) -> bool {
        self.rest_height < 0.0
    }

    /// Collapse after a wire dropped below the strip; the collector stops
    /// feeding until the scenario replaces it.
    pub fn break_collector(&mut self) {
        self.rest_height = -1.0;
        self.wire = None;
    }
}

/// A dynamic (vehicle) payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub position: Vec3,

    /// Unit front vector; up is world Y, left follows right-handedly.
    pub heading: Vec3,

    /// Signed speed along the heading, m/s.
    pub velocity: f64,
    pub acceleration: f64,

    /// Track currently occupied.
    pub track: Option<NodeId>,

    /// Disabled vehicles are removed after the current update pass.
    pub enabled: bool,

    pub has_driver: bool,
    /// True for the crewed head of a consist (passengers don't count).
    pub is_head_driver: bool,

    /// Commands relayed from memory cells and put-values events.
    pub commands: Vec<CellCommand>,

    pub coupled_prev: Option<NodeId>,
    pub coupled_next: Option<NodeId>,
    pub coupling_flags: u32,

    pub type_name: String,
    pub train_name: String,
    pub destination: String,
    pub load_type: String,
    pub load: f64,
    pub max_load: f64,
    /// Motive power; zero for unpowered stock.
    pub power: f64,
    /// Orientation relative to the consist head: +1 aligned, -1 reversed.
    pub direction: f64,

    /// Kilometers traveled, for telemetry.
    pub distance_km: f64,

    /// True when any pantograph draws from the overhead supply.
    pub collector: bool,
    pub pantographs: Vec<Pantograph>,

    /// Raised by radio-stop broadcasts; drivers poll and brake.
    pub radio_stop: bool,

    /// Derived per-pass constants (placeholder for the physics
    /// collaborator's cached values).
    coupler_distance: f64,
}

impl Vehicle {
    pub fn new(position: Vec3, heading: Vec3) -> Self {
        Self {
            position,
            heading: heading.normalized(),
            velocity: 0.0,
            acceleration: 0.0,
            track: None,
            enabled: true,
            has_driver: false,
            is_head_driver: false,
            commands: Vec::new(),
            coupled_prev: None,
            coupled_next: None,
            coupling_flags: 0,
            type_name: String::new(),
            train_name: String::new(),
            destination: String::new(),
            load_type: String::new(),
            load: 0.0,
            max_load: 0.0,
            power: 0.0,
            direction: 1.0,
            distance_km: 0.0,
            collector: false,
            pantographs: Vec::new(),
            radio_stop: false,
            coupler_distance: 0.0,
        }
    }

    pub fn up(&self) -> Vec3 {
        Vec3::new(0.0, 1.0, 0.0)
    }

    /// Left vector, horizontal and perpendicular to the heading.
    pub fn left(&self) -> Vec3 {
        let f = self.heading;
        Vec3::new(f.z, 0.0, -f.x).normalized()
    }

    /// Front coupler position.
    pub fn head_position(&self) -> Vec3 {
        self.position + self.heading * (self.length() / 2.0)
    }

    /// Rear coupler position.
    pub fn rear_position(&self) -> Vec3 {
        self.position - self.heading * (self.length() / 2.0)
    }

    fn length(&self) -> f64 {
        // The physics collaborator owns real dimensions.
        10.0
    }

    pub fn put_command(&mut self, command: CellCommand) {
        self.commands.push(command);
    }

    /// Recompute per-pass constants (first sub-step of a frame).
    pub fn compute_constants(&mut self) {
        self.coupler_distance = 0.0;
    }

    /// Refresh coupler spacing against the linked neighbor.
    pub fn couple_dist(&mut self, neighbor_position: Option<Vec3>) {
        if let Some(p) = neighbor_position {
            self.coupler_distance = self.position.distance_squared(p).sqrt();
        }
    }

    /// Integrate forces into velocity.
    pub fn update_force(&mut self, dt: f64, _dt_total: f64, _final_step: bool) {
        self.velocity += self.acceleration * dt;
    }

    /// Cheap advance for intermediate sub-steps.
    pub fn fast_update(&mut self, dt: f64) {
        self.position += self.heading * (self.velocity * dt);
        self.distance_km += (self.velocity * dt).abs() / 1000.0;
    }

    /// Full end-of-frame advance.
    pub fn update(&mut self, dt: f64, _dt_total: f64) {
        self.position += self.heading * (self.velocity * dt);
        self.distance_km += (self.velocity * dt).abs() / 1000.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn left_vector_is_horizontal_perpendicular() {
        let v = Vehicle::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0));
        let left = v.left();
        assert!(left.dot(v.heading).abs() < 1e-12);
        assert_eq!(left.y, 0.0);
    }

    #[test]
    fn motion_integrates_along_heading() {
        let mut v = Vehicle::new(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0));
        v.velocity = 10.0;
        v.fast_update(0.5);
        assert!((v.position.x - 5.0).abs() < 1e-12);
        // Odometer accrues on every sub-step, not only the final one.
        assert!((v.distance_km - 0.005).abs() < 1e-12);
        v.update(0.5, 1.0);
        assert!((v.position.x - 10.0).abs() < 1e-12);
        assert!((v.distance_km - 0.01).abs() < 1e-12);
    }

    #[test]
    fn broken_pantograph() {
        let mut p = Pantograph::new(Vec3::new(3.0, 4.5, 0.0));
        assert!(!p.is_broken());
        p.break_collector();
        assert!(p.is_broken());
        assert!(p.wire.is_none());
    }
}
