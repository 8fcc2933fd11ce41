//! Track segments: trajectory pieces with directional end links, switch
//! state, occupancy tracking, and event hooks.
//!
//! A track has two logical ends. Each end may hold one link to a
//! neighboring track, recording which end of the neighbor it attaches to;
//! a link, once set, is never silently overwritten. Switches carry a
//! second pair of endpoints for the diverging branch and remember the
//! connections recorded per branch.

use serde::{Deserialize, Serialize};

use crate::error::WorldError;
use crate::id::{EventId, IsolatedId, NodeId, TextureId};
use crate::math::{Vec3, points_coincide};

/// Maximum vehicles simultaneously occupying one track.
pub const MAX_OCCUPANTS: usize = 40;

/// Track category bits; rail tracks get the duplicate-name warning.
pub const CATEGORY_RAIL: u32 = 0x1;
pub const CATEGORY_ROAD: u32 = 0x2;
pub const CATEGORY_RIVER: u32 = 0x4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    Normal,
    Switch,
    /// Turntable / transfer table; reconnected at runtime by its model.
    Table,
    Cross,
    Tributary,
}

/// Which logical end of a track. Directions 2 and 3 address the diverging
/// branch of a switch.
pub type EndCase = u8;

/// A directional link to a neighboring track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub target: NodeId,
    /// End of the neighbor this link attaches to: 0 = its point1,
    /// 1 = its point2, 2/3 = the same through its diverging branch.
    pub direction: EndCase,
}

/// The two ends of a track, as callers name them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackEnd {
    Prev,
    Next,
}

impl TrackEnd {
    pub fn label(self) -> &'static str {
        match self {
            TrackEnd::Prev => "prev",
            TrackEnd::Next => "next",
        }
    }
}

/// Extra state for switches, turntables and crossings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchExtension {
    /// Diverging branch endpoints (branch point1/point2).
    pub point3: Vec3,
    pub point4: Vec3,

    /// Active branch: 0 straight, 1 diverging.
    pub state: u8,

    /// Per-branch recorded end links, captured by `set_connections`.
    pub branch_prev: [Option<Connection>; 2],
    pub branch_next: [Option<Connection>; 2],

    /// Blade drive: current and target offset plus motion parameters.
    pub offset: f64,
    pub desired_offset: f64,
    pub move_rate: f64,
    pub move_delay: f64,

    /// Trailing (forced-open) signalling events.
    pub ev_plus: Option<EventId>,
    pub ev_minus: Option<EventId>,

    /// Velocity cap from the scene entry; events cannot raise the limit
    /// above it. Negative is uncapped.
    pub velocity_cap: f64,
}

impl Default for SwitchExtension {
    fn default() -> Self {
        Self {
            point3: Vec3::default(),
            point4: Vec3::default(),
            state: 0,
            branch_prev: [None; 2],
            branch_next: [None; 2],
            offset: 0.0,
            desired_offset: 0.0,
            move_rate: 0.1,
            move_delay: 0.0,
            ev_plus: None,
            ev_minus: None,
            velocity_cap: -1.0,
        }
    }
}

/// Occupancy-change event slots. The `all` slots fire for every occupying
/// vehicle; the plain slots only for the head driver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackEvents {
    pub event0: Option<EventId>,
    pub event1: Option<EventId>,
    pub event2: Option<EventId>,
    pub eventall0: Option<EventId>,
    pub eventall1: Option<EventId>,
    pub eventall2: Option<EventId>,
    pub event0_name: String,
    pub event1_name: String,
    pub event2_name: String,
    pub eventall0_name: String,
    pub eventall1_name: String,
    pub eventall2_name: String,
}

impl TrackEvents {
    /// True when any slot is assigned; tracks with events need the
    /// per-scan special handling.
    pub fn any(&self) -> bool {
        self.event0.is_some()
            || self.event1.is_some()
            || self.event2.is_some()
            || self.eventall0.is_some()
            || self.eventall1.is_some()
            || self.eventall2.is_some()
    }
}

/// Action bits: special handling markers set during event resolution.
pub const ACTION_SWITCH_LINKED: u32 = 0x100;
pub const ACTION_VELOCITY_EVENTS: u32 = 0x200;

/// A track segment payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub kind: TrackKind,
    pub category_flags: u32,

    /// Main segment endpoints and authored midpoint.
    pub point1: Vec3,
    pub point2: Vec3,
    pub midpoint: Vec3,
    pub length: f64,

    /// Rail/surface and ballast/shoulder textures; two distinct textures
    /// make the classifier spawn a shadow node for the second channel.
    pub texture1: TextureId,
    pub texture2: TextureId,

    pub prev: Option<Connection>,
    pub next: Option<Connection>,
    pub switch: Option<SwitchExtension>,

    pub events: TrackEvents,
    pub isolated: Option<IsolatedId>,
    pub isolated_name: String,

    /// Occupying vehicles, insertion order, capacity [`MAX_OCCUPANTS`].
    pub occupants: Vec<NodeId>,

    /// Velocity limit for AI; negative is unlimited.
    pub velocity: f64,

    pub action_flags: u32,

    /// Unconnected-by-design marker ("*"-prefixed names): vehicles passing
    /// this end leave the scenario.
    pub portal: bool,

    /// Overhead wire state hint: 0 = coast (no power), >0 = lowered
    /// pantograph with velocity limit.
    pub overhead: f64,

    pub friction: f64,
}

impl Track {
    pub fn new(kind: TrackKind, point1: Vec3, midpoint: Vec3, point2: Vec3) -> Self {
        Self {
            kind,
            category_flags: CATEGORY_RAIL,
            point1,
            point2,
            midpoint,
            length: (point2 - point1).length(),
            texture1: TextureId::NONE,
            texture2: TextureId::NONE,
            prev: None,
            next: None,
            switch: None,
            events: TrackEvents::default(),
            isolated: None,
            isolated_name: String::new(),
            occupants: Vec::new(),
            velocity: -1.0,
            action_flags: 0,
            portal: false,
            overhead: -1.0,
            friction: 1.0,
        }
    }

    /// Authored center: mean of both endpoints and the midpoint.
    pub fn center(&self) -> Vec3 {
        (self.point1 + self.midpoint + self.point2) / 3.0
    }

    pub fn is_rail(&self) -> bool {
        self.category_flags & CATEGORY_RAIL != 0
    }

    pub fn is_empty(&self) -> bool {
        self.occupants.is_empty()
    }

    /// Whether the classifier may merge this track into a texture mesh.
    /// Switches re-sort their geometry when thrown, so they stay solo.
    pub fn is_groupable(&self) -> bool {
        matches!(self.kind, TrackKind::Normal | TrackKind::Tributary)
    }

    /// Endpoint-coincidence discriminator used by the topology resolver.
    ///
    /// Cases: 0/1 = point1/point2 of a plain track, 2/3 = the same on a
    /// switch's straight branch, 4/5 = a switch's diverging branch (the
    /// switch must be thrown before linking through those).
    pub fn test_point(&self, point: Vec3) -> Option<EndCase> {
        match &self.switch {
            None => {
                if points_coincide(self.point1, point) {
                    Some(0)
                } else if points_coincide(self.point2, point) {
                    Some(1)
                } else {
                    None
                }
            }
            Some(sw) => {
                if points_coincide(self.point1, point) {
                    Some(2)
                } else if points_coincide(self.point2, point) {
                    Some(3)
                } else if points_coincide(sw.point3, point) {
                    Some(4)
                } else if points_coincide(sw.point4, point) {
                    Some(5)
                } else {
                    None
                }
            }
        }
    }

    fn end_slot(&mut self, end: TrackEnd) -> &mut Option<Connection> {
        match end {
            TrackEnd::Prev => &mut self.prev,
            TrackEnd::Next => &mut self.next,
        }
    }

    /// Set one end link. Fails if the end already holds a different link;
    /// relinking requires an explicit `disconnect` first.
    pub fn connect(
        &mut self,
        name: &str,
        end: TrackEnd,
        connection: Connection,
    ) -> Result<(), WorldError> {
        let slot = self.end_slot(end);
        match slot {
            Some(existing) if *existing != connection => Err(WorldError::TrackLinkConflict {
                track: name.to_string(),
                end: end.label(),
            }),
            _ => {
                *slot = Some(connection);
                Ok(())
            }
        }
    }

    /// Explicitly clear one end link.
    pub fn disconnect(&mut self, end: TrackEnd) {
        *self.end_slot(end) = None;
    }

    /// Record the current end links as belonging to switch branch
    /// `branch`, so throwing the switch can restore them.
    pub fn set_connections(&mut self, branch: usize) {
        let prev = self.prev;
        let next = self.next;
        if let Some(sw) = &mut self.switch {
            sw.branch_prev[branch] = prev;
            sw.branch_next[branch] = next;
        }
    }

    /// Throw the switch to `state`, optionally overriding blade motion
    /// parameters (negative keeps the configured values). The live end
    /// links are swapped to the recorded connections of the new branch.
    pub fn throw_switch(&mut self, state: u8, move_rate: f64, move_delay: f64) -> bool {
        let velocity_cap;
        let (prev, next);
        if let Some(sw) = &mut self.switch {
            sw.state = state;
            sw.desired_offset = if state == 0 { 0.0 } else { 1.0 };
            if move_rate >= 0.0 {
                sw.move_rate = move_rate;
            }
            if move_delay >= 0.0 {
                sw.move_delay = move_delay;
            }
            velocity_cap = sw.velocity_cap;
            let branch = (state as usize) & 1;
            prev = sw.branch_prev[branch];
            next = sw.branch_next[branch];
        } else {
            return false;
        }
        self.prev = prev;
        self.next = next;
        // Thrown to diverging: AI speed falls to the branch limit.
        if state != 0 && velocity_cap >= 0.0 && (self.velocity < 0.0 || self.velocity > velocity_cap)
        {
            self.velocity = velocity_cap;
        }
        true
    }

    /// Current switch branch, or `None` for plain tracks.
    pub fn switch_state(&self) -> Option<u8> {
        self.switch.as_ref().map(|sw| sw.state)
    }

    /// Set the velocity limit; a switch's entry cap bounds it from above.
    pub fn set_velocity(&mut self, velocity: f64) {
        let cap = self
            .switch
            .as_ref()
            .map(|sw| sw.velocity_cap)
            .unwrap_or(-1.0);
        self.velocity = if cap >= 0.0 && velocity > cap { cap } else { velocity };
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    /// Register an occupying vehicle.
    pub fn add_vehicle(&mut self, name: &str, vehicle: NodeId) -> Result<(), WorldError> {
        if self.occupants.len() >= MAX_OCCUPANTS {
            return Err(WorldError::TooManyVehicles {
                track: name.to_string(),
                max: MAX_OCCUPANTS,
            });
        }
        if !self.occupants.contains(&vehicle) {
            self.occupants.push(vehicle);
        }
        Ok(())
    }

    /// Remove an occupying vehicle; true when it was present.
    pub fn remove_vehicle(&mut self, vehicle: NodeId) -> bool {
        let before = self.occupants.len();
        self.occupants.retain(|v| *v != vehicle);
        self.occupants.len() != before
    }
}
