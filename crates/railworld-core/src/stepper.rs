//! The per-frame simulation step.
//!
//! A frame advances the clock, sub-steps every vehicle, polls launchers
//! and dispatches due events. The final sub-step of a frame does the
//! expensive work: power-source bookkeeping, queued animation flushes,
//! the pantograph wire walk and the full position update. Vehicles
//! disabled during the frame are removed afterwards, never mid-pass.

use tracing::{debug, info};

use crate::grid::RenderClass;
use crate::id::{NodeId, SectorCoord};
use crate::math::Vec3;
use crate::node::NodeKind;
use crate::world::World;

/// Contact-height sentinel before any wire has been looked at.
const CONTACT_UNKNOWN: f64 = 5.0;

/// Placeholder contact height when traction is configured dead.
const CONTACT_DEAD_WIRE: f64 = 1.4;

/// Parametric hysteresis at span ends; a collector sits on its span a
/// hair past the endpoint before the walk moves on.
const SPAN_EPSILON: f64 = 0.001;

/// Wire walk iteration cap per pantograph per frame.
const WIRE_WALK_LIMIT: usize = 30;

impl World {
    /// Advance the world by `dt` seconds in `iterations` physics
    /// sub-steps.
    pub fn update(&mut self, dt: f64, iterations: u32) {
        if self.ctx.paused {
            return;
        }
        self.ctx.clock.advance(dt);
        self.ctx.frame_number = self.ctx.frame_number.wrapping_add(1);

        let iterations = iterations.max(1);
        let sub_dt = dt / f64::from(iterations);
        let mut vehicles = self.nodes.ids_of(NodeKind::Vehicle);
        vehicles.reverse();

        for step in 0..iterations {
            let final_step = step + 1 == iterations;
            if step == 0 {
                for &id in &vehicles {
                    let neighbor = self.coupled_neighbor_position(id);
                    if let Some(v) = self.nodes.get_mut(id).and_then(|n| n.as_vehicle_mut()) {
                        v.compute_constants();
                        v.couple_dist(neighbor);
                    }
                }
            }
            for &id in &vehicles {
                if let Some(v) = self.nodes.get_mut(id).and_then(|n| n.as_vehicle_mut()) {
                    v.update_force(sub_dt, dt, final_step);
                }
            }
            if final_step {
                self.update_physics(dt);
                for &id in &vehicles {
                    self.get_traction(id);
                    if let Some(v) = self.nodes.get_mut(id).and_then(|n| n.as_vehicle_mut()) {
                        v.update(sub_dt, dt);
                    }
                }
            } else {
                for &id in &vehicles {
                    if let Some(v) = self.nodes.get_mut(id).and_then(|n| n.as_vehicle_mut()) {
                        v.fast_update(sub_dt);
                    }
                }
            }
        }

        self.remove_disabled_vehicles(&vehicles);
        self.check_launchers(dt, None);
        self.scheduler
            .check_queue(&mut self.events, &mut self.nodes, &mut self.ctx);
    }

    /// Per-frame physics bookkeeping outside the vehicles themselves.
    fn update_physics(&mut self, dt: f64) {
        let sources = self.nodes.ids_of(NodeKind::PowerSource);
        for id in sources {
            if let Some(p) = self.nodes.get_mut(id).and_then(|n| n.as_power_source_mut()) {
                p.update(dt);
            }
        }
        let models = self.nodes.ids_of(NodeKind::Model);
        for id in models {
            if let Some(m) = self.nodes.get_mut(id).and_then(|n| n.as_model_mut()) {
                let flushed = m.flush_animations();
                if flushed > 0 {
                    debug!(model = ?id, flushed, "animations applied");
                }
            }
        }
    }

    fn coupled_neighbor_position(&self, id: NodeId) -> Option<Vec3> {
        let v = self.nodes.get(id)?.as_vehicle()?;
        let neighbor = v.coupled_next.or(v.coupled_prev)?;
        Some(self.nodes.get(neighbor)?.center)
    }

    /// Deferred removal: disabled vehicles leave their track, their
    /// couplings and the registry after the pass that disabled them.
    fn remove_disabled_vehicles(&mut self, vehicles: &[NodeId]) {
        for &id in vehicles {
            let Some(v) = self.nodes.get(id).and_then(|n| n.as_vehicle()) else {
                continue;
            };
            if v.enabled {
                continue;
            }
            let track = v.track;
            let (prev, next) = (v.coupled_prev, v.coupled_next);
            info!(vehicle = ?id, "removing disabled vehicle");
            if let Some(t) = track.and_then(|t| self.nodes.get_mut(t)).and_then(|n| n.as_track_mut())
            {
                t.remove_vehicle(id);
            }
            for neighbor in [prev, next].into_iter().flatten() {
                if let Some(n) = self.nodes.get_mut(neighbor).and_then(|n| n.as_vehicle_mut()) {
                    if n.coupled_prev == Some(id) {
                        n.coupled_prev = None;
                    }
                    if n.coupled_next == Some(id) {
                        n.coupled_next = None;
                    }
                }
            }
            self.nodes.remove(id);
        }
    }

    // -- launchers --------------------------------------------------------

    /// Poll every launcher; bounded launchers gate on the observer
    /// position when one is supplied.
    pub fn check_launchers(&mut self, dt: f64, observer: Option<Vec3>) {
        let hour = self.ctx.clock.hour();
        let minute = self.ctx.clock.minute();
        let ids = self.nodes.ids_of(NodeKind::Launcher);
        for id in ids {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            let center = node.center;
            let Some(l) = node.as_launcher() else {
                continue;
            };
            if let Some(observer) = observer
                && !l.in_radius(observer.distance_squared(center))
            {
                continue;
            }
            let fired = self
                .nodes
                .get_mut(id)
                .and_then(|n| n.as_launcher_mut())
                .map(|l| l.check(dt, hour, minute, false))
                .unwrap_or(false);
            if !fired {
                continue;
            }
            let Some(l) = self.nodes.get(id).and_then(|n| n.as_launcher()) else {
                continue;
            };
            let gate = match l.cell {
                Some(cell) => self
                    .nodes
                    .get(cell)
                    .and_then(|n| n.as_memcell())
                    .map(|c| c.compare(&l.check_text, l.check_value1, l.check_value2, l.check_mask))
                    .unwrap_or(false),
                None => true,
            };
            if !gate {
                continue;
            }
            if let Some(event) = l.triggered_event(false) {
                self.queue_event(event, None);
            }
        }
    }

    // -- pantograph wire search ------------------------------------------

    /// Track the overhead wire under each raised pantograph of a vehicle.
    pub fn get_traction(&mut self, id: NodeId) {
        let Some(v) = self.nodes.get(id).and_then(|n| n.as_vehicle()) else {
            return;
        };
        let position = v.position;
        let front = v.heading;
        let up = v.up();
        let left = v.left();
        let pant_count = v.pantographs.len();

        for i in 0..pant_count {
            let Some(v) = self.nodes.get(id).and_then(|n| n.as_vehicle()) else {
                return;
            };
            let p = &v.pantographs[i];
            if !p.raised || p.is_broken() {
                continue;
            }
            let mount = p.mount;
            let rest_height = p.rest_height;
            let known_wire = p.wire;
            let pant0 = position + left * mount.z + up * mount.y + front * mount.x;

            let found = self
                .walk_known_wire(known_wire, pant0)
                .or_else(|| self.search_wire(pant0));

            let mut contact = CONTACT_UNKNOWN;
            let mut wire = None;
            let mut broke = false;
            if let Some((span_id, t)) = found {
                if let Some(span) = self.nodes.get(span_id).and_then(|n| n.as_traction()) {
                    let at = span.point1 + span.parametric() * t;
                    let delta = at - pant0;
                    let vertical = delta.dot(up);
                    let horizontal = delta.dot(left).abs();
                    if let Some(vp) = self.nodes.get(id).and_then(|n| n.as_vehicle()) {
                        let p = &vp.pantographs[i];
                        let overhang = horizontal - p.width;
                        let mut vertical = vertical;
                        if overhang > 0.0 {
                            if overhang < p.width_extra {
                                // Horn contact rides the wire up a little.
                                vertical += 0.15 * overhang / p.width_extra;
                            } else {
                                // Beyond the horns: no contact at all.
                                wire = None;
                                vertical = CONTACT_UNKNOWN;
                            }
                        }
                        if vertical != CONTACT_UNKNOWN {
                            wire = Some(span_id);
                            contact = vertical;
                            if self.ctx.config.enable_traction
                                && vertical < rest_height - 0.15
                                && overhang <= 0.0
                            {
                                broke = true;
                            }
                        } else {
                            contact = CONTACT_UNKNOWN;
                        }
                    }
                }
            }
            if !self.ctx.config.live_traction {
                contact = CONTACT_DEAD_WIRE;
                broke = false;
            }
            let any_wire = wire.is_some();
            if let Some(v) = self.nodes.get_mut(id).and_then(|n| n.as_vehicle_mut()) {
                let p = &mut v.pantographs[i];
                if broke {
                    info!(vehicle = ?id, pantograph = i, "collector broken by low wire");
                    p.break_collector();
                } else {
                    p.wire = wire;
                    p.contact_height = contact;
                }
                v.collector = v.collector || (any_wire && !broke);
            }
        }
    }

    /// Follow span links from the last known wire to the span over the
    /// collector. Gives up at tensioning-run ends and after the
    /// iteration cap; the caller then falls back to the sector search.
    fn walk_known_wire(&self, wire: Option<NodeId>, pant0: Vec3) -> Option<(NodeId, f64)> {
        let mut current = wire?;
        for _ in 0..WIRE_WALK_LIMIT {
            let span = self.nodes.get(current)?.as_traction()?;
            let dir = span.parametric();
            let len_sq = dir.dot(dir);
            if len_sq <= 0.0 {
                return None;
            }
            let t = (pant0 - span.point1).dot(dir) / len_sq;
            if t < -SPAN_EPSILON {
                // A marked open end or a parallel ring boundary forces a
                // fresh search instead of a blind walk.
                if span.end_marker != 0 || span.parallel.is_some() {
                    return None;
                }
                current = span.links[0]?.target;
            } else if t > 1.0 + SPAN_EPSILON {
                if span.end_marker != 0 || span.parallel.is_some() {
                    return None;
                }
                current = span.links[1]?.target;
            } else {
                return Some((current, t.clamp(0.0, 1.0)));
            }
        }
        None
    }

    /// Sector scan for a span over the collector, over the wire lists of
    /// the 3x3 block of sectors around it.
    fn search_wire(&self, pant0: Vec3) -> Option<(NodeId, f64)> {
        let center = self.grid.sector_of(pant0);
        let mut best: Option<(NodeId, f64, f64)> = None;
        for dc in -1..=1 {
            for dr in -1..=1 {
                let coord = SectorCoord {
                    col: center.col + dc,
                    row: center.row + dr,
                };
                let Some(sector) = self.grid.fast_sector(coord) else {
                    continue;
                };
                let mut cursor = sector.render_head(RenderClass::Wires);
                while let Some(id) = cursor {
                    let node = self.nodes.get(id);
                    cursor = node.and_then(|n| n.next_render);
                    let Some(span) = node.and_then(|n| n.as_traction()) else {
                        continue;
                    };
                    let dir = span.parametric();
                    let len_sq = dir.dot(dir);
                    if len_sq <= 0.0 {
                        continue;
                    }
                    let t = (pant0 - span.point1).dot(dir) / len_sq;
                    if !(0.0..=1.0).contains(&t) {
                        continue;
                    }
                    let at = span.point1 + dir * t;
                    let lateral =
                        Vec3::new(at.x - pant0.x, 0.0, at.z - pant0.z).length();
                    if best.map(|(_, _, b)| lateral < b).unwrap_or(true) {
                        best = Some((id, t, lateral));
                    }
                }
            }
        }
        best.map(|(id, t, _)| (id, t))
    }

    // -- broadcasts and nearest queries ----------------------------------

    /// Raise the radio-stop flag on every vehicle within the broadcast
    /// window around `position` (two kilometer squares each way).
    pub fn radio_stop(&mut self, position: Vec3) {
        let window = 2.0 * self.grid.sector_size() * self.grid.sectors_per_square() as f64;
        let ids = self.nodes.ids_of(NodeKind::Vehicle);
        let mut stopped = 0;
        for id in ids {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            let p = node
                .as_vehicle()
                .map(|v| v.position)
                .unwrap_or(node.center);
            if (p.x - position.x).abs() <= window && (p.z - position.z).abs() <= window
                && let Some(v) = self.nodes.get_mut(id).and_then(|n| n.as_vehicle_mut())
            {
                v.radio_stop = true;
                stopped += 1;
            }
        }
        info!(stopped, "radio stop broadcast");
    }

    /// Nearest other vehicle within the surrounding-sector window.
    pub fn dynamic_nearest(&self, position: Vec3, exclude: Option<NodeId>) -> Option<NodeId> {
        self.nearest_vehicle(position, exclude, |v| v.position)
    }

    /// Nearest other vehicle measured coupler-to-coupler.
    pub fn coupler_nearest(&self, position: Vec3, exclude: Option<NodeId>) -> Option<NodeId> {
        self.nearest_vehicle(position, exclude, |v| {
            let head = v.head_position().distance_squared(position);
            let rear = v.rear_position().distance_squared(position);
            if head < rear { v.head_position() } else { v.rear_position() }
        })
    }

    fn nearest_vehicle<F>(
        &self,
        position: Vec3,
        exclude: Option<NodeId>,
        point_of: F,
    ) -> Option<NodeId>
    where
        F: Fn(&crate::vehicle::Vehicle) -> Vec3,
    {
        // One-and-a-half sectors each way matches the 3x3 sector window.
        let limit = 1.5 * self.grid.sector_size();
        let limit_sq = limit * limit;
        let mut best: Option<(NodeId, f64)> = None;
        for id in self.nodes.iter_kind(NodeKind::Vehicle) {
            if Some(id) == exclude {
                continue;
            }
            let Some(v) = self.nodes.get(id).and_then(|n| n.as_vehicle()) else {
                continue;
            };
            let d = point_of(v).distance_squared(position);
            if d <= limit_sq && best.map(|(_, bd)| d < bd).unwrap_or(true) {
                best = Some((id, d));
            }
        }
        best.map(|(id, _)| id)
    }
}
