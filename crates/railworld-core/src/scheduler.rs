//! Event scheduler: the time-ordered queue and the per-kind dispatcher.
//!
//! Activation computes `start = now + |delay| + jitter` and inserts by
//! linear scan, after every entry with an equal or earlier start, so
//! same-instant activations dispatch in activation order. An event may sit
//! in the queue at most once; a Multiple event rescheduling itself gets
//! one extra residency through its resubmission token.
//!
//! Zero-delay AddValues events bypass the queue entirely: accumulating
//! updates must land in activation order, and a queue round trip could
//! reorder them against a competing update.

use slotmap::SecondaryMap;
use tracing::{debug, info, warn};

use crate::context::WorldContext;
use crate::event::{flags, EventAction, EventRegistry};
use crate::id::{EventId, NodeId};
use crate::registry::NodeRegistry;

/// One queue entry.
#[derive(Debug, Clone, Copy)]
pub struct QueuedEvent {
    pub event: EventId,
    /// Vehicle whose passage activated the event, if any.
    pub activator: Option<NodeId>,
    /// Absolute dispatch time on the scenario clock.
    pub start: f64,
}

/// Record of a dispatched event, drained by the telemetry layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRecord {
    pub event_name: String,
    pub activator_name: String,
}

/// Grants a Multiple event one self-rescheduling pass despite already
/// residing in the queue. Consumed on use.
#[derive(Debug)]
struct ResubmitToken {
    event: EventId,
}

/// The event queue and dispatcher state.
#[derive(Debug, Default)]
pub struct EventScheduler {
    /// Sorted ascending by start; index 0 dispatches first.
    queue: Vec<QueuedEvent>,

    /// Queue residency per event; admission requires zero.
    queued: SecondaryMap<EventId, u32>,

    /// Dispatched events awaiting telemetry pickup.
    pub dispatched: Vec<DispatchRecord>,

    /// Set by an exit event; the stepper ends the scenario.
    pub exit_text: Option<String>,
}

impl EventScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_head(&self) -> Option<&QueuedEvent> {
        self.queue.first()
    }

    fn residency(&self, event: EventId) -> u32 {
        self.queued.get(event).copied().unwrap_or(0)
    }

    /// Activate an event: either dispatch it synchronously (zero-delay
    /// AddValues) or insert it into the queue. Joined successors of a
    /// synchronous dispatch activate recursively.
    pub fn add_to_queue(
        &mut self,
        events: &mut EventRegistry,
        nodes: &mut NodeRegistry,
        ctx: &mut WorldContext,
        event: EventId,
        activator: Option<NodeId>,
    ) {
        let Some(ev) = events.get(event) else {
            return;
        };
        if !ev.enabled || self.residency(event) > 0 {
            return;
        }
        let sync = matches!(ev.action, EventAction::AddValues { .. }) && ev.delay == 0.0;
        if sync {
            info!(name = %ev.name, "event dispatched on activation");
            if self.condition_met(events, nodes, ctx, event) {
                self.dispatch(events, nodes, ctx, event, activator);
            }
            let joined = events.get(event).and_then(|e| e.joined);
            if let Some(next) = joined {
                self.add_to_queue(events, nodes, ctx, next, activator);
            }
            return;
        }
        let delay = ev.delay.abs();
        let jitter = if ev.random_delay > 0.0 {
            ev.random_delay * ctx.rng.uniform()
        } else {
            0.0
        };
        let start = ctx.clock.now() + delay + jitter;
        info!(name = %ev.name, start, "event added to queue");
        self.insert(QueuedEvent {
            event,
            activator,
            start,
        });
        if let Some(e) = self.queued.entry(event) {
            *e.or_insert(0) += 1;
        }
    }

    fn insert(&mut self, entry: QueuedEvent) {
        let pos = self
            .queue
            .iter()
            .position(|q| q.start > entry.start)
            .unwrap_or(self.queue.len());
        self.queue.insert(pos, entry);
    }

    /// One extra residency for a self-rescheduling Multiple. The gate is
    /// a dispatch delay of at least five seconds and at most one existing
    /// residency, which keeps a cyclic chain from flooding the queue.
    fn resubmit(
        &mut self,
        events: &EventRegistry,
        ctx: &mut WorldContext,
        token: ResubmitToken,
        activator: Option<NodeId>,
    ) {
        let Some(ev) = events.get(token.event) else {
            return;
        };
        if ev.delay < 5.0 || self.residency(token.event) >= 2 {
            debug!(name = %ev.name, "self-reschedule refused");
            return;
        }
        let jitter = if ev.random_delay > 0.0 {
            ev.random_delay * ctx.rng.uniform()
        } else {
            0.0
        };
        self.insert(QueuedEvent {
            event: token.event,
            activator,
            start: ctx.clock.now() + ev.delay + jitter,
        });
        if let Some(e) = self.queued.entry(token.event) {
            *e.or_insert(0) += 1;
        }
    }

    /// Dispatch every due queue entry.
    pub fn check_queue(
        &mut self,
        events: &mut EventRegistry,
        nodes: &mut NodeRegistry,
        ctx: &mut WorldContext,
    ) {
        let now = ctx.clock.now();
        while self
            .queue
            .first()
            .map(|q| q.start < now)
            .unwrap_or(false)
        {
            let entry = self.queue.remove(0);
            let Some(ev) = events.get(entry.event) else {
                continue;
            };
            let enabled = ev.enabled;
            let joined = ev.joined;
            let name = ev.name.clone();
            if enabled {
                info!(name = %name, "event launched");
                if self.condition_met(events, nodes, ctx, entry.event) {
                    self.dispatch(events, nodes, ctx, entry.event, entry.activator);
                } else {
                    self.dispatch_else(events, nodes, ctx, entry.event, entry.activator);
                }
            } else {
                debug!(name = %name, "disabled event dropped from queue");
            }
            // The next same-named event inherits the slot: same start,
            // same activator, dispatched in this very pass. A disabled
            // head still hands the slot on.
            if let Some(next) = joined {
                self.queue.insert(
                    0,
                    QueuedEvent {
                        event: next,
                        activator: entry.activator,
                        start: entry.start,
                    },
                );
                if let Some(e) = self.queued.entry(next) {
                    *e.or_insert(0) += 1;
                }
            }
            if let Some(count) = self.queued.get_mut(entry.event) {
                *count = count.saturating_sub(1);
            }
        }
    }

    // -- condition evaluation ---------------------------------------------

    fn track_busy(&self, nodes: &NodeRegistry, track: Option<NodeId>) -> Option<bool> {
        track
            .and_then(|id| nodes.get(id))
            .and_then(|n| n.as_track())
            .map(|t| !t.is_empty())
    }

    fn condition_met(
        &mut self,
        events: &EventRegistry,
        nodes: &NodeRegistry,
        ctx: &mut WorldContext,
        event: EventId,
    ) -> bool {
        let Some(ev) = events.get(event) else {
            return false;
        };
        let c = &ev.condition;
        if c.is_unconditional() {
            return true;
        }
        if c.mask & flags::CONDITIONAL_TRACK_OCCUPIED != 0 {
            let busy = self.track_busy(nodes, c.track.id).unwrap_or(false);
            info!(name = %ev.name, track = %c.track.name, busy, "occupancy condition");
            return busy;
        }
        if c.mask & flags::CONDITIONAL_TRACK_FREE != 0 {
            let busy = self.track_busy(nodes, c.track.id).unwrap_or(false);
            info!(name = %ev.name, track = %c.track.name, busy, "vacancy condition");
            return !busy;
        }
        if c.mask & flags::CONDITIONAL_PROBABILITY != 0 {
            let roll = ctx.rng.uniform();
            let met = roll < c.probability;
            info!(name = %ev.name, roll, threshold = c.probability, met, "probability condition");
            return met;
        }
        if c.mask & flags::CONDITIONAL_MEM_COMPARE != 0 {
            let Some(cell) = c.cell.id.and_then(|id| nodes.get(id)).and_then(|n| n.as_memcell())
            else {
                warn!(name = %ev.name, cell = %c.cell.name, "compare condition without a cell");
                return false;
            };
            let met = cell.compare(&c.text, c.value1, c.value2, c.mask);
            info!(
                name = %ev.name,
                cell = %c.cell.name,
                have_text = %cell.text(),
                have_value1 = cell.value1(),
                have_value2 = cell.value2(),
                want_text = %c.text,
                want_value1 = c.value1,
                want_value2 = c.value2,
                met,
                "compare condition"
            );
            return met;
        }
        true
    }

    // -- dispatch ---------------------------------------------------------

    /// Relay a cell's current contents to every vehicle on its attached
    /// track.
    fn broadcast_cell(&mut self, nodes: &mut NodeRegistry, cell_id: NodeId) {
        let Some(cell_node) = nodes.get(cell_id) else {
            return;
        };
        let location = cell_node.center;
        let Some(cell) = cell_node.as_memcell() else {
            return;
        };
        if !cell.command_relay_enabled {
            return;
        }
        let Some(track) = cell.attached_track else {
            return;
        };
        let command = cell.command(location);
        let occupants = nodes
            .get(track)
            .and_then(|n| n.as_track())
            .map(|t| t.occupants.clone())
            .unwrap_or_default();
        for vehicle in occupants {
            if let Some(v) = nodes.get_mut(vehicle).and_then(|n| n.as_vehicle_mut()) {
                v.put_command(command.clone());
            }
        }
    }

    fn dispatch(
        &mut self,
        events: &mut EventRegistry,
        nodes: &mut NodeRegistry,
        ctx: &mut WorldContext,
        event: EventId,
        activator: Option<NodeId>,
    ) {
        let Some(ev) = events.get(event) else {
            return;
        };
        let name = ev.name.clone();
        let action = ev.action.clone();
        let condition_mask = ev.condition.mask;

        match action {
            EventAction::UpdateValues {
                cell,
                text,
                value1,
                value2,
                mask,
            }
            | EventAction::AddValues {
                cell,
                text,
                value1,
                value2,
                mask,
            } => {
                let Some(cell_id) = cell.id else {
                    warn!(event = %name, cell = %cell.name, "missed event: no cell");
                    return;
                };
                if let Some(c) = nodes.get_mut(cell_id).and_then(|n| n.as_memcell_mut()) {
                    c.update(&text, value1, value2, mask);
                }
                self.broadcast_cell(nodes, cell_id);
            }
            EventAction::CopyValues { target, source, mask } => {
                let Some((target_id, source_id)) = target.id.zip(source.id) else {
                    warn!(event = %name, "missed event: unresolved copy endpoint");
                    return;
                };
                let copied = nodes
                    .get(source_id)
                    .and_then(|n| n.as_memcell())
                    .map(|c| (c.text().to_string(), c.value1(), c.value2()));
                if let Some((text, v1, v2)) = copied {
                    if let Some(c) = nodes.get_mut(target_id).and_then(|n| n.as_memcell_mut()) {
                        c.update(&text, v1, v2, mask);
                    }
                    // A copy counts as an update: occupants of the target's
                    // track hear the new contents too.
                    self.broadcast_cell(nodes, target_id);
                }
            }
            EventAction::GetValues { cell } => {
                let Some(cell_id) = cell.id else {
                    warn!(event = %name, cell = %cell.name, "missed event: no cell");
                    return;
                };
                let sent = nodes.get(cell_id).and_then(|n| {
                    let location = n.center;
                    n.as_memcell()
                        .map(|c| (c.command(location), c.on_sent))
                });
                if let Some((command, on_sent)) = sent {
                    if let Some(v) = activator
                        .and_then(|id| nodes.get_mut(id))
                        .and_then(|n| n.as_vehicle_mut())
                    {
                        v.put_command(command);
                    }
                    if let Some(next) = on_sent {
                        self.add_to_queue(events, nodes, ctx, next, activator);
                    }
                }
            }
            EventAction::PutValues {
                text,
                value1,
                value2,
                location,
            } => {
                if let Some(v) = activator
                    .and_then(|id| nodes.get_mut(id))
                    .and_then(|n| n.as_vehicle_mut())
                {
                    v.put_command(crate::memcell::CellCommand {
                        text,
                        value1,
                        value2,
                        location,
                    });
                } else {
                    debug!(event = %name, "putvalues without an activator");
                }
            }
            EventAction::WhoIs { cell, mask } => {
                let Some(cell_id) = cell.id else {
                    warn!(event = %name, cell = %cell.name, "missed event: no cell");
                    return;
                };
                let identity = activator
                    .and_then(|id| nodes.get(id))
                    .and_then(|n| n.as_vehicle())
                    .map(|v| (v.train_name.clone(), v.load, v.max_load));
                if let Some((train, load, max_load)) = identity
                    && let Some(c) = nodes.get_mut(cell_id).and_then(|n| n.as_memcell_mut())
                {
                    c.update(&train, load, max_load, mask);
                }
            }
            EventAction::LogValues { cell } => match cell {
                Some(cell) => {
                    if let Some(c) = cell.id.and_then(|id| nodes.get(id)).and_then(|n| n.as_memcell())
                    {
                        info!(
                            cell = %cell.name,
                            text = %c.text(),
                            value1 = c.value1(),
                            value2 = c.value2(),
                            "cell contents"
                        );
                    }
                }
                None => {
                    for (_, node) in nodes.iter() {
                        if let Some(c) = node.as_memcell() {
                            info!(
                                cell = %node.name,
                                text = %c.text(),
                                value1 = c.value1(),
                                value2 = c.value2(),
                                "cell contents"
                            );
                        }
                    }
                }
            },
            EventAction::Lights { model, states } => {
                if let Some(m) = model
                    .id
                    .and_then(|id| nodes.get_mut(id))
                    .and_then(|n| n.as_model_mut())
                {
                    for (i, state) in states.iter().enumerate() {
                        if *state >= 0.0 {
                            m.set_light(i, *state);
                        }
                    }
                }
            }
            EventAction::Animation {
                model,
                channel,
                submodel,
                params,
            } => {
                if let Some(m) = model
                    .id
                    .and_then(|id| nodes.get_mut(id))
                    .and_then(|n| n.as_model_mut())
                {
                    m.queue_animation(crate::model::QueuedAnimation {
                        channel,
                        submodel,
                        params,
                    });
                }
            }
            EventAction::Visible { target, on } => {
                if let Some(node) = target.id.and_then(|id| nodes.get_mut(id)) {
                    node.visible = on;
                }
            }
            EventAction::Switch {
                track,
                state,
                move_rate,
                move_delay,
            } => {
                if let Some(t) = track
                    .id
                    .and_then(|id| nodes.get_mut(id))
                    .and_then(|n| n.as_track_mut())
                {
                    t.throw_switch(state, move_rate, move_delay);
                    ctx.request_recompile();
                }
            }
            EventAction::TrackVel { track, velocity } => {
                if let Some(t) = track
                    .id
                    .and_then(|id| nodes.get_mut(id))
                    .and_then(|n| n.as_track_mut())
                {
                    t.set_velocity(velocity);
                }
            }
            EventAction::DynVel { velocity } => {
                warn!(event = %name, velocity, "obsolete dynvel event skipped");
            }
            EventAction::Sound { emitter, action } => {
                if let Some(s) = emitter
                    .id
                    .and_then(|id| nodes.get_mut(id))
                    .and_then(|n| n.as_sound_mut())
                {
                    s.apply(action);
                }
            }
            EventAction::Voltage { source, voltage } => {
                if let Some(p) = source
                    .id
                    .and_then(|id| nodes.get_mut(id))
                    .and_then(|n| n.as_power_source_mut())
                {
                    p.set_voltage(voltage);
                }
            }
            EventAction::Friction { value } => {
                ctx.friction = value;
            }
            EventAction::Message { text } => {
                info!(event = %name, %text, "message");
            }
            EventAction::Exit { text } => {
                info!(%text, "exit requested");
                self.exit_text = Some(text);
            }
            EventAction::Multiple { children } => {
                // The condition already passed; per-slot else bits flip
                // which children fire on the opposing outcome. With no
                // else bits all children fire.
                for (slot, child) in children.iter().enumerate().take(8) {
                    let else_slot = condition_mask & (flags::CONDITIONAL_ELSE << slot) != 0;
                    if else_slot {
                        continue;
                    }
                    let Some(child_id) = child.id else {
                        continue;
                    };
                    if child_id == event {
                        let token = ResubmitToken { event };
                        self.resubmit(events, ctx, token, activator);
                    } else {
                        self.add_to_queue(events, nodes, ctx, child_id, activator);
                    }
                }
            }
            EventAction::Ignored => {}
        }

        let activator_name = activator
            .and_then(|id| nodes.get(id))
            .map(|n| n.name.clone())
            .unwrap_or_default();
        self.dispatched.push(DispatchRecord {
            event_name: name,
            activator_name,
        });
    }

    /// Dispatch the else-polarity side of a Multiple event whose condition
    /// failed. Called by `check_queue` through the failure path.
    fn dispatch_else(
        &mut self,
        events: &mut EventRegistry,
        nodes: &mut NodeRegistry,
        ctx: &mut WorldContext,
        event: EventId,
        activator: Option<NodeId>,
    ) {
        let Some(ev) = events.get(event) else {
            return;
        };
        let EventAction::Multiple { children } = ev.action.clone() else {
            return;
        };
        let condition_mask = ev.condition.mask;
        if condition_mask & flags::CONDITIONAL_ANY_ELSE == 0 {
            return;
        }
        for (slot, child) in children.iter().enumerate().take(8) {
            if condition_mask & (flags::CONDITIONAL_ELSE << slot) == 0 {
                continue;
            }
            let Some(child_id) = child.id else {
                continue;
            };
            if child_id == event {
                let token = ResubmitToken { event };
                self.resubmit(events, ctx, token, activator);
            } else {
                self.add_to_queue(events, nodes, ctx, child_id, activator);
            }
        }
    }

    pub fn drain_dispatched(&mut self) -> Vec<DispatchRecord> {
        std::mem::take(&mut self.dispatched)
    }
}

/// Queue every event flagged for scene-start activation: negative-delay
/// events and events whose name marks them as start events.
pub fn queue_startup_events(
    scheduler: &mut EventScheduler,
    events: &mut EventRegistry,
    nodes: &mut NodeRegistry,
    ctx: &mut WorldContext,
) {
    let startup: Vec<EventId> = events
        .iter()
        .filter(|(_, ev)| ev.delay < 0.0 || ev.name.contains("onstart"))
        .map(|(id, _)| id)
        .collect();
    for id in startup {
        scheduler.add_to_queue(events, nodes, ctx, id, None);
    }
}
