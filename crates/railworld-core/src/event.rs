//! Events: schedulable units of world-state mutation.
//!
//! An event is created while parsing the scene, cross-referenced to live
//! nodes in a post-load resolution pass, and dispatched by the scheduler
//! when its start time arrives. Same-named events are merged into a joined
//! chain rather than coexisting in the queue.
//!
//! The action payload is a closed sum type: each of the ~20 event kinds
//! carries exactly the parameters it needs, with named references stored
//! alongside their resolved ids ([`EventAction`] / [`EventKind`]).

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::id::{EventId, NodeId};
use crate::math::Vec3;

/// Bit constants shared by memory-cell updates and event conditions.
///
/// The numeric values are part of the scene format: update masks are read
/// straight from `updatevalues`-style statements.
pub mod flags {
    pub const UPDATE_MEM_STRING: u32 = 0x0000_0001;
    pub const UPDATE_MEM_VAL1: u32 = 0x0000_0002;
    pub const UPDATE_MEM_VAL2: u32 = 0x0000_0004;
    pub const UPDATE_MEM_ADD: u32 = 0x0000_0008;
    pub const UPDATE_LOAD: u32 = 0x0000_0010;

    /// Any flag word at or below this threshold is unconditional.
    pub const UPDATE_ONLY: u32 = 0x0000_00FF;

    pub const CONDITIONAL_MEM_STRING: u32 = 0x0000_0100;
    pub const CONDITIONAL_MEM_VAL1: u32 = 0x0000_0200;
    pub const CONDITIONAL_MEM_VAL2: u32 = 0x0000_0400;
    pub const CONDITIONAL_TRACK_OCCUPIED: u32 = 0x0000_1000;
    pub const CONDITIONAL_TRACK_FREE: u32 = 0x0000_2000;
    pub const CONDITIONAL_PROBABILITY: u32 = 0x0000_4000;
    pub const CONDITIONAL_MEM_COMPARE: u32 = 0x0000_8000;

    /// Per-slot else polarity for multiple-dispatch; slot `i` uses
    /// `CONDITIONAL_ELSE << i`.
    pub const CONDITIONAL_ELSE: u32 = 0x0001_0000;

    /// All eight else bits; set iff any slot uses else polarity.
    pub const CONDITIONAL_ANY_ELSE: u32 = 0x00FF_0000;
}

/// A scene object reference: the authored name plus the id filled in by the
/// post-load resolution pass. An unresolved required reference degrades the
/// owning event to [`EventAction::Ignored`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRef {
    pub name: String,
    pub id: Option<NodeId>,
}

impl NodeRef {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            id: None,
        }
    }
}

/// Reference to another event by name, resolved after load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRef {
    pub name: String,
    pub id: Option<EventId>,
}

impl EventRef {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            id: None,
        }
    }
}

/// Which animation channel an animation event drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnimationChannel {
    Rotate,
    Translate,
    /// Drives a digits submodel chain from a value.
    Digital,
}

/// The typed action payload of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventAction {
    /// Overwrite masked slots of a memory cell; vehicles occupying the
    /// cell's attached track receive the cell contents as a command.
    UpdateValues {
        cell: NodeRef,
        text: String,
        value1: f64,
        value2: f64,
        mask: u32,
    },
    /// Like UpdateValues with accumulating numeric slots; zero-delay
    /// instances dispatch synchronously so accumulations are never lost to
    /// queue reordering.
    AddValues {
        cell: NodeRef,
        text: String,
        value1: f64,
        value2: f64,
        mask: u32,
    },
    /// Copy masked slots from one cell into another.
    CopyValues { target: NodeRef, source: NodeRef, mask: u32 },
    /// Relay the cell contents as a command to the activating vehicle.
    GetValues { cell: NodeRef },
    /// Push a literal command to the activating vehicle.
    PutValues {
        text: String,
        value1: f64,
        value2: f64,
        location: Vec3,
    },
    /// Report the activating vehicle's identity into a memory cell.
    WhoIs { cell: NodeRef, mask: u32 },
    /// Write a cell's contents (or every cell when unnamed) to the log.
    LogValues { cell: Option<NodeRef> },
    /// Set model light states; negative entries leave a light unchanged.
    Lights { model: NodeRef, states: Vec<f64> },
    /// Drive a model animation channel.
    Animation {
        model: NodeRef,
        channel: AnimationChannel,
        submodel: String,
        params: [f64; 4],
    },
    /// Toggle node visibility (model, traction span, or track).
    Visible { target: NodeRef, on: bool },
    /// Move a switch to a branch; optional blade speed and delay.
    Switch {
        track: NodeRef,
        state: u8,
        move_rate: f64,
        move_delay: f64,
    },
    /// Set a track's velocity limit.
    TrackVel { track: NodeRef, velocity: f64 },
    /// Obsolete vehicle-velocity order; logged and skipped on dispatch.
    DynVel { velocity: f64 },
    /// Play or stop a sound emitter (1 play, -1 loop, 0 stop).
    Sound { emitter: NodeRef, action: i32 },
    /// Change a power source's supply voltage.
    Voltage { source: NodeRef, voltage: f64 },
    /// Set the scene-wide friction coefficient.
    Friction { value: f64 },
    /// Display a message; currently log-only.
    Message { text: String },
    /// End the scenario with a farewell text.
    Exit { text: String },
    /// Conditional multi-dispatch over up to eight child events with
    /// per-slot else polarity.
    Multiple { children: Vec<EventRef> },
    /// Degraded or deliberately inert event; pops from the queue without
    /// effect.
    Ignored,
}

/// Discriminant-only view of [`EventAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    UpdateValues,
    AddValues,
    CopyValues,
    GetValues,
    PutValues,
    WhoIs,
    LogValues,
    Lights,
    Animation,
    Visible,
    Switch,
    TrackVel,
    DynVel,
    Sound,
    Voltage,
    Friction,
    Message,
    Exit,
    Multiple,
    Ignored,
}

impl EventAction {
    /// The discriminant for this action.
    pub fn kind(&self) -> EventKind {
        match self {
            EventAction::UpdateValues { .. } => EventKind::UpdateValues,
            EventAction::AddValues { .. } => EventKind::AddValues,
            EventAction::CopyValues { .. } => EventKind::CopyValues,
            EventAction::GetValues { .. } => EventKind::GetValues,
            EventAction::PutValues { .. } => EventKind::PutValues,
            EventAction::WhoIs { .. } => EventKind::WhoIs,
            EventAction::LogValues { .. } => EventKind::LogValues,
            EventAction::Lights { .. } => EventKind::Lights,
            EventAction::Animation { .. } => EventKind::Animation,
            EventAction::Visible { .. } => EventKind::Visible,
            EventAction::Switch { .. } => EventKind::Switch,
            EventAction::TrackVel { .. } => EventKind::TrackVel,
            EventAction::DynVel { .. } => EventKind::DynVel,
            EventAction::Sound { .. } => EventKind::Sound,
            EventAction::Voltage { .. } => EventKind::Voltage,
            EventAction::Friction { .. } => EventKind::Friction,
            EventAction::Message { .. } => EventKind::Message,
            EventAction::Exit { .. } => EventKind::Exit,
            EventAction::Multiple { .. } => EventKind::Multiple,
            EventAction::Ignored => EventKind::Ignored,
        }
    }
}

/// Trigger predicates attached to an event. At most one predicate class is
/// active; the flag word encodes which (plus the per-slot else bits for
/// multiple-dispatch).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventCondition {
    pub mask: u32,

    /// Track whose occupancy the occupied/free predicates test; defaults
    /// to the track resolved from the event's own name.
    pub track: NodeRef,

    /// Success threshold for the probability predicate.
    pub probability: f64,

    /// Cell and operands for the memory-compare predicate.
    pub cell: NodeRef,
    pub text: String,
    pub value1: f64,
    pub value2: f64,
}

impl EventCondition {
    /// True when no predicate class is set.
    pub fn is_unconditional(&self) -> bool {
        self.mask <= flags::UPDATE_ONLY
    }
}

/// A schedulable world event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// May be shared between events; duplicates chain through `joined`.
    pub name: String,
    pub action: EventAction,
    pub condition: EventCondition,

    /// Seconds between activation and dispatch. Negative delay marks an
    /// event queued once at scene start (with `|delay|` as the offset).
    pub delay: f64,

    /// Upper bound of the uniform random jitter added on activation.
    pub random_delay: f64,

    /// Disabled events refuse activation and pop without dispatch.
    pub enabled: bool,

    /// Next same-named event; forms the merge chain.
    pub joined: Option<EventId>,
}

impl Event {
    pub fn new(name: &str, action: EventAction) -> Self {
        Self {
            name: name.to_string(),
            action,
            condition: EventCondition::default(),
            delay: 0.0,
            random_delay: 0.0,
            enabled: true,
            joined: None,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.action.kind()
    }

    /// Degrade to an inert event, keeping the queue slot semantics.
    pub fn ignore(&mut self) {
        self.action = EventAction::Ignored;
    }
}

/// Owns every event of a scene and the name index.
///
/// The index maps a name to the head of its joined chain; appended
/// duplicates are reachable only through the chain.
#[derive(Debug, Default, Clone)]
pub struct EventRegistry {
    events: SlotMap<EventId, Event>,
    by_name: std::collections::HashMap<String, EventId>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh event under its name. Returns the id; the caller
    /// decides the duplicate policy before calling (see the scene loader).
    pub fn insert(&mut self, event: Event) -> EventId {
        let name = event.name.clone();
        let id = self.events.insert(event);
        if !name.is_empty() && name != "none" {
            self.by_name.entry(name).or_insert(id);
        }
        id
    }

    /// Insert without touching the name index (joined-chain members).
    pub fn insert_unindexed(&mut self, event: Event) -> EventId {
        self.events.insert(event)
    }

    /// Append `tail` to the end of `head`'s joined chain.
    pub fn join(&mut self, head: EventId, tail: EventId) {
        let mut cursor = head;
        while let Some(next) = self.events[cursor].joined {
            cursor = next;
        }
        self.events[cursor].joined = Some(tail);
    }

    pub fn find(&self, name: &str) -> Option<EventId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: EventId) -> Option<&Event> {
        self.events.get(id)
    }

    pub fn get_mut(&mut self, id: EventId) -> Option<&mut Event> {
        self.events.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EventId, &Event)> {
        self.events.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EventId, &mut Event)> {
        self.events.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub(name: &str) -> Event {
        Event::new(name, EventAction::Message { text: String::new() })
    }

    // -----------------------------------------------------------------
    // kind() discriminants
    // -----------------------------------------------------------------

    #[test]
    fn action_kind_matches_variant() {
        let a = EventAction::Friction { value: 0.9 };
        assert_eq!(a.kind(), EventKind::Friction);
        let b = EventAction::Multiple { children: Vec::new() };
        assert_eq!(b.kind(), EventKind::Multiple);
    }

    // -----------------------------------------------------------------
    // joined chains
    // -----------------------------------------------------------------

    #[test]
    fn join_appends_to_chain_end() {
        let mut reg = EventRegistry::new();
        let head = reg.insert(stub("sem_a"));
        let second = reg.insert_unindexed(stub("sem_a"));
        let third = reg.insert_unindexed(stub("sem_a"));
        reg.join(head, second);
        reg.join(head, third);

        assert_eq!(reg.find("sem_a"), Some(head));
        assert_eq!(reg.get(head).unwrap().joined, Some(second));
        assert_eq!(reg.get(second).unwrap().joined, Some(third));
        assert_eq!(reg.get(third).unwrap().joined, None);
    }

    #[test]
    fn unnamed_events_are_not_indexed() {
        let mut reg = EventRegistry::new();
        reg.insert(stub("none"));
        assert_eq!(reg.find("none"), None);
    }

    #[test]
    fn condition_threshold() {
        let mut c = EventCondition::default();
        assert!(c.is_unconditional());
        c.mask = flags::UPDATE_MEM_VAL1 | flags::UPDATE_MEM_STRING;
        assert!(c.is_unconditional());
        c.mask |= flags::CONDITIONAL_TRACK_FREE;
        assert!(!c.is_unconditional());
    }
}
