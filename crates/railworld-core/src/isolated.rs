//! Isolated sections: axle counters shared by every track naming the
//! same section.
//!
//! A section is busy while its axle count is positive. The busy and free
//! transitions fire the `<name>:busy` / `<name>:free` events and mirror
//! the occupancy into the section's memory cell, synthesized at load when
//! no authored cell carries the section name.

use slotmap::SlotMap;

use std::collections::HashMap;

use crate::id::{EventId, IsolatedId, NodeId};

/// Occupancy bit set in the paired cell's value2 while busy; the whole
/// low byte clears on release.
pub const CELL_BUSY_BIT: i64 = 0x1;
pub const CELL_CLEAR_MASK: i64 = !0xFF;

/// Edge produced by an axle-count change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolatedTransition {
    BecameBusy,
    BecameFree,
}

/// One isolated section.
#[derive(Debug, Clone)]
pub struct IsolatedSection {
    pub name: String,
    axles: i32,

    /// Fired on the free-to-busy edge.
    pub ev_busy: Option<EventId>,
    /// Fired when the last axle leaves.
    pub ev_free: Option<EventId>,

    /// Paired memory cell node; always set after load.
    pub cell: Option<NodeId>,
}

impl IsolatedSection {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            axles: 0,
            ev_busy: None,
            ev_free: None,
            cell: None,
        }
    }

    pub fn busy(&self) -> bool {
        self.axles > 0
    }

    pub fn axles(&self) -> i32 {
        self.axles
    }

    /// Add or remove axles. Returns the edge crossed, if any; the caller
    /// queues the matching event and updates the paired cell.
    pub fn modify(&mut self, delta: i32) -> Option<IsolatedTransition> {
        let was_busy = self.busy();
        self.axles += delta;
        if self.axles < 0 {
            // More releases than entries; clamp rather than go negative.
            self.axles = 0;
        }
        match (was_busy, self.busy()) {
            (false, true) => Some(IsolatedTransition::BecameBusy),
            (true, false) => Some(IsolatedTransition::BecameFree),
            _ => None,
        }
    }

    /// Event for a transition edge.
    pub fn event_for(&self, transition: IsolatedTransition) -> Option<EventId> {
        match transition {
            IsolatedTransition::BecameBusy => self.ev_busy,
            IsolatedTransition::BecameFree => self.ev_free,
        }
    }
}

/// All isolated sections of a scene, addressed by id or name.
#[derive(Debug, Default)]
pub struct IsolatedRegistry {
    sections: SlotMap<IsolatedId, IsolatedSection>,
    by_name: HashMap<String, IsolatedId>,
}

impl IsolatedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Section for a name, created on first use. Tracks sharing a name
    /// share the counter.
    pub fn find_or_create(&mut self, name: &str) -> IsolatedId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        let id = self.sections.insert(IsolatedSection::new(name));
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn find(&self, name: &str) -> Option<IsolatedId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: IsolatedId) -> Option<&IsolatedSection> {
        self.sections.get(id)
    }

    pub fn get_mut(&mut self, id: IsolatedId) -> Option<&mut IsolatedSection> {
        self.sections.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (IsolatedId, &IsolatedSection)> {
        self.sections.iter()
    }

    pub fn ids(&self) -> Vec<IsolatedId> {
        self.sections.keys().collect()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_counter_by_name() {
        let mut reg = IsolatedRegistry::new();
        let a = reg.find_or_create("izol1");
        let b = reg.find_or_create("izol1");
        let c = reg.find_or_create("izol2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn busy_free_edges() {
        let mut reg = IsolatedRegistry::new();
        let id = reg.find_or_create("izol1");
        let s = reg.get_mut(id).unwrap();
        // First axle in: busy edge.
        assert_eq!(s.modify(2), Some(IsolatedTransition::BecameBusy));
        assert!(s.busy());
        // More axles: no edge.
        assert_eq!(s.modify(2), None);
        assert_eq!(s.modify(-2), None);
        // Last axle out: free edge.
        assert_eq!(s.modify(-2), Some(IsolatedTransition::BecameFree));
        assert!(!s.busy());
    }

    #[test]
    fn axle_count_never_negative() {
        let mut reg = IsolatedRegistry::new();
        let id = reg.find_or_create("izol1");
        let s = reg.get_mut(id).unwrap();
        s.modify(1);
        assert_eq!(s.modify(-5), Some(IsolatedTransition::BecameFree));
        assert_eq!(s.axles(), 0);
        assert_eq!(s.modify(1), Some(IsolatedTransition::BecameBusy));
    }
}
