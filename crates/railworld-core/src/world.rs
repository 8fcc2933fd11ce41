//! The assembled world: every subsystem behind one handle.
//!
//! A `World` is built empty from a config, filled with nodes and events
//! by the scene loader, then finalized with [`World::first_init`], which
//! runs the placement, sorting and topology passes in their required
//! order. After that the per-frame entry point is the stepper's `update`.

use tracing::info;

use crate::classify;
use crate::context::{WorldConfig, WorldContext};
use crate::divider;
use crate::event::{Event, EventRegistry};
use crate::grid::SpatialGrid;
use crate::id::{EventId, NodeId};
use crate::isolated::IsolatedRegistry;
use crate::node::{NodePayload, SyntheticSource, WorldNode};
use crate::registry::NodeRegistry;
use crate::scheduler::{queue_startup_events, EventScheduler};
use crate::topology;

/// Everything a loaded scene owns.
#[derive(Debug)]
pub struct World {
    pub ctx: WorldContext,
    pub nodes: NodeRegistry,
    pub grid: SpatialGrid,
    pub events: EventRegistry,
    pub scheduler: EventScheduler,
    pub isolated: IsolatedRegistry,
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        let grid = SpatialGrid::new(config.squares_per_side, config.sectors_per_square);
        Self {
            ctx: WorldContext::new(config),
            nodes: NodeRegistry::new(),
            grid,
            events: EventRegistry::new(),
            scheduler: EventScheduler::new(),
            isolated: IsolatedRegistry::new(),
        }
    }

    /// Insert a node into the registry and place it on the grid. Plain
    /// triangle geometry is subdivided against kilometer-square bounds
    /// first; the extra pieces become sibling synthetic nodes.
    pub fn add_node(&mut self, mut node: WorldNode) -> NodeId {
        let mut extra = Vec::new();
        if let NodePayload::Geometry(g) = &mut node.payload {
            let pieces = divider::divide(g);
            node.center = g.centroid();
            for piece in pieces {
                let mut sibling = node.clone();
                sibling.center = piece.centroid();
                sibling.payload = NodePayload::Geometry(piece);
                extra.push(sibling.synthetic(SyntheticSource::TriangleSplit));
            }
        }
        let id = self.nodes.insert(node, &self.ctx.config);
        classify::add_node(&mut self.nodes, &mut self.grid, &self.ctx.config, id);
        for sibling in extra {
            let sid = self.nodes.insert(sibling, &self.ctx.config);
            classify::add_node(&mut self.nodes, &mut self.grid, &self.ctx.config, sid);
        }
        id
    }

    pub fn add_event(&mut self, event: Event) -> EventId {
        self.events.insert(event)
    }

    /// The post-load pass: sector sorting, track and traction topology,
    /// event and launcher resolution, startup event queueing.
    pub fn first_init(&mut self) {
        info!(
            nodes = self.nodes.len(),
            events = self.events.len(),
            "first init"
        );
        classify::sort_all(&mut self.nodes, &mut self.grid, &self.ctx.config);
        topology::resolve_events(&mut self.events, &self.nodes);
        topology::init_tracks(
            &mut self.nodes,
            &self.grid,
            &mut self.events,
            &mut self.isolated,
            &self.ctx.config,
        );
        topology::init_traction(&mut self.nodes, &self.grid, &self.ctx.config);
        topology::init_launchers(&mut self.nodes, &self.events);
        self.resolve_cell_tracks();
        queue_startup_events(
            &mut self.scheduler,
            &mut self.events,
            &mut self.nodes,
            &mut self.ctx,
        );
        self.ctx.request_recompile();
    }

    /// Bind memory cells to their command-broadcast tracks by name.
    fn resolve_cell_tracks(&mut self) {
        use crate::node::NodeKind;
        use crate::registry::NameClass;
        let ids = self.nodes.ids_of(NodeKind::MemoryCell);
        for id in ids {
            let name = self
                .nodes
                .get(id)
                .and_then(|n| n.as_memcell())
                .map(|c| c.attached_track_name.clone())
                .unwrap_or_default();
            if name.is_empty() || name == "none" {
                continue;
            }
            let track = self.nodes.find(NameClass::Track, &name);
            if let Some(c) = self.nodes.get_mut(id).and_then(|n| n.as_memcell_mut()) {
                c.attached_track = track;
            }
        }
    }

    /// Apply an axle-count change to an isolated section. A busy or free
    /// edge queues the section's matching event and mirrors the occupancy
    /// into the paired memory cell's second value.
    pub fn isolated_modify(&mut self, section: crate::id::IsolatedId, delta: i32) {
        let Some(s) = self.isolated.get_mut(section) else {
            return;
        };
        let Some(transition) = s.modify(delta) else {
            return;
        };
        let busy = s.busy();
        let event = s.event_for(transition);
        let cell = s.cell;
        info!(section = %s.name, busy, "isolated section edge");
        if let Some(c) = cell
            .and_then(|id| self.nodes.get_mut(id))
            .and_then(|n| n.as_memcell_mut())
        {
            c.set_busy_bit(busy);
        }
        if let Some(event) = event {
            self.queue_event(event, None);
        }
    }

    /// Activate an event by id (launchers, track passage, drivers).
    pub fn queue_event(&mut self, event: EventId, activator: Option<NodeId>) {
        self.scheduler
            .add_to_queue(&mut self.events, &mut self.nodes, &mut self.ctx, event, activator);
    }

    /// Activate an event by name; true when the name resolved.
    pub fn queue_event_by_name(&mut self, name: &str, activator: Option<NodeId>) -> bool {
        match self.events.find(name) {
            Some(id) => {
                self.queue_event(id, activator);
                true
            }
            None => false,
        }
    }
}
